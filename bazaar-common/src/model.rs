use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Uuid-backed identifier newtype with the conversions the API and repo
/// layers need.
#[macro_export]
macro_rules! newtype_uuid {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            Ord,
            PartialOrd,
            serde::Serialize,
            serde::Deserialize,
            poem_openapi::NewType,
        )]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = uuid::Uuid::parse_str(s)
                    .map_err(|err| format!("Invalid {}: {err}", stringify!($name)))?;
                Ok(Self(uuid))
            }
        }

        impl TryFrom<&str> for $name {
            type Error = String;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

newtype_uuid!(UserId);
newtype_uuid!(TeamId);
newtype_uuid!(ModelId);
newtype_uuid!(UploadId);
newtype_uuid!(ApiKeyId);

/// An opaque bearer secret; either a session token minted by the identity
/// provider or a scoped upload/job token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Object)]
pub struct TokenSecret {
    pub value: String,
}

impl TokenSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl FromStr for TokenSecret {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err("Empty token".to_string())
        } else {
            Ok(Self {
                value: s.to_string(),
            })
        }
    }
}

impl crate::SafeDisplay for TokenSecret {
    fn to_safe_string(&self) -> String {
        "****".to_string()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize, Enum,
)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum ModelType {
    Ndb,
    NlpText,
    NlpToken,
    NlpDoc,
    EnterpriseSearch,
    KnowledgeExtraction,
}

impl Display for ModelType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ModelType::Ndb => write!(f, "ndb"),
            ModelType::NlpText => write!(f, "nlp_text"),
            ModelType::NlpToken => write!(f, "nlp_token"),
            ModelType::NlpDoc => write!(f, "nlp_doc"),
            ModelType::EnterpriseSearch => write!(f, "enterprise_search"),
            ModelType::KnowledgeExtraction => write!(f, "knowledge_extraction"),
        }
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ndb" => Ok(ModelType::Ndb),
            "nlp_text" => Ok(ModelType::NlpText),
            "nlp_token" => Ok(ModelType::NlpToken),
            "nlp_doc" => Ok(ModelType::NlpDoc),
            "enterprise_search" => Ok(ModelType::EnterpriseSearch),
            "knowledge_extraction" => Ok(ModelType::KnowledgeExtraction),
            _ => Err(format!("Invalid model type: {s}")),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize, Enum,
)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum ModelAccess {
    Private,
    Protected,
    Public,
}

impl Display for ModelAccess {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ModelAccess::Private => write!(f, "private"),
            ModelAccess::Protected => write!(f, "protected"),
            ModelAccess::Public => write!(f, "public"),
        }
    }
}

impl FromStr for ModelAccess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(ModelAccess::Private),
            "protected" => Ok(ModelAccess::Protected),
            "public" => Ok(ModelAccess::Public),
            _ => Err(format!("Invalid access level: {s}")),
        }
    }
}

/// The permission granted to non-owners through `public` or `protected`
/// access.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize, Enum,
)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum DefaultPermission {
    Read,
    Write,
}

impl Display for DefaultPermission {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DefaultPermission::Read => write!(f, "read"),
            DefaultPermission::Write => write!(f, "write"),
        }
    }
}

impl FromStr for DefaultPermission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(DefaultPermission::Read),
            "write" => Ok(DefaultPermission::Write),
            _ => Err(format!("Invalid default permission: {s}")),
        }
    }
}

/// Resolved permission of a user on a model. Variants are ordered so that
/// `>=` expresses "at least".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize, Enum,
)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum ModelPermission {
    None,
    Read,
    Write,
    Owner,
}

impl Display for ModelPermission {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ModelPermission::None => write!(f, "none"),
            ModelPermission::Read => write!(f, "read"),
            ModelPermission::Write => write!(f, "write"),
            ModelPermission::Owner => write!(f, "owner"),
        }
    }
}

impl From<DefaultPermission> for ModelPermission {
    fn from(value: DefaultPermission) -> Self {
        match value {
            DefaultPermission::Read => ModelPermission::Read,
            DefaultPermission::Write => ModelPermission::Write,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize, Enum,
)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum ModelStatus {
    NotStarted,
    UploadInProgress,
    Starting,
    InProgress,
    Complete,
    Stopped,
    Failed,
}

impl ModelStatus {
    /// Priority when aggregating a model with its transitive dependencies:
    /// the highest-severity status wins.
    fn severity(&self) -> u8 {
        match self {
            ModelStatus::Failed => 7,
            ModelStatus::NotStarted => 6,
            ModelStatus::Stopped => 5,
            ModelStatus::Starting => 4,
            ModelStatus::UploadInProgress => 3,
            ModelStatus::InProgress => 2,
            ModelStatus::Complete => 1,
        }
    }

    pub fn worst(statuses: impl IntoIterator<Item = ModelStatus>) -> Option<ModelStatus> {
        statuses.into_iter().max_by_key(|status| status.severity())
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ModelStatus::Starting | ModelStatus::InProgress | ModelStatus::Complete
        )
    }
}

impl Display for ModelStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::NotStarted => write!(f, "not_started"),
            ModelStatus::UploadInProgress => write!(f, "upload_in_progress"),
            ModelStatus::Starting => write!(f, "starting"),
            ModelStatus::InProgress => write!(f, "in_progress"),
            ModelStatus::Complete => write!(f, "complete"),
            ModelStatus::Stopped => write!(f, "stopped"),
            ModelStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ModelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(ModelStatus::NotStarted),
            "upload_in_progress" => Ok(ModelStatus::UploadInProgress),
            "starting" => Ok(ModelStatus::Starting),
            "in_progress" => Ok(ModelStatus::InProgress),
            "complete" => Ok(ModelStatus::Complete),
            "stopped" => Ok(ModelStatus::Stopped),
            "failed" => Ok(ModelStatus::Failed),
            _ => Err(format!("Invalid status: {s}")),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize, Enum,
)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum JobType {
    Train,
    Deploy,
}

impl Display for JobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            JobType::Train => write!(f, "train"),
            JobType::Deploy => write!(f, "deploy"),
        }
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(JobType::Train),
            "deploy" => Ok(JobType::Deploy),
            _ => Err(format!("Invalid job type: {s}")),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize, Enum,
)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum JobLogLevel {
    Warning,
    Error,
}

impl Display for JobLogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            JobLogLevel::Warning => write!(f, "warning"),
            JobLogLevel::Error => write!(f, "error"),
        }
    }
}

impl FromStr for JobLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(JobLogLevel::Warning),
            "error" => Ok(JobLogLevel::Error),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
pub struct ErrorsBody {
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
pub struct Empty {}

#[cfg(test)]
mod tests {
    use test_r::test;

    use super::*;

    #[test]
    fn status_priority_prefers_failures() {
        let worst = ModelStatus::worst(vec![
            ModelStatus::Complete,
            ModelStatus::InProgress,
            ModelStatus::Failed,
        ]);
        assert_eq!(worst, Some(ModelStatus::Failed));
    }

    #[test]
    fn status_priority_not_started_beats_stopped() {
        let worst = ModelStatus::worst(vec![
            ModelStatus::Stopped,
            ModelStatus::NotStarted,
            ModelStatus::Complete,
        ]);
        assert_eq!(worst, Some(ModelStatus::NotStarted));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ModelStatus::NotStarted,
            ModelStatus::UploadInProgress,
            ModelStatus::Starting,
            ModelStatus::InProgress,
            ModelStatus::Complete,
            ModelStatus::Stopped,
            ModelStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<ModelStatus>(), Ok(status));
        }
    }

    #[test]
    fn permission_ordering() {
        assert!(ModelPermission::Owner > ModelPermission::Write);
        assert!(ModelPermission::Write > ModelPermission::Read);
        assert!(ModelPermission::Read > ModelPermission::None);
    }
}
