use tracing::Span;

/// Kind label attached to error logs of recorded API requests.
pub trait TraceErrorKind {
    fn trace_error_kind(&self) -> &'static str;

    /// Expected errors (4xx) are logged at info, unexpected ones at error.
    fn is_expected(&self) -> bool {
        true
    }
}

pub struct RecordedHttpApiRequest {
    pub span: Span,
    api: &'static str,
}

impl RecordedHttpApiRequest {
    pub fn new(api: &'static str, span: Span) -> Self {
        Self { span, api }
    }

    pub fn result<T, E: TraceErrorKind>(self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => {
                tracing::info!(parent: &self.span, api = self.api, "API request succeeded");
            }
            Err(error) if error.is_expected() => {
                tracing::info!(
                    parent: &self.span,
                    api = self.api,
                    error_kind = error.trace_error_kind(),
                    "API request failed"
                );
            }
            Err(error) => {
                tracing::error!(
                    parent: &self.span,
                    api = self.api,
                    error_kind = error.trace_error_kind(),
                    "API request failed"
                );
            }
        }
        result
    }
}

/// Opens a span for an incoming API request and returns a recorder whose
/// `result` call logs the outcome under that span.
#[macro_export]
macro_rules! recorded_http_api_request {
    ($api:expr $(, $key:ident = $value:expr)* $(,)?) => {{
        let span = tracing::info_span!(
            "http_api_request",
            api = $api
            $(, $key = tracing::field::debug(&$value))*
        );
        $crate::metrics::RecordedHttpApiRequest::new($api, span)
    }};
}
