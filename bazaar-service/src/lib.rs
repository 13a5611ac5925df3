// Copyright 2024-2025 Golem Cloud
//
// Licensed under the Golem Source License v1.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://license.golem.cloud/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod api;
pub mod bootstrap;
pub mod clients;
pub mod config;
pub mod model;
pub mod repo;
pub mod service;

use crate::api::Apis;
use crate::bootstrap::Services;
use crate::config::BazaarServiceConfig;
use anyhow::{anyhow, Context};
use bazaar_common::config::DbConfig;
use bazaar_service_base::db;
use poem::listener::{Acceptor, Listener};
use poem::middleware::Cors;
use poem::{EndpointExt, Route};
use poem_openapi::OpenApiService;
use sqlx::migrate::Migrator;
use tokio::task::JoinSet;
use tracing::{debug, info, Instrument};

#[cfg(test)]
test_r::enable!();

static POSTGRES_MIGRATIONS: Migrator = sqlx::migrate!("./db/migration/postgres");
static SQLITE_MIGRATIONS: Migrator = sqlx::migrate!("./db/migration/sqlite");

pub struct RunDetails {
    pub http_port: u16,
}

pub struct BazaarService {
    config: BazaarServiceConfig,
    services: Services,
}

impl BazaarService {
    pub async fn new(config: BazaarServiceConfig) -> Result<Self, anyhow::Error> {
        debug!("Initializing model bazaar control plane");

        match config.db.clone() {
            DbConfig::Postgres(c) => {
                db::postgres_migrate(&c, &POSTGRES_MIGRATIONS)
                    .await
                    .map_err(|e| anyhow!(e.to_string()))
                    .context("Postgres DB migration")?;
            }
            DbConfig::Sqlite(c) => {
                db::sqlite_migrate(&c, &SQLITE_MIGRATIONS)
                    .await
                    .map_err(|e| anyhow!(e.to_string()))
                    .context("SQLite DB migration")?;
            }
        };

        let services = Services::new(&config)
            .await
            .map_err(|err| anyhow!(err).context("Service initialization"))?;

        Ok(Self { config, services })
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn http_service(&self) -> OpenApiService<Apis, ()> {
        api::make_open_api_service(&self.services)
    }

    pub async fn run(
        &self,
        join_set: &mut JoinSet<Result<(), anyhow::Error>>,
    ) -> Result<RunDetails, anyhow::Error> {
        if self.config.reconciler.enabled {
            self.services.reconciler.start();
        }

        let http_port = self.start_http_server(join_set).await?;
        info!("Started model bazaar control plane on port {}", http_port);

        Ok(RunDetails { http_port })
    }

    /// Closes the reconciler's stop channel; safe to call more than once.
    pub fn shutdown(&self) {
        self.services.reconciler.stop();
    }

    async fn start_http_server(
        &self,
        join_set: &mut JoinSet<Result<(), anyhow::Error>>,
    ) -> Result<u16, anyhow::Error> {
        let api_service = api::make_open_api_service(&self.services);

        let ui = api_service.swagger_ui();
        let spec = api_service.spec_endpoint_yaml();

        let cors = Cors::new()
            .allow_origin_regex(&self.config.cors_origin_regex)
            .allow_credentials(true);

        let app = Route::new()
            .nest("/", api_service)
            .nest("/docs", ui)
            .nest("/specs", spec)
            .with(cors);

        let poem_listener =
            poem::listener::TcpListener::bind(format!("0.0.0.0:{}", self.config.http_port));
        let acceptor = poem_listener.into_acceptor().await?;
        let port = acceptor.local_addr()[0]
            .as_socket_addr()
            .expect("socket address")
            .port();

        join_set.spawn(
            async move {
                poem::Server::new_with_acceptor(acceptor)
                    .run(app)
                    .await
                    .map_err(|e| e.into())
            }
            .in_current_span(),
        );

        Ok(port)
    }
}
