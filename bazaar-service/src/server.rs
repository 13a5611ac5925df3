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

use anyhow::Context;
use bazaar_common::tracing::init_tracing;
use bazaar_service::config::make_config_loader;
use bazaar_service::BazaarService;
use tokio::task::JoinSet;

fn main() -> Result<(), anyhow::Error> {
    let config = make_config_loader()
        .load()
        .context("Failed to load configuration")?;

    init_tracing(&config.tracing);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?
        .block_on(async move {
            let service = BazaarService::new(config).await?;

            let mut join_set = JoinSet::new();
            service.run(&mut join_set).await?;

            while let Some(result) = join_set.join_next().await {
                result??;
            }

            service.shutdown();
            Ok(())
        })
}
