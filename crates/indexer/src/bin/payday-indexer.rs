// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Result};
use clap::Parser;
use payday_indexer::{
    db::{PaydayDb, PaydayDbObj},
    node::HttpNodeClient,
    notifier::{NoopNotifier, NotificationSink, WebhookNotifier},
    payday::{PaydayService, PaydayServiceConfig},
};
use payday_rewards::BlockHash;
use url::Url;

/// Arguments for the payday indexer.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct PaydayIndexerArgs {
    /// URL of the ledger node gateway.
    #[clap(short, long, env)]
    node_url: Url,

    /// DB connection string.
    #[clap(long, env = "DATABASE_URL")]
    db: String,

    /// Webhook receiving progress messages. Messages are dropped when unset.
    #[clap(long, env)]
    notifier_url: Option<Url>,

    /// Bearer token for the notifier webhook.
    #[clap(long, env = "NOTIFIER_API_TOKEN")]
    notifier_token: Option<String>,

    /// Interval in seconds between checking for a new payday.
    #[clap(long, default_value = "5")]
    interval: u64,

    /// Number of retries before quitting after an error.
    #[clap(long, default_value = "3")]
    retries: u32,

    /// Timeout in seconds for node and notifier requests.
    #[clap(long, default_value = "30")]
    request_timeout: u64,

    /// Number of bakers whose pool state is fetched concurrently.
    #[clap(long, default_value = "16")]
    harvest_concurrency: usize,

    /// Whether to log in JSON format.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,

    /// Process a single payday with this date (YYYY-MM-DD) and exit. Requires --hash.
    #[clap(long, requires = "hash")]
    date: Option<String>,

    /// Hash of the block that paid out the rewards of --date.
    #[clap(long, requires = "date")]
    hash: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = PaydayIndexerArgs::parse();

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .from_env_lossy();

    if args.log_json {
        tracing_subscriber::fmt().with_ansi(false).json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_ansi(false).with_env_filter(filter).init();
    }

    let request_timeout = Duration::from_secs(args.request_timeout);
    let node = Arc::new(HttpNodeClient::new(args.node_url, request_timeout)?);
    let db: PaydayDbObj = Arc::new(PaydayDb::new(&args.db).await?);
    let notifier: Arc<dyn NotificationSink> = match args.notifier_url {
        Some(url) => Arc::new(WebhookNotifier::new(url, args.notifier_token, request_timeout)?),
        None => Arc::new(NoopNotifier),
    };

    let config = PaydayServiceConfig {
        interval: Duration::from_secs(args.interval),
        retries: args.retries,
        harvest_concurrency: args.harvest_concurrency,
    };
    let service = PaydayService::new(node, db, notifier, config);

    // If a payday is given, process it once and exit
    if let (Some(date), Some(hash)) = (args.date, args.hash) {
        tracing::info!("Running indexer once for payday {}", date);
        let summary = service.run_for_payday(&date, &BlockHash::from(hash.as_str())).await?;
        tracing::info!("Indexer completed successfully: {:?}", summary);
        return Ok(());
    }

    // Otherwise, run in a loop
    let PaydayServiceConfig { interval, retries, .. } = service.config().clone();
    let mut failures = 0u32;
    loop {
        match service.run().await {
            Ok(_) => {
                failures = 0;
                tracing::debug!("Sleeping for {} seconds", interval.as_secs());
                tokio::time::sleep(interval).await;
            }
            Err(e) => {
                failures += 1;
                tracing::error!("Error running payday indexer: {:?}", e);
                if failures >= retries {
                    bail!("Maximum retries reached");
                }
                tracing::info!("Retrying in {} seconds", interval.as_secs());
                tokio::time::sleep(interval).await;
            }
        }
    }
}
