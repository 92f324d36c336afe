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

use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Context, Result};
use payday_rewards::{
    account_daily_apy, build_current_payday_performance, build_pool_performance,
    classify_rewards, harvest_epoch_snapshot, pool_daily_apy, ApyIntermediate, BlockHash,
    ClassifiedRewards, DailyApyEntry, EntityId, EpochSnapshot, ImpactedAddressLedger, NodeClient,
    PaydayInformation,
};
use tokio::time::{Duration, Instant};

use super::context::{EpochContext, PaydayStage};
use crate::{db::PaydayDbObj, notifier::NotificationSink};

#[derive(Clone)]
pub struct PaydayServiceConfig {
    pub interval: Duration,
    pub retries: u32,
    /// Number of bakers whose snapshots are fetched concurrently
    pub harvest_concurrency: usize,
}

impl Default for PaydayServiceConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(5), retries: 3, harvest_concurrency: 16 }
    }
}

/// What a payday run produced
#[derive(Debug, Clone, PartialEq)]
pub struct PaydaySummary {
    pub date: String,
    pub bakers: usize,
    pub accounts: usize,
    pub rewards: usize,
    pub impacted_addresses: usize,
    pub window_updates: usize,
    pub elapsed_secs: f64,
}

pub struct PaydayService {
    node: Arc<dyn NodeClient>,
    db: PaydayDbObj,
    notifier: Arc<dyn NotificationSink>,
    config: PaydayServiceConfig,
}

impl PaydayService {
    pub fn new(
        node: Arc<dyn NodeClient>,
        db: PaydayDbObj,
        notifier: Arc<dyn NotificationSink>,
        config: PaydayServiceConfig,
    ) -> Self {
        Self { node, db, notifier, config }
    }

    pub fn config(&self) -> &PaydayServiceConfig {
        &self.config
    }

    /// Process the last known payday if it has not been processed yet.
    pub async fn run(&self) -> Result<Option<PaydaySummary>> {
        let Some(known) = self.db.get_last_known_payday().await? else {
            tracing::info!("No payday announced yet");
            return Ok(None);
        };
        let processed = self.db.get_latest_payday().await?.map(|payday| payday.date);

        if processed.as_deref() == Some(known.date.as_str()) {
            tracing::debug!("Payday {} already processed", known.date);
            return Ok(None);
        }

        tracing::info!(
            "Starting payday calculations for {} (last processed: {})",
            known.date,
            processed.as_deref().unwrap_or("none")
        );
        self.run_for_payday(&known.date, &known.hash).await.map(Some)
    }

    /// Run every stage for the payday whose rewards were paid in block `hash`.
    ///
    /// Each stage upserts its output under deterministic ids, so an interrupted run can simply
    /// be repeated.
    pub async fn run_for_payday(&self, date: &str, hash: &BlockHash) -> Result<PaydaySummary> {
        let start_time = Instant::now();
        tracing::info!("Starting payday run for {} at block {}", date, hash);
        self.notifier.try_send(&format!("(Payday: {date})\nStart.")).await;

        let started = begin_stage(date, PaydayStage::Init);
        let ctx = EpochContext::init(self.node.as_ref(), self.db.as_ref(), date, hash)
            .await
            .with_context(|| format!("failed to resolve epoch for payday {date}"))?;
        let detail = format!(
            "Heights {}..={} over {}s.",
            ctx.first_block.height, ctx.last_block.height, ctx.duration_secs
        );
        self.finish_stage(date, PaydayStage::Init, started, &detail).await;

        let started = begin_stage(date, PaydayStage::Harvest);
        let snapshot = self.harvest(&ctx).await?;
        let bakers = snapshot.completed.pools.len();
        let detail = format!("Processed {bakers} bakers.");
        self.finish_stage(date, PaydayStage::Harvest, started, &detail).await;

        let started = begin_stage(date, PaydayStage::ClassifyRewards);
        let rewards = self.classify_and_store_rewards(&ctx, &snapshot).await?;
        let detail = format!("Stored {} rewards.", rewards.records.len());
        self.finish_stage(date, PaydayStage::ClassifyRewards, started, &detail).await;

        let started = begin_stage(date, PaydayStage::FoldImpactedAddresses);
        let impacted_addresses = self.store_impacted_addresses(&ctx, &rewards).await?;
        let detail = format!("Filed {impacted_addresses} addresses.");
        self.finish_stage(date, PaydayStage::FoldImpactedAddresses, started, &detail).await;

        let started = begin_stage(date, PaydayStage::AccountDailyApy);
        let accounts = self.store_account_daily_apy(&ctx, &snapshot, &rewards).await?;
        let detail = format!("Processed {accounts} accounts.");
        self.finish_stage(date, PaydayStage::AccountDailyApy, started, &detail).await;

        let started = begin_stage(date, PaydayStage::PoolDailyApy);
        let pools = self.store_pool_daily_apy(&ctx, &snapshot, &rewards).await?;
        let detail = format!("Processed {pools} pools.");
        self.finish_stage(date, PaydayStage::PoolDailyApy, started, &detail).await;

        let started = begin_stage(date, PaydayStage::Windows);
        let window_updates = self.store_windows(&ctx).await?;
        let detail = format!("Updated {window_updates} entities.");
        self.finish_stage(date, PaydayStage::Windows, started, &detail).await;

        let summary = PaydaySummary {
            date: date.to_string(),
            bakers,
            accounts,
            rewards: rewards.records.len(),
            impacted_addresses,
            window_updates,
            elapsed_secs: start_time.elapsed().as_secs_f64(),
        };
        let detail = format!("Took {:.2}s.", summary.elapsed_secs);
        self.finish_stage(date, PaydayStage::Done, start_time, &detail).await;
        Ok(summary)
    }

    async fn finish_stage(&self, date: &str, stage: PaydayStage, started: Instant, detail: &str) {
        tracing::info!(
            "(Payday: {}) {} done in {:.2}s. {}",
            date,
            stage,
            started.elapsed().as_secs_f64(),
            detail
        );
        self.notifier.try_send(&format!("(Payday: {date})\n{stage}...done.\n{detail}")).await;
    }

    /// Snapshot the staking state and store the payday record and pool performance.
    async fn harvest(&self, ctx: &EpochContext) -> Result<EpochSnapshot> {
        let snapshot = harvest_epoch_snapshot(
            self.node.as_ref(),
            &ctx.last_block.hash,
            &ctx.payday_block.hash,
            self.config.harvest_concurrency,
        )
        .await?;

        let payday = PaydayInformation::new(
            &ctx.date,
            &ctx.payday_block,
            &ctx.first_block,
            &ctx.last_block,
            ctx.duration_secs,
            &snapshot,
        );
        self.db.upsert_payday(&payday).await?;

        let performance = build_pool_performance(
            &ctx.date,
            ctx.payday_block.slot_time,
            &ctx.boundaries,
            &snapshot,
        );
        self.db.upsert_pool_performance(&performance).await?;

        let current = build_current_payday_performance(
            &ctx.date,
            ctx.payday_block.slot_time,
            &ctx.boundaries,
            &snapshot,
        );
        self.db.replace_current_payday_performance(&current).await?;

        tracing::info!(
            "Stored payday information and {} performance records ({} current)",
            performance.len(),
            current.len()
        );
        Ok(snapshot)
    }

    async fn classify_and_store_rewards(
        &self,
        ctx: &EpochContext,
        snapshot: &EpochSnapshot,
    ) -> Result<ClassifiedRewards> {
        let events = self
            .node
            .get_block_special_events(&ctx.payday_block.hash)
            .await
            .context("failed to get payday special events")?;
        let rewards = classify_rewards(&ctx.date, ctx.payday_block.slot_time, &events, snapshot)?;
        self.db.upsert_rewards(&rewards.records).await?;
        Ok(rewards)
    }

    async fn store_impacted_addresses(
        &self,
        ctx: &EpochContext,
        rewards: &ClassifiedRewards,
    ) -> Result<usize> {
        let mut ledger = ImpactedAddressLedger::new(&ctx.date, ctx.impacted_block_height());
        ledger.fold_account_rewards(rewards.account_rewards.values());
        let entries = ledger.into_entries();
        self.db.upsert_impacted_addresses(&entries).await?;
        Ok(entries.len())
    }

    /// Load the stored documents of `ids`, creating empty ones for new entities.
    async fn load_intermediates(&self, ids: Vec<EntityId>) -> Result<Vec<ApyIntermediate>> {
        let mut existing: BTreeMap<EntityId, ApyIntermediate> = self
            .db
            .get_apy_intermediates(&ids)
            .await?
            .into_iter()
            .map(|doc| (doc.id.clone(), doc))
            .collect();
        Ok(ids
            .into_iter()
            .map(|id| existing.remove(&id).unwrap_or_else(|| ApyIntermediate::new(id)))
            .collect())
    }

    async fn store_account_daily_apy(
        &self,
        ctx: &EpochContext,
        snapshot: &EpochSnapshot,
        rewards: &ClassifiedRewards,
    ) -> Result<usize> {
        let accounts = snapshot.accounts_needing_apy();
        let stakes = snapshot.stake_by_account();
        let ids = accounts.iter().cloned().map(EntityId::Account).collect();
        let mut docs = self.load_intermediates(ids).await?;

        for (doc, account) in docs.iter_mut().zip(&accounts) {
            let apy = account_daily_apy(
                rewards.account_rewards.get(account),
                stakes.get(account).copied().unwrap_or(0),
                ctx.duration_secs,
            );
            tracing::debug!("Daily apy for {}: {:?}", account, apy);
            doc.record_daily(&ctx.date, DailyApyEntry::Account(apy));
        }

        self.db.upsert_apy_intermediates(&docs).await?;
        Ok(docs.len())
    }

    async fn store_pool_daily_apy(
        &self,
        ctx: &EpochContext,
        snapshot: &EpochSnapshot,
        rewards: &ClassifiedRewards,
    ) -> Result<usize> {
        let pools = snapshot.pools_needing_apy();
        let ids = pools.iter().copied().map(EntityId::from).collect();
        let mut docs = self.load_intermediates(ids).await?;

        for (doc, pool) in docs.iter_mut().zip(&pools) {
            let apy =
                pool_daily_apy(*pool, rewards.pool_rewards.get(pool), snapshot, ctx.duration_secs);
            tracing::debug!("Daily apy for pool {}: {:?}", pool, apy);
            doc.record_daily(&ctx.date, DailyApyEntry::Pool(apy));
        }

        self.db.upsert_apy_intermediates(&docs).await?;
        Ok(docs.len())
    }

    /// Write the 30/90/180 day windows ending at this payday for every entity. Only documents
    /// whose windows changed are written back.
    async fn store_windows(&self, ctx: &EpochContext) -> Result<usize> {
        let dates = self.db.get_payday_dates().await?;
        let index = dates
            .iter()
            .position(|date| date == &ctx.date)
            .with_context(|| format!("payday {} missing from stored paydays", ctx.date))?;

        let mut changed = Vec::new();
        for mut doc in self.db.get_all_apy_intermediates().await? {
            if doc.update_windows(&dates, index) {
                changed.push(doc);
            }
        }

        self.db.upsert_apy_intermediates(&changed).await?;
        Ok(changed.len())
    }
}

fn begin_stage(date: &str, stage: PaydayStage) -> Instant {
    tracing::info!("(Payday: {}) {}...", date, stage);
    Instant::now()
}
