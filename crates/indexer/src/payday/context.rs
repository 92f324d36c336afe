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

use std::fmt;

use anyhow::{Context, Result};
use payday_rewards::{
    epoch_boundaries, get_block_info_at_height, payday_duration_seconds, previous_payday_date,
    BlockHash, BlockInfo, EpochBoundaries, NodeClient,
};

use crate::db::PaydayIndexerDb;

/// Everything the stages of one payday run share. Built once, read by every stage.
#[derive(Debug, Clone)]
pub struct EpochContext {
    pub date: String,
    pub payday_block: BlockInfo,
    pub first_block: BlockInfo,
    pub last_block: BlockInfo,
    pub boundaries: EpochBoundaries,
    pub duration_secs: f64,
}

impl EpochContext {
    pub async fn init(
        node: &dyn NodeClient,
        db: &(dyn PaydayIndexerDb + Send + Sync),
        date: &str,
        hash: &BlockHash,
    ) -> Result<Self> {
        let previous_date = previous_payday_date(date)?;

        let payday_block = node
            .get_block_info(hash)
            .await
            .with_context(|| format!("failed to get payday block {hash}"))?;
        let previous = db.get_payday_by_date(&previous_date).await?;
        if previous.is_none() {
            tracing::info!(
                "No payday found for {}, measuring {} from genesis",
                previous_date,
                date
            );
        }

        let boundaries = epoch_boundaries(payday_block.height, previous.as_ref())?;
        let first_block = get_block_info_at_height(node, boundaries.first_height).await?;
        let last_block = get_block_info_at_height(node, boundaries.last_height).await?;
        let duration_start =
            get_block_info_at_height(node, boundaries.duration_start_height).await?;
        let duration_secs = payday_duration_seconds(&duration_start, &last_block)?;

        Ok(Self {
            date: date.to_string(),
            payday_block,
            first_block,
            last_block,
            boundaries,
            duration_secs,
        })
    }

    /// Height impacted address entries of this payday are filed under
    pub fn impacted_block_height(&self) -> u64 {
        self.last_block.height + 1
    }
}

/// Steps of a payday run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaydayStage {
    Init,
    Harvest,
    ClassifyRewards,
    FoldImpactedAddresses,
    AccountDailyApy,
    PoolDailyApy,
    Windows,
    Done,
}

impl PaydayStage {
    pub fn step(self) -> u8 {
        match self {
            PaydayStage::Init => 0,
            PaydayStage::Harvest => 1,
            PaydayStage::ClassifyRewards => 2,
            PaydayStage::FoldImpactedAddresses => 3,
            PaydayStage::AccountDailyApy => 4,
            PaydayStage::PoolDailyApy => 5,
            PaydayStage::Windows => 6,
            PaydayStage::Done => 7,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            PaydayStage::Init => "resolve epoch boundaries",
            PaydayStage::Harvest => "store payday information and pool performance",
            PaydayStage::ClassifyRewards => "store payday rewards for accounts and pools",
            PaydayStage::FoldImpactedAddresses => "add rewards to impacted addresses",
            PaydayStage::AccountDailyApy => "daily apy for accounts",
            PaydayStage::PoolDailyApy => "daily apy for pools",
            PaydayStage::Windows => "moving averages",
            PaydayStage::Done => "done",
        }
    }
}

impl fmt::Display for PaydayStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {}: {}", self.step(), self.description())
    }
}
