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

//! Epoch boundaries, the payday information record and per-pool performance records.

use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    snapshot::{EpochSnapshot, PoolSnapshot},
    types::{
        AccountAddress, BakerId, BlockHash, BlockInfo, DelegatorRewardPeriodInfo, OpenStatus,
        PoolId, PoolStatus,
    },
    GENESIS_DURATION_START_HEIGHT, GENESIS_FIRST_HEIGHT,
};

/// Format of payday dates everywhere they are stored or compared
pub const PAYDAY_DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_payday_date(date: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(date, PAYDAY_DATE_FORMAT)
        .with_context(|| format!("invalid payday date {date:?}"))
}

/// The payday before `date` is looked up by calendar date, one day earlier.
pub fn previous_payday_date(date: &str) -> anyhow::Result<String> {
    let previous = parse_payday_date(date)?
        .checked_sub_days(Days::new(1))
        .with_context(|| format!("no day before {date}"))?;
    Ok(previous.format(PAYDAY_DATE_FORMAT).to_string())
}

/// Heights delimiting the reward period that ends at a payday block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochBoundaries {
    pub first_height: u64,
    pub last_height: u64,
    /// Block whose slot time starts the duration measurement
    pub duration_start_height: u64,
}

/// Derive the epoch boundaries from the payday block height and the previous payday, if it
/// was processed. Without one the epoch starts at genesis.
pub fn epoch_boundaries(
    payday_height: u64,
    previous: Option<&PaydayInformation>,
) -> anyhow::Result<EpochBoundaries> {
    let last_height = payday_height
        .checked_sub(1)
        .context("payday block cannot be the genesis block")?;
    let (first_height, duration_start_height) = match previous {
        Some(previous) => (previous.height_for_last_block + 1, previous.height_for_last_block),
        None => (GENESIS_FIRST_HEIGHT, GENESIS_DURATION_START_HEIGHT),
    };
    anyhow::ensure!(
        first_height <= last_height,
        "epoch ending at height {last_height} starts after it, at {first_height}"
    );
    Ok(EpochBoundaries { first_height, last_height, duration_start_height })
}

/// Seconds between the slot times of the block that started the measurement and the last
/// block of the epoch. Must be positive.
pub fn payday_duration_seconds(start: &BlockInfo, last: &BlockInfo) -> anyhow::Result<f64> {
    let seconds = (last.slot_time - start.slot_time).num_milliseconds() as f64 / 1000.0;
    anyhow::ensure!(
        seconds > 0.0,
        "payday duration must be positive, got {seconds}s between heights {} and {}",
        start.height,
        last.height
    );
    Ok(seconds)
}

/// Stored record describing one processed payday
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaydayInformation {
    /// Hash of the payday block
    #[serde(rename = "_id")]
    pub id: BlockHash,
    pub date: String,
    pub height_for_first_block: u64,
    pub height_for_last_block: u64,
    pub hash_for_first_block: BlockHash,
    pub hash_for_last_block: BlockHash,
    pub payday_duration_in_seconds: f64,
    pub payday_block_slot_time: DateTime<Utc>,
    pub bakers_with_delegation_information: BTreeMap<PoolId, Vec<DelegatorRewardPeriodInfo>>,
    pub baker_account_ids: BTreeMap<BakerId, AccountAddress>,
    pub pool_status_for_bakers: BTreeMap<OpenStatus, Vec<BakerId>>,
}

impl PaydayInformation {
    pub fn new(
        date: &str,
        payday_block: &BlockInfo,
        first_block: &BlockInfo,
        last_block: &BlockInfo,
        payday_duration_in_seconds: f64,
        snapshot: &EpochSnapshot,
    ) -> Self {
        Self {
            id: payday_block.hash.clone(),
            date: date.to_string(),
            height_for_first_block: first_block.height,
            height_for_last_block: last_block.height,
            hash_for_first_block: first_block.hash.clone(),
            hash_for_last_block: last_block.hash.clone(),
            payday_duration_in_seconds,
            payday_block_slot_time: payday_block.slot_time,
            bakers_with_delegation_information: snapshot.completed.delegators.clone(),
            baker_account_ids: snapshot.baker_account_ids_by_baker_id.clone(),
            pool_status_for_bakers: snapshot.completed.status_histogram.clone(),
        }
    }
}

/// Stored record of a pool's state and expected block production for a payday
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolPerformanceRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub pool_status: PoolStatus,
    /// Expected number of blocks; absent for the passive pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expectation: Option<f64>,
    pub date: String,
    pub payday_block_slot_time: DateTime<Utc>,
    pub baker_id: PoolId,
}

pub fn performance_id(date: &str, pool: PoolId) -> String {
    format!("{date}-{pool}")
}

fn baker_performance(
    date: &str,
    slot_time: DateTime<Utc>,
    blocks_in_epoch: u64,
    pools: &PoolSnapshot,
) -> Vec<PoolPerformanceRecord> {
    pools
        .pools
        .iter()
        .map(|(baker, info)| {
            let pool = PoolId::Baker(*baker);
            let expectation = info
                .current_payday_info
                .as_ref()
                .map(|current| current.lottery_power * blocks_in_epoch as f64)
                .unwrap_or(0.0);
            PoolPerformanceRecord {
                id: performance_id(date, pool),
                pool_status: PoolStatus::Baker(Box::new(info.clone())),
                expectation: Some(expectation),
                date: date.to_string(),
                payday_block_slot_time: slot_time,
                baker_id: pool,
            }
        })
        .collect()
}

/// Performance records for every pool of the completed epoch, the passive pool included.
pub fn build_pool_performance(
    date: &str,
    slot_time: DateTime<Utc>,
    boundaries: &EpochBoundaries,
    snapshot: &EpochSnapshot,
) -> Vec<PoolPerformanceRecord> {
    let blocks_in_epoch = boundaries.last_height - boundaries.first_height + 1;
    let mut records = baker_performance(date, slot_time, blocks_in_epoch, &snapshot.completed);
    records.push(PoolPerformanceRecord {
        id: performance_id(date, PoolId::Passive),
        pool_status: PoolStatus::Passive(snapshot.passive_delegation_info.clone()),
        expectation: None,
        date: date.to_string(),
        payday_block_slot_time: slot_time,
        baker_id: PoolId::Passive,
    });
    records
}

/// Performance records for the pools of the reward period that just started. Expectations use
/// the completed epoch's length.
pub fn build_current_payday_performance(
    date: &str,
    slot_time: DateTime<Utc>,
    boundaries: &EpochBoundaries,
    snapshot: &EpochSnapshot,
) -> Vec<PoolPerformanceRecord> {
    let blocks_in_epoch = boundaries.last_height - boundaries.first_height + 1;
    baker_performance(date, slot_time, blocks_in_epoch, &snapshot.in_progress)
}
