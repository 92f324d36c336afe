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

//! Payday reward classification and APY computation for proof-of-stake pools.

// Declare modules
pub mod apy;
pub mod classify;
pub mod commission;
pub mod impacted;
pub mod node;
pub mod payday;
pub mod snapshot;
pub mod types;

// Re-export commonly used types
pub use apy::{
    account_daily_apy, daily_apy, period_apy, pool_daily_apy, ApyIntermediate, ApyPeriod,
    DailyApy, DailyApyEntry, PoolDailyApy, WindowApy, DAILY_APY_CALCULATION_TYPE,
};

pub use classify::{
    classify_rewards, AccountRewardRecord, ClassifiedRewards, PoolRewardRecord, RewardRecord,
};

pub use commission::{split_pool_reward, CommissionSplit};

pub use impacted::{BalanceMovement, ImpactedAddress, ImpactedAddressLedger};

pub use node::{get_block_info_at_height, NodeClient};

pub use payday::{
    build_current_payday_performance, build_pool_performance, epoch_boundaries,
    payday_duration_seconds, previous_payday_date, EpochBoundaries, PaydayInformation,
    PoolPerformanceRecord,
};

pub use snapshot::{harvest_epoch_snapshot, EpochSnapshot, PoolSnapshot};

pub use types::*;

/// Seconds in a (365 day) year, the annualization base
pub const SECONDS_PER_YEAR: u64 = 31_536_000;
/// Micro-units per display unit
pub const MICRO_UNITS_PER_UNIT: u64 = 1_000_000;

// Used when no previous payday has been processed.
/// Height of the first block of the first reward period
pub const GENESIS_FIRST_HEIGHT: u64 = 3_232_445;
/// Height whose slot time starts the duration of the first reward period
pub const GENESIS_DURATION_START_HEIGHT: u64 = 3_232_444;
