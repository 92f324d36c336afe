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

//! Splitting a pool's payday reward between the baker and its delegators.

use crate::types::{CommissionRates, PaydayPoolReward};

/// Pool reward apportioned between baker and delegators, in micro-units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommissionSplit {
    pub total: f64,
    pub baker: f64,
    pub delegators: f64,
}

/// Split a pool reward by commission rates and the delegated share of the effective stake.
///
/// Each reward component is split on its own rate before summing. Delegators keep
/// `(1 - rate)` of their proportional share; the baker gets the rest. A pool with no
/// effective stake pays nothing to delegators.
pub fn split_pool_reward(
    reward: &PaydayPoolReward,
    rates: &CommissionRates,
    delegated_capital: u64,
    effective_stake: u64,
) -> CommissionSplit {
    let delegator_ratio = if effective_stake == 0 {
        0.0
    } else {
        delegated_capital as f64 / effective_stake as f64
    };

    let share = |rate: f64, component: u64| (1.0 - rate) * delegator_ratio * component as f64;

    let delegators = share(rates.transaction, reward.transaction_fees)
        + share(rates.baking, reward.baker_reward)
        + share(rates.finalization, reward.finalization_reward);
    let total = reward.total() as f64;

    CommissionSplit { total, baker: total - delegators, delegators }
}
