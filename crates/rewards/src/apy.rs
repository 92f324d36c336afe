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

//! Annualized yield per payday and trailing-window aggregates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    commission::split_pool_reward,
    snapshot::EpochSnapshot,
    types::{EntityId, PaydayAccountReward, PaydayPoolReward, PoolId},
    MICRO_UNITS_PER_UNIT, SECONDS_PER_YEAR,
};

/// Value of `calculation_type` on every intermediate document
pub const DAILY_APY_CALCULATION_TYPE: &str = "daily apy (intermediate value)";

/// Annualize a single period's return.
///
/// `(1 + reward / stake) ^ (SECONDS_PER_YEAR / duration) - 1`, or 0 with no stake.
pub fn daily_apy(reward: f64, stake: u64, duration_secs: f64) -> f64 {
    if stake == 0 || duration_secs <= 0.0 {
        return 0.0;
    }
    (1.0 + reward / stake as f64).powf(SECONDS_PER_YEAR as f64 / duration_secs) - 1.0
}

/// Geometric mean of daily yields: `exp(mean(ln(1 + a))) - 1`. An empty series yields 0.
pub fn period_apy(apys: &[f64]) -> f64 {
    if apys.is_empty() {
        return 0.0;
    }
    let mean = apys.iter().map(|a| a.ln_1p()).sum::<f64>() / apys.len() as f64;
    mean.exp_m1()
}

/// Yield and reward (display denomination) of one entity for one payday
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DailyApy {
    pub apy: f64,
    pub reward: f64,
}

impl DailyApy {
    fn compute(reward_micro: f64, stake: u64, duration_secs: f64) -> Self {
        Self {
            apy: daily_apy(reward_micro, stake, duration_secs),
            reward: reward_micro / MICRO_UNITS_PER_UNIT as f64,
        }
    }
}

/// Daily figures of a pool, split by who earned them
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoolDailyApy {
    pub baker: DailyApy,
    pub total: DailyApy,
    pub delegator: DailyApy,
    /// Only present for the passive delegation pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passive: Option<DailyApy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DailyApyEntry {
    Pool(PoolDailyApy),
    Account(DailyApy),
}

/// Trailing-window aggregate written for one payday date
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowApy {
    pub apy: f64,
    pub sum_of_rewards: f64,
    pub count_of_days: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApyPeriod {
    D30,
    D90,
    D180,
}

impl ApyPeriod {
    pub const ALL: [ApyPeriod; 3] = [ApyPeriod::D30, ApyPeriod::D90, ApyPeriod::D180];

    pub fn days(self) -> usize {
        match self {
            ApyPeriod::D30 => 30,
            ApyPeriod::D90 => 90,
            ApyPeriod::D180 => 180,
        }
    }

    /// Fewest days of data a window needs, 90% of its length rounded up
    pub fn min_days(self) -> usize {
        (self.days() * 9).div_ceil(10)
    }
}

/// Per-entity APY time series as stored in the intermediate collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApyIntermediate {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub calculation_type: String,
    #[serde(default)]
    pub daily_apy_dict: BTreeMap<String, DailyApyEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub d30_apy_dict: BTreeMap<String, WindowApy>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub d90_apy_dict: BTreeMap<String, WindowApy>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub d180_apy_dict: BTreeMap<String, WindowApy>,
}

impl ApyIntermediate {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            calculation_type: DAILY_APY_CALCULATION_TYPE.to_string(),
            daily_apy_dict: BTreeMap::new(),
            d30_apy_dict: BTreeMap::new(),
            d90_apy_dict: BTreeMap::new(),
            d180_apy_dict: BTreeMap::new(),
        }
    }

    /// Set the entry for `date`, replacing a previous value for that date only.
    pub fn record_daily(&mut self, date: &str, entry: DailyApyEntry) {
        self.daily_apy_dict.insert(date.to_string(), entry);
    }

    pub fn window(&self, period: ApyPeriod) -> &BTreeMap<String, WindowApy> {
        match period {
            ApyPeriod::D30 => &self.d30_apy_dict,
            ApyPeriod::D90 => &self.d90_apy_dict,
            ApyPeriod::D180 => &self.d180_apy_dict,
        }
    }

    fn window_mut(&mut self, period: ApyPeriod) -> &mut BTreeMap<String, WindowApy> {
        match period {
            ApyPeriod::D30 => &mut self.d30_apy_dict,
            ApyPeriod::D90 => &mut self.d90_apy_dict,
            ApyPeriod::D180 => &mut self.d180_apy_dict,
        }
    }

    /// The series a window is computed over: the passive figures for the passive pool, the
    /// delegator figures for a baker pool, the account's own figures otherwise.
    fn series_value(&self, entry: &DailyApyEntry) -> Option<DailyApy> {
        match (&self.id, entry) {
            (EntityId::PassiveDelegation, DailyApyEntry::Pool(pool)) => pool.passive,
            (EntityId::Baker(_), DailyApyEntry::Pool(pool)) => Some(pool.delegator),
            (EntityId::Account(_), DailyApyEntry::Account(apy)) => Some(*apy),
            _ => None,
        }
    }

    /// Compute the window ending at `dates[index]`, or `None` when there is not enough history
    /// or the entity has too few days of data in it.
    pub fn compute_window(
        &self,
        dates: &[String],
        index: usize,
        period: ApyPeriod,
    ) -> Option<WindowApy> {
        let days = period.days();
        if index < days || index >= dates.len() {
            return None;
        }
        let series: Vec<DailyApy> = dates[index + 1 - days..=index]
            .iter()
            .filter_map(|date| self.daily_apy_dict.get(date))
            .filter_map(|entry| self.series_value(entry))
            .collect();
        if series.len() < period.min_days() {
            return None;
        }
        let apys: Vec<f64> = series.iter().map(|d| d.apy).collect();
        Some(WindowApy {
            apy: period_apy(&apys),
            sum_of_rewards: series.iter().map(|d| d.reward).sum(),
            count_of_days: series.len(),
        })
    }

    /// Write the windows ending at `dates[index]`. Returns whether any stored window changed.
    pub fn update_windows(&mut self, dates: &[String], index: usize) -> bool {
        let Some(date) = dates.get(index) else {
            return false;
        };
        let mut changed = false;
        for period in ApyPeriod::ALL {
            if let Some(window) = self.compute_window(dates, index, period) {
                let previous = self.window_mut(period).insert(date.clone(), window);
                changed |= previous != Some(window);
            }
        }
        changed
    }
}

/// Daily figures of a baker or delegator account for one payday.
pub fn account_daily_apy(
    reward: Option<&PaydayAccountReward>,
    stake: u64,
    duration_secs: f64,
) -> DailyApy {
    match reward {
        Some(reward) => DailyApy::compute(reward.total() as f64, stake, duration_secs),
        None => DailyApy::default(),
    }
}

/// Daily figures of a pool for one payday.
///
/// The baker and delegator figures come from the commission split of the pool reward, the
/// delegator figure only when the pool had delegators in the completed period.
pub fn pool_daily_apy(
    pool: PoolId,
    reward: Option<&PaydayPoolReward>,
    snapshot: &EpochSnapshot,
    duration_secs: f64,
) -> PoolDailyApy {
    let baker = match pool {
        PoolId::Passive => {
            let passive = reward
                .map(|reward| {
                    DailyApy::compute(
                        reward.total() as f64,
                        snapshot.passive_delegation_info.current_payday_delegated_capital,
                        duration_secs,
                    )
                })
                .unwrap_or_default();
            return PoolDailyApy { passive: Some(passive), ..Default::default() };
        }
        PoolId::Baker(baker) => baker,
    };

    let (Some(reward), Some(info)) = (reward, snapshot.pool_info(baker)) else {
        return PoolDailyApy::default();
    };
    let (effective_stake, equity_capital, delegated_capital) = info
        .current_payday_info
        .as_ref()
        .map(|c| (c.effective_stake, c.baker_equity_capital, c.delegated_capital))
        .unwrap_or_default();

    let split = split_pool_reward(
        reward,
        &info.pool_info.commission_rates,
        delegated_capital,
        effective_stake,
    );

    let delegator = if snapshot.delegator_count(pool) > 0 {
        DailyApy::compute(split.delegators, delegated_capital, duration_secs)
    } else {
        DailyApy::default()
    };

    PoolDailyApy {
        baker: DailyApy::compute(split.baker, equity_capital, duration_secs),
        total: DailyApy::compute(split.total, effective_stake, duration_secs),
        delegator,
        passive: None,
    }
}
