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

//! Payday reward events joined against the epoch snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    snapshot::EpochSnapshot,
    types::{
        AccountAddress, BakerId, BlockSpecialEvent, PaydayAccountReward, PaydayPoolReward,
        PoolId, PoolStatus, PASSIVE_DELEGATION,
    },
};

/// Stored record for a reward paid to an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRewardRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub account_id: AccountAddress,
    pub reward: PaydayAccountReward,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub account_is_delegator: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_target: Option<PoolId>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub account_is_baker: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baker_id: Option<BakerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staked_amount: Option<u64>,
    pub date: String,
    pub slot_time: DateTime<Utc>,
}

/// Stored record for the aggregate reward paid to a pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRewardRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub pool_owner: PoolId,
    pub pool_status: PoolStatus,
    pub reward: PaydayPoolReward,
    pub date: String,
    pub slot_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RewardRecord {
    Account(AccountRewardRecord),
    Pool(PoolRewardRecord),
}

impl RewardRecord {
    pub fn id(&self) -> &str {
        match self {
            RewardRecord::Account(record) => &record.id,
            RewardRecord::Pool(record) => &record.id,
        }
    }

    pub fn date(&self) -> &str {
        match self {
            RewardRecord::Account(record) => &record.date,
            RewardRecord::Pool(record) => &record.date,
        }
    }
}

/// Rewards of one payday, keyed by receiver
#[derive(Debug, Clone, Default)]
pub struct ClassifiedRewards {
    pub account_rewards: BTreeMap<AccountAddress, PaydayAccountReward>,
    pub pool_rewards: BTreeMap<PoolId, PaydayPoolReward>,
    pub records: Vec<RewardRecord>,
}

pub fn account_reward_id(date: &str, account: &AccountAddress) -> String {
    format!("{date}-payday_account_reward-{account}")
}

/// Pool rewards are keyed by the owner's account address, or `passive_delegation`.
pub fn pool_reward_id(date: &str, receiver: &str) -> String {
    format!("{date}-payday_pool_reward-{receiver}")
}

/// Partition the special events of a payday block into account and pool rewards and tag each
/// with the role its receiver played in the completed epoch.
///
/// A receiver may be paid at most once per payday; a second reward for the same account or pool
/// fails the run. Events other than payday rewards are ignored.
pub fn classify_rewards(
    date: &str,
    slot_time: DateTime<Utc>,
    events: &[BlockSpecialEvent],
    snapshot: &EpochSnapshot,
) -> anyhow::Result<ClassifiedRewards> {
    let mut classified = ClassifiedRewards::default();

    for event in events {
        match event {
            BlockSpecialEvent::PaydayAccountReward(reward) => {
                let account = &reward.account;
                if classified.account_rewards.contains_key(account) {
                    anyhow::bail!("duplicate payday account reward for {account} on {date}");
                }

                let mut record = AccountRewardRecord {
                    id: account_reward_id(date, account),
                    account_id: account.clone(),
                    reward: reward.clone(),
                    account_is_delegator: false,
                    delegation_target: None,
                    account_is_baker: false,
                    baker_id: None,
                    staked_amount: None,
                    date: date.to_string(),
                    slot_time,
                };
                if let Some(target) = snapshot.delegation_target(account) {
                    record.account_is_delegator = true;
                    record.delegation_target = Some(target);
                    record.staked_amount = snapshot.delegator_stake(account);
                }
                // Baker accounts use the equity capital frozen for the period as their stake
                if let Some(baker) = snapshot.baker_for_account(account) {
                    record.account_is_baker = true;
                    record.baker_id = Some(baker);
                    record.staked_amount = Some(snapshot.baker_equity_capital(baker));
                }

                classified.account_rewards.insert(account.clone(), reward.clone());
                classified.records.push(RewardRecord::Account(record));
            }
            BlockSpecialEvent::PaydayPoolReward(reward) => {
                let pool = reward.pool_id();
                if classified.pool_rewards.contains_key(&pool) {
                    anyhow::bail!("duplicate payday pool reward for pool {pool} on {date}");
                }

                let (receiver, pool_status) = match pool {
                    PoolId::Baker(baker) => {
                        let Some(info) = snapshot.pool_info(baker) else {
                            anyhow::bail!("payday pool reward for unknown pool {baker} on {date}");
                        };
                        (info.address.to_string(), PoolStatus::Baker(Box::new(info.clone())))
                    }
                    PoolId::Passive => (
                        PASSIVE_DELEGATION.to_string(),
                        PoolStatus::Passive(snapshot.passive_delegation_info.clone()),
                    ),
                };

                classified.pool_rewards.insert(pool, reward.clone());
                classified.records.push(RewardRecord::Pool(PoolRewardRecord {
                    id: pool_reward_id(date, &receiver),
                    pool_owner: pool,
                    pool_status,
                    reward: reward.clone(),
                    date: date.to_string(),
                    slot_time,
                }));
            }
            BlockSpecialEvent::Other => {}
        }
    }

    tracing::debug!(
        "Classified {} account rewards and {} pool rewards for {}",
        classified.account_rewards.len(),
        classified.pool_rewards.len(),
        date
    );

    Ok(classified)
}
