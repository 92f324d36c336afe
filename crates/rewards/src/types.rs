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

//! Ledger data types returned by the node and the identifiers used to key them.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Serialized form of the passive delegation pool wherever an id is expected.
pub const PASSIVE_DELEGATION: &str = "passive_delegation";

/// Hex encoded block hash
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(pub String);

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockHash {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Baker id. On this ledger it equals the account index of the baker's account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BakerId(pub u64);

impl fmt::Display for BakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Base58 account address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountAddress(pub String);

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountAddress {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A staking pool: either a baker's own pool or the passive delegation pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PoolId {
    Baker(BakerId),
    Passive,
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolId::Baker(baker) => write!(f, "{baker}"),
            PoolId::Passive => f.write_str(PASSIVE_DELEGATION),
        }
    }
}

impl FromStr for PoolId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == PASSIVE_DELEGATION {
            return Ok(PoolId::Passive);
        }
        let id = s.parse::<u64>().map_err(|e| anyhow::anyhow!("invalid pool id {s:?}: {e}"))?;
        Ok(PoolId::Baker(BakerId(id)))
    }
}

/// Any entity an APY time series is kept for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityId {
    Account(AccountAddress),
    Baker(BakerId),
    PassiveDelegation,
}

impl From<PoolId> for EntityId {
    fn from(pool: PoolId) -> Self {
        match pool {
            PoolId::Baker(baker) => EntityId::Baker(baker),
            PoolId::Passive => EntityId::PassiveDelegation,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Account(address) => write!(f, "{address}"),
            EntityId::Baker(baker) => write!(f, "{baker}"),
            EntityId::PassiveDelegation => f.write_str(PASSIVE_DELEGATION),
        }
    }
}

impl FromStr for EntityId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            anyhow::bail!("empty entity id");
        }
        if s == PASSIVE_DELEGATION {
            Ok(EntityId::PassiveDelegation)
        } else if s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(EntityId::Baker(BakerId(s.parse()?)))
        } else {
            Ok(EntityId::Account(AccountAddress(s.to_string())))
        }
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

string_serde!(PoolId);
string_serde!(EntityId);

/// Block metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub hash: BlockHash,
    pub height: u64,
    pub slot_time: DateTime<Utc>,
}

/// Reward paid to a single account at a payday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaydayAccountReward {
    pub account: AccountAddress,
    pub transaction_fees: u64,
    pub baker_reward: u64,
    pub finalization_reward: u64,
}

impl PaydayAccountReward {
    pub fn total(&self) -> u64 {
        self.baker_reward + self.finalization_reward + self.transaction_fees
    }
}

/// Aggregate reward paid to a pool at a payday, before the commission split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaydayPoolReward {
    /// `None` for the passive delegation pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_owner: Option<BakerId>,
    pub transaction_fees: u64,
    pub baker_reward: u64,
    pub finalization_reward: u64,
}

impl PaydayPoolReward {
    pub fn total(&self) -> u64 {
        self.baker_reward + self.finalization_reward + self.transaction_fees
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_owner.map(PoolId::Baker).unwrap_or(PoolId::Passive)
    }
}

/// Special (non-transaction) events recorded in a block. Only payday rewards matter here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockSpecialEvent {
    PaydayAccountReward(PaydayAccountReward),
    PaydayPoolReward(PaydayPoolReward),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BakerElectionInfo {
    pub baker: BakerId,
    pub account: AccountAddress,
    pub lottery_power: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionInfo {
    pub baker_election_info: Vec<BakerElectionInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpenStatus {
    OpenForAll,
    ClosedForNew,
    ClosedForAll,
}

/// Commission fractions in `[0, 1]`, one per reward category.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CommissionRates {
    pub baking: f64,
    pub transaction: f64,
    pub finalization: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BakerPoolInfo {
    pub open_status: OpenStatus,
    #[serde(default)]
    pub metadata_url: String,
    pub commission_rates: CommissionRates,
}

/// Pool figures frozen for the running reward period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPaydayStatus {
    pub blocks_baked: u64,
    pub finalization_live: bool,
    pub transaction_fees_earned: u64,
    pub effective_stake: u64,
    pub lottery_power: f64,
    pub baker_equity_capital: u64,
    pub delegated_capital: u64,
    pub commission_rates: CommissionRates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub baker: BakerId,
    pub address: AccountAddress,
    pub equity_capital: u64,
    pub delegated_capital: u64,
    pub delegated_capital_cap: u64,
    pub pool_info: BakerPoolInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_payday_info: Option<CurrentPaydayStatus>,
    pub all_pool_total_capital: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveDelegationInfo {
    pub delegated_capital: u64,
    pub commission_rates: CommissionRates,
    pub current_payday_transaction_fees_earned: u64,
    pub current_payday_delegated_capital: u64,
    pub all_pool_total_capital: u64,
}

/// Pool state snapshot attached to performance and reward records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PoolStatus {
    Baker(Box<PoolInfo>),
    Passive(PassiveDelegationInfo),
}

/// Stake change scheduled to take effect at a later payday
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingChange {
    Reduce { new_stake: u64, effective_time: DateTime<Utc> },
    Remove { effective_time: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatorRewardPeriodInfo {
    pub account: AccountAddress,
    pub stake: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_change: Option<PendingChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub address: AccountAddress,
    pub index: u64,
    pub amount: u64,
}

/// How to look up an account on the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountIdentifier {
    Index(u64),
    Address(AccountAddress),
}

impl fmt::Display for AccountIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountIdentifier::Index(index) => write!(f, "{index}"),
            AccountIdentifier::Address(address) => write!(f, "{address}"),
        }
    }
}
