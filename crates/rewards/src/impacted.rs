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

//! Balance movements per address caused by a payday.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{AccountAddress, PaydayAccountReward};

/// Length of the canonical address prefix; aliases of one account share it.
pub const CANONICAL_ADDRESS_LEN: usize = 29;

/// Effect type of every entry this ledger produces
pub const ACCOUNT_REWARD_EFFECT: &str = "Account Reward";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatementTransfer {
    pub amount: u64,
    pub counterparty: String,
}

/// A change to an account balance. Absent fields are not part of the movement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalanceMovement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_in: Option<Vec<AccountStatementTransfer>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_out: Option<Vec<AccountStatementTransfer>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_encrypted: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_decrypted: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baker_reward: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalization_reward: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foundation_reward: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_fee_reward: Option<u64>,
}

impl BalanceMovement {
    /// Movement recorded for a payday account reward
    pub fn from_account_reward(reward: &PaydayAccountReward) -> Self {
        Self {
            transaction_fee_reward: Some(reward.transaction_fees),
            baker_reward: Some(reward.baker_reward),
            finalization_reward: Some(reward.finalization_reward),
            ..Default::default()
        }
    }

    /// Fold `other` into `self`: transfer lists are appended, scalars present on `other`
    /// replace ours, everything else is kept.
    pub fn merge(&mut self, other: BalanceMovement) {
        fn extend(
            into: &mut Option<Vec<AccountStatementTransfer>>,
            from: Option<Vec<AccountStatementTransfer>>,
        ) {
            if let Some(from) = from {
                into.get_or_insert_with(Vec::new).extend(from);
            }
        }

        extend(&mut self.transfer_in, other.transfer_in);
        extend(&mut self.transfer_out, other.transfer_out);

        for (into, from) in [
            (&mut self.amount_encrypted, other.amount_encrypted),
            (&mut self.amount_decrypted, other.amount_decrypted),
            (&mut self.baker_reward, other.baker_reward),
            (&mut self.finalization_reward, other.finalization_reward),
            (&mut self.foundation_reward, other.foundation_reward),
            (&mut self.transaction_fee_reward, other.transaction_fee_reward),
        ] {
            if from.is_some() {
                *into = from;
            }
        }
    }
}

/// Stored record of one address affected at one block height
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactedAddress {
    #[serde(rename = "_id")]
    pub id: String,
    pub impacted_address: AccountAddress,
    pub impacted_address_canonical: String,
    pub effect_type: String,
    pub balance_movement: BalanceMovement,
    pub block_height: u64,
    pub date: String,
}

pub fn canonical_address(address: &AccountAddress) -> String {
    address.0.chars().take(CANONICAL_ADDRESS_LEN).collect()
}

pub fn impacted_address_id(block_height: u64, address: &AccountAddress) -> String {
    format!("{block_height}-{}", canonical_address(address))
}

/// Collects the balance movements of one payday, one record per canonical address. Aliases of
/// an account share a canonical address and so merge into one record.
#[derive(Debug, Clone)]
pub struct ImpactedAddressLedger {
    date: String,
    block_height: u64,
    entries: BTreeMap<String, ImpactedAddress>,
}

impl ImpactedAddressLedger {
    pub fn new(date: &str, block_height: u64) -> Self {
        Self { date: date.to_string(), block_height, entries: BTreeMap::new() }
    }

    /// Record a movement for `address`, merging into its existing record if there is one.
    pub fn file_movement(&mut self, address: &AccountAddress, movement: BalanceMovement) {
        let id = impacted_address_id(self.block_height, address);
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.balance_movement.merge(movement);
            return;
        }
        self.entries.insert(
            id.clone(),
            ImpactedAddress {
                id,
                impacted_address: address.clone(),
                impacted_address_canonical: canonical_address(address),
                effect_type: ACCOUNT_REWARD_EFFECT.to_string(),
                balance_movement: movement,
                block_height: self.block_height,
                date: self.date.clone(),
            },
        );
    }

    pub fn fold_account_rewards<'a>(
        &mut self,
        rewards: impl IntoIterator<Item = &'a PaydayAccountReward>,
    ) {
        for reward in rewards {
            self.file_movement(&reward.account, BalanceMovement::from_account_reward(reward));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<ImpactedAddress> {
        self.entries.into_values().collect()
    }
}
