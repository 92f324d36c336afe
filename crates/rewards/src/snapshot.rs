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

//! Point-in-time staking state for a payday: pools, delegators and account lookups.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Context;
use futures_util::future::try_join_all;

use crate::{
    node::NodeClient,
    types::{
        AccountAddress, AccountIdentifier, AccountInfo, BakerId, BlockHash,
        DelegatorRewardPeriodInfo, OpenStatus, PassiveDelegationInfo, PoolId, PoolInfo,
    },
};

/// Pools and their delegators as seen at one block
#[derive(Debug, Clone, Default)]
pub struct PoolSnapshot {
    /// Pool info by baker id
    pub pools: BTreeMap<BakerId, PoolInfo>,
    /// Delegators by pool, including the passive pool when it was harvested
    pub delegators: BTreeMap<PoolId, Vec<DelegatorRewardPeriodInfo>>,
    /// Baker ids grouped by pool open status
    pub status_histogram: BTreeMap<OpenStatus, Vec<BakerId>>,
}

impl PoolSnapshot {
    pub fn new(
        entries: impl IntoIterator<Item = (BakerId, PoolInfo, Vec<DelegatorRewardPeriodInfo>)>,
    ) -> Self {
        let mut snapshot = PoolSnapshot::default();
        for (baker, pool, delegators) in entries {
            snapshot.delegators.insert(PoolId::Baker(baker), delegators);
            snapshot.pools.insert(baker, pool);
        }
        for (baker, pool) in &snapshot.pools {
            snapshot.status_histogram.entry(pool.pool_info.open_status).or_default().push(*baker);
        }
        snapshot
    }
}

/// Everything the pipeline knows about the staking state of one payday.
///
/// `completed` is taken at the last block of the finished reward period and drives all
/// reward and APY calculations. `in_progress` is taken at the payday block itself and only
/// feeds the "current payday" performance mirror.
#[derive(Debug, Clone)]
pub struct EpochSnapshot {
    pub completed: PoolSnapshot,
    pub in_progress: PoolSnapshot,
    pub account_info_by_baker_id: BTreeMap<BakerId, AccountInfo>,
    pub baker_account_ids_by_baker_id: BTreeMap<BakerId, AccountAddress>,
    pub baker_ids_by_account_id: BTreeMap<AccountAddress, BakerId>,
    pub passive_delegation_info: PassiveDelegationInfo,
    delegation_target_by_account: BTreeMap<AccountAddress, PoolId>,
    delegator_stake_by_account: BTreeMap<AccountAddress, u64>,
}

impl EpochSnapshot {
    /// Baker accounts are taken from `account_info_by_baker_id`, falling back to the pool
    /// address for bakers without account info.
    pub fn new(
        mut completed: PoolSnapshot,
        in_progress: PoolSnapshot,
        account_info_by_baker_id: BTreeMap<BakerId, AccountInfo>,
        passive_delegators: Vec<DelegatorRewardPeriodInfo>,
        passive_delegation_info: PassiveDelegationInfo,
    ) -> Self {
        completed.delegators.insert(PoolId::Passive, passive_delegators);

        let mut baker_account_ids_by_baker_id = BTreeMap::new();
        let mut baker_ids_by_account_id = BTreeMap::new();
        for (baker, pool) in &completed.pools {
            let address = account_info_by_baker_id
                .get(baker)
                .map(|info| &info.address)
                .unwrap_or(&pool.address);
            baker_account_ids_by_baker_id.insert(*baker, address.clone());
            baker_ids_by_account_id.insert(address.clone(), *baker);
        }

        let mut delegation_target_by_account = BTreeMap::new();
        let mut delegator_stake_by_account = BTreeMap::new();
        for (pool, delegators) in &completed.delegators {
            for delegator in delegators {
                delegation_target_by_account.entry(delegator.account.clone()).or_insert(*pool);
                delegator_stake_by_account.insert(delegator.account.clone(), delegator.stake);
            }
        }

        Self {
            completed,
            in_progress,
            account_info_by_baker_id,
            baker_account_ids_by_baker_id,
            baker_ids_by_account_id,
            passive_delegation_info,
            delegation_target_by_account,
            delegator_stake_by_account,
        }
    }

    /// Pool the account delegated to during the completed period, if any
    pub fn delegation_target(&self, account: &AccountAddress) -> Option<PoolId> {
        self.delegation_target_by_account.get(account).copied()
    }

    pub fn delegator_stake(&self, account: &AccountAddress) -> Option<u64> {
        self.delegator_stake_by_account.get(account).copied()
    }

    pub fn baker_for_account(&self, account: &AccountAddress) -> Option<BakerId> {
        self.baker_ids_by_account_id.get(account).copied()
    }

    pub fn pool_info(&self, baker: BakerId) -> Option<&PoolInfo> {
        self.completed.pools.get(&baker)
    }

    /// Equity capital of the baker for the completed period, 0 if the pool has no payday info.
    pub fn baker_equity_capital(&self, baker: BakerId) -> u64 {
        self.pool_info(baker)
            .and_then(|pool| pool.current_payday_info.as_ref())
            .map(|info| info.baker_equity_capital)
            .unwrap_or(0)
    }

    /// Number of delegators fixed for the pool in the completed period
    pub fn delegator_count(&self, pool: PoolId) -> usize {
        self.completed.delegators.get(&pool).map(Vec::len).unwrap_or(0)
    }

    /// Stake each eligible account earned on: its delegated stake, or for baker accounts
    /// the baker's equity capital.
    pub fn stake_by_account(&self) -> BTreeMap<AccountAddress, u64> {
        let mut stakes = self.delegator_stake_by_account.clone();
        for (baker, account) in &self.baker_account_ids_by_baker_id {
            stakes.insert(account.clone(), self.baker_equity_capital(*baker));
        }
        stakes
    }

    /// All delegator and baker accounts; each gets a daily APY entry for this payday.
    pub fn accounts_needing_apy(&self) -> BTreeSet<AccountAddress> {
        self.delegator_stake_by_account
            .keys()
            .chain(self.baker_account_ids_by_baker_id.values())
            .cloned()
            .collect()
    }

    /// All pools, the passive pool included; each gets a daily APY entry for this payday.
    pub fn pools_needing_apy(&self) -> Vec<PoolId> {
        self.completed.delegators.keys().copied().collect()
    }
}

/// Pull the staking state for a payday from the node.
///
/// Per-baker queries run concurrently in chunks of `concurrency`; the resulting maps are keyed
/// by id so completion order does not affect the snapshot.
pub async fn harvest_epoch_snapshot<C: NodeClient + ?Sized>(
    client: &C,
    last_block: &BlockHash,
    payday_block: &BlockHash,
    concurrency: usize,
) -> anyhow::Result<EpochSnapshot> {
    let concurrency = concurrency.max(1);
    let harvest_start = std::time::Instant::now();

    let completed_bakers: Vec<BakerId> = client
        .get_election_info(last_block)
        .await
        .with_context(|| format!("failed to get election info at {last_block}"))?
        .baker_election_info
        .into_iter()
        .map(|info| info.baker)
        .collect();
    tracing::info!(
        "Harvesting {} bakers at last block of payday {}",
        completed_bakers.len(),
        last_block
    );

    let mut account_info_by_baker_id = BTreeMap::new();
    let mut completed_entries = Vec::with_capacity(completed_bakers.len());
    for chunk in completed_bakers.chunks(concurrency) {
        let futures = chunk.iter().map(|&baker| async move {
            let account = client
                .get_account_info(last_block, &AccountIdentifier::Index(baker.0))
                .await
                .with_context(|| format!("failed to get account info for baker {baker}"))?;
            let pool = client
                .get_pool_info_for_pool(baker, last_block)
                .await
                .with_context(|| format!("failed to get pool info for baker {baker}"))?;
            let delegators = client
                .get_delegators_for_pool_in_reward_period(baker, last_block)
                .await
                .with_context(|| format!("failed to get delegators for baker {baker}"))?;
            Ok::<_, anyhow::Error>((baker, account, pool, delegators))
        });
        for (baker, account, pool, delegators) in try_join_all(futures).await? {
            account_info_by_baker_id.insert(baker, account);
            completed_entries.push((baker, pool, delegators));
        }
    }

    let in_progress_bakers: Vec<BakerId> = client
        .get_election_info(payday_block)
        .await
        .with_context(|| format!("failed to get election info at {payday_block}"))?
        .baker_election_info
        .into_iter()
        .map(|info| info.baker)
        .collect();
    tracing::info!(
        "Harvesting {} bakers at payday block {} for the current payday",
        in_progress_bakers.len(),
        payday_block
    );

    let mut in_progress_entries = Vec::with_capacity(in_progress_bakers.len());
    for chunk in in_progress_bakers.chunks(concurrency) {
        let futures = chunk.iter().map(|&baker| async move {
            let pool = client
                .get_pool_info_for_pool(baker, payday_block)
                .await
                .with_context(|| format!("failed to get current pool info for baker {baker}"))?;
            let delegators = client
                .get_delegators_for_pool_in_reward_period(baker, payday_block)
                .await
                .with_context(|| format!("failed to get current delegators for baker {baker}"))?;
            Ok::<_, anyhow::Error>((baker, pool, delegators))
        });
        in_progress_entries.extend(try_join_all(futures).await?);
    }

    let passive_delegators = client
        .get_delegators_for_passive_delegation_in_reward_period(last_block)
        .await
        .context("failed to get passive delegators")?;
    let passive_delegation_info = client
        .get_passive_delegation_info(last_block)
        .await
        .context("failed to get passive delegation info")?;

    tracing::info!(
        "Snapshot harvested in {:.2}s ({} passive delegators)",
        harvest_start.elapsed().as_secs_f64(),
        passive_delegators.len()
    );

    Ok(EpochSnapshot::new(
        PoolSnapshot::new(completed_entries),
        PoolSnapshot::new(in_progress_entries),
        account_info_by_baker_id,
        passive_delegators,
        passive_delegation_info,
    ))
}
