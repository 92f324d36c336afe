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

//! Read-only view of the ledger node used by the payday pipeline.

use anyhow::Context;
use async_trait::async_trait;

use crate::types::{
    AccountIdentifier, AccountInfo, BakerId, BlockHash, BlockInfo, BlockSpecialEvent,
    DelegatorRewardPeriodInfo, ElectionInfo, PassiveDelegationInfo, PoolInfo,
};

/// Queries the pipeline needs from a ledger node. Every call may fail; failures abort the
/// payday run that issued them.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Block metadata for the given block hash
    async fn get_block_info(&self, block: &BlockHash) -> anyhow::Result<BlockInfo>;

    /// Hashes of all blocks at the given height
    async fn get_blocks_at_height(&self, height: u64) -> anyhow::Result<Vec<BlockHash>>;

    /// Special events (rewards, mints) recorded in a block
    async fn get_block_special_events(
        &self,
        block: &BlockHash,
    ) -> anyhow::Result<Vec<BlockSpecialEvent>>;

    /// Bakers elected for the reward period the block belongs to
    async fn get_election_info(&self, block: &BlockHash) -> anyhow::Result<ElectionInfo>;

    /// Pool status of a baker at a block
    async fn get_pool_info_for_pool(
        &self,
        baker: BakerId,
        block: &BlockHash,
    ) -> anyhow::Result<PoolInfo>;

    /// Delegators of a baker's pool that are fixed for the reward period of the block
    async fn get_delegators_for_pool_in_reward_period(
        &self,
        baker: BakerId,
        block: &BlockHash,
    ) -> anyhow::Result<Vec<DelegatorRewardPeriodInfo>>;

    /// Passive delegators that are fixed for the reward period of the block
    async fn get_delegators_for_passive_delegation_in_reward_period(
        &self,
        block: &BlockHash,
    ) -> anyhow::Result<Vec<DelegatorRewardPeriodInfo>>;

    /// Account state at a block
    async fn get_account_info(
        &self,
        block: &BlockHash,
        account: &AccountIdentifier,
    ) -> anyhow::Result<AccountInfo>;

    /// Passive delegation pool status at a block
    async fn get_passive_delegation_info(
        &self,
        block: &BlockHash,
    ) -> anyhow::Result<PassiveDelegationInfo>;
}

/// Resolve the (first) block at `height` and fetch its metadata.
pub async fn get_block_info_at_height<C: NodeClient + ?Sized>(
    client: &C,
    height: u64,
) -> anyhow::Result<BlockInfo> {
    let hashes = client
        .get_blocks_at_height(height)
        .await
        .with_context(|| format!("failed to get blocks at height {height}"))?;
    let hash =
        hashes.into_iter().next().with_context(|| format!("no block found at height {height}"))?;
    client.get_block_info(&hash).await.with_context(|| format!("failed to get block info {hash}"))
}
