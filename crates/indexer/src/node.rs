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

//! [NodeClient] over the JSON gateway that fronts a ledger node.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use payday_rewards::{
    AccountIdentifier, AccountInfo, BakerId, BlockHash, BlockInfo, BlockSpecialEvent,
    DelegatorRewardPeriodInfo, ElectionInfo, NodeClient, PassiveDelegationInfo, PoolInfo,
};
use serde::de::DeserializeOwned;
use url::Url;

pub struct HttpNodeClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpNodeClient {
    pub fn new(base_url: Url, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build node HTTP client")?;

        // Relative joins only append when the base ends in a slash
        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).with_context(|| format!("invalid node endpoint {path}"))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("node returned an error for {url}"))?;
        response.json::<T>().await.with_context(|| format!("failed to decode response of {url}"))
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn get_block_info(&self, block: &BlockHash) -> Result<BlockInfo> {
        self.get_json(&format!("v1/blocks/{block}/info")).await
    }

    async fn get_blocks_at_height(&self, height: u64) -> Result<Vec<BlockHash>> {
        self.get_json(&format!("v1/blocks/height/{height}")).await
    }

    async fn get_block_special_events(&self, block: &BlockHash) -> Result<Vec<BlockSpecialEvent>> {
        self.get_json(&format!("v1/blocks/{block}/special-events")).await
    }

    async fn get_election_info(&self, block: &BlockHash) -> Result<ElectionInfo> {
        self.get_json(&format!("v1/blocks/{block}/election-info")).await
    }

    async fn get_pool_info_for_pool(&self, baker: BakerId, block: &BlockHash) -> Result<PoolInfo> {
        self.get_json(&format!("v1/blocks/{block}/pools/{baker}")).await
    }

    async fn get_delegators_for_pool_in_reward_period(
        &self,
        baker: BakerId,
        block: &BlockHash,
    ) -> Result<Vec<DelegatorRewardPeriodInfo>> {
        self.get_json(&format!("v1/blocks/{block}/pools/{baker}/reward-period-delegators")).await
    }

    async fn get_delegators_for_passive_delegation_in_reward_period(
        &self,
        block: &BlockHash,
    ) -> Result<Vec<DelegatorRewardPeriodInfo>> {
        self.get_json(&format!("v1/blocks/{block}/passive-delegation/reward-period-delegators"))
            .await
    }

    async fn get_account_info(
        &self,
        block: &BlockHash,
        account: &AccountIdentifier,
    ) -> Result<AccountInfo> {
        let path = match account {
            AccountIdentifier::Index(index) => format!("v1/blocks/{block}/accounts/index/{index}"),
            AccountIdentifier::Address(address) => {
                format!("v1/blocks/{block}/accounts/address/{address}")
            }
        };
        self.get_json(&path).await
    }

    async fn get_passive_delegation_info(
        &self,
        block: &BlockHash,
    ) -> Result<PassiveDelegationInfo> {
        self.get_json(&format!("v1/blocks/{block}/passive-delegation")).await
    }
}
