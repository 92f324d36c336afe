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

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use payday_indexer::{
    db::{PaydayDb, PaydayDbObj},
    notifier::NotificationSink,
    payday::{PaydayService, PaydayServiceConfig},
};
use payday_rewards::{
    AccountAddress, AccountIdentifier, AccountInfo, BakerElectionInfo, BakerId, BakerPoolInfo,
    BlockHash, BlockInfo, BlockSpecialEvent, CommissionRates, CurrentPaydayStatus,
    DelegatorRewardPeriodInfo, ElectionInfo, NodeClient, OpenStatus, PassiveDelegationInfo,
    PaydayAccountReward, PaydayPoolReward, PoolInfo, GENESIS_DURATION_START_HEIGHT,
};
use tempfile::NamedTempFile;

/// Blocks per reward period on the fake ledger
pub const BLOCKS_PER_PAYDAY: u64 = 100;
/// One reward period lasts exactly a day
pub const SECONDS_PER_BLOCK: i64 = 864;
pub const DAY_SECS: f64 = 86_400.0;

/// Date of the k-th payday, one per day from 2024-01-01
pub fn payday_date(k: u64) -> String {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (start + Duration::days(k as i64)).to_string()
}

/// Height of the last block of the k-th reward period
pub fn last_height(k: u64) -> u64 {
    GENESIS_DURATION_START_HEIGHT + (k + 1) * BLOCKS_PER_PAYDAY
}

/// The block after the last block of a period pays out its rewards
pub fn payday_hash(k: u64) -> BlockHash {
    block_hash(last_height(k) + 1)
}

pub fn block_hash(height: u64) -> BlockHash {
    BlockHash(format!("block-{height}"))
}

fn height_of(hash: &BlockHash) -> Result<u64> {
    hash.0
        .strip_prefix("block-")
        .with_context(|| format!("unknown block {hash}"))?
        .parse()
        .with_context(|| format!("unknown block {hash}"))
}

fn slot_time(height: u64) -> DateTime<Utc> {
    let genesis = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
    genesis + Duration::seconds((height - GENESIS_DURATION_START_HEIGHT) as i64 * SECONDS_PER_BLOCK)
}

pub fn account(address: &str) -> AccountAddress {
    AccountAddress::from(address)
}

pub fn delegator(address: &str, stake: u64) -> DelegatorRewardPeriodInfo {
    DelegatorRewardPeriodInfo { account: account(address), stake, pending_change: None }
}

/// Open pool with 10% baking and transaction commission
pub fn pool(baker: u64, address: &str, equity: u64, delegated: u64) -> PoolInfo {
    let commission_rates = CommissionRates { baking: 0.1, transaction: 0.1, finalization: 1.0 };
    PoolInfo {
        baker: BakerId(baker),
        address: account(address),
        equity_capital: equity,
        delegated_capital: delegated,
        delegated_capital_cap: equity * 3,
        pool_info: BakerPoolInfo {
            open_status: OpenStatus::OpenForAll,
            metadata_url: String::new(),
            commission_rates,
        },
        current_payday_info: Some(CurrentPaydayStatus {
            blocks_baked: BLOCKS_PER_PAYDAY,
            finalization_live: true,
            transaction_fees_earned: 0,
            effective_stake: equity + delegated,
            lottery_power: 1.0,
            baker_equity_capital: equity,
            delegated_capital: delegated,
            commission_rates,
        }),
        all_pool_total_capital: equity + delegated,
    }
}

pub fn passive_info(delegated: u64) -> PassiveDelegationInfo {
    PassiveDelegationInfo {
        delegated_capital: delegated,
        commission_rates: CommissionRates { baking: 0.12, transaction: 0.12, finalization: 1.0 },
        current_payday_transaction_fees_earned: 0,
        current_payday_delegated_capital: delegated,
        all_pool_total_capital: 0,
    }
}

pub fn account_reward(address: &str, baker_reward: u64) -> BlockSpecialEvent {
    BlockSpecialEvent::PaydayAccountReward(PaydayAccountReward {
        account: account(address),
        transaction_fees: 0,
        baker_reward,
        finalization_reward: 0,
    })
}

pub fn pool_reward(owner: Option<u64>, baker_reward: u64) -> BlockSpecialEvent {
    BlockSpecialEvent::PaydayPoolReward(PaydayPoolReward {
        pool_owner: owner.map(BakerId),
        transaction_fees: 0,
        baker_reward,
        finalization_reward: 0,
    })
}

/// In-memory ledger with a fixed set of pools. Every height has exactly one block and rewards
/// are paid in the blocks registered with [FakeLedger::set_payday_events].
pub struct FakeLedger {
    pools: BTreeMap<BakerId, (PoolInfo, Vec<DelegatorRewardPeriodInfo>)>,
    passive_delegators: Vec<DelegatorRewardPeriodInfo>,
    passive: PassiveDelegationInfo,
    events: Mutex<HashMap<BlockHash, Vec<BlockSpecialEvent>>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self {
            pools: BTreeMap::new(),
            passive_delegators: Vec::new(),
            passive: passive_info(0),
            events: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_pool(mut self, pool: PoolInfo, delegators: Vec<DelegatorRewardPeriodInfo>) -> Self {
        self.pools.insert(pool.baker, (pool, delegators));
        self
    }

    pub fn with_passive(mut self, delegators: Vec<DelegatorRewardPeriodInfo>) -> Self {
        self.passive = passive_info(delegators.iter().map(|d| d.stake).sum());
        self.passive_delegators = delegators;
        self
    }

    pub fn set_payday_events(&self, k: u64, events: Vec<BlockSpecialEvent>) {
        self.events.lock().unwrap().insert(payday_hash(k), events);
    }

    fn pool_entry(&self, baker: BakerId) -> Result<&(PoolInfo, Vec<DelegatorRewardPeriodInfo>)> {
        self.pools.get(&baker).with_context(|| format!("unknown baker {baker}"))
    }
}

#[async_trait]
impl NodeClient for FakeLedger {
    async fn get_block_info(&self, block: &BlockHash) -> Result<BlockInfo> {
        let height = height_of(block)?;
        Ok(BlockInfo { hash: block.clone(), height, slot_time: slot_time(height) })
    }

    async fn get_blocks_at_height(&self, height: u64) -> Result<Vec<BlockHash>> {
        Ok(vec![block_hash(height)])
    }

    async fn get_block_special_events(&self, block: &BlockHash) -> Result<Vec<BlockSpecialEvent>> {
        Ok(self.events.lock().unwrap().get(block).cloned().unwrap_or_default())
    }

    async fn get_election_info(&self, block: &BlockHash) -> Result<ElectionInfo> {
        height_of(block)?;
        let baker_election_info = self
            .pools
            .values()
            .map(|(pool, _)| BakerElectionInfo {
                baker: pool.baker,
                account: pool.address.clone(),
                lottery_power: 1.0 / self.pools.len() as f64,
            })
            .collect();
        Ok(ElectionInfo { baker_election_info })
    }

    async fn get_pool_info_for_pool(&self, baker: BakerId, _block: &BlockHash) -> Result<PoolInfo> {
        Ok(self.pool_entry(baker)?.0.clone())
    }

    async fn get_delegators_for_pool_in_reward_period(
        &self,
        baker: BakerId,
        _block: &BlockHash,
    ) -> Result<Vec<DelegatorRewardPeriodInfo>> {
        Ok(self.pool_entry(baker)?.1.clone())
    }

    async fn get_delegators_for_passive_delegation_in_reward_period(
        &self,
        _block: &BlockHash,
    ) -> Result<Vec<DelegatorRewardPeriodInfo>> {
        Ok(self.passive_delegators.clone())
    }

    async fn get_account_info(
        &self,
        _block: &BlockHash,
        account: &AccountIdentifier,
    ) -> Result<AccountInfo> {
        let pool = self
            .pools
            .values()
            .map(|(pool, _)| pool)
            .find(|pool| match account {
                AccountIdentifier::Index(index) => pool.baker.0 == *index,
                AccountIdentifier::Address(address) => &pool.address == address,
            })
            .with_context(|| format!("unknown account {account}"))?;
        Ok(AccountInfo {
            address: pool.address.clone(),
            index: pool.baker.0,
            amount: pool.equity_capital,
        })
    }

    async fn get_passive_delegation_info(
        &self,
        _block: &BlockHash,
    ) -> Result<PassiveDelegationInfo> {
        Ok(self.passive.clone())
    }
}

/// Keeps every message it is sent
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn try_send(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

pub struct TestHarness {
    pub ledger: Arc<FakeLedger>,
    pub db: PaydayDbObj,
    pub notifier: Arc<RecordingNotifier>,
    pub service: PaydayService,
    _temp_file: NamedTempFile, // Kept alive as long as the harness exists
}

impl TestHarness {
    pub async fn new(ledger: FakeLedger) -> Self {
        let temp_file = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite:{}", temp_file.path().to_str().unwrap());
        let db: PaydayDbObj = Arc::new(PaydayDb::new(&db_url).await.unwrap());

        let ledger = Arc::new(ledger);
        let notifier = Arc::new(RecordingNotifier::default());
        let service = PaydayService::new(
            ledger.clone(),
            db.clone(),
            notifier.clone(),
            PaydayServiceConfig { harvest_concurrency: 2, ..Default::default() },
        );

        Self { ledger, db, notifier, service, _temp_file: temp_file }
    }

    /// Process the k-th payday
    pub async fn run_payday(&self, k: u64) -> Result<payday_indexer::payday::PaydaySummary> {
        self.service.run_for_payday(&payday_date(k), &payday_hash(k)).await
    }
}

/// Baker 1 (equity 1M, no delegators) earning 10_000 micro-units each payday
pub fn single_baker_ledger(paydays: u64) -> FakeLedger {
    let ledger = FakeLedger::new().with_pool(pool(1, "baker-one", 1_000_000, 0), vec![]);
    for k in 0..paydays {
        ledger.set_payday_events(
            k,
            vec![account_reward("baker-one", 10_000), pool_reward(Some(1), 10_000)],
        );
    }
    ledger
}
