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

use payday_indexer::db::{LastKnownPayday, PaydayIndexerDb};
use payday_rewards::{
    daily_apy, ApyIntermediate, BakerId, BlockSpecialEvent, DailyApy, DailyApyEntry, EntityId,
    PaydayPoolReward, PoolDailyApy, PoolId, RewardRecord, GENESIS_FIRST_HEIGHT,
};

use super::common::{
    account, account_reward, delegator, last_height, payday_date, payday_hash, pool,
    pool_reward, single_baker_ledger, FakeLedger, TestHarness, DAY_SECS,
};

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
}

async fn intermediate(harness: &TestHarness, id: EntityId) -> ApyIntermediate {
    harness
        .db
        .get_apy_intermediates(&[id.clone()])
        .await
        .unwrap()
        .into_iter()
        .next()
        .unwrap_or_else(|| panic!("no apy document for {id}"))
}

fn pool_entry(doc: &ApyIntermediate, date: &str) -> PoolDailyApy {
    match doc.daily_apy_dict.get(date) {
        Some(DailyApyEntry::Pool(pool)) => *pool,
        other => panic!("expected pool entry for {date}, got {other:?}"),
    }
}

fn account_entry(doc: &ApyIntermediate, date: &str) -> DailyApy {
    match doc.daily_apy_dict.get(date) {
        Some(DailyApyEntry::Account(apy)) => *apy,
        other => panic!("expected account entry for {date}, got {other:?}"),
    }
}

#[tokio::test]
async fn test_single_baker_payday() {
    let harness = TestHarness::new(single_baker_ledger(1)).await;
    let date = payday_date(0);

    let summary = harness.run_payday(0).await.unwrap();
    assert_eq!(summary.date, date);
    assert_eq!(summary.bakers, 1);
    assert_eq!(summary.accounts, 1);
    assert_eq!(summary.rewards, 2);
    assert_eq!(summary.impacted_addresses, 1);
    assert_eq!(summary.window_updates, 0);

    // First payday measures from genesis
    let payday = harness.db.get_payday_by_date(&date).await.unwrap().unwrap();
    assert_eq!(payday.id, payday_hash(0));
    assert_eq!(payday.height_for_first_block, GENESIS_FIRST_HEIGHT);
    assert_eq!(payday.height_for_last_block, last_height(0));
    assert_eq!(payday.payday_duration_in_seconds, DAY_SECS);
    assert_eq!(payday.baker_account_ids.get(&BakerId(1)), Some(&account("baker-one")));

    let performance = harness.db.get_pool_performance_by_date(&date).await.unwrap();
    assert_eq!(performance.len(), 2);
    let baker = performance.iter().find(|p| p.baker_id == PoolId::Baker(BakerId(1))).unwrap();
    assert_close(baker.expectation.unwrap(), 100.0);
    let passive = performance.iter().find(|p| p.baker_id == PoolId::Passive).unwrap();
    assert_eq!(passive.expectation, None);
    assert_eq!(harness.db.get_current_payday_performance().await.unwrap().len(), 1);

    let rewards = harness.db.get_rewards_by_date(&date).await.unwrap();
    assert_eq!(rewards.len(), 2);
    let account_record = rewards
        .iter()
        .find_map(|record| match record {
            RewardRecord::Account(record) => Some(record),
            RewardRecord::Pool(_) => None,
        })
        .unwrap();
    assert!(account_record.account_is_baker);
    assert!(!account_record.account_is_delegator);
    assert_eq!(account_record.baker_id, Some(BakerId(1)));
    assert_eq!(account_record.staked_amount, Some(1_000_000));

    let impacted = harness.db.get_impacted_addresses_by_date(&date).await.unwrap();
    assert_eq!(impacted.len(), 1);
    assert_eq!(impacted[0].block_height, last_height(0) + 1);
    assert_eq!(impacted[0].balance_movement.baker_reward, Some(10_000));

    // 1% in one day, compounded over a year
    let expected = daily_apy(10_000.0, 1_000_000, DAY_SECS);
    assert!(expected > 36.0 && expected < 38.0);

    let baker_account = intermediate(&harness, EntityId::Account(account("baker-one"))).await;
    let apy = account_entry(&baker_account, &date);
    assert_close(apy.apy, expected);
    assert_close(apy.reward, 0.01);

    let baker_pool = intermediate(&harness, EntityId::Baker(BakerId(1))).await;
    let apy = pool_entry(&baker_pool, &date);
    assert_close(apy.baker.apy, expected);
    assert_close(apy.total.apy, expected);
    assert_eq!(apy.delegator, DailyApy::default());
    assert_eq!(apy.passive, None);

    let passive_pool = intermediate(&harness, EntityId::PassiveDelegation).await;
    assert_eq!(pool_entry(&passive_pool, &date).passive, Some(DailyApy::default()));

    let messages = harness.notifier.messages();
    assert_eq!(messages.len(), 9);
    assert_eq!(messages[0], format!("(Payday: {date})\nStart."));
    assert!(messages.contains(&format!(
        "(Payday: {date})\nStep 6: moving averages...done.\nUpdated 0 entities."
    )));
}

#[tokio::test]
async fn test_pool_with_delegators() {
    let ledger = FakeLedger::new()
        .with_pool(
            pool(1, "baker-one", 1_000_000, 500_000),
            vec![delegator("alice", 300_000), delegator("bob", 200_000)],
        )
        .with_passive(vec![delegator("carol", 50_000)]);
    ledger.set_payday_events(
        0,
        vec![
            account_reward("baker-one", 7_000),
            account_reward("alice", 1_800),
            account_reward("bob", 1_200),
            account_reward("carol", 500),
            pool_reward(Some(1), 10_000),
            pool_reward(None, 500),
        ],
    );
    let harness = TestHarness::new(ledger).await;
    let date = payday_date(0);

    let summary = harness.run_payday(0).await.unwrap();
    assert_eq!(summary.accounts, 4);
    assert_eq!(summary.rewards, 6);
    assert_eq!(summary.impacted_addresses, 4);

    let rewards = harness.db.get_rewards_by_date(&date).await.unwrap();
    let targets: Vec<_> = rewards
        .iter()
        .filter_map(|record| match record {
            RewardRecord::Account(record) => {
                Some((record.account_id.to_string(), record.delegation_target))
            }
            RewardRecord::Pool(_) => None,
        })
        .collect();
    assert!(targets.contains(&("alice".to_string(), Some(PoolId::Baker(BakerId(1))))));
    assert!(targets.contains(&("carol".to_string(), Some(PoolId::Passive))));
    assert!(targets.contains(&("baker-one".to_string(), None)));

    // A third of the effective stake is delegated; delegators keep 90% of their share
    let apy = pool_entry(&intermediate(&harness, EntityId::Baker(BakerId(1))).await, &date);
    assert_close(apy.delegator.apy, daily_apy(3_000.0, 500_000, DAY_SECS));
    assert_close(apy.delegator.reward, 0.003);
    assert_close(apy.baker.apy, daily_apy(7_000.0, 1_000_000, DAY_SECS));
    assert_close(apy.total.apy, daily_apy(10_000.0, 1_500_000, DAY_SECS));

    let passive = pool_entry(&intermediate(&harness, EntityId::PassiveDelegation).await, &date);
    let passive = passive.passive.unwrap();
    assert_close(passive.apy, daily_apy(500.0, 50_000, DAY_SECS));

    let doc = intermediate(&harness, EntityId::Account(account("alice"))).await;
    let alice = account_entry(&doc, &date);
    assert_close(alice.apy, daily_apy(1_800.0, 300_000, DAY_SECS));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let harness = TestHarness::new(single_baker_ledger(1)).await;
    let date = payday_date(0);

    harness.run_payday(0).await.unwrap();
    let payday = harness.db.get_payday_by_date(&date).await.unwrap();
    let rewards = harness.db.get_rewards_by_date(&date).await.unwrap();
    let performance = harness.db.get_pool_performance_by_date(&date).await.unwrap();
    let impacted = harness.db.get_impacted_addresses_by_date(&date).await.unwrap();
    let intermediates = harness.db.get_all_apy_intermediates().await.unwrap();
    let current = harness.db.get_current_payday_performance().await.unwrap();

    let summary = harness.run_payday(0).await.unwrap();
    assert_eq!(summary.window_updates, 0);
    assert_eq!(harness.db.get_payday_by_date(&date).await.unwrap(), payday);
    assert_eq!(harness.db.get_rewards_by_date(&date).await.unwrap(), rewards);
    assert_eq!(harness.db.get_pool_performance_by_date(&date).await.unwrap(), performance);
    assert_eq!(harness.db.get_impacted_addresses_by_date(&date).await.unwrap(), impacted);
    assert_eq!(harness.db.get_all_apy_intermediates().await.unwrap(), intermediates);
    assert_eq!(harness.db.get_current_payday_performance().await.unwrap(), current);
}

#[tokio::test]
async fn test_duplicate_reward_fails_run() {
    let ledger = single_baker_ledger(0);
    ledger.set_payday_events(
        0,
        vec![account_reward("baker-one", 10_000), account_reward("baker-one", 5_000)],
    );
    let harness = TestHarness::new(ledger).await;

    let err = harness.run_payday(0).await.unwrap_err();
    assert!(format!("{err:#}").contains("duplicate payday account reward for baker-one"));

    assert!(harness.db.get_rewards_by_date(&payday_date(0)).await.unwrap().is_empty());
    assert!(harness.db.get_all_apy_intermediates().await.unwrap().is_empty());
    assert!(!harness.notifier.messages().iter().any(|m| m.contains("Step 2")));
}

#[tokio::test]
async fn test_unknown_pool_reward_fails_run() {
    let ledger = single_baker_ledger(0);
    ledger.set_payday_events(0, vec![pool_reward(Some(42), 10_000)]);
    let harness = TestHarness::new(ledger).await;

    let err = harness.run_payday(0).await.unwrap_err();
    assert!(format!("{err:#}").contains("unknown pool 42"));
}

#[tokio::test]
async fn test_poll_processes_announced_payday() {
    let harness = TestHarness::new(single_baker_ledger(2)).await;

    // Nothing announced yet
    assert_eq!(harness.service.run().await.unwrap(), None);

    harness
        .db
        .set_last_known_payday(&LastKnownPayday { date: payday_date(0), hash: payday_hash(0) })
        .await
        .unwrap();
    let summary = harness.service.run().await.unwrap().unwrap();
    assert_eq!(summary.date, payday_date(0));

    // Already processed
    assert_eq!(harness.service.run().await.unwrap(), None);

    harness
        .db
        .set_last_known_payday(&LastKnownPayday { date: payday_date(1), hash: payday_hash(1) })
        .await
        .unwrap();
    let summary = harness.service.run().await.unwrap().unwrap();
    assert_eq!(summary.date, payday_date(1));

    // The second epoch starts right after the first one
    let payday = harness.db.get_payday_by_date(&payday_date(1)).await.unwrap().unwrap();
    assert_eq!(payday.height_for_first_block, last_height(0) + 1);
    assert_eq!(payday.height_for_last_block, last_height(1));
    assert_eq!(payday.payday_duration_in_seconds, DAY_SECS);
    assert_eq!(harness.db.get_payday_dates().await.unwrap(), vec![payday_date(0), payday_date(1)]);
}

#[tokio::test]
async fn test_missing_previous_payday_measures_from_genesis() {
    let harness = TestHarness::new(single_baker_ledger(2)).await;

    harness.run_payday(1).await.unwrap();

    let payday = harness.db.get_payday_by_date(&payday_date(1)).await.unwrap().unwrap();
    assert_eq!(payday.height_for_first_block, GENESIS_FIRST_HEIGHT);
    assert_eq!(payday.payday_duration_in_seconds, 2.0 * DAY_SECS);

    // The reward is spread over both days
    let doc = intermediate(&harness, EntityId::Account(account("baker-one"))).await;
    let apy = account_entry(&doc, &payday_date(1));
    assert_close(apy.apy, daily_apy(10_000.0, 1_000_000, 2.0 * DAY_SECS));
}

#[tokio::test]
async fn test_passive_pool_reward_uses_passive_capital() {
    let ledger = FakeLedger::new()
        .with_pool(pool(1, "baker-one", 1_000_000, 0), vec![])
        .with_passive(vec![delegator("carol", 100_000)]);
    ledger.set_payday_events(
        0,
        vec![BlockSpecialEvent::PaydayPoolReward(PaydayPoolReward {
            pool_owner: None,
            transaction_fees: 200,
            baker_reward: 1_000,
            finalization_reward: 300,
        })],
    );
    let harness = TestHarness::new(ledger).await;

    harness.run_payday(0).await.unwrap();

    let doc = intermediate(&harness, EntityId::PassiveDelegation).await;
    let passive = pool_entry(&doc, &payday_date(0)).passive.unwrap();
    assert_close(passive.apy, daily_apy(1_500.0, 100_000, DAY_SECS));
    assert_close(passive.reward, 0.0015);
}
