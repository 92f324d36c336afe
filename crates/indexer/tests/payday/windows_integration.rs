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

use payday_indexer::db::PaydayIndexerDb;
use payday_rewards::{daily_apy, ApyIntermediate, ApyPeriod, DailyApyEntry, EntityId};

use super::common::{
    account, account_reward, payday_date, pool_reward, single_baker_ledger, TestHarness, DAY_SECS,
};

async fn baker_account_doc(harness: &TestHarness) -> ApyIntermediate {
    let id = EntityId::Account(account("baker-one"));
    harness.db.get_apy_intermediates(&[id]).await.unwrap().into_iter().next().unwrap()
}

fn daily(doc: &ApyIntermediate, date: &str) -> f64 {
    match doc.daily_apy_dict.get(date) {
        Some(DailyApyEntry::Account(apy)) => apy.apy,
        other => panic!("expected account entry for {date}, got {other:?}"),
    }
}

#[tokio::test]
async fn test_thirty_day_window_after_thirty_one_paydays() {
    let harness = TestHarness::new(single_baker_ledger(31)).await;

    for k in 0..30 {
        let summary = harness.run_payday(k).await.unwrap();
        assert_eq!(summary.window_updates, 0, "no window before 30 earlier paydays (payday {k})");
    }

    // Account, baker pool and passive pool all have a full window now
    let summary = harness.run_payday(30).await.unwrap();
    assert_eq!(summary.window_updates, 3);

    let doc = baker_account_doc(&harness).await;
    assert_eq!(doc.daily_apy_dict.len(), 31);
    let window = doc.window(ApyPeriod::D30);
    assert_eq!(window.len(), 1);

    let d30 = window.get(&payday_date(30)).unwrap();
    assert_eq!(d30.count_of_days, 30);
    assert!((d30.sum_of_rewards - 0.3).abs() < 1e-9);
    // Constant daily yields average to themselves
    let expected = daily_apy(10_000.0, 1_000_000, DAY_SECS);
    assert!((d30.apy - expected).abs() < 1e-6);

    assert!(doc.window(ApyPeriod::D90).is_empty());
    assert!(doc.window(ApyPeriod::D180).is_empty());
}

#[tokio::test]
async fn test_rerun_replaces_only_its_date() {
    let harness = TestHarness::new(single_baker_ledger(2)).await;
    harness.run_payday(0).await.unwrap();
    harness.run_payday(1).await.unwrap();

    let before = baker_account_doc(&harness).await;
    let day_two = daily(&before, &payday_date(1));

    // The first payday is reprocessed with a doubled reward
    harness.ledger.set_payday_events(
        0,
        vec![account_reward("baker-one", 20_000), pool_reward(Some(1), 20_000)],
    );
    harness.run_payday(0).await.unwrap();

    let after = baker_account_doc(&harness).await;
    assert_eq!(after.daily_apy_dict.len(), 2);
    let expected = daily_apy(20_000.0, 1_000_000, DAY_SECS);
    assert!((daily(&after, &payday_date(0)) - expected).abs() < 1e-9);
    assert!((daily(&after, &payday_date(1)) - day_two).abs() < 1e-9);
}

#[tokio::test]
async fn test_processed_dates_are_ordered_by_height() {
    let harness = TestHarness::new(single_baker_ledger(3)).await;
    for k in [0, 1, 2] {
        harness.run_payday(k).await.unwrap();
    }
    assert_eq!(
        harness.db.get_payday_dates().await.unwrap(),
        vec![payday_date(0), payday_date(1), payday_date(2)]
    );
}

#[tokio::test]
async fn test_rerun_after_windows_is_idempotent() {
    let harness = TestHarness::new(single_baker_ledger(31)).await;
    for k in 0..=30 {
        harness.run_payday(k).await.unwrap();
    }
    let intermediates = harness.db.get_all_apy_intermediates().await.unwrap();
    let current = harness.db.get_current_payday_performance().await.unwrap();

    harness.run_payday(30).await.unwrap();
    assert_eq!(harness.db.get_all_apy_intermediates().await.unwrap(), intermediates);
    assert_eq!(harness.db.get_current_payday_performance().await.unwrap(), current);
}
