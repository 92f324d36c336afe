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

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use payday_rewards::{
    ApyIntermediate, BlockHash, EntityId, ImpactedAddress, PaydayInformation,
    PoolPerformanceRecord, RewardRecord,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::{any::AnyPoolOptions, AnyConnection, AnyPool, Row};

use super::DbError;

pub type PaydayDbObj = Arc<dyn PaydayIndexerDb + Send + Sync>;

/// Id of the helper record written by the block ingester when it sees a payday block
pub const LAST_KNOWN_PAYDAY_ID: &str = "last_known_payday";

/// The collections the payday pipeline owns. Each is a table of JSON documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Paydays,
    PaydaysPerformance,
    PaydaysCurrentPayday,
    PaydaysRewards,
    PaydaysApyIntermediate,
    ImpactedAddresses,
    Helpers,
}

impl Collection {
    pub fn table(self) -> &'static str {
        match self {
            Collection::Paydays => "paydays",
            Collection::PaydaysPerformance => "paydays_performance",
            Collection::PaydaysCurrentPayday => "paydays_current_payday",
            Collection::PaydaysRewards => "paydays_rewards",
            Collection::PaydaysApyIntermediate => "paydays_apy_intermediate",
            Collection::ImpactedAddresses => "impacted_addresses",
            Collection::Helpers => "helpers",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Latest payday block seen by the block ingester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastKnownPayday {
    pub date: String,
    pub hash: BlockHash,
}

#[async_trait]
pub trait PaydayIndexerDb {
    /// Upsert the information record of a payday
    async fn upsert_payday(&self, payday: &PaydayInformation) -> Result<(), DbError>;

    /// Get the payday processed for a date
    async fn get_payday_by_date(&self, date: &str) -> Result<Option<PaydayInformation>, DbError>;

    /// Get the payday with the highest last block
    async fn get_latest_payday(&self) -> Result<Option<PaydayInformation>, DbError>;

    /// Dates of all processed paydays, oldest first
    async fn get_payday_dates(&self) -> Result<Vec<String>, DbError>;

    /// Upsert pool performance records
    async fn upsert_pool_performance(
        &self,
        records: &[PoolPerformanceRecord],
    ) -> Result<(), DbError>;

    /// Get the pool performance records of a payday
    async fn get_pool_performance_by_date(
        &self,
        date: &str,
    ) -> Result<Vec<PoolPerformanceRecord>, DbError>;

    /// Replace the whole current payday mirror with `records`
    async fn replace_current_payday_performance(
        &self,
        records: &[PoolPerformanceRecord],
    ) -> Result<(), DbError>;

    /// Get the current payday mirror
    async fn get_current_payday_performance(&self) -> Result<Vec<PoolPerformanceRecord>, DbError>;

    /// Upsert reward records
    async fn upsert_rewards(&self, records: &[RewardRecord]) -> Result<(), DbError>;

    /// Get the reward records of a payday
    async fn get_rewards_by_date(&self, date: &str) -> Result<Vec<RewardRecord>, DbError>;

    /// Upsert APY intermediate documents
    async fn upsert_apy_intermediates(&self, docs: &[ApyIntermediate]) -> Result<(), DbError>;

    /// Get the APY intermediate documents of the given entities; missing ones are skipped
    async fn get_apy_intermediates(
        &self,
        ids: &[EntityId],
    ) -> Result<Vec<ApyIntermediate>, DbError>;

    /// Get every APY intermediate document
    async fn get_all_apy_intermediates(&self) -> Result<Vec<ApyIntermediate>, DbError>;

    /// Upsert impacted address records
    async fn upsert_impacted_addresses(&self, entries: &[ImpactedAddress]) -> Result<(), DbError>;

    /// Get the impacted address records of a payday
    async fn get_impacted_addresses_by_date(
        &self,
        date: &str,
    ) -> Result<Vec<ImpactedAddress>, DbError>;

    /// Get the last payday announced by the block ingester
    async fn get_last_known_payday(&self) -> Result<Option<LastKnownPayday>, DbError>;

    /// Set the last known payday
    async fn set_last_known_payday(&self, payday: &LastKnownPayday) -> Result<(), DbError>;
}

// Batch insert chunk size to avoid parameter limits
// PostgreSQL: 65535 max params, SQLite: 999-32766 params (configurable)
// Using conservative chunk size that works safely for both databases
const BATCH_INSERT_CHUNK_SIZE: usize = 75;

/// One row of a document table
struct DocumentRow {
    id: String,
    date: Option<String>,
    block_height: Option<i64>,
    document: String,
}

impl DocumentRow {
    fn new<T: Serialize>(
        id: impl Into<String>,
        date: Option<&str>,
        block_height: Option<u64>,
        document: &T,
    ) -> Result<Self, DbError> {
        Ok(Self {
            id: id.into(),
            date: date.map(str::to_string),
            block_height: block_height.map(|h| h as i64),
            document: serde_json::to_string(document)?,
        })
    }
}

fn decode<T: DeserializeOwned>(
    collection: Collection,
    row: &sqlx::any::AnyRow,
) -> Result<T, DbError> {
    let id: String = row.try_get("id")?;
    let document: String = row.try_get("document")?;
    serde_json::from_str(&document)
        .map_err(|e| DbError::BadDocument(format!("{collection} {id}: {e}")))
}

fn decode_all<T: DeserializeOwned>(
    collection: Collection,
    rows: &[sqlx::any::AnyRow],
) -> Result<Vec<T>, DbError> {
    rows.iter().map(|row| decode(collection, row)).collect()
}

async fn insert_rows(
    conn: &mut AnyConnection,
    collection: Collection,
    rows: &[DocumentRow],
) -> Result<(), DbError> {
    // Process in chunks to avoid parameter limits
    for chunk in rows.chunks(BATCH_INSERT_CHUNK_SIZE) {
        let mut values_clauses = Vec::new();
        let mut param_idx = 1;

        for _ in chunk {
            values_clauses.push(format!(
                "(${},${},${},${})",
                param_idx,
                param_idx + 1,
                param_idx + 2,
                param_idx + 3
            ));
            param_idx += 4;
        }

        let query = format!(
            r#"INSERT INTO {}
            (id, date, block_height, document)
            VALUES {}
            ON CONFLICT (id)
            DO UPDATE SET
                date = EXCLUDED.date,
                block_height = EXCLUDED.block_height,
                document = EXCLUDED.document"#,
            collection.table(),
            values_clauses.join(",")
        );

        let mut q = sqlx::query(&query);
        for row in chunk {
            q = q
                .bind(row.id.clone())
                .bind(row.date.clone())
                .bind(row.block_height)
                .bind(row.document.clone());
        }
        q.execute(&mut *conn).await?;
    }
    Ok(())
}

pub struct PaydayDb {
    pool: AnyPool,
}

impl PaydayDb {
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(20).connect(database_url).await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Upsert all rows in one transaction
    async fn upsert_rows(
        &self,
        collection: Collection,
        rows: Vec<DocumentRow>,
    ) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        insert_rows(&mut *tx, collection, &rows).await?;
        tx.commit().await?;

        tracing::debug!("Upserted {} documents into {}", rows.len(), collection);
        Ok(())
    }

    async fn get_by_id<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<T>, DbError> {
        let query = format!("SELECT id, document FROM {} WHERE id = $1", collection.table());
        let row = sqlx::query(&query).bind(id.to_string()).fetch_optional(&self.pool).await?;
        row.map(|row| decode(collection, &row)).transpose()
    }

    async fn get_by_date<T: DeserializeOwned>(
        &self,
        collection: Collection,
        date: &str,
    ) -> Result<Vec<T>, DbError> {
        let query = format!(
            "SELECT id, document FROM {} WHERE date = $1 ORDER BY id",
            collection.table()
        );
        let rows = sqlx::query(&query).bind(date.to_string()).fetch_all(&self.pool).await?;
        decode_all(collection, &rows)
    }

    async fn get_all<T: DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> Result<Vec<T>, DbError> {
        let query = format!("SELECT id, document FROM {} ORDER BY id", collection.table());
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        decode_all(collection, &rows)
    }
}

fn performance_rows(records: &[PoolPerformanceRecord]) -> Result<Vec<DocumentRow>, DbError> {
    records
        .iter()
        .map(|record| DocumentRow::new(&record.id, Some(record.date.as_str()), None, record))
        .collect()
}

#[async_trait]
impl PaydayIndexerDb for PaydayDb {
    async fn upsert_payday(&self, payday: &PaydayInformation) -> Result<(), DbError> {
        let row = DocumentRow::new(
            payday.id.to_string(),
            Some(payday.date.as_str()),
            Some(payday.height_for_last_block),
            payday,
        )?;
        self.upsert_rows(Collection::Paydays, vec![row]).await
    }

    async fn get_payday_by_date(&self, date: &str) -> Result<Option<PaydayInformation>, DbError> {
        let query = "SELECT id, document FROM paydays WHERE date = $1 ORDER BY block_height DESC";
        let row = sqlx::query(query).bind(date.to_string()).fetch_optional(&self.pool).await?;
        row.map(|row| decode(Collection::Paydays, &row)).transpose()
    }

    async fn get_latest_payday(&self) -> Result<Option<PaydayInformation>, DbError> {
        let query = "SELECT id, document FROM paydays ORDER BY block_height DESC LIMIT 1";
        let row = sqlx::query(query).fetch_optional(&self.pool).await?;
        row.map(|row| decode(Collection::Paydays, &row)).transpose()
    }

    async fn get_payday_dates(&self) -> Result<Vec<String>, DbError> {
        let query = "SELECT id, date FROM paydays ORDER BY block_height ASC";
        let rows = sqlx::query(query).fetch_all(&self.pool).await?;

        let mut dates = Vec::with_capacity(rows.len());
        for row in rows {
            let date: Option<String> = row.try_get("date")?;
            match date {
                Some(date) => dates.push(date),
                None => {
                    let id: String = row.try_get("id")?;
                    return Err(DbError::BadDocument(format!("paydays {id}: missing date")));
                }
            }
        }
        Ok(dates)
    }

    async fn upsert_pool_performance(
        &self,
        records: &[PoolPerformanceRecord],
    ) -> Result<(), DbError> {
        self.upsert_rows(Collection::PaydaysPerformance, performance_rows(records)?).await
    }

    async fn get_pool_performance_by_date(
        &self,
        date: &str,
    ) -> Result<Vec<PoolPerformanceRecord>, DbError> {
        self.get_by_date(Collection::PaydaysPerformance, date).await
    }

    async fn replace_current_payday_performance(
        &self,
        records: &[PoolPerformanceRecord],
    ) -> Result<(), DbError> {
        let rows = performance_rows(records)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM paydays_current_payday").execute(&mut *tx).await?;
        insert_rows(&mut *tx, Collection::PaydaysCurrentPayday, &rows).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn get_current_payday_performance(&self) -> Result<Vec<PoolPerformanceRecord>, DbError> {
        self.get_all(Collection::PaydaysCurrentPayday).await
    }

    async fn upsert_rewards(&self, records: &[RewardRecord]) -> Result<(), DbError> {
        let rows = records
            .iter()
            .map(|record| DocumentRow::new(record.id(), Some(record.date()), None, record))
            .collect::<Result<Vec<_>, _>>()?;
        self.upsert_rows(Collection::PaydaysRewards, rows).await
    }

    async fn get_rewards_by_date(&self, date: &str) -> Result<Vec<RewardRecord>, DbError> {
        self.get_by_date(Collection::PaydaysRewards, date).await
    }

    async fn upsert_apy_intermediates(&self, docs: &[ApyIntermediate]) -> Result<(), DbError> {
        let rows = docs
            .iter()
            .map(|doc| DocumentRow::new(doc.id.to_string(), None, None, doc))
            .collect::<Result<Vec<_>, _>>()?;
        self.upsert_rows(Collection::PaydaysApyIntermediate, rows).await
    }

    async fn get_apy_intermediates(
        &self,
        ids: &[EntityId],
    ) -> Result<Vec<ApyIntermediate>, DbError> {
        let mut results = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_INSERT_CHUNK_SIZE) {
            let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("${i}")).collect();
            let query = format!(
                "SELECT id, document FROM paydays_apy_intermediate WHERE id IN ({}) ORDER BY id",
                placeholders.join(",")
            );
            let mut q = sqlx::query(&query);
            for id in chunk {
                q = q.bind(id.to_string());
            }
            let rows = q.fetch_all(&self.pool).await?;
            results
                .extend(decode_all::<ApyIntermediate>(Collection::PaydaysApyIntermediate, &rows)?);
        }
        Ok(results)
    }

    async fn get_all_apy_intermediates(&self) -> Result<Vec<ApyIntermediate>, DbError> {
        self.get_all(Collection::PaydaysApyIntermediate).await
    }

    async fn upsert_impacted_addresses(&self, entries: &[ImpactedAddress]) -> Result<(), DbError> {
        let rows = entries
            .iter()
            .map(|entry| {
                DocumentRow::new(
                    &entry.id,
                    Some(entry.date.as_str()),
                    Some(entry.block_height),
                    entry,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.upsert_rows(Collection::ImpactedAddresses, rows).await
    }

    async fn get_impacted_addresses_by_date(
        &self,
        date: &str,
    ) -> Result<Vec<ImpactedAddress>, DbError> {
        self.get_by_date(Collection::ImpactedAddresses, date).await
    }

    async fn get_last_known_payday(&self) -> Result<Option<LastKnownPayday>, DbError> {
        self.get_by_id(Collection::Helpers, LAST_KNOWN_PAYDAY_ID).await
    }

    async fn set_last_known_payday(&self, payday: &LastKnownPayday) -> Result<(), DbError> {
        let row = DocumentRow::new(LAST_KNOWN_PAYDAY_ID, Some(payday.date.as_str()), None, payday)?;
        self.upsert_rows(Collection::Helpers, vec![row]).await
    }
}
