//! # Series Repository
//!
//! The sequence allocator: one counter row per document series.
//!
//! ## Why a Single UPDATE … RETURNING
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  READ-THEN-WRITE (race):           ATOMIC (this module):               │
//! │                                                                         │
//! │  A: SELECT last → 41               A: UPDATE … +1 RETURNING → 42       │
//! │  B: SELECT last → 41               B: UPDATE … +1 RETURNING → 43       │
//! │  A: UPDATE last = 42               (SQLite serializes writers; each    │
//! │  B: UPDATE last = 42  ← DUPLICATE   statement sees the previous one)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! The increment never happens in Rust. An unknown series is an error,
//! never a guessed number.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use martillo_core::{DocumentKind, DocumentSeries};

#[derive(Debug, FromRow)]
struct SeriesRow {
    code: String,
    document_kind: DocumentKind,
    last_number: i64,
    updated_at: DateTime<Utc>,
}

/// A registered series with its counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesCounter {
    pub series: DocumentSeries,
    pub last_number: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<SeriesRow> for SeriesCounter {
    fn from(row: SeriesRow) -> Self {
        SeriesCounter {
            series: DocumentSeries::new(row.code, row.document_kind),
            last_number: row.last_number,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for document series counters.
#[derive(Debug, Clone)]
pub struct SeriesRepository {
    pool: SqlitePool,
}

impl SeriesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SeriesRepository { pool }
    }

    /// Registers a series if it does not exist yet. Idempotent.
    ///
    /// Fails with [`DbError::SeriesKindConflict`] when the code is already
    /// registered under the other document kind.
    pub async fn register(&self, series: &DocumentSeries) -> DbResult<SeriesCounter> {
        let now = Utc::now();

        let inserted = sqlx::query(
            r#"
            INSERT INTO document_series (code, document_kind, last_number, created_at, updated_at)
            VALUES (?1, ?2, 0, ?3, ?3)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(&series.code)
        .bind(series.kind)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let counter = self
            .get(&series.code)
            .await?
            .ok_or_else(|| DbError::not_found("DocumentSeries", series.code.clone()))?;

        if counter.series.kind != series.kind {
            return Err(DbError::SeriesKindConflict {
                series: series.code.clone(),
                existing: counter.series.kind.to_string(),
            });
        }

        if inserted > 0 {
            info!(series = %series.code, kind = %series.kind, "Registered document series");
        }
        Ok(counter)
    }

    /// Returns a series with its counter.
    pub async fn get(&self, code: &str) -> DbResult<Option<SeriesCounter>> {
        let row: Option<SeriesRow> = sqlx::query_as(
            r#"
            SELECT code, document_kind, last_number, updated_at
            FROM document_series
            WHERE code = ?1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SeriesCounter::from))
    }

    /// Lists every registered series.
    pub async fn list(&self) -> DbResult<Vec<SeriesCounter>> {
        let rows: Vec<SeriesRow> = sqlx::query_as(
            r#"
            SELECT code, document_kind, last_number, updated_at
            FROM document_series
            ORDER BY code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SeriesCounter::from).collect())
    }

    /// Atomically increments the counter and returns the new value.
    ///
    /// Two concurrent callers never get the same number.
    pub async fn next_number(&self, code: &str) -> DbResult<i64> {
        let number: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE document_series
            SET last_number = last_number + 1,
                updated_at = ?2
            WHERE code = ?1
            RETURNING last_number
            "#,
        )
        .bind(code)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        let number = number.ok_or_else(|| DbError::not_found("DocumentSeries", code))?;
        debug!(series = %code, number, "Allocated correlative number");
        Ok(number)
    }

    /// Last number handed out (0 when none yet).
    pub async fn current_number(&self, code: &str) -> DbResult<i64> {
        self.get(code)
            .await?
            .map(|c| c.last_number)
            .ok_or_else(|| DbError::not_found("DocumentSeries", code))
    }

    /// Moves the counter up to `number` if it is behind. Never moves it
    /// down. Returns whether the counter changed.
    pub async fn raise_floor(&self, code: &str, number: i64) -> DbResult<bool> {
        let affected = sqlx::query(
            r#"
            UPDATE document_series
            SET last_number = ?2,
                updated_at = ?3
            WHERE code = ?1 AND last_number < ?2
            "#,
        )
        .bind(code)
        .bind(number)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected > 0 {
            warn!(series = %code, number, "Series counter was behind the remote, raised");
        }
        Ok(affected > 0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
