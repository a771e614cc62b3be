//! # Sale Record Repository
//!
//! Persistence of committed fiscal transactions.
//!
//! ## Record Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SaleRecord Lifecycle                              │
//! │                                                                         │
//! │  1. INSERT (once, after a terminal emission outcome)                   │
//! │     └── insert() → header + items in ONE transaction                   │
//! │         state ∈ {ACCEPTED, PENDING, REJECTED}                          │
//! │                                                                         │
//! │  2. RECONCILE (status reconciler)                                      │
//! │     └── update_state(PENDING → ACCEPTED / REJECTED), compare-and-set   │
//! │                                                                         │
//! │  3. VOID (void workflow)                                               │
//! │     └── update_state(VOIDED) → sets voided_at                          │
//! │                                                                         │
//! │  Never deleted. UNIQUE(series, number) rejects a second record.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use martillo_core::{
    CustomerIdentity, DocumentArtifacts, DocumentKind, DocumentState, Money, NetUnitValue,
    PaymentMethod, Quantity, SaleRecord, SaleRecordItem, TaxIdKind, TaxRate,
};

const RECORD_COLUMNS: &str = r#"
    id, document_kind, series, number,
    customer_tax_id_kind, customer_tax_id, customer_name, customer_address,
    payment_method, subtotal_cents, tax_cents, total_cents, tax_rate_bps, currency,
    state, hash, remote_message, artifacts,
    emitted_at, updated_at, voided_at
"#;

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct SaleRecordRow {
    id: String,
    document_kind: DocumentKind,
    series: String,
    number: i64,
    customer_tax_id_kind: TaxIdKind,
    customer_tax_id: String,
    customer_name: String,
    customer_address: String,
    payment_method: PaymentMethod,
    subtotal_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    tax_rate_bps: i64,
    currency: String,
    state: DocumentState,
    hash: Option<String>,
    remote_message: Option<String>,
    artifacts: String,
    emitted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    voided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct SaleRecordItemRow {
    line_no: i64,
    description: String,
    quantity_milli: i64,
    unit_of_measure: String,
    unit_price_gross_cents: i64,
    unit_value_net_micros: i64,
    line_total_cents: i64,
}

impl From<SaleRecordItemRow> for SaleRecordItem {
    fn from(row: SaleRecordItemRow) -> Self {
        SaleRecordItem {
            line_no: row.line_no,
            description: row.description,
            quantity: Quantity::from_milli(row.quantity_milli),
            unit_of_measure: row.unit_of_measure,
            unit_price_gross: Money::from_cents(row.unit_price_gross_cents),
            unit_value_net: NetUnitValue::from_micros(row.unit_value_net_micros),
            line_total: Money::from_cents(row.line_total_cents),
        }
    }
}

impl SaleRecordRow {
    fn into_record(self, items: Vec<SaleRecordItem>) -> DbResult<SaleRecord> {
        let artifacts: DocumentArtifacts = serde_json::from_str(&self.artifacts)
            .map_err(|e| DbError::corrupt("sale_records", format!("artifacts: {}", e)))?;
        let tax_rate_bps = u32::try_from(self.tax_rate_bps)
            .map_err(|_| DbError::corrupt("sale_records", "negative tax_rate_bps"))?;

        Ok(SaleRecord {
            id: self.id,
            document_kind: self.document_kind,
            series: self.series,
            number: self.number,
            customer: CustomerIdentity {
                tax_id_kind: self.customer_tax_id_kind,
                tax_id: self.customer_tax_id,
                name: self.customer_name,
                address: self.customer_address,
            },
            payment_method: self.payment_method,
            items,
            subtotal: Money::from_cents(self.subtotal_cents),
            tax: Money::from_cents(self.tax_cents),
            total: Money::from_cents(self.total_cents),
            tax_rate: TaxRate::from_bps(tax_rate_bps),
            currency: self.currency,
            state: self.state,
            hash: self.hash,
            remote_message: self.remote_message,
            artifacts,
            emitted_at: self.emitted_at,
            updated_at: self.updated_at,
            voided_at: self.voided_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sale record operations.
#[derive(Debug, Clone)]
pub struct SaleRecordRepository {
    pool: SqlitePool,
}

impl SaleRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRecordRepository { pool }
    }

    /// Inserts a record and its items in one transaction.
    ///
    /// ## Errors
    /// - [`DbError::UniqueViolation`] if (series, number) already has a record
    /// - [`DbError::ForeignKeyViolation`] if the series is not registered
    pub async fn insert(&self, record: &SaleRecord) -> DbResult<()> {
        debug!(
            record_id = %record.id,
            series = %record.series,
            number = record.number,
            state = %record.state,
            "Inserting sale record"
        );

        let artifacts = serde_json::to_string(&record.artifacts)
            .map_err(|e| DbError::Internal(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sale_records (
                id, document_kind, series, number,
                customer_tax_id_kind, customer_tax_id, customer_name, customer_address,
                payment_method, subtotal_cents, tax_cents, total_cents, tax_rate_bps, currency,
                state, hash, remote_message, artifacts,
                emitted_at, updated_at, voided_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8,
                ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18,
                ?19, ?20, ?21
            )
            "#,
        )
        .bind(&record.id)
        .bind(record.document_kind)
        .bind(&record.series)
        .bind(record.number)
        .bind(record.customer.tax_id_kind)
        .bind(&record.customer.tax_id)
        .bind(&record.customer.name)
        .bind(&record.customer.address)
        .bind(record.payment_method)
        .bind(record.subtotal.cents())
        .bind(record.tax.cents())
        .bind(record.total.cents())
        .bind(record.tax_rate.bps() as i64)
        .bind(&record.currency)
        .bind(record.state)
        .bind(&record.hash)
        .bind(&record.remote_message)
        .bind(artifacts)
        .bind(record.emitted_at)
        .bind(record.updated_at)
        .bind(record.voided_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: format!("{}-{}", record.series, record.number),
            },
            other => other,
        })?;

        for item in &record.items {
            sqlx::query(
                r#"
                INSERT INTO sale_record_items (
                    record_id, line_no, description, quantity_milli, unit_of_measure,
                    unit_price_gross_cents, unit_value_net_micros, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&record.id)
            .bind(item.line_no)
            .bind(&item.description)
            .bind(item.quantity.milli())
            .bind(&item.unit_of_measure)
            .bind(item.unit_price_gross.cents())
            .bind(item.unit_value_net.micros())
            .bind(item.line_total.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            record_id = %record.id,
            document = %record.document_number(),
            state = %record.state,
            "Sale record saved"
        );
        Ok(())
    }

    async fn load_items(&self, record_id: &str) -> DbResult<Vec<SaleRecordItem>> {
        let rows: Vec<SaleRecordItemRow> = sqlx::query_as(
            r#"
            SELECT line_no, description, quantity_milli, unit_of_measure,
                   unit_price_gross_cents, unit_value_net_micros, line_total_cents
            FROM sale_record_items
            WHERE record_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SaleRecordItem::from).collect())
    }

    async fn hydrate(&self, row: SaleRecordRow) -> DbResult<SaleRecord> {
        let items = self.load_items(&row.id).await?;
        row.into_record(items)
    }

    async fn hydrate_all(&self, rows: Vec<SaleRecordRow>) -> DbResult<Vec<SaleRecord>> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(self.hydrate(row).await?);
        }
        Ok(records)
    }

    /// Gets a record by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SaleRecord>> {
        let sql = format!("SELECT {} FROM sale_records WHERE id = ?1", RECORD_COLUMNS);
        let row: Option<SaleRecordRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Gets the record for a (series, number) pair.
    pub async fn get_by_series_number(
        &self,
        series: &str,
        number: i64,
    ) -> DbResult<Option<SaleRecord>> {
        let sql = format!(
            "SELECT {} FROM sale_records WHERE series = ?1 AND number = ?2",
            RECORD_COLUMNS
        );
        let row: Option<SaleRecordRow> = sqlx::query_as(&sql)
            .bind(series)
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Most recent records first.
    pub async fn list_recent(&self, limit: i64) -> DbResult<Vec<SaleRecord>> {
        let sql = format!(
            "SELECT {} FROM sale_records ORDER BY emitted_at DESC, number DESC LIMIT ?1",
            RECORD_COLUMNS
        );
        let rows: Vec<SaleRecordRow> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        self.hydrate_all(rows).await
    }

    /// Records in a given state, oldest first (reconciliation batches).
    pub async fn list_by_state(&self, state: DocumentState, limit: i64) -> DbResult<Vec<SaleRecord>> {
        let sql = format!(
            "SELECT {} FROM sale_records WHERE state = ?1 ORDER BY emitted_at ASC LIMIT ?2",
            RECORD_COLUMNS
        );
        let rows: Vec<SaleRecordRow> = sqlx::query_as(&sql)
            .bind(state)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        self.hydrate_all(rows).await
    }

    /// Moves a record from `expected` to `state`.
    ///
    /// The write only lands while the stored state is still `expected`;
    /// returns `false` when another writer moved it first. `remote_message`
    /// replaces the stored one when given. Moving to `VOIDED` stamps
    /// `voided_at`.
    pub async fn update_state(
        &self,
        id: &str,
        expected: DocumentState,
        state: DocumentState,
        remote_message: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let voided_at = (state == DocumentState::Voided).then_some(at);

        let affected = sqlx::query(
            r#"
            UPDATE sale_records
            SET state = ?2,
                remote_message = COALESCE(?3, remote_message),
                voided_at = COALESCE(?4, voided_at),
                updated_at = ?5
            WHERE id = ?1 AND state = ?6
            "#,
        )
        .bind(id)
        .bind(state)
        .bind(remote_message)
        .bind(voided_at)
        .bind(at)
        .bind(expected)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            let current: Option<DocumentState> =
                sqlx::query_scalar("SELECT state FROM sale_records WHERE id = ?1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            return match current {
                None => Err(DbError::not_found("SaleRecord", id)),
                Some(current) => {
                    warn!(record_id = %id, expected = %expected, current = %current, "State changed concurrently, update skipped");
                    Ok(false)
                }
            };
        }

        info!(record_id = %id, from = %expected, to = %state, "Sale record state updated");
        Ok(true)
    }

    /// Counts records, optionally for one series.
    pub async fn count(&self, series: Option<&str>) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sale_records WHERE ?1 IS NULL OR series = ?1",
        )
        .bind(series)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
