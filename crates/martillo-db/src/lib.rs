//! # martillo-db: Database Layer for the Fiscal Engine
//!
//! SQLite storage for series counters and sale records, via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Martillo Fiscal Data Flow                          │
//! │                                                                         │
//! │  martillo-fiscal (FiscalEngine, StatusReconciler, VoidWorkflow)        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  martillo-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌──────────────────┐   ┌─────────────┐  │   │
//! │  │   │   Database    │    │  Repositories    │   │ Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│  SeriesRepo      │   │ (embedded)  │  │   │
//! │  │   │  SqlitePool   │    │  SaleRecordRepo  │   │ 001_fiscal  │  │   │
//! │  │   └───────────────┘    └──────────────────┘   └─────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (fiscal.db)                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Series counters and sale records
//!
//! ## Usage
//!
//! ```rust,ignore
//! use martillo_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("fiscal.db")).await?;
//! let number = db.series().next_number("B001").await?;
//! let record = db.sales().get_by_series_number("B001", number).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::sale::SaleRecordRepository;
pub use repository::series::{SeriesCounter, SeriesRepository};
