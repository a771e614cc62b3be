//! # Repository Module
//!
//! Database repositories for the fiscal engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Emission engine (martillo-fiscal)                                     │
//! │       │                                                                 │
//! │       │  db.series().next_number("B001")                               │
//! │       │  db.sales().insert(&record)                                    │
//! │       ▼                                                                 │
//! │  SeriesRepository              SaleRecordRepository                    │
//! │  ├── register(series)          ├── insert(record)       (transaction)  │
//! │  ├── next_number(code) ATOMIC  ├── get_by_id(id)                       │
//! │  ├── current_number(code)      ├── get_by_series_number(series, n)     │
//! │  └── raise_floor(code, n)      ├── update_state(id, from, to)  (CAS)  │
//! │                                └── list_recent / list_by_state         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod sale;
pub mod series;
