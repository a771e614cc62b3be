//! # Series Seeder
//!
//! Creates the database and registers the document series used at the
//! counter.
//!
//! ## Usage
//! ```bash
//! # Register B001 and F001 in ./martillo_dev.db
//! cargo run -p martillo-db --bin seed
//!
//! # Custom database and series
//! cargo run -p martillo-db --bin seed -- --db ./data/fiscal.db --boleta B002 --factura F002
//! ```

use std::env;

use martillo_core::validation::validate_series_for_kind;
use martillo_core::{DocumentKind, DocumentSeries};
use martillo_db::{Database, DbConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./martillo_dev.db");
    let mut boleta = String::from("B001");
    let mut factura = String::from("F001");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" if i + 1 < args.len() => {
                db_path = args[i + 1].clone();
                i += 1;
            }
            "--boleta" | "-b" if i + 1 < args.len() => {
                boleta = args[i + 1].to_uppercase();
                i += 1;
            }
            "--factura" | "-f" if i + 1 < args.len() => {
                factura = args[i + 1].to_uppercase();
                i += 1;
            }
            "--help" | "-h" => {
                println!("Martillo POS Series Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file path (default: ./martillo_dev.db)");
                println!("  -b, --boleta <SERIES>  Boleta series (default: B001)");
                println!("  -f, --factura <SERIES> Factura series (default: F001)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let series = [
        DocumentSeries::new(boleta, DocumentKind::Boleta),
        DocumentSeries::new(factura, DocumentKind::Factura),
    ];
    for s in &series {
        validate_series_for_kind(&s.code, s.kind)?;
    }

    let db = Database::new(DbConfig::new(&db_path)).await?;
    info!(path = %db_path, "Database ready, migrations applied");

    for s in &series {
        let counter = db.series().register(s).await?;
        println!(
            "✓ {} ({}) last number: {}",
            counter.series.code, counter.series.kind, counter.last_number
        );
    }

    db.close().await;
    println!("✓ Seed complete!");
    Ok(())
}
