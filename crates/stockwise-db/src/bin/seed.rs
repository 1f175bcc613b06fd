//! # Seed Data Generator
//!
//! Populates a database with demo products for development.
//!
//! ## Usage
//! ```bash
//! # Generate 200 products (default)
//! cargo run -p stockwise-db --bin seed
//!
//! # Generate custom amount into a specific file
//! cargo run -p stockwise-db --bin seed -- --count 1000 --db ./data/stockwise.db
//! ```
//!
//! Stock levels and thresholds are spread so that every stockout risk band
//! is represented.

use chrono::Utc;
use std::env;
use stockwise_core::validation::validate_product_name;
use stockwise_core::Product;
use stockwise_db::{Database, DbConfig};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Product families for demo data.
const FAMILIES: &[(&str, &[&str])] = &[
    (
        "Fasteners",
        &["Hex Bolt", "Wood Screw", "Wall Anchor", "Washer", "Lock Nut"],
    ),
    (
        "Electrical",
        &["Cable Tie", "Wire Nut", "Fuse", "Switch Plate", "Junction Box"],
    ),
    (
        "Plumbing",
        &["Elbow Joint", "Ball Valve", "Pipe Clamp", "Tap Washer", "PTFE Tape"],
    ),
    (
        "Paint",
        &["Primer", "Gloss White", "Matt Grey", "Roller Sleeve", "Masking Tape"],
    ),
];

/// Pack sizes appended to product names.
const SIZES: &[&str] = &["Single", "10 Pack", "50 Pack", "Bulk Box"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stockwise=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./stockwise_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockwise Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./stockwise_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Stockwise Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database, migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut generated = 0;

    for product in generate_products(count) {
        if let Err(e) = db.products().insert(&product).await {
            warn!(name = %product.name, error = %e, "Failed to insert product");
            continue;
        }
        generated += 1;
    }

    println!("✓ Generated {} products in {:?}", generated, start.elapsed());

    let low = db.products().list_low_stock().await?;
    println!("  {} products start at or below their threshold", low.len());

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}

/// Generates `count` products, cycling the catalogue.
///
/// Past one full pass the names repeat with a batch suffix.
fn generate_products(count: usize) -> Vec<Product> {
    let catalogue: Vec<(&str, &str, &str)> = FAMILIES
        .iter()
        .flat_map(|(family, items)| {
            items
                .iter()
                .flat_map(move |item| SIZES.iter().map(move |size| (*family, *item, *size)))
        })
        .collect();

    catalogue
        .iter()
        .cycle()
        .take(count)
        .enumerate()
        .map(|(seed, (family, item, size))| {
            generate_product(family, item, size, seed / catalogue.len(), seed)
        })
        .collect()
}

/// Generates a single product with deterministic stock and threshold.
fn generate_product(family: &str, item: &str, size: &str, batch: usize, seed: usize) -> Product {
    let name = match batch {
        0 => format!("{} {} ({})", item, size, family),
        n => format!("{} {} ({}) #{}", item, size, family, n + 1),
    };
    let name = if validate_product_name(&name).is_ok() {
        name
    } else {
        format!("{} {}", item, size)
    };

    // Threshold 0..=40, stock 0..=120: covers every risk band
    let threshold = ((seed * 7) % 41) as i64;
    let stock = ((seed * 13) % 121) as i64;

    Product::new(name, stock, threshold, Utc::now())
}
