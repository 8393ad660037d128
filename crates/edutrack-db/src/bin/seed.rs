//! # Seed Data Generator
//!
//! Populates a database with demo transfers by driving them through the
//! engine, so every row has a matching audit trail.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in the config (./edutrack.db by default)
//! cargo run -p edutrack-db --bin seed
//!
//! # Specify database path and config file
//! cargo run -p edutrack-db --bin seed -- --db ./data/edutrack.db --config edutrack.toml
//!
//! # More logging
//! RUST_LOG=edutrack_db=debug cargo run -p edutrack-db --bin seed
//! ```
//!
//! ## Generated Transfers
//! - A supplier receipt recorded and validated at the national warehouse
//! - Council shipments confirmed by each council
//! - Direct shipments and distributions to schools, some arriving short
//! - One cancelled draft

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use edutrack_core::{
    Actor, CatalogItem, DispatchDetails, ItemCondition, LineItemResult, NewLineItem, NewTransfer,
    OrgRef, ReceiveRequest, Role, StaticCatalog, StepRequest, TransferFilter, TransferKind,
    TransferSnapshot, ValidateRequest,
};
use edutrack_db::{EngineConfig, TransferEngine};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Catalog of teaching materials: (id, code, name, unit).
const MATERIALS: &[(&str, &str, &str, &str)] = &[
    ("mat-eng-g1", "ENG-G1", "English Reader Grade 1", "book"),
    ("mat-eng-g3", "ENG-G3", "English Reader Grade 3", "book"),
    ("mat-math-g2", "MATH-G2", "Mathematics Grade 2", "book"),
    ("mat-math-g5", "MATH-G5", "Mathematics Grade 5", "book"),
    ("mat-sci-g4", "SCI-G4", "Integrated Science Grade 4", "book"),
    ("mat-chalk", "CHALK-W", "White Chalk", "box"),
    ("mat-exer", "EXER-80", "Exercise Book 80 Pages", "pack"),
    ("mat-maps", "MAP-NAT", "National Wall Map", "piece"),
];

const WAREHOUSE: &str = "wh-national";
const COUNCILS: &[&str] = &["council-north", "council-east"];
const SCHOOLS: &[&str] = &["school-kambia", "school-lunsar", "school-bo", "school-kenema"];

struct Args {
    db_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

fn parse_args() -> Option<Args> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args {
        db_path: None,
        config_path: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    parsed.db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("EduTrack Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: database.path from config)");
                println!("  -c, --config <PATH>  Engine config file (TOML)");
                println!("  -h, --help           Show this help message");
                return None;
            }
            _ => {}
        }
        i += 1;
    }

    Some(parsed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Some(args) = parse_args() else {
        return Ok(());
    };

    let mut config = EngineConfig::load(args.config_path.as_deref())?;
    if let Some(path) = args.db_path {
        config.database.path = path;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("🌱 EduTrack Seed Data Generator");
    println!("===============================");
    println!("Database: {}", config.database.path.display());
    println!("Over-delivery policy: {:?}", config.reconciliation.over_delivery);
    println!();

    let db = edutrack_db::Database::new(config.db_config()).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.transfers().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} transfers", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let catalog: StaticCatalog = MATERIALS
        .iter()
        .map(|(id, code, name, unit)| CatalogItem::new(*id, *code, *name, *unit))
        .collect();
    let engine = TransferEngine::from_config(db.clone(), Arc::new(catalog), &config);

    let start = std::time::Instant::now();
    let summary = seed(&engine).await?;
    let elapsed = start.elapsed();

    println!();
    println!("✓ Drove {} transfers through the engine in {:?}", summary.len(), elapsed);
    for snapshot in &summary {
        let transfer = &snapshot.transfer;
        println!(
            "  {:<20} {:<17} {:<12} {} → {}",
            transfer.reference_number,
            transfer.kind.as_str(),
            transfer.status.label(transfer.kind),
            transfer.origin,
            transfer.destination
        );
    }

    let open = engine
        .list(&TransferFilter {
            statuses: vec![edutrack_core::TransferStatus::Discrepancy],
            ..TransferFilter::default()
        })
        .await?;
    println!();
    println!("  Open discrepancies: {}", open.len());

    println!();
    println!("✓ Seed complete!");
    db.close().await;

    Ok(())
}

/// Runs the demo scenarios and returns the final state of every transfer.
async fn seed(engine: &TransferEngine) -> Result<Vec<TransferSnapshot>, Box<dyn std::error::Error>> {
    let national = Actor::new("seed-national", Role::NationalManager);
    let warehouse = Actor::new("seed-warehouse", Role::WarehouseManager).with_warehouse(WAREHOUSE);
    let mut results = Vec::new();

    // Stock arrives from the printer.
    let receipt = engine
        .create(
            NewTransfer {
                kind: TransferKind::SupplierReceipt,
                origin: OrgRef::supplier("sup-printing-co"),
                destination: OrgRef::warehouse(WAREHOUSE),
                line_items: MATERIALS
                    .iter()
                    .map(|(id, ..)| NewLineItem::new(*id, 2_000))
                    .collect(),
                reference_number: Some("DN/2026/0117".to_string()),
                expected_arrival_date: None,
                notes: Some("Term one consignment".to_string()),
            },
            &warehouse,
        )
        .await?;
    let counted = ReceiveRequest {
        line_item_results: full_count(&receipt),
        ..ReceiveRequest::default()
    };
    engine.receive(&receipt.transfer.id, counted, &warehouse).await?;
    results.push(
        engine
            .validate(&receipt.transfer.id, ValidateRequest::approve(), &national)
            .await?,
    );
    info!(reference_number = %receipt.transfer.reference_number, "Supplier receipt validated");

    // Warehouse → councils → schools.
    for (index, council_id) in COUNCILS.iter().enumerate() {
        let officer = Actor::new(format!("seed-{}", council_id), Role::CouncilOfficer)
            .with_council(*council_id);

        let shipment = engine
            .create(
                new_transfer(
                    TransferKind::CouncilShipment,
                    OrgRef::warehouse(WAREHOUSE),
                    OrgRef::council(*council_id),
                    400,
                ),
                &warehouse,
            )
            .await?;
        engine
            .dispatch(&shipment.transfer.id, DispatchDetails::default(), &warehouse)
            .await?;
        let counted = ReceiveRequest {
            line_item_results: full_count(&shipment),
            ..ReceiveRequest::default()
        };
        results.push(engine.receive(&shipment.transfer.id, counted, &officer).await?);

        let school_id = SCHOOLS[index];
        let rep = Actor::new(format!("seed-{}", school_id), Role::SchoolRepresentative)
            .with_school(school_id);
        let distribution = engine
            .create(
                new_transfer(
                    TransferKind::Distribution,
                    OrgRef::council(*council_id),
                    OrgRef::school(school_id),
                    60,
                ),
                &officer,
            )
            .await?;
        let id = distribution.transfer.id.clone();
        engine.dispatch(&id, DispatchDetails::default(), &officer).await?;
        engine.mark_in_transit(&id, StepRequest::default(), &officer).await?;
        engine.deliver(&id, StepRequest::default(), &officer).await?;

        // The second distribution arrives one box short with water damage.
        let mut lines = full_count(&distribution);
        let mut request = ReceiveRequest::default();
        if index == 1 {
            if let Some(first) = lines.first_mut() {
                first.quantity_received -= 6;
                first.quantity_damaged = 4;
                first.condition_on_receipt = Some(ItemCondition::Damaged);
            }
            request.discrepancy_notes = Some("Two readers missing, four water damaged".to_string());
        }
        request.line_item_results = lines;
        results.push(engine.receive(&id, request, &rep).await?);
    }

    // Direct shipments to the remaining schools.
    for school_id in &SCHOOLS[COUNCILS.len()..] {
        let rep = Actor::new(format!("seed-{}", school_id), Role::SchoolRepresentative)
            .with_school(*school_id);
        let shipment = engine
            .create(
                new_transfer(
                    TransferKind::DirectShipment,
                    OrgRef::warehouse(WAREHOUSE),
                    OrgRef::school(*school_id),
                    80,
                ),
                &warehouse,
            )
            .await?;
        engine
            .dispatch(&shipment.transfer.id, DispatchDetails::default(), &warehouse)
            .await?;
        let counted = ReceiveRequest {
            line_item_results: full_count(&shipment),
            ..ReceiveRequest::default()
        };
        results.push(engine.receive(&shipment.transfer.id, counted, &rep).await?);
    }

    // A draft raised by mistake.
    let mistake = engine
        .create(
            new_transfer(
                TransferKind::DirectShipment,
                OrgRef::warehouse(WAREHOUSE),
                OrgRef::school(SCHOOLS[0]),
                10,
            ),
            &warehouse,
        )
        .await?;
    results.push(
        engine
            .cancel(
                &mistake.transfer.id,
                StepRequest::with_notes("Raised against the wrong school"),
                &warehouse,
            )
            .await?,
    );

    Ok(results)
}

fn new_transfer(kind: TransferKind, origin: OrgRef, destination: OrgRef, quantity: i64) -> NewTransfer {
    NewTransfer {
        kind,
        origin,
        destination,
        line_items: MATERIALS
            .iter()
            .take(4)
            .map(|(id, ..)| NewLineItem::new(*id, quantity))
            .collect(),
        reference_number: None,
        expected_arrival_date: None,
        notes: None,
    }
}

/// A result per line receiving exactly what was expected.
fn full_count(snapshot: &TransferSnapshot) -> Vec<LineItemResult> {
    snapshot
        .line_items
        .iter()
        .map(|line| {
            LineItemResult::new(&line.id, line.quantity_expected, 0).with_condition(ItemCondition::New)
        })
        .collect()
}
