//! RiskWatch CLI - behavioral anomaly detection for transaction streams
//!
//! A thin driver around the detection engine: a self-contained demo with
//! synthesized account histories, and a batch scanner for JSON transaction
//! dumps.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use clap::{Arg, ArgAction, Command};
use uuid::Uuid;

use riskwatch::{
    config::DetectionConfig,
    engine::{DetectionEngine, InMemorySource},
    geo::StaticResolver,
    AlertRecord, TimeWindow, Transaction,
};

#[tokio::main]
async fn main() {
    let matches = Command::new("riskwatch")
        .version("0.1.0")
        .about("Behavioral anomaly detection engine for account transactions")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("demo").about("Run a demonstration against synthesized account activity"),
        )
        .subcommand(
            Command::new("scan")
                .about("Batch-evaluate a JSON file of transactions")
                .arg(Arg::new("file").required(true).help("Path to a JSON array of transactions")),
        )
        .get_matches();

    let level = if matches.get_flag("verbose") {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = DetectionConfig::default();
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    match matches.subcommand() {
        Some(("demo", _)) => run_demo(config).await,
        Some(("scan", sub)) => {
            let path = sub.get_one::<String>("file").expect("required arg");
            run_scan(config, path).await;
        }
        _ => {
            println!("riskwatch - behavioral anomaly detection engine");
            println!("Use --help to see available commands");
            println!();
            println!("Quick start:");
            println!("  cargo run -- demo              # synthesized fraud scenarios");
            println!("  cargo run -- scan txs.json     # batch-evaluate a dump");
        }
    }
}

async fn run_demo(config: DetectionConfig) {
    println!("RiskWatch demo - behavioral anomaly detection");
    println!("{}", "=".repeat(50));

    let account = Uuid::new_v4();
    let mut history = synthesize_history(account);
    let last = history.last().map(|t| t.timestamp).unwrap_or_else(Utc::now);

    // Incident: a huge transfer at 03:00, then a rapid duplicate pair.
    let incident_start = last + Duration::hours(26); // lands at 03:00
    history.push(demo_tx(account, 5_000_000.0, incident_start, Some("Lagos")));
    history.push(demo_tx(
        account,
        200_000.0,
        incident_start + Duration::seconds(40),
        Some("Lagos"),
    ));
    history.push(demo_tx(
        account,
        200_000.0,
        incident_start + Duration::minutes(10),
        Some("Lagos"),
    ));

    let resolver = StaticResolver::new()
        .with_place("Nairobi", -1.2921, 36.8219)
        .with_place("Lagos", 6.5244, 3.3792);
    let source = Arc::new(InMemorySource::new(history.clone()));
    let engine = match DetectionEngine::new(config, source, Arc::new(resolver)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Engine init failed: {}", e);
            return;
        }
    };

    println!("\n1. Streaming evaluation of the incident window...");
    let window = TimeWindow::new(incident_start - Duration::hours(1), incident_start + Duration::hours(1));
    match engine.evaluate(account, window).await {
        Ok(record) => print_record(&record),
        Err(e) => eprintln!("   evaluation failed: {}", e),
    }

    println!("\n2. Re-evaluating inside the cooldown window...");
    match engine.evaluate(account, window).await {
        Ok(record) => print_record(&record),
        Err(e) => eprintln!("   evaluation failed: {}", e),
    }

    println!("\n3. Retrospective batch sweep over the full history...");
    let records = engine.evaluate_batch(&history).await;
    for record in &records {
        print_record(record);
    }

    println!("\nDemo complete.");
}

async fn run_scan(config: DetectionConfig, path: &str) {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Cannot read {}: {}", path, e);
            std::process::exit(1);
        }
    };
    let transactions: Vec<Transaction> = match serde_json::from_str(&raw) {
        Ok(txs) => txs,
        Err(e) => {
            eprintln!("Cannot parse {}: {}", path, e);
            std::process::exit(1);
        }
    };

    let source = Arc::new(InMemorySource::new(transactions.clone()));
    let engine = match DetectionEngine::new(config, source, Arc::new(StaticResolver::new())) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Engine init failed: {}", e);
            std::process::exit(1);
        }
    };

    let records = engine.evaluate_batch(&transactions).await;
    println!("Evaluated {} account(s)", records.len());
    for record in &records {
        print_record(record);
    }
}

fn print_record(record: &AlertRecord) {
    let marker = match record.level {
        riskwatch::AlertLevel::None => "  ",
        riskwatch::AlertLevel::Low => "· ",
        riskwatch::AlertLevel::Medium => "! ",
        riskwatch::AlertLevel::High => "!!",
        riskwatch::AlertLevel::Critical => "!!!",
    };
    println!("   {} {}", marker, record.summary);
    for signal in &record.signals {
        println!(
            "        [{}] {:.2} {}",
            signal.kind, signal.severity, signal.description
        );
    }
}

/// Thirty days of ordinary weekday activity in Nairobi.
fn synthesize_history(account: Uuid) -> Vec<Transaction> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    (0..90)
        .map(|i| {
            demo_tx(
                account,
                100_000.0 + (i % 11) as f64 * 4_000.0,
                start + Duration::hours(i * 8),
                Some("Nairobi"),
            )
        })
        .collect()
}

fn demo_tx(
    account_id: Uuid,
    amount: f64,
    timestamp: chrono::DateTime<Utc>,
    location: Option<&str>,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        account_id,
        amount,
        currency: "KES".to_string(),
        timestamp,
        location: location.map(str::to_string),
        category: Some("payment".to_string()),
        merchant: Some("demo".to_string()),
        success: true,
        fee: 25.0,
    }
}
