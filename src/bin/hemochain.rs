use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hemochain_core::{
    distance_km, verify_blocks, BloodType, CancelToken, GeoPoint, Ledger, LedgerConfig, MiningControl,
    MiningOutcome, Urgency, ViolationReason,
};
use hemochain_crypto::MerkleTree;

#[derive(Parser)]
#[command(name = "hemochain")]
#[command(about = "HemoChain blood-transfer ledger", long_about = None)]
struct Cli {
    /// Configuration profile: development, production or testing
    #[arg(long, global = true, default_value = "development")]
    profile: String,

    /// Optional configuration file layered over the profile
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full hospital walkthrough against an in-memory ledger
    Demo {
        /// Seconds before an unfinished mining search is cancelled
        #[arg(long, default_value_t = 30)]
        mine_timeout_secs: u64,
    },

    /// Great-circle distance between two coordinates
    #[command(allow_negative_numbers = true)]
    Distance {
        lat1: f64,
        lon1: f64,
        lat2: f64,
        lon2: f64,
    },

    /// List the blood types a donor type can be given to
    Compat { blood_type: String },

    /// Print the effective configuration
    Config,
}

/// Profile defaults, then the optional file, then `HEMO_*` variables.
fn load_config(profile: &str, path: Option<&str>) -> Result<LedgerConfig> {
    let defaults = LedgerConfig::profile(profile).ok_or_else(|| anyhow!("unknown profile: {}", profile))?;

    let mut builder = config::Config::builder().add_source(
        config::Config::try_from(&defaults).context("failed to seed configuration defaults")?,
    );
    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path));
    }
    let settings = builder
        .add_source(config::Environment::with_prefix("HEMO").try_parsing(true))
        .build()
        .context("failed to load configuration")?;

    let ledger_config: LedgerConfig = settings
        .try_deserialize()
        .context("invalid configuration values")?;
    ledger_config.validate()?;
    Ok(ledger_config)
}

fn section(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("  {}", title);
    println!("{}", "=".repeat(60));
}

fn print_hospital(ledger: &Ledger, hospital_id: &str) {
    match ledger.hospital_stats(hospital_id) {
        Some(stats) => {
            let h = &stats.hospital;
            println!("\nHospital: {} ({})", h.name, h.id);
            println!("   Location: ({:.4}, {:.4})", h.location.latitude, h.location.longitude);
            println!("   Credits: {}", h.credit);
            println!("   Reputation: {}", h.reputation);
            println!("   Violations: {}", h.violations);
            println!("   Blacklisted: {}", h.blacklisted);
            println!("   Inventory: {:?}", h.inventory);
            println!("   Transfers sent/received: {}/{}", h.transfers_sent, h.transfers_received);
            println!("   Transactions on chain: {}", stats.total_transactions);
        }
        None => println!("Hospital {} not found", hospital_id),
    }
}

/// Mine on a blocking worker; cancel the search if it outlives `timeout`.
async fn mine_block(ledger: &Ledger, miner_id: &str, timeout: Duration) -> Result<MiningOutcome> {
    let cancel = CancelToken::new();
    let control = MiningControl::new().with_cancel(cancel.clone());
    let mut worker = {
        let ledger = ledger.clone();
        let miner_id = miner_id.to_string();
        tokio::task::spawn_blocking(move || ledger.mine_with(&miner_id, &control))
    };

    let joined = match tokio::time::timeout(timeout, &mut worker).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!("Mining exceeded {:?}; cancelling", timeout);
            cancel.cancel();
            worker.await
        }
    };
    let outcome = joined.context("mining task panicked")??;
    Ok(outcome)
}

async fn run_demo(config: LedgerConfig, mine_timeout: Duration) -> Result<()> {
    let ledger = Ledger::new(config)?;

    section("HOSPITAL REGISTRATION");
    let hospitals = [
        ("HOSP001", "City General Hospital", (40.7128, -74.0060), 150),
        ("HOSP002", "Memorial Medical Center", (40.7589, -73.9851), 120),
        ("HOSP003", "Regional Blood Center", (40.7831, -73.9712), 200),
        ("HOSP004", "Emergency Care Hospital", (40.6782, -73.9442), 100),
        ("HOSP005", "University Medical Center", (40.8176, -73.9482), 180),
    ];
    for (id, name, location, credit) in hospitals {
        match ledger.register(id, name, location, credit) {
            Ok(()) => println!("Registered: {} ({})", name, id),
            Err(e) => println!("Failed to register {}: {}", id, e),
        }
    }

    section("BLOOD INVENTORY MANAGEMENT");
    let inventory: [(&str, &[(&str, i64)]); 5] = [
        ("HOSP001", &[("O+", 15), ("A+", 10), ("B+", 8), ("AB+", 5)]),
        ("HOSP002", &[("O-", 12), ("A-", 6), ("B-", 4), ("O+", 20)]),
        ("HOSP003", &[("AB+", 25), ("AB-", 8), ("A+", 15), ("B+", 12)]),
        ("HOSP004", &[("O+", 10), ("O-", 8), ("A+", 6)]),
        ("HOSP005", &[("B-", 10), ("AB-", 15), ("A-", 12), ("B+", 18)]),
    ];
    for (id, units) in inventory {
        for (blood_type, quantity) in units {
            let total = ledger.stock(id, blood_type, *quantity)?;
            println!("{}: +{} {} (now {})", id, quantity, blood_type, total);
        }
    }
    println!("\nTotal blood units in system: {}", ledger.system_stats().total_blood_units);

    section("LOCATION VERIFICATION");
    for (a, b) in [("HOSP001", "HOSP002"), ("HOSP003", "HOSP004"), ("HOSP001", "HOSP005")] {
        let (ha, hb) = match (ledger.hospital_status(a), ledger.hospital_status(b)) {
            (Some(ha), Some(hb)) => (ha, hb),
            _ => continue,
        };
        let in_range = ledger.within_transfer_range(a, b)?;
        println!(
            "{} -> {}: {:.2} km, within range: {}",
            ha.name,
            hb.name,
            distance_km(ha.location, hb.location),
            in_range
        );
    }

    section("BLOOD TRANSFER TRANSACTIONS");
    let transfers = [
        ("HOSP001", "HOSP002", "O+", 3, Urgency::Urgent),
        ("HOSP003", "HOSP004", "AB+", 2, Urgency::Normal),
        ("HOSP002", "HOSP001", "O-", 1, Urgency::Critical),
        ("HOSP005", "HOSP003", "B+", 4, Urgency::Normal),
        ("HOSP001", "HOSP005", "A+", 2, Urgency::Urgent),
    ];
    let mut submitted = Vec::new();
    for (sender, receiver, blood_type, quantity, urgency) in transfers {
        let tx = ledger.create_transfer(sender, receiver, blood_type, quantity, urgency)?;
        match ledger.submit(tx.clone()) {
            Ok(()) => {
                println!("Queued {} {}x{} {} -> {} ({})", &tx.id[..8], quantity, blood_type, sender, receiver, urgency);
                submitted.push(tx);
            }
            Err(e) => println!("Rejected {} -> {}: {}", sender, receiver, e),
        }
    }

    section("BLOCK MINING");
    info!("Mining at difficulty {}", ledger.config().mining_difficulty);
    let outcome = mine_block(&ledger, "HOSP003", mine_timeout).await?;
    println!("Block {} mined: {}", outcome.block.index, outcome.block.hash);
    println!("   Nonce: {}", outcome.block.nonce);
    println!("   Merkle root: {}", outcome.block.merkle_root);
    println!("   Transfers: {}", outcome.block.transactions.len());
    for rejected in &outcome.rejected {
        println!("   Dropped {}: {}", &rejected.tx_id[..8], rejected.reason);
    }
    if let Some(tx) = submitted.first() {
        if let Some((leaf, proof)) = outcome.block.inclusion_proof(&tx.id) {
            println!(
                "   Inclusion proof for {}: {} steps, valid: {}",
                &tx.id[..8],
                proof.path.len(),
                MerkleTree::verify(&leaf, &proof, &outcome.block.merkle_root)
            );
        }
    }
    for tx in &submitted {
        println!("   {}: {:?}", &tx.id[..8], ledger.transaction_status(&tx.id));
    }

    section("HOSPITAL STATUS");
    for (id, ..) in hospitals {
        print_hospital(&ledger, id);
    }

    section("TAMPERING DETECTION & PENALTIES");
    for detail in [
        "Submitted blood with falsified expiry date",
        "Attempted to modify transaction data",
    ] {
        if let Some(event) = ledger.report_violation("HOSP004", ViolationReason::Reported(detail.to_string())) {
            println!(
                "Penalised {}: reputation {} violations {} blacklisted {}",
                event.hospital_id, event.reputation, event.violations, event.blacklisted
            );
        }
    }
    let blocked = ledger.create_transfer("HOSP004", "HOSP001", "O+", 2, Urgency::Normal)?;
    match ledger.submit(blocked) {
        Ok(()) => println!("Transfer from blacklisted hospital was accepted"),
        Err(e) => println!("Transfer from blacklisted hospital blocked: {}", e),
    }

    let mut copy = ledger.chain_snapshot();
    if let Some(block) = copy.get_mut(1) {
        if let Some(tx) = block.transactions.first_mut() {
            tx.quantity += 10;
        }
        block.nonce = block.nonce.wrapping_add(1);
    }
    match verify_blocks(&copy) {
        Ok(()) => println!("Edited chain copy verified (unexpected)"),
        Err(fault) => println!("Edited chain copy rejected at block {}: {}", fault.index(), fault),
    }
    println!("Live chain valid: {}", ledger.verify_chain().valid);

    section("SYSTEM STATISTICS");
    println!("{}", serde_json::to_string_pretty(&ledger.system_stats())?);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { mine_timeout_secs } => {
            let config = load_config(&cli.profile, cli.config.as_deref())?;
            info!("Starting demo with profile {}", cli.profile);
            run_demo(config, Duration::from_secs(mine_timeout_secs)).await?;
        }
        Commands::Distance { lat1, lon1, lat2, lon2 } => {
            let km = distance_km(GeoPoint::new(lat1, lon1), GeoPoint::new(lat2, lon2));
            println!("{:.2} km", km);
        }
        Commands::Compat { blood_type } => {
            let donor: BloodType = blood_type.parse()?;
            let recipients: Vec<String> = donor
                .compatible_recipients()
                .iter()
                .map(ToString::to_string)
                .collect();
            println!("{} can donate to: {}", donor, recipients.join(", "));
        }
        Commands::Config => {
            let config = load_config(&cli.profile, cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
