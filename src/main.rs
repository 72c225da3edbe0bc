//! Fairdice CLI
//!
//! Player-side verification tools and a local batch simulator. Results are
//! printed to stdout as JSON; logs go to stderr.

use clap::{Parser, Subcommand};
use fairdice::{
    config::{LogFormat, LogLevel, MonitoringConfig},
    fairness::commitment_for,
    BatchRequest, ConfigLoader, Currency, DiceCasino, DiceConfig, DiceResult, DiceSetupCalculator, Direction,
    FairRollEngine, OwnerId, RollValue, SettlementPolicy, WinChance,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Provably fair dice toolkit
#[derive(Parser)]
#[command(name = "fairdice")]
#[command(about = "Provably fair dice: verify rolls, inspect bet setups, simulate batches")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive rolls for a range of nonces from a revealed server seed
    Roll {
        #[arg(long)]
        server_seed: String,

        #[arg(long)]
        client_seed: String,

        /// First nonce
        #[arg(short, long, default_value = "0")]
        nonce: u64,

        /// Number of consecutive nonces
        #[arg(long, default_value = "1")]
        count: u64,
    },

    /// Check a revealed server seed against its commitment, and optionally a recorded roll
    Verify {
        #[arg(long)]
        server_seed: String,

        #[arg(long)]
        commitment: String,

        #[arg(long, requires_all = ["nonce", "roll"])]
        client_seed: Option<String>,

        #[arg(long)]
        nonce: Option<u64>,

        /// Recorded roll, e.g. 42.17
        #[arg(long)]
        roll: Option<RollValue>,
    },

    /// Show payout and winning range for a win chance and direction
    Setup {
        /// Win chance in percent, e.g. 49.5
        #[arg(long)]
        chance: WinChance,

        /// roll_under or roll_over
        #[arg(short, long, default_value = "roll_under")]
        direction: Direction,
    },

    /// Run one batch against a fresh in-memory casino
    Simulate {
        #[arg(long, default_value = "player")]
        owner: String,

        #[arg(long)]
        chance: WinChance,

        #[arg(short, long, default_value = "roll_under")]
        direction: Direction,

        #[arg(short, long, default_value = "1")]
        bet: fairdice::Amount,

        #[arg(long, default_value = "PLAY")]
        currency: Currency,

        #[arg(short = 'n', long, default_value = "10")]
        count: u32,

        #[arg(long)]
        client_seed: Option<String>,

        /// settle_at_end or settle_as_you_go
        #[arg(long)]
        policy: Option<SettlementPolicy>,

        /// Reveal the server seed after the batch
        #[arg(long)]
        reveal: bool,
    },
}

#[derive(Serialize)]
struct RollLine {
    nonce: u64,
    roll: RollValue,
}

#[tokio::main]
async fn main() -> DiceResult<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_ref())?;
    if cli.verbose {
        config.monitoring.log_level = LogLevel::Debug;
    }
    init_tracing(&config.monitoring);

    match cli.command {
        Commands::Roll {
            server_seed,
            client_seed,
            nonce,
            count,
        } => run_roll(&server_seed, &client_seed, nonce, count),
        Commands::Verify {
            server_seed,
            commitment,
            client_seed,
            nonce,
            roll,
        } => run_verify(&server_seed, &commitment, client_seed, nonce, roll),
        Commands::Setup { chance, direction } => run_setup(&config, chance, direction),
        Commands::Simulate {
            owner,
            chance,
            direction,
            bet,
            currency,
            count,
            client_seed,
            policy,
            reveal,
        } => {
            if let Some(policy) = policy {
                config.game.settlement_policy = policy;
            }
            let mut request = BatchRequest::new(OwnerId::new(owner), chance, direction, bet, currency, count);
            request.client_seed_override = client_seed;
            run_simulate(config, request, reveal).await
        }
    }
}

/// File and environment if available, otherwise a development config with a throwaway key
fn load_config(path: Option<&PathBuf>) -> DiceResult<DiceConfig> {
    match path {
        Some(path) => ConfigLoader::new().with_path(path).load(),
        None if std::env::var("FAIRDICE_SEED_KEY").is_ok() => ConfigLoader::new().load(),
        None => Ok(DiceConfig::development()),
    }
}

fn init_tracing(monitoring: &MonitoringConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(monitoring.log_level.as_filter()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match monitoring.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn run_roll(server_seed: &str, client_seed: &str, first_nonce: u64, count: u64) -> DiceResult<()> {
    let mut lines = Vec::new();
    for nonce in nonce_range(first_nonce, count) {
        let outcome = FairRollEngine::roll(server_seed, client_seed, nonce)?;
        lines.push(RollLine {
            nonce: outcome.nonce,
            roll: outcome.roll,
        });
    }

    print_json(&json!({
        "server_seed_commitment": commitment_for(server_seed),
        "client_seed": client_seed,
        "rolls": lines,
    }))
}

/// Up to `count` consecutive nonces from `first`, stopping at `u64::MAX`
fn nonce_range(first: u64, count: u64) -> impl Iterator<Item = u64> {
    (0..count).map_while(move |offset| first.checked_add(offset))
}

fn run_verify(
    server_seed: &str,
    commitment: &str,
    client_seed: Option<String>,
    nonce: Option<u64>,
    roll: Option<RollValue>,
) -> DiceResult<()> {
    let commitment_valid = fairdice::verify_commitment(server_seed, commitment);

    let roll_valid = match (client_seed, nonce, roll) {
        (Some(client_seed), Some(nonce), Some(roll)) => {
            Some(fairdice::verify_roll(server_seed, &client_seed, nonce, roll)?)
        }
        _ => None,
    };

    print_json(&json!({
        "commitment_valid": commitment_valid,
        "roll_valid": roll_valid,
    }))
}

fn run_setup(config: &DiceConfig, chance: WinChance, direction: Direction) -> DiceResult<()> {
    let calculator = DiceSetupCalculator::from_config(&config.game)?;
    let params = calculator.compute(chance, direction)?;

    print_json(&json!({
        "house_edge_bp": calculator.house_edge_bp(),
        "payout_multiplier": params.payout_multiplier.display_value(),
        "params": params,
    }))
}

async fn run_simulate(config: DiceConfig, request: BatchRequest, reveal: bool) -> DiceResult<()> {
    let casino = DiceCasino::new(config)?;
    casino.open_account(&request.owner).await?;

    let result = casino.process_batch(&request).await?;
    let revealed = if reveal {
        Some(casino.reveal_seed(&request.owner).await?)
    } else {
        None
    };

    print_json(&json!({
        "result": result,
        "balance": casino.balance(&request.owner, request.currency)?,
        "house_balance": casino.house_balance(request.currency)?,
        "revealed": revealed,
    }))
}

fn print_json(value: &serde_json::Value) -> DiceResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| fairdice::DiceError::Storage(format!("failed to encode output: {}", e)))?;
    println!("{}", text);
    Ok(())
}
