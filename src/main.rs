//! kBTC Custody Backend
//!
//! Run modes:
//!   kbtc-custody api     - Start the REST API server
//!   kbtc-custody demo    - Walk a full mint/burn lifecycle with generated keepers
//!
//! The token ledger, collateral registry and reward hook are wired to
//! in-memory implementations here; production deployments replace them
//! with clients for the real systems.

use std::env;
use std::sync::Arc;

use kbtc::api;
use kbtc::attest::{attestation_digest, generate_keeper_key, sign_attestation};
use kbtc::config::CustodyConfig;
use kbtc::external::mock::{
    InMemoryTokenLedger, RecordingRewardHook, StaticAuthorizer, StaticCollateral,
};
use kbtc::logging::{init_logging, LogLevel};
use kbtc::storage::SqliteStateStore;
use kbtc::types::units::{format_sats, sats_to_units};
use kbtc::{CustodyService, TokenLedger};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "api" => run_api_server().await,
        "demo" => run_demo().await,
        "help" | "--help" | "-h" => print_usage(),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("kBTC Custody Backend");
    println!();
    println!("Usage:");
    println!("  kbtc-custody api     Start the REST API server");
    println!("  kbtc-custody demo    Walk a full mint/burn lifecycle");
    println!();
    println!("Environment Variables:");
    println!("  KBTC_API_PORT                     REST API port (default: 3001)");
    println!("  KBTC_DB_PATH                      SQLite mirror path (unset: in-memory only)");
    println!("  KBTC_SYSTEM_ID                    Attestation domain identity");
    println!("  KBTC_MINT_FEE_BPS                 Mint fee in basis points");
    println!("  KBTC_BURN_FEE_BPS                 Burn fee in basis points");
    println!("  KBTC_MIN_KEEPER_COLLATERAL_SATS   Collateral floor at group creation");
    println!("  KBTC_MINT_GRACE_SECS              Deposit grace period");
    println!("  KBTC_WITHDRAW_VERIFY_TIMEOUT_SECS Stalled-withdrawal settle timeout");
    println!("  KBTC_REFUND_GAP_SECS              Interval between refund-slot writes");
    println!("  KBTC_LOG_LEVEL / KBTC_LOG_JSON    Logging");
}

fn build_service(config: CustodyConfig) -> Result<CustodyService, kbtc::CustodyError> {
    let collateral_floor = config.min_keeper_collateral_sats;
    let db_path = config.db_path.clone();

    let service = CustodyService::new(
        config,
        Arc::new(StaticCollateral::with_default(collateral_floor)),
        Arc::new(InMemoryTokenLedger::new()),
        Arc::new(RecordingRewardHook::new()),
        Arc::new(
            StaticAuthorizer::new()
                .with_group_admin("admin")
                .with_system_admin("admin"),
        ),
    );

    match db_path {
        Some(path) => {
            let mirror = SqliteStateStore::new(&path)
                .map_err(|e| kbtc::CustodyError::storage(e.to_string()))?;
            service.with_mirror(mirror)
        }
        None => Ok(service),
    }
}

async fn run_api_server() {
    let config = match CustodyConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(LogLevel::from(config.log_level.as_str()), config.log_json) {
        eprintln!("logging error: {}", e);
    }

    let port = config.api_port;
    let service = match build_service(config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            eprintln!("startup error: {}", e);
            std::process::exit(1);
        }
    };

    let router = api::router(service);
    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind port {}: {}", port, e);
            std::process::exit(1);
        }
    };

    tracing::info!(target: "kbtc::system", port, "custody API listening");
    if let Err(e) = axum::serve(listener, router).await {
        eprintln!("server error: {}", e);
    }
}

async fn run_demo() {
    println!("=== kBTC Custody Demo ===");
    println!();

    let config = CustodyConfig::default();
    let system_id = config.system_id.clone();
    let token = Arc::new(InMemoryTokenLedger::new());
    let service = CustodyService::new(
        config,
        Arc::new(StaticCollateral::with_default(u64::MAX)),
        token.clone(),
        Arc::new(RecordingRewardHook::new()),
        Arc::new(
            StaticAuthorizer::new()
                .with_group_admin("admin")
                .with_system_admin("admin"),
        ),
    );

    // A 3-of-4 committee over one pooled address
    let keepers: Vec<_> = (0..4).map(|_| generate_keeper_key()).collect();
    let keeper_ids: Vec<String> = keepers.iter().map(|(_, id)| id.clone()).collect();
    let pool = "bc1q_demo_pool";
    let amount = 60_000_000; // 0.6 BTC

    service
        .create_group("admin", pool, 3, amount, keeper_ids)
        .await
        .expect("create group");
    println!("created group {} (3-of-4, capacity {})", pool, format_sats(amount));

    // Deposit request
    let receipt = service
        .request_mint("alice", pool, amount, 1)
        .await
        .expect("request mint");
    println!("alice requested deposit, receipt {}", &receipt.id[..16]);

    // Three keepers attest the funding transaction
    let txid = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
    let digest = attestation_digest(&system_id, &receipt.id, txid, 800_000);
    let signers: Vec<String> = keepers.iter().take(3).map(|(_, id)| id.clone()).collect();
    let signatures: Vec<String> = keepers
        .iter()
        .take(3)
        .map(|(secret, _)| sign_attestation(secret, &digest))
        .collect();

    service
        .verify_mint("keeper-0", &receipt.id, txid, 800_000, &signers, &signatures)
        .await
        .expect("verify mint");
    println!(
        "deposit verified; alice holds {} pegged units",
        token.balance_of("alice").await
    );

    // Withdrawal: top alice up to cover principal + burn fee, then redeem
    let fees = service.fee_state().await;
    let gross = sats_to_units(amount);
    let needed = gross + fees.burn_fee(gross);
    let held = token.balance_of("alice").await;
    token.mint("alice", needed - held).await.expect("top up");

    service
        .request_burn("alice", &receipt.id, "bc1q_alice_payout")
        .await
        .expect("request burn");
    println!("alice requested withdrawal to bc1q_alice_payout");

    service
        .verify_burn("keeper-0", &receipt.id)
        .await
        .expect("verify burn");
    let group = service.get_group(pool).await.expect("group");
    println!(
        "withdrawal settled; group backs {} sats, cooldown until {}",
        group.current_balance_sats, group.cooldown_until
    );

    // The cooldown gates the next deposit request
    match service.request_mint("alice", pool, amount, 2).await {
        Err(e) => println!("immediate re-request rejected as expected: {}", e),
        Ok(_) => println!("unexpected: cooldown did not apply"),
    }

    let fees = service.fee_state().await;
    println!();
    println!(
        "retained fees: {} units (mint {} bps, burn {} bps)",
        fees.accrued_units, fees.mint_fee_bps, fees.burn_fee_bps
    );
    service
        .verify_invariants()
        .await
        .expect("invariants hold");
    println!("invariants hold; demo complete");
}
