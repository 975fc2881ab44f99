//! payoutd - Mining Pool Payout Daemon
//!
//! Run modes:
//!   payoutd run --config config.json         - Start the payout loop
//!   payoutd check --config config.json       - Self test the ledger and RPC endpoints
//!   payoutd accounting --config config.json  - Print wallet balance against owed credits

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::sync::watch;

use payoutd::common::logging::init_from_config;
use payoutd::{accounting_report, PayoutConfig, PayoutContext, PayoutService, PidFile, RunOutcome};

#[derive(Parser)]
#[command(name = "payoutd")]
#[command(about = "Mining pool payout daemon")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true, env = "PAYOUTD_CONFIG", default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the payout loop until interrupted
    Run,

    /// Self test the ledger, daemon and wallet, then exit
    Check,

    /// Print the wallet balance against what is owed to users
    Accounting,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match PayoutConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_from_config(&config) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Run => run(config).await,
        Commands::Check => check(config).await,
        Commands::Accounting => accounting(config).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(target: "payoutd::system", error = %e, "payoutd failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run the payout loop
async fn run(config: PayoutConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let _pidfile = PidFile::acquire(&config.general.pidfile)?;

    config.print_summary();
    tracing::info!(
        target: "payoutd::system",
        pid = std::process::id(),
        version = env!("CARGO_PKG_VERSION"),
        "payoutd initializing"
    );

    let ctx = PayoutContext::connect(config)?;
    let service = PayoutService::new(ctx);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!(target: "payoutd::system", error = %e, "failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    let _ = shutdown_tx.send(true);
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = sigterm.recv() => {},
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        tracing::info!(target: "payoutd::system", "signal received, stopping after the current cycle");
        let _ = shutdown_tx.send(true);
    });

    let outcome = service.run(shutdown_rx).await;
    tracing::info!(target: "payoutd::system", "payoutd ending");

    match outcome {
        RunOutcome::Shutdown => Ok(ExitCode::SUCCESS),
        RunOutcome::Halted(e) => {
            eprintln!("Halted: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Self test only
async fn check(config: PayoutConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let ctx = PayoutContext::connect(config)?;
    let service = PayoutService::new(ctx);

    match service.self_test().await {
        Ok(()) => {
            println!("Self test passed");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("Self test failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Read-only accounting report; safe to run while payouts are halted
async fn accounting(config: PayoutConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let ctx = PayoutContext::connect(config)?;
    let report = accounting_report(&ctx).await?;

    println!("{}", report.render());

    if report.is_solvent(ctx.config.payments.warning_threshold) {
        Ok(ExitCode::SUCCESS)
    } else {
        println!();
        println!("WARNING: wallet balance is short of what is owed");
        Ok(ExitCode::FAILURE)
    }
}
