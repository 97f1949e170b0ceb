//! pumpwatch - sell into large pump.fun buys
//!
//! Usage:
//!   pumpwatch            (configuration from the environment / .env)
//!
//! Operator commands on stdin:
//!   watch <mint>   switch the watched asset
//!   status         print a status summary
//!   quit           stop monitoring and exit (Ctrl-C does the same)

use std::sync::Arc;

use dotenv::dotenv;
use log::{error, info, warn};
use solana_keypair::Keypair;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use pumpwatch::executor::submitter::keypair_from_base58;
use pumpwatch::orchestrator::OrchestratorSettings;
use pumpwatch::parser::{HttpParsingService, ParsingService};
use pumpwatch::rpc::{EndpointPool, RpcConnector};
use pumpwatch::sink::LogSink;
use pumpwatch::{Config, OperatorCommand, Orchestrator, Services};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .target(env_logger::Target::Stderr)
                .init();
            error!("❌ Configuration error: {}", e);
            return Err(e.into());
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.rust_log.as_str()))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Starting pumpwatch");
    info!("📊 Configuration:");
    info!("   ├─ Endpoints: {}", config.endpoints.len());
    info!(
        "   ├─ Watched mint: {}",
        config.watched_mint.map(|m| m.to_string()).unwrap_or_else(|| "<none>".to_string())
    );
    info!("   ├─ Buy threshold: {} SOL", config.buy_threshold_sol);
    info!("   ├─ Sell percentage: {}%", config.sell_percentage);
    info!("   ├─ Poll interval: {:?}", config.poll_interval);
    info!(
        "   ├─ Parsing service: {}",
        if config.parser_url.is_some() { "enabled" } else { "disabled (RPC detail)" }
    );
    info!("   └─ Dry run: {}", config.dry_run);

    let keypair = match &config.wallet_private_key {
        Some(encoded) => keypair_from_base58(encoded)?,
        None => {
            warn!("⚠️  No WALLET_PRIVATE_KEY; dry run with an ephemeral keypair");
            Keypair::new()
        }
    };

    let pool = EndpointPool::new(config.endpoints.clone(), config.rate_limit_strikes, config.rotation_cooldown)
        .ok_or("RPC_ENDPOINTS lists no endpoint")?
        .shared();
    let submitter = pumpwatch::executor::RpcSubmitter::new(
        keypair,
        pool.clone(),
        config.confirm_timeout,
        config.dry_run,
    );

    let parser: Option<Arc<dyn ParsingService>> = match &config.parser_url {
        Some(url) => Some(Arc::new(HttpParsingService::new(url, config.parser_api_key.as_deref())?)),
        None => None,
    };

    let services = Services {
        pool,
        connector: Arc::new(RpcConnector),
        parser,
        submitter: Arc::new(submitter),
        sink: Arc::new(LogSink),
    };

    let orchestrator = Orchestrator::new(
        config.watched_mint,
        OrchestratorSettings::from_config(&config),
        services,
    );

    let (command_tx, command_rx) = mpsc::channel(8);

    let stdin_tx = command_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<OperatorCommand>() {
                Ok(command) => {
                    let shutdown = command == OperatorCommand::Shutdown;
                    if stdin_tx.send(command).await.is_err() || shutdown {
                        break;
                    }
                }
                Err(e) => warn!("⚠️  {}", e),
            }
        }
    });

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Received Ctrl+C");
                let _ = command_tx.send(OperatorCommand::Shutdown).await;
            }
            Err(e) => error!("❌ Unable to listen for shutdown signal: {}", e),
        }
    });

    orchestrator.run_until_shutdown(command_rx).await;

    info!("👋 pumpwatch stopped");
    Ok(())
}
