// Proof-of-work ledger node - entry point

use clap::Parser;
use pow_ledger_node::{Cli, Node, NodeConfig};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Run the node until Ctrl-C
async fn run(config: NodeConfig) -> Result<(), String> {
    let node = Node::new(config);
    node.start().await?;

    if node.config().mine {
        if let Some(address) = node.config().miner_address.clone() {
            node.start_mining(&address).map_err(|e| e.to_string())?;
        }
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to wait for Ctrl-C: {}", e))?;

    log::info!("Shutting down");
    node.shutdown().await;
    Ok(())
}
