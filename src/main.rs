// Copyright 2025 chenjjiaa
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod allowance;
mod amount;
mod config;
mod contracts;
mod error;
mod orchestrator;
mod quote;
mod registry;
mod server;
#[cfg(test)]
mod testing;
mod wallet;

use anyhow::{Context, Result};
use dotenv::dotenv;
use ethers::providers::{Http, Provider};
use rmcp::ServiceExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use config::Config;
use contracts::EthersContracts;
use error::SwapError;
use orchestrator::SwapOrchestrator;
use server::SwapMcpServer;
use wallet::LocalWalletTransport;

async fn run_server(server: SwapMcpServer, server_host: String, server_port: u16) -> Result<()> {
    // Determine transport mode: TCP if port is set, otherwise stdio
    if server_port > 0 {
        // TCP mode
        let addr: SocketAddr = format!("{}:{}", server_host, server_port)
            .parse()
            .context("Invalid server address")?;

        let listener = TcpListener::bind(&addr)
            .await
            .context("Failed to bind TCP listener")?;

        let actual_addr = listener
            .local_addr()
            .context("Failed to get local address")?;

        info!(
            "MCP server listening on {}:{}",
            actual_addr.ip(),
            actual_addr.port()
        );

        // Accept connections and serve each one
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    info!("New connection from {}", peer_addr);
                    let server_clone = server.clone();

                    tokio::spawn(async move {
                        let (read, write) = tokio::io::split(stream);
                        if let Err(e) = server_clone.serve((read, write)).await {
                            info!("Connection {} closed with error: {}", peer_addr, e);
                        } else {
                            info!("Connection {} closed gracefully", peer_addr);
                        }
                    });
                }
                Err(e) => {
                    info!("Failed to accept connection: {}", e);
                }
            }
        }
    } else {
        // Stdio mode (default, for MCP standard)
        info!("Starting MCP server on stdio");
        let running_service = server
            .serve((tokio::io::stdin(), tokio::io::stdout()))
            .await?;
        // Wait for the service to finish (will wait for client requests)
        running_service.waiting().await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Initialize tracing with log level from environment or default
    // Use stderr for logs since stdout is used for MCP protocol communication
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr) // Use stderr for logs, stdout is for MCP
        .init();
    info!("Log level: {}", config.log_level);
    info!(
        "Starting swap MCP server with RPC: {} (chain id {})",
        config.rpc_url, config.chain_id
    );

    // Nothing works without a wallet, so refuse to start.
    let wallet = match config.wallet()? {
        Some(wallet) => wallet,
        None => {
            error!("PRIVATE_KEY is not set; a wallet is required to swap");
            return Err(SwapError::NoWalletAvailable).context("Failed to start swap server");
        }
    };

    let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
        .context("Failed to create HTTP provider")?;
    let contracts = EthersContracts::new(provider, wallet.clone(), config.chain_id);
    let transport = LocalWalletTransport::new(Some(wallet));

    let orchestrator = SwapOrchestrator::new(Arc::new(transport), Arc::new(contracts))
        .context("Failed to initialize swap session")?;
    let server = SwapMcpServer::new(orchestrator);

    // Run the server with the specified transport mode
    run_server(server, config.server_host, config.server_port).await?;

    Ok(())
}
