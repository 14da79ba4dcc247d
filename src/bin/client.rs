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

use anyhow::Result;
use dotenv::dotenv;
use rmcp::{
    model::{CallToolRequestParam, CallToolResult},
    service::{RoleClient, RunningService, ServiceExt},
    transport::TokioChildProcess,
};
use serde_json::{json, Value};
use std::env;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::error;

fn print_result(result: CallToolResult) {
    for content in result.content {
        match content.raw {
            rmcp::model::RawContent::Text(text) => {
                println!("{}", text.text);
            }
            _ => println!("{:#?}", content),
        }
    }
    println!();
}

async fn call(
    service: &RunningService<RoleClient, ()>,
    name: &'static str,
    arguments: Value,
) -> Result<()> {
    println!("> {}", name);
    let result = service
        .call_tool(CallToolRequestParam {
            name: name.into(),
            arguments: arguments.as_object().cloned(),
        })
        .await;

    match result {
        Ok(result) => {
            print_result(result);
            Ok(())
        }
        Err(e) => {
            error!("{} failed: {}", name, e);
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let amount = env::var("SWAP_AMOUNT").unwrap_or_else(|_| "1".to_string());
    let exchange = env::var("SWAP_EXCHANGE").unwrap_or_else(|_| "Sushi".to_string());
    let from_token = env::var("SWAP_FROM").unwrap_or_else(|_| "1USDC".to_string());
    let to_token = env::var("SWAP_TO").unwrap_or_else(|_| "WONE".to_string());
    // Approving and swapping spend real funds; only do it when asked.
    let execute = env::var("SWAP_EXECUTE").map(|v| v == "1").unwrap_or(false);

    // Get the path to the server binary
    let server_path = if PathBuf::from("target/debug/server").exists() {
        "target/debug/server"
    } else {
        "target/release/server"
    };

    println!("Starting MCP client...");
    println!("Connecting to server at: {}", server_path);

    let mut cmd = Command::new(server_path);
    cmd.stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    let service = ().serve(TokioChildProcess::new(cmd)?).await?;
    println!("\nConnected to server!\n");

    // List available tools
    let tools = service.list_tools(Default::default()).await?;
    println!("Available tools:");
    for tool in tools.tools {
        println!(
            "  - {}: {}",
            tool.name,
            tool.description.unwrap_or_default()
        );
    }
    println!();

    let session = async {
        call(&service, "list_catalog", json!({})).await?;
        call(&service, "connect_wallet", json!({})).await?;
        call(&service, "select_exchange", json!({ "exchange": exchange })).await?;
        call(
            &service,
            "select_token",
            json!({ "side": "destination", "token": to_token }),
        )
        .await?;
        call(
            &service,
            "select_token",
            json!({ "side": "source", "token": from_token }),
        )
        .await?;
        call(&service, "set_source_amount", json!({ "amount": amount })).await?;

        if execute {
            call(&service, "approve", json!({})).await?;
            call(&service, "submit_swap", json!({})).await?;
        } else {
            println!("Set SWAP_EXECUTE=1 to approve and submit the swap\n");
        }

        call(&service, "get_session", json!({})).await
    };
    let outcome: Result<()> = session.await;

    // Cleanup
    service.cancel().await?;
    println!("👋 Client disconnected. Goodbye!");

    outcome
}
