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

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::contracts::TxReceipt;
use crate::error::SwapError;
use crate::orchestrator::{SessionSnapshot, SwapOrchestrator, TokenSide};
use crate::quote::QuoteRequest;
use crate::registry::{self, Exchange, ExchangeId, Token};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SelectExchangeInput {
    /// Exchange name: "Sushi", "Viper" or "DFK"
    pub exchange: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SelectTokenInput {
    /// Which side of the swap to set: "source" or "destination"
    pub side: TokenSide,
    /// Token symbol (e.g., "1USDC") or contract address
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetAmountInput {
    /// Amount of the source token in human-readable format (e.g., "10.5"). Empty clears it
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FeeOnTransferInput {
    /// Use the router variant that supports fee-on-transfer tokens
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
struct CatalogOutput {
    tokens: Vec<Token>,
    exchanges: Vec<Exchange>,
    default_exchange: ExchangeId,
}

#[derive(Debug, Clone, Serialize)]
struct SessionOutput {
    session: SessionSnapshot,
    /// Non-fatal problem with the action, e.g. a quote that could not be fetched
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

fn to_mcp_error(err: SwapError) -> McpError {
    if err.is_user_error() {
        McpError::invalid_params(err.to_string(), None)
    } else {
        McpError::internal_error(err.to_string(), None)
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json_result = serde_json::to_string_pretty(value).map_err(|e| {
        McpError::internal_error(format!("Error serializing result: {}", e), None)
    })?;
    Ok(CallToolResult::success(vec![Content::text(json_result)]))
}

/// MCP front end for a single swap session.
///
/// The session lock is held only while the orchestrator checks or records
/// state, never across a wallet or contract call, so a second approve or swap
/// arriving mid-flight is rejected instead of queued. Approvals and swaps run
/// in their own task and always report back to the session, even when the
/// tool call that started them is cancelled.
#[derive(Clone)]
pub struct SwapMcpServer {
    orchestrator: Arc<Mutex<SwapOrchestrator>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl SwapMcpServer {
    pub fn new(orchestrator: SwapOrchestrator) -> Self {
        let tool_router = Self::tool_router();
        info!("Tool router initialized");

        Self {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            tool_router,
        }
    }

    async fn session_result(&self, warning: Option<String>) -> Result<CallToolResult, McpError> {
        let session = self.orchestrator.lock().await.snapshot();
        json_result(&SessionOutput { session, warning })
    }

    /// Fetch a quote outside the lock and apply it if it is still current.
    async fn settle_quote(
        &self,
        request: Result<Option<QuoteRequest>, SwapError>,
    ) -> Result<CallToolResult, McpError> {
        let warning = match request.map_err(to_mcp_error)? {
            Some(request) => {
                let response = request.fetch().await;
                let mut orchestrator = self.orchestrator.lock().await;
                match orchestrator.apply_quote(response) {
                    Ok(outcome) => {
                        info!("Quote outcome: {:?}", outcome);
                        None
                    }
                    Err(e) => Some(e.to_string()),
                }
            }
            None => None,
        };
        self.session_result(warning).await
    }

    /// Submit the approval in a detached task and record its outcome.
    async fn run_approval(&self) -> Result<TxReceipt, SwapError> {
        let ticket = self.orchestrator.lock().await.begin_approval()?;
        let orchestrator = self.orchestrator.clone();
        let task = tokio::spawn(async move {
            let outcome = ticket.submit().await;
            orchestrator.lock().await.finish_approval(outcome)
        });
        task.await
            .map_err(|e| SwapError::ApprovalFailed(format!("approval task aborted: {}", e)))?
    }

    /// Submit the swap in a detached task and record its outcome.
    async fn run_swap(&self) -> Result<TxReceipt, SwapError> {
        let ticket = self.orchestrator.lock().await.begin_swap()?;
        let orchestrator = self.orchestrator.clone();
        let task = tokio::spawn(async move {
            let outcome = ticket.execute().await;
            orchestrator.lock().await.finish_swap(outcome)
        });
        task.await
            .map_err(|e| SwapError::SwapFailed(format!("swap task aborted: {}", e)))?
    }

    #[tool(description = "List the tokens and exchanges this swap client supports")]
    async fn list_catalog(&self) -> Result<CallToolResult, McpError> {
        let catalog = registry::tokens().and_then(|tokens| {
            Ok(CatalogOutput {
                tokens,
                exchanges: registry::exchanges()?,
                default_exchange: ExchangeId::default(),
            })
        });
        let catalog = catalog.map_err(|e| McpError::internal_error(e.to_string(), None))?;
        json_result(&catalog)
    }

    #[tool(description = "Show the current swap session: selection, amounts, quote and approval")]
    async fn get_session(&self) -> Result<CallToolResult, McpError> {
        self.session_result(None).await
    }

    #[tool(description = "Connect the wallet and bind the session to its first account")]
    #[instrument(skip(self))]
    async fn connect_wallet(&self) -> Result<CallToolResult, McpError> {
        let wallet = self
            .orchestrator
            .lock()
            .await
            .begin_connect()
            .map_err(to_mcp_error)?;

        let accounts = wallet.request_accounts().await;

        let request = {
            let mut orchestrator = self.orchestrator.lock().await;
            orchestrator.finish_connect(accounts).map_err(to_mcp_error)?;
            orchestrator.request_quote()
        };
        self.settle_quote(request).await
    }

    #[tool(description = "Select the DEX router used for quotes and swaps, then re-quote")]
    #[instrument(skip(self))]
    async fn select_exchange(
        &self,
        params: Parameters<SelectExchangeInput>,
    ) -> Result<CallToolResult, McpError> {
        info!("select_exchange called with params: {:?}", params.0);
        let id: ExchangeId = params.0.exchange.parse().map_err(to_mcp_error)?;
        let request = self.orchestrator.lock().await.select_exchange(id);
        self.settle_quote(request).await
    }

    #[tool(description = "Select the source or destination token by symbol or address, then re-quote")]
    #[instrument(skip(self))]
    async fn select_token(
        &self,
        params: Parameters<SelectTokenInput>,
    ) -> Result<CallToolResult, McpError> {
        info!("select_token called with params: {:?}", params.0);
        let input = params.0;
        let token = registry::resolve_token(&input.token).map_err(to_mcp_error)?;
        let request = self
            .orchestrator
            .lock()
            .await
            .select_token(input.side, token.address);
        self.settle_quote(request).await
    }

    #[tool(description = "Enter the amount of source token to swap and fetch a quote")]
    #[instrument(skip(self))]
    async fn set_source_amount(
        &self,
        params: Parameters<SetAmountInput>,
    ) -> Result<CallToolResult, McpError> {
        info!("set_source_amount called with params: {:?}", params.0);
        let request = self
            .orchestrator
            .lock()
            .await
            .set_source_amount(&params.0.amount);
        self.settle_quote(request).await
    }

    #[tool(description = "Toggle the router variant for fee-on-transfer tokens")]
    #[instrument(skip(self))]
    async fn set_fee_on_transfer(
        &self,
        params: Parameters<FeeOnTransferInput>,
    ) -> Result<CallToolResult, McpError> {
        self.orchestrator
            .lock()
            .await
            .set_fee_on_transfer(params.0.enabled)
            .map_err(to_mcp_error)?;
        self.session_result(None).await
    }

    #[tool(
        description = "Approve the selected router to spend exactly the entered source amount. Sends an on-chain transaction and waits for it to be mined."
    )]
    #[instrument(skip(self))]
    async fn approve(&self) -> Result<CallToolResult, McpError> {
        match self.run_approval().await {
            Ok(receipt) => {
                info!("Approval mined: {:?}", receipt.transaction_hash);
                self.session_result(None).await
            }
            Err(e) => {
                warn!("Approval failed: {}", e);
                Err(to_mcp_error(e))
            }
        }
    }

    #[tool(
        description = "Swap the entered source amount on the selected router, accepting at most 15% slippage from the current quote. Requires a prior approval; never retried automatically."
    )]
    #[instrument(skip(self))]
    async fn submit_swap(&self) -> Result<CallToolResult, McpError> {
        match self.run_swap().await {
            Ok(receipt) => {
                info!("Swap mined: {:?}", receipt.transaction_hash);
                self.session_result(None).await
            }
            Err(e) => {
                warn!("Swap failed: {}", e);
                Err(to_mcp_error(e))
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for SwapMcpServer {
    fn get_info(&self) -> ServerInfo {
        let tools = self.tool_router.list_all();
        info!("get_info called, router has {} tools", tools.len());
        for tool in &tools {
            info!(
                "Tool registered: {} - {}",
                tool.name,
                tool.description.as_deref().unwrap_or("")
            );
        }
        ServerInfo {
            instructions: Some(
                "Multi-DEX token swap session: connect the wallet, pick an exchange and token pair, enter an amount, approve, then swap".into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::SwapState;
    use crate::testing::{MockContracts, MockWallet};
    use ethers::types::Address;

    fn server() -> (SwapMcpServer, Arc<MockContracts>) {
        let contracts = Arc::new(MockContracts::default());
        let orchestrator = SwapOrchestrator::new(
            Arc::new(MockWallet::account(Address::repeat_byte(0xaa))),
            contracts.clone(),
        )
        .unwrap();
        (SwapMcpServer::new(orchestrator), contracts)
    }

    #[test]
    fn registers_every_session_tool() {
        let (server, _) = server();
        let names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        for expected in [
            "list_catalog",
            "get_session",
            "connect_wallet",
            "select_exchange",
            "select_token",
            "set_source_amount",
            "set_fee_on_transfer",
            "approve",
            "submit_swap",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing tool {}", expected);
        }
    }

    #[tokio::test]
    async fn concurrent_approvals_submit_one_transaction() {
        let (server, contracts) = server();
        server.connect_wallet().await.unwrap();
        server
            .set_source_amount(Parameters(SetAmountInput {
                amount: "10".into(),
            }))
            .await
            .unwrap();

        let usdc = registry::lookup_token_by_symbol("1USDC").unwrap();
        let token = contracts.mock_token(usdc.address);
        token.hold();
        let release = async {
            tokio::task::yield_now().await;
            token.release();
        };

        let (first, second, ()) = tokio::join!(server.approve(), server.approve(), release);
        assert_eq!(
            first.is_ok() as u8 + second.is_ok() as u8,
            1,
            "exactly one approval should go through"
        );

        assert_eq!(token.approvals().len(), 1);
    }

    async fn wait_for_state(server: &SwapMcpServer, want: bool, state: SwapState) {
        for _ in 0..100 {
            if (server.orchestrator.lock().await.state() == state) == want {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("session never {} {:?}", if want { "reached" } else { "left" }, state);
    }

    #[tokio::test]
    async fn cancelled_approval_call_does_not_block_the_next_one() {
        let (server, contracts) = server();
        server.connect_wallet().await.unwrap();
        server
            .set_source_amount(Parameters(SetAmountInput {
                amount: "10".into(),
            }))
            .await
            .unwrap();

        let usdc = registry::lookup_token_by_symbol("1USDC").unwrap();
        let token = contracts.mock_token(usdc.address);
        token.hold();

        let call = tokio::spawn({
            let server = server.clone();
            async move { server.approve().await.map(|_| ()) }
        });
        wait_for_state(&server, true, SwapState::Approving).await;
        call.abort();
        assert!(call.await.unwrap_err().is_cancelled());

        token.release();
        wait_for_state(&server, false, SwapState::Approving).await;
        assert_eq!(server.orchestrator.lock().await.state(), SwapState::Approved);

        server.approve().await.unwrap();
        assert_eq!(token.approvals().len(), 2);
    }

    #[tokio::test]
    async fn connect_then_quote_reports_destination_amount() {
        let (server, _) = server();
        server.connect_wallet().await.unwrap();
        server
            .set_source_amount(Parameters(SetAmountInput {
                amount: "2".into(),
            }))
            .await
            .unwrap();

        let orchestrator = server.orchestrator.lock().await;
        assert_eq!(orchestrator.state(), SwapState::QuoteReady);
        assert_eq!(orchestrator.snapshot().destination_amount, "0.000000000002");
    }

    #[tokio::test]
    async fn catalog_lists_every_exchange() {
        let (server, _) = server();
        let result = server.list_catalog().await.unwrap();
        let text = match &result.content[0].raw {
            rmcp::model::RawContent::Text(text) => text.text.clone(),
            other => panic!("unexpected content {:?}", other),
        };
        let catalog: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(catalog["exchanges"].as_array().unwrap().len(), 3);
        assert_eq!(catalog["tokens"].as_array().unwrap().len(), 3);
        assert_eq!(catalog["default_exchange"], "sushi");
    }

    #[tokio::test]
    async fn validation_errors_are_invalid_params() {
        let (server, _) = server();
        let err = server
            .select_exchange(Parameters(SelectExchangeInput {
                exchange: "uniswap".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    }
}
