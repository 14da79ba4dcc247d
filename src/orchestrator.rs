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

//! The swap session and the state machine that drives it:
//! connect -> quote -> approve -> swap.
//!
//! Every remote step is split in three. A synchronous `begin_*` (or
//! `request_quote`) checks preconditions, marks the session and returns a
//! self-contained ticket. The ticket runs without borrowing the session. A
//! synchronous `finish_*` (or `apply_quote`) reconciles the outcome with
//! whatever the session looks like by then.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, instrument, warn};

use crate::allowance::{AllowanceGrant, ApprovalResult, ApprovalTicket};
use crate::amount::{self, SLIPPAGE_TOLERANCE_PERCENT};
use crate::contracts::{ContractFactory, SwapOrder, TxReceipt};
use crate::error::{SwapError, WalletError};
use crate::quote::{QuoteOutcome, QuoteRequest, QuoteResponse, QuoteTag, RouterHandle};
use crate::registry::{
    self, Exchange, ExchangeId, Operation, Token, DEFAULT_DESTINATION_TOKEN, DEFAULT_SOURCE_TOKEN,
};
use crate::wallet::WalletTransport;

/// How long a submitted swap stays valid on chain.
pub const SWAP_DEADLINE: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TokenSide {
    Source,
    Destination,
}

impl TokenSide {
    fn label(self) -> &'static str {
        match self {
            TokenSide::Source => "source",
            TokenSide::Destination => "destination",
        }
    }

    fn opposite(self) -> TokenSide {
        match self {
            TokenSide::Source => TokenSide::Destination,
            TokenSide::Destination => TokenSide::Source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapState {
    Disconnected,
    Connected,
    QuoteReady,
    Approving,
    Approved,
    Swapping,
    SwapComplete,
}

#[derive(Debug, Clone)]
struct AppliedQuote {
    tag: QuoteTag,
    amount_out: U256,
}

/// Result of the most recent completed swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapReceipt {
    pub exchange: String,
    pub receipt: TxReceipt,
    pub amount_in: String,
    pub minimum_out: String,
    pub fee_on_transfer: bool,
}

/// Session state for one user. Owned by [`SwapOrchestrator`]; read-only to
/// everyone else.
#[derive(Debug)]
pub struct SwapSession {
    connected_account: Option<Address>,
    selected_exchange: ExchangeId,
    source_token: Token,
    destination_token: Token,
    source_amount: String,
    destination_amount: String,
    is_approved: bool,
    allowance: Option<AllowanceGrant>,
    router: Option<RouterHandle>,
    fee_on_transfer: bool,
    quote: Option<AppliedQuote>,
    last_swap: Option<SwapReceipt>,
    approval_in_flight: bool,
    swap_in_flight: bool,
    wallet_unavailable: bool,
}

impl SwapSession {
    fn new() -> Result<Self, SwapError> {
        Ok(Self {
            connected_account: None,
            selected_exchange: ExchangeId::default(),
            source_token: registry::lookup_token_by_symbol(DEFAULT_SOURCE_TOKEN)?,
            destination_token: registry::lookup_token_by_symbol(DEFAULT_DESTINATION_TOKEN)?,
            source_amount: String::new(),
            destination_amount: String::new(),
            is_approved: false,
            allowance: None,
            router: None,
            fee_on_transfer: false,
            quote: None,
            last_swap: None,
            approval_in_flight: false,
            swap_in_flight: false,
            wallet_unavailable: false,
        })
    }

    pub fn connected_account(&self) -> Option<Address> {
        self.connected_account
    }

    pub fn selected_exchange(&self) -> ExchangeId {
        self.selected_exchange
    }

    pub fn source_token(&self) -> &Token {
        &self.source_token
    }

    pub fn destination_token(&self) -> &Token {
        &self.destination_token
    }

    pub fn source_amount(&self) -> &str {
        &self.source_amount
    }

    pub fn destination_amount(&self) -> &str {
        &self.destination_amount
    }

    pub fn is_approved(&self) -> bool {
        self.is_approved
    }

    pub fn fee_on_transfer(&self) -> bool {
        self.fee_on_transfer
    }

    pub fn last_swap(&self) -> Option<&SwapReceipt> {
        self.last_swap.as_ref()
    }

    fn tag(&self) -> QuoteTag {
        QuoteTag {
            exchange: self.selected_exchange,
            source: self.source_token.address,
            destination: self.destination_token.address,
            source_amount: self.source_amount.clone(),
        }
    }

    fn fresh_quote(&self) -> Option<&AppliedQuote> {
        let tag = self.tag();
        self.quote.as_ref().filter(|quote| quote.tag == tag)
    }

    fn source_units(&self) -> Result<U256, SwapError> {
        if self.source_amount.is_empty() {
            return Ok(U256::zero());
        }
        amount::to_base_units(&self.source_amount, self.source_token.decimals)
    }

    fn clear_quote(&mut self) {
        self.destination_amount.clear();
        self.quote = None;
    }

    fn revoke_approval(&mut self) {
        self.is_approved = false;
        self.allowance = None;
    }

    /// Re-evaluate `is_approved` against the recorded grant.
    fn refresh_approval(&mut self) {
        let spender = match registry::lookup_exchange(self.selected_exchange) {
            Ok(exchange) => Some(exchange.router),
            Err(e) => {
                error!("Selected exchange missing from catalog: {}", e);
                None
            }
        };
        self.is_approved = match (
            &self.allowance,
            self.connected_account,
            spender,
            self.source_units(),
        ) {
            (Some(grant), Some(owner), Some(spender), Ok(units)) if !units.is_zero() => {
                grant.covers(owner, self.source_token.address, spender, units)
            }
            _ => false,
        };
    }
}

/// Serializable view of the session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SwapState,
    pub connected_account: Option<Address>,
    pub exchange: String,
    pub router: Option<Address>,
    pub source_token: Token,
    pub destination_token: Token,
    pub source_amount: String,
    pub destination_amount: String,
    pub quote_is_fresh: bool,
    pub is_approved: bool,
    pub approved_amount: Option<String>,
    pub fee_on_transfer: bool,
    pub slippage_tolerance_percent: String,
    pub last_swap: Option<SwapReceipt>,
}

/// A swap transaction ready to submit.
pub struct SwapTicket {
    pub order: SwapOrder,
    pub source: Token,
    pub destination: Token,
    pub fee_on_transfer: bool,
    pub router: RouterHandle,
}

impl std::fmt::Debug for SwapTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapTicket")
            .field("order", &self.order)
            .field("source", &self.source.symbol)
            .field("destination", &self.destination.symbol)
            .field("fee_on_transfer", &self.fee_on_transfer)
            .field("router", &self.router)
            .finish()
    }
}

impl SwapTicket {
    #[instrument(skip(self), fields(exchange = self.router.exchange.name))]
    pub async fn execute(self) -> SwapResult {
        let contract = &self.router.contract;
        let result = if self.fee_on_transfer {
            contract
                .swap_exact_tokens_for_tokens_supporting_fee_on_transfer(&self.order)
                .await
        } else {
            contract.swap_exact_tokens_for_tokens(&self.order).await
        };
        let result = result.map_err(|e| {
            error!("Swap on {} failed: {}", self.router.exchange.name, e);
            SwapError::SwapFailed(e.to_string())
        });

        SwapResult {
            ticket_exchange: self.router.exchange.name.to_string(),
            order: self.order,
            source: self.source,
            destination: self.destination,
            fee_on_transfer: self.fee_on_transfer,
            result,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SwapResult {
    ticket_exchange: String,
    order: SwapOrder,
    source: Token,
    destination: Token,
    fee_on_transfer: bool,
    pub result: Result<TxReceipt, SwapError>,
}

fn swap_deadline(now: SystemTime) -> U256 {
    let now = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    U256::from(now + SWAP_DEADLINE.as_secs())
}

pub struct SwapOrchestrator {
    session: SwapSession,
    wallet: Arc<dyn WalletTransport>,
    contracts: Arc<dyn ContractFactory>,
}

impl SwapOrchestrator {
    pub fn new(
        wallet: Arc<dyn WalletTransport>,
        contracts: Arc<dyn ContractFactory>,
    ) -> Result<Self, SwapError> {
        Ok(Self {
            session: SwapSession::new()?,
            wallet,
            contracts,
        })
    }

    pub fn session(&self) -> &SwapSession {
        &self.session
    }

    pub fn state(&self) -> SwapState {
        let s = &self.session;
        if s.connected_account.is_none() {
            SwapState::Disconnected
        } else if s.swap_in_flight {
            SwapState::Swapping
        } else if s.last_swap.is_some() {
            SwapState::SwapComplete
        } else if s.approval_in_flight {
            SwapState::Approving
        } else if s.is_approved {
            SwapState::Approved
        } else if s.fresh_quote().is_some() {
            SwapState::QuoteReady
        } else {
            SwapState::Connected
        }
    }

    pub fn exchange(&self) -> Result<Exchange, SwapError> {
        registry::lookup_exchange(self.session.selected_exchange)
    }

    fn ensure_wallet(&self) -> Result<(), SwapError> {
        if self.session.wallet_unavailable {
            Err(SwapError::NoWalletAvailable)
        } else {
            Ok(())
        }
    }

    fn require_account(&self) -> Result<Address, SwapError> {
        self.ensure_wallet()?;
        self.session.connected_account.ok_or(SwapError::NotConnected)
    }

    /// The router binding for the selected exchange, built on first use after
    /// the exchange or the connection changed.
    fn router_handle(&mut self) -> Result<RouterHandle, SwapError> {
        if let Some(handle) = &self.session.router {
            return Ok(handle.clone());
        }
        let exchange = self.exchange()?;
        debug!("Binding router {} at {:?}", exchange.name, exchange.router);
        let handle = RouterHandle {
            contract: self.contracts.router(exchange.router),
            exchange,
            account: self.session.connected_account,
        };
        self.session.router = Some(handle.clone());
        Ok(handle)
    }

    /// The wallet to ask for accounts. The request itself runs without the
    /// session; hand its answer to [`SwapOrchestrator::finish_connect`].
    pub fn begin_connect(&self) -> Result<Arc<dyn WalletTransport>, SwapError> {
        self.ensure_wallet()?;
        Ok(self.wallet.clone())
    }

    /// Bind the session to the first account the wallet granted.
    pub fn finish_connect(
        &mut self,
        accounts: Result<Vec<Address>, WalletError>,
    ) -> Result<Address, SwapError> {
        self.ensure_wallet()?;

        let accounts = match accounts {
            Ok(accounts) => accounts,
            Err(e) => {
                error!("Wallet connection failed, session cannot continue: {}", e);
                self.session.wallet_unavailable = true;
                return Err(e.into());
            }
        };

        let account = accounts.first().copied().ok_or_else(|| {
            warn!("Wallet returned no accounts");
            SwapError::ConnectionRejected("wallet returned no accounts".into())
        })?;

        if self.session.connected_account != Some(account) {
            self.session.connected_account = Some(account);
            self.session.router = None;
            self.session.revoke_approval();
        }
        info!("Connected account {:?}", account);
        Ok(account)
    }

    /// Switch exchanges, keeping the pair and amount, and re-quote.
    #[instrument(skip(self))]
    pub fn select_exchange(&mut self, id: ExchangeId) -> Result<Option<QuoteRequest>, SwapError> {
        self.ensure_wallet()?;
        let exchange = registry::lookup_exchange(id)?;

        if exchange.id != self.session.selected_exchange {
            info!("Selected exchange {}", exchange.name);
            self.session.selected_exchange = exchange.id;
            self.session.router = None;
            // The allowance was granted to the previous router.
            self.session.revoke_approval();
            if self.session.fee_on_transfer && !exchange.supports(Operation::SwapWithFeeOnTransfer) {
                self.session.fee_on_transfer = false;
            }
        }
        self.session.last_swap = None;
        self.request_quote()
    }

    /// Choose the token for one side of the pair and re-quote.
    ///
    /// Selecting the token already on the other side is rejected without
    /// touching the session.
    #[instrument(skip(self))]
    pub fn select_token(
        &mut self,
        side: TokenSide,
        address: Address,
    ) -> Result<Option<QuoteRequest>, SwapError> {
        self.ensure_wallet()?;
        let token = registry::lookup_token(address)?;

        let other = match side {
            TokenSide::Source => &self.session.destination_token,
            TokenSide::Destination => &self.session.source_token,
        };
        if token.address == other.address {
            return Err(SwapError::InvalidSelection(format!(
                "{} is already the {} token",
                token.symbol,
                side.opposite().label()
            )));
        }

        if side == TokenSide::Source && !self.session.source_amount.is_empty() {
            // The entered amount must still fit the new token's precision.
            amount::to_base_units(&self.session.source_amount, token.decimals)?;
        }

        info!("Selected {} token {}", side.label(), token.symbol);
        match side {
            TokenSide::Source => self.session.source_token = token,
            TokenSide::Destination => self.session.destination_token = token,
        }
        self.session.revoke_approval();
        self.session.last_swap = None;
        self.request_quote()
    }

    /// Record the user's input amount and re-quote when it is positive.
    ///
    /// Empty or zero input clears the destination amount without a request.
    /// Invalid input is rejected and the session is left as it was.
    #[instrument(skip(self))]
    pub fn set_source_amount(&mut self, text: &str) -> Result<Option<QuoteRequest>, SwapError> {
        self.ensure_wallet()?;
        let text = text.trim();

        let units = if text.is_empty() {
            U256::zero()
        } else {
            amount::to_base_units(text, self.session.source_token.decimals)?
        };

        self.session.source_amount = text.to_string();
        self.session.last_swap = None;
        self.session.refresh_approval();

        if units.is_zero() {
            self.session.clear_quote();
            return Ok(None);
        }
        self.request_quote()
    }

    pub fn set_fee_on_transfer(&mut self, enabled: bool) -> Result<(), SwapError> {
        self.ensure_wallet()?;
        if enabled {
            self.exchange()?.require(Operation::SwapWithFeeOnTransfer)?;
        }
        self.session.fee_on_transfer = enabled;
        Ok(())
    }

    /// A quote request for the current pair and amount, if one can be issued:
    /// the wallet is connected and the amount is positive.
    pub fn request_quote(&mut self) -> Result<Option<QuoteRequest>, SwapError> {
        if self.session.connected_account.is_none() {
            debug!("Not connected; skipping quote");
            return Ok(None);
        }
        let amount_in = self.session.source_units()?;
        if amount_in.is_zero() {
            self.session.clear_quote();
            return Ok(None);
        }

        let router = self.router_handle()?;
        let tag = self.session.tag();
        debug!("Issuing quote request {:?}", tag);
        Ok(Some(QuoteRequest {
            tag,
            amount_in,
            destination: self.session.destination_token.clone(),
            router,
        }))
    }

    /// Apply a quote response if it still matches the session.
    ///
    /// A stale response is discarded whether it succeeded or not. A failed
    /// response for the current inputs leaves the displayed amount in place.
    pub fn apply_quote(&mut self, response: QuoteResponse) -> Result<QuoteOutcome, SwapError> {
        if response.tag != self.session.tag() {
            debug!("Discarding stale quote for {:?}", response.tag);
            return Ok(QuoteOutcome::Discarded);
        }

        match response.result {
            Ok(amount_out) => {
                let display_amount = amount::to_decimal_string(amount_out, response.destination.decimals);
                info!(
                    "Quote {} {} -> {} {}",
                    response.tag.source_amount,
                    self.session.source_token.symbol,
                    display_amount,
                    response.destination.symbol
                );
                self.session.destination_amount = display_amount.clone();
                self.session.quote = Some(AppliedQuote {
                    tag: response.tag,
                    amount_out,
                });
                Ok(QuoteOutcome::Applied(display_amount))
            }
            Err(e) => {
                warn!(
                    "Quote failed, keeping destination amount {:?}: {}",
                    self.session.destination_amount, e
                );
                Err(e)
            }
        }
    }

    /// Start an approval for exactly the entered amount. Only one approval
    /// may be in flight.
    pub fn begin_approval(&mut self) -> Result<ApprovalTicket, SwapError> {
        let owner = self.require_account()?;
        if self.session.approval_in_flight {
            warn!("Rejecting approve: another approval is in flight");
            return Err(SwapError::OperationInFlight("approve"));
        }
        let amount = self.session.source_units()?;
        if amount.is_zero() {
            return Err(SwapError::InvalidAmount(
                "enter an amount before approving".into(),
            ));
        }

        let router = self.router_handle()?;
        let token = self.session.source_token.clone();
        let ticket = ApprovalTicket {
            grant: AllowanceGrant {
                owner,
                token: token.address,
                spender: router.exchange.router,
                amount,
            },
            contract: self.contracts.token(token.address),
            token,
        };
        self.session.approval_in_flight = true;
        info!(
            "Approval started: {} base units of {} for {}",
            amount, ticket.token.symbol, router.exchange.name
        );
        Ok(ticket)
    }

    pub fn finish_approval(&mut self, outcome: ApprovalResult) -> Result<TxReceipt, SwapError> {
        self.session.approval_in_flight = false;
        let receipt = outcome.result?;

        let grant = outcome.grant;
        let current_spender = self.exchange()?.router;
        let still_relevant = Some(grant.owner) == self.session.connected_account
            && grant.token == self.session.source_token.address
            && grant.spender == current_spender;

        if still_relevant {
            self.session.allowance = Some(grant);
            self.session.refresh_approval();
        } else {
            warn!("Approval confirmed for a selection that is no longer current");
        }
        Ok(receipt)
    }

    /// Start a swap of the entered amount against the fresh quote, allowing
    /// the fixed slippage tolerance and a ten minute deadline.
    pub fn begin_swap(&mut self) -> Result<SwapTicket, SwapError> {
        self.begin_swap_at(SystemTime::now())
    }

    fn begin_swap_at(&mut self, now: SystemTime) -> Result<SwapTicket, SwapError> {
        let recipient = self.require_account()?;
        if self.session.swap_in_flight {
            warn!("Rejecting swap: another swap is in flight");
            return Err(SwapError::OperationInFlight("swap"));
        }
        let amount_in = self.session.source_units()?;
        if amount_in.is_zero() {
            return Err(SwapError::InvalidAmount("enter an amount to swap".into()));
        }
        if !self.session.is_approved {
            return Err(SwapError::NotApproved);
        }
        let quoted = self
            .session
            .fresh_quote()
            .map(|quote| quote.amount_out)
            .ok_or(SwapError::NoFreshQuote)?;

        let operation = if self.session.fee_on_transfer {
            Operation::SwapWithFeeOnTransfer
        } else {
            Operation::Swap
        };
        let router = self.router_handle()?;
        router.exchange.require(operation)?;

        let order = SwapOrder {
            amount_in,
            amount_out_min: amount::minimum_output(quoted, SLIPPAGE_TOLERANCE_PERCENT)?,
            path: vec![
                self.session.source_token.address,
                self.session.destination_token.address,
            ],
            recipient,
            deadline: swap_deadline(now),
        };
        self.session.swap_in_flight = true;
        info!(
            "Swap started on {}: {} {} for at least {} {}",
            router.exchange.name,
            self.session.source_amount,
            self.session.source_token.symbol,
            amount::to_decimal_string(order.amount_out_min, self.session.destination_token.decimals),
            self.session.destination_token.symbol
        );

        Ok(SwapTicket {
            order,
            source: self.session.source_token.clone(),
            destination: self.session.destination_token.clone(),
            fee_on_transfer: self.session.fee_on_transfer,
            router,
        })
    }

    pub fn finish_swap(&mut self, outcome: SwapResult) -> Result<TxReceipt, SwapError> {
        self.session.swap_in_flight = false;
        let receipt = outcome.result?;

        info!("Swap confirmed in {:?}", receipt.transaction_hash);
        self.session.last_swap = Some(SwapReceipt {
            exchange: outcome.ticket_exchange,
            receipt: receipt.clone(),
            amount_in: amount::to_decimal_string(outcome.order.amount_in, outcome.source.decimals),
            minimum_out: amount::to_decimal_string(
                outcome.order.amount_out_min,
                outcome.destination.decimals,
            ),
            fee_on_transfer: outcome.fee_on_transfer,
        });
        // The router spent the allowance.
        self.session.revoke_approval();
        Ok(receipt)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let s = self.session();
        let router = match self.exchange() {
            Ok(exchange) => Some(exchange.router),
            Err(e) => {
                error!("Selected exchange missing from catalog: {}", e);
                None
            }
        };
        SessionSnapshot {
            state: self.state(),
            connected_account: s.connected_account(),
            exchange: s.selected_exchange().to_string(),
            router,
            source_token: s.source_token().clone(),
            destination_token: s.destination_token().clone(),
            source_amount: s.source_amount().to_string(),
            destination_amount: s.destination_amount().to_string(),
            quote_is_fresh: s.fresh_quote().is_some(),
            is_approved: s.is_approved(),
            approved_amount: s
                .allowance
                .as_ref()
                .filter(|grant| grant.token == s.source_token().address)
                .map(|grant| amount::to_decimal_string(grant.amount, s.source_token().decimals)),
            fee_on_transfer: s.fee_on_transfer(),
            slippage_tolerance_percent: SLIPPAGE_TOLERANCE_PERCENT.to_string(),
            last_swap: s.last_swap().cloned(),
        }
    }
}
