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

use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::contracts::Router;
use crate::error::SwapError;
use crate::registry::{Exchange, ExchangeId, Operation, Token};

/// Router contract bound to an exchange and the account it acts for.
#[derive(Clone)]
pub struct RouterHandle {
    pub exchange: Exchange,
    pub account: Option<Address>,
    pub contract: Arc<dyn Router>,
}

impl std::fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterHandle")
            .field("exchange", &self.exchange.name)
            .field("router", &self.exchange.router)
            .field("account", &self.account)
            .finish()
    }
}

/// Session inputs a quote was computed for. A response is applied only while
/// the session still matches its tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuoteTag {
    pub exchange: ExchangeId,
    pub source: Address,
    pub destination: Address,
    pub source_amount: String,
}

/// Asks the router for the output of swapping `amount_in` along `path`.
///
/// `path` must be exactly `[source, destination]`. Every failure, including a
/// malformed or short amounts array, becomes `QuoteUnavailable`.
#[instrument(skip(router))]
pub async fn quote(
    amount_in: U256,
    path: [Address; 2],
    router: &RouterHandle,
) -> Result<U256, SwapError> {
    if amount_in.is_zero() {
        return Err(SwapError::InvalidAmount("quote amount must be positive".into()));
    }
    if path[0] == path[1] {
        return Err(SwapError::InvalidSelection(
            "cannot quote a token against itself".into(),
        ));
    }
    if router.account.is_none() {
        return Err(SwapError::NotConnected);
    }
    router.exchange.require(Operation::Quote)?;

    let amounts = router
        .contract
        .get_amounts_out(amount_in, &path)
        .await
        .map_err(|e| {
            warn!("Quote from {} failed: {}", router.exchange.name, e);
            SwapError::QuoteUnavailable(e.to_string())
        })?;

    match amounts.get(1) {
        Some(out) => {
            info!("{} quoted {} -> {}", router.exchange.name, amount_in, out);
            Ok(*out)
        }
        None => {
            warn!(
                "{} returned {} amounts for a two-token path",
                router.exchange.name,
                amounts.len()
            );
            Err(SwapError::QuoteUnavailable(
                "router returned too few amounts".into(),
            ))
        }
    }
}

/// A quote to fetch, detached from the session so it can run without
/// holding it.
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub tag: QuoteTag,
    pub amount_in: U256,
    pub destination: Token,
    pub router: RouterHandle,
}

impl QuoteRequest {
    pub async fn fetch(self) -> QuoteResponse {
        let path = [self.tag.source, self.tag.destination];
        let result = quote(self.amount_in, path, &self.router).await;
        QuoteResponse {
            tag: self.tag,
            destination: self.destination,
            result,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuoteResponse {
    pub tag: QuoteTag,
    pub destination: Token,
    pub result: Result<U256, SwapError>,
}

/// What happened to a quote response handed back to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteOutcome {
    /// The response matched the session; holds the new destination amount.
    Applied(String),
    /// The session moved on since the request was issued.
    Discarded,
}
