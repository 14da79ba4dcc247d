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

//! In-memory contracts and wallet for tests.

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::contracts::{
    Approvable, ContractFactory, QuoteSource, Router, SwapOrder, Swappable, TxReceipt,
};
use crate::error::{ContractError, WalletError};
use crate::wallet::WalletTransport;

static NEXT_TX: AtomicU64 = AtomicU64::new(1);

fn receipt() -> TxReceipt {
    TxReceipt {
        transaction_hash: H256::from_low_u64_be(NEXT_TX.fetch_add(1, Ordering::SeqCst)),
        block_number: Some(1),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapKind {
    Exact,
    FeeOnTransfer,
}

enum Pricing {
    Fixed(Vec<U256>),
    Proportional { num: u64, den: u64 },
}

pub struct MockRouter {
    pricing: Pricing,
    fail_quotes: AtomicBool,
    fail_swaps: AtomicBool,
    quote_calls: AtomicU64,
    swaps: Mutex<Vec<(SwapKind, SwapOrder)>>,
}

impl MockRouter {
    fn new(pricing: Pricing) -> Self {
        Self {
            pricing,
            fail_quotes: AtomicBool::new(false),
            fail_swaps: AtomicBool::new(false),
            quote_calls: AtomicU64::new(0),
            swaps: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `amounts`, whatever the input.
    pub fn with_amounts(amounts: Vec<U256>) -> Self {
        Self::new(Pricing::Fixed(amounts))
    }

    /// Answers `[amount_in, amount_in * num / den]`.
    pub fn proportional(num: u64, den: u64) -> Self {
        Self::new(Pricing::Proportional { num, den })
    }

    pub fn fail_quotes(&self, fail: bool) {
        self.fail_quotes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_swaps(&self, fail: bool) {
        self.fail_swaps.store(fail, Ordering::SeqCst);
    }

    pub fn quote_calls(&self) -> u64 {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn swaps(&self) -> Vec<(SwapKind, SwapOrder)> {
        self.swaps.lock().unwrap().clone()
    }

    fn record_swap(&self, kind: SwapKind, order: &SwapOrder) -> Result<TxReceipt, ContractError> {
        if self.fail_swaps.load(Ordering::SeqCst) {
            return Err(ContractError::Reverted("INSUFFICIENT_OUTPUT_AMOUNT".into()));
        }
        self.swaps.lock().unwrap().push((kind, order.clone()));
        Ok(receipt())
    }
}

#[async_trait]
impl QuoteSource for MockRouter {
    async fn get_amounts_out(
        &self,
        amount_in: U256,
        _path: &[Address],
    ) -> Result<Vec<U256>, ContractError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_quotes.load(Ordering::SeqCst) {
            return Err(ContractError::Transport("connection reset".into()));
        }
        Ok(match &self.pricing {
            Pricing::Fixed(amounts) => amounts.clone(),
            Pricing::Proportional { num, den } => {
                vec![amount_in, amount_in * U256::from(*num) / U256::from(*den)]
            }
        })
    }
}

#[async_trait]
impl Swappable for MockRouter {
    async fn swap_exact_tokens_for_tokens(
        &self,
        order: &SwapOrder,
    ) -> Result<TxReceipt, ContractError> {
        self.record_swap(SwapKind::Exact, order)
    }

    async fn swap_exact_tokens_for_tokens_supporting_fee_on_transfer(
        &self,
        order: &SwapOrder,
    ) -> Result<TxReceipt, ContractError> {
        self.record_swap(SwapKind::FeeOnTransfer, order)
    }
}

#[derive(Default)]
pub struct MockToken {
    fail: AtomicBool,
    hold: AtomicBool,
    release: Notify,
    approvals: Mutex<Vec<(Address, U256)>>,
}

impl MockToken {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Keep approvals pending until [`MockToken::release`] is called.
    pub fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    pub fn approvals(&self) -> Vec<(Address, U256)> {
        self.approvals.lock().unwrap().clone()
    }
}

#[async_trait]
impl Approvable for MockToken {
    async fn approve(&self, spender: Address, amount: U256) -> Result<TxReceipt, ContractError> {
        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ContractError::Transport("user denied transaction signature".into()));
        }
        self.approvals.lock().unwrap().push((spender, amount));
        Ok(receipt())
    }
}

/// Hands out one shared mock per address. Unknown routers price 1:1.
#[derive(Default)]
pub struct MockContracts {
    routers: Mutex<HashMap<Address, Arc<MockRouter>>>,
    tokens: Mutex<HashMap<Address, Arc<MockToken>>>,
}

impl MockContracts {
    pub fn install_router(&self, address: Address, router: MockRouter) -> Arc<MockRouter> {
        let router = Arc::new(router);
        self.routers.lock().unwrap().insert(address, router.clone());
        router
    }

    pub fn mock_router(&self, address: Address) -> Arc<MockRouter> {
        self.routers
            .lock()
            .unwrap()
            .entry(address)
            .or_insert_with(|| Arc::new(MockRouter::proportional(1, 1)))
            .clone()
    }

    pub fn mock_token(&self, address: Address) -> Arc<MockToken> {
        self.tokens
            .lock()
            .unwrap()
            .entry(address)
            .or_default()
            .clone()
    }
}

impl ContractFactory for MockContracts {
    fn router(&self, router_address: Address) -> Arc<dyn Router> {
        self.mock_router(router_address)
    }

    fn token(&self, token_address: Address) -> Arc<dyn Approvable> {
        self.mock_token(token_address)
    }
}

pub struct MockWallet {
    response: Result<Vec<Address>, WalletError>,
}

impl MockWallet {
    pub fn account(address: Address) -> Self {
        Self {
            response: Ok(vec![address]),
        }
    }

    pub fn failing(err: WalletError) -> Self {
        Self { response: Err(err) }
    }

    pub fn empty() -> Self {
        Self { response: Ok(vec![]) }
    }
}

#[async_trait]
impl WalletTransport for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.response.clone()
    }
}
