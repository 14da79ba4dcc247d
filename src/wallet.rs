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

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::Address;
use tracing::info;

use crate::error::WalletError;

/// Source of user accounts.
#[async_trait]
pub trait WalletTransport: Send + Sync {
    /// Ask the user for account access. The first account is used.
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;
}

/// Wallet backed by a locally held signing key.
pub struct LocalWalletTransport {
    wallet: Option<LocalWallet>,
}

impl LocalWalletTransport {
    pub fn new(wallet: Option<LocalWallet>) -> Self {
        Self { wallet }
    }
}

#[async_trait]
impl WalletTransport for LocalWalletTransport {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        let wallet = self.wallet.as_ref().ok_or(WalletError::NoWalletAvailable)?;
        info!("Granting access to account {:?}", wallet.address());
        Ok(vec![wallet.address()])
    }
}
