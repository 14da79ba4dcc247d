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

use thiserror::Error;

/// Errors surfaced by the swap session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SwapError {
    /// No wallet can be reached. Fatal for the session.
    #[error("No wallet available: install or configure a wallet to continue")]
    NoWalletAvailable,

    #[error("Wallet connection rejected: {0}")]
    ConnectionRejected(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Unknown token: {0}")]
    UnknownToken(String),

    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("Approval failed: {0}")]
    ApprovalFailed(String),

    #[error("Swap failed: {0}")]
    SwapFailed(String),

    #[error("Wallet is not connected")]
    NotConnected,

    #[error("Router is not approved to spend the source amount")]
    NotApproved,

    #[error("No fresh quote for the current pair and amount")]
    NoFreshQuote,

    #[error("{0} is already in flight")]
    OperationInFlight(&'static str),

    /// A compiled-in catalog entry is malformed.
    #[error("Invalid catalog entry: {0}")]
    InvalidCatalog(String),

    #[error("Exchange {exchange} does not support {operation}")]
    UnsupportedOperation {
        exchange: String,
        operation: String,
    },
}

impl SwapError {
    /// Input validation and precondition errors, as opposed to remote failures.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SwapError::InvalidAmount(_)
                | SwapError::InvalidSelection(_)
                | SwapError::UnknownToken(_)
                | SwapError::UnknownExchange(_)
                | SwapError::NotConnected
                | SwapError::NotApproved
                | SwapError::NoFreshQuote
                | SwapError::OperationInFlight(_)
                | SwapError::UnsupportedOperation { .. }
        )
    }
}

/// Failures reported by a contract adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Failures reported by the wallet transport. A declined request is an
/// empty account list, not an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("no wallet available")]
    NoWalletAvailable,
}

impl From<WalletError> for SwapError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::NoWalletAvailable => SwapError::NoWalletAvailable,
        }
    }
}
