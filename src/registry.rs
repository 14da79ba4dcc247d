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

//! Compiled-in token and exchange catalogs (Harmony mainnet).

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::error;

use crate::error::SwapError;

struct TokenEntry {
    symbol: &'static str,
    address: &'static str,
    decimals: u8,
}

const TOKEN_LIST: &[TokenEntry] = &[
    TokenEntry {
        symbol: "1USDC",
        address: "0x985458E523dB3d53125813eD68c274899e9DfAb4",
        decimals: 6,
    },
    TokenEntry {
        symbol: "WONE",
        address: "0xcF664087a5bB0237a0BAd6742852ec6c8d69A27a",
        decimals: 18,
    },
    TokenEntry {
        symbol: "1ETH",
        address: "0x6983d1e6def3690c4d616b13597a09e6193ea013",
        decimals: 18,
    },
];

pub const DEFAULT_SOURCE_TOKEN: &str = "1USDC";
pub const DEFAULT_DESTINATION_TOKEN: &str = "WONE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Quote,
    Swap,
    SwapWithFeeOnTransfer,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Quote => "quote",
            Operation::Swap => "swap",
            Operation::SwapWithFeeOnTransfer => "swap with fee-on-transfer tokens",
        };
        f.write_str(name)
    }
}

const ALL_OPERATIONS: &[Operation] = &[
    Operation::Quote,
    Operation::Swap,
    Operation::SwapWithFeeOnTransfer,
];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    Sushi,
    Viper,
    Dfk,
}

impl Default for ExchangeId {
    fn default() -> Self {
        ExchangeId::Sushi
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeId::Sushi => "Sushi",
            ExchangeId::Viper => "Viper",
            ExchangeId::Dfk => "DFK",
        };
        f.write_str(name)
    }
}

impl FromStr for ExchangeId {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EXCHANGE_LIST
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(s.trim()))
            .map(|entry| entry.id)
            .ok_or_else(|| SwapError::UnknownExchange(s.to_string()))
    }
}

struct ExchangeEntry {
    id: ExchangeId,
    name: &'static str,
    router: &'static str,
    operations: &'static [Operation],
}

const EXCHANGE_LIST: &[ExchangeEntry] = &[
    ExchangeEntry {
        id: ExchangeId::Sushi,
        name: "Sushi",
        router: "0x1b02da8cb0d097eb8d57a175b88c7d8b47997506",
        operations: ALL_OPERATIONS,
    },
    ExchangeEntry {
        id: ExchangeId::Viper,
        name: "Viper",
        router: "0xf012702a5f0e54015362cbca26a26fc90aa832a3",
        operations: ALL_OPERATIONS,
    },
    ExchangeEntry {
        id: ExchangeId::Dfk,
        name: "DFK",
        router: "0x24ad62502d1C652Cc7684081169D04896aC20f30",
        operations: ALL_OPERATIONS,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub symbol: &'static str,
    pub address: Address,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub id: ExchangeId,
    pub name: &'static str,
    pub router: Address,
    pub operations: &'static [Operation],
}

impl Exchange {
    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    pub fn require(&self, operation: Operation) -> Result<(), SwapError> {
        if self.supports(operation) {
            Ok(())
        } else {
            Err(SwapError::UnsupportedOperation {
                exchange: self.name.to_string(),
                operation: operation.to_string(),
            })
        }
    }
}

fn parse_address(name: &str, raw: &str) -> Result<Address, SwapError> {
    Address::from_str(raw).map_err(|e| {
        error!("Catalog address for {} does not parse ({}): {}", name, raw, e);
        SwapError::InvalidCatalog(format!("{}: {}", name, raw))
    })
}

fn token_from_entry(entry: &TokenEntry) -> Result<Token, SwapError> {
    Ok(Token {
        symbol: entry.symbol,
        address: parse_address(entry.symbol, entry.address)?,
        decimals: entry.decimals,
    })
}

/// All catalog tokens in display order.
pub fn tokens() -> Result<Vec<Token>, SwapError> {
    TOKEN_LIST.iter().map(token_from_entry).collect()
}

/// All catalog exchanges in display order.
pub fn exchanges() -> Result<Vec<Exchange>, SwapError> {
    EXCHANGE_LIST
        .iter()
        .map(|entry| lookup_exchange(entry.id))
        .collect()
}

pub fn lookup_token(address: Address) -> Result<Token, SwapError> {
    for entry in TOKEN_LIST {
        let token = token_from_entry(entry)?;
        if token.address == address {
            return Ok(token);
        }
    }
    Err(SwapError::UnknownToken(format!("{:?}", address)))
}

pub fn lookup_token_by_symbol(symbol: &str) -> Result<Token, SwapError> {
    TOKEN_LIST
        .iter()
        .find(|entry| entry.symbol.eq_ignore_ascii_case(symbol.trim()))
        .ok_or_else(|| SwapError::UnknownToken(symbol.to_string()))
        .and_then(token_from_entry)
}

/// Accepts either a catalog symbol ("1USDC") or a contract address.
pub fn resolve_token(symbol_or_address: &str) -> Result<Token, SwapError> {
    let trimmed = symbol_or_address.trim();
    if trimmed.starts_with("0x") && trimmed.len() == 42 {
        let address = Address::from_str(trimmed)
            .map_err(|_| SwapError::UnknownToken(trimmed.to_string()))?;
        lookup_token(address)
    } else {
        lookup_token_by_symbol(trimmed)
    }
}

pub fn lookup_exchange(id: ExchangeId) -> Result<Exchange, SwapError> {
    let entry = EXCHANGE_LIST
        .iter()
        .find(|entry| entry.id == id)
        .ok_or_else(|| SwapError::UnknownExchange(format!("{:?}", id)))?;
    let router = parse_address(entry.name, entry.router)?;
    Ok(Exchange {
        id: entry.id,
        name: entry.name,
        router,
        operations: entry.operations,
    })
}
