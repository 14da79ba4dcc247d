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

//! Typed capabilities of the remote contracts and their ethers adapters.

use async_trait::async_trait;
use ethabi::{Function, Param, ParamType, StateMutability, Token};
use ethers::{
    prelude::*,
    types::{Address, TransactionReceipt, TransactionRequest, H256, U256},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::ContractError;

/// Confirmation of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub transaction_hash: H256,
    pub block_number: Option<u64>,
}

impl TryFrom<TransactionReceipt> for TxReceipt {
    type Error = ContractError;

    fn try_from(receipt: TransactionReceipt) -> Result<Self, Self::Error> {
        if receipt.status != Some(U64::one()) {
            return Err(ContractError::Reverted(format!(
                "transaction {:?} failed with status {:?}",
                receipt.transaction_hash, receipt.status
            )));
        }
        Ok(TxReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
        })
    }
}

/// Arguments of `swapExactTokensForTokens` and its fee-on-transfer variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapOrder {
    pub amount_in: U256,
    pub amount_out_min: U256,
    pub path: Vec<Address>,
    pub recipient: Address,
    /// Unix timestamp in seconds.
    pub deadline: U256,
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Router `getAmountsOut`: the amount at every hop of `path`.
    async fn get_amounts_out(
        &self,
        amount_in: U256,
        path: &[Address],
    ) -> Result<Vec<U256>, ContractError>;
}

#[async_trait]
pub trait Swappable: Send + Sync {
    async fn swap_exact_tokens_for_tokens(
        &self,
        order: &SwapOrder,
    ) -> Result<TxReceipt, ContractError>;

    async fn swap_exact_tokens_for_tokens_supporting_fee_on_transfer(
        &self,
        order: &SwapOrder,
    ) -> Result<TxReceipt, ContractError>;
}

#[async_trait]
pub trait Approvable: Send + Sync {
    /// ERC20 `approve`, resolved once the transaction is mined.
    async fn approve(&self, spender: Address, amount: U256) -> Result<TxReceipt, ContractError>;
}

/// A DEX router: quotes and swaps.
pub trait Router: QuoteSource + Swappable {}

impl<T: QuoteSource + Swappable> Router for T {}

/// Builds contract bindings from on-chain addresses.
pub trait ContractFactory: Send + Sync {
    fn router(&self, router_address: Address) -> Arc<dyn Router>;
    fn token(&self, token_address: Address) -> Arc<dyn Approvable>;
}

fn uint_param(name: &str) -> Param {
    Param {
        name: name.to_string(),
        kind: ParamType::Uint(256),
        internal_type: None,
    }
}

fn address_param(name: &str) -> Param {
    Param {
        name: name.to_string(),
        kind: ParamType::Address,
        internal_type: None,
    }
}

fn path_param() -> Param {
    Param {
        name: "path".to_string(),
        kind: ParamType::Array(Box::new(ParamType::Address)),
        internal_type: None,
    }
}

fn amounts_param() -> Param {
    Param {
        name: "amounts".to_string(),
        kind: ParamType::Array(Box::new(ParamType::Uint(256))),
        internal_type: None,
    }
}

fn get_amounts_out_function() -> Function {
    Function {
        name: "getAmountsOut".to_string(),
        inputs: vec![uint_param("amountIn"), path_param()],
        outputs: vec![amounts_param()],
        constant: None,
        state_mutability: StateMutability::View,
    }
}

fn swap_function(name: &str, returns_amounts: bool) -> Function {
    Function {
        name: name.to_string(),
        inputs: vec![
            uint_param("amountIn"),
            uint_param("amountOutMin"),
            path_param(),
            address_param("to"),
            uint_param("deadline"),
        ],
        outputs: if returns_amounts {
            vec![amounts_param()]
        } else {
            vec![]
        },
        constant: None,
        state_mutability: StateMutability::NonPayable,
    }
}

fn approve_function() -> Function {
    Function {
        name: "approve".to_string(),
        inputs: vec![address_param("spender"), uint_param("value")],
        outputs: vec![Param {
            name: "".to_string(),
            kind: ParamType::Bool,
            internal_type: None,
        }],
        constant: None,
        state_mutability: StateMutability::NonPayable,
    }
}

fn encode_swap(function: &Function, order: &SwapOrder) -> Result<Bytes, ContractError> {
    let path_tokens: Vec<Token> = order.path.iter().map(|&addr| Token::Address(addr)).collect();
    function
        .encode_input(&[
            Token::Uint(order.amount_in),
            Token::Uint(order.amount_out_min),
            Token::Array(path_tokens),
            Token::Address(order.recipient),
            Token::Uint(order.deadline),
        ])
        .map(Bytes::from)
        .map_err(|e| ContractError::Malformed(format!("failed to encode {}: {}", function.name, e)))
}

fn decode_amounts(function: &Function, data: &[u8]) -> Result<Vec<U256>, ContractError> {
    let decoded = function.decode_output(data).map_err(|e| {
        ContractError::Malformed(format!("failed to decode {} result: {}", function.name, e))
    })?;

    let amounts = match decoded.first() {
        Some(Token::Array(arr)) => arr,
        _ => {
            return Err(ContractError::Malformed(format!(
                "unexpected {} result format",
                function.name
            )))
        }
    };

    amounts
        .iter()
        .map(|token| match token {
            Token::Uint(val) => Ok(*val),
            other => Err(ContractError::Malformed(format!(
                "non-integer amount in {} result: {:?}",
                function.name, other
            ))),
        })
        .collect()
}

async fn send_and_confirm<M: Middleware>(
    client: &M,
    tx: TransactionRequest,
    what: &str,
) -> Result<TxReceipt, ContractError> {
    let pending = client
        .send_transaction(tx, None)
        .await
        .map_err(|e| ContractError::Transport(format!("failed to send {}: {}", what, e)))?;

    let tx_hash = *pending;
    info!("{} submitted: {:?}", what, tx_hash);

    let receipt = pending
        .await
        .map_err(|e| ContractError::Transport(format!("failed to confirm {}: {}", what, e)))?
        .ok_or_else(|| ContractError::Transport(format!("{} {:?} was dropped", what, tx_hash)))?;

    TxReceipt::try_from(receipt)
}

/// Uniswap-V2-style router reached through an ethers middleware.
pub struct RouterContract<M> {
    address: Address,
    client: Arc<M>,
}

impl<M: Middleware> RouterContract<M> {
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self { address, client }
    }

    async fn swap(&self, name: &str, order: &SwapOrder) -> Result<TxReceipt, ContractError> {
        let function = swap_function(name, true);
        let data = encode_swap(&function, order)?;
        let tx = TransactionRequest::new().to(self.address).data(data);

        info!(
            "Submitting {} on router {:?}: amount_in={}, amount_out_min={}, deadline={}",
            name, self.address, order.amount_in, order.amount_out_min, order.deadline
        );
        send_and_confirm(self.client.as_ref(), tx, name).await
    }
}

#[async_trait]
impl<M: Middleware + 'static> QuoteSource for RouterContract<M> {
    #[instrument(skip(self))]
    async fn get_amounts_out(
        &self,
        amount_in: U256,
        path: &[Address],
    ) -> Result<Vec<U256>, ContractError> {
        let function = get_amounts_out_function();
        let path_tokens: Vec<Token> = path.iter().map(|&addr| Token::Address(addr)).collect();
        let input_data = function
            .encode_input(&[Token::Uint(amount_in), Token::Array(path_tokens)])
            .map_err(|e| ContractError::Malformed(format!("failed to encode getAmountsOut: {}", e)))?;

        let tx_request = TransactionRequest::new().to(self.address).data(input_data);

        let result = self
            .client
            .call(&tx_request.into(), None)
            .await
            .map_err(|e| {
                warn!("getAmountsOut call on {:?} failed: {}", self.address, e);
                ContractError::Transport(e.to_string())
            })?;

        decode_amounts(&function, &result)
    }
}

#[async_trait]
impl<M: Middleware + 'static> Swappable for RouterContract<M> {
    async fn swap_exact_tokens_for_tokens(
        &self,
        order: &SwapOrder,
    ) -> Result<TxReceipt, ContractError> {
        self.swap("swapExactTokensForTokens", order).await
    }

    async fn swap_exact_tokens_for_tokens_supporting_fee_on_transfer(
        &self,
        order: &SwapOrder,
    ) -> Result<TxReceipt, ContractError> {
        self.swap(
            "swapExactTokensForTokensSupportingFeeOnTransferTokens",
            order,
        )
        .await
    }
}

/// ERC20 token reached through an ethers middleware.
pub struct TokenContract<M> {
    address: Address,
    client: Arc<M>,
}

impl<M: Middleware> TokenContract<M> {
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self { address, client }
    }
}

#[async_trait]
impl<M: Middleware + 'static> Approvable for TokenContract<M> {
    #[instrument(skip(self))]
    async fn approve(&self, spender: Address, amount: U256) -> Result<TxReceipt, ContractError> {
        let function = approve_function();
        let data = function
            .encode_input(&[Token::Address(spender), Token::Uint(amount)])
            .map_err(|e| ContractError::Malformed(format!("failed to encode approve: {}", e)))?;
        let tx = TransactionRequest::new().to(self.address).data(data);

        info!(
            "Approving {:?} to spend {} of token {:?}",
            spender, amount, self.address
        );
        send_and_confirm(self.client.as_ref(), tx, "approve").await
    }
}

pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Contract bindings signed by the configured local wallet.
pub struct EthersContracts {
    client: Arc<SignerClient>,
}

impl EthersContracts {
    pub fn new(provider: Provider<Http>, wallet: LocalWallet, chain_id: u64) -> Self {
        let wallet = wallet.with_chain_id(chain_id);
        Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
        }
    }
}

impl ContractFactory for EthersContracts {
    fn router(&self, router_address: Address) -> Arc<dyn Router> {
        Arc::new(RouterContract::new(router_address, self.client.clone()))
    }

    fn token(&self, token_address: Address) -> Arc<dyn Approvable> {
        Arc::new(TokenContract::new(token_address, self.client.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn order() -> SwapOrder {
        SwapOrder {
            amount_in: U256::from(10_000_000u64),
            amount_out_min: U256::from(8_457_500u64),
            path: vec![
                Address::from_str("0x985458E523dB3d53125813eD68c274899e9DfAb4").unwrap(),
                Address::from_str("0xcF664087a5bB0237a0BAd6742852ec6c8d69A27a").unwrap(),
            ],
            recipient: Address::from_low_u64_be(0xbeef),
            deadline: U256::from(1_700_000_600u64),
        }
    }

    #[test]
    fn selectors_match_router_abi() {
        assert_eq!(get_amounts_out_function().short_signature(), [0xd0, 0x6c, 0xa6, 0x1f]);
        assert_eq!(
            swap_function("swapExactTokensForTokens", true).short_signature(),
            [0x38, 0xed, 0x17, 0x39]
        );
        assert_eq!(
            swap_function("swapExactTokensForTokensSupportingFeeOnTransferTokens", false)
                .short_signature(),
            [0x5c, 0x11, 0xd7, 0x95]
        );
        assert_eq!(approve_function().short_signature(), [0x09, 0x5e, 0xa7, 0xb3]);
    }

    #[test]
    fn swap_calldata_round_trips_through_abi() {
        let function = swap_function("swapExactTokensForTokens", true);
        let data = encode_swap(&function, &order()).unwrap();
        let decoded = function.decode_input(&data[4..]).unwrap();
        assert_eq!(decoded[0], Token::Uint(order().amount_in));
        assert_eq!(decoded[1], Token::Uint(order().amount_out_min));
        assert_eq!(decoded[3], Token::Address(order().recipient));
        assert_eq!(decoded[4], Token::Uint(order().deadline));
    }

    #[test]
    fn decodes_amounts_out() {
        let function = get_amounts_out_function();
        let encoded = ethabi::encode(&[Token::Array(vec![
            Token::Uint(U256::from(10_000_000u64)),
            Token::Uint(U256::from(9_950_000u64)),
        ])]);
        let amounts = decode_amounts(&function, &encoded).unwrap();
        assert_eq!(
            amounts,
            vec![U256::from(10_000_000u64), U256::from(9_950_000u64)]
        );
    }

    #[test]
    fn garbage_response_is_malformed() {
        let function = get_amounts_out_function();
        let err = decode_amounts(&function, &[0x01, 0x02]).unwrap_err();
        assert!(matches!(err, ContractError::Malformed(_)));
    }

    #[test]
    fn reverted_receipt_is_an_error() {
        let mut receipt = TransactionReceipt::default();
        receipt.status = Some(U64::zero());
        assert!(matches!(
            TxReceipt::try_from(receipt.clone()),
            Err(ContractError::Reverted(_))
        ));

        receipt.status = Some(U64::one());
        receipt.block_number = Some(U64::from(42u64));
        let ok = TxReceipt::try_from(receipt).unwrap();
        assert_eq!(ok.block_number, Some(42));
    }
}
