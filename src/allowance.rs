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
use tracing::{error, info, instrument};

use crate::contracts::{Approvable, TxReceipt};
use crate::error::SwapError;
use crate::registry::Token;

/// A bounded allowance for `spender` over `amount` of `token`, owned by
/// `owner`. The amount is exactly what the user entered, never unlimited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceGrant {
    pub owner: Address,
    pub token: Address,
    pub spender: Address,
    pub amount: U256,
}

impl AllowanceGrant {
    /// Whether this grant lets `spender` move `amount` of `token` for `owner`.
    pub fn covers(&self, owner: Address, token: Address, spender: Address, amount: U256) -> bool {
        self.owner == owner && self.token == token && self.spender == spender && amount <= self.amount
    }
}

/// An approval transaction ready to submit.
pub struct ApprovalTicket {
    pub grant: AllowanceGrant,
    pub token: Token,
    pub contract: Arc<dyn Approvable>,
}

impl std::fmt::Debug for ApprovalTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalTicket")
            .field("grant", &self.grant)
            .field("token", &self.token.symbol)
            .finish()
    }
}

impl ApprovalTicket {
    #[instrument(skip(self), fields(token = self.token.symbol, amount = %self.grant.amount))]
    pub async fn submit(self) -> ApprovalResult {
        let result = self
            .contract
            .approve(self.grant.spender, self.grant.amount)
            .await
            .map_err(|e| {
                error!("Approval of {} failed: {}", self.token.symbol, e);
                SwapError::ApprovalFailed(e.to_string())
            });

        if let Ok(receipt) = &result {
            info!(
                "Approved {:?} for {} base units of {} in {:?}",
                self.grant.spender, self.grant.amount, self.token.symbol, receipt.transaction_hash
            );
        }

        ApprovalResult {
            grant: self.grant,
            result,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApprovalResult {
    pub grant: AllowanceGrant,
    pub result: Result<TxReceipt, SwapError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::lookup_token_by_symbol;
    use crate::testing::MockToken;

    fn grant(amount: u64) -> AllowanceGrant {
        AllowanceGrant {
            owner: Address::repeat_byte(1),
            token: lookup_token_by_symbol("1USDC").unwrap().address,
            spender: Address::repeat_byte(2),
            amount: U256::from(amount),
        }
    }

    #[test]
    fn grant_covers_up_to_its_amount() {
        let g = grant(100);
        let (owner, token, spender) = (g.owner, g.token, g.spender);
        assert!(g.covers(owner, token, spender, U256::from(100u8)));
        assert!(g.covers(owner, token, spender, U256::from(1u8)));
        assert!(!g.covers(owner, token, spender, U256::from(101u8)));
        assert!(!g.covers(owner, token, Address::repeat_byte(3), U256::one()));
        assert!(!g.covers(Address::repeat_byte(4), token, spender, U256::one()));
    }

    #[tokio::test]
    async fn submits_bounded_approval() {
        let contract = Arc::new(MockToken::default());
        let ticket = ApprovalTicket {
            grant: grant(10_000_000),
            token: lookup_token_by_symbol("1USDC").unwrap(),
            contract: contract.clone(),
        };

        let outcome = ticket.submit().await;
        assert!(outcome.result.is_ok());
        assert_eq!(
            contract.approvals(),
            vec![(Address::repeat_byte(2), U256::from(10_000_000u64))]
        );
    }

    #[tokio::test]
    async fn rejection_is_approval_failed() {
        let contract = Arc::new(MockToken::default());
        contract.fail(true);
        let ticket = ApprovalTicket {
            grant: grant(1),
            token: lookup_token_by_symbol("1USDC").unwrap(),
            contract,
        };
        assert!(matches!(
            ticket.submit().await.result,
            Err(SwapError::ApprovalFailed(_))
        ));
    }
}
