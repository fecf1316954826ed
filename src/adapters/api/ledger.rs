//! HTTP Ledger Gateway - Adapter for Token Ledger Calls
//!
//! Implements the `LedgerGateway` port against a ledger gateway service
//! that signs on behalf of the configured owner. One instance serves
//! every token; the descriptor's `ledger` field selects the route.
//!
//! Balance and allowance reads are retried by the client. Transfers and
//! approvals are not: a lost reply does not mean the ledger ignored it.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use num_traits::Zero;
use tracing::{debug, info, instrument};

use super::client::ApiClient;
use super::types::{
    AllowanceResponse, ApproveRequest, BalanceResponse, LedgerWriteResponse, TransferRequest,
};
use crate::domain::token::{Amount, TokenDescriptor};
use crate::ports::ledger::{ApprovalId, LedgerAllowance, LedgerGateway, TransferId, TransferOptions};

/// Ledger gateway reached over HTTP.
pub struct HttpLedgerGateway {
    /// Shared client with auth + retry.
    client: Arc<ApiClient>,
    /// Account the gateway signs for.
    owner: String,
}

impl HttpLedgerGateway {
    pub fn new(client: Arc<ApiClient>, owner: impl Into<String>) -> Self {
        Self {
            client,
            owner: owner.into(),
        }
    }

    fn write_result(token: &TokenDescriptor, op: &str, response: LedgerWriteResponse) -> Result<String> {
        match (response.block_index, response.error) {
            (Some(block), _) => Ok(block),
            (None, Some(error)) => bail!("{} {op} rejected: {error}", token.symbol),
            (None, None) => bail!("{} {op} reply carried neither block index nor error", token.symbol),
        }
    }
}

#[async_trait]
impl LedgerGateway for HttpLedgerGateway {
    async fn balance_of(&self, token: &TokenDescriptor, owner: &str) -> Result<Amount> {
        let path = format!("/ledgers/{}/balance/{}", token.ledger, owner);
        let response: BalanceResponse = self
            .client
            .get_json(&path)
            .await
            .with_context(|| format!("Balance read failed for {}", token.symbol))?;
        debug!(token = %token.symbol, balance = %response.balance, "Balance read");
        Ok(response.balance)
    }

    #[instrument(skip(self, token, amount, opts), fields(token = %token.symbol, amount = %amount))]
    async fn transfer(
        &self,
        token: &TokenDescriptor,
        to: &str,
        amount: &Amount,
        opts: &TransferOptions,
    ) -> Result<TransferId> {
        let body = TransferRequest {
            from: self.owner.clone(),
            to: to.to_string(),
            amount: amount.clone(),
            memo: opts
                .memo
                .as_ref()
                .map(|m| base64::engine::general_purpose::STANDARD.encode(m)),
            created_at: opts.created_at,
        };
        let path = format!("/ledgers/{}/transfer", token.ledger);
        let response: LedgerWriteResponse = self
            .client
            .post_json(&path, &body)
            .await
            .with_context(|| format!("Transfer failed for {}", token.symbol))?;
        let block = Self::write_result(token, "transfer", response)?;
        info!(block_index = %block, "Transfer committed");
        Ok(block)
    }

    #[instrument(skip(self, token, amount), fields(token = %token.symbol, amount = %amount))]
    async fn approve(
        &self,
        token: &TokenDescriptor,
        spender: &str,
        amount: &Amount,
        expires_at: DateTime<Utc>,
    ) -> Result<ApprovalId> {
        let body = ApproveRequest {
            from: self.owner.clone(),
            spender: spender.to_string(),
            amount: amount.clone(),
            expires_at,
        };
        let path = format!("/ledgers/{}/approve", token.ledger);
        let response: LedgerWriteResponse = self
            .client
            .post_json(&path, &body)
            .await
            .with_context(|| format!("Approve failed for {}", token.symbol))?;
        let block = Self::write_result(token, "approve", response)?;
        info!(block_index = %block, "Approval committed");
        Ok(block)
    }

    async fn allowance(
        &self,
        token: &TokenDescriptor,
        owner: &str,
        spender: &str,
    ) -> Result<Option<LedgerAllowance>> {
        let path = format!("/ledgers/{}/allowance/{}/{}", token.ledger, owner, spender);
        let response: AllowanceResponse = self
            .client
            .get_json(&path)
            .await
            .with_context(|| format!("Allowance read failed for {}", token.symbol))?;

        if response.allowance.is_zero() {
            return Ok(None);
        }
        Ok(Some(LedgerAllowance {
            amount: response.allowance,
            expires_at: response.expires_at,
        }))
    }
}
