//! Allowance records and grant sizing.
//!
//! A cached record is advisory: it lets the precheck skip a ledger round
//! trip while it is fresh and large enough, nothing more.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::token::{Amount, TokenDescriptor, amount_str};

/// Identifies one grant: who may spend what on whose behalf.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AllowanceKey {
    pub ledger: String,
    pub owner: String,
    pub spender: String,
}

impl AllowanceKey {
    pub fn new(token: &TokenDescriptor, owner: &str, spender: &str) -> Self {
        Self {
            ledger: token.ledger.clone(),
            owner: owner.to_string(),
            spender: spender.to_string(),
        }
    }
}

/// Last grant known to be in place for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceRecord {
    #[serde(with = "amount_str")]
    pub amount: Amount,
    pub expires_at: DateTime<Utc>,
}

impl AllowanceRecord {
    /// Fresh and at least `required + reserve`.
    pub fn covers(&self, required: &Amount, reserve: &Amount, now: DateTime<Utc>) -> bool {
        now < self.expires_at && self.amount >= required + reserve
    }
}

/// Sizing rules for approval grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowancePolicy {
    /// New grants cover `required + fee_multiplier * fee`.
    pub fee_multiplier: u32,
    /// Existing grants must cover `required + reserve_fee_multiplier * fee`.
    pub reserve_fee_multiplier: u32,
    /// Lifetime of a new grant.
    pub grant_ttl: Duration,
}

impl Default for AllowancePolicy {
    fn default() -> Self {
        Self {
            fee_multiplier: 4,
            reserve_fee_multiplier: 1,
            grant_ttl: Duration::seconds(60),
        }
    }
}

impl AllowancePolicy {
    /// Fee headroom an existing grant must have on top of the amount.
    pub fn reserve(&self, token: &TokenDescriptor) -> Amount {
        &token.fee * self.reserve_fee_multiplier
    }

    /// Amount to request when a new grant is needed.
    pub fn grant_amount(&self, token: &TokenDescriptor, required: &Amount) -> Amount {
        required + &token.fee * self.fee_multiplier
    }

    pub fn grant_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.grant_ttl
    }
}
