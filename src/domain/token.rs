//! Token descriptors, minimal-unit amounts and the runtime catalog.
//!
//! Amounts are always integers in the token's smallest unit with
//! unbounded precision. Floating point never touches a balance.

use std::collections::HashMap;
use std::fmt;

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Minimal-unit token amount (e.g. e8s for an 8-decimal token).
pub type Amount = BigUint;

/// How funds leave the owner's account when paying for a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStandard {
    /// The backend pulls funds under an approval grant.
    Approve,
    /// The owner transfers up front and hands the transfer id over as evidence.
    DirectTransfer,
}

impl fmt::Display for TransferStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::DirectTransfer => write!(f, "direct_transfer"),
        }
    }
}

/// Everything the orchestrator needs to know about a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    /// Ticker symbol, unique within the catalog.
    pub symbol: String,
    /// Number of decimals of the minimal unit.
    pub decimals: u8,
    /// Ledger address / canister id holding balances for this token.
    pub ledger: String,
    /// Flat fee charged by the ledger per transfer or approval.
    #[serde(with = "amount_str")]
    pub fee: Amount,
    /// Transfer capability of the ledger.
    pub standard: TransferStandard,
}

impl TokenDescriptor {
    /// Whether paying with this token goes through an approval grant.
    pub fn requires_approval(&self) -> bool {
        self.standard == TransferStandard::Approve
    }

    /// Render a minimal-unit amount with this token's decimals and symbol.
    pub fn display_amount(&self, amount: &Amount) -> String {
        format!("{} {}", format_units(amount, self.decimals), self.symbol)
    }
}

/// Render a minimal-unit amount as a decimal string, trimming trailing zeros.
///
/// `format_units(150_000_000, 8)` yields `"1.5"`.
pub fn format_units(amount: &Amount, decimals: u8) -> String {
    let digits = amount.to_str_radix(10);
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };

    let split = padded.len() - decimals;
    let (whole, frac) = padded.split_at(split);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac}")
    }
}

/// Runtime token registry, selected per request instead of per-symbol wiring.
#[derive(Debug, Clone, Default)]
pub struct TokenCatalog {
    tokens: HashMap<String, TokenDescriptor>,
}

impl TokenCatalog {
    /// Build a catalog; later duplicates of a symbol replace earlier ones.
    pub fn new(tokens: impl IntoIterator<Item = TokenDescriptor>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| (t.symbol.clone(), t))
                .collect(),
        }
    }

    /// Look up a token by symbol.
    pub fn resolve(&self, symbol: &str) -> Option<&TokenDescriptor> {
        self.tokens.get(symbol)
    }
}

/// Serde helper: amounts travel as decimal strings so JSON never rounds them.
pub mod amount_str {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Amount;

    pub fn serialize<S: Serializer>(value: &Amount, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Amount, D::Error> {
        let raw = String::deserialize(d)?;
        raw.trim().parse::<Amount>().map_err(serde::de::Error::custom)
    }
}

/// Serde helper for optional amounts.
pub mod amount_str_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Amount;

    pub fn serialize<S: Serializer>(value: &Option<Amount>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.serialize_some(&v.to_str_radix(10)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Amount>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|r| r.trim().parse::<Amount>().map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// True when the amount is strictly positive.
pub fn is_positive(amount: &Amount) -> bool {
    !amount.is_zero()
}
