//! SKU value object: equality by value, validated on construction.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{StockError, StockResult};

const MAX_SKU_LEN: usize = 64;

/// Stock Keeping Unit: the product identifier stock is counted under.
///
/// A `Sku` is a value object — two SKUs with the same code are the same
/// SKU. The code is trimmed, non-empty and at most 64 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn new(code: impl Into<String>) -> StockResult<Self> {
        let code = code.into();
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(StockError::validation("SKU cannot be empty"));
        }
        if trimmed.len() > MAX_SKU_LEN {
            return Err(StockError::validation(format!(
                "SKU exceeds {MAX_SKU_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Sku {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Sku {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Sku {
    type Error = StockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Sku> for String {
    fn from(value: Sku) -> Self {
        value.0
    }
}
