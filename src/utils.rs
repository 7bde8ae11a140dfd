//! Utility functions for identifiers and name normalisation

use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::MarketError;

// construct a unique record id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, MarketError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| MarketError::Internal(e.to_string()))?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| MarketError::Internal(e.to_string()))?;
    Ok(encode)
}

/// Catalog key for a product name: trimmed and lower-cased.
pub fn normalize_product(product: &str) -> String {
    product.trim().to_lowercase()
}
