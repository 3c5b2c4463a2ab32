//! Value Objects for the storefront

use serde::{Deserialize, Serialize};
use std::fmt;

/// Promo code as typed by a buyer, normalized for case-insensitive lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromoCodeKey(String);

impl PromoCodeKey {
    pub const MAX_LEN: usize = 50;

    pub fn new(value: impl Into<String>) -> Result<Self, PromoCodeKeyError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(PromoCodeKeyError::Empty); }
        if value.chars().count() > Self::MAX_LEN { return Err(PromoCodeKeyError::TooLong); }
        if value.chars().any(char::is_whitespace) { return Err(PromoCodeKeyError::Whitespace); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PromoCodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for PromoCodeKey {
    type Error = PromoCodeKeyError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<PromoCodeKey> for String {
    fn from(key: PromoCodeKey) -> Self { key.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PromoCodeKeyError { Empty, TooLong, Whitespace }
impl std::error::Error for PromoCodeKeyError {}
impl fmt::Display for PromoCodeKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "promo code is empty"),
            Self::TooLong => write!(f, "promo code is too long"),
            Self::Whitespace => write!(f, "promo code contains whitespace"),
        }
    }
}

/// Strictly positive line quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Upper bound for a single cart or order line.
    pub const MAX: u32 = 10_000;

    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        if value > Self::MAX { return Err(QuantityError::TooLarge); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self { q.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum QuantityError { Zero, TooLarge }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => write!(f, "quantity must be at least 1"),
            Self::TooLarge => write!(f, "quantity must not exceed {}", Quantity::MAX),
        }
    }
}

impl From<PromoCodeKeyError> for crate::EcommerceError {
    fn from(err: PromoCodeKeyError) -> Self { crate::EcommerceError::InvalidPromoCode(err.to_string()) }
}

impl From<QuantityError> for crate::EcommerceError {
    fn from(err: QuantityError) -> Self { crate::EcommerceError::Validation(err.to_string()) }
}
