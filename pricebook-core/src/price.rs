use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Optional currency symbol, digits with optional comma grouping, and a
/// fraction of one to four digits.
static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[$£€]?(?:[0-9]{1,3}(?:,[0-9]{3})+|[0-9]+)\.[0-9]{1,4}$").expect("valid price regex")
});

/// A trailing token made only of price characters, with at least one digit.
static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[$£€]?[0-9.,]*[0-9][0-9.,]*$").expect("valid numeric regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceParseError {
    #[error("price text is empty")]
    Empty,
    #[error("negative price {0:?}")]
    Negative(String),
    #[error("{0:?} is not a price")]
    Invalid(String),
}

/// A non-negative price that keeps the fraction digits it was printed with.
///
/// `12.50` and `12.5` compare equal, but each serializes back exactly as it
/// was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(Decimal);

impl Price {
    /// Number of fraction digits as printed.
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// `true` if `token` is shaped like a number, even if it is not a valid
    /// price (`1,23.4`, `12..50`).
    pub fn looks_numeric(token: &str) -> bool {
        NUMERIC_RE.is_match(token)
    }
}

impl FromStr for Price {
    type Err = PriceParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PriceParseError::Empty);
        }
        if text.starts_with('-') {
            return Err(PriceParseError::Negative(text.to_string()));
        }
        if !PRICE_RE.is_match(text) {
            return Err(PriceParseError::Invalid(text.to_string()));
        }
        let digits: String = text
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        Decimal::from_str(&digits)
            .map(Price)
            .map_err(|_| PriceParseError::Invalid(text.to_string()))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Serialized as a JSON number with the literal digits (`12.50`, not `12.5`).
impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let number =
            serde_json::Number::from_str(&self.0.to_string()).map_err(serde::ser::Error::custom)?;
        number.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let number = serde_json::Number::deserialize(deserializer)?;
        number
            .to_string()
            .parse::<Price>()
            .map_err(serde::de::Error::custom)
    }
}
