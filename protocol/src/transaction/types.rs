//! Money types for the IOU ledger.
//!
//! An [`Amount`] is an integer quantity of the smallest unit of a
//! [`Currency`]. No floating point anywhere near money. Every arithmetic
//! operation is checked, and mixing currencies is an error rather than a
//! silent conversion.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from amount arithmetic and parsing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmountError {
    /// The two operands are denominated differently.
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    /// Addition exceeded `u64::MAX`.
    #[error("amount overflow")]
    Overflow,

    /// Subtraction went below zero.
    #[error("amount underflow: {minuend} - {subtrahend}")]
    Underflow { minuend: u64, subtrahend: u64 },

    /// Text could not be parsed as "<number> <currency>".
    #[error("cannot parse amount: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Currency
// ---------------------------------------------------------------------------

/// Currency denominations understood by the ledger.
///
/// The IOU contract never converts between currencies; the denomination is
/// only used to refuse mixing them and to format amounts for humans.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    /// United States Dollar (smallest unit: cent, 10^-2).
    USD,
    /// Pound Sterling (smallest unit: penny, 10^-2).
    GBP,
    /// Euro (smallest unit: cent, 10^-2).
    EUR,
    /// Swiss Franc (smallest unit: rappen, 10^-2).
    CHF,
    /// Japanese Yen (no minor unit).
    JPY,
    /// Any other ISO-style code.
    Custom(String),
}

impl Currency {
    /// Decimal places for display and parsing.
    pub fn decimals(&self) -> u8 {
        match self {
            Self::USD | Self::GBP | Self::EUR | Self::CHF => 2,
            Self::JPY => 0,
            Self::Custom(_) => 2,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::USD => "USD",
            Self::GBP => "GBP",
            Self::EUR => "EUR",
            Self::CHF => "CHF",
            Self::JPY => "JPY",
            Self::Custom(code) => code,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AmountError::Parse(format!("bad currency code '{}'", s)));
        }
        Ok(match code.as_str() {
            "USD" => Self::USD,
            "GBP" => Self::GBP,
            "EUR" => Self::EUR,
            "CHF" => Self::CHF,
            "JPY" => Self::JPY,
            _ => Self::Custom(code),
        })
    }
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A quantity of the smallest unit of a currency.
///
/// `Amount::new(4_000, Currency::USD)` is forty dollars.
///
/// ```
/// use iou_protocol::transaction::types::{Amount, Currency};
///
/// let forty = Amount::new(4_000, Currency::USD);
/// let sixty = Amount::new(6_000, Currency::USD);
/// assert_eq!(forty.checked_add(&sixty).unwrap().quantity, 10_000);
/// assert_eq!(forty.display_decimal(), "40.00 USD");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    /// Quantity in the smallest indivisible unit of the currency.
    pub quantity: u64,
    pub currency: Currency,
}

impl Amount {
    pub fn new(quantity: u64, currency: Currency) -> Self {
        Self { quantity, currency }
    }

    /// Zero of the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.quantity == 0
    }

    pub fn same_currency(&self, other: &Amount) -> bool {
        self.currency == other.currency
    }

    fn require_same_currency(&self, other: &Amount) -> Result<(), AmountError> {
        if self.same_currency(other) {
            Ok(())
        } else {
            Err(AmountError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            })
        }
    }

    pub fn checked_add(&self, other: &Amount) -> Result<Amount, AmountError> {
        self.require_same_currency(other)?;
        let quantity = self
            .quantity
            .checked_add(other.quantity)
            .ok_or(AmountError::Overflow)?;
        Ok(Amount::new(quantity, self.currency.clone()))
    }

    pub fn checked_sub(&self, other: &Amount) -> Result<Amount, AmountError> {
        self.require_same_currency(other)?;
        let quantity =
            self.quantity
                .checked_sub(other.quantity)
                .ok_or(AmountError::Underflow {
                    minuend: self.quantity,
                    subtrahend: other.quantity,
                })?;
        Ok(Amount::new(quantity, self.currency.clone()))
    }

    /// Compare two amounts of the same currency.
    pub fn checked_cmp(&self, other: &Amount) -> Result<Ordering, AmountError> {
        self.require_same_currency(other)?;
        Ok(self.quantity.cmp(&other.quantity))
    }

    /// Sum a sequence of amounts, all of which must be in `currency`.
    pub fn sum<'a, I>(amounts: I, currency: &Currency) -> Result<Amount, AmountError>
    where
        I: IntoIterator<Item = &'a Amount>,
    {
        amounts
            .into_iter()
            .try_fold(Amount::zero(currency.clone()), |acc, a| acc.checked_add(a))
    }

    /// Human-readable string with decimal formatting, e.g. `"40.00 USD"`.
    pub fn display_decimal(&self) -> String {
        let decimals = self.currency.decimals() as u32;
        if decimals == 0 {
            return format!("{} {}", self.quantity, self.currency);
        }
        let divisor = 10u64.pow(decimals);
        format!(
            "{}.{:0>width$} {}",
            self.quantity / divisor,
            self.quantity % divisor,
            self.currency,
            width = decimals as usize
        )
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_decimal())
    }
}

/// Parses `"40 USD"`, `"40.5 USD"` or `"40.50 USD"` into minor units.
impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (Some(number), Some(code), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(AmountError::Parse(format!("expected '<number> <currency>', got '{}'", s)));
        };
        let currency: Currency = code.parse()?;
        let decimals = currency.decimals() as usize;

        let (whole, frac) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty()
            || frac.len() > decimals
            || !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit())
        {
            return Err(AmountError::Parse(format!("bad number '{}'", number)));
        }
        let whole: u64 = whole
            .parse()
            .map_err(|_| AmountError::Parse(format!("bad number '{}'", number)))?;
        let frac_padded = format!("{:0<width$}", frac, width = decimals);
        let frac: u64 = if decimals == 0 {
            0
        } else {
            frac_padded
                .parse()
                .map_err(|_| AmountError::Parse(format!("bad number '{}'", number)))?
        };
        let quantity = whole
            .checked_mul(10u64.pow(decimals as u32))
            .and_then(|q| q.checked_add(frac))
            .ok_or(AmountError::Overflow)?;
        Ok(Amount::new(quantity, currency))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(q: u64) -> Amount {
        Amount::new(q, Currency::USD)
    }

    #[test]
    fn currency_decimals() {
        assert_eq!(Currency::USD.decimals(), 2);
        assert_eq!(Currency::JPY.decimals(), 0);
    }

    #[test]
    fn currency_parse_known_and_custom() {
        assert_eq!("gbp".parse::<Currency>().unwrap(), Currency::GBP);
        assert_eq!(
            "SEK".parse::<Currency>().unwrap(),
            Currency::Custom("SEK".into())
        );
        assert!("U$D".parse::<Currency>().is_err());
    }

    #[test]
    fn amount_display_decimal() {
        assert_eq!(usd(1050).display_decimal(), "10.50 USD");
        assert_eq!(Amount::new(500, Currency::JPY).display_decimal(), "500 JPY");
    }

    #[test]
    fn checked_arithmetic() {
        assert_eq!(usd(40).checked_add(&usd(60)).unwrap(), usd(100));
        assert_eq!(usd(100).checked_sub(&usd(40)).unwrap(), usd(60));
        assert_eq!(
            usd(1).checked_add(&usd(u64::MAX)),
            Err(AmountError::Overflow)
        );
        match usd(40).checked_sub(&usd(100)) {
            Err(AmountError::Underflow { .. }) => {}
            other => panic!("expected Underflow, got {:?}", other),
        }
    }

    #[test]
    fn mixing_currencies_is_an_error() {
        let gbp = Amount::new(10, Currency::GBP);
        match usd(10).checked_add(&gbp) {
            Err(AmountError::CurrencyMismatch { left, right }) => {
                assert_eq!(left, Currency::USD);
                assert_eq!(right, Currency::GBP);
            }
            other => panic!("expected CurrencyMismatch, got {:?}", other),
        }
        assert!(usd(10).checked_cmp(&gbp).is_err());
    }

    #[test]
    fn sum_of_amounts() {
        let amounts = vec![usd(10), usd(20), usd(30)];
        assert_eq!(Amount::sum(&amounts, &Currency::USD).unwrap(), usd(60));
        assert_eq!(
            Amount::sum(std::iter::empty(), &Currency::USD).unwrap(),
            usd(0)
        );
    }

    #[test]
    fn parse_amounts() {
        assert_eq!("40 USD".parse::<Amount>().unwrap(), usd(4000));
        assert_eq!("40.5 USD".parse::<Amount>().unwrap(), usd(4050));
        assert_eq!("0.07 usd".parse::<Amount>().unwrap(), usd(7));
        assert_eq!(
            "1200 JPY".parse::<Amount>().unwrap(),
            Amount::new(1200, Currency::JPY)
        );
        assert!("40.123 USD".parse::<Amount>().is_err());
        assert!("40".parse::<Amount>().is_err());
        assert!("-1 USD".parse::<Amount>().is_err());
        assert!("1.5 JPY".parse::<Amount>().is_err());
    }
}
