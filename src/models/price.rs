use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire token for a price that has to be quoted by hand.
pub const ON_REQUEST: &str = "ON_REQUEST";

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Currency {
    #[serde(rename = "GBP")]
    Gbp,
    #[default]
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "USD")]
    Usd,
}

impl Currency {
    /// Accepts ISO codes or the usual symbols, case-insensitive
    pub fn parse_label(value: &str) -> Option<Currency> {
        match value.trim().to_uppercase().as_str() {
            "GBP" | "£" => Some(Currency::Gbp),
            "EUR" | "€" => Some(Currency::Eur),
            "USD" | "$" => Some(Currency::Usd),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Gbp => "GBP",
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A matrix cell or calculated amount. `OnRequest` means there is no fixed
/// number and a person has to quote manually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Price {
    Fixed(Decimal),
    OnRequest,
}

impl Price {
    pub fn fixed(&self) -> Option<Decimal> {
        match self {
            Price::Fixed(amount) => Some(*amount),
            Price::OnRequest => None,
        }
    }

    pub fn is_on_request(&self) -> bool {
        matches!(self, Price::OnRequest)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::Fixed(amount) => write!(f, "{}", amount),
            Price::OnRequest => f.write_str(ON_REQUEST),
        }
    }
}

// Fixed amounts travel as decimal strings so Mongo never sees a float.
impl Serialize for Price {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Price::Fixed(amount) => serializer.serialize_str(&amount.to_string()),
            Price::OnRequest => serializer.serialize_str(ON_REQUEST),
        }
    }
}

struct PriceVisitor;

impl<'de> Visitor<'de> for PriceVisitor {
    type Value = Price;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative decimal amount or \"ON_REQUEST\"")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Price, E> {
        if value.eq_ignore_ascii_case(ON_REQUEST) {
            return Ok(Price::OnRequest);
        }
        let amount: Decimal = value
            .trim()
            .parse()
            .map_err(|_| E::custom(format!("invalid price: {}", value)))?;
        fixed_non_negative(amount)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Price, E> {
        fixed_non_negative(Decimal::from(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Price, E> {
        Ok(Price::Fixed(Decimal::from(value)))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Price, E> {
        let amount = Decimal::try_from(value)
            .map_err(|_| E::custom(format!("invalid price: {}", value)))?;
        fixed_non_negative(amount)
    }
}

fn fixed_non_negative<E: de::Error>(amount: Decimal) -> Result<Price, E> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(E::custom("price cannot be negative"));
    }
    Ok(Price::Fixed(amount))
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Price, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(PriceVisitor)
    }
}

/// Half-up rounding to two decimal places.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Two amounts count as equal when they are within one cent of each other.
pub fn within_tolerance(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= Decimal::new(1, 2)
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TierUsed {
    pub index: u32,
    pub label: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Month,
    Special,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PeriodUsed {
    pub period: String,
    pub period_type: PeriodType,
}

/// Outcome of a price lookup with everything needed to re-check it by hand.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PriceResult {
    pub price_per_person: Price,
    pub total_price: Price,
    /// Deprecated alias of `total_price`, still read by older consumers.
    pub price: Price,
    pub price_was_on_request: bool,
    pub number_of_people: u32,
    pub nights: u32,
    pub currency: Currency,
    pub tier: TierUsed,
    pub period: PeriodUsed,
}

impl PriceResult {
    pub fn new(
        per_person: Price,
        number_of_people: u32,
        nights: u32,
        currency: Currency,
        tier: TierUsed,
        period: PeriodUsed,
    ) -> Self {
        let total_price = match per_person {
            Price::Fixed(amount) => {
                Price::Fixed(round_currency(amount * Decimal::from(number_of_people)))
            }
            Price::OnRequest => Price::OnRequest,
        };

        Self {
            price_per_person: per_person,
            total_price,
            price: total_price,
            price_was_on_request: per_person.is_on_request(),
            number_of_people,
            nights,
            currency,
            tier,
            period,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_serde_accepts_numbers_strings_and_sentinel() {
        let fixed: Price = serde_json::from_str("\"125.50\"").unwrap();
        assert_eq!(fixed, Price::Fixed(Decimal::new(12550, 2)));

        let from_number: Price = serde_json::from_str("99").unwrap();
        assert_eq!(from_number, Price::Fixed(Decimal::from(99)));

        let on_request: Price = serde_json::from_str("\"on_request\"").unwrap();
        assert_eq!(on_request, Price::OnRequest);

        assert!(serde_json::from_str::<Price>("\"-5\"").is_err());
        assert_eq!(
            serde_json::to_string(&Price::OnRequest).unwrap(),
            "\"ON_REQUEST\""
        );
    }

    #[test]
    fn test_round_currency_is_half_up() {
        assert_eq!(round_currency(Decimal::new(10005, 3)), Decimal::new(1001, 2));
        assert_eq!(round_currency(Decimal::new(10004, 3)), Decimal::new(1000, 2));
    }

    #[test]
    fn test_currency_labels() {
        assert_eq!(Currency::parse_label("gbp"), Some(Currency::Gbp));
        assert_eq!(Currency::parse_label("€"), Some(Currency::Eur));
        assert_eq!(Currency::parse_label("yen"), None);
        assert_eq!(Currency::default(), Currency::Eur);
    }
}
