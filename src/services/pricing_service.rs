use chrono::NaiveDate;
use log::{debug, error, warn};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::db::repository::PackageRepository;
use crate::errors::{CalculationError, PackageError, PriceRequestError};
use crate::models::package::{GroupSizeTier, Package, PricingPeriod, PricingRow};
use crate::models::price::{PriceResult, TierUsed};

pub const MAX_PEOPLE: i64 = 1000;
pub const MAX_NIGHTS: i64 = 365;

/// Body of a price calculation call. Kept loosely typed so range problems are
/// reported as validation errors rather than JSON decoding failures.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PriceCalculationRequest {
    pub number_of_people: i64,
    pub nights: i64,
    pub arrival_date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedPriceRequest {
    pub number_of_people: u32,
    pub nights: u32,
    pub arrival_date: NaiveDate,
}

fn invalid(field: &str, message: &str) -> PriceRequestError {
    PriceRequestError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

impl PriceCalculationRequest {
    pub fn validate(&self) -> Result<ValidatedPriceRequest, PriceRequestError> {
        if !(1..=MAX_PEOPLE).contains(&self.number_of_people) {
            return Err(invalid(
                "number_of_people",
                "must be a whole number between 1 and 1000",
            ));
        }
        if !(1..=MAX_NIGHTS).contains(&self.nights) {
            return Err(invalid("nights", "must be a whole number between 1 and 365"));
        }
        let arrival_date = NaiveDate::parse_from_str(self.arrival_date.trim(), "%Y-%m-%d")
            .map_err(|_| invalid("arrival_date", "must be an ISO-8601 date (YYYY-MM-DD)"))?;

        Ok(ValidatedPriceRequest {
            number_of_people: self.number_of_people as u32,
            nights: self.nights as u32,
            arrival_date,
        })
    }
}

pub struct PricingService;

impl PricingService {
    /// Tier whose [min, max] headcount range contains `number_of_people`.
    /// Never clamps to the nearest tier.
    pub fn select_tier(
        package: &Package,
        number_of_people: u32,
    ) -> Result<(u32, &GroupSizeTier), CalculationError> {
        let mut matches = package
            .group_size_tiers
            .iter()
            .enumerate()
            .filter(|(_, tier)| tier.contains(number_of_people));

        let (index, tier) = matches
            .next()
            .ok_or(CalculationError::NoTierForGroupSize { number_of_people })?;

        if matches.next().is_some() {
            // Validation keeps tiers disjoint, so this only happens on legacy rows
            warn!(
                "Package '{}' has overlapping tiers for {} people; using '{}'",
                package.name, number_of_people, tier.label
            );
        }

        Ok((index as u32, tier))
    }

    /// Special periods win over calendar months. Among overlapping special
    /// periods the shortest range wins, then matrix order.
    pub fn select_period(
        package: &Package,
        arrival_date: NaiveDate,
    ) -> Result<&PricingRow, CalculationError> {
        let special = package
            .pricing_matrix
            .iter()
            .filter_map(|row| match &row.period {
                PricingPeriod::Special {
                    start_date,
                    end_date,
                    ..
                } if row.period.contains(arrival_date) => {
                    Some((*end_date - *start_date, row))
                }
                _ => None,
            })
            .min_by_key(|(span, _)| *span)
            .map(|(_, row)| row);

        if let Some(row) = special {
            return Ok(row);
        }

        package
            .pricing_matrix
            .iter()
            .find(|row| {
                matches!(row.period, PricingPeriod::Month { .. }) && row.period.contains(arrival_date)
            })
            .ok_or(CalculationError::NoPricingForDate { arrival_date })
    }

    /// Looks up the per-person price for (tier, nights, period) and scales it
    /// by headcount.
    pub fn calculate_price(
        package: &Package,
        number_of_people: u32,
        nights: u32,
        arrival_date: NaiveDate,
    ) -> Result<PriceResult, CalculationError> {
        let (tier_index, tier) = Self::select_tier(package, number_of_people)?;

        if !package.duration_options.contains(&nights) {
            let mut offered = package.duration_options.clone();
            offered.sort_unstable();
            return Err(CalculationError::DurationNotOffered { nights, offered });
        }

        let row = Self::select_period(package, arrival_date)?;
        let per_person = row.price_for(tier_index, nights).ok_or_else(|| {
            CalculationError::PriceNotDefined {
                tier_label: tier.label.clone(),
                nights,
                period: row.period.label(),
            }
        })?;

        debug!(
            "Priced '{}' for {} people, {} nights, arriving {}: {} per person ({})",
            package.name,
            number_of_people,
            nights,
            arrival_date,
            per_person,
            row.period.label()
        );

        Ok(PriceResult::new(
            per_person,
            number_of_people,
            nights,
            package.currency,
            TierUsed {
                index: tier_index,
                label: tier.label.clone(),
            },
            row.period.used(),
        ))
    }

    /// Validates the raw request, loads the package and prices it.
    pub async fn calculate_for_request(
        packages: &dyn PackageRepository,
        package_id: &ObjectId,
        request: &PriceCalculationRequest,
    ) -> Result<PriceResult, PriceRequestError> {
        let request = request.validate()?;

        let package = packages
            .find_by_id(package_id)
            .await
            .map_err(|e| {
                error!("Failed to load package {} for pricing: {}", package_id, e);
                PackageError::Database(e.to_string())
            })?
            .filter(|package| !package.is_deleted())
            .ok_or_else(|| PackageError::NotFound {
                id: package_id.to_hex(),
            })?;

        Ok(Self::calculate_price(
            &package,
            request.number_of_people,
            request.nights,
            request.arrival_date,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::package::{PackageDraft, PriceCell};
    use crate::models::price::{Currency, PeriodType, Price};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cell(tier_index: u32, nights: u32, price: Price) -> PriceCell {
        PriceCell {
            tier_index,
            nights,
            price,
        }
    }

    fn alpine_package() -> Package {
        let draft = PackageDraft {
            name: "Alpine Escape".to_string(),
            destination: "Austria".to_string(),
            resort: "Ischgl".to_string(),
            currency: Currency::Eur,
            group_size_tiers: vec![GroupSizeTier::new(1, 5), GroupSizeTier::new(6, 11)],
            duration_options: vec![2, 3],
            pricing_matrix: vec![
                PricingRow {
                    period: PricingPeriod::Month { month: 6 },
                    prices: vec![
                        cell(0, 2, Price::Fixed(Decimal::from(90))),
                        cell(0, 3, Price::Fixed(Decimal::from(120))),
                        cell(1, 2, Price::Fixed(Decimal::from(80))),
                        cell(1, 3, Price::Fixed(Decimal::from(100))),
                    ],
                },
                PricingRow {
                    period: PricingPeriod::Month { month: 1 },
                    prices: vec![
                        cell(0, 2, Price::OnRequest),
                        cell(0, 3, Price::OnRequest),
                        cell(1, 2, Price::Fixed(Decimal::new(3333, 2))),
                        cell(1, 3, Price::OnRequest),
                    ],
                },
                PricingRow {
                    period: PricingPeriod::Special {
                        name: "Midsummer".to_string(),
                        start_date: date(2025, 6, 20),
                        end_date: date(2025, 6, 24),
                    },
                    prices: vec![
                        cell(0, 2, Price::Fixed(Decimal::from(150))),
                        cell(0, 3, Price::Fixed(Decimal::from(200))),
                        cell(1, 2, Price::Fixed(Decimal::from(140))),
                        cell(1, 3, Price::Fixed(Decimal::from(180))),
                    ],
                },
            ],
            ..Default::default()
        };
        Package::from_draft(draft, "admin", Utc::now())
    }

    #[test]
    fn test_calculates_total_for_matching_tier_and_month() {
        let result =
            PricingService::calculate_price(&alpine_package(), 8, 3, date(2025, 6, 15)).unwrap();

        assert_eq!(result.price_per_person, Price::Fixed(Decimal::from(100)));
        assert_eq!(result.total_price, Price::Fixed(Decimal::from(800)));
        assert_eq!(result.price, result.total_price);
        assert_eq!(result.currency, Currency::Eur);
        assert_eq!(result.tier.label, "6-11 People");
        assert_eq!(result.period.period, "June");
        assert_eq!(result.period.period_type, PeriodType::Month);
        assert!(!result.price_was_on_request);
    }

    #[test]
    fn test_special_period_overrides_month() {
        let result =
            PricingService::calculate_price(&alpine_package(), 2, 2, date(2025, 6, 21)).unwrap();

        assert_eq!(result.period.period, "Midsummer");
        assert_eq!(result.period.period_type, PeriodType::Special);
        assert_eq!(result.total_price, Price::Fixed(Decimal::from(300)));
    }

    #[test]
    fn test_group_outside_every_tier_is_an_error() {
        let err =
            PricingService::calculate_price(&alpine_package(), 20, 3, date(2025, 6, 15)).unwrap_err();
        assert_eq!(
            err,
            CalculationError::NoTierForGroupSize {
                number_of_people: 20
            }
        );
        assert!(err.to_string().contains("no tier covers this group size"));
    }

    #[test]
    fn test_duration_must_be_offered_exactly() {
        let err =
            PricingService::calculate_price(&alpine_package(), 4, 4, date(2025, 6, 15)).unwrap_err();
        assert_eq!(
            err,
            CalculationError::DurationNotOffered {
                nights: 4,
                offered: vec![2, 3]
            }
        );
    }

    #[test]
    fn test_missing_period_is_an_error() {
        let err =
            PricingService::calculate_price(&alpine_package(), 4, 3, date(2025, 3, 1)).unwrap_err();
        assert_eq!(
            err,
            CalculationError::NoPricingForDate {
                arrival_date: date(2025, 3, 1)
            }
        );
    }

    #[test]
    fn test_on_request_propagates_to_total() {
        let result =
            PricingService::calculate_price(&alpine_package(), 3, 3, date(2026, 1, 10)).unwrap();
        assert_eq!(result.price_per_person, Price::OnRequest);
        assert_eq!(result.total_price, Price::OnRequest);
        assert_eq!(result.price, Price::OnRequest);
        assert!(result.price_was_on_request);
    }

    #[test]
    fn test_total_is_rounded_half_up() {
        // 33.33 x 7 = 233.31
        let result =
            PricingService::calculate_price(&alpine_package(), 7, 2, date(2026, 1, 10)).unwrap();
        assert_eq!(result.total_price, Price::Fixed(Decimal::new(23331, 2)));
    }

    #[test]
    fn test_every_headcount_matches_at_most_one_tier() {
        let package = alpine_package();
        let max = package
            .group_size_tiers
            .iter()
            .map(|t| t.max_people)
            .max()
            .unwrap();
        for people in 1..=max {
            let matching = package
                .group_size_tiers
                .iter()
                .filter(|t| t.contains(people))
                .count();
            assert!(matching <= 1, "{} people matched {} tiers", people, matching);
            match PricingService::select_tier(&package, people) {
                Ok((_, tier)) => assert!(tier.contains(people)),
                Err(err) => assert_eq!(
                    err,
                    CalculationError::NoTierForGroupSize {
                        number_of_people: people
                    }
                ),
            }
        }
    }

    #[test]
    fn test_scaling_law_holds_for_fixed_prices() {
        let package = alpine_package();
        for people in 1..=11 {
            let result =
                PricingService::calculate_price(&package, people, 3, date(2025, 6, 2)).unwrap();
            let per_person = result.price_per_person.fixed().unwrap();
            assert_eq!(
                result.total_price,
                Price::Fixed(crate::models::price::round_currency(
                    per_person * Decimal::from(people)
                ))
            );
            assert_eq!(result.price, result.total_price);
        }
    }

    #[test]
    fn test_request_validation_is_distinct_from_calculation_errors() {
        let request = PriceCalculationRequest {
            number_of_people: 0,
            nights: 3,
            arrival_date: "2025-06-15".to_string(),
        };
        assert!(matches!(
            request.validate(),
            Err(PriceRequestError::Validation { ref field, .. }) if field == "number_of_people"
        ));

        let request = PriceCalculationRequest {
            number_of_people: 4,
            nights: 366,
            arrival_date: "2025-06-15".to_string(),
        };
        assert!(matches!(
            request.validate(),
            Err(PriceRequestError::Validation { ref field, .. }) if field == "nights"
        ));

        let request = PriceCalculationRequest {
            number_of_people: 4,
            nights: 3,
            arrival_date: "15/06/2025".to_string(),
        };
        assert!(matches!(
            request.validate(),
            Err(PriceRequestError::Validation { ref field, .. }) if field == "arrival_date"
        ));
    }
}
