use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use log::{error, info, warn};
use mongodb::bson::oid::ObjectId;
use regex::Regex;
use serde::Serialize;

use crate::db::repository::PackageRepository;
use crate::errors::{HistoryError, PackageError, RepositoryError};
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::package::{Package, PackageDraft, PackageStatus, PricingPeriod};
use crate::models::price::Price;
use crate::services::package_history_service::PackageHistoryService;
use crate::services::pricing_service::MAX_NIGHTS;

static SCRIPT_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

/// Strips markup from free text: script and style blocks entirely, any other
/// tag leaving its inner text.
pub fn sanitize_sales_notes(text: &str) -> String {
    let without_blocks = SCRIPT_BLOCK_RE.replace_all(text, "");
    TAG_RE.replace_all(&without_blocks, "").trim().to_string()
}

pub fn validate_draft(draft: &PackageDraft) -> Result<(), PackageError> {
    if draft.name.trim().is_empty() {
        return Err(PackageError::validation("name", "package name is required"));
    }

    if draft.group_size_tiers.is_empty() {
        return Err(PackageError::validation(
            "group_size_tiers",
            "at least one group size tier is required",
        ));
    }
    for tier in &draft.group_size_tiers {
        if tier.min_people == 0 || tier.min_people > tier.max_people {
            return Err(PackageError::validation(
                "group_size_tiers",
                format!(
                    "tier '{}' must satisfy 1 <= min ({}) <= max ({})",
                    tier.label, tier.min_people, tier.max_people
                ),
            ));
        }
    }
    for (i, a) in draft.group_size_tiers.iter().enumerate() {
        if let Some(b) = draft.group_size_tiers[i + 1..].iter().find(|b| a.overlaps(b)) {
            return Err(PackageError::validation(
                "group_size_tiers",
                format!("tiers '{}' and '{}' overlap", a.label, b.label),
            ));
        }
    }

    if draft.duration_options.is_empty() {
        return Err(PackageError::validation(
            "duration_options",
            "at least one duration is required",
        ));
    }
    let mut durations = HashSet::new();
    for &nights in &draft.duration_options {
        if nights == 0 || i64::from(nights) > MAX_NIGHTS {
            return Err(PackageError::validation(
                "duration_options",
                format!("{} nights is outside 1..={}", nights, MAX_NIGHTS),
            ));
        }
        if !durations.insert(nights) {
            return Err(PackageError::validation(
                "duration_options",
                format!("{} nights is listed twice", nights),
            ));
        }
    }

    for row in &draft.pricing_matrix {
        if let PricingPeriod::Special {
            name,
            start_date,
            end_date,
        } = &row.period
        {
            if start_date > end_date {
                return Err(PackageError::validation(
                    "pricing_matrix",
                    format!("special period '{}' ends before it starts", name),
                ));
            }
        }
        let mut priced = HashSet::new();
        for cell in &row.prices {
            if cell.tier_index as usize >= draft.group_size_tiers.len() {
                return Err(PackageError::validation(
                    "pricing_matrix",
                    format!(
                        "{} refers to tier {} which does not exist",
                        row.period.label(),
                        cell.tier_index
                    ),
                ));
            }
            if !durations.contains(&cell.nights) {
                return Err(PackageError::validation(
                    "pricing_matrix",
                    format!(
                        "{} has a price for {} nights which is not offered",
                        row.period.label(),
                        cell.nights
                    ),
                ));
            }
            if let Price::Fixed(amount) = cell.price {
                if amount.is_sign_negative() && !amount.is_zero() {
                    return Err(PackageError::validation(
                        "pricing_matrix",
                        format!("{} has a negative price", row.period.label()),
                    ));
                }
            }
            if !priced.insert((cell.tier_index, cell.nights)) {
                return Err(PackageError::validation(
                    "pricing_matrix",
                    format!(
                        "{} has two prices for {}, {} nights",
                        row.period.label(),
                        draft.group_size_tiers[cell.tier_index as usize].label,
                        cell.nights
                    ),
                ));
            }
        }

        // Every row is a complete tier x duration grid, like a CSV row
        for (tier_index, tier) in draft.group_size_tiers.iter().enumerate() {
            for &nights in &draft.duration_options {
                if !priced.contains(&(tier_index as u32, nights)) {
                    return Err(PackageError::validation(
                        "pricing_matrix",
                        format!(
                            "{} has no price for {}, {} nights",
                            row.period.label(),
                            tier.label,
                            nights
                        ),
                    ));
                }
            }
        }
    }

    Ok(())
}

fn require_admin(user: &AuthenticatedUser, action: &str) -> Result<(), PackageError> {
    if user.is_admin() {
        Ok(())
    } else {
        warn!("User {} is not allowed to {}", user.user_id, action);
        Err(PackageError::Unauthorized {
            action: action.to_string(),
        })
    }
}

fn database_error(context: &str, e: RepositoryError) -> PackageError {
    error!("{}: {}", context, e);
    PackageError::Database(e.to_string())
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// Quotes still point at the package; it is tombstoned as a new version
    SoftDeleted { package: Package, quote_count: u64 },
    HardDeleted,
}

pub struct PackageService {
    packages: Arc<dyn PackageRepository>,
    history: Arc<PackageHistoryService>,
}

impl PackageService {
    pub fn new(packages: Arc<dyn PackageRepository>, history: Arc<PackageHistoryService>) -> Self {
        Self { packages, history }
    }

    pub async fn get_package(&self, id: &ObjectId) -> Result<Package, PackageError> {
        self.packages
            .find_by_id(id)
            .await
            .map_err(|e| database_error(&format!("Failed to load package {}", id), e))?
            .ok_or_else(|| PackageError::NotFound { id: id.to_hex() })
    }

    pub async fn list_packages(&self, include_deleted: bool) -> Result<Vec<Package>, PackageError> {
        self.packages
            .list(include_deleted)
            .await
            .map_err(|e| database_error("Failed to list packages", e))
    }

    pub async fn create_package(
        &self,
        mut draft: PackageDraft,
        user: &AuthenticatedUser,
    ) -> Result<Package, PackageError> {
        require_admin(user, "create packages")?;
        validate_draft(&draft)?;
        draft.sales_notes = sanitize_sales_notes(&draft.sales_notes);

        let mut package = Package::from_draft(draft, &user.user_id, Utc::now());
        let id = self
            .packages
            .insert(&package)
            .await
            .map_err(|e| database_error("Failed to insert package", e))?;
        package.id = Some(id);

        info!("Created package {} '{}' by {}", id, package.name, user.user_id);
        Ok(package)
    }

    /// Writes the history snapshot of the stored version first; if that fails
    /// the package is left untouched. A snapshot that already exists and
    /// matches the stored package is reused.
    async fn commit_revision(
        &self,
        id: &ObjectId,
        current: &Package,
        next: &Package,
        user: &AuthenticatedUser,
        change_description: Option<String>,
    ) -> Result<(), PackageError> {
        let expected = current.version;

        match self
            .history
            .save_version(id, current, next, &user.user_id, change_description)
            .await
        {
            Ok(_) => {}
            Err(HistoryError::DuplicateVersion { .. }) => {
                // Left behind by an update whose replace failed; the stored
                // package never moved past it, so the replace below may retry.
                let archived = self.history.get_version(id, expected).await?;
                if archived.is_some_and(|record| record.snapshot == *current) {
                    info!(
                        "Version {} of package {} already archived by an unfinished update; retrying",
                        expected, id
                    );
                } else {
                    warn!(
                        "Version {} of package {} was already archived by a concurrent update",
                        expected, id
                    );
                    return Err(PackageError::VersionConflict {
                        expected,
                        actual: None,
                    });
                }
            }
            Err(e) => {
                error!("Refusing to update package {}: history snapshot failed: {}", id, e);
                return Err(PackageError::History(e));
            }
        }

        match self.packages.replace(next, expected).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::VersionMismatch { expected, actual }) => {
                warn!(
                    "Package {} changed underneath update (expected v{}, found {:?})",
                    id, expected, actual
                );
                Err(PackageError::VersionConflict { expected, actual })
            }
            Err(e) => Err(database_error(&format!("Failed to replace package {}", id), e)),
        }
    }

    pub async fn update_package(
        &self,
        id: &ObjectId,
        expected_version: u32,
        mut draft: PackageDraft,
        user: &AuthenticatedUser,
        change_description: Option<String>,
    ) -> Result<Package, PackageError> {
        require_admin(user, "update packages")?;
        validate_draft(&draft)?;
        draft.sales_notes = sanitize_sales_notes(&draft.sales_notes);

        let current = self.get_package(id).await?;
        if current.is_deleted() {
            return Err(PackageError::NotFound { id: id.to_hex() });
        }
        if current.version != expected_version {
            warn!(
                "Stale update of package {}: client has v{}, stored v{}",
                id, expected_version, current.version
            );
            return Err(PackageError::VersionConflict {
                expected: expected_version,
                actual: Some(current.version),
            });
        }

        let next = current.revised(draft, &user.user_id, Utc::now());
        self.commit_revision(id, &current, &next, user, change_description)
            .await?;

        info!(
            "Updated package {} to version {} by {}",
            id, next.version, user.user_id
        );
        Ok(next)
    }

    /// Soft delete when quotes reference the package, hard delete otherwise.
    pub async fn delete_package(
        &self,
        id: &ObjectId,
        user: &AuthenticatedUser,
    ) -> Result<DeleteOutcome, PackageError> {
        require_admin(user, "delete packages")?;

        let current = self.get_package(id).await?;
        let quote_count = self
            .packages
            .count_referencing_quotes(id)
            .await
            .map_err(|e| database_error(&format!("Failed to count quotes for {}", id), e))?;

        if quote_count == 0 {
            let removed = self
                .packages
                .delete(id)
                .await
                .map_err(|e| database_error(&format!("Failed to delete package {}", id), e))?;
            if !removed {
                return Err(PackageError::NotFound { id: id.to_hex() });
            }
            info!("Hard deleted package {} by {}", id, user.user_id);
            return Ok(DeleteOutcome::HardDeleted);
        }

        if current.is_deleted() {
            return Err(PackageError::InUse {
                package_id: *id,
                quote_count,
            });
        }

        let mut next = current.revised(current.to_draft(), &user.user_id, Utc::now());
        next.status = PackageStatus::Deleted;
        self.commit_revision(
            id,
            &current,
            &next,
            user,
            Some(format!("Deleted while referenced by {} quote(s)", quote_count)),
        )
        .await?;

        info!(
            "Soft deleted package {} ({} quote(s) still linked) by {}",
            id, quote_count, user.user_id
        );
        Ok(DeleteOutcome::SoftDeleted {
            package: next,
            quote_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::package::{GroupSizeTier, PriceCell, PricingRow};
    use crate::services::package_csv_service::{export_package_csv, parse_package_csv};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn draft() -> PackageDraft {
        PackageDraft {
            name: "Alpine Escape".to_string(),
            group_size_tiers: vec![GroupSizeTier::new(1, 5), GroupSizeTier::new(6, 11)],
            duration_options: vec![3],
            pricing_matrix: vec![PricingRow {
                period: PricingPeriod::Month { month: 6 },
                prices: vec![
                    PriceCell {
                        tier_index: 0,
                        nights: 3,
                        price: Price::Fixed(Decimal::from(120)),
                    },
                    PriceCell {
                        tier_index: 1,
                        nights: 3,
                        price: Price::Fixed(Decimal::from(100)),
                    },
                ],
            }],
            ..PackageDraft::default()
        }
    }

    #[test]
    fn test_valid_draft_passes() {
        assert!(validate_draft(&draft()).is_ok());
    }

    #[test]
    fn test_validation_names_the_field() {
        let mut overlapping = draft();
        overlapping.group_size_tiers.push(GroupSizeTier::new(10, 14));
        match validate_draft(&overlapping) {
            Err(PackageError::Validation { field, .. }) => assert_eq!(field, "group_size_tiers"),
            other => panic!("expected validation error, got {:?}", other),
        }

        let mut unnamed = draft();
        unnamed.name = "  ".to_string();
        assert!(matches!(
            validate_draft(&unnamed),
            Err(PackageError::Validation { ref field, .. }) if field == "name"
        ));

        let mut stray_cell = draft();
        stray_cell.pricing_matrix[0].prices[1].nights = 7;
        assert!(validate_draft(&stray_cell).is_err());

        let mut backwards = draft();
        backwards.pricing_matrix.push(PricingRow {
            period: PricingPeriod::Special {
                name: "Easter".to_string(),
                start_date: NaiveDate::from_ymd_opt(2025, 4, 27).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2025, 4, 12).unwrap(),
            },
            prices: Vec::new(),
        });
        assert!(validate_draft(&backwards).is_err());
    }

    #[test]
    fn test_rows_must_price_every_tier_and_duration() {
        let mut sparse = draft();
        sparse.pricing_matrix[0].prices.remove(0);
        match validate_draft(&sparse) {
            Err(PackageError::Validation { field, message }) => {
                assert_eq!(field, "pricing_matrix");
                assert_eq!(message, "June has no price for 1-5 People, 3 nights");
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let mut doubled = draft();
        doubled.pricing_matrix[0].prices[0].tier_index = 1;
        assert!(matches!(
            validate_draft(&doubled),
            Err(PackageError::Validation { ref message, .. }) if message.contains("two prices")
        ));
    }

    #[test]
    fn test_valid_draft_survives_csv_export() {
        let mut special = draft();
        special.pricing_matrix.push(PricingRow {
            period: PricingPeriod::Special {
                name: "Easter".to_string(),
                start_date: NaiveDate::from_ymd_opt(2025, 4, 12).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2025, 4, 27).unwrap(),
            },
            prices: vec![
                PriceCell {
                    tier_index: 0,
                    nights: 3,
                    price: Price::OnRequest,
                },
                PriceCell {
                    tier_index: 1,
                    nights: 3,
                    price: Price::Fixed(Decimal::from(150)),
                },
            ],
        });
        validate_draft(&special).unwrap();

        let csv = export_package_csv(&special).unwrap();
        let parsed = parse_package_csv(&csv).unwrap();
        assert_eq!(parsed.draft.pricing_matrix, special.pricing_matrix);
    }

    #[test]
    fn test_sanitize_sales_notes() {
        assert_eq!(
            sanitize_sales_notes("<p>Book <b>early</b></p><script>steal()</script><STYLE>p{}</STYLE>"),
            "Book early"
        );
        assert_eq!(sanitize_sales_notes("plain text"), "plain text");
    }
}
