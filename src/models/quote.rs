use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::package::Package;
use super::price::{Currency, PeriodUsed, Price, PriceResult};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceChangeReason {
    Initial,
    ManualOverride,
    EventAdded,
    EventRemoved,
    Recalculated,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PriceHistoryEntry {
    pub price: Decimal,
    pub reason: PriceChangeReason,
    pub change_description: Option<String>,
    #[serde(default)]
    pub changed_by: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SelectedTier {
    pub tier_index: u32,
    pub tier_label: String,
}

/// Point-in-time copy of the package pricing a quote was built from. Stays
/// valid after the package is edited or deleted.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LinkedPackage {
    pub package_id: ObjectId,
    pub package_name: String,
    pub package_version: u32,
    pub selected_tier: SelectedTier,
    pub selected_nights: u32,
    pub selected_period: PeriodUsed,
    pub calculated_price: Price,
    pub price_per_person: Price,
    pub price_was_on_request: bool,
}

impl LinkedPackage {
    pub fn from_result(package: &Package, package_id: ObjectId, result: &PriceResult) -> Self {
        Self {
            package_id,
            package_name: package.name.clone(),
            package_version: package.version,
            selected_tier: SelectedTier {
                tier_index: result.tier.index,
                tier_label: result.tier.label.clone(),
            },
            selected_nights: result.nights,
            selected_period: result.period.clone(),
            calculated_price: result.total_price,
            price_per_person: result.price_per_person,
            price_was_on_request: result.price_was_on_request,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SelectedEvent {
    pub event_id: String,
    pub event_name: String,
    pub event_price: Decimal,
    pub event_currency: Currency,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Quote {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub number_of_people: u32,
    pub number_of_nights: u32,
    pub arrival_date: NaiveDate,
    pub destination: String,
    pub currency: Currency,
    pub linked_package: Option<LinkedPackage>,
    #[serde(default)]
    pub selected_events: Vec<SelectedEvent>,
    pub total_price: Decimal,
    #[serde(default)]
    pub price_history: Vec<PriceHistoryEntry>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Bumped on every save; writes carrying a stale revision are rejected
    #[serde(default)]
    pub revision: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EventsTotal {
    pub total: Decimal,
    /// Events left out of the total because their currency differs
    pub warnings: Vec<String>,
}

impl Quote {
    pub fn events_total(&self) -> EventsTotal {
        let mut total = Decimal::ZERO;
        let mut warnings = Vec::new();

        for event in &self.selected_events {
            if event.event_currency == self.currency {
                total += event.event_price;
            } else {
                warnings.push(format!(
                    "Event '{}' is priced in {} but the quote is in {}; it is not included in the total",
                    event.event_name, event.event_currency, self.currency
                ));
            }
        }

        EventsTotal { total, warnings }
    }

    pub fn record_price(
        &mut self,
        price: Decimal,
        reason: PriceChangeReason,
        change_description: Option<String>,
        changed_by: Option<&str>,
        now: DateTime<Utc>,
    ) {
        self.total_price = price;
        self.price_history.push(PriceHistoryEntry {
            price,
            reason,
            change_description,
            changed_by: changed_by.map(str::to_string),
            timestamp: now,
        });
        self.updated_at = Some(now);
    }

    pub fn last_price_change(&self) -> Option<&PriceHistoryEntry> {
        self.price_history.last()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetachReason {
    /// Package was edited after the quote was priced
    Revised { current_version: u32 },
    /// Package soft-deleted
    Deleted,
    /// Package row no longer exists
    Removed,
}

/// A quote's linked package resolved against the live catalog.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PackageLink {
    Live {
        snapshot: LinkedPackage,
    },
    Detached {
        snapshot: LinkedPackage,
        reason: DetachReason,
    },
}

impl PackageLink {
    pub fn resolve(snapshot: &LinkedPackage, current: Option<&Package>) -> Self {
        let reason = match current {
            None => Some(DetachReason::Removed),
            Some(package) if package.is_deleted() => Some(DetachReason::Deleted),
            Some(package) if package.version != snapshot.package_version => {
                Some(DetachReason::Revised {
                    current_version: package.version,
                })
            }
            Some(_) => None,
        };

        match reason {
            None => PackageLink::Live {
                snapshot: snapshot.clone(),
            },
            Some(reason) => PackageLink::Detached {
                snapshot: snapshot.clone(),
                reason,
            },
        }
    }

    pub fn snapshot(&self) -> &LinkedPackage {
        match self {
            PackageLink::Live { snapshot } | PackageLink::Detached { snapshot, .. } => snapshot,
        }
    }

    /// A revised package can still be priced; a deleted or removed one cannot
    pub fn is_priceable(&self) -> bool {
        !matches!(
            self,
            PackageLink::Detached {
                reason: DetachReason::Deleted | DetachReason::Removed,
                ..
            }
        )
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    Synced,
    Calculating,
    Custom,
    Error,
    OutOfSync,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Calculating => "calculating",
            SyncStatus::Custom => "custom",
            SyncStatus::Error => "error",
            SyncStatus::OutOfSync => "out-of-sync",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync state as shown to the client. Derived on every load, never stored.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SyncReport {
    pub quote_id: Option<ObjectId>,
    pub status: SyncStatus,
    pub total_price: Decimal,
    pub base_price: Option<Price>,
    pub events_total: Decimal,
    pub expected_total: Option<Decimal>,
    pub link: Option<PackageLink>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}
