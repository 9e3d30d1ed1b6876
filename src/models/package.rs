use chrono::{DateTime, Datelike, NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::price::{Currency, PeriodType, PeriodUsed, Price, TierUsed};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    #[default]
    Active,
    Inactive,
    /// Soft tombstone, kept while quotes still point at the package
    Deleted,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct GroupSizeTier {
    pub label: String,
    pub min_people: u32,
    pub max_people: u32,
}

impl GroupSizeTier {
    pub fn new(min_people: u32, max_people: u32) -> Self {
        Self {
            label: format!("{}-{} People", min_people, max_people),
            min_people,
            max_people,
        }
    }

    pub fn contains(&self, number_of_people: u32) -> bool {
        self.min_people <= number_of_people && number_of_people <= self.max_people
    }

    pub fn overlaps(&self, other: &GroupSizeTier) -> bool {
        self.min_people <= other.max_people && other.min_people <= self.max_people
    }
}

/// Row key of the pricing matrix.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum PricingPeriod {
    #[serde(rename = "month")]
    Month { month: u32 },
    #[serde(rename = "special")]
    Special {
        name: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
}

impl PricingPeriod {
    /// Month names and three-letter abbreviations, any case
    pub fn month_from_label(label: &str) -> Option<PricingPeriod> {
        let label = label.trim().to_lowercase();
        if label.len() < 3 {
            return None;
        }
        MONTH_NAMES
            .iter()
            .position(|name| {
                let name = name.to_lowercase();
                name == label || (label.len() == 3 && name.starts_with(&label))
            })
            .map(|idx| PricingPeriod::Month {
                month: idx as u32 + 1,
            })
    }

    pub fn label(&self) -> String {
        match self {
            PricingPeriod::Month { month } => MONTH_NAMES
                .get((*month as usize).wrapping_sub(1))
                .map(|name| name.to_string())
                .unwrap_or_else(|| format!("Month {}", month)),
            PricingPeriod::Special { name, .. } => name.clone(),
        }
    }

    pub fn period_type(&self) -> PeriodType {
        match self {
            PricingPeriod::Month { .. } => PeriodType::Month,
            PricingPeriod::Special { .. } => PeriodType::Special,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match self {
            PricingPeriod::Month { month } => date.month() == *month,
            PricingPeriod::Special {
                start_date,
                end_date,
                ..
            } => *start_date <= date && date <= *end_date,
        }
    }

    pub fn used(&self) -> PeriodUsed {
        PeriodUsed {
            period: self.label(),
            period_type: self.period_type(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PriceCell {
    pub tier_index: u32,
    pub nights: u32,
    pub price: Price,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PricingRow {
    pub period: PricingPeriod,
    pub prices: Vec<PriceCell>,
}

impl PricingRow {
    /// Per-person price stored at (tier, nights)
    pub fn price_for(&self, tier_index: u32, nights: u32) -> Option<Price> {
        self.prices
            .iter()
            .find(|cell| cell.tier_index == tier_index && cell.nights == nights)
            .map(|cell| cell.price)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Inclusion {
    pub text: String,
    pub category: String,
}

/// Package content before it is persisted: what the CSV import produces and
/// what the admin form submits.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct PackageDraft {
    pub name: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub resort: String,
    #[serde(default)]
    pub currency: Currency,
    pub group_size_tiers: Vec<GroupSizeTier>,
    pub duration_options: Vec<u32>,
    pub pricing_matrix: Vec<PricingRow>,
    #[serde(default)]
    pub inclusions: Vec<Inclusion>,
    #[serde(default)]
    pub accommodation_examples: Vec<String>,
    #[serde(default)]
    pub sales_notes: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Package {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub destination: String,
    pub resort: String,
    pub currency: Currency,
    pub status: PackageStatus,
    pub version: u32,
    pub group_size_tiers: Vec<GroupSizeTier>,
    pub duration_options: Vec<u32>,
    pub pricing_matrix: Vec<PricingRow>,
    pub inclusions: Vec<Inclusion>,
    pub accommodation_examples: Vec<String>,
    pub sales_notes: String,
    pub created_by: String,
    pub last_modified_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Package {
    pub fn from_draft(draft: PackageDraft, created_by: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            name: draft.name,
            destination: draft.destination,
            resort: draft.resort,
            currency: draft.currency,
            status: PackageStatus::Active,
            version: 1,
            group_size_tiers: draft.group_size_tiers,
            duration_options: draft.duration_options,
            pricing_matrix: draft.pricing_matrix,
            inclusions: draft.inclusions,
            accommodation_examples: draft.accommodation_examples,
            sales_notes: draft.sales_notes,
            created_by: created_by.to_string(),
            last_modified_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Next version of this package carrying the draft's content. Identity and
    /// creation audit fields are preserved.
    pub fn revised(&self, draft: PackageDraft, modified_by: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: self.id,
            name: draft.name,
            destination: draft.destination,
            resort: draft.resort,
            currency: draft.currency,
            status: self.status,
            version: self.version + 1,
            group_size_tiers: draft.group_size_tiers,
            duration_options: draft.duration_options,
            pricing_matrix: draft.pricing_matrix,
            inclusions: draft.inclusions,
            accommodation_examples: draft.accommodation_examples,
            sales_notes: draft.sales_notes,
            created_by: self.created_by.clone(),
            last_modified_by: modified_by.to_string(),
            created_at: self.created_at,
            updated_at: now,
        }
    }

    pub fn to_draft(&self) -> PackageDraft {
        PackageDraft {
            name: self.name.clone(),
            destination: self.destination.clone(),
            resort: self.resort.clone(),
            currency: self.currency,
            group_size_tiers: self.group_size_tiers.clone(),
            duration_options: self.duration_options.clone(),
            pricing_matrix: self.pricing_matrix.clone(),
            inclusions: self.inclusions.clone(),
            accommodation_examples: self.accommodation_examples.clone(),
            sales_notes: self.sales_notes.clone(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.status == PackageStatus::Deleted
    }

    pub fn tier_used(&self, tier_index: u32) -> Option<TierUsed> {
        self.group_size_tiers
            .get(tier_index as usize)
            .map(|tier| TierUsed {
                index: tier_index,
                label: tier.label.clone(),
            })
    }
}
