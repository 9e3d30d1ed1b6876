//! Quote price synchronisation.
//!
//! A quote's sync status is never stored. It is derived on every load by
//! re-running the calculator for the quote's current parameters and comparing
//! the stored total against `fresh base price + events total`:
//!
//! 1. a recalculation is in flight: `calculating`
//! 2. no linked package, the package is gone or deleted, or the calculator
//!    fails: `error`
//! 3. the fresh price is ON_REQUEST: `custom`
//! 4. stored total within 0.01 of fresh + events: `synced`
//! 5. last price change was a manual override: `custom`
//! 6. stored total within 0.01 of the linked snapshot price + events:
//!    `out-of-sync` (parameters or package changed since it was priced)
//! 7. anything else: `custom`
//!
//! A package priced in a different currency than the quote is an `error`.
//!
//! Every mutation holds a per-quote guard from load to save and writes with
//! an optimistic check on `Quote::revision`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use log::{error, info, warn};
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::db::repository::{PackageRepository, QuoteRepository};
use crate::errors::{CalculationError, RepositoryError, SyncError};
use crate::models::package::Package;
use crate::models::price::{round_currency, within_tolerance, Currency, Price};
use crate::models::quote::{
    DetachReason, LinkedPackage, PackageLink, PriceChangeReason, Quote, SelectedEvent,
    SyncReport, SyncStatus,
};
use crate::services::pricing_service::PricingService;

pub fn derive_sync_status(quote: &Quote, current: Option<&Package>, in_flight: bool) -> SyncReport {
    let events = quote.events_total();
    let link = quote
        .linked_package
        .as_ref()
        .map(|linked| PackageLink::resolve(linked, current));

    let mut report = SyncReport {
        quote_id: quote.id,
        status: SyncStatus::Error,
        total_price: quote.total_price,
        base_price: None,
        events_total: events.total,
        expected_total: None,
        link: link.clone(),
        warnings: events.warnings,
        error: None,
    };

    if let Some(PackageLink::Detached {
        snapshot,
        reason: DetachReason::Revised { current_version },
    }) = &link
    {
        report.warnings.push(format!(
            "Package '{}' was revised (v{} to v{}) since this quote was priced",
            snapshot.package_name, snapshot.package_version, current_version
        ));
    }

    if in_flight {
        report.status = SyncStatus::Calculating;
        return report;
    }

    let (linked, package) = match (&link, current) {
        (None, _) => {
            report.error = Some("quote has no linked package".to_string());
            return report;
        }
        (Some(link), Some(package)) if link.is_priceable() => (link.snapshot(), package),
        (Some(link), _) => {
            report.error = Some(format!(
                "linked package '{}' is no longer available",
                link.snapshot().package_name
            ));
            return report;
        }
    };

    if package.currency != quote.currency {
        report.error = Some(currency_mismatch(package, quote).to_string());
        return report;
    }

    let fresh = match PricingService::calculate_price(
        package,
        quote.number_of_people,
        quote.number_of_nights,
        quote.arrival_date,
    ) {
        Ok(result) => result.total_price,
        Err(e) => {
            report.error = Some(e.to_string());
            return report;
        }
    };
    report.base_price = Some(fresh);

    let Price::Fixed(base) = fresh else {
        report.status = SyncStatus::Custom;
        return report;
    };

    let expected = round_currency(base + events.total);
    report.expected_total = Some(expected);

    let manually_overridden = quote
        .last_price_change()
        .is_some_and(|entry| entry.reason == PriceChangeReason::ManualOverride);
    let matches_snapshot = linked
        .calculated_price
        .fixed()
        .is_some_and(|priced| within_tolerance(quote.total_price, priced + events.total));

    report.status = if within_tolerance(quote.total_price, expected) {
        SyncStatus::Synced
    } else if manually_overridden {
        SyncStatus::Custom
    } else if matches_snapshot {
        SyncStatus::OutOfSync
    } else {
        SyncStatus::Custom
    };
    report
}

fn currency_mismatch(package: &Package, quote: &Quote) -> SyncError {
    SyncError::CurrencyMismatch {
        package_currency: package.currency,
        quote_currency: quote.currency,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub event_id: String,
    pub event_name: String,
    pub event_price: Decimal,
    pub event_currency: Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteWork {
    Recalculating,
    Editing,
}

/// Claims a quote for one mutation until dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<ObjectId, QuoteWork>>,
    quote_id: ObjectId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        match self.in_flight.lock() {
            Ok(mut ids) => {
                ids.remove(&self.quote_id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&self.quote_id);
            }
        }
    }
}

fn quote_db_error(context: String, e: RepositoryError) -> SyncError {
    error!("{}: {}", context, e);
    SyncError::Database(e.to_string())
}

pub struct QuoteSyncService {
    packages: Arc<dyn PackageRepository>,
    quotes: Arc<dyn QuoteRepository>,
    in_flight: Mutex<HashMap<ObjectId, QuoteWork>>,
}

impl QuoteSyncService {
    pub fn new(packages: Arc<dyn PackageRepository>, quotes: Arc<dyn QuoteRepository>) -> Self {
        Self {
            packages,
            quotes,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn begin(
        &self,
        quote_id: &ObjectId,
        work: QuoteWork,
        action: &'static str,
    ) -> Result<InFlightGuard<'_>, SyncError> {
        let mut ids = self
            .in_flight
            .lock()
            .map_err(|_| SyncError::Database("in-flight set lock poisoned".to_string()))?;
        if let Some(running) = ids.get(quote_id) {
            warn!(
                "Rejected attempt to {} on quote {} while {:?}",
                action, quote_id, running
            );
            return Err(match (running, work) {
                (QuoteWork::Recalculating, QuoteWork::Recalculating) => {
                    SyncError::RecalculationInProgress
                }
                (QuoteWork::Recalculating, QuoteWork::Editing) => SyncError::InvalidTransition {
                    status: SyncStatus::Calculating,
                    action,
                },
                (QuoteWork::Editing, _) => SyncError::ConcurrentUpdate {
                    id: quote_id.to_hex(),
                },
            });
        }
        ids.insert(*quote_id, work);
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            quote_id: *quote_id,
        })
    }

    fn is_calculating(&self, quote_id: &ObjectId) -> bool {
        self.in_flight
            .lock()
            .map(|ids| ids.get(quote_id) == Some(&QuoteWork::Recalculating))
            .unwrap_or(false)
    }

    async fn load_quote(&self, quote_id: &ObjectId) -> Result<Quote, SyncError> {
        self.quotes
            .find_by_id(quote_id)
            .await
            .map_err(|e| quote_db_error(format!("Failed to load quote {}", quote_id), e))?
            .ok_or_else(|| SyncError::QuoteNotFound {
                id: quote_id.to_hex(),
            })
    }

    async fn load_linked_package(&self, quote: &Quote) -> Result<Option<Package>, SyncError> {
        let Some(linked) = &quote.linked_package else {
            return Ok(None);
        };
        self.packages
            .find_by_id(&linked.package_id)
            .await
            .map_err(|e| {
                quote_db_error(format!("Failed to load package {}", linked.package_id), e)
            })
    }

    /// Writes the quote only if nobody saved it since it was loaded.
    async fn save_quote(&self, quote: &mut Quote) -> Result<(), SyncError> {
        let expected = quote.revision;
        quote.revision = expected + 1;
        match self.quotes.replace(quote, expected).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::VersionMismatch { actual, .. }) => {
                quote.revision = expected;
                warn!(
                    "Quote {:?} changed underneath (expected revision {}, found {:?})",
                    quote.id, expected, actual
                );
                Err(SyncError::ConcurrentUpdate {
                    id: quote.id.map(|id| id.to_hex()).unwrap_or_default(),
                })
            }
            Err(e) => {
                quote.revision = expected;
                Err(quote_db_error(format!("Failed to save quote {:?}", quote.id), e))
            }
        }
    }

    async fn report(&self, quote: &Quote) -> Result<SyncReport, SyncError> {
        let package = self.load_linked_package(quote).await?;
        let in_flight = quote.id.is_some_and(|id| self.is_calculating(&id));
        Ok(derive_sync_status(quote, package.as_ref(), in_flight))
    }

    pub async fn sync_status(&self, quote_id: &ObjectId) -> Result<SyncReport, SyncError> {
        let quote = self.load_quote(quote_id).await?;
        self.report(&quote).await
    }

    /// Re-prices the quote from its linked package. Any other change to the
    /// same quote while this runs is rejected, never interleaved.
    pub async fn recalculate_price(
        &self,
        quote_id: &ObjectId,
        changed_by: Option<&str>,
    ) -> Result<SyncReport, SyncError> {
        let guard = self.begin(quote_id, QuoteWork::Recalculating, "recalculate the price")?;

        let mut quote = self.load_quote(quote_id).await?;
        let linked = quote
            .linked_package
            .clone()
            .ok_or(SyncError::NoLinkedPackage)?;
        let current = self.load_linked_package(&quote).await?;

        let link = PackageLink::resolve(&linked, current.as_ref());
        let package = match current {
            Some(package) if link.is_priceable() => package,
            _ => {
                let reason = match link {
                    PackageLink::Detached {
                        reason: DetachReason::Deleted,
                        ..
                    } => "deleted",
                    _ => "removed",
                };
                return Err(SyncError::PackageUnavailable {
                    package_id: linked.package_id,
                    reason: reason.to_string(),
                });
            }
        };
        if package.currency != quote.currency {
            warn!(
                "Quote {} is in {} but package {} is priced in {}",
                quote_id, quote.currency, linked.package_id, package.currency
            );
            return Err(currency_mismatch(&package, &quote));
        }

        let result = PricingService::calculate_price(
            &package,
            quote.number_of_people,
            quote.number_of_nights,
            quote.arrival_date,
        )
        .inspect_err(|e| warn!("Recalculation of quote {} failed: {}", quote_id, e))?;
        let base = result
            .total_price
            .fixed()
            .ok_or(SyncError::Calculation(CalculationError::PriceOnRequest))?;

        let events = quote.events_total();
        let total = round_currency(base + events.total);
        quote.linked_package = Some(LinkedPackage::from_result(
            &package,
            linked.package_id,
            &result,
        ));
        quote.record_price(
            total,
            PriceChangeReason::Recalculated,
            Some(format!(
                "Recalculated from '{}' v{} ({}, {} nights)",
                package.name, package.version, result.period.period, result.nights
            )),
            changed_by,
            Utc::now(),
        );
        self.save_quote(&mut quote).await?;
        drop(guard);

        info!("Recalculated quote {}: total {}", quote_id, total);
        Ok(derive_sync_status(&quote, Some(&package), false))
    }

    /// Discards a manual override and restores the last calculated price.
    pub async fn reset_to_calculated(
        &self,
        quote_id: &ObjectId,
        changed_by: Option<&str>,
    ) -> Result<SyncReport, SyncError> {
        let _guard = self.begin(quote_id, QuoteWork::Editing, "reset the price")?;

        let mut quote = self.load_quote(quote_id).await?;
        let current = self.load_linked_package(&quote).await?;
        let report = derive_sync_status(&quote, current.as_ref(), false);
        if report.status != SyncStatus::Custom {
            return Err(SyncError::InvalidTransition {
                status: report.status,
                action: "reset the price",
            });
        }

        let baseline = quote
            .linked_package
            .as_ref()
            .and_then(|linked| linked.calculated_price.fixed())
            .ok_or(SyncError::NothingToRestore)?;
        let total = round_currency(baseline + quote.events_total().total);

        quote.record_price(
            total,
            PriceChangeReason::Recalculated,
            Some("Manual price discarded; restored calculated price".to_string()),
            changed_by,
            Utc::now(),
        );
        self.save_quote(&mut quote).await?;

        info!("Reset quote {} to calculated total {}", quote_id, total);
        Ok(derive_sync_status(&quote, current.as_ref(), false))
    }

    pub async fn set_manual_price(
        &self,
        quote_id: &ObjectId,
        price: Decimal,
        change_description: Option<String>,
        changed_by: Option<&str>,
    ) -> Result<SyncReport, SyncError> {
        if price.is_sign_negative() && !price.is_zero() {
            return Err(SyncError::Validation {
                field: "total_price".to_string(),
                message: "price cannot be negative".to_string(),
            });
        }
        let _guard = self.begin(quote_id, QuoteWork::Editing, "set a manual price")?;

        let mut quote = self.load_quote(quote_id).await?;
        quote.record_price(
            round_currency(price),
            PriceChangeReason::ManualOverride,
            change_description,
            changed_by,
            Utc::now(),
        );
        self.save_quote(&mut quote).await?;

        info!("Manual price {} set on quote {}", quote.total_price, quote_id);
        self.report(&quote).await
    }

    /// Adds an ad-hoc event. Its price joins the total only when it is in the
    /// quote's currency.
    pub async fn add_event(
        &self,
        quote_id: &ObjectId,
        event: NewEvent,
        changed_by: Option<&str>,
    ) -> Result<SyncReport, SyncError> {
        if event.event_id.trim().is_empty() || event.event_name.trim().is_empty() {
            return Err(SyncError::Validation {
                field: "event".to_string(),
                message: "event id and name are required".to_string(),
            });
        }
        if event.event_price.is_sign_negative() && !event.event_price.is_zero() {
            return Err(SyncError::Validation {
                field: "event_price".to_string(),
                message: "event price cannot be negative".to_string(),
            });
        }
        let _guard = self.begin(quote_id, QuoteWork::Editing, "add an event")?;

        let mut quote = self.load_quote(quote_id).await?;
        if quote
            .selected_events
            .iter()
            .any(|existing| existing.event_id == event.event_id)
        {
            return Err(SyncError::Validation {
                field: "event_id".to_string(),
                message: format!("event {} is already on this quote", event.event_id),
            });
        }

        let counts = event.event_currency == quote.currency;
        if !counts {
            warn!(
                "Event {} on quote {} is in {} but the quote is in {}",
                event.event_id, quote_id, event.event_currency, quote.currency
            );
        }
        let total = if counts {
            quote.total_price + event.event_price
        } else {
            quote.total_price
        };
        let description = format!("Added event '{}'", event.event_name);

        let now = Utc::now();
        quote.selected_events.push(SelectedEvent {
            event_id: event.event_id,
            event_name: event.event_name,
            event_price: event.event_price,
            event_currency: event.event_currency,
            added_at: now,
        });
        quote.record_price(
            round_currency(total),
            PriceChangeReason::EventAdded,
            Some(description),
            changed_by,
            now,
        );
        self.save_quote(&mut quote).await?;

        self.report(&quote).await
    }

    pub async fn remove_event(
        &self,
        quote_id: &ObjectId,
        event_id: &str,
        changed_by: Option<&str>,
    ) -> Result<SyncReport, SyncError> {
        let _guard = self.begin(quote_id, QuoteWork::Editing, "remove an event")?;

        let mut quote = self.load_quote(quote_id).await?;
        let position = quote
            .selected_events
            .iter()
            .position(|event| event.event_id == event_id)
            .ok_or_else(|| SyncError::Validation {
                field: "event_id".to_string(),
                message: format!("event {} is not on this quote", event_id),
            })?;

        let event = quote.selected_events.remove(position);
        let total = if event.event_currency == quote.currency {
            quote.total_price - event.event_price
        } else {
            quote.total_price
        };
        quote.record_price(
            round_currency(total.max(Decimal::ZERO)),
            PriceChangeReason::EventRemoved,
            Some(format!("Removed event '{}'", event.event_name)),
            changed_by,
            Utc::now(),
        );
        self.save_quote(&mut quote).await?;

        self.report(&quote).await
    }
}
