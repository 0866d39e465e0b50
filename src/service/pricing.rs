//! Order pricing, payout share and freelancer working-time allocation.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::{
    models::jobmodel::ServiceType,
    service::error::ServiceError,
    utils::currency::round_to_whole_shilling,
};

/// Orders due sooner than this are charged the urgency surcharge.
pub const URGENCY_WINDOW_HOURS: i64 = 8;
/// Multiplier in percent applied to urgent, non-editing orders.
pub const URGENCY_MULTIPLIER_PERCENT: i64 = 130;
/// Freelancer share of an order amount, in percent.
pub const FREELANCER_SHARE_PERCENT: i64 = 70;
/// Share of the client window given to the freelancer, in percent.
pub const FREELANCER_TIME_SHARE_PERCENT: i64 = 60;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Writing,
    Presentation,
    Editing,
    Technical,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct CatalogEntry {
    pub service_type: ServiceType,
    /// Whole shillings per unit.
    pub rate: i64,
    pub unit: &'static str,
    pub category: ServiceCategory,
}

pub fn catalog_entry(service_type: ServiceType) -> CatalogEntry {
    let (rate, unit, category) = match service_type {
        ServiceType::Essay => (250, "page", ServiceCategory::Writing),
        ServiceType::ResearchPaper => (300, "page", ServiceCategory::Writing),
        ServiceType::TermPaper => (280, "page", ServiceCategory::Writing),
        ServiceType::Dissertation => (350, "page", ServiceCategory::Writing),
        ServiceType::Thesis => (350, "page", ServiceCategory::Writing),
        ServiceType::CaseStudy => (270, "page", ServiceCategory::Writing),
        ServiceType::Assignment => (250, "page", ServiceCategory::Writing),
        ServiceType::Article => (200, "page", ServiceCategory::Writing),
        ServiceType::Presentation => (150, "slide", ServiceCategory::Presentation),
        ServiceType::Proofreading => (100, "page", ServiceCategory::Editing),
        ServiceType::Editing => (120, "page", ServiceCategory::Editing),
        ServiceType::Rewriting => (150, "page", ServiceCategory::Editing),
        ServiceType::DataAnalysis => (500, "task", ServiceCategory::Technical),
        ServiceType::Programming => (800, "task", ServiceCategory::Technical),
    };

    CatalogEntry {
        service_type,
        rate,
        unit,
        category,
    }
}

pub fn catalog() -> Vec<CatalogEntry> {
    ServiceType::ALL.iter().copied().map(catalog_entry).collect()
}

pub fn is_urgent(service_type: ServiceType, deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    catalog_entry(service_type).category != ServiceCategory::Editing
        && deadline - now < Duration::hours(URGENCY_WINDOW_HOURS)
}

/// Computed order amount in cents, rounded to the nearest whole shilling.
///
/// The surcharge is folded into the total and never itemised.
pub fn compute_amount_cents(
    service_type: ServiceType,
    quantity: f64,
    deadline: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<i64, ServiceError> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(ServiceError::Validation("Quantity must be a positive number".to_string()));
    }

    let entry = catalog_entry(service_type);
    let mut cents = entry.rate as f64 * 100.0 * quantity;
    if is_urgent(service_type, deadline, now) {
        cents = cents * URGENCY_MULTIPLIER_PERCENT as f64 / 100.0;
    }

    Ok(round_to_whole_shilling(cents.round() as i64))
}

/// Resolves the amount a client will be charged. A custom amount is only
/// accepted when it is not below the computed price.
pub fn resolve_order_amount(
    computed_cents: i64,
    custom_cents: Option<i64>,
) -> Result<i64, ServiceError> {
    match custom_cents {
        None => Ok(computed_cents),
        Some(custom) if custom >= computed_cents => Ok(custom),
        Some(custom) => Err(ServiceError::Validation(format!(
            "Custom amount {} is below the computed price {}",
            custom, computed_cents
        ))),
    }
}

/// Freelancer payout for an order amount, floored to the cent.
pub fn payout_share_cents(amount_cents: i64) -> i64 {
    amount_cents * FREELANCER_SHARE_PERCENT / 100
}

pub fn platform_share_cents(amount_cents: i64) -> i64 {
    amount_cents - payout_share_cents(amount_cents)
}

/// Freelancers get the first 60% of the window between `start` and the client
/// deadline; the remainder is the admin review buffer.
pub fn freelancer_deadline(start: DateTime<Utc>, deadline: DateTime<Utc>) -> DateTime<Utc> {
    let window_ms = (deadline - start).num_milliseconds();
    start + Duration::milliseconds(window_ms * FREELANCER_TIME_SHARE_PERCENT / 100)
}

#[derive(Debug, Serialize)]
pub struct Quote {
    pub service_type: ServiceType,
    pub quantity: f64,
    pub unit: &'static str,
    pub amount_cents: i64,
    pub freelancer_deadline: DateTime<Utc>,
}

pub fn quote(
    service_type: ServiceType,
    quantity: f64,
    deadline: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Quote, ServiceError> {
    if deadline <= now {
        return Err(ServiceError::Validation("Deadline must be in the future".to_string()));
    }

    Ok(Quote {
        service_type,
        quantity,
        unit: catalog_entry(service_type).unit,
        amount_cents: compute_amount_cents(service_type, quantity, deadline, now)?,
        freelancer_deadline: freelancer_deadline(now, deadline),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn essay_with_relaxed_deadline_has_no_surcharge() {
        let amount =
            compute_amount_cents(ServiceType::Essay, 4.0, now() + Duration::hours(10), now()).unwrap();
        assert_eq!(amount, 100_000);
        assert_eq!(payout_share_cents(amount), 70_000);
    }

    #[test]
    fn essay_due_in_five_hours_is_urgent() {
        let amount =
            compute_amount_cents(ServiceType::Essay, 4.0, now() + Duration::hours(5), now()).unwrap();
        assert_eq!(amount, 130_000);
    }

    #[test]
    fn exactly_eight_hours_is_not_urgent() {
        assert!(!is_urgent(ServiceType::Essay, now() + Duration::hours(8), now()));
        assert!(is_urgent(
            ServiceType::Essay,
            now() + Duration::hours(8) - Duration::seconds(1),
            now()
        ));
    }

    #[test]
    fn editing_services_never_pay_the_surcharge() {
        let amount = compute_amount_cents(
            ServiceType::Proofreading,
            3.0,
            now() + Duration::hours(1),
            now(),
        )
        .unwrap();
        assert_eq!(amount, 30_000);
    }

    #[test]
    fn rounds_to_whole_shillings() {
        // 150 * 1.3 * 1.5 = 292.5 -> 293
        let amount =
            compute_amount_cents(ServiceType::Presentation, 1.5, now() + Duration::hours(2), now())
                .unwrap();
        assert_eq!(amount, 29_300);
    }

    #[test]
    fn amount_is_monotonic_in_quantity() {
        for service_type in ServiceType::ALL {
            for hours in [2, 12] {
                let deadline = now() + Duration::hours(hours);
                let mut previous = 0;
                for step in 1..=40 {
                    let quantity = step as f64 * 0.5;
                    let amount =
                        compute_amount_cents(service_type, quantity, deadline, now()).unwrap();
                    assert!(amount >= previous, "{:?} not monotonic at {}", service_type, quantity);
                    previous = amount;
                }
            }
        }
    }

    #[test]
    fn rejects_non_positive_quantities() {
        let deadline = now() + Duration::hours(10);
        assert!(compute_amount_cents(ServiceType::Essay, 0.0, deadline, now()).is_err());
        assert!(compute_amount_cents(ServiceType::Essay, -1.0, deadline, now()).is_err());
        assert!(compute_amount_cents(ServiceType::Essay, f64::NAN, deadline, now()).is_err());
    }

    #[test]
    fn custom_amount_floor_is_enforced() {
        assert_eq!(resolve_order_amount(100_000, None).unwrap(), 100_000);
        assert_eq!(resolve_order_amount(100_000, Some(120_000)).unwrap(), 120_000);
        assert_eq!(resolve_order_amount(100_000, Some(100_000)).unwrap(), 100_000);
        assert!(resolve_order_amount(100_000, Some(99_900)).is_err());
    }

    #[test]
    fn payout_and_platform_shares_add_up() {
        for amount in [1, 99, 100_000, 130_000, 123_457] {
            assert_eq!(payout_share_cents(amount) + platform_share_cents(amount), amount);
        }
        assert_eq!(payout_share_cents(123_457), 86_419);
    }

    #[test]
    fn freelancer_gets_sixty_percent_of_the_window() {
        let start = now();
        let deadline = start + Duration::hours(10);
        let due = freelancer_deadline(start, deadline);
        assert_eq!(due, start + Duration::hours(6));
        assert!(due <= deadline);
    }

    #[test]
    fn freelancer_deadline_never_exceeds_client_deadline() {
        let start = now();
        for minutes in [1, 7, 59, 601, 10_007] {
            let deadline = start + Duration::minutes(minutes);
            assert!(freelancer_deadline(start, deadline) <= deadline);
        }
    }

    #[test]
    fn quote_requires_future_deadline() {
        assert!(quote(ServiceType::Essay, 1.0, now(), now()).is_err());
        let q = quote(ServiceType::Essay, 2.0, now() + Duration::days(2), now()).unwrap();
        assert_eq!(q.amount_cents, 50_000);
        assert_eq!(q.unit, "page");
    }

    #[test]
    fn catalog_lists_every_service() {
        assert_eq!(catalog().len(), ServiceType::ALL.len());
    }
}
