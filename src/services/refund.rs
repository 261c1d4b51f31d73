//! Refund policy calculator
//!
//! Maps an event's cancellation policy, the amount a member paid and the
//! moment of cancellation to a [`RefundDecision`]. Pure: no clock, no I/O.
//! Amounts are integer minor units and the result never exceeds what was paid.

use chrono::{DateTime, Duration, Utc};
use crate::models::{Event, RefundDecision, RefundKind, RefundPolicy};
use crate::utils::helpers::time_until;

pub fn calculate_refund(event: &Event, amount_paid: i64, cancelled_at: DateTime<Utc>) -> RefundDecision {
    let Some(policy) = event.refund_policy else {
        return RefundDecision::none("Event has no refund policy");
    };
    if amount_paid <= 0 {
        return RefundDecision::none("Nothing was paid");
    }

    let deadline = Duration::hours(i64::from(event.refund_deadline_hours.unwrap_or(0).max(0)));
    if time_until(event.start_time, cancelled_at) < deadline {
        return RefundDecision::none(format!(
            "Cancelled outside the {}h refund deadline",
            deadline.num_hours()
        ));
    }

    match policy {
        RefundPolicy::NoRefund => RefundDecision::none("Event policy does not allow refunds"),
        RefundPolicy::FullRefund => RefundDecision {
            amount_cents: amount_paid,
            kind: RefundKind::FullRefund,
            reason: "Full refund".to_string(),
        },
        RefundPolicy::PartialRefund => {
            let percentage = event.refund_percentage();
            RefundDecision {
                amount_cents: partial_amount(amount_paid, percentage),
                kind: RefundKind::PartialRefund,
                reason: format!("Partial refund of {}%", percentage),
            }
        }
        RefundPolicy::Credit => RefundDecision {
            amount_cents: amount_paid,
            kind: RefundKind::Credit,
            reason: "Refunded as gym credit".to_string(),
        },
    }
}

/// floor(amount * pct / 100), computed in i128 so large amounts cannot overflow
fn partial_amount(amount: i64, percentage: i32) -> i64 {
    let scaled = i128::from(amount) * i128::from(percentage.clamp(0, 100)) / 100;
    scaled as i64
}
