//! Payment and fulfilment status rules for orders.
//!
//! The two fields move independently but payment drives fulfilment:
//! a verified payment confirms the order and a failed one cancels it.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumString};

use crate::errors::ServiceError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    /// Manually reconciled UPI transfer
    Verified,
    /// Captured by the payment gateway
    Paid,
    Failed,
}

impl PaymentStatus {
    /// Money has been received
    pub fn is_settled(self) -> bool {
        matches!(self, PaymentStatus::Verified | PaymentStatus::Paid)
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (
                PaymentStatus::Pending,
                PaymentStatus::Verified | PaymentStatus::Paid | PaymentStatus::Failed
            )
        )
    }

    /// Order status implied by reaching this payment status
    pub fn implied_order_status(self) -> Option<OrderStatus> {
        match self {
            PaymentStatus::Verified | PaymentStatus::Paid => Some(OrderStatus::Confirmed),
            PaymentStatus::Failed => Some(OrderStatus::Cancelled),
            PaymentStatus::Pending => None,
        }
    }
}

/// True for stored payment status strings that represent received money.
pub fn is_settled_payment(raw: &str) -> bool {
    PaymentStatus::from_str(raw)
        .map(PaymentStatus::is_settled)
        .unwrap_or(false)
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed | Processing | Cancelled)
                | (Confirmed, Processing | Shipped | Cancelled)
                | (Processing, Shipped)
                | (Shipped, Delivered | Completed)
                | (Delivered, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

pub fn parse_order_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(raw.trim())
        .map_err(|_| ServiceError::ValidationError(format!("Unknown order status: {}", raw)))
}

pub fn parse_payment_status(raw: &str) -> Result<PaymentStatus, ServiceError> {
    PaymentStatus::from_str(raw.trim())
        .map_err(|_| ServiceError::ValidationError(format!("Unknown payment status: {}", raw)))
}

/// Rejects a fulfilment transition that the state machine does not allow.
pub fn ensure_order_transition(from: &str, to: OrderStatus) -> Result<(), ServiceError> {
    let current = parse_order_status(from)?;
    if current.can_transition_to(to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidStatus(format!(
            "Cannot transition from status '{}' to '{}'",
            current, to
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PaymentStatus::Pending, PaymentStatus::Verified, true)]
    #[case(PaymentStatus::Pending, PaymentStatus::Paid, true)]
    #[case(PaymentStatus::Pending, PaymentStatus::Failed, true)]
    #[case(PaymentStatus::Verified, PaymentStatus::Failed, false)]
    #[case(PaymentStatus::Failed, PaymentStatus::Verified, false)]
    #[case(PaymentStatus::Verified, PaymentStatus::Pending, false)]
    fn payment_transitions_are_one_directional(
        #[case] from: PaymentStatus,
        #[case] to: PaymentStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Confirmed, true)]
    #[case(OrderStatus::Pending, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Confirmed, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Confirmed, OrderStatus::Shipped, true)]
    #[case(OrderStatus::Shipped, OrderStatus::Delivered, true)]
    #[case(OrderStatus::Shipped, OrderStatus::Completed, true)]
    #[case(OrderStatus::Shipped, OrderStatus::Cancelled, false)]
    #[case(OrderStatus::Cancelled, OrderStatus::Confirmed, false)]
    #[case(OrderStatus::Delivered, OrderStatus::Shipped, false)]
    fn order_transitions(
        #[case] from: OrderStatus,
        #[case] to: OrderStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn payment_drives_order_status() {
        assert_eq!(
            PaymentStatus::Verified.implied_order_status(),
            Some(OrderStatus::Confirmed)
        );
        assert_eq!(
            PaymentStatus::Failed.implied_order_status(),
            Some(OrderStatus::Cancelled)
        );
        assert_eq!(PaymentStatus::Pending.implied_order_status(), None);
    }

    #[test]
    fn status_strings_round_trip_in_snake_case() {
        assert_eq!(PaymentStatus::Verified.as_ref(), "verified");
        assert_eq!(OrderStatus::Cancelled.to_string(), "cancelled");
        assert_eq!(parse_order_status("shipped").unwrap(), OrderStatus::Shipped);
        assert!(parse_order_status("lost").is_err());
        assert!(is_settled_payment("paid"));
        assert!(!is_settled_payment("pending"));
        assert!(!is_settled_payment("garbage"));
    }

    #[test]
    fn rejected_transition_reports_both_states() {
        let err = ensure_order_transition("cancelled", OrderStatus::Shipped).unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(err.to_string().contains("shipped"));
    }
}
