//! Orders and the unified order status workflow

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lookup::{lookup_table, Lookup, PaymentStatus};
use crate::error::{DomainError, DomainResult};
use crate::validation::validate_name;

/// Coarse grouping of unified statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStage {
    PreProduction,
    Production,
    Fulfillment,
    Final,
}

impl OrderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStage::PreProduction => "pre_production",
            OrderStage::Production => "production",
            OrderStage::Fulfillment => "fulfillment",
            OrderStage::Final => "final",
        }
    }
}

lookup_table! {
    /// Single status covering an order from draft to delivery
    pub enum UnifiedOrderStatus ("unified order status") {
        Draft => ("draft", "Draft", "gray", 1),
        Pending => ("pending", "Pending", "gray", 2),
        Confirmed => ("confirmed", "Confirmed", "info", 3),
        Growing => ("growing", "Growing", "success", 4),
        ReadyToHarvest => ("ready_to_harvest", "Ready to Harvest", "warning", 5),
        Harvesting => ("harvesting", "Harvesting", "warning", 6),
        Packing => ("packing", "Packing", "info", 7),
        ReadyForDelivery => ("ready_for_delivery", "Ready for Delivery", "primary", 8),
        OutForDelivery => ("out_for_delivery", "Out for Delivery", "primary", 9),
        Delivered => ("delivered", "Delivered", "success", 10),
        Cancelled => ("cancelled", "Cancelled", "danger", 11),
    }
}

impl UnifiedOrderStatus {
    pub fn stage(&self) -> OrderStage {
        use UnifiedOrderStatus::*;
        match self {
            Draft | Pending | Confirmed => OrderStage::PreProduction,
            Growing | ReadyToHarvest | Harvesting => OrderStage::Production,
            Packing | ReadyForDelivery | OutForDelivery => OrderStage::Fulfillment,
            Delivered | Cancelled => OrderStage::Final,
        }
    }

    pub fn is_final(&self) -> bool {
        self.stage() == OrderStage::Final
    }

    /// Items can still be edited before production starts
    pub fn allows_modifications(&self) -> bool {
        matches!(
            self,
            UnifiedOrderStatus::Draft | UnifiedOrderStatus::Pending | UnifiedOrderStatus::Confirmed
        )
    }

    /// Nothing leaves a final status. Cancelling is always allowed otherwise,
    /// as is moving forward. Moving back stays within the stage and only
    /// while the order is still editable.
    pub fn is_valid_transition(from: UnifiedOrderStatus, to: UnifiedOrderStatus) -> bool {
        if from.is_final() || from == to {
            return false;
        }
        if to == UnifiedOrderStatus::Cancelled {
            return true;
        }
        if to.sort_order() > from.sort_order() {
            return true;
        }
        from.stage() == to.stage() && from.allows_modifications()
    }

    /// Statuses reachable from `self`
    pub fn valid_targets(&self) -> Vec<UnifiedOrderStatus> {
        Self::all()
            .iter()
            .copied()
            .filter(|to| Self::is_valid_transition(*self, *to))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub delivery_date: Option<NaiveDate>,
    pub unified_status: UnifiedOrderStatus,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub customer_name: String,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl Order {
    pub fn open(input: NewOrder, now: DateTime<Utc>) -> DomainResult<Self> {
        validate_name("customer_name", &input.customer_name)?;
        Ok(Order {
            id: Uuid::new_v4(),
            customer_name: input.customer_name.trim().to_string(),
            delivery_date: input.delivery_date,
            unified_status: UnifiedOrderStatus::Draft,
            payment_status: PaymentStatus::Pending,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        })
    }

    /// Move to `to`, returning the previous status
    pub fn transition_to(&mut self, to: UnifiedOrderStatus, now: DateTime<Utc>) -> DomainResult<UnifiedOrderStatus> {
        let from = self.unified_status;
        if !UnifiedOrderStatus::is_valid_transition(from, to) {
            return Err(DomainError::InvalidStateTransition(format!(
                "order {} cannot move from {} to {}",
                self.id,
                from.code(),
                to.code()
            )));
        }
        self.unified_status = to;
        self.updated_at = now;
        Ok(from)
    }

    pub fn set_payment_status(&mut self, status: PaymentStatus, now: DateTime<Utc>) -> DomainResult<PaymentStatus> {
        let previous = self.payment_status;
        if previous == PaymentStatus::Refunded && status != PaymentStatus::Refunded {
            return Err(DomainError::InvalidStateTransition(format!(
                "order {} has been refunded",
                self.id
            )));
        }
        self.payment_status = status;
        self.updated_at = now;
        Ok(previous)
    }

    pub fn is_editable(&self) -> bool {
        self.unified_status.allows_modifications()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use UnifiedOrderStatus::*;

    #[test]
    fn test_final_statuses_are_terminal() {
        for to in UnifiedOrderStatus::all() {
            assert!(!UnifiedOrderStatus::is_valid_transition(Delivered, *to));
            assert!(!UnifiedOrderStatus::is_valid_transition(Cancelled, *to));
        }
    }

    #[test]
    fn test_cancel_from_any_open_status() {
        for from in UnifiedOrderStatus::all().iter().filter(|s| !s.is_final()) {
            assert!(UnifiedOrderStatus::is_valid_transition(*from, Cancelled));
        }
    }

    #[test]
    fn test_forward_allowed() {
        assert!(UnifiedOrderStatus::is_valid_transition(Draft, Growing));
        assert!(UnifiedOrderStatus::is_valid_transition(Packing, Delivered));
    }

    #[test]
    fn test_backward_rules() {
        // same stage, still editable
        assert!(UnifiedOrderStatus::is_valid_transition(Confirmed, Pending));
        // same stage, production has started
        assert!(!UnifiedOrderStatus::is_valid_transition(Harvesting, Growing));
        // crosses a stage boundary
        assert!(!UnifiedOrderStatus::is_valid_transition(Growing, Confirmed));
    }

    #[test]
    fn test_stage_grouping() {
        assert_eq!(ReadyToHarvest.stage(), OrderStage::Production);
        assert_eq!(OutForDelivery.stage(), OrderStage::Fulfillment);
        assert_eq!(OrderStage::PreProduction.as_str(), "pre_production");
        assert_eq!(UnifiedOrderStatus::from_code("ready_for_delivery"), Some(ReadyForDelivery));
    }

    #[test]
    fn test_order_transition_keeps_state_on_error() {
        let mut order = Order::open(
            NewOrder {
                customer_name: "Corner Bistro".to_string(),
                delivery_date: None,
                notes: None,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(order.transition_to(Confirmed, Utc::now()).unwrap(), Draft);
        order.transition_to(Cancelled, Utc::now()).unwrap();
        assert!(order.transition_to(Pending, Utc::now()).is_err());
        assert_eq!(order.unified_status, Cancelled);
    }

    #[test]
    fn test_refund_is_sticky() {
        let mut order = Order::open(
            NewOrder {
                customer_name: "Deli".to_string(),
                delivery_date: None,
                notes: None,
            },
            Utc::now(),
        )
        .unwrap();
        order.set_payment_status(PaymentStatus::Refunded, Utc::now()).unwrap();
        assert!(order.set_payment_status(PaymentStatus::Paid, Utc::now()).is_err());
    }
}
