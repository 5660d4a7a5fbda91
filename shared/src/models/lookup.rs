//! Reference tables
//!
//! Every lookup is a small fixed table of `code / name / color / sort_order`
//! rows. Codes are what gets stored in the database and sent over the wire.

/// Behaviour shared by every reference table
pub trait Lookup: Sized + Copy + PartialEq + 'static {
    /// Every row of the table, in sort order
    const ALL: &'static [Self];

    /// Human readable table name used in error messages
    const KIND: &'static str;

    fn code(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn color(&self) -> &'static str;
    fn sort_order(&self) -> i32;

    fn all() -> &'static [Self] {
        Self::ALL
    }

    fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|row| row.code() == code)
    }

    /// Like [`Lookup::from_code`] but with an error naming the table
    fn parse_code(code: &str) -> crate::DomainResult<Self> {
        Self::from_code(code).ok_or_else(|| crate::DomainError::UnknownCode {
            kind: Self::KIND,
            code: code.to_string(),
        })
    }
}

/// Declares a lookup enum together with its table rows.
macro_rules! lookup_table {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($kind:literal) {
            $( $variant:ident => ($code:literal, $label:literal, $color:literal, $order:literal) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $code)]
                $variant,
            )+
        }

        impl $crate::models::lookup::Lookup for $name {
            const ALL: &'static [Self] = &[$($name::$variant),+];
            const KIND: &'static str = $kind;

            fn code(&self) -> &'static str {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            fn color(&self) -> &'static str {
                match self {
                    $($name::$variant => $color,)+
                }
            }

            fn sort_order(&self) -> i32 {
                match self {
                    $($name::$variant => $order,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::models::lookup::Lookup::name(self))
            }
        }
    };
}

pub(crate) use lookup_table;

lookup_table! {
    /// Legacy order status
    pub enum OrderStatus ("order status") {
        Pending => ("pending", "Pending", "gray", 1),
        Confirmed => ("confirmed", "Confirmed", "info", 2),
        Processing => ("processing", "Processing", "warning", 3),
        Completed => ("completed", "Completed", "success", 4),
        Cancelled => ("cancelled", "Cancelled", "danger", 5),
    }
}

impl OrderStatus {
    pub fn is_pending(&self) -> bool {
        *self == OrderStatus::Pending
    }

    pub fn is_cancelled(&self) -> bool {
        *self == OrderStatus::Cancelled
    }

    pub fn is_final(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

lookup_table! {
    /// Payment state of an order
    pub enum PaymentStatus ("payment status") {
        Pending => ("pending", "Pending", "gray", 1),
        Partial => ("partial", "Partially Paid", "warning", 2),
        Paid => ("paid", "Paid", "success", 3),
        Refunded => ("refunded", "Refunded", "info", 4),
        Failed => ("failed", "Failed", "danger", 5),
    }
}

impl PaymentStatus {
    pub fn is_pending(&self) -> bool {
        *self == PaymentStatus::Pending
    }

    pub fn is_paid(&self) -> bool {
        *self == PaymentStatus::Paid
    }

    pub fn is_final(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Refunded)
    }

    /// Partial and failed payments need someone to follow up
    pub fn requires_attention(&self) -> bool {
        matches!(self, PaymentStatus::Partial | PaymentStatus::Failed)
    }
}

lookup_table! {
    /// Kind of consumable stock item
    pub enum ConsumableType ("consumable type") {
        Seed => ("seed", "Seed", "success", 1),
        Soil => ("soil", "Soil", "warning", 2),
        Packaging => ("packaging", "Packaging", "info", 3),
        Label => ("label", "Label", "gray", 4),
        Other => ("other", "Other", "gray", 5),
    }
}

impl ConsumableType {
    pub fn is_seed(&self) -> bool {
        *self == ConsumableType::Seed
    }

    /// Seeds and soil are received in traceable lots
    pub fn requires_lot_tracking(&self) -> bool {
        matches!(self, ConsumableType::Seed | ConsumableType::Soil)
    }
}

lookup_table! {
    /// Lifecycle of a hold against a product batch
    pub enum InventoryReservationStatus ("reservation status") {
        Pending => ("pending", "Pending", "warning", 1),
        Confirmed => ("confirmed", "Confirmed", "info", 2),
        Fulfilled => ("fulfilled", "Fulfilled", "success", 3),
        Cancelled => ("cancelled", "Cancelled", "danger", 4),
    }
}

impl InventoryReservationStatus {
    /// Only active reservations count against `reserved_quantity`
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            InventoryReservationStatus::Pending | InventoryReservationStatus::Confirmed
        )
    }

    pub fn is_final(&self) -> bool {
        !self.is_active()
    }
}

lookup_table! {
    /// Stock level of a product across its active batches
    pub enum StockStatus ("stock status") {
        InStock => ("in_stock", "In Stock", "success", 1),
        LowStock => ("low_stock", "Low Stock", "warning", 2),
        OutOfStock => ("out_of_stock", "Out of Stock", "danger", 3),
    }
}

lookup_table! {
    /// Status of a product batch
    pub enum BatchStatus ("batch status") {
        Active => ("active", "Active", "success", 1),
        Depleted => ("depleted", "Depleted", "gray", 2),
        Expired => ("expired", "Expired", "warning", 3),
        Damaged => ("damaged", "Damaged", "danger", 4),
        Deleted => ("deleted", "Deleted", "gray", 5),
    }
}

lookup_table! {
    /// Growth phase of a tray
    pub enum CropStage ("crop stage") {
        Soaking => ("soaking", "Soaking", "info", 1),
        Germination => ("germination", "Germination", "warning", 2),
        Blackout => ("blackout", "Blackout", "gray", 3),
        Light => ("light", "Light", "success", 4),
        Harvested => ("harvested", "Harvested", "primary", 5),
    }
}

impl CropStage {
    pub fn is_final_stage(&self) -> bool {
        *self == CropStage::Harvested
    }

    /// Column holding the time the crop entered this stage
    pub fn timestamp_field(&self) -> &'static str {
        match self {
            CropStage::Soaking => "soaking_at",
            CropStage::Germination => "germination_at",
            CropStage::Blackout => "blackout_at",
            CropStage::Light => "light_at",
            CropStage::Harvested => "harvested_at",
        }
    }

    pub fn is_before(&self, other: CropStage) -> bool {
        self.sort_order() < other.sort_order()
    }
}

lookup_table! {
    /// Planning record status
    pub enum CropPlanStatus ("crop plan status") {
        Draft => ("draft", "Draft", "gray", 1),
        Approved => ("approved", "Approved", "info", 2),
        Generating => ("generating", "Generating", "warning", 3),
        Completed => ("completed", "Completed", "success", 4),
        Cancelled => ("cancelled", "Cancelled", "danger", 5),
    }
}

impl CropPlanStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, CropPlanStatus::Completed | CropPlanStatus::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code_round_trips_every_row() {
        for stage in CropStage::all() {
            assert_eq!(CropStage::from_code(stage.code()), Some(*stage));
        }
        for status in PaymentStatus::all() {
            assert_eq!(PaymentStatus::from_code(status.code()), Some(*status));
        }
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(OrderStatus::from_code("shipped"), None);
        let err = CropStage::parse_code("sprouting").unwrap_err();
        assert_eq!(err.to_string(), "Unknown crop stage code: sprouting");
    }

    #[test]
    fn test_tables_are_sorted() {
        let orders: Vec<i32> = CropStage::all().iter().map(|s| s.sort_order()).collect();
        let mut sorted = orders.clone();
        sorted.sort();
        assert_eq!(orders, sorted);
    }

    #[test]
    fn test_reservation_status_predicates() {
        assert!(InventoryReservationStatus::Pending.is_active());
        assert!(InventoryReservationStatus::Confirmed.is_active());
        assert!(InventoryReservationStatus::Fulfilled.is_final());
        assert!(InventoryReservationStatus::Cancelled.is_final());
    }

    #[test]
    fn test_payment_status_predicates() {
        assert!(PaymentStatus::Paid.is_paid());
        assert!(PaymentStatus::Failed.requires_attention());
        assert!(!PaymentStatus::Pending.is_final());
    }

    #[test]
    fn test_serde_uses_codes() {
        let json = serde_json::to_string(&StockStatus::LowStock).unwrap();
        assert_eq!(json, "\"low_stock\"");
        let stage: CropStage = serde_json::from_str("\"blackout\"").unwrap();
        assert_eq!(stage, CropStage::Blackout);
    }

    #[test]
    fn test_only_harvested_is_final() {
        let finals: Vec<_> = CropStage::all()
            .iter()
            .filter(|s| s.is_final_stage())
            .collect();
        assert_eq!(finals, vec![&CropStage::Harvested]);
    }
}
