//! Typed rows and request/response payloads.
//!
//! Enums carry their stored string form (`as_str`) so SQL parameters and
//! CHECK constraints stay in one place.

use serde::{Deserialize, Serialize};

use crate::error::{PosError, PosResult};

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    DineIn,
    Takeaway,
    Delivery,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::DineIn => "dine_in",
            OrderType::Takeaway => "takeaway",
            OrderType::Delivery => "delivery",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "takeaway" => OrderType::Takeaway,
            "delivery" => OrderType::Delivery,
            _ => OrderType::DineIn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percent,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percent => "percent",
            DiscountType::Fixed => "fixed",
        }
    }
}

/// Discount descriptor entered at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub kind: DiscountType,
    pub value: f64,
}

/// Payment method as chosen by the cashier.
///
/// Mobile-wallet and bank options are stored as `card`; `partial` is
/// stored as `mixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Credit,
    Partial,
    #[serde(rename = "jazzcash")]
    JazzCash,
    Easypaisa,
    OtherBank,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Credit => "credit",
            PaymentMethod::Partial => "partial",
            PaymentMethod::JazzCash => "jazzcash",
            PaymentMethod::Easypaisa => "easypaisa",
            PaymentMethod::OtherBank => "other_bank",
        }
    }

    /// Value written to `orders.payment_method`.
    pub fn stored(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Credit => "credit",
            PaymentMethod::Partial => "mixed",
            PaymentMethod::Card
            | PaymentMethod::JazzCash
            | PaymentMethod::Easypaisa
            | PaymentMethod::OtherBank => "card",
        }
    }

    /// Inverse of [`PaymentMethod::stored`]; wallet aliases come back as `Card`.
    pub fn from_stored(s: &str) -> Self {
        match s {
            "credit" => PaymentMethod::Credit,
            "mixed" => PaymentMethod::Partial,
            "card" => PaymentMethod::Card,
            _ => PaymentMethod::Cash,
        }
    }

    pub fn parse(s: &str) -> PosResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "credit" => Ok(PaymentMethod::Credit),
            "partial" | "mixed" => Ok(PaymentMethod::Partial),
            "jazzcash" => Ok(PaymentMethod::JazzCash),
            "easypaisa" => Ok(PaymentMethod::Easypaisa),
            "other_bank" => Ok(PaymentMethod::OtherBank),
            other => Err(PosError::validation(format!(
                "Unknown payment method: {other}"
            ))),
        }
    }

    /// Methods that leave some or all of the total on the customer's balance.
    pub fn defers_payment(&self) -> bool {
        matches!(self, PaymentMethod::Credit | PaymentMethod::Partial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Partial,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Partial => "partial",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "paid" => PaymentStatus::Paid,
            "partial" => PaymentStatus::Partial,
            _ => PaymentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
    Wastage,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjustment => "adjustment",
            MovementType::Wastage => "wastage",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "in" => MovementType::In,
            "adjustment" => MovementType::Adjustment,
            "wastage" => MovementType::Wastage,
            _ => MovementType::Out,
        }
    }

    /// Whether this movement removes quantity from the item.
    pub fn is_outgoing(&self) -> bool {
        matches!(self, MovementType::Out | MovementType::Wastage)
    }
}

// ---------------------------------------------------------------------------
// Cart / order input
// ---------------------------------------------------------------------------

/// One cart row. Name and price are snapshotted into `order_items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub menu_item_id: i64,
    pub variant_id: Option<i64>,
    pub item_name: String,
    pub unit_price: f64,
    pub quantity: i64,
}

impl OrderLine {
    pub fn total_price(&self) -> f64 {
        crate::pricing::line_total(self.unit_price, self.quantity)
    }
}

/// Customer named at checkout. An `id` selects an existing ledger account;
/// otherwise the account is matched by phone or created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerRef {
    pub id: Option<i64>,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub lines: Vec<OrderLine>,
    pub order_type: OrderType,
    pub table_number: Option<String>,
    pub customer: CustomerRef,
    pub discount: Option<Discount>,
    pub payment_method: PaymentMethod,
    /// Amount paid now; only read for `Partial`.
    pub amount_paid: Option<f64>,
    pub notes: Option<String>,
}

/// Full rewrite of an existing order's items, customer and payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEdit {
    pub lines: Vec<OrderLine>,
    pub order_type: OrderType,
    pub table_number: Option<String>,
    pub customer_id: Option<i64>,
    pub discount: Option<Discount>,
    pub payment_method: PaymentMethod,
    pub amount_paid: Option<f64>,
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Stored rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub order_type: OrderType,
    pub table_number: Option<String>,
    pub customer_id: Option<i64>,
    pub subtotal: f64,
    pub discount_amount: f64,
    pub discount_type: Option<String>,
    pub tax_amount: f64,
    pub total: f64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub paid_amount: f64,
    pub created_by: Option<i64>,
    pub created_by_name: Option<String>,
    pub created_at: String,
    pub notes: Option<String>,
}

impl Order {
    /// Portion of this order carried on the customer's balance.
    pub fn credit_contribution(&self) -> f64 {
        match self.payment_method {
            PaymentMethod::Credit => self.total,
            PaymentMethod::Partial => self.total - self.paid_amount,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub menu_item_id: i64,
    pub variant_id: Option<i64>,
    pub item_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockItem {
    pub id: i64,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub name: String,
    pub unit: String,
    pub current_quantity: f64,
    pub min_quantity: f64,
    pub cost_per_unit: f64,
    pub supplier: Option<String>,
}

impl StockItem {
    pub fn is_low(&self) -> bool {
        self.min_quantity > 0.0 && self.current_quantity <= self.min_quantity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStockItem {
    pub category_id: Option<i64>,
    pub name: String,
    pub unit: String,
    pub current_quantity: f64,
    pub min_quantity: f64,
    pub cost_per_unit: f64,
    pub supplier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: i64,
    pub stock_item_id: i64,
    pub movement_type: MovementType,
    pub quantity: f64,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMovement {
    pub stock_item_id: i64,
    pub movement_type: MovementType,
    /// Always positive; the sign is derived from `movement_type`.
    pub quantity: f64,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditCustomer {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub credit_limit: f64,
    pub current_balance: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerInput {
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub credit_limit: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditPayment {
    pub id: i64,
    pub customer_id: i64,
    pub amount: f64,
    pub payment_method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_storage_mapping() {
        assert_eq!(PaymentMethod::Partial.stored(), "mixed");
        assert_eq!(PaymentMethod::JazzCash.stored(), "card");
        assert_eq!(PaymentMethod::Easypaisa.stored(), "card");
        assert_eq!(PaymentMethod::OtherBank.stored(), "card");
        assert_eq!(PaymentMethod::from_stored("mixed"), PaymentMethod::Partial);
        assert_eq!(PaymentMethod::parse(" JazzCash ").unwrap(), PaymentMethod::JazzCash);
        assert!(PaymentMethod::parse("bitcoin").is_err());
    }

    #[test]
    fn test_payment_method_deserializes_aliases() {
        let m: PaymentMethod = serde_json::from_str("\"other_bank\"").unwrap();
        assert_eq!(m, PaymentMethod::OtherBank);
        let m: PaymentMethod = serde_json::from_str("\"jazzcash\"").unwrap();
        assert_eq!(m, PaymentMethod::JazzCash);
    }

    #[test]
    fn test_credit_contribution() {
        let mut order = Order {
            id: 1,
            order_number: "ORD-1".into(),
            order_type: OrderType::DineIn,
            table_number: None,
            customer_id: Some(1),
            subtotal: 700.0,
            discount_amount: 0.0,
            discount_type: None,
            tax_amount: 0.0,
            total: 700.0,
            payment_method: PaymentMethod::Partial,
            payment_status: PaymentStatus::Partial,
            paid_amount: 300.0,
            created_by: None,
            created_by_name: None,
            created_at: String::new(),
            notes: None,
        };
        assert_eq!(order.credit_contribution(), 400.0);
        order.payment_method = PaymentMethod::Credit;
        assert_eq!(order.credit_contribution(), 700.0);
        order.payment_method = PaymentMethod::Card;
        assert_eq!(order.credit_contribution(), 0.0);
    }

    #[test]
    fn test_low_stock_flag() {
        let item = StockItem {
            id: 1,
            category_id: None,
            category_name: None,
            name: "Rice".into(),
            unit: "kg".into(),
            current_quantity: 2.0,
            min_quantity: 2.0,
            cost_per_unit: 0.0,
            supplier: None,
        };
        assert!(item.is_low());
        let untracked = StockItem {
            min_quantity: 0.0,
            ..item
        };
        assert!(!untracked.is_low());
    }
}
