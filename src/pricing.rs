//! Cart totals: subtotal, discount and total.
//!
//! Pure functions; no store access. The discount is reported as entered
//! (a percent above 100 or a fixed amount above the subtotal is kept), only
//! the total is clamped at zero.

use serde::{Deserialize, Serialize};

use crate::models::{Discount, DiscountType, OrderLine};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: f64,
    pub discount_amount: f64,
    pub total: f64,
}

pub fn line_total(unit_price: f64, quantity: i64) -> f64 {
    unit_price * quantity as f64
}

pub fn discount_amount(subtotal: f64, discount: Option<&Discount>) -> f64 {
    match discount {
        Some(Discount {
            kind: DiscountType::Percent,
            value,
        }) => subtotal * value / 100.0,
        Some(Discount {
            kind: DiscountType::Fixed,
            value,
        }) => *value,
        None => 0.0,
    }
}

pub fn calculate(lines: &[OrderLine], discount: Option<&Discount>) -> Totals {
    let subtotal: f64 = lines.iter().map(OrderLine::total_price).sum();
    let discount_amount = discount_amount(subtotal, discount);
    Totals {
        subtotal,
        discount_amount,
        total: (subtotal - discount_amount).max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(unit_price: f64, quantity: i64) -> OrderLine {
        OrderLine {
            menu_item_id: 1,
            variant_id: None,
            item_name: "Karahi".into(),
            unit_price,
            quantity,
        }
    }

    #[test]
    fn test_no_discount() {
        let totals = calculate(&[line(350.0, 2)], None);
        assert_eq!(totals.subtotal, 700.0);
        assert_eq!(totals.discount_amount, 0.0);
        assert_eq!(totals.total, 700.0);
    }

    #[test]
    fn test_empty_cart() {
        let totals = calculate(&[], None);
        assert_eq!(totals.subtotal, 0.0);
        assert_eq!(totals.total, 0.0);
    }

    #[test]
    fn test_percent_discount() {
        let discount = Discount {
            kind: DiscountType::Percent,
            value: 10.0,
        };
        let totals = calculate(&[line(250.0, 2), line(100.0, 1)], Some(&discount));
        assert_eq!(totals.subtotal, 600.0);
        assert!((totals.discount_amount - 60.0).abs() < 1e-9);
        assert!((totals.total - 540.0).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_discount() {
        let discount = Discount {
            kind: DiscountType::Fixed,
            value: 50.0,
        };
        let totals = calculate(&[line(350.0, 2)], Some(&discount));
        assert_eq!(totals.discount_amount, 50.0);
        assert_eq!(totals.total, 650.0);
    }

    #[test]
    fn test_discount_above_subtotal_is_not_clamped() {
        let discount = Discount {
            kind: DiscountType::Percent,
            value: 150.0,
        };
        let totals = calculate(&[line(100.0, 1)], Some(&discount));
        assert_eq!(totals.subtotal, 100.0);
        assert_eq!(totals.discount_amount, 150.0);
        assert_eq!(totals.total, 0.0);

        let fixed = Discount {
            kind: DiscountType::Fixed,
            value: 900.0,
        };
        let totals = calculate(&[line(100.0, 1)], Some(&fixed));
        assert_eq!(totals.discount_amount, 900.0);
        assert_eq!(totals.total, 0.0);
    }

    #[test]
    fn test_subtotal_matches_line_totals_and_is_stable() {
        let lines = vec![line(120.5, 3), line(80.0, 1), line(15.25, 4)];
        let discount = Discount {
            kind: DiscountType::Fixed,
            value: 20.0,
        };
        let first = calculate(&lines, Some(&discount));
        let second = calculate(&lines, Some(&discount));
        assert_eq!(first, second);

        let sum: f64 = lines.iter().map(OrderLine::total_price).sum();
        assert_eq!(first.subtotal, sum);
        assert_eq!(first.total, (first.subtotal - first.discount_amount).max(0.0));
    }
}
