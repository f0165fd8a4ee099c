//! Receipt payload and printable HTML.
//!
//! A [`Receipt`] is produced by order completion and by reprints. It is a
//! snapshot: line names and prices come from `order_items`, not the menu.

use serde::{Deserialize, Serialize};

use crate::config::RestaurantSettings;
use crate::models::{OrderItem, OrderType, PaymentMethod};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLine {
    pub item_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
}

impl From<&OrderItem> for ReceiptLine {
    fn from(item: &OrderItem) -> Self {
        Self {
            item_name: item.item_name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub order_id: i64,
    pub order_number: String,
    pub date: String,
    pub order_type: OrderType,
    pub table_number: Option<String>,
    pub customer_name: Option<String>,
    pub items: Vec<ReceiptLine>,
    pub subtotal: f64,
    pub discount_amount: f64,
    pub total: f64,
    pub payment_method: PaymentMethod,
    pub paid_amount: f64,
    /// Unpaid part of the order, when there is one.
    pub pending_amount: Option<f64>,
    /// Only set when the customer has a limit.
    pub credit_limit: Option<f64>,
    pub balance_after_order: Option<f64>,
    pub credit_limit_exceeded: bool,
    pub notes: Option<String>,
    /// Stock items that fell to or below their minimum with this order.
    #[serde(default)]
    pub low_stock: Vec<String>,
}

pub fn payment_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Cash => "Cash",
        PaymentMethod::Card => "Card",
        PaymentMethod::Credit => "Credit",
        PaymentMethod::Partial => "Partial",
        PaymentMethod::JazzCash => "JazzCash",
        PaymentMethod::Easypaisa => "Easypaisa",
        PaymentMethod::OtherBank => "Other Bank",
    }
}

fn order_type_label(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::DineIn => "Dine-in",
        OrderType::Takeaway => "Takeaway",
        OrderType::Delivery => "Delivery",
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn row(label: &str, value: &str) -> String {
    format!(
        "<div style=\"display:flex;justify-content:space-between;\"><span>{label}</span><span>{value}</span></div>\n"
    )
}

/// Render a receipt as a self-contained HTML document for an 80mm printer.
pub fn render_html(receipt: &Receipt, settings: &RestaurantSettings) -> String {
    let cur = escape(&settings.currency);
    let money = |amount: f64| format!("{cur} {amount:.2}");

    let mut header_html = format!(
        "<div style=\"font-size:16px;font-weight:bold;\">{}</div>\n",
        escape(&settings.restaurant_name)
    );
    for extra in [
        &settings.restaurant_address,
        &settings.restaurant_phone,
        &settings.receipt_header,
    ] {
        if !extra.trim().is_empty() {
            header_html.push_str(&format!("<div>{}</div>\n", escape(extra)));
        }
    }

    let mut meta_html = format!(
        "<div><strong>Order # {}</strong></div>\n<div>{} &middot; {}",
        escape(&receipt.order_number),
        escape(&receipt.date),
        order_type_label(receipt.order_type),
    );
    if let Some(table) = receipt.table_number.as_deref().filter(|t| !t.is_empty()) {
        meta_html.push_str(&format!(" &middot; Table {}", escape(table)));
    }
    meta_html.push_str("</div>\n");
    if let Some(name) = receipt.customer_name.as_deref() {
        meta_html.push_str(&format!("<div>Customer: {}</div>\n", escape(name)));
    }

    let mut items_html = String::new();
    for line in &receipt.items {
        items_html.push_str(&row(
            &format!("{}x {}", line.quantity, escape(&line.item_name)),
            &money(line.total_price),
        ));
    }
    if items_html.is_empty() {
        items_html = "<div style=\"text-align:center;color:#888;\">No items</div>".to_string();
    }

    let mut totals_html = row("Subtotal", &money(receipt.subtotal));
    if receipt.discount_amount > 0.0 {
        totals_html.push_str(&row(
            "Discount",
            &format!("- {}", money(receipt.discount_amount)),
        ));
    }
    totals_html.push_str(&row(
        "<strong>TOTAL</strong>",
        &format!("<strong>{}</strong>", money(receipt.total)),
    ));
    totals_html.push_str(&format!(
        "<div>Payment: {}</div>\n",
        payment_label(receipt.payment_method)
    ));
    if let Some(pending) = receipt.pending_amount.filter(|p| *p > 0.0) {
        totals_html.push_str(&format!(
            "<div style=\"font-weight:bold;\">Pending amount: {}</div>\n",
            money(pending)
        ));
    }

    let mut credit_html = String::new();
    if let Some(limit) = receipt.credit_limit.filter(|l| *l > 0.0) {
        credit_html.push_str(&format!("<div>Credit limit: {}</div>\n", money(limit)));
        if let Some(balance) = receipt.balance_after_order {
            credit_html.push_str(&format!(
                "<div>Balance after this order: {}</div>\n",
                money(balance)
            ));
        }
        if receipt.credit_limit_exceeded {
            credit_html.push_str("<div style=\"font-weight:bold;\">Credit limit exceeded</div>\n");
        }
        credit_html = format!("<div class=\"sep\"></div>\n{credit_html}");
    }

    let notes_html = receipt
        .notes
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .map(|n| format!("<div>Note: {}</div>\n", escape(n)))
        .unwrap_or_default();

    let footer_html = if settings.receipt_footer.trim().is_empty() {
        String::new()
    } else {
        format!(
            "<div class=\"sep\"></div>\n<div style=\"text-align:center;\">{}</div>\n",
            escape(&settings.receipt_footer)
        )
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
body {{ font-family: 'Courier New', monospace; font-size: 12px; width: 80mm; margin: 0 auto; padding: 8px; }}
.sep {{ border-top: 1px dashed #000; margin: 6px 0; }}
</style>
</head>
<body>
<div style="text-align:center;">
{header_html}</div>
<div class="sep"></div>
{meta_html}<div class="sep"></div>
{items_html}<div class="sep"></div>
{totals_html}{credit_html}{notes_html}{footer_html}</body>
</html>
"#
    )
}
