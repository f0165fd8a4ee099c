//! Order completion, editing and reprint.
//!
//! `complete_order` is the checkout path: validate, price, gate on live
//! stock, resolve the customer, write header + items, decrement stock,
//! charge the unpaid part to the customer's balance and hand back a
//! [`Receipt`]. Everything after validation runs in one transaction.

use chrono::{Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RestaurantSettings;
use crate::credit::{self, ChargeOutcome};
use crate::db::{self, DbState};
use crate::error::{PosError, PosResult};
use crate::models::{
    Discount, NewOrder, Order, OrderEdit, OrderItem, OrderLine, OrderType, OrderWithItems,
    PaymentMethod, PaymentStatus,
};
use crate::pricing::{self, Totals};
use crate::receipt::{Receipt, ReceiptLine};
use crate::staff::{Actor, Section};
use crate::stock;

/// Attempts at a fresh order number before giving up on UNIQUE collisions.
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// How an order's total splits between paid now and carried on credit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub paid_amount: f64,
    pub payment_status: PaymentStatus,
    pub credit_delta: f64,
}

/// Derive paid amount, status and credit delta from the payment method.
///
/// `paid_input` is only read for `Partial`, where it must satisfy
/// `0 < paid <= total`.
pub fn settle(method: PaymentMethod, total: f64, paid_input: Option<f64>) -> PosResult<Settlement> {
    match method {
        PaymentMethod::Credit => Ok(Settlement {
            paid_amount: 0.0,
            payment_status: PaymentStatus::Pending,
            credit_delta: total,
        }),
        PaymentMethod::Partial => {
            let paid = paid_input.unwrap_or(0.0);
            if !paid.is_finite() || paid <= 0.0 || paid > total {
                return Err(PosError::InvalidAmount(
                    "Enter amount paid now (greater than 0 and up to total).".into(),
                ));
            }
            Ok(Settlement {
                paid_amount: paid,
                payment_status: if paid >= total {
                    PaymentStatus::Paid
                } else {
                    PaymentStatus::Partial
                },
                credit_delta: total - paid,
            })
        }
        _ => Ok(Settlement {
            paid_amount: total,
            payment_status: PaymentStatus::Paid,
            credit_delta: 0.0,
        }),
    }
}

/// `ORD-YYMMDD-HHMMSS-RR` in local time with a random two-digit suffix.
pub fn generate_order_number() -> String {
    let suffix = Uuid::new_v4().as_u128() % 100;
    format!("ORD-{}-{suffix:02}", Local::now().format("%y%m%d-%H%M%S"))
}

fn validate_lines(lines: &[OrderLine], empty_message: &str) -> PosResult<()> {
    if lines.is_empty() {
        return Err(PosError::validation(empty_message));
    }
    for line in lines {
        if line.quantity <= 0 {
            return Err(PosError::validation(format!(
                "{}: quantity must be at least 1",
                line.item_name
            )));
        }
        if !line.unit_price.is_finite() || line.unit_price < 0.0 {
            return Err(PosError::InvalidAmount(format!(
                "{}: price cannot be negative",
                line.item_name
            )));
        }
    }
    Ok(())
}

fn validate_discount(discount: Option<&Discount>) -> PosResult<()> {
    match discount {
        Some(d) if !d.value.is_finite() || d.value < 0.0 => Err(PosError::InvalidAmount(
            "discount cannot be negative".into(),
        )),
        _ => Ok(()),
    }
}

/// Stored `discount_type`: only set when a non-zero discount was entered.
fn discount_kind(discount: Option<&Discount>) -> Option<&'static str> {
    discount
        .filter(|d| d.value != 0.0)
        .map(|d| d.kind.as_str())
}

fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

struct OrderHeader<'a> {
    order_type: OrderType,
    table_number: Option<&'a str>,
    customer_id: Option<i64>,
    totals: Totals,
    discount_type: Option<&'static str>,
    method: PaymentMethod,
    settlement: Settlement,
    created_by: i64,
    notes: Option<&'a str>,
}

/// Insert the order header, drawing a new number on each UNIQUE collision.
fn insert_header<F>(conn: &Connection, header: &OrderHeader, mut next_number: F) -> PosResult<(i64, String)>
where
    F: FnMut() -> String,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let number = next_number();
        let result = conn.execute(
            "INSERT INTO orders (order_number, order_type, table_number, customer_id, subtotal,
                                 discount_amount, discount_type, tax_amount, total, payment_method,
                                 payment_status, paid_amount, created_by, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                number,
                header.order_type.as_str(),
                header.table_number,
                header.customer_id,
                header.totals.subtotal,
                header.totals.discount_amount,
                header.discount_type,
                header.totals.total,
                header.method.stored(),
                header.settlement.payment_status.as_str(),
                header.settlement.paid_amount,
                header.created_by,
                header.notes,
            ],
        );

        match result {
            Ok(_) => return Ok((conn.last_insert_rowid(), number)),
            Err(e) => {
                let err = PosError::from(e);
                if err.is_unique_violation() && attempt < ORDER_NUMBER_ATTEMPTS {
                    warn!(order_number = %number, attempt, "order number collision, retrying");
                    continue;
                }
                return Err(err);
            }
        }
    }
}

fn insert_items(conn: &Connection, order_id: i64, lines: &[OrderLine]) -> PosResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO order_items (order_id, menu_item_id, variant_id, item_name, quantity, unit_price, total_price)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for line in lines {
        stmt.execute(params![
            order_id,
            line.menu_item_id,
            line.variant_id,
            line.item_name,
            line.quantity,
            line.unit_price,
            line.total_price(),
        ])?;
    }
    Ok(())
}

/// Complete a checkout and return its receipt.
///
/// A credit-limit breach does not block the order; it is reported on the
/// receipt. Use [`credit::preview_charge`] first to ask for confirmation.
pub fn complete_order(db: &DbState, actor: &Actor, order: &NewOrder) -> PosResult<Receipt> {
    actor.require(Section::Orders)?;

    validate_lines(&order.lines, "Cart is empty.")?;
    validate_discount(order.discount.as_ref())?;
    if order.customer.id.is_none()
        && (order.customer.name.trim().is_empty() || order.customer.phone.trim().is_empty())
    {
        return Err(PosError::validation("Customer name and phone are required."));
    }

    let totals = pricing::calculate(&order.lines, order.discount.as_ref());
    let settlement = settle(order.payment_method, totals.total, order.amount_paid)?;

    let conn = db.conn.lock()?;
    let receipt = db::with_transaction(&conn, |tx| {
        stock::check_sufficiency(tx, &order.lines)?;

        let customer_id = credit::resolve_customer(tx, &order.customer)?;

        let header = OrderHeader {
            order_type: order.order_type,
            table_number: clean(order.table_number.as_deref()),
            customer_id: Some(customer_id),
            totals,
            discount_type: discount_kind(order.discount.as_ref()),
            method: order.payment_method,
            settlement,
            created_by: actor.staff_id,
            notes: clean(order.notes.as_deref()),
        };
        let (order_id, order_number) = insert_header(tx, &header, generate_order_number)?;
        insert_items(tx, order_id, &order.lines)?;

        let decrements = stock::reserve_and_commit(tx, &order.lines, &order_number, actor)?;

        let charge = if settlement.credit_delta > 0.0 {
            Some(credit::apply_charge(tx, customer_id, settlement.credit_delta)?)
        } else {
            None
        };

        let customer = credit::fetch_customer(tx, customer_id)?;
        let created_at: String = tx.query_row(
            "SELECT created_at FROM orders WHERE id = ?1",
            params![order_id],
            |row| row.get(0),
        )?;

        Ok(Receipt {
            order_id,
            order_number,
            date: created_at,
            order_type: order.order_type,
            table_number: header.table_number.map(str::to_string),
            customer_name: Some(customer.name),
            items: order
                .lines
                .iter()
                .map(|line| ReceiptLine {
                    item_name: line.item_name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    total_price: line.total_price(),
                })
                .collect(),
            subtotal: totals.subtotal,
            discount_amount: totals.discount_amount,
            total: totals.total,
            payment_method: order.payment_method,
            paid_amount: settlement.paid_amount,
            pending_amount: (settlement.credit_delta > 0.0).then_some(settlement.credit_delta),
            credit_limit: charge
                .filter(|c| c.credit_limit > 0.0)
                .map(|c| c.credit_limit),
            balance_after_order: charge.map(|c| c.new_balance),
            credit_limit_exceeded: charge.is_some_and(|c| c.limit_exceeded),
            notes: header.notes.map(str::to_string),
            low_stock: decrements
                .into_iter()
                .filter(|d| d.low_stock)
                .map(|d| d.name)
                .collect(),
        })
    })?;

    info!(
        order_id = receipt.order_id,
        order_number = %receipt.order_number,
        total = receipt.total,
        method = receipt.payment_method.as_str(),
        created_by = actor.staff_id,
        "order completed"
    );
    Ok(receipt)
}

/// Result of an order edit, with the balance changes it made.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOutcome {
    pub order: OrderWithItems,
    /// Credit removed from the previous customer's balance.
    pub reversed_credit: f64,
    pub charge: Option<ChargeOutcome>,
}

/// Rewrite an order's items, customer and payment.
///
/// The old credit contribution is reversed and the new one applied as two
/// separate balance updates. Stock is not adjusted.
pub fn edit_order(
    db: &DbState,
    actor: &Actor,
    order_id: i64,
    edit: &OrderEdit,
) -> PosResult<EditOutcome> {
    actor.require(Section::Orders)?;

    validate_lines(&edit.lines, "Order must have at least one item.")?;
    validate_discount(edit.discount.as_ref())?;

    let totals = pricing::calculate(&edit.lines, edit.discount.as_ref());
    let settlement = settle(edit.payment_method, totals.total, edit.amount_paid)?;
    if edit.payment_method.defers_payment() && edit.customer_id.is_none() {
        return Err(PosError::validation(
            "Select a customer for credit or partial payment.",
        ));
    }

    let conn = db.conn.lock()?;
    let outcome = db::with_transaction(&conn, |tx| {
        let previous = fetch_order(tx, order_id)?;
        if let Some(customer_id) = edit.customer_id {
            credit::fetch_customer(tx, customer_id)?;
        }

        tx.execute(
            "UPDATE orders
             SET order_type = ?1, table_number = ?2, customer_id = ?3, subtotal = ?4,
                 discount_amount = ?5, discount_type = ?6, total = ?7, payment_method = ?8,
                 payment_status = ?9, paid_amount = ?10, notes = ?11, updated_at = datetime('now')
             WHERE id = ?12",
            params![
                edit.order_type.as_str(),
                clean(edit.table_number.as_deref()),
                edit.customer_id,
                totals.subtotal,
                totals.discount_amount,
                discount_kind(edit.discount.as_ref()),
                totals.total,
                edit.payment_method.stored(),
                settlement.payment_status.as_str(),
                settlement.paid_amount,
                clean(edit.notes.as_deref()),
                order_id,
            ],
        )?;

        tx.execute(
            "DELETE FROM order_items WHERE order_id = ?1",
            params![order_id],
        )?;
        insert_items(tx, order_id, &edit.lines)?;

        let old_credit = previous.credit_contribution();
        let mut reversed_credit = 0.0;
        if let Some(old_customer) = previous.customer_id {
            if old_credit > 0.0 {
                credit::reverse_charge(tx, old_customer, old_credit)?;
                reversed_credit = old_credit;
                debug!(order_id, customer_id = old_customer, amount = old_credit, "credit reversed");
            }
        }

        let charge = match edit.customer_id {
            Some(customer_id) if settlement.credit_delta > 0.0 => Some(credit::apply_charge(
                tx,
                customer_id,
                settlement.credit_delta,
            )?),
            _ => None,
        };

        Ok(EditOutcome {
            order: fetch_order_with_items(tx, order_id)?,
            reversed_credit,
            charge,
        })
    })?;

    info!(
        order_id,
        order_number = %outcome.order.order.order_number,
        total = outcome.order.order.total,
        reversed_credit = outcome.reversed_credit,
        new_credit = settlement.credit_delta,
        edited_by = actor.staff_id,
        "order edited"
    );
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

const ORDER_SELECT: &str = "SELECT o.id, o.order_number, o.order_type, o.table_number, o.customer_id,
        o.subtotal, COALESCE(o.discount_amount, 0), o.discount_type, COALESCE(o.tax_amount, 0),
        o.total, o.payment_method, o.payment_status, COALESCE(o.paid_amount, 0),
        o.created_by, s.name, o.created_at, o.notes
     FROM orders o
     LEFT JOIN staff s ON s.id = o.created_by";

fn map_order(row: &Row) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        order_number: row.get(1)?,
        order_type: OrderType::from_db(&row.get::<_, Option<String>>(2)?.unwrap_or_default()),
        table_number: row.get(3)?,
        customer_id: row.get(4)?,
        subtotal: row.get(5)?,
        discount_amount: row.get(6)?,
        discount_type: row.get(7)?,
        tax_amount: row.get(8)?,
        total: row.get(9)?,
        payment_method: PaymentMethod::from_stored(
            &row.get::<_, Option<String>>(10)?.unwrap_or_default(),
        ),
        payment_status: PaymentStatus::from_db(
            &row.get::<_, Option<String>>(11)?.unwrap_or_default(),
        ),
        paid_amount: row.get(12)?,
        created_by: row.get(13)?,
        created_by_name: row.get(14)?,
        created_at: row.get::<_, Option<String>>(15)?.unwrap_or_default(),
        notes: row.get(16)?,
    })
}

fn fetch_order(conn: &Connection, order_id: i64) -> PosResult<Order> {
    conn.query_row(
        &format!("{ORDER_SELECT} WHERE o.id = ?1"),
        params![order_id],
        map_order,
    )
    .optional()?
    .ok_or(PosError::OrderNotFound(order_id))
}

fn fetch_items(conn: &Connection, order_id: i64) -> PosResult<Vec<OrderItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, order_id, menu_item_id, variant_id, item_name, quantity, unit_price, total_price
         FROM order_items WHERE order_id = ?1 ORDER BY id",
    )?;
    let items = stmt
        .query_map(params![order_id], |row| {
            Ok(OrderItem {
                id: row.get(0)?,
                order_id: row.get(1)?,
                menu_item_id: row.get(2)?,
                variant_id: row.get(3)?,
                item_name: row.get(4)?,
                quantity: row.get(5)?,
                unit_price: row.get(6)?,
                total_price: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

fn fetch_order_with_items(conn: &Connection, order_id: i64) -> PosResult<OrderWithItems> {
    Ok(OrderWithItems {
        order: fetch_order(conn, order_id)?,
        items: fetch_items(conn, order_id)?,
    })
}

pub fn get_order(db: &DbState, order_id: i64) -> PosResult<OrderWithItems> {
    let conn = db.conn.lock()?;
    fetch_order_with_items(&conn, order_id)
}

/// Orders created on `date`, newest first, with the creator's name.
///
/// `created_at` is stored in UTC, so `date` is a UTC calendar date.
pub fn orders_for_date(db: &DbState, date: NaiveDate) -> PosResult<Vec<Order>> {
    let conn = db.conn.lock()?;
    let mut stmt = conn.prepare(&format!(
        "{ORDER_SELECT} WHERE date(o.created_at) = ?1 ORDER BY o.created_at DESC, o.id DESC"
    ))?;
    let orders = stmt
        .query_map(params![date.format("%Y-%m-%d").to_string()], map_order)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(orders)
}

/// Rebuild the receipt of a stored order.
///
/// The balance shown is the customer's current balance, not the balance
/// at the time of the order.
pub fn receipt_for_order(db: &DbState, order_id: i64) -> PosResult<Receipt> {
    let conn = db.conn.lock()?;
    let OrderWithItems { order, items } = fetch_order_with_items(&conn, order_id)?;

    let customer = match order.customer_id {
        Some(id) => match credit::fetch_customer(&conn, id) {
            Ok(c) => Some(c),
            Err(PosError::CustomerNotFound(_)) => None,
            Err(e) => return Err(e),
        },
        None => None,
    };

    let pending_amount = matches!(
        order.payment_status,
        PaymentStatus::Pending | PaymentStatus::Partial
    )
    .then(|| order.total - order.paid_amount);

    let (credit_limit, balance, exceeded) = match &customer {
        Some(c) => (
            (c.credit_limit > 0.0).then_some(c.credit_limit),
            Some(c.current_balance),
            c.credit_limit > 0.0 && c.current_balance > c.credit_limit,
        ),
        None => (None, None, false),
    };

    Ok(Receipt {
        order_id: order.id,
        order_number: order.order_number,
        date: order.created_at,
        order_type: order.order_type,
        table_number: order.table_number,
        customer_name: customer.map(|c| c.name),
        items: items.iter().map(ReceiptLine::from).collect(),
        subtotal: order.subtotal,
        discount_amount: order.discount_amount,
        total: order.total,
        payment_method: order.payment_method,
        paid_amount: order.paid_amount,
        pending_amount,
        credit_limit,
        balance_after_order: balance,
        credit_limit_exceeded: exceeded,
        notes: order.notes,
        low_stock: Vec::new(),
    })
}

/// Reprint as HTML using the current restaurant settings.
pub fn receipt_html(db: &DbState, order_id: i64) -> PosResult<String> {
    let receipt = receipt_for_order(db, order_id)?;
    let settings = {
        let conn = db.conn.lock()?;
        RestaurantSettings::load(&conn)
    };
    Ok(crate::receipt::render_html(&receipt, &settings))
}

// ===========================================================================
// Tests
// ===========================================================================
