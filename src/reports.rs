//! Sales aggregates for the dashboard and the reports screen.

use chrono::NaiveDate;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credit;
use crate::db::DbState;
use crate::error::{PosError, PosResult};
use crate::staff::{Actor, Section};

const TOP_LIMIT: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub date: String,
    /// Excludes fully unpaid (`pending`) orders.
    pub today_sales: f64,
    pub today_orders: i64,
    pub outstanding_credit: f64,
    pub low_stock_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub name: String,
    pub quantity: Option<i64>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub from: String,
    pub to: String,
    /// Sum of totals over paid and partial orders.
    pub total_sales: f64,
    pub order_count: i64,
    pub cash_sales: f64,
    pub credit_sales: f64,
    /// Quantity times the menu item's current cost price.
    pub cost_of_goods: f64,
    pub gross_profit: f64,
    pub top_items: Vec<RankedEntry>,
    pub top_categories: Vec<RankedEntry>,
}

fn day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Figures for one UTC calendar day (`created_at` is stored in UTC).
pub fn dashboard(db: &DbState, actor: &Actor, date: NaiveDate) -> PosResult<DashboardStats> {
    actor.require(Section::Reports)?;

    let date = day(date);
    let conn = db.conn.lock()?;

    let (today_sales, today_orders): (f64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(total), 0), COUNT(*)
         FROM orders
         WHERE date(created_at) = ?1 AND payment_status != 'pending'",
        params![date],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let outstanding_credit = credit::outstanding(&conn)?;

    let low_stock_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM stock_items WHERE min_quantity > 0 AND current_quantity <= min_quantity",
        [],
        |row| row.get(0),
    )?;

    Ok(DashboardStats {
        date,
        today_sales,
        today_orders,
        outstanding_credit,
        low_stock_count,
    })
}

/// Aggregate orders created between `from` and `to`, both inclusive.
/// Both are UTC calendar dates.
pub fn sales_summary(
    db: &DbState,
    actor: &Actor,
    from: NaiveDate,
    to: NaiveDate,
) -> PosResult<SalesSummary> {
    actor.require(Section::Reports)?;
    if from > to {
        return Err(PosError::validation("Start date must not be after end date."));
    }

    let (from, to) = (day(from), day(to));
    let conn = db.conn.lock()?;

    let (total_sales, order_count, cash_sales, credit_sales): (f64, i64, f64, f64) = conn
        .query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN payment_status IN ('paid', 'partial') THEN total ELSE 0 END), 0),
                COUNT(*),
                COALESCE(SUM(CASE WHEN payment_method = 'cash' AND payment_status IN ('paid', 'partial') THEN total ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN payment_method = 'credit' THEN total ELSE 0 END), 0)
             FROM orders
             WHERE date(created_at) >= ?1 AND date(created_at) <= ?2",
            params![from, to],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

    let cost_of_goods: f64 = conn.query_row(
        "SELECT COALESCE(SUM(oi.quantity * COALESCE(m.cost_price, 0)), 0)
         FROM order_items oi
         JOIN orders o ON o.id = oi.order_id
         LEFT JOIN menu_items m ON m.id = oi.menu_item_id
         WHERE date(o.created_at) >= ?1 AND date(o.created_at) <= ?2",
        params![from, to],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT oi.item_name, SUM(oi.quantity), COALESCE(SUM(oi.total_price), 0) AS value
         FROM order_items oi
         JOIN orders o ON o.id = oi.order_id
         WHERE date(o.created_at) >= ?1 AND date(o.created_at) <= ?2
         GROUP BY oi.item_name
         ORDER BY value DESC
         LIMIT ?3",
    )?;
    let top_items = stmt
        .query_map(params![from, to, TOP_LIMIT], |row| {
            Ok(RankedEntry {
                name: row.get(0)?,
                quantity: row.get(1)?,
                value: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT c.name, COALESCE(SUM(oi.total_price), 0) AS value
         FROM order_items oi
         JOIN orders o ON o.id = oi.order_id
         JOIN menu_items m ON m.id = oi.menu_item_id
         JOIN menu_categories c ON c.id = m.category_id
         WHERE date(o.created_at) >= ?1 AND date(o.created_at) <= ?2
         GROUP BY c.id
         ORDER BY value DESC
         LIMIT ?3",
    )?;
    let top_categories = stmt
        .query_map(params![from, to, TOP_LIMIT], |row| {
            Ok(RankedEntry {
                name: row.get(0)?,
                quantity: None,
                value: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    debug!(from = %from, to = %to, total_sales, order_count, "sales summary computed");

    Ok(SalesSummary {
        from,
        to,
        total_sales,
        order_count,
        cash_sales,
        credit_sales,
        cost_of_goods,
        gross_profit: total_sales - cost_of_goods,
        top_items,
        top_categories,
    })
}
