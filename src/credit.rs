//! Credit customer ledger.
//!
//! `current_balance` is a stored running total: charges add the unpaid
//! part of credit/partial orders, payments and edit reversals subtract.
//! Charge helpers take a bare `&Connection` so they compose into the
//! caller's transaction; the maintenance functions lock `DbState` and
//! open their own.
//!
//! A credit limit of 0 means "no limit". Exceeding a limit is reported on
//! [`ChargeOutcome`], never refused.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::{self, DbState};
use crate::error::{PosError, PosResult};
use crate::models::{CreditCustomer, CreditPayment, CustomerInput, CustomerRef};
use crate::staff::{Actor, Section};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeOutcome {
    pub customer_id: i64,
    pub previous_balance: f64,
    pub new_balance: f64,
    pub credit_limit: f64,
    pub limit_exceeded: bool,
}

fn balance_and_limit(conn: &Connection, customer_id: i64) -> PosResult<(f64, f64)> {
    conn.query_row(
        "SELECT COALESCE(current_balance, 0), COALESCE(credit_limit, 0)
         FROM credit_customers WHERE id = ?1",
        params![customer_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()?
    .ok_or(PosError::CustomerNotFound(customer_id))
}

/// Compute what charging `amount` would do to the balance, without writing.
pub fn preview_charge(conn: &Connection, customer_id: i64, amount: f64) -> PosResult<ChargeOutcome> {
    let (previous_balance, credit_limit) = balance_and_limit(conn, customer_id)?;
    let new_balance = previous_balance + amount;
    Ok(ChargeOutcome {
        customer_id,
        previous_balance,
        new_balance,
        credit_limit,
        limit_exceeded: credit_limit > 0.0 && new_balance > credit_limit,
    })
}

/// Add `amount` to the customer's balance.
pub fn apply_charge(conn: &Connection, customer_id: i64, amount: f64) -> PosResult<ChargeOutcome> {
    let outcome = preview_charge(conn, customer_id, amount)?;
    conn.execute(
        "UPDATE credit_customers SET current_balance = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![outcome.new_balance, customer_id],
    )?;

    if outcome.limit_exceeded {
        warn!(
            customer_id,
            new_balance = outcome.new_balance,
            credit_limit = outcome.credit_limit,
            "credit limit exceeded"
        );
    }
    Ok(outcome)
}

/// Subtract `amount` from the customer's balance and return the new balance.
pub fn reverse_charge(conn: &Connection, customer_id: i64, amount: f64) -> PosResult<f64> {
    let (balance, _) = balance_and_limit(conn, customer_id)?;
    let new_balance = balance - amount;
    conn.execute(
        "UPDATE credit_customers SET current_balance = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![new_balance, customer_id],
    )?;
    Ok(new_balance)
}

/// Record a repayment: `0 < amount <= current_balance`.
pub fn record_payment(
    db: &DbState,
    actor: &Actor,
    customer_id: i64,
    amount: f64,
    method: &str,
    notes: Option<&str>,
) -> PosResult<CreditPayment> {
    actor.require(Section::Credit)?;

    if !amount.is_finite() || amount <= 0.0 {
        return Err(PosError::InvalidAmount("Enter a valid amount.".into()));
    }
    let method = match method.trim() {
        "" => "cash",
        m => m,
    };
    let notes = notes.map(str::trim).filter(|s| !s.is_empty());

    let conn = db.conn.lock()?;
    let payment = db::with_transaction(&conn, |tx| {
        let (balance, _) = balance_and_limit(tx, customer_id)?;
        if amount > balance {
            return Err(PosError::InvalidAmount(
                "Amount cannot exceed outstanding balance.".into(),
            ));
        }

        tx.execute(
            "UPDATE credit_customers SET current_balance = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![balance - amount, customer_id],
        )?;
        tx.execute(
            "INSERT INTO credit_payments (customer_id, amount, payment_method, notes, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![customer_id, amount, method, notes, actor.staff_id],
        )?;
        let id = tx.last_insert_rowid();
        tx.query_row(
            &format!("{PAYMENT_SELECT} WHERE id = ?1"),
            params![id],
            map_payment,
        )
        .map_err(PosError::from)
    })?;

    info!(
        customer_id,
        amount,
        method = %method,
        created_by = actor.staff_id,
        "credit payment recorded"
    );
    Ok(payment)
}

/// Find the ledger account for a checkout customer.
///
/// An explicit id must exist. Otherwise name and phone are required; the
/// account is matched by phone (its name is refreshed) or created.
pub fn resolve_customer(conn: &Connection, customer: &CustomerRef) -> PosResult<i64> {
    if let Some(id) = customer.id {
        balance_and_limit(conn, id)?;
        return Ok(id);
    }

    let name = customer.name.trim();
    let phone = customer.phone.trim();
    if name.is_empty() || phone.is_empty() {
        return Err(PosError::validation("Customer name and phone are required."));
    }

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM credit_customers WHERE phone = ?1 ORDER BY id LIMIT 1",
            params![phone],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        conn.execute(
            "UPDATE credit_customers SET name = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![name, id],
        )?;
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO credit_customers (name, phone) VALUES (?1, ?2)",
        params![name, phone],
    )?;
    let id = conn.last_insert_rowid();
    info!(customer_id = id, "credit customer created at checkout");
    Ok(id)
}

// ---------------------------------------------------------------------------
// Customer maintenance
// ---------------------------------------------------------------------------

fn validate_input(input: &CustomerInput) -> PosResult<()> {
    if input.name.trim().is_empty() {
        return Err(PosError::validation("Name is required."));
    }
    if !input.credit_limit.is_finite() || input.credit_limit < 0.0 {
        return Err(PosError::InvalidAmount(
            "credit limit cannot be negative".into(),
        ));
    }
    Ok(())
}

fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

pub fn create_customer(db: &DbState, actor: &Actor, input: &CustomerInput) -> PosResult<i64> {
    actor.require(Section::Credit)?;
    validate_input(input)?;

    let conn = db.conn.lock()?;
    conn.execute(
        "INSERT INTO credit_customers (name, phone, address, credit_limit) VALUES (?1, ?2, ?3, ?4)",
        params![
            input.name.trim(),
            clean(input.phone.as_deref()),
            clean(input.address.as_deref()),
            input.credit_limit,
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(customer_id = id, credit_limit = input.credit_limit, "credit customer created");
    Ok(id)
}

/// Update contact details and limit. The balance is untouched.
pub fn update_customer(
    db: &DbState,
    actor: &Actor,
    customer_id: i64,
    input: &CustomerInput,
) -> PosResult<CreditCustomer> {
    actor.require(Section::Credit)?;
    validate_input(input)?;

    let conn = db.conn.lock()?;
    let changed = conn.execute(
        "UPDATE credit_customers
         SET name = ?1, phone = ?2, address = ?3, credit_limit = ?4, updated_at = datetime('now')
         WHERE id = ?5",
        params![
            input.name.trim(),
            clean(input.phone.as_deref()),
            clean(input.address.as_deref()),
            input.credit_limit,
            customer_id,
        ],
    )?;
    if changed == 0 {
        return Err(PosError::CustomerNotFound(customer_id));
    }
    fetch_customer(&conn, customer_id)
}

/// Remove a settled customer.
///
/// Past orders keep their history but lose the customer reference, and
/// the customer's repayment rows are removed with the account.
pub fn delete_customer(db: &DbState, actor: &Actor, customer_id: i64) -> PosResult<()> {
    actor.require(Section::Credit)?;

    let conn = db.conn.lock()?;
    db::with_transaction(&conn, |tx| {
        let (balance, _) = balance_and_limit(tx, customer_id)?;
        if balance.abs() > f64::EPSILON {
            return Err(PosError::OutstandingBalance {
                customer_id,
                balance,
            });
        }
        tx.execute(
            "UPDATE orders SET customer_id = NULL WHERE customer_id = ?1",
            params![customer_id],
        )?;
        tx.execute(
            "DELETE FROM credit_payments WHERE customer_id = ?1",
            params![customer_id],
        )?;
        tx.execute(
            "DELETE FROM credit_customers WHERE id = ?1",
            params![customer_id],
        )?;
        Ok(())
    })?;

    info!(customer_id, deleted_by = actor.staff_id, "credit customer deleted");
    Ok(())
}

const CUSTOMER_SELECT: &str = "SELECT id, name, phone, address,
        COALESCE(credit_limit, 0), COALESCE(current_balance, 0)
     FROM credit_customers";

fn map_customer(row: &Row) -> rusqlite::Result<CreditCustomer> {
    Ok(CreditCustomer {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        address: row.get(3)?,
        credit_limit: row.get(4)?,
        current_balance: row.get(5)?,
    })
}

pub(crate) fn fetch_customer(conn: &Connection, customer_id: i64) -> PosResult<CreditCustomer> {
    conn.query_row(
        &format!("{CUSTOMER_SELECT} WHERE id = ?1"),
        params![customer_id],
        map_customer,
    )
    .optional()?
    .ok_or(PosError::CustomerNotFound(customer_id))
}

pub fn get_customer(db: &DbState, customer_id: i64) -> PosResult<CreditCustomer> {
    let conn = db.conn.lock()?;
    fetch_customer(&conn, customer_id)
}

pub fn list_customers(db: &DbState) -> PosResult<Vec<CreditCustomer>> {
    let conn = db.conn.lock()?;
    let mut stmt = conn.prepare(&format!("{CUSTOMER_SELECT} ORDER BY name"))?;
    let customers = stmt
        .query_map([], map_customer)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(customers)
}

const PAYMENT_SELECT: &str = "SELECT id, customer_id, amount, COALESCE(payment_method, 'cash'),
        reference, notes, created_by, created_at
     FROM credit_payments";

fn map_payment(row: &Row) -> rusqlite::Result<CreditPayment> {
    Ok(CreditPayment {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        amount: row.get(2)?,
        payment_method: row.get(3)?,
        reference: row.get(4)?,
        notes: row.get(5)?,
        created_by: row.get(6)?,
        created_at: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
    })
}

/// Repayment history, newest first.
pub fn payments_for_customer(db: &DbState, customer_id: i64) -> PosResult<Vec<CreditPayment>> {
    let conn = db.conn.lock()?;
    let mut stmt = conn.prepare(&format!(
        "{PAYMENT_SELECT} WHERE customer_id = ?1 ORDER BY id DESC"
    ))?;
    let payments = stmt
        .query_map(params![customer_id], map_payment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(payments)
}

pub(crate) fn outstanding(conn: &Connection) -> PosResult<f64> {
    Ok(conn.query_row(
        "SELECT COALESCE(SUM(current_balance), 0) FROM credit_customers WHERE current_balance > 0",
        [],
        |row| row.get(0),
    )?)
}

/// Sum of all positive balances.
pub fn total_outstanding(db: &DbState) -> PosResult<f64> {
    let conn = db.conn.lock()?;
    outstanding(&conn)
}

// ===========================================================================
// Tests
// ===========================================================================
