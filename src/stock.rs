//! Stock reconciliation for sold items and manual stock movements.
//!
//! A cart line draws on a stock item through `menu_items.stock_item_id`
//! when set, otherwise through a case-insensitive, trimmed exact match of
//! the line's item name against `stock_items.name`. Lines with neither
//! link are not unit-tracked.
//!
//! Every quantity change appends a `stock_movements` row; movements are
//! never updated or deleted.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::{self, DbState};
use crate::error::{PosError, PosResult};
use crate::models::{
    MovementType, NewMovement, NewStockItem, OrderLine, StockItem, StockMovement,
};
use crate::staff::{Actor, Section};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAvailability {
    pub stock_id: i64,
    /// Quantity left after the staged lines drawing on the same item.
    pub available: f64,
    pub current_quantity: f64,
}

/// One decrement applied while completing an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDecrement {
    pub stock_item_id: i64,
    pub name: String,
    pub quantity: f64,
    pub remaining: f64,
    pub low_stock: bool,
}

#[derive(Debug, Clone)]
struct TrackedStock {
    id: i64,
    name: String,
    current_quantity: f64,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn find_by_name(conn: &Connection, item_name: &str) -> PosResult<Option<TrackedStock>> {
    let wanted = normalize(item_name);
    if wanted.is_empty() {
        return Ok(None);
    }

    let mut stmt =
        conn.prepare("SELECT id, name, current_quantity FROM stock_items ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(TrackedStock {
            id: row.get(0)?,
            name: row.get(1)?,
            current_quantity: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
        })
    })?;

    for row in rows {
        let stock = row?;
        if normalize(&stock.name) == wanted {
            return Ok(Some(stock));
        }
    }
    Ok(None)
}

fn find_by_id(conn: &Connection, stock_id: i64) -> PosResult<Option<TrackedStock>> {
    Ok(conn
        .query_row(
            "SELECT id, name, current_quantity FROM stock_items WHERE id = ?1",
            params![stock_id],
            |row| {
                Ok(TrackedStock {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    current_quantity: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                })
            },
        )
        .optional()?)
}

/// Resolve the stock item a cart line draws on, if any.
fn stock_for_line(conn: &Connection, line: &OrderLine) -> PosResult<Option<TrackedStock>> {
    let linked: Option<i64> = conn
        .query_row(
            "SELECT stock_item_id FROM menu_items WHERE id = ?1",
            params![line.menu_item_id],
            |row| row.get(0),
        )
        .optional()?
        .flatten();

    match linked {
        Some(stock_id) => find_by_id(conn, stock_id),
        None => find_by_name(conn, &line.item_name),
    }
}

/// How much of the stock item `line` draws on is still available,
/// counting the quantities of `staged` lines that draw on the same item.
///
/// `line` is resolved like any cart line, so a linked menu item reports
/// its linked stock. Returns `None` when the line is not unit-tracked.
pub fn availability(
    conn: &Connection,
    line: &OrderLine,
    staged: &[OrderLine],
) -> PosResult<Option<StockAvailability>> {
    let Some(stock) = stock_for_line(conn, line)? else {
        return Ok(None);
    };

    let mut in_cart = 0.0;
    for line in staged {
        if let Some(other) = stock_for_line(conn, line)? {
            if other.id == stock.id {
                in_cart += line.quantity as f64;
            }
        }
    }

    Ok(Some(StockAvailability {
        stock_id: stock.id,
        available: (stock.current_quantity - in_cart).max(0.0),
        current_quantity: stock.current_quantity,
    }))
}

/// Authoritative pre-write gate: every tracked item must cover the total
/// quantity requested across all lines drawing on it.
pub fn check_sufficiency(conn: &Connection, lines: &[OrderLine]) -> PosResult<()> {
    let mut requested: BTreeMap<i64, (String, f64, f64)> = BTreeMap::new();

    for line in lines {
        if line.quantity <= 0 {
            continue;
        }
        if let Some(stock) = stock_for_line(conn, line)? {
            let entry = requested
                .entry(stock.id)
                .or_insert_with(|| (line.item_name.clone(), stock.current_quantity, 0.0));
            entry.2 += line.quantity as f64;
        }
    }

    for (item, current, wanted) in requested.into_values() {
        if wanted > current {
            return Err(PosError::InsufficientStock {
                item,
                available: current,
            });
        }
    }
    Ok(())
}

/// Decrement tracked stock for each line and append an `out` movement
/// referencing `reference` (the order number).
///
/// Quantities are re-read per line at commit time. Must run inside the
/// caller's transaction: an `InsufficientStock` error here rolls back the
/// lines already committed in the same batch.
pub fn reserve_and_commit(
    conn: &Connection,
    lines: &[OrderLine],
    reference: &str,
    actor: &Actor,
) -> PosResult<Vec<StockDecrement>> {
    let mut decrements = Vec::new();

    for line in lines {
        if line.quantity <= 0 {
            continue;
        }
        let Some(stock) = stock_for_line(conn, line)? else {
            continue;
        };

        let qty = line.quantity as f64;
        let (current, min_quantity): (f64, f64) = conn.query_row(
            "SELECT COALESCE(current_quantity, 0), COALESCE(min_quantity, 0)
             FROM stock_items WHERE id = ?1",
            params![stock.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if qty > current {
            return Err(PosError::InsufficientStock {
                item: line.item_name.clone(),
                available: current,
            });
        }

        let remaining = (current - qty).max(0.0);
        conn.execute(
            "UPDATE stock_items SET current_quantity = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![remaining, stock.id],
        )?;
        conn.execute(
            "INSERT INTO stock_movements (stock_item_id, type, quantity, reference, notes, created_by)
             VALUES (?1, 'out', ?2, ?3, 'Order', ?4)",
            params![stock.id, -qty, reference, actor.staff_id],
        )?;

        let low_stock = min_quantity > 0.0 && remaining <= min_quantity;
        if low_stock {
            warn!(stock_item_id = stock.id, item = %stock.name, remaining, min_quantity, "stock at or below minimum");
        }

        decrements.push(StockDecrement {
            stock_item_id: stock.id,
            name: stock.name,
            quantity: qty,
            remaining,
            low_stock,
        });
    }

    Ok(decrements)
}

// ---------------------------------------------------------------------------
// Manual movements
// ---------------------------------------------------------------------------

/// Record a manual stock movement and apply it to the item's quantity.
///
/// `in` and `adjustment` add, `out` and `wastage` subtract (clamped at 0).
/// The movement row stores the signed quantity.
pub fn record_movement(db: &DbState, actor: &Actor, movement: &NewMovement) -> PosResult<StockItem> {
    actor.require(Section::Stock)?;

    if !movement.quantity.is_finite() || movement.quantity <= 0.0 {
        return Err(PosError::InvalidAmount(
            "movement quantity must be greater than 0".into(),
        ));
    }

    let conn = db.conn.lock()?;
    let item = db::with_transaction(&conn, |tx| {
        let current: f64 = tx
            .query_row(
                "SELECT COALESCE(current_quantity, 0) FROM stock_items WHERE id = ?1",
                params![movement.stock_item_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(PosError::StockItemNotFound(movement.stock_item_id))?;

        let (new_qty, signed) = if movement.movement_type.is_outgoing() {
            ((current - movement.quantity).max(0.0), -movement.quantity)
        } else {
            (current + movement.quantity, movement.quantity)
        };

        tx.execute(
            "UPDATE stock_items SET current_quantity = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![new_qty, movement.stock_item_id],
        )?;
        tx.execute(
            "INSERT INTO stock_movements (stock_item_id, type, quantity, reference, notes, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                movement.stock_item_id,
                movement.movement_type.as_str(),
                signed,
                trimmed(movement.reference.as_deref()),
                trimmed(movement.notes.as_deref()),
                actor.staff_id,
            ],
        )?;

        get_stock_item(tx, movement.stock_item_id)
    })?;

    info!(
        stock_item_id = item.id,
        movement = movement.movement_type.as_str(),
        quantity = movement.quantity,
        new_quantity = item.current_quantity,
        "stock movement recorded"
    );
    Ok(item)
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Stock items
// ---------------------------------------------------------------------------

pub fn create_stock_item(db: &DbState, actor: &Actor, item: &NewStockItem) -> PosResult<i64> {
    actor.require(Section::Stock)?;

    let name = item.name.trim();
    let unit = item.unit.trim();
    if name.is_empty() || unit.is_empty() {
        return Err(PosError::validation("Name and unit are required."));
    }
    if item.current_quantity < 0.0 || item.min_quantity < 0.0 || item.cost_per_unit < 0.0 {
        return Err(PosError::InvalidAmount(
            "quantities and cost cannot be negative".into(),
        ));
    }

    let conn = db.conn.lock()?;
    conn.execute(
        "INSERT INTO stock_items (category_id, name, unit, current_quantity, min_quantity, cost_per_unit, supplier)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            item.category_id,
            name,
            unit,
            item.current_quantity,
            item.min_quantity,
            item.cost_per_unit,
            trimmed(item.supplier.as_deref()),
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(stock_item_id = id, name = %name, "stock item created");
    Ok(id)
}

/// Set or clear the explicit stock link of a menu item.
pub fn link_menu_item(
    db: &DbState,
    actor: &Actor,
    menu_item_id: i64,
    stock_item_id: Option<i64>,
) -> PosResult<()> {
    actor.require(Section::Menu)?;

    let conn = db.conn.lock()?;
    if let Some(stock_id) = stock_item_id {
        if find_by_id(&conn, stock_id)?.is_none() {
            return Err(PosError::StockItemNotFound(stock_id));
        }
    }

    let changed = conn.execute(
        "UPDATE menu_items SET stock_item_id = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![stock_item_id, menu_item_id],
    )?;
    if changed == 0 {
        return Err(PosError::validation(format!(
            "Menu item not found: {menu_item_id}"
        )));
    }
    info!(menu_item_id, stock_item_id = ?stock_item_id, "menu item stock link updated");
    Ok(())
}

const STOCK_ITEM_SELECT: &str = "SELECT s.id, s.category_id, c.name, s.name, s.unit,
        COALESCE(s.current_quantity, 0), COALESCE(s.min_quantity, 0),
        COALESCE(s.cost_per_unit, 0), s.supplier
     FROM stock_items s
     LEFT JOIN stock_categories c ON c.id = s.category_id";

fn map_stock_item(row: &Row) -> rusqlite::Result<StockItem> {
    Ok(StockItem {
        id: row.get(0)?,
        category_id: row.get(1)?,
        category_name: row.get(2)?,
        name: row.get(3)?,
        unit: row.get(4)?,
        current_quantity: row.get(5)?,
        min_quantity: row.get(6)?,
        cost_per_unit: row.get(7)?,
        supplier: row.get(8)?,
    })
}

fn get_stock_item(conn: &Connection, id: i64) -> PosResult<StockItem> {
    conn.query_row(
        &format!("{STOCK_ITEM_SELECT} WHERE s.id = ?1"),
        params![id],
        map_stock_item,
    )
    .optional()?
    .ok_or(PosError::StockItemNotFound(id))
}

pub fn list_stock_items(db: &DbState) -> PosResult<Vec<StockItem>> {
    let conn = db.conn.lock()?;
    let mut stmt = conn.prepare(&format!("{STOCK_ITEM_SELECT} ORDER BY s.name"))?;
    let items = stmt
        .query_map([], map_stock_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Items with a minimum set whose quantity is at or below it.
pub fn low_stock_items(db: &DbState) -> PosResult<Vec<StockItem>> {
    let conn = db.conn.lock()?;
    let mut stmt = conn.prepare(&format!(
        "{STOCK_ITEM_SELECT}
         WHERE s.min_quantity > 0 AND s.current_quantity <= s.min_quantity
         ORDER BY s.name"
    ))?;
    let items = stmt
        .query_map([], map_stock_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn movements_for_item(db: &DbState, stock_item_id: i64) -> PosResult<Vec<StockMovement>> {
    let conn = db.conn.lock()?;
    let mut stmt = conn.prepare(
        "SELECT id, stock_item_id, type, quantity, reference, notes, created_by, created_at
         FROM stock_movements
         WHERE stock_item_id = ?1
         ORDER BY id",
    )?;
    let movements = stmt
        .query_map(params![stock_item_id], |row| {
            Ok(StockMovement {
                id: row.get(0)?,
                stock_item_id: row.get(1)?,
                movement_type: MovementType::from_db(&row.get::<_, String>(2)?),
                quantity: row.get(3)?,
                reference: row.get(4)?,
                notes: row.get(5)?,
                created_by: row.get(6)?,
                created_at: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(movements)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::staff::{seed_staff, Role};

    /// Insert a menu item (optionally linked to a stock item) and return its id.
    pub(crate) fn seed_menu_item(
        conn: &Connection,
        name: &str,
        price: f64,
        cost: f64,
        stock_item_id: Option<i64>,
    ) -> i64 {
        conn.execute(
            "INSERT INTO menu_items (category_id, name, sale_price, cost_price, stock_item_id)
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![name, price, cost, stock_item_id],
        )
        .expect("insert menu item");
        conn.last_insert_rowid()
    }

    pub(crate) fn seed_stock(conn: &Connection, name: &str, qty: f64, min: f64) -> i64 {
        conn.execute(
            "INSERT INTO stock_items (category_id, name, unit, current_quantity, min_quantity)
             VALUES (1, ?1, 'pcs', ?2, ?3)",
            params![name, qty, min],
        )
        .expect("insert stock item");
        conn.last_insert_rowid()
    }

    pub(crate) fn stock_qty(conn: &Connection, id: i64) -> f64 {
        conn.query_row(
            "SELECT current_quantity FROM stock_items WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .unwrap()
    }

    fn line(menu_item_id: i64, name: &str, quantity: i64) -> OrderLine {
        OrderLine {
            menu_item_id,
            variant_id: None,
            item_name: name.into(),
            unit_price: 100.0,
            quantity,
        }
    }

    #[test]
    fn test_availability_matches_name_case_insensitively() {
        let db = db::test_db();
        let conn = db.conn.lock().unwrap();
        let stock_id = seed_stock(&conn, "Chicken ", 5.0, 0.0);
        let menu_id = seed_menu_item(&conn, "chicken", 350.0, 0.0, None);

        let staged = vec![line(menu_id, "CHICKEN", 2), line(menu_id, "chicken", 1)];
        let avail = availability(&conn, &line(menu_id, "  chicken", 1), &staged)
            .unwrap()
            .unwrap();
        assert_eq!(avail.stock_id, stock_id);
        assert_eq!(avail.current_quantity, 5.0);
        assert_eq!(avail.available, 2.0);

        let naan = seed_menu_item(&conn, "Naan", 30.0, 0.0, None);
        assert!(availability(&conn, &line(naan, "Naan", 1), &staged)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_availability_never_negative() {
        let db = db::test_db();
        let conn = db.conn.lock().unwrap();
        seed_stock(&conn, "Chicken", 1.0, 0.0);
        let menu_id = seed_menu_item(&conn, "Chicken", 350.0, 0.0, None);

        let staged = vec![line(menu_id, "Chicken", 3)];
        let avail = availability(&conn, &line(menu_id, "Chicken", 1), &staged)
            .unwrap()
            .unwrap();
        assert_eq!(avail.available, 0.0);
    }

    #[test]
    fn test_availability_follows_explicit_link() {
        let db = db::test_db();
        let conn = db.conn.lock().unwrap();
        let fillet = seed_stock(&conn, "Chicken Fillet", 1.0, 0.0);
        let menu_id = seed_menu_item(&conn, "Chicken Burger", 450.0, 0.0, Some(fillet));
        let burger = line(menu_id, "Chicken Burger", 1);

        let avail = availability(&conn, &burger, &[burger.clone()])
            .unwrap()
            .unwrap();
        assert_eq!(avail.stock_id, fillet);
        assert_eq!(avail.current_quantity, 1.0);
        assert_eq!(avail.available, 0.0);

        let err = check_sufficiency(&conn, &[line(menu_id, "Chicken Burger", 2)]).unwrap_err();
        assert!(matches!(err, PosError::InsufficientStock { available, .. } if available == 1.0));
    }

    #[test]
    fn test_explicit_link_overrides_name_match() {
        let db = db::test_db();
        let conn = db.conn.lock().unwrap();
        let fillet = seed_stock(&conn, "Chicken Fillet", 10.0, 0.0);
        let same_name = seed_stock(&conn, "Chicken Burger", 10.0, 0.0);
        let menu_id = seed_menu_item(&conn, "Chicken Burger", 450.0, 0.0, Some(fillet));

        let actor = crate::staff::test_actor(1, Role::Admin);
        conn.execute(
            "INSERT INTO staff (id, name, role, username, pin) VALUES (1, 'A', 'admin', 'a', 'x')",
            [],
        )
        .unwrap();
        let lines = vec![line(menu_id, "Chicken Burger", 2)];
        let decs = reserve_and_commit(&conn, &lines, "ORD-T", &actor).unwrap();
        assert_eq!(decs.len(), 1);
        assert_eq!(decs[0].stock_item_id, fillet);
        assert_eq!(stock_qty(&conn, fillet), 8.0);
        assert_eq!(stock_qty(&conn, same_name), 10.0);
    }

    #[test]
    fn test_check_sufficiency_pools_duplicate_lines() {
        let db = db::test_db();
        let conn = db.conn.lock().unwrap();
        seed_stock(&conn, "Chicken", 5.0, 0.0);
        let menu_id = seed_menu_item(&conn, "Chicken", 350.0, 0.0, None);

        assert!(check_sufficiency(&conn, &[line(menu_id, "Chicken", 5)]).is_ok());

        let err = check_sufficiency(
            &conn,
            &[line(menu_id, "Chicken", 3), line(menu_id, "chicken", 3)],
        )
        .unwrap_err();
        match err {
            PosError::InsufficientStock { item, available } => {
                assert_eq!(item, "Chicken");
                assert_eq!(available, 5.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_untracked_lines_are_unconstrained() {
        let db = db::test_db();
        let conn = db.conn.lock().unwrap();
        let menu_id = seed_menu_item(&conn, "Green Tea", 80.0, 0.0, None);
        assert!(check_sufficiency(&conn, &[line(menu_id, "Green Tea", 500)]).is_ok());
    }

    #[test]
    fn test_reserve_and_commit_decrements_and_logs_movement() {
        let db = db::test_db();
        let actor = seed_staff(&db, "cashier", "1234", Role::Cashier);
        let conn = db.conn.lock().unwrap();
        let stock_id = seed_stock(&conn, "Chicken", 5.0, 2.0);
        let menu_id = seed_menu_item(&conn, "Chicken", 350.0, 0.0, None);

        let decs =
            reserve_and_commit(&conn, &[line(menu_id, "Chicken", 3)], "ORD-1", &actor).unwrap();
        assert_eq!(stock_qty(&conn, stock_id), 2.0);
        assert_eq!(decs[0].remaining, 2.0);
        assert!(decs[0].low_stock);

        let (kind, qty, reference, created_by): (String, f64, String, i64) = conn
            .query_row(
                "SELECT type, quantity, reference, created_by FROM stock_movements WHERE stock_item_id = ?1",
                params![stock_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(kind, "out");
        assert_eq!(qty, -3.0);
        assert_eq!(reference, "ORD-1");
        assert_eq!(created_by, actor.staff_id);
    }

    #[test]
    fn test_reserve_and_commit_rejects_more_than_current() {
        let db = db::test_db();
        let actor = seed_staff(&db, "cashier", "1234", Role::Cashier);
        let conn = db.conn.lock().unwrap();
        let stock_id = seed_stock(&conn, "Chicken", 5.0, 0.0);
        let menu_id = seed_menu_item(&conn, "Chicken", 350.0, 0.0, None);

        let result = db::with_transaction(&conn, |tx| {
            reserve_and_commit(
                tx,
                &[line(menu_id, "Chicken", 4), line(menu_id, "Chicken", 4)],
                "ORD-2",
                &actor,
            )
        });
        assert!(matches!(result, Err(PosError::InsufficientStock { .. })));
        assert_eq!(stock_qty(&conn, stock_id), 5.0);
        let movements: i64 = conn
            .query_row("SELECT COUNT(*) FROM stock_movements", [], |row| row.get(0))
            .unwrap();
        assert_eq!(movements, 0);
    }

    #[test]
    fn test_record_movement_in_and_wastage() {
        let db = db::test_db();
        let admin = seed_staff(&db, "admin", "0000", Role::Admin);
        let stock_id = {
            let conn = db.conn.lock().unwrap();
            seed_stock(&conn, "Rice", 4.0, 0.0)
        };

        let item = record_movement(
            &db,
            &admin,
            &NewMovement {
                stock_item_id: stock_id,
                movement_type: MovementType::In,
                quantity: 6.0,
                reference: Some("INV-77".into()),
                notes: None,
            },
        )
        .unwrap();
        assert_eq!(item.current_quantity, 10.0);

        let item = record_movement(
            &db,
            &admin,
            &NewMovement {
                stock_item_id: stock_id,
                movement_type: MovementType::Wastage,
                quantity: 25.0,
                reference: None,
                notes: Some("spoiled".into()),
            },
        )
        .unwrap();
        assert_eq!(item.current_quantity, 0.0);

        let movements = movements_for_item(&db, stock_id).unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].quantity, 6.0);
        assert_eq!(movements[0].reference.as_deref(), Some("INV-77"));
        assert_eq!(movements[1].movement_type, MovementType::Wastage);
        assert_eq!(movements[1].quantity, -25.0);
    }

    #[test]
    fn test_record_movement_validation() {
        let db = db::test_db();
        let admin = seed_staff(&db, "admin", "0000", Role::Admin);
        let cashier = seed_staff(&db, "cashier", "1234", Role::Cashier);
        let movement = NewMovement {
            stock_item_id: 999,
            movement_type: MovementType::In,
            quantity: 1.0,
            reference: None,
            notes: None,
        };

        assert!(matches!(
            record_movement(&db, &cashier, &movement),
            Err(PosError::Forbidden { .. })
        ));
        assert!(matches!(
            record_movement(&db, &admin, &movement),
            Err(PosError::StockItemNotFound(999))
        ));
        let zero = NewMovement {
            quantity: 0.0,
            ..movement
        };
        assert!(matches!(
            record_movement(&db, &admin, &zero),
            Err(PosError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_create_list_and_low_stock() {
        let db = db::test_db();
        let admin = seed_staff(&db, "admin", "0000", Role::Admin);
        let new_item = |name: &str, qty: f64, min: f64| NewStockItem {
            category_id: Some(1),
            name: name.into(),
            unit: "kg".into(),
            current_quantity: qty,
            min_quantity: min,
            cost_per_unit: 10.0,
            supplier: None,
        };
        create_stock_item(&db, &admin, &new_item("Onion", 1.0, 2.0)).unwrap();
        create_stock_item(&db, &admin, &new_item("Tomato", 9.0, 2.0)).unwrap();
        create_stock_item(&db, &admin, &new_item("Salt", 0.0, 0.0)).unwrap();
        assert!(create_stock_item(&db, &admin, &new_item("  ", 1.0, 0.0)).is_err());

        let all = list_stock_items(&db).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].category_name.as_deref(), Some("General"));

        let low = low_stock_items(&db).unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].name, "Onion");
    }

    #[test]
    fn test_link_menu_item() {
        let db = db::test_db();
        let admin = seed_staff(&db, "admin", "0000", Role::Admin);
        let (menu_id, stock_id) = {
            let conn = db.conn.lock().unwrap();
            let stock_id = seed_stock(&conn, "Beef", 3.0, 0.0);
            (seed_menu_item(&conn, "Nihari", 600.0, 0.0, None), stock_id)
        };

        link_menu_item(&db, &admin, menu_id, Some(stock_id)).unwrap();
        assert!(matches!(
            link_menu_item(&db, &admin, menu_id, Some(42)),
            Err(PosError::StockItemNotFound(42))
        ));
        assert!(link_menu_item(&db, &admin, 999, None).is_err());

        let conn = db.conn.lock().unwrap();
        let linked: Option<i64> = conn
            .query_row(
                "SELECT stock_item_id FROM menu_items WHERE id = ?1",
                params![menu_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(linked, Some(stock_id));
    }
}
