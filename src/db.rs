//! Local SQLite database layer for Hadeez POS.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations, the settings
//! key/value helpers, and the transaction boundary every multi-statement
//! service operation runs inside.

use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{PosError, PosResult};

/// Shared state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Default rows for the `settings` table, inserted only when missing.
const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("restaurant_name", "Hadeez Restaurant"),
    ("restaurant_address", ""),
    ("restaurant_phone", ""),
    ("currency", "Rs."),
    ("tax_enabled", "0"),
    ("tax_percent", "0"),
    ("receipt_header", "Thank you for dining with us!"),
    ("receipt_footer", "Please visit again"),
];

/// Initialize the database at `{data_dir}/pos.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On open failure, deletes the file and
/// retries once.
pub fn init(data_dir: &Path) -> PosResult<DbState> {
    fs::create_dir_all(data_dir)?;

    let db_path = data_dir.join("pos.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> PosResult<Connection> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: base schema and default rows.
fn migrate_v1(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT
        );

        CREATE TABLE IF NOT EXISTS staff (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('admin', 'cashier')),
            username TEXT UNIQUE NOT NULL,
            pin TEXT NOT NULL,
            phone TEXT,
            salary REAL DEFAULT 0,
            joining_date TEXT,
            status TEXT DEFAULT 'active' CHECK(status IN ('active', 'inactive')),
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS menu_categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            sort_order INTEGER DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS menu_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_id INTEGER NOT NULL REFERENCES menu_categories(id),
            name TEXT NOT NULL,
            description TEXT,
            sale_price REAL NOT NULL,
            cost_price REAL DEFAULT 0,
            image TEXT,
            is_available INTEGER DEFAULT 1,
            sort_order INTEGER DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS item_variants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            menu_item_id INTEGER NOT NULL REFERENCES menu_items(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            sale_price REAL NOT NULL,
            cost_price REAL DEFAULT 0,
            sort_order INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS credit_customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            phone TEXT,
            address TEXT,
            credit_limit REAL DEFAULT 0,
            current_balance REAL DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS stock_categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            sort_order INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS stock_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_id INTEGER REFERENCES stock_categories(id),
            name TEXT NOT NULL,
            unit TEXT NOT NULL,
            current_quantity REAL DEFAULT 0,
            min_quantity REAL DEFAULT 0,
            cost_per_unit REAL DEFAULT 0,
            supplier TEXT,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS stock_movements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            stock_item_id INTEGER NOT NULL REFERENCES stock_items(id),
            type TEXT NOT NULL CHECK(type IN ('in', 'out', 'adjustment', 'wastage')),
            quantity REAL NOT NULL,
            reference TEXT,
            notes TEXT,
            created_by INTEGER REFERENCES staff(id),
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_number TEXT UNIQUE NOT NULL,
            daily_number INTEGER,
            order_type TEXT DEFAULT 'dine_in' CHECK(order_type IN ('dine_in', 'takeaway', 'delivery')),
            table_number TEXT,
            customer_id INTEGER REFERENCES credit_customers(id),
            subtotal REAL NOT NULL DEFAULT 0,
            discount_amount REAL DEFAULT 0,
            discount_type TEXT CHECK(discount_type IS NULL OR discount_type IN ('percent', 'fixed')),
            tax_amount REAL DEFAULT 0,
            total REAL NOT NULL DEFAULT 0,
            payment_method TEXT CHECK(payment_method IN ('cash', 'card', 'credit', 'mixed')),
            payment_status TEXT DEFAULT 'pending' CHECK(payment_status IN ('pending', 'paid', 'partial')),
            paid_amount REAL DEFAULT 0,
            created_by INTEGER REFERENCES staff(id),
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            notes TEXT
        );

        CREATE TABLE IF NOT EXISTS closed_days (
            closed_date TEXT PRIMARY KEY,
            closed_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS order_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            menu_item_id INTEGER NOT NULL REFERENCES menu_items(id),
            variant_id INTEGER REFERENCES item_variants(id),
            item_name TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1,
            unit_price REAL NOT NULL,
            total_price REAL NOT NULL,
            notes TEXT
        );

        CREATE TABLE IF NOT EXISTS credit_payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_id INTEGER NOT NULL REFERENCES credit_customers(id),
            amount REAL NOT NULL,
            payment_method TEXT DEFAULT 'cash',
            reference TEXT,
            notes TEXT,
            created_by INTEGER REFERENCES staff(id),
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            staff_id INTEGER REFERENCES staff(id),
            action TEXT NOT NULL,
            entity_type TEXT,
            entity_id INTEGER,
            details TEXT,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            expense_date TEXT NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            category TEXT,
            description TEXT,
            notes TEXT,
            created_by INTEGER REFERENCES staff(id),
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS daily_cash (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cash_date TEXT NOT NULL UNIQUE,
            amount REAL NOT NULL DEFAULT 0,
            notes TEXT,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders(created_at);
        CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(expense_date);
        CREATE INDEX IF NOT EXISTS idx_daily_cash_date ON daily_cash(cash_date);
        CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_id);
        CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);
        CREATE INDEX IF NOT EXISTS idx_stock_movements_item ON stock_movements(stock_item_id);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        PosError::from(e)
    })?;

    for (key, value) in DEFAULT_SETTINGS {
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
    }

    let menu_categories: i64 =
        conn.query_row("SELECT COUNT(*) FROM menu_categories", [], |row| row.get(0))?;
    if menu_categories == 0 {
        conn.execute(
            "INSERT INTO menu_categories (name, sort_order) VALUES ('General', 0)",
            [],
        )?;
    }

    let stock_categories: i64 =
        conn.query_row("SELECT COUNT(*) FROM stock_categories", [], |row| row.get(0))?;
    if stock_categories == 0 {
        conn.execute(
            "INSERT INTO stock_categories (name, sort_order) VALUES ('General', 0)",
            [],
        )?;
    }

    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;

    info!("Applied migration v1 (base schema)");
    Ok(())
}

/// Migration v2: explicit menu item -> stock item link.
///
/// Adds nullable `menu_items.stock_item_id`. Items without a link keep
/// falling back to the case-insensitive name match.
fn migrate_v2(conn: &Connection) -> PosResult<()> {
    if !column_exists(conn, "menu_items", "stock_item_id")? {
        conn.execute_batch(
            "ALTER TABLE menu_items ADD COLUMN stock_item_id INTEGER REFERENCES stock_items(id);",
        )?;
    }

    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_menu_items_stock_item ON menu_items(stock_item_id);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        PosError::from(e)
    })?;

    info!("Applied migration v2 (menu_items.stock_item_id)");
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> PosResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Run `f` inside `BEGIN IMMEDIATE` / `COMMIT`, rolling back when it fails.
///
/// The write lock is taken up front so the read-modify-write sequences in
/// `f` (stock decrement, balance update) cannot interleave with another
/// connection's writes.
pub fn with_transaction<T, F>(conn: &Connection, f: F) -> PosResult<T>
where
    F: FnOnce(&Connection) -> PosResult<T>,
{
    conn.execute_batch("BEGIN IMMEDIATE")?;

    match f(conn) {
        Ok(value) => {
            if let Err(e) = conn.execute_batch("COMMIT") {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e.into());
            }
            Ok(value)
        }
        Err(e) => {
            if let Err(rb) = conn.execute_batch("ROLLBACK") {
                error!("rollback failed: {rb}");
            }
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        params![key],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()
    .ok()
    .flatten()
    .flatten()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> PosResult<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

/// In-memory database with the production pragmas and full schema.
#[cfg(test)]
pub fn test_db() -> DbState {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .expect("pragma setup");
    run_migrations_for_test(&conn);
    DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_create_full_schema() {
        let db = test_db();
        let conn = db.conn.lock().unwrap();
        let tables = table_names(&conn);

        for expected in [
            "settings",
            "staff",
            "menu_categories",
            "menu_items",
            "item_variants",
            "credit_customers",
            "stock_categories",
            "stock_items",
            "stock_movements",
            "orders",
            "closed_days",
            "order_items",
            "credit_payments",
            "activity_log",
            "expenses",
            "daily_cash",
        ] {
            assert!(
                tables.contains(&expected.to_string()),
                "missing {expected}"
            );
        }

        assert!(column_exists(&conn, "menu_items", "stock_item_id").unwrap());

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = test_db();
        let conn = db.conn.lock().unwrap();
        run_migrations(&conn).expect("second run should be a no-op");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);

        let categories: i64 = conn
            .query_row("SELECT COUNT(*) FROM menu_categories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(categories, 1);
    }

    #[test]
    fn test_default_settings_seeded() {
        let db = test_db();
        let conn = db.conn.lock().unwrap();
        assert_eq!(
            get_setting(&conn, "restaurant_name").as_deref(),
            Some("Hadeez Restaurant")
        );
        assert_eq!(get_setting(&conn, "currency").as_deref(), Some("Rs."));
        assert_eq!(get_setting(&conn, "missing_key"), None);
    }

    #[test]
    fn test_set_setting_upserts() {
        let db = test_db();
        let conn = db.conn.lock().unwrap();
        set_setting(&conn, "currency", "PKR").unwrap();
        set_setting(&conn, "new_key", "v").unwrap();
        assert_eq!(get_setting(&conn, "currency").as_deref(), Some("PKR"));
        assert_eq!(get_setting(&conn, "new_key").as_deref(), Some("v"));
    }

    #[test]
    fn test_with_transaction_rolls_back_on_error() {
        let db = test_db();
        let conn = db.conn.lock().unwrap();

        let result: PosResult<()> = with_transaction(&conn, |tx| {
            tx.execute("INSERT INTO settings (key, value) VALUES ('tmp', '1')", [])?;
            Err(PosError::validation("boom"))
        });
        assert!(result.is_err());
        assert_eq!(get_setting(&conn, "tmp"), None);

        with_transaction(&conn, |tx| {
            tx.execute("INSERT INTO settings (key, value) VALUES ('tmp', '2')", [])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(get_setting(&conn, "tmp").as_deref(), Some("2"));
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_init_creates_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = init(dir.path()).expect("init");
        assert!(db.db_path.ends_with("pos.db"));
        assert!(db.db_path.exists());

        let conn = db.conn.lock().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }
}
