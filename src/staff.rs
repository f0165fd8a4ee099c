//! Staff accounts, PIN login and role-based section access.
//!
//! Core operations never read ambient session state: the caller passes the
//! [`Actor`] returned by [`authenticate`] into every call, and its
//! `staff_id` is written as `created_by`.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::DbState;
use crate::error::{PosError, PosResult};

const MIN_PIN_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Cashier,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Cashier => "cashier",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "admin" => Role::Admin,
            _ => Role::Cashier,
        }
    }
}

/// Application areas a role may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Orders,
    Menu,
    Stock,
    Credit,
    Reports,
    Staff,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Orders => "orders",
            Section::Menu => "menu",
            Section::Stock => "stock",
            Section::Credit => "credit",
            Section::Reports => "reports",
            Section::Staff => "staff",
        }
    }
}

/// The signed-in staff member performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub staff_id: i64,
    pub name: String,
    pub username: String,
    pub role: Role,
}

impl Actor {
    pub fn can_access(&self, section: Section) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Cashier => section == Section::Orders,
        }
    }

    pub fn require(&self, section: Section) -> PosResult<()> {
        if self.can_access(section) {
            Ok(())
        } else {
            warn!(staff_id = self.staff_id, section = section.as_str(), "access denied");
            Err(PosError::Forbidden {
                role: self.role.as_str().to_string(),
                section: section.as_str().to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStaff {
    pub name: String,
    pub username: String,
    pub pin: String,
    pub role: Role,
    pub phone: Option<String>,
}

/// Verify a username/PIN pair against active staff accounts.
pub fn authenticate(db: &DbState, username: &str, pin: &str) -> PosResult<Actor> {
    let username = username.trim();
    if username.is_empty() || pin.is_empty() {
        return Err(PosError::InvalidCredentials);
    }

    let conn = db.conn.lock()?;
    let row: Option<(i64, String, String, String)> = conn
        .query_row(
            "SELECT id, name, role, pin FROM staff WHERE username = ?1 AND status = 'active'",
            params![username],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    let Some((staff_id, name, role, hash)) = row else {
        warn!(username = %username, "login failed: unknown or inactive user");
        return Err(PosError::InvalidCredentials);
    };

    if !bcrypt::verify(pin, &hash).unwrap_or(false) {
        warn!(username = %username, "login failed: wrong PIN");
        return Err(PosError::InvalidCredentials);
    }

    let role = Role::from_db(&role);
    info!(staff_id, role = role.as_str(), "login successful");
    Ok(Actor {
        staff_id,
        name,
        username: username.to_string(),
        role,
    })
}

/// Create a staff account. Admin only.
pub fn create_staff(db: &DbState, actor: &Actor, staff: &NewStaff) -> PosResult<i64> {
    actor.require(Section::Staff)?;

    let name = staff.name.trim();
    let username = staff.username.trim();
    if name.is_empty() || username.is_empty() {
        return Err(PosError::validation("Name and username are required."));
    }
    if staff.pin.chars().count() < MIN_PIN_LEN {
        return Err(PosError::validation(format!(
            "PIN must be at least {MIN_PIN_LEN} characters"
        )));
    }

    let hash = bcrypt::hash(&staff.pin, bcrypt::DEFAULT_COST)
        .map_err(|e| PosError::validation(format!("Failed to hash PIN: {e}")))?;

    let conn = db.conn.lock()?;
    conn.execute(
        "INSERT INTO staff (name, role, username, pin, phone, status)
         VALUES (?1, ?2, ?3, ?4, ?5, 'active')",
        params![name, staff.role.as_str(), username, hash, staff.phone],
    )
    .map_err(|e| {
        let err = PosError::from(e);
        if err.is_unique_violation() {
            PosError::validation(format!("Username already taken: {username}"))
        } else {
            err
        }
    })?;

    let id = conn.last_insert_rowid();
    info!(staff_id = id, created_by = actor.staff_id, "staff account created");
    Ok(id)
}

#[cfg(test)]
pub fn test_actor(staff_id: i64, role: Role) -> Actor {
    Actor {
        staff_id,
        name: format!("Staff {staff_id}"),
        username: format!("staff{staff_id}"),
        role,
    }
}

/// Insert a staff row (cheap bcrypt cost) and return its actor.
#[cfg(test)]
pub fn seed_staff(db: &DbState, username: &str, pin: &str, role: Role) -> Actor {
    let conn = db.conn.lock().unwrap();
    let hash = bcrypt::hash(pin, 4).expect("hash test pin");
    conn.execute(
        "INSERT INTO staff (name, role, username, pin) VALUES (?1, ?2, ?3, ?4)",
        params![username, role.as_str(), username, hash],
    )
    .expect("insert staff");
    Actor {
        staff_id: conn.last_insert_rowid(),
        name: username.to_string(),
        username: username.to_string(),
        role,
    }
}
