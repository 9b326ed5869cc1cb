//! Staff accounts.

use api_shared::{AuditAction, User, UserInput};
use chrono::Utc;
use rusqlite::{params, Connection, Row};

use super::{audit, count, Listing, Store};
use crate::db::{is_unique_violation, optional_row, parse_column, Database};
use crate::events::{ChangeBus, ResourceKind};
use crate::validation::{optional_text, require_text, validate_email, PageRequest};
use crate::{RecordError, RecordResult};

const TABLE: &str = "users";

fn map_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        fields: UserInput {
            name: row.get("name")?,
            role: parse_column(row, "role")?,
            email: row.get("email")?,
            mobile: row.get("mobile")?,
            is_active: row.get("is_active")?,
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn find(conn: &Connection, id: i64) -> RecordResult<User> {
    optional_row(conn.query_row("SELECT * FROM users WHERE id = ?1", [id], map_row))?
        .ok_or_else(|| RecordError::not_found("user", id))
}

fn normalise(input: &UserInput) -> RecordResult<UserInput> {
    Ok(UserInput {
        name: require_text("name", &input.name)?,
        role: input.role,
        email: validate_email(&input.email)?,
        mobile: optional_text(input.mobile.as_deref()),
        is_active: input.is_active,
    })
}

fn email_taken(err: rusqlite::Error) -> RecordError {
    if is_unique_violation(&err) {
        RecordError::InvalidInput("a user with this email already exists".into())
    } else {
        err.into()
    }
}

#[derive(Clone)]
pub struct UserService {
    store: Store,
}

impl UserService {
    pub fn new(db: Database, bus: ChangeBus) -> Self {
        Self {
            store: Store::new(db, bus),
        }
    }

    pub fn list(&self, page: &PageRequest) -> RecordResult<Listing<User>> {
        self.store.db.with_connection(|conn| {
            let total = count(conn, "SELECT COUNT(*) FROM users", [])?;
            let mut stmt = conn.prepare("SELECT * FROM users ORDER BY name, id LIMIT ?1 OFFSET ?2")?;
            let items = stmt
                .query_map(params![page.limit_i64(), page.offset()], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Listing {
                items,
                pagination: page.pagination(total),
            })
        })
    }

    pub fn get(&self, id: i64) -> RecordResult<User> {
        self.store.db.with_connection(|conn| find(conn, id))
    }

    /// # Errors
    ///
    /// `RecordError::InvalidInput` if the name is blank, the email is malformed or already used.
    pub fn create(&self, input: &UserInput, actor: Option<i64>) -> RecordResult<User> {
        let input = normalise(input)?;
        let user = self.store.db.with_transaction(|tx| {
            let now = Utc::now();
            tx.execute(
                "INSERT INTO users (name, role, email, mobile, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    input.name,
                    input.role.as_str(),
                    input.email,
                    input.mobile,
                    input.is_active,
                    now
                ],
            )
            .map_err(email_taken)?;
            let id = tx.last_insert_rowid();
            audit::record(tx, TABLE, id, AuditAction::Create, actor, Some(input.role.as_str()))?;
            find(tx, id)
        })?;

        self.store.changed(ResourceKind::User, user.id, AuditAction::Create);
        Ok(user)
    }

    pub fn update(&self, id: i64, input: &UserInput, actor: Option<i64>) -> RecordResult<User> {
        let input = normalise(input)?;
        let user = self.store.db.with_transaction(|tx| {
            let changed = tx
                .execute(
                    "UPDATE users SET name = ?1, role = ?2, email = ?3, mobile = ?4, is_active = ?5,
                     updated_at = ?6 WHERE id = ?7",
                    params![
                        input.name,
                        input.role.as_str(),
                        input.email,
                        input.mobile,
                        input.is_active,
                        Utc::now(),
                        id
                    ],
                )
                .map_err(email_taken)?;
            if changed == 0 {
                return Err(RecordError::not_found("user", id));
            }
            audit::record(tx, TABLE, id, AuditAction::Update, actor, None)?;
            find(tx, id)
        })?;

        self.store.changed(ResourceKind::User, id, AuditAction::Update);
        Ok(user)
    }

    /// Deletes the user. Records that referenced them keep existing with the reference cleared.
    pub fn delete(&self, id: i64, actor: Option<i64>) -> RecordResult<()> {
        self.store.db.with_transaction(|tx| {
            let deleted = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(RecordError::not_found("user", id));
            }
            // The deleting user may be the deleted one.
            let actor = actor.filter(|a| *a != id);
            audit::record(tx, TABLE, id, AuditAction::Delete, actor, None)
        })?;

        self.store.changed(ResourceKind::User, id, AuditAction::Delete);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_shared::Role;

    fn doctor(email: &str) -> UserInput {
        UserInput {
            name: "Dr. Meera Rao".into(),
            role: Role::Sr,
            email: email.into(),
            mobile: None,
            is_active: true,
        }
    }

    fn service() -> UserService {
        UserService::new(Database::open_in_memory().unwrap(), ChangeBus::new())
    }

    #[test]
    fn test_create_and_get_user() {
        let users = service();

        let created = users.create(&doctor("Meera@Hospital.org"), None).unwrap();
        let fetched = users.get(created.id).unwrap();

        assert_eq!(fetched.fields.email, "meera@hospital.org");
        assert_eq!(fetched.fields.role, Role::Sr);
    }

    #[test]
    fn test_duplicate_email_is_invalid_input() {
        let users = service();
        users.create(&doctor("a@hospital.org"), None).unwrap();

        let err = users.create(&doctor("A@hospital.org"), None).unwrap_err();

        assert!(matches!(err, RecordError::InvalidInput(_)));
    }

    #[test]
    fn test_update_missing_user_is_not_found() {
        let err = service()
            .update(99, &doctor("x@hospital.org"), None)
            .unwrap_err();
        assert!(matches!(err, RecordError::NotFound(msg) if msg == "user 99"));
    }

    #[test]
    fn test_list_is_paginated() {
        let users = service();
        for i in 0..3 {
            users.create(&doctor(&format!("d{i}@hospital.org")), None).unwrap();
        }

        let page = users.list(&PageRequest::new(Some(2), Some(2)).unwrap()).unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.pages, 2);
    }

    #[tokio::test]
    async fn test_delete_publishes_change() {
        let bus = ChangeBus::new();
        let users = UserService::new(Database::open_in_memory().unwrap(), bus.clone());
        let user = users.create(&doctor("gone@hospital.org"), None).unwrap();
        let mut sub = bus.subscribe_to(&[ResourceKind::User]);

        users.delete(user.id, None).unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.action, AuditAction::Delete);
        assert!(matches!(users.get(user.id), Err(RecordError::NotFound(_))));
    }
}
