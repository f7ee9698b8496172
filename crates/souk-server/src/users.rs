//! User profiles and recorded interactions (orders and issue claims).
//!
//! Interactions share one table; the public claim id carries a kind prefix
//! ("ord" for orders, "iss" for issues) over the row id.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use souk_contracts::{ClaimReceipt, IssueCategory, UserProfile};

pub struct UserStore {
    conn: Connection,
}

impl UserStore {
    pub fn new(path: &str) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                counterparty_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                address TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS interactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                counterparty_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                details_json TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| e.to_string())?;
        Ok(Self { conn })
    }

    pub fn get_or_create(
        &mut self,
        counterparty_id: &str,
        display_name: &str,
    ) -> Result<UserProfile, String> {
        let existing: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT name, address FROM users WHERE counterparty_id = ?1",
                params![counterparty_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| e.to_string())?;

        if let Some((name, address)) = existing {
            return Ok(UserProfile { name, address });
        }

        self.conn
            .execute(
                "INSERT INTO users(counterparty_id, name, address, created_at) VALUES (?1, ?2, NULL, ?3)",
                params![counterparty_id, display_name, Utc::now().to_rfc3339()],
            )
            .map_err(|e| e.to_string())?;
        Ok(UserProfile {
            name: display_name.to_string(),
            address: None,
        })
    }

    pub fn update_address(&mut self, counterparty_id: &str, address: &str) -> Result<(), String> {
        let updated = self
            .conn
            .execute(
                "UPDATE users SET address = ?2 WHERE counterparty_id = ?1",
                params![counterparty_id, address],
            )
            .map_err(|e| e.to_string())?;
        if updated == 0 {
            return Err(format!("unknown counterparty {counterparty_id}"));
        }
        Ok(())
    }

    /// Record a placed order; the returned claim id is "ord{row}".
    pub fn record_order(
        &mut self,
        counterparty_id: &str,
        order_id: &str,
        items: &[String],
    ) -> Result<ClaimReceipt, String> {
        let details = serde_json::json!({ "order_id": order_id, "items": items });
        self.record_interaction(counterparty_id, "order", &details, "pending")
            .map(|row| ClaimReceipt {
                claim_id: format!("ord{row}"),
            })
    }

    /// Record a reported issue; the returned claim id is "iss{row}".
    pub fn record_issue(
        &mut self,
        counterparty_id: &str,
        product: &str,
        description: &str,
        category: IssueCategory,
    ) -> Result<ClaimReceipt, String> {
        let details = serde_json::json!({
            "product": product,
            "description": description,
            "category": category.as_str(),
        });
        self.record_interaction(counterparty_id, "issue", &details, "pending")
            .map(|row| ClaimReceipt {
                claim_id: format!("iss{row}"),
            })
    }

    fn record_interaction(
        &mut self,
        counterparty_id: &str,
        kind: &str,
        details: &serde_json::Value,
        status: &str,
    ) -> Result<i64, String> {
        let details_json = serde_json::to_string(details).map_err(|e| e.to_string())?;
        self.conn
            .execute(
                "
                INSERT INTO interactions(counterparty_id, kind, details_json, status, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![
                    counterparty_id,
                    kind,
                    details_json,
                    status,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|e| e.to_string())?;
        Ok(self.conn.last_insert_rowid())
    }
}
