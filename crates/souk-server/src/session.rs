//! Conversation session storage and per-counterparty turn serialization.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use souk_contracts::ConversationState;
use tokio::sync::Mutex;

pub enum SessionBackend {
    Memory(HashMap<String, ConversationState>),
    Sqlite(SqliteSessions),
}

impl SessionBackend {
    pub fn from_config(cfg: &souk_config::SessionStore) -> Result<Self, String> {
        if cfg.kind == "sqlite" {
            let path = cfg
                .sqlite_path
                .clone()
                .ok_or_else(|| "session_store.sqlite_path is required for sqlite".to_string())?;
            Ok(SessionBackend::Sqlite(SqliteSessions::new(&path)?))
        } else {
            Ok(SessionBackend::Memory(HashMap::new()))
        }
    }

    /// A counterparty with no stored session starts from the default state.
    pub fn get(&self, counterparty_id: &str) -> ConversationState {
        match self {
            SessionBackend::Memory(sessions) => {
                sessions.get(counterparty_id).cloned().unwrap_or_default()
            }
            SessionBackend::Sqlite(sessions) => sessions
                .get(counterparty_id)
                .ok()
                .flatten()
                .unwrap_or_default(),
        }
    }

    pub fn save(&mut self, counterparty_id: &str, state: &ConversationState) -> Result<(), String> {
        match self {
            SessionBackend::Memory(sessions) => {
                sessions.insert(counterparty_id.to_string(), state.clone());
                Ok(())
            }
            SessionBackend::Sqlite(sessions) => sessions.save(counterparty_id, state),
        }
    }
}

pub struct SqliteSessions {
    conn: Connection,
}

impl SqliteSessions {
    pub fn new(path: &str) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                counterparty_id TEXT PRIMARY KEY,
                state_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| e.to_string())?;
        Ok(Self { conn })
    }

    fn get(&self, counterparty_id: &str) -> Result<Option<ConversationState>, String> {
        let state_json: Option<String> = self
            .conn
            .query_row(
                "SELECT state_json FROM sessions WHERE counterparty_id = ?1",
                params![counterparty_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| e.to_string())?;
        match state_json {
            Some(v) => {
                let state: ConversationState =
                    serde_json::from_str(&v).map_err(|e| e.to_string())?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    fn save(&mut self, counterparty_id: &str, state: &ConversationState) -> Result<(), String> {
        let json = serde_json::to_string(state).map_err(|e| e.to_string())?;
        self.conn
            .execute(
                "
                INSERT INTO sessions(counterparty_id, state_json, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(counterparty_id) DO UPDATE SET
                    state_json=excluded.state_json,
                    updated_at=excluded.updated_at
                ",
                params![counterparty_id, json, Utc::now().to_rfc3339()],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// One lock per counterparty so concurrent webhook deliveries for the same
/// conversation are serialized while distinct conversations proceed freely.
#[derive(Default)]
pub struct TurnLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TurnLocks {
    pub async fn acquire(&self, counterparty_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.lock().await;
        locks
            .entry(counterparty_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
