//! SQLite store implementation.

use crate::chat::{ChatSession, ChatSummary, DEFAULT_TITLE, Message, Role, session_title};
use crate::servers::{ImportReport, StoredServer, new_server_id};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use mcp::ServerConfig;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// SQLite-backed store for chats and tool-server configs.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                chat_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                PRIMARY KEY (chat_id, seq)
            );
            CREATE TABLE IF NOT EXISTS servers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                config TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chats_updated
                ON chats(updated_at);
            "#,
        )?;
        Ok(())
    }

    // ── chats ───────────────────────────────────────────────────────────────

    /// Insert or replace a chat and all of its messages.
    ///
    /// A blank or default title is replaced by one derived from the messages.
    pub fn save_chat(&self, mut chat: ChatSession) -> Result<ChatSession> {
        if chat.title.trim().is_empty() || chat.title == DEFAULT_TITLE {
            chat.title = session_title(&chat.messages);
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO chats (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET title = excluded.title, updated_at = excluded.updated_at",
            params![
                chat.id,
                chat.title,
                chat.created_at.timestamp_millis(),
                chat.updated_at.timestamp_millis(),
            ],
        )?;
        tx.execute("DELETE FROM messages WHERE chat_id = ?1", [&chat.id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO messages (chat_id, seq, id, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (seq, message) in chat.messages.iter().enumerate() {
                stmt.execute(params![
                    chat.id,
                    seq as i64,
                    message.id,
                    message.role.as_str(),
                    message.content,
                    message.timestamp.timestamp_millis(),
                ])?;
            }
        }
        tx.commit()?;

        debug!(chat = %chat.id, messages = chat.messages.len(), "saved chat");
        Ok(chat)
    }

    /// Load a chat with its messages in order.
    pub fn load_chat(&self, id: &str) -> Result<ChatSession> {
        let row = self
            .conn
            .query_row(
                "SELECT title, created_at, updated_at FROM chats WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((title, created_at, updated_at)) = row else {
            return Err(Error::chat(id));
        };

        let mut stmt = self.conn.prepare(
            "SELECT id, role, content, timestamp FROM messages
             WHERE chat_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map([id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let messages = rows
            .into_iter()
            .filter_map(|(msg_id, role, content, timestamp)| {
                let Some(role) = Role::parse(&role) else {
                    warn!(chat = %id, message = %msg_id, %role, "skipping message with unknown role");
                    return None;
                };
                Some(Message {
                    id: msg_id,
                    role,
                    content,
                    timestamp: from_millis(timestamp),
                })
            })
            .collect();

        Ok(ChatSession {
            id: id.to_string(),
            title,
            messages,
            created_at: from_millis(created_at),
            updated_at: from_millis(updated_at),
        })
    }

    /// List chats, most recently updated first.
    pub fn list_chats(&self, limit: Option<usize>) -> Result<Vec<ChatSummary>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.title, c.updated_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.chat_id = c.id)
             FROM chats c
             ORDER BY c.updated_at DESC, c.rowid DESC
             LIMIT ?1",
        )?;
        let summaries = stmt
            .query_map([limit], |row| {
                Ok(ChatSummary {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    updated_at: from_millis(row.get(2)?),
                    message_count: row.get::<_, i64>(3)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    /// Delete a chat and its messages.
    pub fn delete_chat(&self, id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM messages WHERE chat_id = ?1", [id])?;
        let removed = tx.execute("DELETE FROM chats WHERE id = ?1", [id])?;
        if removed == 0 {
            return Err(Error::chat(id));
        }
        tx.commit()?;
        Ok(())
    }

    // ── servers ─────────────────────────────────────────────────────────────

    /// Insert or update a server config. An empty id gets a fresh one.
    pub fn save_server(&self, mut config: ServerConfig) -> Result<StoredServer> {
        if config.id.trim().is_empty() {
            config.id = new_server_id();
        }
        upsert_server(&self.conn, &config, Utc::now())?;
        self.load_server(&config.id)
    }

    pub fn load_server(&self, id: &str) -> Result<StoredServer> {
        let row = self
            .conn
            .query_row(
                "SELECT config, created_at, updated_at FROM servers WHERE id = ?1",
                [id],
                server_row,
            )
            .optional()?;
        match row {
            Some(row) => decode_server(row),
            None => Err(Error::server(id)),
        }
    }

    /// All saved servers, oldest first.
    pub fn list_servers(&self) -> Result<Vec<StoredServer>> {
        let mut stmt = self.conn.prepare(
            "SELECT config, created_at, updated_at FROM servers ORDER BY created_at, rowid",
        )?;
        let rows = stmt
            .query_map([], server_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode_server).collect()
    }

    pub fn delete_server(&self, id: &str) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM servers WHERE id = ?1", [id])?;
        if removed == 0 {
            return Err(Error::server(id));
        }
        Ok(())
    }

    /// All saved servers as a pretty-printed JSON array.
    pub fn export_servers(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.list_servers()?)?)
    }

    /// Import a JSON array of server configs. Every accepted item gets a
    /// fresh id; rejected items are reported without aborting the batch.
    pub fn import_servers(&self, json: &str) -> Result<ImportReport> {
        let data: Value = match serde_json::from_str(json) {
            Ok(data) => data,
            Err(e) => return Ok(ImportReport::rejected(format!("Failed to parse JSON: {e}"))),
        };
        let Value::Array(items) = data else {
            return Ok(ImportReport::rejected("Invalid format: expected an array"));
        };

        let mut report = ImportReport::default();
        let now = Utc::now();
        let tx = self.conn.unchecked_transaction()?;
        for item in items {
            if !has_text(&item, "name") || !has_text(&item, "transportType") {
                report
                    .errors
                    .push("Invalid server config: missing required fields".to_string());
                continue;
            }
            match serde_json::from_value::<ServerConfig>(item) {
                Ok(mut config) => {
                    config.id = new_server_id();
                    upsert_server(&tx, &config, now)?;
                    report.imported += 1;
                }
                Err(e) => report.errors.push(format!("Failed to import server: {e}")),
            }
        }
        tx.commit()?;

        report.success = report.errors.is_empty();
        debug!(
            imported = report.imported,
            rejected = report.errors.len(),
            "imported servers"
        );
        Ok(report)
    }
}

type ServerRow = (String, i64, i64);

fn server_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServerRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn decode_server((config, created_at, updated_at): ServerRow) -> Result<StoredServer> {
    Ok(StoredServer {
        config: serde_json::from_str(&config)?,
        created_at: from_millis(created_at),
        updated_at: from_millis(updated_at),
    })
}

fn upsert_server(conn: &Connection, config: &ServerConfig, now: DateTime<Utc>) -> Result<()> {
    let now = now.timestamp_millis();
    conn.execute(
        "INSERT INTO servers (id, name, config, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name, config = excluded.config, updated_at = excluded.updated_at",
        params![config.id, config.name, serde_json::to_string(config)?, now],
    )?;
    Ok(())
}

fn has_text(item: &Value, field: &str) -> bool {
    item.get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
