//! SQLite-backed conversation store: one row per owner phone number plus an
//! append-only message log with the tool audit trail.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::Mutex;

use crate::models::{Conversation, MessageRole, StoredMessage};

pub struct ConversationStore {
    conn: Mutex<Connection>,
}

impl ConversationStore {
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        // Create parent directory if it doesn't exist
        if database_url != ":memory:" {
            if let Some(parent) = Path::new(database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).ok();
                }
            }
        }

        let conn = Connection::open(database_url)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                phone TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                name TEXT,
                email TEXT,
                interactions INTEGER NOT NULL DEFAULT 0,
                blocked INTEGER NOT NULL DEFAULT 0,
                pending_run_id TEXT,
                last_run_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phone TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                tools_invoked TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    pub fn get(&self, phone: &str) -> SqliteResult<Option<Conversation>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT phone, thread_id, name, email, interactions, blocked,
             pending_run_id, last_run_id, created_at, updated_at
             FROM conversations WHERE phone = ?1",
        )?;

        let conversation = stmt.query_row([phone], Self::row_to_conversation).ok();

        Ok(conversation)
    }

    pub fn create(
        &self,
        phone: &str,
        thread_id: &str,
        name: Option<&str>,
    ) -> SqliteResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO conversations (phone, thread_id, name, interactions, blocked,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, 0, ?4, ?4)",
            params![phone, thread_id, name, &now],
        )?;
        drop(conn);

        self.get(phone).map(|opt| opt.expect("conversation just inserted"))
    }

    pub fn update_profile(
        &self,
        phone: &str,
        name: Option<&str>,
        email: Option<&str>,
    ) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        if let Some(name) = name {
            conn.execute(
                "UPDATE conversations SET name = ?1, updated_at = ?2 WHERE phone = ?3",
                params![name, &now, phone],
            )?;
        }
        if let Some(email) = email {
            conn.execute(
                "UPDATE conversations SET email = ?1, updated_at = ?2 WHERE phone = ?3",
                params![email, &now, phone],
            )?;
        }
        Ok(())
    }

    /// Reset a conversation: assign the freshly minted thread id, zero the
    /// interaction counter, clear the blocked/pending state and delete the
    /// message history.
    pub fn reset(&self, phone: &str, new_thread_id: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE conversations SET thread_id = ?1, interactions = 0, blocked = 0,
             pending_run_id = NULL, updated_at = ?2 WHERE phone = ?3",
            params![new_thread_id, &now, phone],
        )?;
        conn.execute("DELETE FROM messages WHERE phone = ?1", [phone])?;

        Ok(())
    }

    /// Record the run currently in flight for this conversation. A pending
    /// run id still present when the next message arrives marks the
    /// conversation as blocked.
    pub fn set_pending_run(&self, phone: &str, run_id: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE conversations SET pending_run_id = ?1, last_run_id = ?1, updated_at = ?2
             WHERE phone = ?3",
            params![run_id, &now, phone],
        )?;
        Ok(())
    }

    pub fn clear_pending_run(&self, phone: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE conversations SET pending_run_id = NULL, blocked = 0, updated_at = ?1
             WHERE phone = ?2",
            params![&now, phone],
        )?;
        Ok(())
    }

    pub fn set_blocked(&self, phone: &str, blocked: bool) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE conversations SET blocked = ?1, updated_at = ?2 WHERE phone = ?3",
            params![blocked as i64, &now, phone],
        )?;
        Ok(())
    }

    /// Append a message to the log and bump the conversation's interaction
    /// counter. `tools_invoked` carries the audit labels for assistant
    /// messages and is empty otherwise.
    pub fn append_message(
        &self,
        phone: &str,
        role: MessageRole,
        content: &str,
        tools_invoked: &[String],
    ) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let tools_json = serde_json::to_string(tools_invoked).unwrap_or_else(|_| "[]".to_string());

        conn.execute(
            "INSERT INTO messages (phone, role, content, tools_invoked, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![phone, role.as_str(), content, &tools_json, &now],
        )?;
        conn.execute(
            "UPDATE conversations SET interactions = interactions + 1, updated_at = ?1
             WHERE phone = ?2",
            params![&now, phone],
        )?;

        Ok(())
    }

    pub fn messages(&self, phone: &str) -> SqliteResult<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, phone, role, content, tools_invoked, created_at
             FROM messages WHERE phone = ?1 ORDER BY id ASC",
        )?;

        let messages = stmt
            .query_map([phone], Self::row_to_message)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(messages)
    }

    /// Plain-text transcript of the most recent messages, oldest first.
    /// Used as the conversation excerpt attached to CRM leads.
    pub fn transcript(&self, phone: &str, max_messages: usize) -> SqliteResult<String> {
        let messages = self.messages(phone)?;
        let start = messages.len().saturating_sub(max_messages);

        let transcript = messages[start..]
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(transcript)
    }

    fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;
        let blocked: i64 = row.get(5)?;

        Ok(Conversation {
            phone: row.get(0)?,
            thread_id: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            interactions: row.get(4)?,
            blocked: blocked != 0,
            pending_run_id: row.get(6)?,
            last_run_id: row.get(7)?,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
        let role: String = row.get(2)?;
        let tools_json: Option<String> = row.get(4)?;
        let created_at: String = row.get(5)?;

        Ok(StoredMessage {
            id: row.get(0)?,
            phone: row.get(1)?,
            role: MessageRole::from_str(&role).unwrap_or(MessageRole::User),
            content: row.get(3)?,
            tools_invoked: tools_json
                .and_then(|t| serde_json::from_str(&t).ok())
                .unwrap_or_default(),
            created_at: parse_timestamp(&created_at),
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
