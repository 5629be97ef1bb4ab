use async_trait::async_trait;
use hono_core::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::*;

fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::Storage(format!("{}: {}", context, e))
}

/// SQLite-backed [`Store`]. One connection shared behind a mutex; WAL enabled.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create db directory: {}", e)))?;
        }
        let conn = Connection::open(db_path).map_err(db_err("Failed to open db"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        let store = Self {
            inner: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        info!(path = %db_path.display(), "Store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("Failed to open db"))?;
        let store = Self {
            inner: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.inner
            .lock()
            .map_err(|e| Error::Storage(format!("Lock error: {}", e)))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS groups (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                handle TEXT,
                rules TEXT,
                staff TEXT,
                profile TEXT,
                joined_at INTEGER NOT NULL DEFAULT 0,
                last_activity INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS messages (
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                sender_id INTEGER,
                sender_name TEXT NOT NULL DEFAULT '',
                text TEXT NOT NULL,
                date INTEGER NOT NULL,
                outgoing INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (chat_id, message_id)
            );
            CREATE INDEX IF NOT EXISTS idx_messages_chat_date ON messages(chat_id, date);

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                handle TEXT,
                display_name TEXT NOT NULL DEFAULT '',
                last_seen INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_users_handle ON users(handle);

            CREATE TABLE IF NOT EXISTS user_facts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                category TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_user_facts_user ON user_facts(user_id);

            CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                due_at INTEGER NOT NULL,
                target TEXT,
                sent INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders(sent, due_at);

            CREATE TABLE IF NOT EXISTS emoji (
                position INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL UNIQUE,
                glyph TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT ''
            );
            ",
        )
        .map_err(db_err("Schema error"))?;
        Ok(())
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        chat_id: row.get("chat_id")?,
        message_id: row.get("message_id")?,
        sender_id: row.get("sender_id")?,
        sender_name: row.get("sender_name")?,
        text: row.get("text")?,
        date: row.get("date")?,
        outgoing: row.get::<_, i64>("outgoing")? != 0,
    })
}

fn reminder_from_row(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    Ok(Reminder {
        id: row.get("id")?,
        chat_id: row.get("chat_id")?,
        text: row.get("text")?,
        due_at: row.get("due_at")?,
        target: row.get("target")?,
        sent: row.get::<_, i64>("sent")? != 0,
        created_at: row.get("created_at")?,
    })
}

#[async_trait]
impl Directory for SqliteStore {
    async fn list_known_chats(&self) -> Result<Vec<KnownChat>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, title, handle, last_activity FROM groups ORDER BY last_activity DESC, id ASC")
            .map_err(db_err("Prepare error"))?;
        let rows = stmt
            .query_map([], |row| {
                let handle: Option<String> = row.get(2)?;
                Ok(KnownChat {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    handles: handle.into_iter().collect(),
                    last_activity: row.get(3)?,
                })
            })
            .map_err(db_err("Query error"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Row error"))
    }

    async fn list_known_users(&self) -> Result<Vec<KnownUser>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, display_name, handle, last_seen FROM users ORDER BY last_seen DESC, id ASC")
            .map_err(db_err("Prepare error"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(KnownUser {
                    id: row.get(0)?,
                    display_name: row.get(1)?,
                    handle: row.get(2)?,
                    last_seen: row.get(3)?,
                })
            })
            .map_err(db_err("Query error"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Row error"))
    }

    async fn user_last_seen(&self, user_id: i64) -> Result<Option<i64>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT last_seen FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err("Query error"))
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn as_directory(&self) -> &dyn Directory {
        self
    }

    async fn upsert_group(&self, id: i64, title: &str, handle: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        let now = now_ts();
        conn.execute(
            "INSERT INTO groups (id, title, handle, joined_at, last_activity)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                handle = COALESCE(excluded.handle, groups.handle),
                last_activity = excluded.last_activity",
            params![id, title, handle.map(|h| h.trim_start_matches('@')), now],
        )
        .map_err(db_err("Upsert error"))?;
        debug!(group_id = id, title, "Group upserted");
        Ok(())
    }

    async fn group(&self, id: i64) -> Result<Option<GroupRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, title, handle, rules, staff, joined_at, last_activity FROM groups WHERE id = ?1",
            params![id],
            |row| {
                Ok(GroupRecord {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    handle: row.get(2)?,
                    rules: row.get(3)?,
                    staff: row.get(4)?,
                    joined_at: row.get(5)?,
                    last_activity: row.get(6)?,
                })
            },
        )
        .optional()
        .map_err(db_err("Query error"))
    }

    async fn set_group_rules(&self, id: i64, rules: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO groups (id, rules) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET rules = excluded.rules",
            params![id, rules],
        )
        .map_err(db_err("Update error"))?;
        Ok(())
    }

    async fn set_group_staff(&self, id: i64, staff: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO groups (id, staff) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET staff = excluded.staff",
            params![id, staff],
        )
        .map_err(db_err("Update error"))?;
        Ok(())
    }

    async fn touch_group(&self, id: i64, at: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE groups SET last_activity = MAX(last_activity, ?2) WHERE id = ?1",
            params![id, at],
        )
        .map_err(db_err("Update error"))?;
        Ok(())
    }

    async fn group_profile(&self, id: i64) -> Result<Option<GroupProfile>> {
        let conn = self.conn()?;
        let raw: Option<Option<String>> = conn
            .query_row("SELECT profile FROM groups WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .map_err(db_err("Query error"))?;
        match raw.flatten() {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn update_group_profile(&self, id: i64, patch: &GroupProfile) -> Result<()> {
        let conn = self.conn()?;
        let current: Option<String> = conn
            .query_row("SELECT profile FROM groups WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .map_err(db_err("Query error"))?
            .flatten();
        let mut profile: GroupProfile = match current {
            Some(json) => serde_json::from_str(&json)?,
            None => GroupProfile::default(),
        };
        profile.merge(patch);
        let json = serde_json::to_string(&profile)?;
        conn.execute(
            "INSERT INTO groups (id, profile) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET profile = excluded.profile",
            params![id, json],
        )
        .map_err(db_err("Update error"))?;
        Ok(())
    }

    async fn record_message(&self, message: &StoredMessage) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO messages (chat_id, message_id, sender_id, sender_name, text, date, outgoing)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.chat_id,
                message.message_id,
                message.sender_id,
                message.sender_name,
                message.text,
                message.date,
                message.outgoing as i64
            ],
        )
        .map_err(db_err("Insert error"))?;
        conn.execute(
            "UPDATE groups SET last_activity = MAX(last_activity, ?2) WHERE id = ?1",
            params![message.chat_id, message.date],
        )
        .map_err(db_err("Update error"))?;
        Ok(())
    }

    async fn recent_messages(&self, chat_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM messages WHERE chat_id = ?1
                 ORDER BY date DESC, message_id DESC LIMIT ?2",
            )
            .map_err(db_err("Prepare error"))?;
        let rows = stmt
            .query_map(params![chat_id, limit as i64], message_from_row)
            .map_err(db_err("Query error"))?;
        let mut messages = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Row error"))?;
        messages.reverse();
        Ok(messages)
    }

    async fn search_messages(&self, chat_id: i64, query: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        // SQLite's LIKE only folds ASCII, so matching happens here.
        let needle = query.to_lowercase();
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM messages WHERE chat_id = ?1 ORDER BY date DESC, message_id DESC")
            .map_err(db_err("Prepare error"))?;
        let rows = stmt
            .query_map(params![chat_id], message_from_row)
            .map_err(db_err("Query error"))?;
        let mut hits = Vec::new();
        for row in rows {
            let message = row.map_err(db_err("Row error"))?;
            if message.text.to_lowercase().contains(&needle) {
                hits.push(message);
                if hits.len() >= limit {
                    break;
                }
            }
        }
        Ok(hits)
    }

    async fn touch_user(&self, id: i64, handle: Option<&str>, display_name: &str, at: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (id, handle, display_name, last_seen) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                handle = COALESCE(excluded.handle, users.handle),
                display_name = excluded.display_name,
                last_seen = MAX(users.last_seen, excluded.last_seen)",
            params![id, handle.map(|h| h.trim_start_matches('@')), display_name, at],
        )
        .map_err(db_err("Upsert error"))?;
        Ok(())
    }

    async fn user_profile(&self, id: i64) -> Result<Option<UserProfile>> {
        let conn = self.conn()?;
        let base = conn
            .query_row(
                "SELECT id, display_name, handle, last_seen FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(UserProfile {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        handle: row.get(2)?,
                        last_seen: row.get(3)?,
                        facts: Vec::new(),
                    })
                },
            )
            .optional()
            .map_err(db_err("Query error"))?;
        let Some(mut profile) = base else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare("SELECT category, text, created_at FROM user_facts WHERE user_id = ?1 ORDER BY id ASC")
            .map_err(db_err("Prepare error"))?;
        let rows = stmt
            .query_map(params![id], |row| {
                let category: String = row.get(0)?;
                Ok(UserFact {
                    category: FactCategory::parse(&category).unwrap_or(FactCategory::Fact),
                    text: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .map_err(db_err("Query error"))?;
        profile.facts = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Row error"))?;
        Ok(Some(profile))
    }

    async fn add_user_fact(&self, id: i64, category: FactCategory, text: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_facts (user_id, category, text, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, category.as_str(), text, now_ts()],
        )
        .map_err(db_err("Insert error"))?;
        debug!(user_id = id, category = category.as_str(), "User fact stored");
        Ok(())
    }

    async fn add_reminder(&self, reminder: &NewReminder) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO reminders (chat_id, text, due_at, target, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![reminder.chat_id, reminder.text, reminder.due_at, reminder.target, now_ts()],
        )
        .map_err(db_err("Insert error"))?;
        let id = conn.last_insert_rowid();
        debug!(reminder_id = id, chat_id = reminder.chat_id, due_at = reminder.due_at, "Reminder stored");
        Ok(id)
    }

    async fn due_reminders(&self, now: i64) -> Result<Vec<Reminder>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM reminders WHERE sent = 0 AND due_at <= ?1 ORDER BY due_at ASC, id ASC")
            .map_err(db_err("Prepare error"))?;
        let rows = stmt
            .query_map(params![now], reminder_from_row)
            .map_err(db_err("Query error"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Row error"))
    }

    async fn mark_reminder_sent(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE reminders SET sent = 1 WHERE id = ?1", params![id])
            .map_err(db_err("Update error"))?;
        Ok(())
    }

    async fn list_reminders(&self) -> Result<Vec<Reminder>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM reminders ORDER BY due_at ASC, id ASC")
            .map_err(db_err("Prepare error"))?;
        let rows = stmt
            .query_map([], reminder_from_row)
            .map_err(db_err("Query error"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Row error"))
    }

    async fn add_emoji(&self, glyph: &str, document_id: i64, description: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO emoji (document_id, glyph, description) VALUES (?1, ?2, ?3)
             ON CONFLICT(document_id) DO UPDATE SET glyph = excluded.glyph, description = excluded.description",
            params![document_id, glyph, description],
        )
        .map_err(db_err("Insert error"))?;
        Ok(())
    }

    async fn emoji_catalog(&self) -> Result<Vec<EmojiEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT document_id, glyph, description FROM emoji ORDER BY position ASC")
            .map_err(db_err("Prepare error"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(EmojiEntry {
                    document_id: row.get(0)?,
                    glyph: row.get(1)?,
                    description: row.get(2)?,
                })
            })
            .map_err(db_err("Query error"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Row error"))
    }

    async fn remove_emoji(&self, document_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn
            .execute("DELETE FROM emoji WHERE document_id = ?1", params![document_id])
            .map_err(db_err("Delete error"))?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("data").join("hono.db")).unwrap();
        (store, dir)
    }

    fn msg(chat_id: i64, id: i64, text: &str) -> StoredMessage {
        StoredMessage {
            chat_id,
            message_id: id,
            sender_id: Some(7),
            sender_name: "Ann".to_string(),
            text: text.to_string(),
            date: 1_000 + id,
            outgoing: false,
        }
    }

    #[tokio::test]
    async fn test_groups_and_directory_order() {
        let (store, _dir) = test_store();
        store.upsert_group(1, "Old", Some("@old_chat")).await.unwrap();
        store.upsert_group(2, "New", None).await.unwrap();
        store.touch_group(1, 10).await.unwrap();
        store.touch_group(2, now_ts() + 100).await.unwrap();

        let chats = store.list_known_chats().await.unwrap();
        assert_eq!(chats[0].id, 2);
        assert_eq!(chats[1].handles, vec!["old_chat".to_string()]);
    }

    #[tokio::test]
    async fn test_rules_staff_and_profile() {
        let (store, _dir) = test_store();
        store.upsert_group(5, "Test", None).await.unwrap();
        store.set_group_rules(5, "no spam").await.unwrap();
        store.set_group_staff(5, "admin: @bob").await.unwrap();
        store
            .update_group_profile(5, &GroupProfile {
                atmosphere: Some("friendly".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .update_group_profile(5, &GroupProfile {
                notes: Some("pinned: hi".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let group = store.group(5).await.unwrap().unwrap();
        assert_eq!(group.title, "Test");
        assert_eq!(group.rules.as_deref(), Some("no spam"));
        assert_eq!(group.staff.as_deref(), Some("admin: @bob"));
        let profile = store.group_profile(5).await.unwrap().unwrap();
        assert_eq!(profile.atmosphere.as_deref(), Some("friendly"));
        assert_eq!(profile.notes.as_deref(), Some("pinned: hi"));
        assert!(store.group_profile(6).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_messages_recent_and_search() {
        let (store, _dir) = test_store();
        for (id, text) in [(1, "Привет всем"), (2, "how are you"), (3, "ПРИВЕТ снова")] {
            store.record_message(&msg(-10, id, text)).await.unwrap();
        }
        store.record_message(&msg(-11, 4, "привет other chat")).await.unwrap();

        let recent = store.recent_messages(-10, 2).await.unwrap();
        assert_eq!(recent.iter().map(|m| m.message_id).collect::<Vec<_>>(), vec![2, 3]);

        let hits = store.search_messages(-10, "привет", 10).await.unwrap();
        assert_eq!(hits.iter().map(|m| m.message_id).collect::<Vec<_>>(), vec![3, 1]);
    }

    #[tokio::test]
    async fn test_users_and_facts() {
        let (store, _dir) = test_store();
        store.touch_user(7, Some("@ann"), "Ann", 100).await.unwrap();
        store.touch_user(7, None, "Ann B", 50).await.unwrap();
        store.add_user_fact(7, FactCategory::Interest, "likes tea").await.unwrap();

        assert_eq!(store.user_last_seen(7).await.unwrap(), Some(100));
        assert_eq!(store.user_last_seen(8).await.unwrap(), None);
        let profile = store.user_profile(7).await.unwrap().unwrap();
        assert_eq!(profile.handle.as_deref(), Some("ann"));
        assert_eq!(profile.display_name, "Ann B");
        assert_eq!(profile.facts.len(), 1);
        assert_eq!(profile.facts[0].category, FactCategory::Interest);
    }

    #[tokio::test]
    async fn test_reminders_due_and_sent() {
        let (store, _dir) = test_store();
        let early = store
            .add_reminder(&NewReminder {
                chat_id: 1,
                text: "drink water".into(),
                due_at: 100,
                target: None,
            })
            .await
            .unwrap();
        store
            .add_reminder(&NewReminder {
                chat_id: 1,
                text: "later".into(),
                due_at: 500,
                target: Some("@ann".into()),
            })
            .await
            .unwrap();

        let due = store.due_reminders(200).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, early);
        store.mark_reminder_sent(early).await.unwrap();
        assert!(store.due_reminders(200).await.unwrap().is_empty());
        assert_eq!(store.list_reminders().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_emoji_catalog_keeps_insertion_order() {
        let (store, _dir) = test_store();
        store.add_emoji("★", 11, "star").await.unwrap();
        store.add_emoji("❤", 22, "heart").await.unwrap();
        store.add_emoji("✦", 11, "star v2").await.unwrap();

        let catalog = store.emoji_catalog().await.unwrap();
        assert_eq!(catalog.iter().map(|e| e.document_id).collect::<Vec<_>>(), vec![11, 22]);
        assert_eq!(catalog[0].glyph, "✦");
        assert!(store.remove_emoji(11).await.unwrap());
        assert!(!store.remove_emoji(11).await.unwrap());
    }
}
