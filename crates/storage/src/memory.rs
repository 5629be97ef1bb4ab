use async_trait::async_trait;
use hono_core::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::*;

#[derive(Default)]
struct Tables {
    groups: BTreeMap<i64, GroupRecord>,
    profiles: HashMap<i64, GroupProfile>,
    messages: Vec<StoredMessage>,
    users: BTreeMap<i64, KnownUser>,
    facts: HashMap<i64, Vec<UserFact>>,
    reminders: Vec<Reminder>,
    emoji: Vec<EmojiEntry>,
}

/// Map-backed [`Store`] for tests and dry runs. Counts every trait call.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    calls: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total trait calls, reads and writes.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn read(&self) -> MutexGuard<'_, Tables> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> MutexGuard<'_, Tables> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.read()
    }

    /// Seeds a known chat without counting it as a call.
    pub fn seed_chat(&self, id: i64, title: &str, handle: Option<&str>, last_activity: i64) {
        let mut t = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        t.groups.insert(id, GroupRecord {
            id,
            title: title.to_string(),
            handle: handle.map(|h| h.trim_start_matches('@').to_string()),
            rules: None,
            staff: None,
            joined_at: last_activity,
            last_activity,
        });
    }

    /// Seeds a known user without counting it as a call.
    pub fn seed_user(&self, id: i64, name: &str, handle: Option<&str>, last_seen: i64) {
        let mut t = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        t.users.insert(id, KnownUser {
            id,
            display_name: name.to_string(),
            handle: handle.map(|h| h.trim_start_matches('@').to_string()),
            last_seen,
        });
    }

    /// Seeds a persisted message without counting it as a call.
    pub fn seed_message(&self, message: StoredMessage) {
        let mut t = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        t.messages.push(message);
    }
}

fn group_entry(t: &mut Tables, id: i64) -> &mut GroupRecord {
    t.groups.entry(id).or_insert_with(|| GroupRecord {
        id,
        title: String::new(),
        handle: None,
        rules: None,
        staff: None,
        joined_at: 0,
        last_activity: 0,
    })
}

fn chat_messages(t: &Tables, chat_id: i64) -> Vec<StoredMessage> {
    let mut list: Vec<StoredMessage> = t
        .messages
        .iter()
        .filter(|m| m.chat_id == chat_id)
        .cloned()
        .collect();
    list.sort_by_key(|m| (m.date, m.message_id));
    list
}

#[async_trait]
impl Directory for InMemoryStore {
    async fn list_known_chats(&self) -> Result<Vec<KnownChat>> {
        let t = self.read();
        let mut chats: Vec<KnownChat> = t
            .groups
            .values()
            .map(|g| KnownChat {
                id: g.id,
                title: g.title.clone(),
                handles: g.handle.iter().cloned().collect(),
                last_activity: g.last_activity,
            })
            .collect();
        chats.sort_by(|a, b| b.last_activity.cmp(&a.last_activity).then(a.id.cmp(&b.id)));
        Ok(chats)
    }

    async fn list_known_users(&self) -> Result<Vec<KnownUser>> {
        let t = self.read();
        let mut users: Vec<KnownUser> = t.users.values().cloned().collect();
        users.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn user_last_seen(&self, user_id: i64) -> Result<Option<i64>> {
        Ok(self.read().users.get(&user_id).map(|u| u.last_seen))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn as_directory(&self) -> &dyn Directory {
        self
    }

    async fn upsert_group(&self, id: i64, title: &str, handle: Option<&str>) -> Result<()> {
        let mut t = self.write();
        let now = now_ts();
        let group = group_entry(&mut t, id);
        group.title = title.to_string();
        if let Some(h) = handle {
            group.handle = Some(h.trim_start_matches('@').to_string());
        }
        if group.joined_at == 0 {
            group.joined_at = now;
        }
        group.last_activity = now;
        Ok(())
    }

    async fn group(&self, id: i64) -> Result<Option<GroupRecord>> {
        Ok(self.read().groups.get(&id).cloned())
    }

    async fn set_group_rules(&self, id: i64, rules: &str) -> Result<()> {
        let mut t = self.write();
        group_entry(&mut t, id).rules = Some(rules.to_string());
        Ok(())
    }

    async fn set_group_staff(&self, id: i64, staff: &str) -> Result<()> {
        let mut t = self.write();
        group_entry(&mut t, id).staff = Some(staff.to_string());
        Ok(())
    }

    async fn touch_group(&self, id: i64, at: i64) -> Result<()> {
        let mut t = self.write();
        if let Some(group) = t.groups.get_mut(&id) {
            group.last_activity = group.last_activity.max(at);
        }
        Ok(())
    }

    async fn group_profile(&self, id: i64) -> Result<Option<GroupProfile>> {
        Ok(self.read().profiles.get(&id).cloned())
    }

    async fn update_group_profile(&self, id: i64, patch: &GroupProfile) -> Result<()> {
        let mut t = self.write();
        t.profiles.entry(id).or_default().merge(patch);
        Ok(())
    }

    async fn record_message(&self, message: &StoredMessage) -> Result<()> {
        let mut t = self.write();
        t.messages
            .retain(|m| !(m.chat_id == message.chat_id && m.message_id == message.message_id));
        t.messages.push(message.clone());
        if let Some(group) = t.groups.get_mut(&message.chat_id) {
            group.last_activity = group.last_activity.max(message.date);
        }
        Ok(())
    }

    async fn recent_messages(&self, chat_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let t = self.read();
        let list = chat_messages(&t, chat_id);
        let skip = list.len().saturating_sub(limit);
        Ok(list.into_iter().skip(skip).collect())
    }

    async fn search_messages(&self, chat_id: i64, query: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let t = self.read();
        let needle = query.to_lowercase();
        Ok(chat_messages(&t, chat_id)
            .into_iter()
            .rev()
            .filter(|m| m.text.to_lowercase().contains(&needle))
            .take(limit)
            .collect())
    }

    async fn touch_user(&self, id: i64, handle: Option<&str>, display_name: &str, at: i64) -> Result<()> {
        let mut t = self.write();
        let user = t.users.entry(id).or_insert_with(|| KnownUser {
            id,
            display_name: String::new(),
            handle: None,
            last_seen: 0,
        });
        user.display_name = display_name.to_string();
        if let Some(h) = handle {
            user.handle = Some(h.trim_start_matches('@').to_string());
        }
        user.last_seen = user.last_seen.max(at);
        Ok(())
    }

    async fn user_profile(&self, id: i64) -> Result<Option<UserProfile>> {
        let t = self.read();
        Ok(t.users.get(&id).map(|u| UserProfile {
            id: u.id,
            display_name: u.display_name.clone(),
            handle: u.handle.clone(),
            last_seen: u.last_seen,
            facts: t.facts.get(&id).cloned().unwrap_or_default(),
        }))
    }

    async fn add_user_fact(&self, id: i64, category: FactCategory, text: &str) -> Result<()> {
        let mut t = self.write();
        t.facts.entry(id).or_default().push(UserFact {
            category,
            text: text.to_string(),
            created_at: now_ts(),
        });
        Ok(())
    }

    async fn add_reminder(&self, reminder: &NewReminder) -> Result<i64> {
        let mut t = self.write();
        let id = t.reminders.len() as i64 + 1;
        t.reminders.push(Reminder {
            id,
            chat_id: reminder.chat_id,
            text: reminder.text.clone(),
            due_at: reminder.due_at,
            target: reminder.target.clone(),
            sent: false,
            created_at: now_ts(),
        });
        Ok(id)
    }

    async fn due_reminders(&self, now: i64) -> Result<Vec<Reminder>> {
        let t = self.read();
        let mut due: Vec<Reminder> = t
            .reminders
            .iter()
            .filter(|r| !r.sent && r.due_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|r| (r.due_at, r.id));
        Ok(due)
    }

    async fn mark_reminder_sent(&self, id: i64) -> Result<()> {
        let mut t = self.write();
        if let Some(r) = t.reminders.iter_mut().find(|r| r.id == id) {
            r.sent = true;
        }
        Ok(())
    }

    async fn list_reminders(&self) -> Result<Vec<Reminder>> {
        let t = self.read();
        let mut all = t.reminders.clone();
        all.sort_by_key(|r| (r.due_at, r.id));
        Ok(all)
    }

    async fn add_emoji(&self, glyph: &str, document_id: i64, description: &str) -> Result<()> {
        let mut t = self.write();
        match t.emoji.iter_mut().find(|e| e.document_id == document_id) {
            Some(entry) => {
                entry.glyph = glyph.to_string();
                entry.description = description.to_string();
            }
            None => t.emoji.push(EmojiEntry {
                document_id,
                glyph: glyph.to_string(),
                description: description.to_string(),
            }),
        }
        Ok(())
    }

    async fn emoji_catalog(&self) -> Result<Vec<EmojiEntry>> {
        Ok(self.read().emoji.clone())
    }

    async fn remove_emoji(&self, document_id: i64) -> Result<bool> {
        let mut t = self.write();
        let before = t.emoji.len();
        t.emoji.retain(|e| e.document_id != document_id);
        Ok(t.emoji.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_calls_and_writes() {
        let store = InMemoryStore::new();
        store.seed_chat(555, "Test", None, 100);
        assert_eq!(store.call_count(), 0);

        let chats = store.list_known_chats().await.unwrap();
        assert_eq!(chats[0].id, 555);
        store.set_group_rules(555, "be nice").await.unwrap();
        assert_eq!(store.call_count(), 2);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_recent_messages_oldest_first() {
        let store = InMemoryStore::new();
        for id in 1..=5 {
            store
                .record_message(&StoredMessage {
                    chat_id: 1,
                    message_id: id,
                    sender_id: None,
                    sender_name: "x".into(),
                    text: format!("m{}", id),
                    date: id,
                    outgoing: false,
                })
                .await
                .unwrap();
        }
        let recent = store.recent_messages(1, 2).await.unwrap();
        assert_eq!(recent.iter().map(|m| m.message_id).collect::<Vec<_>>(), vec![4, 5]);
    }
}
