use hono_core::types::ConversationState;
use hono_core::{truncate_chars, InboundEvent};
use hono_storage::{EmojiEntry, GroupProfile, GroupRecord, StoredMessage};

/// Emoji catalog entries listed in the prompt.
const MAX_PROMPT_EMOJI: usize = 30;

/// What the runtime knows about the chat an event arrived in.
#[derive(Debug, Default)]
pub struct ChatSnapshot {
    pub group: Option<GroupRecord>,
    pub profile: Option<GroupProfile>,
    /// Persisted messages before the triggering one, oldest first.
    pub history: Vec<StoredMessage>,
    pub emoji: Vec<EmojiEntry>,
}

pub struct ContextBuilder {
    system_prompt: String,
}

impl ContextBuilder {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            system_prompt: system_prompt.to_string(),
        }
    }

    pub fn build_system_prompt(&self, event: &InboundEvent, snapshot: &ChatSnapshot) -> String {
        let mut prompt = self.system_prompt.clone();

        if event.is_private {
            prompt.push_str(&format!("\n\nYou are in a private chat with {}.", event.author_label()));
        } else {
            let title = snapshot
                .group
                .as_ref()
                .map(|g| g.title.as_str())
                .or(event.chat_title.as_deref())
                .unwrap_or("a group");
            prompt.push_str(&format!("\n\nYou are in the group \"{}\" (id {}).", title, event.chat_id));
            if let Some(rules) = snapshot.group.as_ref().and_then(|g| g.rules.as_deref()) {
                prompt.push_str(&format!("\nGroup rules:\n{}", truncate_chars(rules, 500)));
            }
            if let Some(p) = snapshot.profile.as_ref().filter(|p| !p.is_empty()) {
                let notes: Vec<String> = [
                    ("Atmosphere", &p.atmosphere),
                    ("Topics", &p.topics),
                    ("Style", &p.style),
                    ("Key members", &p.key_members),
                    ("Notes", &p.notes),
                ]
                .into_iter()
                .filter_map(|(label, v)| v.as_deref().map(|v| format!("{}: {}", label, v)))
                .collect();
                prompt.push_str(&format!("\nWhat you know about this group:\n{}", notes.join("\n")));
            }
        }

        if !snapshot.emoji.is_empty() {
            let listed: Vec<String> = snapshot
                .emoji
                .iter()
                .take(MAX_PROMPT_EMOJI)
                .enumerate()
                .map(|(i, e)| format!("#{} {} - {}", i + 1, e.glyph, e.description))
                .collect();
            prompt.push_str(&format!(
                "\n\nCustom emoji you can use by writing their tag (e.g. #1):\n{}",
                listed.join("\n")
            ));
        }
        prompt
    }

    /// System prompt, then persisted context, then the triggering message as the user turn.
    pub fn build_state(&self, event: &InboundEvent, snapshot: &ChatSnapshot) -> ConversationState {
        let mut state = ConversationState::new(&self.build_system_prompt(event, snapshot));
        for m in snapshot.history.iter().filter(|m| m.message_id != event.message_id) {
            if m.outgoing {
                state.push_assistant_text(&m.text);
            } else {
                state.push_user(&format!("{}: {}", m.sender_name, m.text));
            }
        }
        state.push_user(&format!("{}: {}", event.author_label(), event.text));
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(id: i64, name: &str, text: &str, outgoing: bool) -> StoredMessage {
        StoredMessage {
            chat_id: -1,
            message_id: id,
            sender_id: if outgoing { None } else { Some(5) },
            sender_name: name.to_string(),
            text: text.to_string(),
            date: id,
            outgoing,
        }
    }

    #[test]
    fn test_state_orders_history_before_trigger() {
        let builder = ContextBuilder::new("persona");
        let event = InboundEvent::new(-1, 3, 5, "Ann", "and you?").with_title("Lounge");
        let snapshot = ChatSnapshot {
            history: vec![
                stored(1, "Ann", "how are you", false),
                stored(2, "me", "fine", true),
                stored(3, "Ann", "and you?", false),
            ],
            ..Default::default()
        };
        let state = builder.build_state(&event, &snapshot);
        let roles: Vec<&str> = state.turns().iter().map(|t| t.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(state.turns()[3].text(), "Ann: and you?");
        assert!(state.turns()[0].text().contains("\"Lounge\""));
    }

    #[test]
    fn test_prompt_lists_emoji_tags() {
        let builder = ContextBuilder::new("persona");
        let event = InboundEvent::new(7, 1, 7, "Ann", "hi").private();
        let snapshot = ChatSnapshot {
            emoji: vec![EmojiEntry {
                document_id: 99,
                glyph: "\u{1F525}".to_string(),
                description: "fire".to_string(),
            }],
            ..Default::default()
        };
        let prompt = builder.build_system_prompt(&event, &snapshot);
        assert!(prompt.contains("private chat with Ann"));
        assert!(prompt.contains("#1 \u{1F525} - fire"));
    }
}
