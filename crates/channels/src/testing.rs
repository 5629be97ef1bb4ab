//! Scriptable in-memory [`Transport`] used by tests across the workspace.
//!
//! Every trait call is recorded by method name. A method scripted with [`FakeTransport::fail`]
//! returns that error on every call.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::transport::*;

#[derive(Default)]
struct FakeState {
    by_handle: HashMap<String, Peer>,
    by_id: HashMap<i64, Peer>,
    invites: HashMap<String, InvitePreview>,
    members: HashSet<i64>,
    /// Per chat, ascending by id.
    messages: HashMap<i64, Vec<PlatformMessage>>,
    pinned: HashMap<i64, Vec<PlatformMessage>>,
    full_users: HashMap<i64, FullUser>,
    dm_history: HashSet<i64>,
    participants: HashMap<i64, Vec<Peer>>,
    common: HashMap<i64, Vec<Peer>>,
    bot_replies: HashMap<String, (Peer, String)>,
    failures: HashMap<String, TransportError>,
    calls: Vec<String>,
    sent: Vec<(i64, OutgoingMessage)>,
    reactions: Vec<(i64, i64, i64)>,
    deleted: Vec<(i64, i64)>,
    forwarded: Vec<(i64, i64, i64)>,
    clicks: Vec<(i64, i64, usize)>,
    contacts: HashSet<i64>,
    left: Vec<i64>,
    next_id: i64,
}

pub struct FakeTransport {
    state: Mutex<FakeState>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 10_000,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, method: &str) -> TransportResult<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.calls.push(method.to_string());
        if let Some(err) = state.failures.get(method).cloned() {
            return Err(err);
        }
        Ok(state)
    }

    pub fn with_peer(self, peer: Peer) -> Self {
        {
            let mut state = self.state();
            if let Some(handle) = &peer.handle {
                state.by_handle.insert(handle.to_lowercase(), peer.clone());
            }
            state.by_id.insert(peer.id, peer);
        }
        self
    }

    pub fn with_invite(self, hash: &str, preview: InvitePreview) -> Self {
        self.state().invites.insert(hash.to_string(), preview);
        self
    }

    pub fn with_member(self, chat_id: i64) -> Self {
        self.state().members.insert(chat_id);
        self
    }

    pub fn with_message(self, message: PlatformMessage) -> Self {
        {
            let mut state = self.state();
            let list = state.messages.entry(message.chat_id).or_default();
            list.push(message);
            list.sort_by_key(|m| m.id);
        }
        self
    }

    pub fn with_pinned(self, message: PlatformMessage) -> Self {
        self.state().pinned.entry(message.chat_id).or_default().push(message);
        self
    }

    pub fn with_full_user(self, user: FullUser) -> Self {
        {
            let mut state = self.state();
            state.by_id.insert(user.peer.id, user.peer.clone());
            state.full_users.insert(user.peer.id, user);
        }
        self
    }

    pub fn with_dm_history(self, user_id: i64) -> Self {
        self.state().dm_history.insert(user_id);
        self
    }

    pub fn with_participant(self, chat_id: i64, peer: Peer) -> Self {
        self.state().participants.entry(chat_id).or_default().push(peer);
        self
    }

    pub fn with_common_chats(self, user_id: i64, chats: Vec<Peer>) -> Self {
        self.state().common.insert(user_id, chats);
        self
    }

    /// A bot in the chat answers `command` with `text` right after it is sent.
    pub fn with_bot_reply(self, command: &str, bot: Peer, text: &str) -> Self {
        self.state()
            .bot_replies
            .insert(command.to_string(), (bot, text.to_string()));
        self
    }

    pub fn fail(self, method: &str, err: TransportError) -> Self {
        self.state().failures.insert(method.to_string(), err);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    pub fn called(&self, method: &str) -> bool {
        self.state().calls.iter().any(|c| c == method)
    }

    pub fn sent(&self) -> Vec<(i64, OutgoingMessage)> {
        self.state().sent.clone()
    }

    pub fn reactions(&self) -> Vec<(i64, i64, i64)> {
        self.state().reactions.clone()
    }

    pub fn deleted(&self) -> Vec<(i64, i64)> {
        self.state().deleted.clone()
    }

    pub fn forwarded(&self) -> Vec<(i64, i64, i64)> {
        self.state().forwarded.clone()
    }

    pub fn clicks(&self) -> Vec<(i64, i64, usize)> {
        self.state().clicks.clone()
    }

    pub fn contacts(&self) -> Vec<i64> {
        self.state().contacts.iter().copied().collect()
    }

    pub fn left(&self) -> Vec<i64> {
        self.state().left.clone()
    }
}

fn peer_or_missing(state: &FakeState, id: i64) -> TransportResult<Peer> {
    state
        .by_id
        .get(&id)
        .cloned()
        .ok_or_else(|| TransportError::NotFound(format!("peer {}", id)))
}

#[async_trait]
impl Transport for FakeTransport {
    async fn lookup_handle(&self, handle: &str) -> TransportResult<Peer> {
        let state = self.enter("lookup_handle")?;
        let key = handle.trim_start_matches('@').to_lowercase();
        state
            .by_handle
            .get(&key)
            .cloned()
            .ok_or(TransportError::UsernameNotOccupied(key))
    }

    async fn lookup_id(&self, id: i64) -> TransportResult<Peer> {
        let state = self.enter("lookup_id")?;
        peer_or_missing(&state, id)
    }

    async fn check_invite(&self, hash: &str) -> TransportResult<InvitePreview> {
        let state = self.enter("check_invite")?;
        state.invites.get(hash).cloned().ok_or(TransportError::InviteInvalid)
    }

    async fn import_invite(&self, hash: &str) -> TransportResult<Peer> {
        let mut state = self.enter("import_invite")?;
        let preview = state.invites.get(hash).cloned().ok_or(TransportError::InviteInvalid)?;
        if preview.chat.is_some() {
            return Err(TransportError::AlreadyParticipant);
        }
        state.next_id += 1;
        let peer = Peer::group(-state.next_id, &preview.title, None);
        state.members.insert(peer.id);
        state.by_id.insert(peer.id, peer.clone());
        if let Some(p) = state.invites.get_mut(hash) {
            p.chat = Some(peer.clone());
        }
        Ok(peer)
    }

    async fn join_chat(&self, chat_id: i64) -> TransportResult<JoinOutcome> {
        let mut state = self.enter("join_chat")?;
        let peer = peer_or_missing(&state, chat_id)?;
        if state.members.insert(chat_id) {
            Ok(JoinOutcome::Joined(peer))
        } else {
            Ok(JoinOutcome::AlreadyMember(peer))
        }
    }

    async fn leave_chat(&self, chat_id: i64) -> TransportResult<()> {
        let mut state = self.enter("leave_chat")?;
        state.members.remove(&chat_id);
        state.left.push(chat_id);
        Ok(())
    }

    async fn chat_details(&self, chat_id: i64) -> TransportResult<ChatDetails> {
        let state = self.enter("chat_details")?;
        let peer = peer_or_missing(&state, chat_id)?;
        let members = state.participants.get(&chat_id).map(|p| p.len() as u64);
        Ok(ChatDetails {
            is_channel: peer.kind == PeerKind::Channel,
            peer,
            members,
            about: None,
        })
    }

    async fn list_dialogs(&self, limit: usize) -> TransportResult<Vec<Peer>> {
        let state = self.enter("list_dialogs")?;
        let mut chats: Vec<Peer> = state
            .members
            .iter()
            .filter_map(|id| state.by_id.get(id).cloned())
            .collect();
        chats.sort_by_key(|p| p.id);
        chats.truncate(limit);
        Ok(chats)
    }

    async fn send_message(&self, chat_id: i64, message: OutgoingMessage) -> TransportResult<SentMessage> {
        let mut state = self.enter("send_message")?;
        state.next_id += 1;
        let id = state.next_id;
        let date = fake_date(id);
        state.sent.push((chat_id, message.clone()));
        let own = PlatformMessage {
            id,
            chat_id,
            sender_id: None,
            sender_name: "me".to_string(),
            sender_is_bot: false,
            text: message.text.clone(),
            date,
            outgoing: true,
            buttons: Vec::new(),
        };
        state.messages.entry(chat_id).or_default().push(own);

        if let Some((bot, reply)) = state.bot_replies.get(message.text.trim()).cloned() {
            state.next_id += 1;
            let reply_id = state.next_id;
            state.messages.entry(chat_id).or_default().push(PlatformMessage {
                id: reply_id,
                chat_id,
                sender_id: Some(bot.id),
                sender_name: bot.title.clone(),
                sender_is_bot: bot.is_bot,
                text: reply,
                date,
                outgoing: false,
                buttons: Vec::new(),
            });
        }
        Ok(SentMessage { id, chat_id, date })
    }

    async fn recent_messages(&self, chat_id: i64, limit: usize) -> TransportResult<Vec<PlatformMessage>> {
        let state = self.enter("recent_messages")?;
        Ok(state
            .messages
            .get(&chat_id)
            .map(|list| list.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn messages_after(&self, chat_id: i64, after_id: i64, limit: usize) -> TransportResult<Vec<PlatformMessage>> {
        let state = self.enter("messages_after")?;
        Ok(state
            .messages
            .get(&chat_id)
            .map(|list| {
                list.iter()
                    .filter(|m| m.id > after_id)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn pinned_messages(&self, chat_id: i64, limit: usize) -> TransportResult<Vec<PlatformMessage>> {
        let state = self.enter("pinned_messages")?;
        Ok(state
            .pinned
            .get(&chat_id)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn own_messages(&self, chat_id: i64, limit: usize) -> TransportResult<Vec<PlatformMessage>> {
        let state = self.enter("own_messages")?;
        Ok(state
            .messages
            .get(&chat_id)
            .map(|list| {
                list.iter()
                    .rev()
                    .filter(|m| m.outgoing)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn send_reaction(&self, chat_id: i64, message_id: i64, document_id: i64) -> TransportResult<()> {
        let mut state = self.enter("send_reaction")?;
        state.reactions.push((chat_id, message_id, document_id));
        Ok(())
    }

    async fn delete_messages(&self, chat_id: i64, message_ids: &[i64]) -> TransportResult<()> {
        let mut state = self.enter("delete_messages")?;
        for id in message_ids {
            state.deleted.push((chat_id, *id));
        }
        if let Some(list) = state.messages.get_mut(&chat_id) {
            list.retain(|m| !message_ids.contains(&m.id));
        }
        Ok(())
    }

    async fn forward_message(&self, from_chat: i64, message_id: i64, to_chat: i64) -> TransportResult<()> {
        let mut state = self.enter("forward_message")?;
        state.forwarded.push((from_chat, message_id, to_chat));
        Ok(())
    }

    async fn click_button(&self, chat_id: i64, message_id: i64, index: usize) -> TransportResult<Option<String>> {
        let mut state = self.enter("click_button")?;
        state.clicks.push((chat_id, message_id, index));
        Ok(Some("ok".to_string()))
    }

    async fn full_user(&self, user_id: i64) -> TransportResult<FullUser> {
        let state = self.enter("full_user")?;
        if let Some(user) = state.full_users.get(&user_id) {
            let mut user = user.clone();
            user.is_contact = user.is_contact || state.contacts.contains(&user_id);
            return Ok(user);
        }
        let peer = peer_or_missing(&state, user_id)?;
        let mut user = FullUser::new(peer);
        user.is_contact = state.contacts.contains(&user_id);
        Ok(user)
    }

    async fn has_dm_history(&self, user_id: i64) -> TransportResult<bool> {
        let state = self.enter("has_dm_history")?;
        Ok(state.dm_history.contains(&user_id))
    }

    async fn add_contact(&self, user_id: i64, _first_name: &str) -> TransportResult<()> {
        let mut state = self.enter("add_contact")?;
        state.contacts.insert(user_id);
        Ok(())
    }

    async fn search_participants(&self, chat_id: i64, query: &str, limit: usize) -> TransportResult<Vec<Peer>> {
        let state = self.enter("search_participants")?;
        let q = query.to_lowercase();
        Ok(state
            .participants
            .get(&chat_id)
            .map(|list| {
                list.iter()
                    .filter(|p| {
                        p.title.to_lowercase().contains(&q)
                            || p.handle.as_deref().map(|h| h.to_lowercase().contains(&q)).unwrap_or(false)
                    })
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn common_chats(&self, user_id: i64, limit: usize) -> TransportResult<Vec<Peer>> {
        let state = self.enter("common_chats")?;
        Ok(state
            .common
            .get(&user_id)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Deterministic timestamps for sent messages.
fn fake_date(id: i64) -> i64 {
    1_700_000_000 + id
}

/// Builds an incoming message for seeding the fake.
pub fn incoming(chat_id: i64, id: i64, sender: &Peer, text: &str) -> PlatformMessage {
    PlatformMessage {
        id,
        chat_id,
        sender_id: Some(sender.id),
        sender_name: sender.title.clone(),
        sender_is_bot: sender.is_bot,
        text: text.to_string(),
        date: 1_700_000_000 + id,
        outgoing: false,
        buttons: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_and_scripted_failures() {
        let fake = FakeTransport::new()
            .with_peer(Peer::group(-1, "Chat", Some("chat")))
            .fail("leave_chat", TransportError::ChannelPrivate);

        assert_eq!(fake.lookup_handle("@Chat").await.unwrap().id, -1);
        assert_eq!(fake.leave_chat(-1).await, Err(TransportError::ChannelPrivate));
        assert_eq!(fake.calls(), vec!["lookup_handle", "leave_chat"]);
    }

    #[tokio::test]
    async fn test_bot_reply_follows_command() {
        let bot = Peer::user(77, "GroupHelp", Some("grouphelpbot")).bot();
        let fake = FakeTransport::new().with_bot_reply("/rules", bot, "Be kind");

        let sent = fake.send_message(-1, OutgoingMessage::plain("/rules")).await.unwrap();
        let after = fake.messages_after(-1, sent.id, 10).await.unwrap();
        assert_eq!(after.len(), 1);
        assert!(after[0].sender_is_bot);
        assert_eq!(after[0].text, "Be kind");
    }

    #[tokio::test]
    async fn test_join_reports_existing_membership() {
        let fake = FakeTransport::new()
            .with_peer(Peer::group(-5, "G", None))
            .with_member(-5);
        assert!(matches!(fake.join_chat(-5).await, Ok(JoinOutcome::AlreadyMember(_))));
    }
}
