//! Reference Resolver: turns "last", "@handle", invite links, ids and loose titles into
//! confirmed [`EntityReference`]s.
//!
//! Lookup order, first hit wins:
//! 1. sentinel aliases → the `"last"` cache entry, else the most recently active known chat
//! 2. exact, then substring, match on recency cache keys
//! 3. persisted directory: exact id/title/handle, then the best [`MatchStrategy`] score above
//!    the threshold
//! 4. live transport lookup of a literal handle, invite hash or id

use hono_channels::{Transport, TransportError};
use hono_core::{ActionError, EntityKind, EntityReference, ErrorKind};
use hono_storage::Directory;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

pub const LAST_KEY: &str = "last";

/// Aliases for "the chat I touched most recently".
const SENTINELS: &[&str] = &[
    "last", "туда", "оттуда", "тут", "here", "обратно", "назад", "та группа", "эта", "эту",
    "эта группа",
];

/// Shortest cache key eligible for substring matching.
const MIN_PARTIAL_KEY: usize = 3;

pub fn is_sentinel(key: &str) -> bool {
    SENTINELS.contains(&key)
}

/// Syntactic shape of a reference, before any lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Invite(String),
    Handle(String),
    Id(i64),
    Name(String),
}

static INVITE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:t\.me|telegram\.me)/(?:\+|joinchat/)([A-Za-z0-9_-]+)")
        .expect("valid invite regex")
});
static PUBLIC_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:t\.me|telegram\.me)/([A-Za-z0-9_]+)").expect("valid link regex")
});
static BARE_HANDLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid handle regex"));

pub fn parse_reference(raw: &str) -> Reference {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<i64>() {
        return Reference::Id(id);
    }
    if let Some(c) = INVITE_LINK.captures(raw) {
        return Reference::Invite(c[1].to_string());
    }
    if let Some(c) = PUBLIC_LINK.captures(raw) {
        return Reference::Handle(c[1].to_string());
    }
    if let Some(handle) = raw.strip_prefix('@') {
        return Reference::Handle(handle.to_string());
    }
    if BARE_HANDLE.is_match(raw) {
        return Reference::Handle(raw.to_string());
    }
    Reference::Name(raw.to_string())
}

fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Most recently resolved entity per lookup key, one map per entity kind. Entries are
/// overwritten, never merged or evicted.
#[derive(Default)]
pub struct RecencyCache {
    chats: Mutex<BTreeMap<String, EntityReference>>,
    users: Mutex<BTreeMap<String, EntityReference>>,
}

impl RecencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: EntityKind) -> MutexGuard<'_, BTreeMap<String, EntityReference>> {
        let map = match kind {
            EntityKind::Chat => &self.chats,
            EntityKind::User => &self.users,
        };
        map.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, kind: EntityKind, key: &str) -> Option<EntityReference> {
        self.slot(kind).get(key).cloned()
    }

    pub fn put(&self, kind: EntityKind, key: &str, entity: &EntityReference) {
        let key = normalize(key);
        if key.is_empty() {
            return;
        }
        self.slot(kind).insert(key, entity.clone());
    }

    /// First key (in key order) containing `key` or contained in it. `"last"` never matches.
    pub fn find_partial(&self, kind: EntityKind, key: &str) -> Option<EntityReference> {
        if key.chars().count() < MIN_PARTIAL_KEY {
            return None;
        }
        self.slot(kind)
            .iter()
            .filter(|(k, _)| k.as_str() != LAST_KEY && k.chars().count() >= MIN_PARTIAL_KEY)
            .find(|(k, _)| k.contains(key) || key.contains(k.as_str()))
            .map(|(_, e)| e.clone())
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.slot(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len(EntityKind::Chat) == 0 && self.len(EntityKind::User) == 0
    }
}

/// Scores a lowercased query against a lowercased candidate title, in `0.0..=1.0`.
pub trait MatchStrategy: Send + Sync {
    fn score(&self, query: &str, candidate: &str) -> f64;
}

/// Substring containment in either direction, then the share of query words found in the
/// candidate. Lengths are counted in chars.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringTokenStrategy;

impl MatchStrategy for SubstringTokenStrategy {
    fn score(&self, query: &str, candidate: &str) -> f64 {
        if query.is_empty() || candidate.is_empty() {
            return 0.0;
        }
        if query == candidate {
            return 1.0;
        }
        let q_len = query.chars().count() as f64;
        let c_len = candidate.chars().count() as f64;

        let mut score = if candidate.contains(query) {
            q_len / c_len
        } else if query.contains(candidate) {
            c_len / q_len * 0.8
        } else {
            0.0
        };

        let words: Vec<&str> = query.split_whitespace().collect();
        if !words.is_empty() {
            let hits = words.iter().filter(|w| candidate.contains(*w)).count();
            score = score.max(hits as f64 / words.len() as f64 * 0.7);
        }
        score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Recency,
    Directory,
    Live,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub entity: EntityReference,
    pub source: ResolutionSource,
}

impl Resolution {
    fn new(entity: EntityReference, source: ResolutionSource) -> Self {
        Self { entity, source }
    }
}

struct Candidate {
    entity: EntityReference,
    title: String,
    handles: Vec<String>,
}

pub struct Resolver {
    cache: RecencyCache,
    strategy: Box<dyn MatchStrategy>,
    threshold: f64,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl Resolver {
    pub fn new(threshold: f64) -> Self {
        Self::with_strategy(Box::new(SubstringTokenStrategy), threshold)
    }

    pub fn with_strategy(strategy: Box<dyn MatchStrategy>, threshold: f64) -> Self {
        Self {
            cache: RecencyCache::new(),
            strategy,
            threshold,
        }
    }

    pub fn cache(&self) -> &RecencyCache {
        &self.cache
    }

    /// Marks `entity` as the most recently touched chat.
    pub fn touch_last(&self, entity: &EntityReference) {
        self.cache.put(entity.kind, LAST_KEY, entity);
        self.cache.put(entity.kind, &entity.display_name, entity);
    }

    pub fn remember(&self, key: &str, entity: &EntityReference) {
        self.cache.put(entity.kind, key, entity);
    }

    pub async fn resolve(
        &self,
        query: &str,
        kind: EntityKind,
        directory: &dyn Directory,
        transport: &dyn Transport,
    ) -> Result<Resolution, ActionError> {
        let key = normalize(query);
        if key.is_empty() {
            return Err(ActionError::invalid("empty reference"));
        }

        if kind == EntityKind::Chat && is_sentinel(&key) {
            return self.resolve_last(query, directory).await;
        }

        if let Some(entity) = self.cache.get(kind, &key) {
            debug!(query, id = entity.platform_id, "Resolved from recency cache");
            return Ok(Resolution::new(entity, ResolutionSource::Recency));
        }

        let reference = parse_reference(query);
        if matches!(reference, Reference::Handle(_) | Reference::Name(_)) {
            if let Some(entity) = self.cache.find_partial(kind, &key) {
                debug!(query, id = entity.platform_id, "Resolved from recency cache (partial)");
                self.store(kind, &key, &entity);
                return Ok(Resolution::new(entity, ResolutionSource::Recency));
            }
        }

        match self.search_directory(&key, &reference, kind, directory).await {
            Ok(Some(entity)) => {
                debug!(query, id = entity.platform_id, "Resolved from directory");
                self.store(kind, &key, &entity);
                return Ok(Resolution::new(entity, ResolutionSource::Directory));
            }
            Ok(None) => {}
            Err(e) => warn!(query, error = %e, "Directory lookup failed, trying live lookup"),
        }

        let entity = self.lookup_live(query, &reference, kind, transport).await?;
        debug!(query, id = entity.platform_id, "Resolved by live lookup");
        self.store(kind, &key, &entity);
        Ok(Resolution::new(entity, ResolutionSource::Live))
    }

    async fn resolve_last(&self, query: &str, directory: &dyn Directory) -> Result<Resolution, ActionError> {
        if let Some(entity) = self.cache.get(EntityKind::Chat, LAST_KEY) {
            return Ok(Resolution::new(entity, ResolutionSource::Recency));
        }
        let chats = directory.list_known_chats().await.map_err(|e| {
            warn!(query, error = %e, "Directory unavailable for last-chat lookup");
            ActionError::not_found(format!("no recent chat for '{}'", query))
        })?;
        let chat = chats
            .into_iter()
            .next()
            .ok_or_else(|| ActionError::not_found(format!("no recent chat for '{}'", query)))?;
        let entity = EntityReference::chat(chat.id, &chat.title).with_handle(chat.handles.into_iter().next());
        self.touch_last(&entity);
        Ok(Resolution::new(entity, ResolutionSource::Directory))
    }

    async fn candidates(&self, kind: EntityKind, directory: &dyn Directory) -> hono_core::Result<Vec<Candidate>> {
        Ok(match kind {
            EntityKind::Chat => directory
                .list_known_chats()
                .await?
                .into_iter()
                .map(|c| Candidate {
                    entity: EntityReference::chat(c.id, &c.title).with_handle(c.handles.first().cloned()),
                    title: c.title.to_lowercase(),
                    handles: c.handles.iter().map(|h| h.to_lowercase()).collect(),
                })
                .collect(),
            EntityKind::User => directory
                .list_known_users()
                .await?
                .into_iter()
                .map(|u| Candidate {
                    entity: EntityReference::user(u.id, &u.display_name).with_handle(u.handle.clone()),
                    title: u.display_name.to_lowercase(),
                    handles: u.handle.iter().map(|h| h.to_lowercase()).collect(),
                })
                .collect(),
        })
    }

    async fn search_directory(
        &self,
        key: &str,
        reference: &Reference,
        kind: EntityKind,
        directory: &dyn Directory,
    ) -> hono_core::Result<Option<EntityReference>> {
        if matches!(reference, Reference::Invite(_)) {
            return Ok(None);
        }
        let candidates = self.candidates(kind, directory).await?;
        let handle_key = match reference {
            Reference::Handle(h) => h.to_lowercase(),
            _ => key.trim_start_matches('@').to_string(),
        };

        let exact = candidates.iter().find(|c| match reference {
            Reference::Id(id) => c.entity.platform_id == *id,
            _ => c.title == key || c.handles.iter().any(|h| *h == handle_key),
        });
        if let Some(c) = exact {
            return Ok(Some(c.entity.clone()));
        }
        if matches!(reference, Reference::Id(_)) {
            return Ok(None);
        }

        let mut best: Option<(f64, &Candidate)> = None;
        for c in &candidates {
            let score = self.strategy.score(key, &c.title);
            if score <= self.threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((s, b)) => score > s || (score == s && c.entity.platform_id < b.entity.platform_id),
            };
            if better {
                best = Some((score, c));
            }
        }
        Ok(best.map(|(_, c)| c.entity.clone()))
    }

    async fn lookup_live(
        &self,
        query: &str,
        reference: &Reference,
        kind: EntityKind,
        transport: &dyn Transport,
    ) -> Result<EntityReference, ActionError> {
        let found = match reference {
            Reference::Invite(hash) => transport.check_invite(hash).await.and_then(|preview| {
                preview
                    .chat
                    .ok_or_else(|| TransportError::NotFound("not a member of the invited chat".to_string()))
            }),
            Reference::Handle(handle) => transport.lookup_handle(handle).await,
            Reference::Id(id) => transport.lookup_id(*id).await,
            Reference::Name(_) => {
                return Err(ActionError::not_found(format!("'{}' not found", query)));
            }
        };

        let peer = found.map_err(|e| {
            let mapped = ActionError::from(e);
            if mapped.kind == ErrorKind::RateLimited {
                mapped
            } else {
                ActionError::not_found(format!("'{}' not found: {}", query, mapped.message))
            }
        })?;

        let matches_kind = match kind {
            EntityKind::Chat => peer.is_chat(),
            EntityKind::User => !peer.is_chat(),
        };
        if !matches_kind {
            return Err(ActionError::not_found(format!("'{}' is not a {}", query, kind)));
        }
        Ok(peer.to_entity())
    }

    fn store(&self, kind: EntityKind, key: &str, entity: &EntityReference) {
        self.cache.put(kind, key, entity);
        self.cache.put(kind, &entity.display_name, entity);
    }
}
