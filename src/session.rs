use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One generated chapter as cached inside a story session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub chapter: u32,
    pub tokens_consumed: u64,
    pub tokens_prompt: u64,
    pub story: String,
}

/// Everything the service remembers about a running story.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorySession {
    pub chapters: Vec<Chapter>,
}

impl StorySession {
    pub fn next_chapter_number(&self) -> u32 {
        self.chapters.len() as u32 + 1
    }

    pub fn story_so_far(&self) -> String {
        self.chapters
            .iter()
            .map(|chapter| chapter.story.as_str())
            .collect()
    }

    pub fn previous_chapter(&self) -> Option<&str> {
        self.chapters.last().map(|chapter| chapter.story.as_str())
    }
}

/// Storage for story sessions. Writes are whole-value: concurrent writers to
/// the same id race and the last one wins.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &str) -> Option<StorySession>;
    fn put(&self, id: &str, session: StorySession);
    fn exists(&self, id: &str) -> bool;
}

/// Process-local store with per-entry expiry. Every `put` restarts the
/// entry's clock, so an active story never expires mid-conversation.
pub struct InMemorySessionStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, (StorySession, Instant)>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn expired(&self, stored_at: Instant) -> bool {
        stored_at.elapsed() >= self.ttl
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: &str) -> Option<StorySession> {
        let mut entries = self.entries.write();
        match entries.get(id) {
            Some((_, stored_at)) if self.expired(*stored_at) => {
                entries.remove(id);
                None
            }
            Some((session, _)) => Some(session.clone()),
            None => None,
        }
    }

    fn put(&self, id: &str, session: StorySession) {
        self.entries
            .write()
            .insert(id.to_string(), (session, Instant::now()));
    }

    fn exists(&self, id: &str) -> bool {
        match self.entries.read().get(id) {
            Some((_, stored_at)) => !self.expired(*stored_at),
            None => false,
        }
    }
}
