use assistant::ConversationId;
use dashmap::DashMap;
use extract::{Graph, KeywordEntry};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::CacheConfig;
use crate::metrics::ArtifactKind;

/// A parsed artifact worth keeping. Fallback values are never cached.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedArtifact {
    Summary(String),
    Keywords(Vec<KeywordEntry>),
    Graph(Graph),
}

impl CachedArtifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            CachedArtifact::Summary(_) => ArtifactKind::Summary,
            CachedArtifact::Keywords(_) => ArtifactKind::Keywords,
            CachedArtifact::Graph(_) => ArtifactKind::Graph,
        }
    }
}

/// Artifacts already generated for a conversation, so reopening a panel does
/// not queue another run.
pub struct ArtifactCache {
    entries: Arc<DashMap<(ConversationId, ArtifactKind), CachedArtifact>>,
    enabled: bool,
    max_entries: usize,
}

impl ArtifactCache {
    pub fn new(enabled: bool, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            enabled,
            max_entries,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.enabled, config.max_entries)
    }

    pub fn get(&self, conversation: &ConversationId, kind: ArtifactKind) -> Option<CachedArtifact> {
        if !self.enabled {
            return None;
        }
        self.entries
            .get(&(conversation.clone(), kind))
            .map(|r| r.value().clone())
    }

    pub fn insert(&self, conversation: &ConversationId, artifact: CachedArtifact) {
        if !self.enabled || self.max_entries == 0 {
            return;
        }
        let key = (conversation.clone(), artifact.kind());
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_conversations((self.max_entries / 4).max(1));
        }
        self.entries.insert(key, artifact);
    }

    /// Drop every artifact of arbitrary conversations (map order, not age)
    /// until at least `target` entries are gone.
    fn evict_conversations(&self, target: usize) {
        let mut victims = HashSet::new();
        for (freed, entry) in self.entries.iter().enumerate() {
            if freed >= target {
                break;
            }
            victims.insert(entry.key().0.clone());
        }
        self.entries
            .retain(|(conversation, _), _| !victims.contains(conversation));
        debug!(conversations = victims.len(), "Evicted cached artifacts");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.enabled,
            entries: self.entries.len(),
            max_entries: self.max_entries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub max_entries: usize,
}
