//! Optional rendering of an agent's visual identity.
//!
//! Rendering is a capability injected into the orchestrator; the glyph or SVG
//! it produces never feeds a hash. Results are memoized in a [`RenderCache`]
//! owned by the caller, keyed by everything the artifact depends on.
//!
//! The cache holds at most a fixed number of artifacts. Past that, the
//! oldest insertion is evicted first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use helix_custody_core::ContentHash;
use tracing::debug;

/// What a renderer draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSubject {
    pub merkle_root: ContentHash,
    pub state: String,
    pub custodian_id: String,
    pub agent_name: String,
}

impl RenderSubject {
    fn key(&self) -> RenderKey {
        RenderKey {
            merkle_root: self.merkle_root,
            state: self.state.clone(),
            custodian_id: self.custodian_id.clone(),
        }
    }
}

/// Produces a rendered artifact (for example an SVG document) for an agent.
pub trait Renderer: Send + Sync {
    fn render(&self, subject: &RenderSubject) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RenderKey {
    merkle_root: ContentHash,
    state: String,
    custodian_id: String,
}

/// Artifacts kept by [`RenderCache::new`].
pub const DEFAULT_RENDER_CACHE_CAPACITY: usize = 1024;

/// Memoized render results.
#[derive(Debug)]
pub struct RenderCache {
    entries: HashMap<RenderKey, Arc<str>>,
    /// Keys in insertion order, oldest first.
    order: VecDeque<RenderKey>,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::with_capacity_limit(DEFAULT_RENDER_CACHE_CAPACITY)
    }

    /// A cache holding at most `capacity` artifacts (at least one).
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Return the cached artifact for `subject`, rendering it on a miss.
    pub fn get_or_render(
        &mut self,
        renderer: &dyn Renderer,
        subject: &RenderSubject,
    ) -> anyhow::Result<Arc<str>> {
        let key = subject.key();
        if let Some(artifact) = self.entries.get(&key) {
            self.hits += 1;
            debug!(identity = %subject.merkle_root, state = %subject.state, "render cache hit");
            return Ok(Arc::clone(artifact));
        }

        debug!(identity = %subject.merkle_root, state = %subject.state, "render cache miss");
        self.misses += 1;
        let artifact: Arc<str> = renderer.render(subject)?.into();

        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            self.evictions += 1;
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, Arc::clone(&artifact));
        Ok(artifact)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Artifacts dropped to stay within capacity.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new()
    }
}
