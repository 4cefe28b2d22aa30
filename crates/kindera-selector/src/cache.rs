// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Selection decision cache: capacity-bounded, TTL-expiring, LRU-evicting.
//!
//! Keyed by a normalized query fingerprint so trivially-different phrasings
//! ("查询3班的学生" vs "查询 5 班的学生") share an entry. Entries also key on
//! the caller role and the catalogue version, so a catalogue bump naturally
//! invalidates every cached decision.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use kindera_entity::CATALOG_VERSION;

use crate::validator::ToolDecision;

struct CacheEntry {
    decision: ToolDecision,
    created_at: Instant,
    last_used: Instant,
    hit_count: u64,
}

/// Concurrent decision cache.
pub struct SelectionCache {
    entries: DashMap<String, CacheEntry>,
    capacity: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Counters exposed on the usage endpoint.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

impl SelectionCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a cached decision. Expired entries are removed on the spot
    /// and count as misses.
    pub fn get(&self, query: &str, role: &str) -> Option<ToolDecision> {
        let key = fingerprint(query, role);
        let now = Instant::now();

        if let Some(mut entry) = self.entries.get_mut(&key) {
            if now.duration_since(entry.created_at) > self.ttl {
                drop(entry);
                self.entries.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            entry.last_used = now;
            entry.hit_count += 1;
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.decision.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a decision, evicting the least-recently-used entry when the
    /// cache is at capacity.
    pub fn put(&self, query: &str, role: &str, decision: ToolDecision) {
        let key = fingerprint(query, role);

        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }

        let now = Instant::now();
        self.entries.insert(
            key,
            CacheEntry {
                decision,
                created_at: now,
                last_used: now,
                hit_count: 0,
            },
        );
    }

    /// Drop every entry. Used when the entity catalogue is reloaded.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries: self.entries.len(),
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    fn evict_lru(&self) {
        let mut oldest: Option<(String, Instant)> = None;
        for entry in self.entries.iter() {
            let better = oldest
                .as_ref()
                .map(|(_, t)| entry.last_used < *t)
                .unwrap_or(true);
            if better {
                oldest = Some((entry.key().clone(), entry.last_used));
            }
        }
        if let Some((key, _)) = oldest {
            debug!(key = %key, "evicting least-recently-used selection");
            self.entries.remove(&key);
        }
    }
}

/// Normalize a query into a cache key: lowercase, collapsed whitespace,
/// digits masked so literal values ("3班" vs "5班") share an entry. The
/// caller role and catalogue version are folded in.
pub fn fingerprint(query: &str, role: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let ws = WHITESPACE.get_or_init(|| Regex::new(r"\s+").unwrap_or_else(|_| unreachable!()));

    let lower = query.trim().to_lowercase();
    let collapsed = ws.replace_all(&lower, " ");
    let masked: String = collapsed
        .chars()
        .map(|c| if c.is_ascii_digit() { '#' } else { c })
        .collect();

    format!("{masked}|{CATALOG_VERSION}|{role}")
}
