//! Refresh metadata store.
//!
//! One [`RefreshMeta`] per registered key. This is what a view reads to render
//! "last refreshed" and "next refresh" hints.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::keys::{KeyRegistry, RefreshKey};

/// Per-key refresh bookkeeping. All timestamps are epoch milliseconds.
///
/// `interval_ms` is `None` exactly for manual keys. `last_at` only moves when
/// an attempt finishes, never on trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RefreshMeta {
    pub interval_ms: Option<u64>,
    pub last_at: Option<i64>,
    pub next_at: Option<i64>,
}

impl RefreshMeta {
    /// Next refresh time as a view should show it, and when the key's timer
    /// fires.
    ///
    /// Recomputed from `last_at + interval_ms` when both exist so a manual
    /// refresh re-bases the next automatic tick; otherwise the stored `next_at`.
    /// A stored `next_at` later than that wins: it comes from a deferral or
    /// from re-enabling auto-refresh, and both only ever push the tick out.
    pub fn effective_next_at(&self) -> Option<i64> {
        match (self.last_at, self.interval_ms) {
            (Some(last_at), Some(interval_ms)) => {
                let rebased = last_at.saturating_add(interval_ms as i64);
                Some(self.next_at.map_or(rebased, |next_at| next_at.max(rebased)))
            }
            _ => self.next_at,
        }
    }

    /// Time left until [`effective_next_at`](Self::effective_next_at), zero if already due.
    pub fn next_refresh_in(&self, now_ms: i64) -> Option<Duration> {
        self.effective_next_at()
            .map(|next_at| Duration::from_millis(next_at.saturating_sub(now_ms).max(0) as u64))
    }
}

/// Metadata for every registered key. Entries are created up front and never
/// added or removed afterwards.
#[derive(Debug, Clone, Default)]
pub struct MetaStore {
    entries: BTreeMap<RefreshKey, RefreshMeta>,
}

impl MetaStore {
    /// One empty entry per registered key.
    pub fn new(registry: &KeyRegistry) -> Self {
        let entries = registry
            .iter()
            .map(|(key, kind)| {
                (
                    key.clone(),
                    RefreshMeta {
                        interval_ms: kind.interval_ms(),
                        last_at: None,
                        next_at: None,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &RefreshKey) -> Option<&RefreshMeta> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RefreshKey, &RefreshMeta)> {
        self.entries.iter()
    }

    /// Record a finished attempt.
    ///
    /// Auto keys get `next_at = now + interval` while auto-refresh is enabled.
    /// Manual keys, and auto keys while the toggle is off, get `next_at = None`.
    pub fn mark_refreshed(&mut self, key: &RefreshKey, now_ms: i64, auto_enabled: bool) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        entry.last_at = Some(now_ms);
        entry.next_at = match entry.interval_ms {
            Some(interval_ms) if auto_enabled => Some(now_ms.saturating_add(interval_ms as i64)),
            _ => None,
        };
    }

    /// Push `next_at` out to a deferral deadline. Never moves it earlier.
    ///
    /// Returns the resulting `next_at`. `last_at` is untouched.
    pub fn mark_deferred(&mut self, key: &RefreshKey, now_ms: i64, defer_until_ms: i64) -> Option<i64> {
        let entry = self.entries.get_mut(key)?;
        let next_at = entry
            .next_at
            .unwrap_or(i64::MIN)
            .max(now_ms)
            .max(defer_until_ms);
        entry.next_at = Some(next_at);
        Some(next_at)
    }

    /// Give every auto key a fresh `now + interval` baseline.
    pub fn rebase_auto(&mut self, now_ms: i64) {
        for entry in self.entries.values_mut() {
            if let Some(interval_ms) = entry.interval_ms {
                entry.next_at = Some(now_ms.saturating_add(interval_ms as i64));
            }
        }
    }
}
