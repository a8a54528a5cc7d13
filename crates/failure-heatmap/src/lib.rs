//! Failure heatmap: recently-failing locator patterns per page context
//!
//! Short-lived avoidance hints, never ground truth. A fingerprint is
//! "hot" once it has failed `hot_threshold` times inside the TTL
//! window; hot fingerprints are handed to discovery as exclusions so
//! a broken pattern is not re-proposed within the same window.
//! Entries older than the window are logically absent.

use std::collections::HashSet;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sitepilot_core_types::Candidate;
use tracing::{debug, warn};

/// Hotness policy
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct HeatmapPolicy {
    /// Failures inside the window before a fingerprint is hot (K)
    pub hot_threshold: u32,

    /// TTL window (W)
    pub window: Duration,
}

impl Default for HeatmapPolicy {
    fn default() -> Self {
        Self {
            hot_threshold: 3,
            window: Duration::from_secs(600),
        }
    }
}

/// Failure history for one (page_context, fingerprint) pair
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeatmapEntry {
    pub page_context: String,
    pub fingerprint: String,

    /// Ordered failure timestamps, oldest first
    pub failure_timestamps: Vec<DateTime<Utc>>,
}

/// Process-wide failure heatmap
#[derive(Default)]
pub struct FailureHeatmap {
    inner: DashMap<String, Vec<HeatmapEntry>>,
    storage_path: Option<PathBuf>,
    policy: HeatmapPolicy,
}

pub type SharedFailureHeatmap = Arc<FailureHeatmap>;

impl FailureHeatmap {
    pub fn new(policy: HeatmapPolicy) -> Self {
        Self {
            inner: DashMap::new(),
            storage_path: None,
            policy,
        }
    }

    /// Open a heatmap backed by a JSON file, loading existing state.
    /// Entries already outside the window are dropped on load.
    pub fn with_persistence(path: impl Into<PathBuf>, policy: HeatmapPolicy) -> io::Result<Self> {
        let path = path.into();
        let map = Self {
            inner: DashMap::new(),
            storage_path: Some(path.clone()),
            policy,
        };

        if path.exists() {
            let bytes = fs::read(&path)?;
            if !bytes.is_empty() {
                let entries: Vec<HeatmapEntry> = serde_json::from_slice(&bytes)
                    .map_err(|err| io::Error::new(ErrorKind::InvalidData, format!("{err}")))?;
                let cutoff = map.cutoff();
                for mut entry in entries {
                    entry.failure_timestamps.retain(|ts| *ts >= cutoff);
                    if !entry.failure_timestamps.is_empty() {
                        map.inner
                            .entry(entry.page_context.clone())
                            .or_default()
                            .push(entry);
                    }
                }
            }
        }

        Ok(map)
    }

    pub fn policy(&self) -> HeatmapPolicy {
        self.policy
    }

    /// Record one failure for a candidate's locator pattern
    pub fn record_failure(&self, page_context: &str, candidate: &Candidate) {
        self.record_failure_at(page_context, &candidate.fingerprint(), Utc::now());
    }

    fn record_failure_at(&self, page_context: &str, fingerprint: &str, when: DateTime<Utc>) {
        let cutoff = self.cutoff();
        let mut entries = self.inner.entry(page_context.to_string()).or_default();

        match entries.iter_mut().find(|e| e.fingerprint == fingerprint) {
            Some(entry) => {
                entry.failure_timestamps.retain(|ts| *ts >= cutoff);
                entry.failure_timestamps.push(when);
            }
            None => entries.push(HeatmapEntry {
                page_context: page_context.to_string(),
                fingerprint: fingerprint.to_string(),
                failure_timestamps: vec![when],
            }),
        }
        drop(entries);

        debug!(page_context, fingerprint, "heatmap failure recorded");
        if let Err(err) = self.persist_to_disk() {
            warn!(error = %err, "heatmap persist failed after record");
        }
    }

    /// Whether this candidate's pattern is currently hot
    pub fn is_hot(&self, page_context: &str, candidate: &Candidate) -> bool {
        self.live_failures(page_context, &candidate.fingerprint())
            >= self.policy.hot_threshold as usize
    }

    /// Fingerprints currently hot for a context, for discovery exclusion
    pub fn excluded_fingerprints(&self, page_context: &str) -> HashSet<String> {
        let cutoff = self.cutoff();
        self.inner
            .get(page_context)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| {
                        e.failure_timestamps.iter().filter(|ts| **ts >= cutoff).count()
                            >= self.policy.hot_threshold as usize
                    })
                    .map(|e| e.fingerprint.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Failures inside the window for one pattern
    pub fn live_failures(&self, page_context: &str, fingerprint: &str) -> usize {
        let cutoff = self.cutoff();
        self.inner
            .get(page_context)
            .and_then(|entries| {
                entries
                    .iter()
                    .find(|e| e.fingerprint == fingerprint)
                    .map(|e| e.failure_timestamps.iter().filter(|ts| **ts >= cutoff).count())
            })
            .unwrap_or(0)
    }

    /// Drop entries with no failures left inside the window
    pub fn prune_expired(&self) {
        let cutoff = self.cutoff();
        let mut empty_contexts = Vec::new();
        for mut entry in self.inner.iter_mut() {
            for e in entry.value_mut().iter_mut() {
                e.failure_timestamps.retain(|ts| *ts >= cutoff);
            }
            entry.value_mut().retain(|e| !e.failure_timestamps.is_empty());
            if entry.value().is_empty() {
                empty_contexts.push(entry.key().clone());
            }
        }
        for ctx in empty_contexts {
            self.inner.remove(&ctx);
        }
    }

    pub fn persist_now(&self) -> io::Result<()> {
        self.persist_to_disk()
    }

    fn cutoff(&self) -> DateTime<Utc> {
        Utc::now()
            - chrono::Duration::from_std(self.policy.window)
                .unwrap_or_else(|_| chrono::Duration::seconds(600))
    }

    fn persist_to_disk(&self) -> io::Result<()> {
        let Some(path) = self.storage_path.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut all: Vec<HeatmapEntry> = self
            .inner
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| {
            (a.page_context.as_str(), a.fingerprint.as_str())
                .cmp(&(b.page_context.as_str(), b.fingerprint.as_str()))
        });
        let json = serde_json::to_vec_pretty(&all)
            .map_err(|err| io::Error::new(ErrorKind::Other, format!("{err}")))?;
        fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitepilot_core_types::{DiscoverySource, Locator};

    fn candidate(selector: &str) -> Candidate {
        Candidate::new(Locator::selector(selector), 0.5, DiscoverySource::Cached)
    }

    #[test]
    fn test_hot_after_threshold_failures() {
        let map = FailureHeatmap::new(HeatmapPolicy::default());
        let c = candidate("#flaky");

        map.record_failure("betslip", &c);
        map.record_failure("betslip", &c);
        assert!(!map.is_hot("betslip", &c));

        map.record_failure("betslip", &c);
        assert!(map.is_hot("betslip", &c));
        assert!(map
            .excluded_fingerprints("betslip")
            .contains(&c.fingerprint()));
    }

    #[test]
    fn test_contexts_are_independent() {
        let map = FailureHeatmap::new(HeatmapPolicy::default());
        let c = candidate("#flaky");
        for _ in 0..3 {
            map.record_failure("betslip", &c);
        }
        assert!(map.is_hot("betslip", &c));
        assert!(!map.is_hot("login", &c));
        assert!(map.excluded_fingerprints("login").is_empty());
    }

    #[test]
    fn test_expired_failures_logically_absent() {
        let map = FailureHeatmap::new(HeatmapPolicy {
            hot_threshold: 2,
            window: Duration::from_secs(600),
        });
        let stale = Utc::now() - chrono::Duration::seconds(3600);
        map.record_failure_at("betslip", "css:#old", stale);
        map.record_failure_at("betslip", "css:#old", stale);

        assert_eq!(map.live_failures("betslip", "css:#old"), 0);
        assert!(map.excluded_fingerprints("betslip").is_empty());

        map.prune_expired();
        assert!(map.inner.get("betslip").is_none());
    }

    #[test]
    fn test_persistence_roundtrip_drops_expired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heatmap.json");
        let policy = HeatmapPolicy::default();

        {
            let map = FailureHeatmap::with_persistence(&path, policy).unwrap();
            let fresh = Utc::now();
            let stale = Utc::now() - chrono::Duration::seconds(7200);
            map.record_failure_at("betslip", "css:#fresh", fresh);
            map.record_failure_at("betslip", "css:#stale", stale);
        }

        let reloaded = FailureHeatmap::with_persistence(&path, policy).unwrap();
        assert_eq!(reloaded.live_failures("betslip", "css:#fresh"), 1);
        assert_eq!(reloaded.live_failures("betslip", "css:#stale"), 0);
    }
}
