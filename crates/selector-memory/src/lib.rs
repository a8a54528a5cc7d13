//! Knowledge store: logical element -> ranked candidate locators
//!
//! Process-wide shared state. Reads return cloned snapshots and are
//! safe for unbounded concurrent callers; writes go through the
//! per-key entry lock, so mutations for one logical element are
//! serialized while different elements proceed in parallel.
//!
//! Confidence moves only here, by the exponential update rule:
//! success  `c' = c + alpha * (1 - c)`
//! failure  `c' = c * (1 - beta)`
//! with `alpha > beta` so one good run recovers faster than one bad
//! run punishes. Candidates that sink below the floor after enough
//! observations are pruned.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sitepilot_core_types::{Candidate, LogicalElement};
use tracing::{debug, warn};

/// Confidence update policy
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StorePolicy {
    /// Success gain factor
    pub alpha: f64,

    /// Failure decay factor, strictly less than `alpha`
    pub beta: f64,

    /// Candidates below this confidence are pruned once seasoned
    pub floor: f64,

    /// Minimum observations before pruning is allowed
    pub min_observations: u64,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            alpha: 0.30,
            beta: 0.15,
            floor: 0.05,
            min_observations: 5,
        }
    }
}

/// One persisted knowledge entry
#[derive(Clone, Debug, Serialize, Deserialize)]
struct KnowledgeEntry {
    element: LogicalElement,
    candidates: Vec<Candidate>,
}

#[derive(Default)]
struct StoreMetrics {
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    upserts: AtomicU64,
    outcomes: AtomicU64,
    prunes: AtomicU64,
}

impl StoreMetrics {
    fn record_lookup(&self, hit: bool) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Point-in-time store statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatsSnapshot {
    pub total_queries: u64,
    pub hit_queries: u64,
    pub miss_queries: u64,
    pub hit_rate: f64,
    pub upserts: u64,
    pub outcomes_recorded: u64,
    pub pruned_candidates: u64,
    pub current_elements: u64,
    pub current_candidates: u64,
}

/// Persistent knowledge store
#[derive(Default)]
pub struct KnowledgeStore {
    inner: DashMap<String, KnowledgeEntry>,
    storage_path: Option<PathBuf>,
    policy: StorePolicy,
    metrics: StoreMetrics,
}

pub type SharedKnowledgeStore = Arc<KnowledgeStore>;

impl KnowledgeStore {
    pub fn new(policy: StorePolicy) -> Self {
        Self {
            inner: DashMap::new(),
            storage_path: None,
            policy,
            metrics: StoreMetrics::default(),
        }
    }

    /// Open a store backed by a JSON file, loading any existing state.
    pub fn with_persistence(path: impl Into<PathBuf>, policy: StorePolicy) -> io::Result<Self> {
        let path = path.into();
        let store = Self {
            inner: DashMap::new(),
            storage_path: Some(path.clone()),
            policy,
            metrics: StoreMetrics::default(),
        };

        if path.exists() {
            let bytes = fs::read(&path)?;
            if !bytes.is_empty() {
                let entries: Vec<KnowledgeEntry> = serde_json::from_slice(&bytes)
                    .map_err(|err| io::Error::new(ErrorKind::InvalidData, format!("{err}")))?;
                for entry in entries {
                    store.inner.insert(entry.element.key(), entry);
                }
            }
        }

        Ok(store)
    }

    pub fn policy(&self) -> StorePolicy {
        self.policy
    }

    /// All known candidates for an element, highest confidence first.
    pub fn get_candidates(&self, element: &LogicalElement) -> Vec<Candidate> {
        let result = self.inner.get(&element.key()).map(|entry| {
            let mut candidates = entry.candidates.clone();
            candidates.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            candidates
        });
        self.metrics
            .record_lookup(result.as_ref().is_some_and(|c| !c.is_empty()));
        result.unwrap_or_default()
    }

    /// Best-known candidate, if any
    pub fn top_candidate(&self, element: &LogicalElement) -> Option<Candidate> {
        self.get_candidates(element).into_iter().next()
    }

    /// Look up a candidate by locator fingerprint
    pub fn find_by_fingerprint(
        &self,
        element: &LogicalElement,
        fingerprint: &str,
    ) -> Option<Candidate> {
        self.inner.get(&element.key()).and_then(|entry| {
            entry
                .candidates
                .iter()
                .find(|c| c.fingerprint() == fingerprint)
                .cloned()
        })
    }

    /// Insert or refresh a candidate. Matching is by locator
    /// fingerprint; a re-discovered locator keeps its history and
    /// takes the higher of the two confidences.
    pub fn upsert(&self, element: &LogicalElement, candidate: Candidate) {
        let mut entry = self
            .inner
            .entry(element.key())
            .or_insert_with(|| KnowledgeEntry {
                element: element.clone(),
                candidates: Vec::new(),
            });

        let fp = candidate.fingerprint();
        match entry
            .candidates
            .iter_mut()
            .find(|c| c.fingerprint() == fp)
        {
            Some(existing) => {
                existing.confidence = existing.confidence.max(candidate.confidence);
                existing.discovered_via = candidate.discovered_via;
            }
            None => entry.candidates.push(candidate),
        }
        drop(entry);

        self.metrics.upserts.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = self.persist_to_disk() {
            warn!(error = %err, "knowledge store persist failed after upsert");
        }
    }

    /// Atomically apply one attempt outcome to a candidate.
    ///
    /// Returns the updated candidate, or `None` when the candidate is
    /// unknown or was pruned by this very outcome.
    pub fn record_outcome(
        &self,
        element: &LogicalElement,
        candidate_id: &str,
        success: bool,
    ) -> Option<Candidate> {
        let mut updated: Option<Candidate> = None;
        let mut pruned = false;

        if let Some(mut entry) = self.inner.get_mut(&element.key()) {
            if let Some(candidate) = entry.candidates.iter_mut().find(|c| c.id == candidate_id) {
                if success {
                    candidate.confidence += self.policy.alpha * (1.0 - candidate.confidence);
                    candidate.success_count += 1;
                    candidate.last_verified_at = Some(Utc::now());
                } else {
                    candidate.confidence *= 1.0 - self.policy.beta;
                    candidate.failure_count += 1;
                }
                candidate.confidence = candidate.confidence.clamp(0.0, 1.0);

                if candidate.confidence < self.policy.floor
                    && candidate.observations() >= self.policy.min_observations
                {
                    pruned = true;
                } else {
                    updated = Some(candidate.clone());
                }
            }

            if pruned {
                let before = entry.candidates.len();
                entry
                    .candidates
                    .retain(|c| c.id != candidate_id);
                if entry.candidates.len() < before {
                    debug!(element = %entry.element, candidate = candidate_id, "pruned candidate below floor");
                    self.metrics.prunes.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.metrics.outcomes.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = self.persist_to_disk() {
            warn!(error = %err, "knowledge store persist failed after outcome");
        }
        updated
    }

    /// Remove a candidate outright (e.g. operator intervention)
    pub fn remove(&self, element: &LogicalElement, fingerprint: &str) -> bool {
        let mut removed = false;
        if let Some(mut entry) = self.inner.get_mut(&element.key()) {
            let before = entry.candidates.len();
            entry.candidates.retain(|c| c.fingerprint() != fingerprint);
            removed = entry.candidates.len() < before;
        }
        if removed {
            if let Err(err) = self.persist_to_disk() {
                warn!(error = %err, "knowledge store persist failed after remove");
            }
        }
        removed
    }

    /// Elements currently known to the store
    pub fn elements(&self) -> Vec<LogicalElement> {
        self.inner
            .iter()
            .map(|entry| entry.element.clone())
            .collect()
    }

    pub fn persist_now(&self) -> io::Result<()> {
        self.persist_to_disk()
    }

    pub fn stats_snapshot(&self) -> StoreStatsSnapshot {
        let total_queries = self.metrics.lookups.load(Ordering::Relaxed);
        let hit_queries = self.metrics.hits.load(Ordering::Relaxed);
        let miss_queries = self.metrics.misses.load(Ordering::Relaxed);
        let hit_rate = if total_queries == 0 {
            0.0
        } else {
            hit_queries as f64 / total_queries as f64
        };
        StoreStatsSnapshot {
            total_queries,
            hit_queries,
            miss_queries,
            hit_rate,
            upserts: self.metrics.upserts.load(Ordering::Relaxed),
            outcomes_recorded: self.metrics.outcomes.load(Ordering::Relaxed),
            pruned_candidates: self.metrics.prunes.load(Ordering::Relaxed),
            current_elements: self.inner.len() as u64,
            current_candidates: self
                .inner
                .iter()
                .map(|e| e.candidates.len() as u64)
                .sum(),
        }
    }

    fn persist_to_disk(&self) -> io::Result<()> {
        let Some(path) = self.storage_path.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut entries: Vec<KnowledgeEntry> =
            self.inner.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.element.key().cmp(&b.element.key()));
        let json = serde_json::to_vec_pretty(&entries)
            .map_err(|err| io::Error::new(ErrorKind::Other, format!("{err}")))?;
        fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitepilot_core_types::{DiscoverySource, Locator};

    fn element() -> LogicalElement {
        LogicalElement::new("betslip", "confirm_button")
    }

    fn candidate(selector: &str, confidence: f64) -> Candidate {
        Candidate::new(
            Locator::selector(selector),
            confidence,
            DiscoverySource::Cached,
        )
    }

    #[test]
    fn test_candidates_ordered_by_confidence() {
        let store = KnowledgeStore::new(StorePolicy::default());
        store.upsert(&element(), candidate("#weak", 0.3));
        store.upsert(&element(), candidate("#strong", 0.9));

        let ranked = store.get_candidates(&element());
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].locator.selector_value(), Some("#strong"));
    }

    #[test]
    fn test_confidence_stays_in_unit_interval() {
        let store = KnowledgeStore::new(StorePolicy::default());
        let c = candidate("#x", 0.5);
        let id = c.id.clone();
        store.upsert(&element(), c);

        for _ in 0..50 {
            store.record_outcome(&element(), &id, true);
        }
        let after = store.top_candidate(&element()).unwrap();
        assert!(after.confidence <= 1.0 && after.confidence > 0.99);
    }

    #[test]
    fn test_success_recovers_faster_than_failure_punishes() {
        let policy = StorePolicy::default();
        assert!(policy.alpha > policy.beta);

        let store = KnowledgeStore::new(policy);
        let c = candidate("#x", 0.5);
        let id = c.id.clone();
        store.upsert(&element(), c);

        store.record_outcome(&element(), &id, false);
        let dropped = store.top_candidate(&element()).unwrap().confidence;
        store.record_outcome(&element(), &id, true);
        let recovered = store.top_candidate(&element()).unwrap().confidence;

        // One success after one failure lands above the start point
        assert!(dropped < 0.5);
        assert!(recovered > 0.5);
    }

    #[test]
    fn test_single_failure_is_bounded_decay() {
        let store = KnowledgeStore::new(StorePolicy::default());
        let c = candidate("#x", 0.9);
        let id = c.id.clone();
        store.upsert(&element(), c);

        store.record_outcome(&element(), &id, false);
        let after = store.top_candidate(&element()).unwrap().confidence;
        assert!(after > 0.7, "one failure must not crater confidence: {after}");
    }

    #[test]
    fn test_prune_below_floor_after_min_observations() {
        let store = KnowledgeStore::new(StorePolicy {
            min_observations: 3,
            ..StorePolicy::default()
        });
        let c = candidate("#dead", 0.05);
        let id = c.id.clone();
        store.upsert(&element(), c);

        store.record_outcome(&element(), &id, false);
        store.record_outcome(&element(), &id, false);
        assert!(store.top_candidate(&element()).is_some());

        let updated = store.record_outcome(&element(), &id, false);
        assert!(updated.is_none());
        assert!(store.top_candidate(&element()).is_none());
        assert_eq!(store.stats_snapshot().pruned_candidates, 1);
    }

    #[test]
    fn test_upsert_merges_by_fingerprint() {
        let store = KnowledgeStore::new(StorePolicy::default());
        let mut seasoned = candidate("#same", 0.4);
        seasoned.success_count = 7;
        store.upsert(&element(), seasoned);
        store.upsert(
            &element(),
            Candidate::new(Locator::selector("#same"), 0.8, DiscoverySource::AiCloud),
        );

        let ranked = store.get_candidates(&element());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].success_count, 7);
        assert_eq!(ranked[0].confidence, 0.8);
        assert_eq!(ranked[0].discovered_via, DiscoverySource::AiCloud);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");

        {
            let store =
                KnowledgeStore::with_persistence(&path, StorePolicy::default()).unwrap();
            store.upsert(&element(), candidate("#confirm", 0.85));
        }

        let reloaded = KnowledgeStore::with_persistence(&path, StorePolicy::default()).unwrap();
        let top = reloaded.top_candidate(&element()).unwrap();
        assert_eq!(top.locator.selector_value(), Some("#confirm"));
        assert!((top.confidence - 0.85).abs() < 1e-9);
    }
}
