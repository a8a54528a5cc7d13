//! Local candidate validation - the cheap check before any AI call
//!
//! Scores a candidate against the live page without model calls:
//! selector format sanity, a locate probe, and structural presence in
//! the snapshot markup. The score lands in one of three bands:
//!
//! - pass: trust the candidate, execute now
//! - low-confidence: element referenced in markup but not resolving,
//!   likely a transient render; worth a short local retry
//! - absent: nothing points at it, escalate immediately
//!
//! The format blacklist comes from patterns that repeatedly produced
//! dead selectors in production: jQuery's `:contains()` pseudo-class
//! and skeleton loading-state classes.

use std::sync::Arc;

use async_trait::async_trait;
use exec_surface::{ExecutionSurface, LiveSnapshot};
use serde::{Deserialize, Serialize};
use sitepilot_core_types::Candidate;
use tracing::debug;

/// Selector substrings that are never acceptable
const FORBIDDEN_SELECTOR_PATTERNS: &[&str] = &[":contains(", "skeleton", "ska__"];

/// Validation thresholds
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Stored confidence needed to trust the cache without escalation
    pub cached_trust: f64,

    /// Validation score needed to accept a candidate
    pub accept_score: f64,

    /// Scores below this mean the element is absent; retrying the
    /// local check buys nothing
    pub absent_score: f64,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            cached_trust: 0.7,
            accept_score: 0.5,
            absent_score: 0.1,
        }
    }
}

/// Band a validation score falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationBand {
    /// Accept without escalation
    Pass,

    /// Transient-looking miss; retry locally with backoff
    LowConfidence,

    /// Element absent; escalate immediately
    Absent,
}

impl GatePolicy {
    pub fn band(&self, score: f64) -> ValidationBand {
        if score >= self.accept_score {
            ValidationBand::Pass
        } else if score < self.absent_score {
            ValidationBand::Absent
        } else {
            ValidationBand::LowConfidence
        }
    }
}

/// Candidate gate trait
#[async_trait]
pub trait CandidateGate: Send + Sync {
    /// Score a candidate against the live page, in [0, 1].
    /// Fast and local; never calls a discovery backend.
    async fn validate(&self, candidate: &Candidate, snapshot: &LiveSnapshot) -> f64;
}

/// Basic syntactic screen for selector strings
pub fn selector_format_ok(selector: &str) -> bool {
    if selector.trim().is_empty() {
        return false;
    }
    let lowered = selector.to_ascii_lowercase();
    !FORBIDDEN_SELECTOR_PATTERNS
        .iter()
        .any(|p| lowered.contains(p))
}

/// Default gate: format screen + locate probe + markup presence
pub struct LocalProbeGate {
    surface: Arc<dyn ExecutionSurface>,
}

impl LocalProbeGate {
    pub fn new(surface: Arc<dyn ExecutionSurface>) -> Self {
        Self { surface }
    }
}

#[async_trait]
impl CandidateGate for LocalProbeGate {
    async fn validate(&self, candidate: &Candidate, snapshot: &LiveSnapshot) -> f64 {
        if let Some(selector) = candidate.locator.selector_value() {
            if !selector_format_ok(selector) {
                debug!(selector, "candidate rejected by format screen");
                return 0.0;
            }
        }

        let located = self.surface.locate(&candidate.locator).await.is_ok();
        // Coordinate locators have no structural footprint to check
        let in_markup = match candidate.locator.selector_value() {
            Some(selector) => snapshot.markup_mentions(selector),
            None => located,
        };

        let score = match (located, in_markup) {
            (true, true) => 0.9,
            (true, false) => 0.7,
            (false, true) => 0.35,
            (false, false) => 0.0,
        };
        debug!(
            candidate = %candidate.locator,
            located,
            in_markup,
            score,
            "candidate validated"
        );
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exec_surface::{ScriptedElement, ScriptedSurface};
    use sitepilot_core_types::{DiscoverySource, Locator};

    fn candidate(selector: &str) -> Candidate {
        Candidate::new(Locator::selector(selector), 0.8, DiscoverySource::Cached)
    }

    #[test]
    fn test_selector_format_screen() {
        assert!(selector_format_ok("#confirm"));
        assert!(selector_format_ok("div.slip > button[data-id='ok']"));
        assert!(!selector_format_ok(""));
        assert!(!selector_format_ok("a:contains(\"Login\")"));
        assert!(!selector_format_ok(".ska__row"));
        assert!(!selector_format_ok("div.skeleton-loader"));
    }

    #[test]
    fn test_bands() {
        let policy = GatePolicy::default();
        assert_eq!(policy.band(0.9), ValidationBand::Pass);
        assert_eq!(policy.band(0.5), ValidationBand::Pass);
        assert_eq!(policy.band(0.35), ValidationBand::LowConfidence);
        assert_eq!(policy.band(0.0), ValidationBand::Absent);
    }

    #[tokio::test]
    async fn test_visible_element_passes() {
        let surface = Arc::new(ScriptedSurface::new());
        surface.add_element(ScriptedElement::new(Locator::selector("#confirm"), "OK"));
        let snapshot = surface.snapshot("betslip").await.unwrap();

        let gate = LocalProbeGate::new(surface);
        let score = gate.validate(&candidate("#confirm"), &snapshot).await;
        assert_eq!(GatePolicy::default().band(score), ValidationBand::Pass);
    }

    #[tokio::test]
    async fn test_hidden_element_lands_in_low_band() {
        let surface = Arc::new(ScriptedSurface::new());
        let locator = Locator::selector("#confirm");
        surface.add_element(ScriptedElement::new(locator.clone(), "OK"));
        surface.set_visible(&locator, false);
        let snapshot = surface.snapshot("betslip").await.unwrap();

        let gate = LocalProbeGate::new(surface);
        let score = gate.validate(&candidate("#confirm"), &snapshot).await;
        assert_eq!(
            GatePolicy::default().band(score),
            ValidationBand::LowConfidence
        );
    }

    #[tokio::test]
    async fn test_missing_element_is_absent() {
        let surface = Arc::new(ScriptedSurface::new());
        let snapshot = surface.snapshot("betslip").await.unwrap();

        let gate = LocalProbeGate::new(surface);
        let score = gate.validate(&candidate("#ghost"), &snapshot).await;
        assert_eq!(GatePolicy::default().band(score), ValidationBand::Absent);
    }

    #[tokio::test]
    async fn test_forbidden_selector_scores_zero() {
        let surface = Arc::new(ScriptedSurface::new());
        let snapshot = surface.snapshot("betslip").await.unwrap();
        let gate = LocalProbeGate::new(surface);
        let score = gate
            .validate(&candidate("li:contains(\"Bet\")"), &snapshot)
            .await;
        assert_eq!(score, 0.0);
    }
}
