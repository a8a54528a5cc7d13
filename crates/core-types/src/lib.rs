//! Shared primitives for the SitePilot self-healing interaction engine.
//!
//! Everything that crosses a crate boundary lives here: logical element
//! identity, concrete locators, ranked candidates, and the per-attempt
//! records the reinforcement layer consumes.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a semantic UI target, independent of current markup.
///
/// `page_context` names the screen or flow ("betslip", "login"),
/// `element_role` names the target within it ("confirm_button").
/// Identity is immutable; many [`Candidate`]s attach to one element.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalElement {
    pub page_context: String,
    pub element_role: String,
}

impl LogicalElement {
    pub fn new(page_context: impl Into<String>, element_role: impl Into<String>) -> Self {
        Self {
            page_context: page_context.into(),
            element_role: element_role.into(),
        }
    }

    /// Stable key used to index shared stores.
    pub fn key(&self) -> String {
        format!("{}::{}", self.page_context, self.element_role)
    }
}

impl fmt::Display for LogicalElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.page_context, self.element_role)
    }
}

/// Locator kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocatorKind {
    /// CSS/text selector
    Selector,

    /// Viewport coordinate region
    Coordinate,

    /// Selector anchored to a coordinate region
    Hybrid,
}

impl LocatorKind {
    pub fn name(&self) -> &'static str {
        match self {
            LocatorKind::Selector => "selector",
            LocatorKind::Coordinate => "coordinate",
            LocatorKind::Hybrid => "hybrid",
        }
    }
}

/// A concrete way to locate an element on the live page.
///
/// Tagged variant rather than trait objects: the execution surface
/// dispatches on the kind, nothing else needs to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    Selector {
        value: String,
    },
    Coordinate {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    Hybrid {
        value: String,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

impl Locator {
    pub fn selector(value: impl Into<String>) -> Self {
        Locator::Selector {
            value: value.into(),
        }
    }

    pub fn coordinate(x: f64, y: f64, width: f64, height: f64) -> Self {
        Locator::Coordinate {
            x,
            y,
            width,
            height,
        }
    }

    pub fn kind(&self) -> LocatorKind {
        match self {
            Locator::Selector { .. } => LocatorKind::Selector,
            Locator::Coordinate { .. } => LocatorKind::Coordinate,
            Locator::Hybrid { .. } => LocatorKind::Hybrid,
        }
    }

    /// Selector string if this locator carries one.
    pub fn selector_value(&self) -> Option<&str> {
        match self {
            Locator::Selector { value } | Locator::Hybrid { value, .. } => Some(value),
            Locator::Coordinate { .. } => None,
        }
    }

    /// Stable fingerprint used by the failure heatmap and exclusion
    /// lists. Two locators with the same fingerprint are the same
    /// pattern for healing purposes.
    pub fn fingerprint(&self) -> String {
        match self {
            Locator::Selector { value } => format!("css:{value}"),
            Locator::Coordinate {
                x,
                y,
                width,
                height,
            } => format!("xy:{x:.0},{y:.0},{width:.0},{height:.0}"),
            Locator::Hybrid {
                value,
                x,
                y,
                width,
                height,
            } => format!("hy:{value}@{x:.0},{y:.0},{width:.0},{height:.0}"),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fingerprint())
    }
}

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    /// Loaded from the persisted knowledge store
    Cached,

    /// Produced by a local, non-model heuristic
    LocalHeuristic,

    /// Proposed by an on-device model backend
    AiLocal,

    /// Proposed by a hosted model backend
    AiCloud,
}

impl DiscoverySource {
    pub fn name(&self) -> &'static str {
        match self {
            DiscoverySource::Cached => "cached",
            DiscoverySource::LocalHeuristic => "local-heuristic",
            DiscoverySource::AiLocal => "ai-local",
            DiscoverySource::AiCloud => "ai-cloud",
        }
    }
}

/// One rankable locator for a logical element, with its reliability
/// history. Confidence is adjusted only by the reinforcement layer;
/// resolvers treat it as read-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique candidate id
    pub id: String,

    /// Concrete locator
    pub locator: Locator,

    /// Reliability score in [0, 1]
    pub confidence: f64,

    #[serde(default)]
    pub success_count: u64,

    #[serde(default)]
    pub failure_count: u64,

    /// Last time execute+verify succeeded through this candidate
    #[serde(default)]
    pub last_verified_at: Option<DateTime<Utc>>,

    /// Provenance of the locator
    pub discovered_via: DiscoverySource,
}

impl Candidate {
    pub fn new(locator: Locator, confidence: f64, discovered_via: DiscoverySource) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            locator,
            confidence: confidence.clamp(0.0, 1.0),
            success_count: 0,
            failure_count: 0,
            last_verified_at: None,
            discovered_via,
        }
    }

    pub fn fingerprint(&self) -> String {
        self.locator.fingerprint()
    }

    /// Total recorded outcomes
    pub fn observations(&self) -> u64 {
        self.success_count + self.failure_count
    }
}

/// Which redundancy path produced an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPath {
    Primary,
    Backup,
}

impl AttemptPath {
    pub fn name(&self) -> &'static str {
        match self {
            AttemptPath::Primary => "primary",
            AttemptPath::Backup => "backup",
        }
    }
}

/// How far escalation had gone when the attempt was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptTier {
    /// Best-known cached candidate, first try
    Cached,

    /// Cached candidate, local validation retry
    LocalRetry,

    /// Candidate proposed by AI discovery
    AiEscalated,
}

impl AttemptTier {
    pub fn name(&self) -> &'static str {
        match self {
            AttemptTier::Cached => "cached",
            AttemptTier::LocalRetry => "local-retry",
            AttemptTier::AiEscalated => "ai-escalated",
        }
    }
}

/// Outcome of one resolve-execute-verify cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Executed and verified
    Success,

    /// Candidate rejected before execution (validation failed)
    Rejected,

    /// A deadline elapsed
    Timeout,

    /// Execution primitive errored
    ActionFailed,

    /// Execution went through but the post-condition did not hold.
    /// A stale-but-clickable element is a healing signal, not a success.
    VerifyFailed,
}

impl AttemptOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Rejected => "rejected",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::ActionFailed => "action-failed",
            AttemptOutcome::VerifyFailed => "verify-failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }

    /// Whether this outcome counts against the candidate that was tried
    pub fn counts_against_candidate(&self) -> bool {
        !self.is_success()
    }
}

/// Ephemeral record of one resolve-execute-verify cycle.
///
/// Not persisted beyond logging; fed synchronously to the
/// reinforcement layer after every attempt.
#[derive(Debug, Clone)]
pub struct ResolutionAttempt {
    pub element: LogicalElement,
    pub candidate: Candidate,
    pub path: AttemptPath,
    pub tier: AttemptTier,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

impl ResolutionAttempt {
    pub fn new(
        element: LogicalElement,
        candidate: Candidate,
        path: AttemptPath,
        tier: AttemptTier,
        outcome: AttemptOutcome,
        elapsed: Duration,
    ) -> Self {
        Self {
            element,
            candidate,
            path,
            tier,
            outcome,
            elapsed,
        }
    }
}

impl fmt::Display for ResolutionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via {} [{}/{}] -> {} in {:?}",
            self.element,
            self.candidate.fingerprint(),
            self.path.name(),
            self.tier.name(),
            self.outcome.name(),
            self.elapsed
        )
    }
}

/// Whether an action requires the dual-path redundancy protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Single-path state machine only
    Normal,

    /// Primary + Backup paths raced, backup adopted on primary failure
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_key() {
        let el = LogicalElement::new("betslip", "confirm_button");
        assert_eq!(el.key(), "betslip::confirm_button");
        assert_eq!(el.to_string(), "betslip::confirm_button");
    }

    #[test]
    fn test_locator_fingerprint() {
        let css = Locator::selector("#confirm");
        assert_eq!(css.fingerprint(), "css:#confirm");
        assert_eq!(css.kind(), LocatorKind::Selector);

        let xy = Locator::coordinate(120.0, 80.4, 40.0, 20.0);
        assert_eq!(xy.fingerprint(), "xy:120,80,40,20");
        assert!(xy.selector_value().is_none());
    }

    #[test]
    fn test_candidate_confidence_clamped() {
        let c = Candidate::new(Locator::selector("#x"), 1.7, DiscoverySource::AiCloud);
        assert_eq!(c.confidence, 1.0);
        let c = Candidate::new(Locator::selector("#x"), -0.2, DiscoverySource::Cached);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn test_outcome_classification() {
        assert!(AttemptOutcome::Success.is_success());
        assert!(!AttemptOutcome::Success.counts_against_candidate());
        assert!(AttemptOutcome::VerifyFailed.counts_against_candidate());
        assert!(AttemptOutcome::Timeout.counts_against_candidate());
    }

    #[test]
    fn test_candidate_roundtrips_through_json() {
        let c = Candidate::new(Locator::selector(".slip-total"), 0.8, DiscoverySource::Cached);
        let json = serde_json::to_string(&c).unwrap();
        let back: Candidate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.locator, c.locator);
        assert_eq!(back.discovered_via, c.discovered_via);
    }
}
