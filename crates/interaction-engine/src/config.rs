//! Engine configuration - retry budgets and per-step deadlines

use std::time::Duration;

use candidate_gate::GatePolicy;
use serde::{Deserialize, Serialize};

/// Tunable policy for one engine instance.
///
/// The relative ordering matters more than the exact numbers: local
/// validation retries are far cheaper than AI escalations, and the
/// store's alpha must stay above its beta. Exact values are tuned per
/// deployment through the config file.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Validation thresholds (cached trust, accept score, absent score)
    pub gate: GatePolicy,

    /// Local validation retries per cycle (R)
    pub local_retries: u32,

    /// Full resolve-execute-verify cycles before giving up (M)
    pub max_cycles: u32,

    /// Backoff between local validation retries
    #[serde(with = "humantime_serde_duration")]
    pub local_retry_backoff: Duration,

    /// Deadline for one local validation probe
    #[serde(with = "humantime_serde_duration")]
    pub validate_timeout: Duration,

    /// Deadline for a page snapshot capture
    #[serde(with = "humantime_serde_duration")]
    pub snapshot_timeout: Duration,

    /// Total discovery budget per escalation, shared across backends
    #[serde(with = "humantime_serde_duration")]
    pub discovery_deadline: Duration,

    /// Deadline for locate + act
    #[serde(with = "humantime_serde_duration")]
    pub exec_timeout: Duration,

    /// Deadline for the caller's verify probe
    #[serde(with = "humantime_serde_duration")]
    pub verify_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gate: GatePolicy::default(),
            local_retries: 2,
            max_cycles: 3,
            local_retry_backoff: Duration::from_millis(250),
            validate_timeout: Duration::from_secs(1),
            snapshot_timeout: Duration::from_secs(2),
            discovery_deadline: Duration::from_secs(8),
            exec_timeout: Duration::from_secs(5),
            verify_timeout: Duration::from_secs(3),
        }
    }
}

impl EngineConfig {
    /// Hard ceiling on wall-clock time for one `perform` call.
    ///
    /// Worst case per cycle: snapshot, R+1 validations with backoff,
    /// one discovery escalation plus validating its result, execute,
    /// verify. Multiplied by M cycles. Dual-path runs two such paths
    /// concurrently, so the bound is unchanged.
    pub fn worst_case_bound(&self) -> Duration {
        let validations = self.validate_timeout + self.local_retry_backoff;
        let per_cycle = self.snapshot_timeout
            + validations * (self.local_retries + 1)
            + self.discovery_deadline
            + self.validate_timeout
            + self.exec_timeout
            + self.verify_timeout;
        per_cycle * self.max_cycles
    }
}

/// Duration (de)serialization in humantime notation ("250ms", "8s")
mod humantime_serde_duration {
    use super::*;
    use serde::{de::Error as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let raw: String = serde::Deserialize::deserialize(de)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_case_bound_scales_with_budget() {
        let small = EngineConfig {
            max_cycles: 1,
            ..EngineConfig::default()
        };
        let large = EngineConfig {
            max_cycles: 5,
            ..EngineConfig::default()
        };
        assert!(large.worst_case_bound() > small.worst_case_bound());
        assert_eq!(large.worst_case_bound(), small.worst_case_bound() * 5);
    }

    #[test]
    fn test_durations_roundtrip_as_humantime() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("250ms"));
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.local_retry_backoff, config.local_retry_backoff);
        assert_eq!(back.discovery_deadline, config.discovery_deadline);
    }
}
