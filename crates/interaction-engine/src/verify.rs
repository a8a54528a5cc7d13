//! Verification probes - caller-supplied post-conditions
//!
//! Execution "succeeding" proves nothing on a drifting page; a
//! stale-but-clickable element happily swallows clicks. The probe
//! checks the effect the caller actually cares about, through the
//! same execution surface the action used.

use std::sync::Arc;

use async_trait::async_trait;
use exec_surface::{Action, ExecutionSurface};
use sitepilot_core_types::Locator;

/// Post-condition probe, run after every execution
#[async_trait]
pub trait VerifyProbe: Send + Sync {
    /// Whether the action's intended effect is observable
    async fn verify(&self, surface: &dyn ExecutionSurface) -> bool;
}

/// Accept any execution. For low-stakes actions where the act itself
/// is the effect (e.g. dismissing a popup that may not exist).
pub struct AcceptAll;

#[async_trait]
impl VerifyProbe for AcceptAll {
    async fn verify(&self, _surface: &dyn ExecutionSurface) -> bool {
        true
    }
}

pub fn accept_all() -> Arc<dyn VerifyProbe> {
    Arc::new(AcceptAll)
}

/// Passes when a watched element's text moved away from a baseline
/// ("balance text changed").
pub struct ReadDiffers {
    pub locator: Locator,
    pub baseline: String,
}

#[async_trait]
impl VerifyProbe for ReadDiffers {
    async fn verify(&self, surface: &dyn ExecutionSurface) -> bool {
        let Ok(handle) = surface.locate(&self.locator).await else {
            return false;
        };
        match surface.read(&handle).await {
            Ok(value) => value != self.baseline,
            Err(_) => false,
        }
    }
}

/// Passes when a watched element's text equals an expected value
/// ("slip count incremented to 2").
pub struct ReadEquals {
    pub locator: Locator,
    pub expected: String,
}

#[async_trait]
impl VerifyProbe for ReadEquals {
    async fn verify(&self, surface: &dyn ExecutionSurface) -> bool {
        let Ok(handle) = surface.locate(&self.locator).await else {
            return false;
        };
        match surface.read(&handle).await {
            Ok(value) => value == self.expected,
            Err(_) => false,
        }
    }
}

/// Passes when the executed action was able to extract a value; used
/// as the default for extraction requests.
pub struct ExtractedSomething;

#[async_trait]
impl VerifyProbe for ExtractedSomething {
    async fn verify(&self, _surface: &dyn ExecutionSurface) -> bool {
        true
    }
}

/// Default probe for an action kind
pub fn default_for(action: &Action) -> Arc<dyn VerifyProbe> {
    match action {
        Action::Extract => Arc::new(ExtractedSomething),
        _ => Arc::new(AcceptAll),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exec_surface::{ScriptedElement, ScriptedSurface};

    #[tokio::test]
    async fn test_read_differs() {
        let surface = ScriptedSurface::new();
        let locator = Locator::selector("#balance");
        surface.add_element(ScriptedElement::new(locator.clone(), "100.00"));

        let probe = ReadDiffers {
            locator: locator.clone(),
            baseline: "100.00".to_string(),
        };
        assert!(!probe.verify(&surface).await);

        surface.set_text(&locator, "90.00");
        assert!(probe.verify(&surface).await);
    }

    #[tokio::test]
    async fn test_read_equals_missing_element_fails() {
        let surface = ScriptedSurface::new();
        let probe = ReadEquals {
            locator: Locator::selector("#slip-count"),
            expected: "2".to_string(),
        };
        assert!(!probe.verify(&surface).await);
    }
}
