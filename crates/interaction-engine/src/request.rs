//! Caller-facing request and outcome types

use std::sync::Arc;
use std::time::Duration;

use exec_surface::Action;
use sitepilot_core_types::{AttemptPath, Criticality, LogicalElement};

use crate::verify::VerifyProbe;

/// One logical action to perform
#[derive(Clone)]
pub struct PerformRequest {
    /// Target element
    pub element: LogicalElement,

    /// Action to execute against the resolved handle
    pub action: Action,

    /// Natural-language description of the target, passed to
    /// discovery backends as the task description
    pub task_hint: String,

    /// Action-specific post-condition; execution without a passing
    /// verify is a failure, not a success
    pub verify: Arc<dyn VerifyProbe>,

    /// Normal = single path, Critical = primary + backup
    pub criticality: Criticality,
}

impl PerformRequest {
    pub fn new(element: LogicalElement, action: Action) -> Self {
        let task_hint = format!(
            "{} on the {} screen",
            element.element_role.replace('_', " "),
            element.page_context
        );
        Self {
            element,
            action,
            task_hint,
            verify: crate::verify::accept_all(),
            criticality: Criticality::Normal,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.task_hint = hint.into();
        self
    }

    pub fn with_verify(mut self, probe: Arc<dyn VerifyProbe>) -> Self {
        self.verify = probe;
        self
    }

    pub fn critical(mut self) -> Self {
        self.criticality = Criticality::Critical;
        self
    }
}

/// Successful outcome of a `perform` call
#[derive(Debug, Clone)]
pub struct PerformOutcome {
    /// Extracted value, when the action was an extraction
    pub value: Option<String>,

    /// Attempts spent, including the successful one
    pub attempts: u32,

    /// Path that produced the adopted result
    pub path: AttemptPath,

    /// Total wall-clock time
    pub elapsed: Duration,
}
