//! Local heuristic backend - zero-cost guesses before any model call
//!
//! Derives selector guesses from the element role and task hint and
//! keeps the ones with a structural footprint in the snapshot markup.
//! Confidence is deliberately modest: these are educated guesses, and
//! the gate plus verify step decide whether they survive.

use async_trait::async_trait;
use sitepilot_core_types::{Candidate, DiscoverySource, Locator};
use tracing::debug;

use crate::{backend::*, errors::DiscoveryError};

/// Confidence assigned to a guess whose token appears in the markup
const TOKEN_HIT_CONFIDENCE: f64 = 0.45;

/// Bonus when the full hyphenated role matches
const FULL_ROLE_BONUS: f64 = 0.15;

/// Heuristic discovery backend
#[derive(Debug, Default, Clone)]
pub struct HeuristicBackend;

impl HeuristicBackend {
    pub fn new() -> Self {
        Self
    }

    fn guesses_for(role: &str) -> Vec<(String, bool)> {
        let hyphenated = role.replace('_', "-");
        let mut guesses: Vec<(String, bool)> = vec![
            (format!("#{hyphenated}"), true),
            (format!(".{hyphenated}"), true),
            (format!("[data-testid=\"{hyphenated}\"]"), true),
        ];
        for token in role.split('_').filter(|t| t.len() > 2) {
            guesses.push((format!("#{token}"), false));
            guesses.push((format!(".{token}"), false));
        }
        guesses
    }
}

#[async_trait]
impl DiscoveryBackend for HeuristicBackend {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn source(&self) -> DiscoverySource {
        DiscoverySource::LocalHeuristic
    }

    async fn discover(&self, request: &DiscoveryRequest) -> Result<Vec<Candidate>, DiscoveryError> {
        let mut proposals = Vec::new();

        for (selector, full_role) in Self::guesses_for(&request.element.element_role) {
            if !request.snapshot.markup_mentions(&selector) {
                continue;
            }
            let confidence = if full_role {
                TOKEN_HIT_CONFIDENCE + FULL_ROLE_BONUS
            } else {
                TOKEN_HIT_CONFIDENCE
            };
            proposals.push(Candidate::new(
                Locator::selector(selector),
                confidence,
                self.source(),
            ));
        }

        debug!(
            element = %request.element,
            proposals = proposals.len(),
            "heuristic discovery done"
        );

        if proposals.is_empty() {
            Err(DiscoveryError::BackendDeclined {
                backend: self.name().to_string(),
                reason: "no role token found in markup".to_string(),
            })
        } else {
            Ok(proposals)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exec_surface::LiveSnapshot;
    use sitepilot_core_types::LogicalElement;
    use std::time::Duration;

    fn request(markup: &str) -> DiscoveryRequest {
        DiscoveryRequest::new(
            LogicalElement::new("betslip", "confirm_button"),
            "Confirm button",
            LiveSnapshot::new("betslip", markup),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn test_full_role_match_ranks_higher() {
        let backend = HeuristicBackend::new();
        let req = request("<button class=\"confirm-button\">OK</button>");
        let got = backend.discover(&req).await.unwrap();
        let top = got
            .iter()
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap())
            .unwrap();
        assert!(top.confidence > TOKEN_HIT_CONFIDENCE);
        assert_eq!(top.discovered_via, DiscoverySource::LocalHeuristic);
    }

    #[tokio::test]
    async fn test_declines_on_blank_page() {
        let backend = HeuristicBackend::new();
        let req = request("<div>nothing relevant</div>");
        let err = backend.discover(&req).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::BackendDeclined { .. }));
    }
}
