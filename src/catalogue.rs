//! Built-in logical element catalogue
//!
//! Logical elements are declared up front, one entry per page context
//! and role, each with a natural-language hint handed to discovery
//! backends when the element needs healing. Callers address elements
//! by (context, role); nothing outside the knowledge store ever pins
//! them to a concrete selector.

use once_cell::sync::Lazy;
use sitepilot_core_types::{Criticality, LogicalElement};

/// One catalogued element
pub struct CatalogueEntry {
    pub element: LogicalElement,
    /// Description handed to discovery backends as the task hint
    pub hint: &'static str,
    /// Critical entries are read-only values fetched through the
    /// dual-path protocol
    pub criticality: Criticality,
}

fn entry(
    context: &str,
    role: &str,
    hint: &'static str,
    criticality: Criticality,
) -> CatalogueEntry {
    CatalogueEntry {
        element: LogicalElement::new(context, role),
        hint,
        criticality,
    }
}

static CATALOGUE: Lazy<Vec<CatalogueEntry>> = Lazy::new(|| {
    use Criticality::{Critical, Normal};
    vec![
        entry(
            "login",
            "username_input",
            "Username or phone number field on the login form",
            Normal,
        ),
        entry(
            "login",
            "password_input",
            "Password field on the login form",
            Normal,
        ),
        entry(
            "login",
            "login_button",
            "Primary submit button on the login form",
            Normal,
        ),
        entry(
            "login",
            "cookie_accept_button",
            "Primary accept button in the cookie consent banner",
            Normal,
        ),
        entry(
            "main",
            "balance_display",
            "Account balance amount shown in the top navigation bar",
            Critical,
        ),
        entry(
            "main",
            "search_input",
            "Site-wide search text input in the header",
            Normal,
        ),
        entry(
            "main",
            "account_menu",
            "Logged-in account menu toggle in the header",
            Normal,
        ),
        entry(
            "event",
            "odds_display",
            "Current odds value for the selected market",
            Normal,
        ),
        entry(
            "event",
            "add_to_slip_button",
            "Button that adds the selected market to the slip",
            Normal,
        ),
        entry(
            "betslip",
            "stake_input",
            "Stake amount text input inside the open slip panel",
            Normal,
        ),
        entry(
            "betslip",
            "slip_count",
            "Counter badge showing the number of selections in the slip",
            Normal,
        ),
        entry(
            "betslip",
            "booking_code_input",
            "Booking code entry field in the slip panel",
            Normal,
        ),
        entry(
            "betslip",
            "clear_slip_button",
            "Button that removes all selections from the slip",
            Normal,
        ),
        entry(
            "betslip",
            "booking_code_display",
            "Booking code shown after the slip is placed",
            Critical,
        ),
        entry(
            "betslip",
            "confirm_button",
            "Confirmation button at the bottom of the slip panel",
            Normal,
        ),
        entry(
            "betslip",
            "place_bet_button",
            "Final place-bet submit button in the slip panel",
            Normal,
        ),
    ]
});

/// All catalogued elements
pub fn entries() -> &'static [CatalogueEntry] {
    &CATALOGUE
}

/// Look up one entry by context and role
pub fn find(context: &str, role: &str) -> Option<&'static CatalogueEntry> {
    CATALOGUE
        .iter()
        .find(|e| e.element.page_context == context && e.element.element_role == role)
}

/// Discovery hint for an element, when catalogued
pub fn task_hint(element: &LogicalElement) -> Option<&'static str> {
    find(&element.page_context, &element.element_role).map(|e| e.hint)
}

/// Page contexts present in the catalogue, deduplicated in order
pub fn contexts() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for entry in CATALOGUE.iter() {
        let ctx = entry.element.page_context.as_str();
        if !out.contains(&ctx) {
            out.push(ctx);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_context_and_role() {
        let entry = find("betslip", "confirm_button").unwrap();
        assert_eq!(entry.criticality, Criticality::Normal);
        assert!(entry.hint.contains("slip"));
        assert!(find("betslip", "no_such_role").is_none());
    }

    #[test]
    fn test_critical_entries_are_reads() {
        // Dual-path runs an action on both paths, so only elements
        // that are read (never clicked or typed into) carry Critical
        for entry in entries() {
            if entry.criticality == Criticality::Critical {
                assert!(
                    entry.element.element_role.ends_with("_display"),
                    "{} must not be critical",
                    entry.element.key()
                );
            }
        }
    }

    #[test]
    fn test_hint_resolves_from_element() {
        let element = LogicalElement::new("login", "cookie_accept_button");
        assert!(task_hint(&element).unwrap().contains("cookie"));
    }

    #[test]
    fn test_entries_are_unique() {
        let mut keys: Vec<String> = entries().iter().map(|e| e.element.key()).collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), before);
    }

    #[test]
    fn test_contexts_cover_the_flow() {
        let contexts = contexts();
        assert!(contexts.contains(&"login"));
        assert!(contexts.contains(&"betslip"));
    }
}
