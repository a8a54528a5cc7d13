//! Scripted in-memory surface for tests and offline development
//!
//! Models a page as a set of scripted elements keyed by locator
//! fingerprint. Tests drive layout drift by removing, hiding, or
//! renaming elements between cycles and inject action failures to
//! exercise the recovery protocol.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use sitepilot_core_types::Locator;
use tracing::debug;

use crate::{errors::SurfaceError, surface::ExecutionSurface, types::*};

/// One scripted element on the fake page
#[derive(Debug, Clone)]
pub struct ScriptedElement {
    pub locator: Locator,
    pub text: String,

    /// Hidden elements stay in the markup but do not resolve,
    /// which is what a slow render looks like from outside.
    pub visible: bool,

    pub enabled: bool,
}

impl ScriptedElement {
    pub fn new(locator: Locator, text: impl Into<String>) -> Self {
        Self {
            locator,
            text: text.into(),
            visible: true,
            enabled: true,
        }
    }
}

/// In-memory [`ExecutionSurface`] implementation
#[derive(Default)]
pub struct ScriptedSurface {
    elements: DashMap<String, ScriptedElement>,
    markup_override: RwLock<HashMap<String, String>>,
    act_failures: DashMap<String, u32>,
    act_log: Mutex<Vec<(String, String)>>,
    latency: RwLock<Duration>,
}

impl ScriptedSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed latency added to every primitive, for deadline tests
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    pub fn add_element(&self, element: ScriptedElement) {
        self.elements
            .insert(element.locator.fingerprint(), element);
    }

    pub fn remove_element(&self, locator: &Locator) {
        self.elements.remove(&locator.fingerprint());
    }

    pub fn set_visible(&self, locator: &Locator, visible: bool) {
        if let Some(mut el) = self.elements.get_mut(&locator.fingerprint()) {
            el.visible = visible;
        }
    }

    pub fn set_text(&self, locator: &Locator, text: impl Into<String>) {
        if let Some(mut el) = self.elements.get_mut(&locator.fingerprint()) {
            el.text = text.into();
        }
    }

    /// Make the next `count` act() calls against this locator fail
    pub fn fail_acts(&self, locator: &Locator, count: u32) {
        self.act_failures.insert(locator.fingerprint(), count);
    }

    /// Replace the synthesized markup for a page context
    pub fn set_markup(&self, page_context: impl Into<String>, markup: impl Into<String>) {
        self.markup_override
            .write()
            .insert(page_context.into(), markup.into());
    }

    /// Actions performed so far, as (fingerprint, action) pairs
    pub fn performed(&self) -> Vec<(String, String)> {
        self.act_log.lock().clone()
    }

    async fn pause(&self) {
        let latency = *self.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn synthesize_markup(&self) -> String {
        let mut parts: Vec<String> = self
            .elements
            .iter()
            .map(|entry| {
                let el = entry.value();
                match el.locator.selector_value() {
                    Some(sel) => format!("<el s=\"{}\">{}</el>", sel, el.text),
                    None => format!("<el at=\"{}\">{}</el>", el.locator.fingerprint(), el.text),
                }
            })
            .collect();
        parts.sort();
        format!("<page>{}</page>", parts.join(""))
    }
}

#[async_trait]
impl ExecutionSurface for ScriptedSurface {
    async fn locate(&self, locator: &Locator) -> Result<ElementHandle, SurfaceError> {
        self.pause().await;
        let fp = locator.fingerprint();
        match self.elements.get(&fp) {
            Some(el) if el.visible => Ok(ElementHandle::new(fp, locator.clone())),
            Some(_) => Err(SurfaceError::NotFound(format!("{fp} not visible"))),
            None => Err(SurfaceError::NotFound(fp)),
        }
    }

    async fn act(&self, handle: &ElementHandle, action: &Action) -> Result<(), SurfaceError> {
        self.pause().await;
        let fp = handle.locator.fingerprint();

        if let Some(mut remaining) = self.act_failures.get_mut(&fp) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SurfaceError::ActionFailed(format!(
                    "injected failure for {fp}"
                )));
            }
        }

        let Some(mut el) = self.elements.get_mut(&fp) else {
            return Err(SurfaceError::ActionFailed(format!("{fp} detached")));
        };
        if !el.enabled {
            return Err(SurfaceError::ActionFailed(format!("{fp} disabled")));
        }

        if let Action::TypeText { text } = action {
            el.text = text.clone();
        }
        drop(el);

        debug!(target = %fp, action = action.name(), "scripted act");
        self.act_log.lock().push((fp, action.name().to_string()));
        Ok(())
    }

    async fn snapshot(&self, page_context: &str) -> Result<LiveSnapshot, SurfaceError> {
        self.pause().await;
        let markup = self
            .markup_override
            .read()
            .get(page_context)
            .cloned()
            .unwrap_or_else(|| self.synthesize_markup());
        Ok(LiveSnapshot::new(page_context, &markup))
    }

    async fn read(&self, handle: &ElementHandle) -> Result<String, SurfaceError> {
        self.pause().await;
        let fp = handle.locator.fingerprint();
        self.elements
            .get(&fp)
            .map(|el| el.text.clone())
            .ok_or_else(|| SurfaceError::ExtractFailed(format!("{fp} detached")))
    }
}
