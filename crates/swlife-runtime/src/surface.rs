//! Rendering surface for the update and install banners.
//!
//! Rendering upserts by element id, so re-rendering a visible banner replaces
//! its node instead of adding another.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use swlife_core::presentation::BANNER_ELEMENT_ID;
use swlife_core::{BannerView, UpdateBanner, render_banner};

pub const INSTALL_BANNER_ELEMENT_ID: &str = "pwa-install-banner";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurfaceNode {
    pub element_id: String,
    pub text: String,
}

/// Host-side element container (a DOM subtree in a browser).
pub trait BannerSurface: Send {
    fn upsert(&mut self, node: SurfaceNode);
    fn remove(&mut self, element_id: &str);
}

pub type SharedSurface = Arc<Mutex<dyn BannerSurface>>;

/// Apply `f` to the surface, recovering from a poisoned lock.
pub fn with_surface(surface: &SharedSurface, f: impl FnOnce(&mut dyn BannerSurface)) {
    let mut guard = surface.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut *guard);
}

pub fn render_update_banner(surface: &mut dyn BannerSurface, banner: &UpdateBanner) {
    match render_banner(banner) {
        Some(BannerView {
            element_id, text, ..
        }) => surface.upsert(SurfaceNode {
            element_id: element_id.to_string(),
            text,
        }),
        None => surface.remove(BANNER_ELEMENT_ID),
    }
}

pub fn render_install_banner(surface: &mut dyn BannerSurface, visible: bool) {
    if visible {
        surface.upsert(SurfaceNode {
            element_id: INSTALL_BANNER_ELEMENT_ID.to_string(),
            text: "Install this app on your device".to_string(),
        });
    } else {
        surface.remove(INSTALL_BANNER_ELEMENT_ID);
    }
}

/// In-memory surface used by the simulator and tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySurface {
    nodes: Vec<SurfaceNode>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Mutex<MemorySurface>> {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn nodes(&self) -> &[SurfaceNode] {
        &self.nodes
    }

    pub fn count(&self, element_id: &str) -> usize {
        self.nodes.iter().filter(|n| n.element_id == element_id).count()
    }

    pub fn text_of(&self, element_id: &str) -> Option<&str> {
        self.nodes
            .iter()
            .find(|n| n.element_id == element_id)
            .map(|n| n.text.as_str())
    }
}

impl BannerSurface for MemorySurface {
    fn upsert(&mut self, node: SurfaceNode) {
        match self.nodes.iter_mut().find(|n| n.element_id == node.element_id) {
            Some(existing) => *existing = node,
            None => self.nodes.push(node),
        }
    }

    fn remove(&mut self, element_id: &str) {
        self.nodes.retain(|n| n.element_id != element_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visible(id: &str) -> UpdateBanner {
        UpdateBanner::Visible {
            message: format!("update {id}"),
            deployment_id: id.to_string(),
            shown_at_ms: 0,
        }
    }

    #[test]
    fn repeated_render_keeps_single_node() {
        let mut s = MemorySurface::new();
        render_update_banner(&mut s, &visible("v2"));
        render_update_banner(&mut s, &visible("v2"));
        render_update_banner(&mut s, &visible("v3"));
        assert_eq!(s.count(BANNER_ELEMENT_ID), 1);
        assert_eq!(s.text_of(BANNER_ELEMENT_ID), Some("update v3"));
    }

    #[test]
    fn hidden_removes_node() {
        let mut s = MemorySurface::new();
        render_update_banner(&mut s, &visible("v2"));
        render_update_banner(&mut s, &UpdateBanner::Hidden);
        assert!(s.nodes().is_empty());
    }

    #[test]
    fn install_and_update_banners_coexist() {
        let mut s = MemorySurface::new();
        render_install_banner(&mut s, true);
        render_update_banner(&mut s, &visible("v2"));
        assert_eq!(s.nodes().len(), 2);
        render_install_banner(&mut s, false);
        assert_eq!(s.count(INSTALL_BANNER_ELEMENT_ID), 0);
        assert_eq!(s.count(BANNER_ELEMENT_ID), 1);
    }

    #[test]
    fn shared_surface_through_trait_object() {
        let concrete = MemorySurface::shared();
        let shared: SharedSurface = concrete.clone();
        with_surface(&shared, |s| render_install_banner(s, true));
        let guard = concrete.lock().expect("lock");
        assert_eq!(guard.count(INSTALL_BANNER_ELEMENT_ID), 1);
    }
}
