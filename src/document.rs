//! Retained element tree the handlers write into and the renderer reads from.

use std::collections::{BTreeSet, HashMap};

use crate::error::{Result, ViewerError};
use crate::layout::LayoutMetrics;

// Element ids of the stock panel markup.
pub const FRAME: &str = "InputViewer_Frame";
pub const CONTAINER: &str = "InputViewer_Container";
pub const STICK_INPUT: &str = "StickInputPos";
pub const STICK_TRIM: &str = "StickTrimPos";
pub const RUDDER_INPUT: &str = "RudderInputPos";
pub const RUDDER_TRIM: &str = "RudderTrimPos";
pub const BRAKE_LEFT: &str = "WheelBrakeBar_Left";
pub const BRAKE_RIGHT: &str = "WheelBrakeBar_Right";
pub const THROTTLE_PANEL: &str = "ThrottlePanel";
pub const THROTTLE_BARS: [&str; 4] = [
    "ThrottleBar_1",
    "ThrottleBar_2",
    "ThrottleBar_3",
    "ThrottleBar_4",
];
pub const PROPELLER_BAR: &str = "PropellerBar_1";
pub const MIXTURE_BAR: &str = "MixtureBar_1";
pub const TOGGLE_PROP_MIX: &str = "TogglePropMix";
pub const TOGGLE_STATE: &str = "TogglePropMix_State";
pub const MIXTURE_ICON: &str = "MixtureIcon";
pub const PROPELLER_ICON: &str = "PropellerIcon";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(usize);

/// Visual transform of an element, always in normalized units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Transform {
    #[default]
    None,
    /// Signed offset from centre, each axis in -1..1.
    Translate { x: f64, y: f64 },
    /// Horizontal fill fraction, 0..1.
    FillX(f64),
    /// Vertical fill fraction, 0..1.
    FillY(f64),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Style {
    pub transform: Transform,
    pub hidden: bool,
    pub layout: Option<LayoutMetrics>,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub id: String,
    pub children: Vec<ElementId>,
    pub data_url: Option<String>,
    pub classes: BTreeSet<String>,
    pub style: Style,
}

impl Element {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    elements: Vec<Element>,
    by_id: HashMap<String, ElementId>,
}

impl Document {
    /// The input viewer panel: stick, rudder, brakes and the throttle quadrant.
    pub fn input_viewer() -> Self {
        let mut doc = Document::default();
        let frame = doc.append(None, FRAME);
        let cont = doc.append(Some(frame), CONTAINER);

        doc.append(Some(cont), STICK_INPUT);
        doc.append(Some(cont), STICK_TRIM);
        doc.append(Some(cont), RUDDER_INPUT);
        doc.append(Some(cont), RUDDER_TRIM);
        doc.append(Some(cont), BRAKE_LEFT);
        doc.append(Some(cont), BRAKE_RIGHT);

        let panel = doc.append(Some(cont), THROTTLE_PANEL);
        for id in THROTTLE_BARS {
            doc.append(Some(panel), id);
        }
        doc.append(Some(panel), PROPELLER_BAR);
        doc.append(Some(panel), MIXTURE_BAR);
        let toggle = doc.append(Some(frame), TOGGLE_PROP_MIX);
        doc.append(Some(toggle), TOGGLE_STATE);
        doc
    }

    /// Appends a new element. An id that already exists is returned unchanged.
    pub fn append(&mut self, parent: Option<ElementId>, id: &str) -> ElementId {
        if let Some(&existing) = self.by_id.get(id) {
            return existing;
        }
        let eid = ElementId(self.elements.len());
        self.elements.push(Element {
            id: id.to_string(),
            children: Vec::new(),
            data_url: None,
            classes: BTreeSet::new(),
            style: Style::default(),
        });
        if let Some(p) = parent {
            self.elements[p.0].children.push(eid);
        }
        self.by_id.insert(id.to_string(), eid);
        eid
    }

    /// Creates an icon element pointing at `url` under `parent`, placed after
    /// any existing icons and before the parent's other children.
    pub fn create_icon(&mut self, parent: ElementId, id: &str, url: &str) -> ElementId {
        if let Some(&existing) = self.by_id.get(id) {
            self.elements[existing.0].data_url = Some(url.to_string());
            return existing;
        }
        let eid = self.append(Some(parent), id);
        self.elements[eid.0].data_url = Some(url.to_string());

        let mut children = std::mem::take(&mut self.elements[parent.0].children);
        children.retain(|c| *c != eid);
        let at = children
            .iter()
            .position(|c| self.elements[c.0].data_url.is_none())
            .unwrap_or(children.len());
        children.insert(at, eid);
        self.elements[parent.0].children = children;
        eid
    }

    pub fn find(&self, id: &str) -> Result<ElementId> {
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| ViewerError::ElementNotFound(id.to_string()))
    }

    pub fn get(&self, id: ElementId) -> &Element {
        &self.elements[id.0]
    }

    pub fn by_name(&self, id: &str) -> Option<&Element> {
        self.by_id.get(id).map(|e| &self.elements[e.0])
    }

    pub fn style_mut(&mut self, id: ElementId) -> &mut Style {
        &mut self.elements[id.0].style
    }

    pub fn set_transform(&mut self, id: ElementId, t: Transform) {
        self.elements[id.0].style.transform = t;
    }

    pub fn set_hidden(&mut self, id: ElementId, hidden: bool) {
        self.elements[id.0].style.hidden = hidden;
    }

    pub fn toggle_class(&mut self, id: ElementId, class: &str, on: bool) {
        let classes = &mut self.elements[id.0].classes;
        if on {
            classes.insert(class.to_string());
        } else {
            classes.remove(class);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_document_has_every_control() {
        let doc = Document::input_viewer();
        for id in [STICK_INPUT, RUDDER_TRIM, BRAKE_RIGHT, MIXTURE_BAR, TOGGLE_PROP_MIX] {
            assert!(doc.find(id).is_ok(), "{id}");
        }
        let panel = doc.find(THROTTLE_PANEL).unwrap();
        assert_eq!(doc.get(panel).children.len(), 6);
    }

    #[test]
    fn missing_elements_fail_lookup() {
        let doc = Document::input_viewer();
        let err = doc.find("Nope").unwrap_err();
        assert_eq!(err.to_string(), "#Nope not found");
    }

    #[test]
    fn icons_are_created_once_ahead_of_other_children() {
        let mut doc = Document::input_viewer();
        let toggle = doc.find(TOGGLE_PROP_MIX).unwrap();

        doc.create_icon(toggle, MIXTURE_ICON, "/a/mixture.svg");
        doc.create_icon(toggle, PROPELLER_ICON, "/a/propeller.svg");
        doc.create_icon(toggle, MIXTURE_ICON, "/a/mixture.svg");

        let ids: Vec<&str> = doc
            .get(toggle)
            .children
            .iter()
            .map(|c| doc.get(*c).id.as_str())
            .collect();
        assert_eq!(ids, [MIXTURE_ICON, PROPELLER_ICON, TOGGLE_STATE]);
        let icon = doc.by_name(MIXTURE_ICON).unwrap();
        assert_eq!(icon.data_url.as_deref(), Some("/a/mixture.svg"));
    }

    #[test]
    fn class_toggling_is_idempotent() {
        let mut doc = Document::input_viewer();
        let panel = doc.find(THROTTLE_PANEL).unwrap();
        doc.toggle_class(panel, "multi-engine", true);
        doc.toggle_class(panel, "multi-engine", true);
        assert!(doc.get(panel).has_class("multi-engine"));
        doc.toggle_class(panel, "multi-engine", false);
        assert!(doc.get(panel).classes.is_empty());
    }
}
