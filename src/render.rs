//! Paints the mounted [`Document`] with egui.
//!
//! Geometry is laid out on a 280x260 design grid and scaled to the widget
//! width the layout pass computed.

use egui::{pos2, vec2, Align2, Color32, FontId, Pos2, Rect, Sense, Stroke, Ui};

use crate::document::{
    Document, Element, Transform, BRAKE_LEFT, BRAKE_RIGHT, MIXTURE_BAR, PROPELLER_BAR,
    RUDDER_INPUT, RUDDER_TRIM, STICK_INPUT, STICK_TRIM, THROTTLE_BARS, THROTTLE_PANEL,
    TOGGLE_PROP_MIX,
};
use crate::handlers::{CLASS_MULTI_ENGINE, CLASS_PROP_MIX};
use crate::layout::LayoutMetrics;

const DESIGN_W: f32 = 280.0;
const DESIGN_H: f32 = 260.0;

const FRAME_STROKE: Color32 = Color32::from_gray(90);
const TRACK: Color32 = Color32::from_gray(40);
const INPUT: Color32 = Color32::from_rgb(30, 180, 90);
const TRIM: Color32 = Color32::from_rgb(220, 180, 40);
const BRAKE: Color32 = Color32::from_rgb(200, 60, 60);
const LEVER: Color32 = Color32::from_rgb(90, 150, 230);

/// Maps design-grid coordinates into the allocated widget rect.
struct Grid {
    origin: Pos2,
    scale: f32,
}

impl Grid {
    fn pos(&self, x: f32, y: f32) -> Pos2 {
        self.origin + vec2(x, y) * self.scale
    }

    fn rect(&self, x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::from_min_size(self.pos(x, y), vec2(w, h) * self.scale)
    }
}

/// Where the host should place widgets that live inside the panel.
pub struct PanelRects {
    pub toggle: Rect,
}

pub fn panel(ui: &mut Ui, doc: &Document, metrics: Option<LayoutMetrics>) -> PanelRects {
    let avail = ui.available_size();
    let width = metrics
        .map(|m| m.widget_width as f32)
        .unwrap_or(avail.x)
        .clamp(1.0, avail.x.max(1.0));
    let size = vec2(width, width * DESIGN_H / DESIGN_W);
    let (rect, _) = ui.allocate_exact_size(size, Sense::hover());
    let g = Grid {
        origin: rect.min,
        scale: width / DESIGN_W,
    };
    let painter = ui.painter();
    let stroke = Stroke::new(1.0, FRAME_STROKE);

    // Stick box with input and trim markers
    let stick = g.rect(10.0, 10.0, 140.0, 140.0);
    painter.rect_stroke(stick, 2.0, stroke);
    painter.line_segment([stick.center_top(), stick.center_bottom()], stroke);
    painter.line_segment([stick.left_center(), stick.right_center()], stroke);
    if let Some(p) = offset(doc.by_name(STICK_TRIM), stick) {
        painter.circle_stroke(p, 5.0 * g.scale, Stroke::new(2.0, TRIM));
    }
    if let Some(p) = offset(doc.by_name(STICK_INPUT), stick) {
        painter.circle_filled(p, 6.0 * g.scale, INPUT);
    }

    // Rudder track
    let rudder = g.rect(10.0, 162.0, 140.0, 18.0);
    painter.rect_filled(rudder, 2.0, TRACK);
    painter.line_segment([rudder.center_top(), rudder.center_bottom()], stroke);
    if let Some(p) = offset(doc.by_name(RUDDER_TRIM), rudder) {
        painter.line_segment(
            [pos2(p.x, rudder.top()), pos2(p.x, rudder.bottom())],
            Stroke::new(2.0 * g.scale, TRIM),
        );
    }
    if let Some(p) = offset(doc.by_name(RUDDER_INPUT), rudder) {
        painter.circle_filled(p, 5.0 * g.scale, INPUT);
    }

    // Wheel brakes, filling outwards from the centre line
    let left = g.rect(10.0, 192.0, 68.0, 14.0);
    let right = g.rect(82.0, 192.0, 68.0, 14.0);
    for (el, track, from_right) in [
        (doc.by_name(BRAKE_LEFT), left, true),
        (doc.by_name(BRAKE_RIGHT), right, false),
    ] {
        painter.rect_filled(track, 2.0, TRACK);
        if let Some(f) = fill(el) {
            let w = track.width() * f;
            let bar = if from_right {
                Rect::from_min_max(pos2(track.right() - w, track.top()), track.max)
            } else {
                Rect::from_min_max(track.min, pos2(track.left() + w, track.bottom()))
            };
            painter.rect_filled(bar, 2.0, BRAKE);
        }
    }

    // Throttle quadrant
    let quadrant = g.rect(162.0, 10.0, 108.0, 196.0);
    painter.rect_stroke(quadrant, 2.0, stroke);
    let shown = quadrant_levers(doc);
    if !shown.is_empty() {
        let slot = quadrant.width() / shown.len() as f32;
        let bar_w = (slot * 0.5).min(14.0 * g.scale);
        for (i, (el, label, color)) in shown.into_iter().enumerate() {
            let cx = quadrant.left() + slot * (i as f32 + 0.5);
            let track = Rect::from_min_max(
                pos2(cx - bar_w / 2.0, quadrant.top() + 6.0 * g.scale),
                pos2(cx + bar_w / 2.0, quadrant.bottom() - 20.0 * g.scale),
            );
            painter.rect_filled(track, 2.0, TRACK);
            if let Some(f) = fill(Some(el)) {
                let h = track.height() * f;
                let bar = Rect::from_min_max(pos2(track.left(), track.bottom() - h), track.max);
                painter.rect_filled(bar, 2.0, color);
            }
            painter.text(
                pos2(cx, quadrant.bottom() - 10.0 * g.scale),
                Align2::CENTER_CENTER,
                label,
                FontId::proportional(11.0 * g.scale),
                Color32::LIGHT_GRAY,
            );
        }
    }

    // Prop/mix toggle with its icons
    let toggle = g.rect(162.0, 214.0, 108.0, 36.0);
    if let Some(el) = doc.by_name(TOGGLE_PROP_MIX) {
        let icons: Vec<&str> = el
            .children
            .iter()
            .filter_map(|c| doc.get(*c).data_url.as_deref())
            .filter_map(|url| url.rsplit('/').next())
            .filter_map(|file| file.strip_suffix(".svg"))
            .collect();
        painter.text(
            pos2(toggle.right(), toggle.center().y),
            Align2::RIGHT_CENTER,
            icons.join(" / "),
            FontId::proportional(10.0 * g.scale),
            Color32::GRAY,
        );
    }

    PanelRects {
        toggle: Rect::from_min_size(toggle.min, vec2(toggle.height(), toggle.height())),
    }
}

/// Levers the throttle quadrant draws, left to right. The panel classes
/// decide numbering and whether the propeller/mixture group is drawn.
fn quadrant_levers(doc: &Document) -> Vec<(&Element, String, Color32)> {
    let panel = doc.by_name(THROTTLE_PANEL);
    let multi_engine = panel.is_some_and(|p| p.has_class(CLASS_MULTI_ENGINE));
    let prop_mix = panel.is_some_and(|p| p.has_class(CLASS_PROP_MIX));

    let throttles = THROTTLE_BARS.iter().enumerate().map(|(i, id)| {
        let label = if multi_engine {
            format!("{}", i + 1)
        } else {
            "T".to_string()
        };
        (*id, label, LEVER)
    });
    let prop_mix_levers = [
        (PROPELLER_BAR, "P".to_string(), Color32::from_gray(200)),
        (MIXTURE_BAR, "M".to_string(), BRAKE),
    ]
    .into_iter()
    .filter(|_| prop_mix);

    throttles
        .chain(prop_mix_levers)
        .filter_map(|(id, label, color)| {
            let el = doc.by_name(id)?;
            (!el.style.hidden).then_some((el, label, color))
        })
        .collect()
}

/// Marker position for a translated element inside `area`; +y points down.
fn offset(el: Option<&Element>, area: Rect) -> Option<Pos2> {
    let el = el.filter(|e| !e.style.hidden)?;
    match el.style.transform {
        Transform::Translate { x, y } => Some(pos2(
            area.center().x + x as f32 * area.width() / 2.0,
            area.center().y + y as f32 * area.height() / 2.0,
        )),
        _ => None,
    }
}

fn fill(el: Option<&Element>) -> Option<f32> {
    let el = el.filter(|e| !e.style.hidden)?;
    match el.style.transform {
        Transform::FillX(f) | Transform::FillY(f) => Some(f as f32),
        _ => None,
    }
}
