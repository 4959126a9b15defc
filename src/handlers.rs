//! Per-control handlers: poll sim variables, write normalized visual state.

use crate::config::Domains;
use crate::document::{
    Document, ElementId, Transform, BRAKE_LEFT, BRAKE_RIGHT, MIXTURE_BAR, PROPELLER_BAR,
    RUDDER_INPUT, RUDDER_TRIM, STICK_INPUT, STICK_TRIM, THROTTLE_BARS, THROTTLE_PANEL,
};
use crate::error::Result;
use crate::simvar::{SimVar, Unit, ValueSource, NUMBER_OF_ENGINES};

pub const MAX_ENGINES: u32 = 4;

pub const CLASS_MULTI_ENGINE: &str = "multi-engine";
pub const CLASS_PROP_MIX: &str = "prop-mix";

// -----------------------------
// Normalization
// -----------------------------

/// Raw range a source value is expected in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Domain {
    pub min: f64,
    pub max: f64,
}

impl Domain {
    pub const UNIT: Domain = Domain { min: 0.0, max: 1.0 };
    pub const SIGNED: Domain = Domain { min: -1.0, max: 1.0 };
    #[cfg(test)]
    pub const PERCENT: Domain = Domain { min: 0.0, max: 100.0 };
    #[cfg(test)]
    pub const SIGNED_PERCENT: Domain = Domain {
        min: -100.0,
        max: 100.0,
    };

    #[cfg(test)]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn span(&self) -> Option<f64> {
        let span = self.max - self.min;
        (span.is_finite() && span != 0.0).then_some(span)
    }

    /// Maps `raw` onto 0..1. NaN and degenerate domains give 0.
    pub fn fraction(&self, raw: f64) -> f64 {
        match self.span() {
            Some(span) if !raw.is_nan() => ((raw - self.min) / span).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    /// Maps `raw` onto -1..1 around the domain centre. NaN and degenerate
    /// domains give 0.
    pub fn signed(&self, raw: f64) -> f64 {
        match self.span() {
            Some(span) if !raw.is_nan() => {
                ((2.0 * raw - (self.max + self.min)) / span).clamp(-1.0, 1.0)
            }
            _ => 0.0,
        }
    }
}

// -----------------------------
// Variants
// -----------------------------

/// Vertical bar, e.g. a throttle lever.
#[derive(Debug, Clone)]
pub struct VBarHandler {
    el: ElementId,
    var: SimVar,
    domain: Domain,
}

impl VBarHandler {
    pub fn new(el: ElementId, var: SimVar, domain: Domain) -> Self {
        Self { el, var, domain }
    }

    pub fn update(&self, src: &dyn ValueSource, doc: &mut Document) -> Result<()> {
        let raw = src.read_number(&self.var)?;
        doc.set_transform(self.el, Transform::FillY(self.domain.fraction(raw)));
        Ok(())
    }
}

/// Horizontal bar, e.g. a wheel brake.
#[derive(Debug, Clone)]
pub struct HBarHandler {
    el: ElementId,
    var: SimVar,
    domain: Domain,
}

impl HBarHandler {
    pub fn new(el: ElementId, var: SimVar, domain: Domain) -> Self {
        Self { el, var, domain }
    }

    pub fn update(&self, src: &dyn ValueSource, doc: &mut Document) -> Result<()> {
        let raw = src.read_number(&self.var)?;
        doc.set_transform(self.el, Transform::FillX(self.domain.fraction(raw)));
        Ok(())
    }
}

/// Rudder marker, offset left/right of centre.
#[derive(Debug, Clone)]
pub struct RudderHandler {
    el: ElementId,
    var: SimVar,
    domain: Domain,
}

impl RudderHandler {
    pub fn new(el: ElementId, name: &'static str, unit: Unit, domain: Domain) -> Self {
        Self {
            el,
            var: SimVar::new(name, unit),
            domain,
        }
    }

    pub fn update(&self, src: &dyn ValueSource, doc: &mut Document) -> Result<()> {
        let raw = src.read_number(&self.var)?;
        let x = self.domain.signed(raw);
        doc.set_transform(self.el, Transform::Translate { x, y: 0.0 });
        Ok(())
    }
}

/// Stick marker driven by two axes. Y is inverted so pulling back moves the
/// marker up.
#[derive(Debug, Clone)]
pub struct StickHandler {
    el: ElementId,
    axes: [SimVar; 2],
    domain: Domain,
}

impl StickHandler {
    pub fn new(el: ElementId, names: [&'static str; 2], unit: Unit, domain: Domain) -> Self {
        Self {
            el,
            axes: [SimVar::new(names[0], unit), SimVar::new(names[1], unit)],
            domain,
        }
    }

    pub fn update(&self, src: &dyn ValueSource, doc: &mut Document) -> Result<()> {
        let x = self.domain.signed(src.read_number(&self.axes[0])?);
        let y = self.domain.signed(src.read_number(&self.axes[1])?);
        doc.set_transform(self.el, Transform::Translate { x, y: -y });
        Ok(())
    }
}

/// What the throttle quadrant shows this frame.
///
/// Engine type is not an input: the prop/mix toggle is the only piston gate,
/// so propeller and mixture show whenever it is on and an engine exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineState {
    pub engine_count: u32,
    pub multi_engine: bool,
    pub prop_mix_visible: bool,
}

impl EngineState {
    pub fn derive(engine_count: f64, prop_mix_enabled: bool) -> Self {
        let count = if engine_count.is_nan() {
            0
        } else {
            engine_count.round().clamp(0.0, MAX_ENGINES as f64) as u32
        };
        Self {
            engine_count: count,
            multi_engine: count > 1,
            prop_mix_visible: prop_mix_enabled && count > 0,
        }
    }
}

/// Throttle quadrant: one throttle bar per engine plus the propeller and
/// mixture levers, which only show while the prop/mix toggle is on.
///
/// Owns every vertical bar of the panel. Visibility is decided per frame
/// before a lever is read, so hidden levers are never polled.
#[derive(Debug, Clone)]
pub struct EngineHandler {
    panel: ElementId,
    throttles: Vec<VBarHandler>,
    propeller: VBarHandler,
    mixture: VBarHandler,
    pub is_prop_mix_enabled: bool,
    state: EngineState,
}

impl EngineHandler {
    pub fn new(doc: &Document, lever: Domain) -> Result<Self> {
        let throttles = THROTTLE_BARS
            .iter()
            .zip(1..)
            .map(|(id, i)| {
                Ok(VBarHandler::new(
                    doc.find(id)?,
                    SimVar::indexed("GENERAL ENG THROTTLE LEVER POSITION", i, Unit::Position),
                    lever,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            panel: doc.find(THROTTLE_PANEL)?,
            throttles,
            propeller: VBarHandler::new(
                doc.find(PROPELLER_BAR)?,
                SimVar::indexed("GENERAL ENG PROPELLER LEVER POSITION", 1, Unit::Position),
                lever,
            ),
            mixture: VBarHandler::new(
                doc.find(MIXTURE_BAR)?,
                SimVar::indexed("GENERAL ENG MIXTURE LEVER POSITION", 1, Unit::Position),
                lever,
            ),
            is_prop_mix_enabled: false,
            state: EngineState::default(),
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn update(&mut self, src: &dyn ValueSource, doc: &mut Document) -> Result<()> {
        let count = src.read_number(&NUMBER_OF_ENGINES)?;
        self.state = EngineState::derive(count, self.is_prop_mix_enabled);

        doc.toggle_class(self.panel, CLASS_MULTI_ENGINE, self.state.multi_engine);
        doc.toggle_class(self.panel, CLASS_PROP_MIX, self.state.prop_mix_visible);

        // one bad lever must not freeze the rest of the quadrant
        let mut first_err = None;
        let mut show = |bar: &VBarHandler, visible: bool, doc: &mut Document| {
            doc.set_hidden(bar.el, !visible);
            if visible {
                if let Err(e) = bar.update(src, doc) {
                    first_err.get_or_insert(e);
                }
            }
        };

        for (i, bar) in self.throttles.iter().enumerate() {
            show(bar, (i as u32) < self.state.engine_count, doc);
        }
        show(&self.propeller, self.state.prop_mix_visible, doc);
        show(&self.mixture, self.state.prop_mix_visible, doc);

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn requests(&self, out: &mut Vec<SimVar>) {
        out.push(NUMBER_OF_ENGINES);
        out.extend(self.throttles.iter().map(|b| b.var.clone()));
        out.push(self.propeller.var.clone());
        out.push(self.mixture.var.clone());
    }
}

// -----------------------------
// Handler set
// -----------------------------

#[derive(Debug, Clone)]
pub enum InputHandler {
    Stick(StickHandler),
    Rudder(RudderHandler),
    HBar(HBarHandler),
    Engine(EngineHandler),
}

impl InputHandler {
    /// Handlers for the stock panel, in update order.
    pub fn stock(doc: &Document, d: &Domains) -> Result<Vec<InputHandler>> {
        use InputHandler::*;

        let brake = |id: &str, name: &'static str| -> Result<InputHandler> {
            Ok(HBar(HBarHandler::new(
                doc.find(id)?,
                SimVar::new(name, Unit::Position),
                d.brake,
            )))
        };

        Ok(vec![
            Stick(StickHandler::new(
                doc.find(STICK_INPUT)?,
                ["AILERON POSITION", "ELEVATOR POSITION"],
                Unit::Position,
                d.stick,
            )),
            Stick(StickHandler::new(
                doc.find(STICK_TRIM)?,
                ["AILERON TRIM PCT", "ELEVATOR TRIM PCT"],
                Unit::PercentOver100,
                d.stick_trim,
            )),
            Rudder(RudderHandler::new(
                doc.find(RUDDER_INPUT)?,
                "RUDDER POSITION",
                Unit::Position,
                d.rudder,
            )),
            Rudder(RudderHandler::new(
                doc.find(RUDDER_TRIM)?,
                "RUDDER TRIM PCT",
                Unit::PercentOver100,
                d.rudder_trim,
            )),
            brake(BRAKE_LEFT, "BRAKE LEFT POSITION")?,
            brake(BRAKE_RIGHT, "BRAKE RIGHT POSITION")?,
            Engine(EngineHandler::new(doc, d.lever)?),
        ])
    }

    pub fn update(&mut self, src: &dyn ValueSource, doc: &mut Document) -> Result<()> {
        match self {
            InputHandler::Stick(h) => h.update(src, doc),
            InputHandler::Rudder(h) => h.update(src, doc),
            InputHandler::HBar(h) => h.update(src, doc),
            InputHandler::Engine(h) => h.update(src, doc),
        }
    }

    /// Element the handler draws into.
    pub fn element(&self) -> ElementId {
        match self {
            InputHandler::Stick(h) => h.el,
            InputHandler::Rudder(h) => h.el,
            InputHandler::HBar(h) => h.el,
            InputHandler::Engine(h) => h.panel,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InputHandler::Stick(_) => "StickHandler",
            InputHandler::Rudder(_) => "RudderHandler",
            InputHandler::HBar(_) => "HBarHandler",
            InputHandler::Engine(_) => "EngineHandler",
        }
    }

    /// Appends every variable this handler polls.
    pub fn requests(&self, out: &mut Vec<SimVar>) {
        match self {
            InputHandler::Stick(h) => out.extend(h.axes.iter().cloned()),
            InputHandler::Rudder(h) => out.push(h.var.clone()),
            InputHandler::HBar(h) => out.push(h.var.clone()),
            InputHandler::Engine(h) => h.requests(out),
        }
    }
}

/// Deduplicated list of variables polled by `handlers`, in first-use order.
pub fn polled_vars(handlers: &[InputHandler]) -> Vec<SimVar> {
    let mut all = Vec::new();
    for h in handlers {
        h.requests(&mut all);
    }
    let mut seen = std::collections::HashSet::new();
    all.retain(|v| seen.insert(v.clone()));
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simvar::SimSnapshot;

    fn style(doc: &Document, id: &str) -> Transform {
        doc.by_name(id).unwrap().style.transform
    }

    fn hidden(doc: &Document, id: &str) -> bool {
        doc.by_name(id).unwrap().style.hidden
    }

    fn snapshot(values: &[(SimVar, f64)]) -> SimSnapshot {
        let mut s = SimSnapshot::default();
        s.set_ready(true);
        for (var, v) in values {
            s.set_number(var, *v);
        }
        s
    }

    #[test]
    fn fraction_clamps_at_both_ends() {
        let d = Domain::UNIT;
        assert_eq!(d.fraction(-3.0), 0.0);
        assert_eq!(d.fraction(0.25), 0.25);
        assert_eq!(d.fraction(7.0), 1.0);
        assert_eq!(d.fraction(f64::INFINITY), 1.0);
        assert_eq!(d.fraction(f64::NAN), 0.0);
        assert_eq!(Domain::PERCENT.fraction(50.0), 0.5);
    }

    #[test]
    fn signed_clamps_at_both_ends() {
        let d = Domain::SIGNED_PERCENT;
        assert_eq!(d.signed(-250.0), -1.0);
        assert_eq!(d.signed(50.0), 0.5);
        assert_eq!(d.signed(250.0), 1.0);
        assert_eq!(d.signed(f64::NAN), 0.0);
        assert_eq!(Domain::new(2.0, 2.0).signed(2.0), 0.0);
    }

    #[test]
    fn outputs_stay_in_domain_for_any_input() {
        let raws = [-1e9, -101.0, -1.0, -0.5, 0.0, 0.3, 1.0, 99.0, 1e9];
        for d in [Domain::UNIT, Domain::SIGNED, Domain::PERCENT, Domain::SIGNED_PERCENT] {
            for raw in raws {
                let f = d.fraction(raw);
                let s = d.signed(raw);
                assert!((0.0..=1.0).contains(&f), "{d:?} {raw} -> {f}");
                assert!((-1.0..=1.0).contains(&s), "{d:?} {raw} -> {s}");
            }
        }
    }

    #[test]
    fn stick_inverts_the_vertical_axis() {
        let mut doc = Document::input_viewer();
        let h = StickHandler::new(
            doc.find(STICK_INPUT).unwrap(),
            ["AILERON POSITION", "ELEVATOR POSITION"],
            Unit::Position,
            Domain::SIGNED,
        );
        let src = snapshot(&[
            (SimVar::new("AILERON POSITION", Unit::Position), 0.5),
            (SimVar::new("ELEVATOR POSITION", Unit::Position), -0.3),
        ]);
        h.update(&src, &mut doc).unwrap();
        assert_eq!(style(&doc, STICK_INPUT), Transform::Translate { x: 0.5, y: 0.3 });
    }

    #[test]
    fn stick_leaves_element_untouched_when_an_axis_is_missing() {
        let mut doc = Document::input_viewer();
        let h = StickHandler::new(
            doc.find(STICK_INPUT).unwrap(),
            ["AILERON POSITION", "ELEVATOR POSITION"],
            Unit::Position,
            Domain::SIGNED,
        );
        let src = snapshot(&[(SimVar::new("AILERON POSITION", Unit::Position), 0.5)]);
        assert!(h.update(&src, &mut doc).is_err());
        assert_eq!(style(&doc, STICK_INPUT), Transform::None);
    }

    #[test]
    fn rudder_trim_uses_its_own_unit_and_domain() {
        let mut doc = Document::input_viewer();
        let h = RudderHandler::new(
            doc.find(RUDDER_TRIM).unwrap(),
            "RUDDER TRIM PCT",
            Unit::PercentOver100,
            Domain::SIGNED_PERCENT,
        );
        let src = snapshot(&[(SimVar::new("RUDDER TRIM PCT", Unit::PercentOver100), -140.0)]);
        h.update(&src, &mut doc).unwrap();
        assert_eq!(style(&doc, RUDDER_TRIM), Transform::Translate { x: -1.0, y: 0.0 });
    }

    #[test]
    fn bars_fill_along_their_axis() {
        let mut doc = Document::input_viewer();
        let brake = SimVar::new("BRAKE LEFT POSITION", Unit::Position);
        let throttle = SimVar::indexed("GENERAL ENG THROTTLE LEVER POSITION", 1, Unit::Position);
        let src = snapshot(&[(brake.clone(), 0.4), (throttle.clone(), 1.2)]);

        HBarHandler::new(doc.find(BRAKE_LEFT).unwrap(), brake, Domain::UNIT)
            .update(&src, &mut doc)
            .unwrap();
        VBarHandler::new(doc.find(THROTTLE_BARS[0]).unwrap(), throttle, Domain::UNIT)
            .update(&src, &mut doc)
            .unwrap();

        assert_eq!(style(&doc, BRAKE_LEFT), Transform::FillX(0.4));
        assert_eq!(style(&doc, THROTTLE_BARS[0]), Transform::FillY(1.0));
    }

    fn engine_source(engines: f64) -> SimSnapshot {
        let mut values = vec![(NUMBER_OF_ENGINES, engines)];
        for i in 1..=4 {
            values.push((
                SimVar::indexed("GENERAL ENG THROTTLE LEVER POSITION", i, Unit::Position),
                0.1 * i as f64,
            ));
        }
        values.push((
            SimVar::indexed("GENERAL ENG PROPELLER LEVER POSITION", 1, Unit::Position),
            0.8,
        ));
        values.push((
            SimVar::indexed("GENERAL ENG MIXTURE LEVER POSITION", 1, Unit::Position),
            0.6,
        ));
        snapshot(&values)
    }

    #[test]
    fn single_engine_hides_prop_mix_while_toggle_is_off() {
        let mut doc = Document::input_viewer();
        let mut h = EngineHandler::new(&doc, Domain::UNIT).unwrap();
        h.update(&engine_source(1.0), &mut doc).unwrap();

        assert!(hidden(&doc, PROPELLER_BAR));
        assert!(hidden(&doc, MIXTURE_BAR));
        assert_eq!(style(&doc, PROPELLER_BAR), Transform::None);
        assert!(!hidden(&doc, THROTTLE_BARS[0]));
        assert!(hidden(&doc, THROTTLE_BARS[1]));
        assert_eq!(
            h.state(),
            EngineState {
                engine_count: 1,
                multi_engine: false,
                prop_mix_visible: false
            }
        );
    }

    #[test]
    fn toggle_on_shows_prop_mix_as_vertical_bars() {
        let mut doc = Document::input_viewer();
        let mut h = EngineHandler::new(&doc, Domain::UNIT).unwrap();
        h.is_prop_mix_enabled = true;
        h.update(&engine_source(1.0), &mut doc).unwrap();

        assert!(!hidden(&doc, PROPELLER_BAR));
        assert_eq!(style(&doc, PROPELLER_BAR), Transform::FillY(0.8));
        assert_eq!(style(&doc, MIXTURE_BAR), Transform::FillY(0.6));
        let panel = doc.by_name(THROTTLE_PANEL).unwrap();
        assert!(panel.has_class(CLASS_PROP_MIX));
        assert!(!panel.has_class(CLASS_MULTI_ENGINE));
    }

    #[test]
    fn engine_count_is_rederived_every_frame() {
        let mut doc = Document::input_viewer();
        let mut h = EngineHandler::new(&doc, Domain::UNIT).unwrap();

        h.update(&engine_source(4.0), &mut doc).unwrap();
        assert!(THROTTLE_BARS.iter().all(|id| !hidden(&doc, id)));
        assert!(doc.by_name(THROTTLE_PANEL).unwrap().has_class(CLASS_MULTI_ENGINE));

        h.update(&engine_source(2.0), &mut doc).unwrap();
        assert!(!hidden(&doc, THROTTLE_BARS[1]));
        assert!(hidden(&doc, THROTTLE_BARS[2]));
        assert!(hidden(&doc, THROTTLE_BARS[3]));

        h.is_prop_mix_enabled = true;
        h.update(&engine_source(0.0), &mut doc).unwrap();
        assert!(THROTTLE_BARS.iter().all(|id| hidden(&doc, id)));
        assert!(hidden(&doc, PROPELLER_BAR));
    }

    #[test]
    fn update_is_idempotent() {
        let mut doc = Document::input_viewer();
        let mut handlers = InputHandler::stock(&doc, &Domains::default()).unwrap();
        let mut src = engine_source(2.0);
        for (name, v) in [
            ("AILERON POSITION", 0.2),
            ("ELEVATOR POSITION", 0.9),
            ("RUDDER POSITION", -0.4),
            ("BRAKE LEFT POSITION", 0.5),
            ("BRAKE RIGHT POSITION", 0.0),
        ] {
            src.set_number(&SimVar::new(name, Unit::Position), v);
        }
        for name in ["AILERON TRIM PCT", "ELEVATOR TRIM PCT", "RUDDER TRIM PCT"] {
            src.set_number(&SimVar::new(name, Unit::PercentOver100), 0.05);
        }

        for h in handlers.iter_mut() {
            h.update(&src, &mut doc).unwrap();
        }
        let first: Vec<_> = handlers
            .iter()
            .map(|h| doc.get(h.element()).style.clone())
            .collect();
        let first_bars: Vec<_> = THROTTLE_BARS
            .iter()
            .map(|id| doc.by_name(id).unwrap().style.clone())
            .collect();

        for h in handlers.iter_mut() {
            h.update(&src, &mut doc).unwrap();
        }
        let second: Vec<_> = handlers
            .iter()
            .map(|h| doc.get(h.element()).style.clone())
            .collect();
        let second_bars: Vec<_> = THROTTLE_BARS
            .iter()
            .map(|id| doc.by_name(id).unwrap().style.clone())
            .collect();

        assert_eq!(first, second);
        assert_eq!(first_bars, second_bars);
    }

    #[test]
    fn stock_set_leaves_vertical_bars_to_the_engine_handler() {
        let doc = Document::input_viewer();
        let handlers = InputHandler::stock(&doc, &Domains::default()).unwrap();
        let kinds: Vec<_> = handlers.iter().map(|h| h.kind()).collect();
        assert_eq!(
            kinds,
            [
                "StickHandler",
                "StickHandler",
                "RudderHandler",
                "RudderHandler",
                "HBarHandler",
                "HBarHandler",
                "EngineHandler",
            ]
        );
        let panel = doc.find(THROTTLE_PANEL).unwrap();
        assert_eq!(handlers[6].element(), panel);
    }

    #[test]
    fn polled_vars_cover_every_handler_once() {
        let doc = Document::input_viewer();
        let handlers = InputHandler::stock(&doc, &Domains::default()).unwrap();
        let vars = polled_vars(&handlers);
        assert_eq!(vars.len(), 15);
        assert!(vars.contains(&NUMBER_OF_ENGINES));
        assert_eq!(vars[0].key(), "AILERON POSITION");
    }
}
