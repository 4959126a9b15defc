use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, ViewerError};

// -----------------------------
// Names & units
// -----------------------------

/// Unit a sim variable is queried in. Decides the scale of the returned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Number,
    Position,
    PercentOver100,
    String,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Number => "number",
            Unit::Position => "position",
            Unit::PercentOver100 => "percent over 100",
            Unit::String => "string",
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, Unit::String)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queryable simulation quantity, e.g. `GENERAL ENG THROTTLE LEVER POSITION:2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimVar {
    pub name: Cow<'static, str>,
    pub index: Option<u32>,
    pub unit: Unit,
}

impl SimVar {
    pub const fn new(name: &'static str, unit: Unit) -> Self {
        Self {
            name: Cow::Borrowed(name),
            index: None,
            unit,
        }
    }

    pub const fn indexed(name: &'static str, index: u32, unit: Unit) -> Self {
        Self {
            name: Cow::Borrowed(name),
            index: Some(index),
            unit,
        }
    }

    /// Name as the simulator expects it, with the `:index` suffix when indexed.
    pub fn key(&self) -> String {
        match self.index {
            Some(i) => format!("{}:{}", self.name, i),
            None => self.name.to_string(),
        }
    }
}

impl fmt::Display for SimVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.key(), self.unit)
    }
}

pub const NUMBER_OF_ENGINES: SimVar = SimVar::new("NUMBER OF ENGINES", Unit::Number);
pub const TITLE: SimVar = SimVar::new("TITLE", Unit::String);

#[derive(Debug, Clone, PartialEq)]
pub enum SimValue {
    Number(f64),
    Str(String),
}

// -----------------------------
// Value source
// -----------------------------

/// Read-only access to current simulation state.
///
/// Callers check `is_ready` before reading; reads on a source that is not
/// ready have no defined result.
pub trait ValueSource {
    fn is_ready(&self) -> bool;

    fn read(&self, var: &SimVar) -> Result<SimValue>;

    fn read_number(&self, var: &SimVar) -> Result<f64> {
        match self.read(var)? {
            SimValue::Number(n) => Ok(n),
            SimValue::Str(_) => Err(ViewerError::UnitMismatch {
                name: var.key(),
                unit: var.unit,
            }),
        }
    }

    fn read_string(&self, var: &SimVar) -> Result<String> {
        match self.read(var)? {
            SimValue::Str(s) => Ok(s),
            SimValue::Number(_) => Err(ViewerError::UnitMismatch {
                name: var.key(),
                unit: var.unit,
            }),
        }
    }
}

/// Frozen copy of every published value, taken once per frame.
#[derive(Debug, Clone, Default)]
pub struct SimSnapshot {
    ready: bool,
    values: HashMap<(String, Unit), SimValue>,
}

impl SimSnapshot {
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn set(&mut self, var: &SimVar, value: SimValue) {
        self.values.insert((var.key(), var.unit), value);
    }

    pub fn set_number(&mut self, var: &SimVar, value: f64) {
        self.set(var, SimValue::Number(value));
    }

    pub fn clear(&mut self) {
        self.ready = false;
        self.values.clear();
    }
}

impl ValueSource for SimSnapshot {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn read(&self, var: &SimVar) -> Result<SimValue> {
        let key = (var.key(), var.unit);
        self.values
            .get(&key)
            .cloned()
            .ok_or(ViewerError::UnknownVariable { name: key.0 })
    }
}

/// Cache the SimConnect worker publishes into and the UI snapshots from.
#[derive(Clone, Default)]
pub struct SimVarCache {
    inner: Arc<Mutex<SimSnapshot>>,
}

impl SimVarCache {
    pub fn snapshot(&self) -> SimSnapshot {
        self.inner.lock().clone()
    }

    pub fn with_mut<F: FnOnce(&mut SimSnapshot)>(&self, f: F) {
        let mut g = self.inner.lock();
        f(&mut g);
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().is_ready()
    }
}
