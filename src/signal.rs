//! Telemetry: named signals fed by the simulation and its controllers.
//!
//! The simulation behaves identically whatever sink is attached.

use log::{log_enabled, trace, Level};
use std::fmt;

/// Identifies the entity a group of signals belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    /// The kind of entity, such as `"unit"` or `"traction"`.
    pub kind: &'static str,
    pub id: usize,
}

/// Identifies one signal of an entity.
pub type PinId = usize;

/// A value fed to a signal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Signal<'a> {
    Value(f64),
    Text(&'a str),
}

impl From<f64> for Signal<'_> {
    fn from(value: f64) -> Self {
        Signal::Value(value)
    }
}

impl<'a> From<&'a str> for Signal<'a> {
    fn from(text: &'a str) -> Self {
        Signal::Text(text)
    }
}

impl fmt::Display for Signal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Value(value) => write!(f, "{}", value),
            Signal::Text(text) => write!(f, "{}", text),
        }
    }
}

/// A consumer of telemetry.
pub trait SignalSink {
    /// Gets the handle of an entity.
    fn entity_handle(&mut self, kind: &'static str, id: usize) -> EntityHandle {
        EntityHandle { kind, id }
    }

    /// Registers a named signal of an entity.
    fn pin(&mut self, entity: EntityHandle, name: &str) -> PinId;

    /// Records the current value of a signal.
    fn feed(&mut self, pin: PinId, signal: Signal<'_>);

    /// Informs the sink of the current simulated time, in s.
    fn set_simulated_time(&mut self, _secs: f64) {}
}

/// A sink which discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSignalSink;

impl SignalSink for NullSignalSink {
    fn pin(&mut self, _entity: EntityHandle, _name: &str) -> PinId {
        0
    }

    fn feed(&mut self, _pin: PinId, _signal: Signal<'_>) {}
}

/// A sink which writes every signal to the `trace` log level.
#[derive(Clone, Debug, Default)]
pub struct LogSignalSink {
    names: Vec<String>,
    time: f64,
}

impl LogSignalSink {
    /// Creates a new log sink.
    pub fn new() -> Self {
        Default::default()
    }

    /// Gets the full name of a pin, such as `traction#3.state`.
    pub fn pin_name(&self, pin: PinId) -> Option<&str> {
        self.names.get(pin).map(String::as_str)
    }
}

impl SignalSink for LogSignalSink {
    fn pin(&mut self, entity: EntityHandle, name: &str) -> PinId {
        self.names
            .push(format!("{}#{}.{}", entity.kind, entity.id, name));
        self.names.len() - 1
    }

    fn feed(&mut self, pin: PinId, signal: Signal<'_>) {
        if log_enabled!(Level::Trace) {
            let name = self.pin_name(pin).unwrap_or("?");
            trace!("[{:10.3}] {} = {}", self.time, name, signal);
        }
    }

    fn set_simulated_time(&mut self, secs: f64) {
        self.time = secs;
    }
}

/// A sink which remembers the last value fed to every signal.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    names: Vec<String>,
    last: Vec<Option<String>>,
}

#[cfg(test)]
impl RecordingSink {
    /// Gets the last value fed to a pin, by its full name such as `schedule#0.state`.
    pub fn last(&self, name: &str) -> Option<&str> {
        let pin = self.names.iter().position(|n| n == name)?;
        self.last[pin].as_deref()
    }
}

#[cfg(test)]
impl SignalSink for RecordingSink {
    fn pin(&mut self, entity: EntityHandle, name: &str) -> PinId {
        self.names
            .push(format!("{}#{}.{}", entity.kind, entity.id, name));
        self.last.push(None);
        self.names.len() - 1
    }

    fn feed(&mut self, pin: PinId, signal: Signal<'_>) {
        if let Some(slot) = self.last.get_mut(pin) {
            *slot = Some(signal.to_string());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn log_sink_names_pins() {
        let mut sink = LogSignalSink::new();
        let unit = sink.entity_handle("unit", 3);
        let velocity = sink.pin(unit, "velocity");
        let traction = sink.entity_handle("traction", 3);
        let state = sink.pin(traction, "state");
        assert_eq!(sink.pin_name(velocity), Some("unit#3.velocity"));
        assert_eq!(sink.pin_name(state), Some("traction#3.state"));
        sink.feed(state, "EN_ROUTE".into());
        sink.feed(velocity, 2.5.into());
    }

    #[test]
    fn signals_display() {
        assert_eq!(Signal::from(1.5).to_string(), "1.5");
        assert_eq!(Signal::from("ARRIVED").to_string(), "ARRIVED");
    }
}
