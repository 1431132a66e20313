//! Change tracking for deobfuscation passes.
//!
//! Every modification a pass makes to a program is recorded as an [`Event`] in an
//! [`EventLog`]. The log is append-only and can be written from several threads at once
//! (it is backed by a `boxcar::Vec`), so per-method passes running under rayon record
//! directly into the shared log without locking.
//!
//! ```rust
//! use classdeob::deobfuscation::{EventKind, EventLog};
//! use classdeob::program::FieldRef;
//!
//! let events = EventLog::new();
//! let field = FieldRef::new("a/B", "unused", "I")?;
//! events
//!     .record(EventKind::FieldRemoved)
//!     .message(format!("removed {field}"));
//!
//! assert_eq!(events.stats().fields_removed, 1);
//! # Ok::<(), classdeob::Error>(())
//! ```

use std::fmt;

use strum::{Display, EnumCount, EnumIter, IntoEnumIterator};

use crate::program::MethodRef;

/// The kind of change an [`Event`] describes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumIter, EnumCount)]
pub enum EventKind {
    /// A field declaration was removed
    #[strum(serialize = "field removed")]
    FieldRemoved,
    /// A method declaration was removed
    #[strum(serialize = "method removed")]
    MethodRemoved,
    /// An instruction was removed from a method body
    #[strum(serialize = "instruction removed")]
    InstructionRemoved,
    /// An instruction was inserted into a method body
    #[strum(serialize = "instruction inserted")]
    InstructionInserted,
    /// A unit of work was skipped because of an error
    #[strum(serialize = "warning")]
    Warning,
}

/// One recorded change.
#[derive(Clone, Debug)]
pub struct Event {
    /// What happened
    pub kind: EventKind,
    /// The affected method, if any
    pub method: Option<MethodRef>,
    /// Program counter inside the method, if any
    pub pc: Option<u32>,
    /// Human readable detail
    pub message: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(method) = &self.method {
            write!(f, " {method}")?;
            if let Some(pc) = self.pc {
                write!(f, "@{pc}")?;
            }
        }
        if !self.message.is_empty() {
            write!(f, " {}", self.message)?;
        }
        Ok(())
    }
}

/// Append-only, thread-safe log of [`Event`]s.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Starts recording an event. The event is appended when the returned builder is
    /// dropped, typically right after [`EventBuilder::message`].
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            event: Some(Event {
                kind,
                method: None,
                pc: None,
                message: String::new(),
            }),
        }
    }

    /// Moves all events of `other` into this log, keeping their order.
    pub fn merge(&self, other: EventLog) {
        for event in other.events {
            self.events.push(event);
        }
    }

    /// Takes all events out, leaving an empty log behind.
    pub fn take(&mut self) -> EventLog {
        std::mem::take(self)
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterates the events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, event)| event)
    }

    /// Number of events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.iter().filter(|event| event.kind == kind).count()
    }

    /// Returns `true` if any event of `kind` was recorded.
    #[must_use]
    pub fn has_any(&self, kind: EventKind) -> bool {
        self.iter().any(|event| event.kind == kind)
    }

    /// Aggregated counts over the whole log.
    #[must_use]
    pub fn stats(&self) -> DerivedStats {
        let mut counts = [0usize; EventKind::COUNT];
        for event in self.iter() {
            counts[event.kind as usize] += 1;
        }

        DerivedStats {
            fields_removed: counts[EventKind::FieldRemoved as usize],
            methods_removed: counts[EventKind::MethodRemoved as usize],
            instructions_removed: counts[EventKind::InstructionRemoved as usize],
            instructions_inserted: counts[EventKind::InstructionInserted as usize],
            warnings: counts[EventKind::Warning as usize],
        }
    }

    /// Event counts per kind, for every kind including those never recorded.
    #[must_use]
    pub fn counts_by_kind(&self) -> Vec<(EventKind, usize)> {
        EventKind::iter()
            .map(|kind| (kind, self.count_kind(kind)))
            .collect()
    }
}

/// Builder returned by [`EventLog::record`].
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Option<Event>,
}

impl EventBuilder<'_> {
    /// Attributes the event to a method.
    pub fn method(mut self, method: &MethodRef) -> Self {
        if let Some(event) = self.event.as_mut() {
            event.method = Some(method.clone());
        }
        self
    }

    /// Attributes the event to an instruction position.
    pub fn at(mut self, method: &MethodRef, pc: u32) -> Self {
        if let Some(event) = self.event.as_mut() {
            event.method = Some(method.clone());
            event.pc = Some(pc);
        }
        self
    }

    /// Sets the detail message and records the event.
    pub fn message(mut self, message: impl Into<String>) {
        if let Some(event) = self.event.as_mut() {
            event.message = message.into();
        }
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.log.events.push(event);
        }
    }
}

/// Summary counts derived from an [`EventLog`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DerivedStats {
    /// Removed field declarations
    pub fields_removed: usize,
    /// Removed method declarations
    pub methods_removed: usize,
    /// Removed instructions
    pub instructions_removed: usize,
    /// Inserted instructions
    pub instructions_inserted: usize,
    /// Skipped units of work
    pub warnings: usize,
}

impl DerivedStats {
    /// Returns `true` if no change was recorded (warnings do not count).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields_removed == 0
            && self.methods_removed == 0
            && self.instructions_removed == 0
            && self.instructions_inserted == 0
    }
}

impl fmt::Display for DerivedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() && self.warnings == 0 {
            return write!(f, "No changes");
        }

        let parts: Vec<String> = [
            (self.fields_removed, "fields removed"),
            (self.methods_removed, "methods removed"),
            (self.instructions_removed, "instructions removed"),
            (self.instructions_inserted, "instructions inserted"),
            (self.warnings, "warnings"),
        ]
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{count} {label}"))
        .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_records_on_drop() {
        let log = EventLog::new();
        let method = MethodRef::new("a/B", "run", "()V").unwrap();

        log.record(EventKind::InstructionRemoved)
            .at(&method, 12)
            .message("pop");
        log.record(EventKind::Warning).method(&method);

        assert_eq!(log.len(), 2);
        let first = log.iter().next().unwrap();
        assert_eq!(first.pc, Some(12));
        assert_eq!(first.to_string(), "[instruction removed] a/B.run()V@12 pop");
        assert!(log.has_any(EventKind::Warning));
        assert!(!log.has_any(EventKind::FieldRemoved));
    }

    #[test]
    fn test_merge_and_stats() {
        let log = EventLog::new();
        log.record(EventKind::FieldRemoved).message("x");

        let other = EventLog::new();
        other.record(EventKind::FieldRemoved).message("y");
        other.record(EventKind::InstructionInserted).message("pop");
        log.merge(other);

        let messages: Vec<_> = log.iter().map(|event| event.message.as_str()).collect();
        assert_eq!(messages, vec!["x", "y", "pop"]);

        let stats = log.stats();
        assert_eq!(stats.fields_removed, 2);
        assert_eq!(stats.instructions_inserted, 1);
        assert_eq!(stats.to_string(), "2 fields removed, 1 instructions inserted");
        assert_eq!(log.counts_by_kind().len(), EventKind::COUNT);
        assert_eq!(EventLog::new().stats().to_string(), "No changes");
    }

    #[test]
    fn test_parallel_recording() {
        use rayon::prelude::*;

        let log = EventLog::new();
        (0..64).into_par_iter().for_each(|i| {
            log.record(EventKind::InstructionRemoved)
                .message(format!("{i}"));
        });
        assert_eq!(log.count_kind(EventKind::InstructionRemoved), 64);
    }
}
