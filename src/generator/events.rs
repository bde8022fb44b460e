//! Event logging for the CPS-IR pipeline.
//!
//! Every compilation session owns an [`EventLog`] that captures what the pipeline did:
//! stages entered and left, rewrites performed by the passes and soft diagnostics such
//! as unreachable exception dispatchers. Events can be inspected by tests and tools or
//! safely ignored.
//!
//! # Architecture
//!
//! - [`Event`] - a single recorded event
//! - [`EventLog`] - thread-safe, append-only collection with query and summary helpers
//! - [`EventBuilder`] - fluent API for creating events
//!
//! # Example
//!
//! ```rust
//! use cirgen::generator::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::BlockInlined)
//!     .method("Foo.bar()int")
//!     .location(3)
//!     .message("B2 into its only call site");
//! log.warn("dispatcher 4 is unreachable");
//!
//! assert_eq!(log.count_kind(EventKind::BlockInlined), 1);
//! assert_eq!(log.warnings().count(), 1);
//! assert_eq!(log.summary(), "1 block inlined");
//! ```

use std::{collections::HashMap, fmt};

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A block was inlined at a call site.
    BlockInlined,
    /// A block was specialized for one of several call sites.
    BlockSpecialized,
    /// A trivial binding was substituted away.
    CopyPropagated,
    /// A continuation was replaced by the continuation it forwards to.
    ContinuationEtaReduced,
    /// Unused block parameters were removed.
    ParametersPruned,
    /// Free variables were turned into block parameters.
    VariablesCaptured,
    /// A switch with constant operands was reduced to the taken branch.
    SwitchFolded,
    /// A builtin with constant operands was evaluated.
    ConstantFolded,
    /// A high-level operator was lowered to builtins.
    OperatorLowered,
    /// A receiver null check was omitted because the receiver is initialized.
    NullCheckElided,

    /// A pipeline stage started.
    StageStarted,
    /// A pipeline stage completed.
    StageCompleted,
    /// A method was generated through the full pipeline.
    MethodGenerated,
    /// A foldable method was generated through the fast path.
    MethodFolded,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (something failed).
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            // Transformations
            Self::BlockInlined => "block inlined",
            Self::BlockSpecialized => "block specialized",
            Self::CopyPropagated => "copy propagated",
            Self::ContinuationEtaReduced => "continuation eta-reduced",
            Self::ParametersPruned => "parameters pruned",
            Self::VariablesCaptured => "variables captured",
            Self::SwitchFolded => "switch folded",
            Self::ConstantFolded => "constant folded",
            Self::OperatorLowered => "operator lowered",
            Self::NullCheckElided => "null check elided",
            // Pipeline
            Self::StageStarted => "stage started",
            Self::StageCompleted => "stage completed",
            Self::MethodGenerated => "method generated",
            Self::MethodFolded => "method folded",
            // Diagnostic
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this event represents a rewrite of the graph.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::BlockInlined
                | Self::BlockSpecialized
                | Self::CopyPropagated
                | Self::ContinuationEtaReduced
                | Self::ParametersPruned
                | Self::VariablesCaptured
                | Self::SwitchFolded
                | Self::ConstantFolded
                | Self::OperatorLowered
                | Self::NullCheckElided
        )
    }

    /// Returns true if this is a diagnostic event (info/warning/error).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The method being compiled, if applicable.
    pub method: Option<String>,
    /// Instruction offset or block index within the method.
    pub location: Option<u32>,
    /// Human-readable description.
    pub message: String,
    /// Pipeline stage or pass that produced the event.
    pub stage: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            method: None,
            location: None,
            message: message.into(),
            stage: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the builder is
/// dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    method: Option<String>,
    location: Option<u32>,
    message: Option<String>,
    stage: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            method: None,
            location: None,
            message: None,
            stage: None,
        }
    }

    /// Sets the method the event belongs to.
    pub fn method(mut self, method: impl fmt::Display) -> Self {
        self.method = Some(method.to_string());
        self
    }

    /// Sets the location within the method.
    pub fn location(mut self, location: u32) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a stage or pass.
    pub fn stage(mut self, stage: impl fmt::Display) -> Self {
        self.stage = Some(stage.to_string());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            method: self.method.take(),
            location: self.location.take(),
            message,
            stage: self.stage.take(),
        });
    }
}

/// Collection of pipeline events.
///
/// Statistics are derived from the events rather than tracked separately. Events can
/// be appended concurrently from multiple threads through shared references, which
/// lets [`crate::generator::CirGenerator::generate_all`] report into one log.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let copy = Self::new();
        for (_, event) in &self.events {
            copy.events.push(event.clone());
        }
        copy
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Returns an iterator over the events of one method.
    pub fn filter_method<'a>(&'a self, method: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter().filter(move |e| e.method.as_deref() == Some(method))
    }

    /// Returns an iterator over transformation events only.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_transformation())
    }

    /// Returns an iterator over diagnostic events only.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_diagnostic())
    }

    /// Returns an iterator over warning events.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Generates a human-readable summary of the transformations performed.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(kind, _)| kind.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

impl Extend<Event> for EventLog {
    fn extend<T: IntoIterator<Item = Event>>(&mut self, iter: T) {
        for event in iter {
            self.events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_records_on_drop() {
        let log = EventLog::new();
        log.record(EventKind::SwitchFolded)
            .method("T.m()void")
            .location(2)
            .stage("optimization");

        let event = log.iter().next().expect("event recorded");
        assert_eq!(event.kind, EventKind::SwitchFolded);
        assert_eq!(event.message, "switch folded");
        assert_eq!(event.location, Some(2));
        assert_eq!(event.stage.as_deref(), Some("optimization"));
        assert_eq!(log.filter_method("T.m()void").count(), 1);
    }

    #[test]
    fn test_summary_counts_transformations() {
        let log = EventLog::new();
        assert_eq!(log.summary(), "no events");

        log.info("starting");
        assert_eq!(log.summary(), "1 events");

        log.record(EventKind::CopyPropagated);
        log.record(EventKind::CopyPropagated);
        log.record(EventKind::BlockInlined);
        assert_eq!(log.summary(), "1 block inlined, 2 copy propagated");
        assert_eq!(log.transformations().count(), 3);
        assert_eq!(log.diagnostics().count(), 1);
    }

    #[test]
    fn test_concurrent_append() {
        let log = EventLog::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        log.record(EventKind::ConstantFolded);
                    }
                });
            }
        });
        assert_eq!(log.count_kind(EventKind::ConstantFolded), 100);

        let copy = log.clone();
        assert_eq!(copy.len(), 100);
    }
}
