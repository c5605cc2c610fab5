//! Bridge from the `tracing` ecosystem into the emitter.
//!
//! Libraries log through `tracing`; applications built on this crate want
//! those events in the run log and on screen according to the verbosity
//! mode, not through a second formatting stack. [`EmitterLayer`] forwards
//! every event into the writer queue, so tracing output stays ordered with
//! direct emissions.

use std::fmt::Write as _;
use std::sync::mpsc::SyncSender;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::emitter::{Emitter, EmitterMode};
use crate::printer::{Emission, RenderInstr, Target};
use crate::sink::Severity;

/// A `tracing_subscriber` layer that routes events through the emitter.
///
/// Every event is logged. Whether it also reaches the terminal depends on
/// the verbosity mode: quiet shows warnings and up, brief shows info and
/// up, verbose shows debug and up, and the debug/trace modes show all.
#[derive(Debug)]
pub struct EmitterLayer {
    tx: SyncSender<RenderInstr>,
    mode: EmitterMode,
}

impl EmitterLayer {
    /// Build a layer bound to an initialized emitter.
    pub fn new(emitter: &Emitter) -> Self {
        Self {
            tx: emitter.queue(),
            mode: emitter.mode(),
        }
    }

    fn screen_threshold(&self) -> Level {
        match self.mode {
            EmitterMode::Quiet => Level::WARN,
            EmitterMode::Brief => Level::INFO,
            EmitterMode::Verbose => Level::DEBUG,
            EmitterMode::Debug | EmitterMode::Trace => Level::TRACE,
        }
    }
}

impl<S: Subscriber> Layer<S> for EmitterLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        let text = visitor.into_text();
        if text.is_empty() {
            return;
        }

        let level = *event.metadata().level();
        let severity = if level == Level::ERROR {
            Severity::Error
        } else if level == Level::WARN {
            Severity::Warning
        } else if level == Level::INFO {
            Severity::Info
        } else {
            Severity::Trace
        };
        // In tracing's ordering, more severe levels compare smaller.
        let target = if level <= self.screen_threshold() {
            Some(Target::Stderr)
        } else {
            None
        };
        let timestamped = self.mode >= EmitterMode::Verbose;

        let _ = self.tx.send(RenderInstr::Write(
            Emission::new(severity, text)
                .to(target)
                .timestamped(timestamped)
                .end_line(true),
        ));
    }
}

/// Collects an event's `message` field plus any extra fields as
/// `key=value` suffixes, mirroring the common fmt-layer shape.
#[derive(Default)]
struct EventVisitor {
    message: String,
    extras: String,
}

impl EventVisitor {
    fn into_text(self) -> String {
        match (self.message.is_empty(), self.extras.is_empty()) {
            (false, false) => format!("{}{}", self.message, self.extras),
            (false, true) => self.message,
            (true, false) => self.extras.trim_start().to_string(),
            (true, true) => String::new(),
        }
    }
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.extras, " {}={value:?}", field.name());
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.extras, " {}={value}", field.name());
        }
    }
}
