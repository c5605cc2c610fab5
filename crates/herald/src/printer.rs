//! Message queue and writer thread.
//!
//! All output operations are channeled through a single consumer thread so
//! concurrent producers never interleave terminal writes and the log always
//! reflects enqueue order. The writer thread has exclusive ownership of the
//! terminal handles and the log sink; nothing else writes to either.

use std::io::Write;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local};
use crossterm::cursor::MoveToColumn;
use crossterm::style::{ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::QueueableCommand;

use crate::sink::{LogSink, Severity, TIMESTAMP_FORMAT};
use crate::term::TermCaps;
use crate::theme::{ColorScheme, PROGRESS_BAR_SYMBOL};

/// Bound for the render-instruction queue. Producers block (briefly) when
/// the writer falls this far behind, which is the backpressure we want.
const QUEUE_CAPACITY: usize = 1024;

/// Which terminal stream a shown emission goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Stdout,
    Stderr,
}

/// One message, created per emitter call and consumed once by the writer.
#[derive(Debug, Clone)]
pub(crate) struct Emission {
    pub(crate) created_at: DateTime<Local>,
    pub(crate) severity: Severity,
    pub(crate) text: String,
    /// `None` means log-only.
    pub(crate) target: Option<Target>,
    /// Ephemeral lines may be overwritten by whatever comes next.
    pub(crate) ephemeral: bool,
    /// Prefix the on-screen text with the creation timestamp.
    pub(crate) show_timestamp: bool,
    /// Finish the line immediately (needed before foreign terminal writes).
    pub(crate) end_line: bool,
    /// Whether this emission produces a log record (screen-only repeats of
    /// already-logged text, like the verbose greeting, set this to false).
    pub(crate) logged: bool,
}

impl Emission {
    pub(crate) fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            created_at: Local::now(),
            severity,
            text: text.into(),
            target: None,
            ephemeral: false,
            show_timestamp: false,
            end_line: false,
            logged: true,
        }
    }

    pub(crate) fn to(mut self, target: Option<Target>) -> Self {
        self.target = target;
        self
    }

    pub(crate) fn ephemeral(mut self, yes: bool) -> Self {
        self.ephemeral = yes;
        self
    }

    pub(crate) fn timestamped(mut self, yes: bool) -> Self {
        self.show_timestamp = yes;
        self
    }

    pub(crate) fn end_line(mut self, yes: bool) -> Self {
        self.end_line = yes;
        self
    }

    pub(crate) fn unlogged(mut self) -> Self {
        self.logged = false;
        self
    }
}

/// Instructions the writer thread processes, strictly in enqueue order.
pub(crate) enum RenderInstr {
    /// Show and/or log one emission.
    Write(Emission),
    /// Repaint a progress bar (render-only, never logged).
    Bar {
        text: String,
        progress: f64,
        total: f64,
        target: Option<Target>,
    },
    /// Append a "still working" indicator to the current line.
    Spin { glyph: char, elapsed: Duration },
    /// Remove any spinner residue from the current line.
    SpinClear,
    /// Drain: sync the sink and terminal, then ack.
    Flush(mpsc::Sender<()>),
    /// Finish unfinished lines, close down, ack, and exit the thread.
    Shutdown(mpsc::Sender<()>),
}

impl std::fmt::Debug for RenderInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderInstr::Write(em) => f.debug_tuple("Write").field(&em.text).finish(),
            RenderInstr::Bar { text, .. } => f.debug_tuple("Bar").field(text).finish(),
            RenderInstr::Spin { glyph, .. } => f.debug_tuple("Spin").field(glyph).finish(),
            RenderInstr::SpinClear => f.write_str("SpinClear"),
            RenderInstr::Flush(_) => f.write_str("Flush"),
            RenderInstr::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

/// The two terminal handles the writer owns. Defaults to the real process
/// streams; tests (and embedders) inject their own sinks.
pub(crate) struct PrinterOutputs {
    pub(crate) out: Box<dyn Write + Send>,
    pub(crate) err: Box<dyn Write + Send>,
}

impl PrinterOutputs {
    pub(crate) fn process_streams() -> Self {
        Self {
            out: Box::new(std::io::stdout()),
            err: Box::new(std::io::stderr()),
        }
    }
}

/// Spawn the writer thread; returns the producer side of the queue and the
/// join handle used at shutdown.
pub(crate) fn spawn(
    caps: TermCaps,
    sink: LogSink,
    outputs: PrinterOutputs,
) -> (SyncSender<RenderInstr>, JoinHandle<()>) {
    let (tx, rx) = mpsc::sync_channel(QUEUE_CAPACITY);
    let handle = thread::spawn(move || Writer::new(caps, sink, outputs).run(&rx));
    (tx, handle)
}

/// The line most recently shown on the terminal; drives overwrite decisions.
struct PrvLine {
    target: Target,
    /// Text as shown (timestamp prefix already applied).
    composed: String,
    ephemeral: bool,
    end_line: bool,
    /// Progress bars are repainted by their own instructions, never spun.
    spinnable: bool,
}

struct Writer {
    caps: TermCaps,
    sink: LogSink,
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
    colors: ColorScheme,
    prv: Option<PrvLine>,
}

impl Writer {
    fn new(caps: TermCaps, sink: LogSink, outputs: PrinterOutputs) -> Self {
        Self {
            caps,
            sink,
            out: outputs.out,
            err: outputs.err,
            colors: ColorScheme::default(),
            prv: None,
        }
    }

    fn run(mut self, rx: &Receiver<RenderInstr>) {
        while let Ok(instr) = rx.recv() {
            match instr {
                RenderInstr::Write(em) => self.handle_emission(em),
                RenderInstr::Bar {
                    text,
                    progress,
                    total,
                    target,
                } => self.write_bar(&text, progress, total, target),
                RenderInstr::Spin { glyph, elapsed } => self.spin(glyph, elapsed),
                RenderInstr::SpinClear => self.spin_clear(),
                RenderInstr::Flush(ack) => {
                    let _ = self.sink.flush();
                    self.flush_streams();
                    let _ = ack.send(());
                }
                RenderInstr::Shutdown(ack) => {
                    self.finish();
                    let _ = ack.send(());
                    break;
                }
            }
        }
    }

    fn handle_emission(&mut self, em: Emission) {
        if em.logged {
            let _ = self.sink.record(em.created_at, em.severity, &em.text);
        }
        let Some(target) = em.target else { return };

        let composed = if em.show_timestamp {
            format!("{} {}", em.created_at.format(TIMESTAMP_FORMAT), em.text)
        } else {
            em.text.clone()
        };

        if self.caps.is_interactive {
            self.settle_previous_line();
            self.render_line(target, &composed, em.severity, em.ephemeral, em.end_line, "");
        } else {
            // Redirected stream: every shown emission is its own full line,
            // nothing ephemeral, no control sequences.
            let stream = self.stream(target);
            let _ = writeln!(stream, "{composed}");
            let _ = stream.flush();
        }
        self.prv = Some(PrvLine {
            target,
            composed,
            ephemeral: em.ephemeral,
            end_line: em.end_line || !self.caps.is_interactive,
            spinnable: true,
        });
    }

    /// Complete or mark-for-overwrite whatever line the cursor sits on.
    fn settle_previous_line(&mut self) {
        let (target, ephemeral, end_line) = match &self.prv {
            None => return,
            Some(prv) => (prv.target, prv.ephemeral, prv.end_line),
        };
        if end_line {
            return;
        }
        if ephemeral {
            // The next render overwrites in place.
            self.clear_current_line(target);
        } else {
            // Permanent unfinished line: complete it so it stays intact.
            let stream = self.stream(target);
            let _ = writeln!(stream);
            let _ = stream.flush();
        }
    }

    fn clear_current_line(&mut self, target: Target) {
        let stream = self.stream(target);
        let _ = stream.queue(MoveToColumn(0));
        let _ = stream.queue(Clear(ClearType::CurrentLine));
    }

    /// Write one line at the cursor, truncating ephemeral text to the
    /// terminal width (with an ellipsis) so repaints never wrap.
    fn render_line(
        &mut self,
        target: Target,
        composed: &str,
        severity: Severity,
        ephemeral: bool,
        end_line: bool,
        spintext: &str,
    ) {
        let width = usize::from(self.caps.terminal_width);
        let usable = width.saturating_sub(spintext.chars().count() + 1);
        let mut text = composed.to_string();
        let length = text.chars().count();
        if length > usable && (ephemeral || !spintext.is_empty()) {
            text = text.chars().take(usable.saturating_sub(1)).collect();
            text.push('…');
        }

        let color = if self.caps.supports_color {
            self.colors.for_severity(severity)
        } else {
            None
        };

        let stream = self.stream(target);
        if let Some(color) = color {
            let _ = stream.queue(SetForegroundColor(color));
        }
        let _ = write!(stream, "{text}{spintext}");
        if color.is_some() {
            let _ = stream.queue(ResetColor);
        }
        if end_line {
            let _ = writeln!(stream);
        }
        let _ = stream.flush();
    }

    fn write_bar(&mut self, text: &str, progress: f64, total: f64, target: Option<Target>) {
        // Bars only make sense on an interactive terminal; redirected runs
        // already logged the leading progress text.
        let Some(target) = target else { return };
        if !self.caps.is_interactive {
            return;
        }
        self.settle_previous_line();

        let numerical = format!("{}/{}", fmt_quantity(progress), fmt_quantity(total));
        let ratio = if total > 0.0 {
            (progress / total).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Terminal width minus the text and numerical progress, and 5 (the
        // cursor at the end, two spaces, and the surrounding brackets).
        let width = usize::from(self.caps.terminal_width);
        let reserved = text.chars().count() + numerical.chars().count() + 5;
        let line = if width > reserved {
            let bar_width = width - reserved;
            let completed = (bar_width as f64 * ratio).floor() as usize;
            let filled: String = std::iter::repeat(PROGRESS_BAR_SYMBOL).take(completed).collect();
            let empty: String = " ".repeat(bar_width - completed);
            format!("{text} [{filled}{empty}] {numerical}")
        } else {
            text.chars().take(width.saturating_sub(1)).collect()
        };

        let stream = self.stream(target);
        let _ = write!(stream, "{line}");
        let _ = stream.flush();
        self.prv = Some(PrvLine {
            target,
            composed: line,
            ephemeral: true,
            end_line: false,
            spinnable: false,
        });
    }

    fn spin(&mut self, glyph: char, elapsed: Duration) {
        let Some((target, composed, ephemeral)) = self.spinnable_line() else {
            return;
        };
        let spintext = format!(" {glyph} ({:.1}s)", elapsed.as_secs_f64());
        self.clear_current_line(target);
        self.render_line(target, &composed, Severity::Progress, ephemeral, false, &spintext);
    }

    /// Repaint the supervised line without the spinner suffix.
    fn spin_clear(&mut self) {
        let Some((target, composed, ephemeral)) = self.spinnable_line() else {
            return;
        };
        self.clear_current_line(target);
        self.render_line(target, &composed, Severity::Progress, ephemeral, false, "");
    }

    /// The current line, if the spinner is allowed to decorate it.
    fn spinnable_line(&self) -> Option<(Target, String, bool)> {
        if !self.caps.is_interactive {
            return None;
        }
        let prv = self.prv.as_ref()?;
        if prv.end_line || !prv.spinnable {
            return None;
        }
        Some((prv.target, prv.composed.clone(), prv.ephemeral))
    }

    fn flush_streams(&mut self) {
        let _ = self.out.flush();
        let _ = self.err.flush();
    }

    /// Complete any unfinished line and sync the sink before exiting.
    fn finish(&mut self) {
        let unfinished = match &self.prv {
            Some(prv) if !prv.end_line => Some(prv.target),
            _ => None,
        };
        if let Some(target) = unfinished {
            let stream = self.stream(target);
            let _ = writeln!(stream);
        }
        self.flush_streams();
        let _ = self.sink.flush();
    }

    fn stream(&mut self, target: Target) -> &mut Box<dyn Write + Send> {
        match target {
            Target::Stdout => &mut self.out,
            Target::Stderr => &mut self.err,
        }
    }
}

/// Render a progress quantity: whole numbers without a fraction, byte-ish
/// fractions with one decimal.
fn fmt_quantity(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::SharedBuf;

    fn interactive_caps() -> TermCaps {
        TermCaps {
            is_interactive: true,
            supports_color: false,
            terminal_width: 60,
        }
    }

    fn start(
        caps: TermCaps,
    ) -> (
        SyncSender<RenderInstr>,
        JoinHandle<()>,
        SharedBuf,
        SharedBuf,
        tempfile::TempDir,
        std::path::PathBuf,
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join("run.log");
        let sink = LogSink::create(&log_path).unwrap();
        let out = SharedBuf::default();
        let err = SharedBuf::default();
        let outputs = PrinterOutputs {
            out: Box::new(out.clone()),
            err: Box::new(err.clone()),
        };
        let (tx, handle) = spawn(caps, sink, outputs);
        (tx, handle, out, err, tmp, log_path)
    }

    fn shutdown(tx: &SyncSender<RenderInstr>, handle: JoinHandle<()>) {
        let (ack_tx, ack_rx) = mpsc::channel();
        tx.send(RenderInstr::Shutdown(ack_tx)).unwrap();
        ack_rx.recv().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_log_only_emissions_never_touch_streams() {
        let (tx, handle, out, err, _tmp, log_path) = start(TermCaps::plain());
        for i in 0..10 {
            tx.send(RenderInstr::Write(Emission::new(
                Severity::Info,
                format!("quiet {i}"),
            )))
            .unwrap();
        }
        let (ack_tx, ack_rx) = mpsc::channel();
        tx.send(RenderInstr::Flush(ack_tx)).unwrap();
        ack_rx.recv().unwrap();

        assert!(out.contents().is_empty());
        assert!(err.contents().is_empty());
        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log.lines().count(), 10);
        shutdown(&tx, handle);
    }

    #[test]
    fn test_enqueue_order_is_render_and_log_order() {
        let (tx, handle, out, _err, _tmp, log_path) = start(TermCaps::plain());
        for i in 0..20 {
            tx.send(RenderInstr::Write(
                Emission::new(Severity::Info, format!("line {i}")).to(Some(Target::Stdout)),
            ))
            .unwrap();
        }
        shutdown(&tx, handle);

        let shown = out.contents();
        let shown_lines: Vec<&str> = shown.lines().collect();
        assert_eq!(shown_lines.len(), 20);
        for (i, line) in shown_lines.iter().enumerate() {
            assert_eq!(*line, format!("line {i}"));
        }
        let log = std::fs::read_to_string(&log_path).unwrap();
        for (i, line) in log.lines().enumerate() {
            assert!(line.ends_with(&format!("info line {i}")));
        }
    }

    #[test]
    fn test_ephemeral_line_is_overwritten_when_interactive() {
        let (tx, handle, _out, err, _tmp, _log) = start(interactive_caps());
        tx.send(RenderInstr::Write(
            Emission::new(Severity::Progress, "first step")
                .to(Some(Target::Stderr))
                .ephemeral(true),
        ))
        .unwrap();
        tx.send(RenderInstr::Write(
            Emission::new(Severity::Progress, "second step")
                .to(Some(Target::Stderr))
                .ephemeral(true),
        ))
        .unwrap();
        shutdown(&tx, handle);

        let bytes = err.contents();
        // Both texts were written, with a clear-line control sequence between.
        assert!(bytes.contains("first step"));
        assert!(bytes.contains("second step"));
        assert!(bytes.contains('\u{1b}'));
    }

    #[test]
    fn test_permanent_unfinished_line_is_completed_not_overwritten() {
        let (tx, handle, out, _err, _tmp, _log) = start(interactive_caps());
        tx.send(RenderInstr::Write(
            Emission::new(Severity::Info, "done building").to(Some(Target::Stdout)),
        ))
        .unwrap();
        tx.send(RenderInstr::Write(
            Emission::new(Severity::Info, "all ok").to(Some(Target::Stdout)),
        ))
        .unwrap();
        shutdown(&tx, handle);

        let bytes = out.contents();
        let newline_split: Vec<&str> = bytes.split('\n').collect();
        // "done building\n" then "all ok" then shutdown newline
        assert!(newline_split[0].contains("done building"));
        assert!(newline_split[1].contains("all ok"));
    }

    #[test]
    fn test_spinner_repaint_appends_elapsed_suffix() {
        let (tx, handle, _out, err, _tmp, log_path) = start(interactive_caps());
        tx.send(RenderInstr::Write(
            Emission::new(Severity::Progress, "compiling")
                .to(Some(Target::Stderr))
                .ephemeral(true),
        ))
        .unwrap();
        tx.send(RenderInstr::Spin {
            glyph: '-',
            elapsed: Duration::from_millis(2500),
        })
        .unwrap();
        tx.send(RenderInstr::SpinClear).unwrap();
        shutdown(&tx, handle);

        let bytes = err.contents();
        assert!(bytes.contains("compiling - (2.5s)"));
        // Spinner repaints are never logged.
        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[test]
    fn test_bar_renders_blocks_and_counts() {
        let (tx, handle, _out, err, _tmp, log_path) = start(interactive_caps());
        tx.send(RenderInstr::Bar {
            text: "downloading".into(),
            progress: 5.0,
            total: 10.0,
            target: Some(Target::Stderr),
        })
        .unwrap();
        shutdown(&tx, handle);

        let bytes = err.contents();
        assert!(bytes.contains("downloading ["));
        assert!(bytes.contains("5/10"));
        assert!(bytes.contains(PROGRESS_BAR_SYMBOL));
        // Bars are render instructions, not emissions: nothing logged.
        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log.lines().count(), 0);
    }

    #[test]
    fn test_bar_dropped_when_not_interactive() {
        let (tx, handle, out, err, _tmp, _log) = start(TermCaps::plain());
        tx.send(RenderInstr::Bar {
            text: "downloading".into(),
            progress: 1.0,
            total: 2.0,
            target: Some(Target::Stderr),
        })
        .unwrap();
        shutdown(&tx, handle);
        assert!(out.contents().is_empty());
        assert!(err.contents().is_empty());
    }

    #[test]
    fn test_long_ephemeral_text_is_truncated_with_ellipsis() {
        let (tx, handle, _out, err, _tmp, _log) = start(interactive_caps());
        let long = "x".repeat(200);
        tx.send(RenderInstr::Write(
            Emission::new(Severity::Progress, long)
                .to(Some(Target::Stderr))
                .ephemeral(true),
        ))
        .unwrap();
        shutdown(&tx, handle);

        let bytes = err.contents();
        assert!(bytes.contains('…'));
        // Truncated to fit inside 60 columns (plus the shutdown newline).
        let first_line = bytes.split('\n').next().unwrap();
        assert!(first_line.chars().count() <= 60);
    }

    #[test]
    fn test_fmt_quantity() {
        assert_eq!(fmt_quantity(5.0), "5");
        assert_eq!(fmt_quantity(1024.0), "1024");
        assert_eq!(fmt_quantity(2.5), "2.5");
    }
}
