//! The Emitter: the process-wide output coordinator.
//!
//! One emitter exists per run. It owns the verbosity mode, the operation
//! state machine, and the producer side of the writer queue; everything an
//! application shows or logs goes through it. The handle is cheap to clone
//! and safe to share across producer threads.

use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crate::errors::{EmitterError, HeraldError};
use crate::paths;
use crate::printer::{self, Emission, PrinterOutputs, RenderInstr, Target};
use crate::sink::{LogSink, Severity};
use crate::spinner::{self, SpinnerConfig, SpinnerSession};
use crate::term::TermCaps;

/// One emitter per process: a second `init` is a setup bug.
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// The verbosity modes, from least to most talkative. Chosen once at
/// startup; every emission is written to the log no matter the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EmitterMode {
    /// Only warnings, errors, and final results reach the terminal.
    Quiet,
    /// The default: progress is shown but ephemeral.
    Brief,
    /// Progress lines are permanent; the greeting and log location shown.
    Verbose,
    /// Adds timestamps and developer trace output.
    Debug,
    /// Everything, including captured subprocess output.
    Trace,
}

impl EmitterMode {
    /// Parse a user-supplied verbosity name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "quiet" => Some(Self::Quiet),
            "brief" => Some(Self::Brief),
            "verbose" => Some(Self::Verbose),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    /// The canonical lowercase name.
    pub fn label(self) -> &'static str {
        match self {
            Self::Quiet => "quiet",
            Self::Brief => "brief",
            Self::Verbose => "verbose",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for EmitterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything `Emitter::init` needs. Only mode, app name, and greeting are
/// mandatory; the rest have working defaults.
pub struct EmitterConfig {
    mode: EmitterMode,
    app_name: String,
    greeting: String,
    log_path: Option<PathBuf>,
    caps: Option<TermCaps>,
    spinner: SpinnerConfig,
    streams: Option<(Box<dyn Write + Send>, Box<dyn Write + Send>)>,
}

impl EmitterConfig {
    /// Config with defaults: auto-detected terminal capabilities, a
    /// rotated per-user log file, the process stdout/stderr.
    pub fn new(mode: EmitterMode, app_name: impl Into<String>, greeting: impl Into<String>) -> Self {
        Self {
            mode,
            app_name: app_name.into(),
            greeting: greeting.into(),
            log_path: None,
            caps: None,
            spinner: SpinnerConfig::default(),
            streams: None,
        }
    }

    /// Override the verbosity mode (parsed CLI flags take precedence over
    /// the one given to `new`).
    pub fn mode(mut self, mode: EmitterMode) -> Self {
        self.mode = mode;
        self
    }

    /// Use an explicit log file instead of the resolved, rotated one.
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Override the probed terminal capabilities (redirection, tests).
    pub fn caps(mut self, caps: TermCaps) -> Self {
        self.caps = Some(caps);
        self
    }

    /// Tune the still-working indicator.
    pub fn spinner(mut self, config: SpinnerConfig) -> Self {
        self.spinner = config;
        self
    }

    /// Redirect terminal output into arbitrary sinks. Meant for tests and
    /// embedders; the writer thread takes exclusive ownership.
    pub fn with_streams(
        mut self,
        out: impl Write + Send + 'static,
        err: impl Write + Send + 'static,
    ) -> Self {
        self.streams = Some((Box::new(out), Box::new(err)));
        self
    }
}

impl fmt::Debug for EmitterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterConfig")
            .field("mode", &self.mode)
            .field("app_name", &self.app_name)
            .field("log_path", &self.log_path)
            .field("caps", &self.caps)
            .finish_non_exhaustive()
    }
}

/// The operation state machine. `Ongoing` owns the spinner session, so an
/// operation cannot exist without one nor leak past its release.
#[derive(Debug)]
enum OpState {
    Idle,
    Ongoing {
        session: Arc<SpinnerSession>,
        controller: Option<JoinHandle<()>>,
    },
    Paused,
    Stopped,
}

impl OpState {
    fn name(&self) -> &'static str {
        match self {
            OpState::Idle => "idle",
            OpState::Ongoing { .. } => "running an operation",
            OpState::Paused => "paused",
            OpState::Stopped => "stopped",
        }
    }
}

#[derive(Debug)]
struct Inner {
    mode: EmitterMode,
    caps: TermCaps,
    log_path: PathBuf,
    spinner: SpinnerConfig,
    tx: SyncSender<RenderInstr>,
    state: Mutex<OpState>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle to the process' output coordinator.
#[derive(Debug, Clone)]
pub struct Emitter {
    inner: Arc<Inner>,
}

impl Emitter {
    /// Initialize the emitter. Must happen once, before any emission; a
    /// second call in the same process fails with
    /// [`EmitterError::AlreadyInitialized`].
    pub fn init(config: EmitterConfig) -> Result<Self, EmitterError> {
        if INITIALIZED.swap(true, Ordering::SeqCst) {
            return Err(EmitterError::AlreadyInitialized);
        }
        match Self::init_unguarded(config) {
            Ok(emitter) => Ok(emitter),
            Err(err) => {
                INITIALIZED.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Init without the process-wide guard. Unit tests build as many
    /// emitters as they need through this path.
    pub(crate) fn init_unguarded(config: EmitterConfig) -> Result<Self, EmitterError> {
        let caps = config.caps.unwrap_or_else(TermCaps::detect);
        let log_path = match config.log_path {
            Some(path) => path,
            None => paths::log_filepath(&config.app_name)?,
        };
        let sink = LogSink::create(&log_path)?;
        let outputs = match config.streams {
            Some((out, err)) => PrinterOutputs { out, err },
            None => PrinterOutputs::process_streams(),
        };
        let (tx, writer) = printer::spawn(caps, sink, outputs);

        let emitter = Self {
            inner: Arc::new(Inner {
                mode: config.mode,
                caps,
                log_path,
                spinner: config.spinner,
                tx,
                state: Mutex::new(OpState::Idle),
                writer: Mutex::new(Some(writer)),
            }),
        };

        // The greeting opens the log; in the verbose modes it is repeated
        // on screen together with where the log lives.
        emitter.send(Emission::new(Severity::Info, &config.greeting));
        if config.mode >= EmitterMode::Verbose {
            emitter.send(
                Emission::new(Severity::Info, &config.greeting)
                    .to(Some(Target::Stderr))
                    .timestamped(true)
                    .end_line(true)
                    .unlogged(),
            );
            emitter.send(
                Emission::new(
                    Severity::Info,
                    format!("Logging execution to '{}'", emitter.inner.log_path.display()),
                )
                .to(Some(Target::Stderr))
                .timestamped(true)
                .end_line(true)
                .unlogged(),
            );
        }
        Ok(emitter)
    }

    /// The verbosity mode this run was started with.
    pub fn mode(&self) -> EmitterMode {
        self.inner.mode
    }

    /// Where this run's log records go.
    pub fn log_path(&self) -> &Path {
        &self.inner.log_path
    }

    /// Show an informational line to the user.
    ///
    /// Valid whether or not an operation is open. Always logged; shown on
    /// stdout unless the mode is quiet.
    pub fn message(&self, text: &str) -> Result<(), EmitterError> {
        self.ensure_live("emit a message")?;
        let target = if self.inner.mode == EmitterMode::Quiet {
            None
        } else {
            Some(Target::Stdout)
        };
        self.send(Emission::new(Severity::Info, text).to(target));
        Ok(())
    }

    /// Show something noteworthy but not fatal.
    ///
    /// Warnings reach the terminal in every mode, quiet included.
    pub fn warning(&self, text: &str) -> Result<(), EmitterError> {
        self.ensure_live("emit a warning")?;
        let timestamped = self.inner.mode >= EmitterMode::Verbose;
        self.send(
            Emission::new(Severity::Warning, text)
                .to(Some(Target::Stderr))
                .timestamped(timestamped)
                .end_line(true),
        );
        Ok(())
    }

    /// Record developer-facing detail for postmortem analysis.
    ///
    /// Always logged; shown only in the debug and trace modes.
    pub fn trace(&self, text: &str) -> Result<(), EmitterError> {
        self.ensure_live("emit a trace")?;
        let target = if self.inner.mode >= EmitterMode::Debug {
            Some(Target::Stderr)
        } else {
            None
        };
        self.send(
            Emission::new(Severity::Trace, text)
                .to(target)
                .timestamped(true)
                .end_line(true),
        );
        Ok(())
    }

    /// Progress for the open operation.
    ///
    /// Requires an operation: fails fast with
    /// [`EmitterError::InvalidState`] otherwise. In brief mode the line is
    /// ephemeral (overwritten by the next one) unless `permanent` is set;
    /// the verbose modes keep every progress line.
    pub fn progress(&self, text: &str, permanent: bool) -> Result<(), EmitterError> {
        {
            let st = self.state();
            match &*st {
                OpState::Ongoing { session, .. } => session.touch(text),
                other => return Err(EmitterError::invalid("emit progress", other.name())),
            }
        }
        self.send(self.progress_emission(text, permanent));
        Ok(())
    }

    fn progress_emission(&self, text: &str, permanent: bool) -> Emission {
        let em = Emission::new(Severity::Progress, text);
        match self.inner.mode {
            EmitterMode::Quiet => em.ephemeral(true),
            EmitterMode::Brief => em.to(Some(Target::Stderr)).ephemeral(!permanent),
            EmitterMode::Verbose => em.to(Some(Target::Stderr)),
            EmitterMode::Debug | EmitterMode::Trace => {
                em.to(Some(Target::Stderr)).timestamped(true)
            }
        }
    }

    /// Progress for a long single step with a known size (a download, an
    /// upload). The returned handle repaints the bar on each `advance`.
    pub fn progress_bar(
        &self,
        text: &str,
        total: f64,
        delta: bool,
    ) -> Result<Progresser, EmitterError> {
        let session = {
            let st = self.state();
            match &*st {
                OpState::Ongoing { session, .. } => {
                    session.touch(text);
                    Arc::clone(session)
                }
                other => {
                    return Err(EmitterError::invalid("start a progress bar", other.name()))
                }
            }
        };
        let target = if self.inner.mode == EmitterMode::Quiet {
            None
        } else {
            Some(Target::Stderr)
        };
        self.send(
            Emission::new(Severity::Progress, text)
                .to(target)
                .ephemeral(true),
        );
        Ok(Progresser {
            emitter: self.clone(),
            session,
            text: text.to_string(),
            total,
            accumulated: 0.0,
            delta,
            target,
        })
    }

    /// Open a scoped operation: `Idle → Ongoing`.
    ///
    /// The returned handle releases the operation on drop — every exit
    /// path, success or failure, lands back in `Idle`. Operations do not
    /// nest: a second `begin` while one is open fails with
    /// [`EmitterError::InvalidState`].
    pub fn begin(&self, text: &str) -> Result<Operation, EmitterError> {
        {
            let mut st = self.state();
            match &*st {
                OpState::Idle => {}
                other => return Err(EmitterError::invalid("open an operation", other.name())),
            }
            let session = SpinnerSession::new(text);
            let controller = if self.inner.caps.is_interactive {
                Some(spinner::spawn_controller(
                    Arc::clone(&session),
                    self.inner.tx.clone(),
                    self.inner.spinner,
                ))
            } else {
                None
            };
            *st = OpState::Ongoing {
                session,
                controller,
            };
        }
        // Announce the operation like any other progress line.
        self.send(self.progress_emission(text, false));
        Ok(Operation {
            emitter: self.clone(),
        })
    }

    /// Temporarily hand the terminal to someone else (an interactive
    /// subprocess). Drains all pending output first; emissions fail while
    /// paused; dropping the guard resumes.
    pub fn pause(&self) -> Result<PauseGuard, EmitterError> {
        {
            let mut st = self.state();
            match &*st {
                OpState::Idle => {}
                other => return Err(EmitterError::invalid("pause", other.name())),
            }
            *st = OpState::Paused;
        }
        self.send(Emission::new(Severity::Trace, "Pausing control of the terminal"));
        self.flush();
        Ok(PauseGuard {
            emitter: self.clone(),
        })
    }

    /// Block until every queued render instruction has been processed and
    /// the log is synced to disk.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.inner.tx.send(RenderInstr::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Finish cleanly: `Idle`-or-`Ongoing → Stopped`. Drains the queue
    /// synchronously, so nothing is lost if the process exits right after.
    /// A second call is a no-op.
    pub fn ended_ok(&self) -> Result<(), EmitterError> {
        self.finalize(None)
    }

    /// Report a failure and stop: full detail (cause chain included) goes
    /// to the log; the terminal gets the short message plus resolution
    /// hints. Transitions to `Stopped`; a second call is a no-op.
    pub fn error(&self, error: &HeraldError) -> Result<(), EmitterError> {
        self.finalize(Some(error))
    }

    fn finalize(&self, error: Option<&HeraldError>) -> Result<(), EmitterError> {
        {
            let mut st = self.state();
            match std::mem::replace(&mut *st, OpState::Stopped) {
                OpState::Stopped => return Ok(()),
                OpState::Ongoing {
                    session,
                    controller,
                } => {
                    drop(st);
                    session.cancel();
                    if let Some(handle) = controller {
                        let _ = handle.join();
                    }
                }
                OpState::Idle | OpState::Paused => {}
            }
        }
        if let Some(err) = error {
            self.report_error(err);
        }
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.inner.tx.send(RenderInstr::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
        let handle = self
            .inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        Ok(())
    }

    fn report_error(&self, err: &HeraldError) {
        let verbose = self.inner.mode >= EmitterMode::Verbose;
        let full_target = if verbose { Some(Target::Stderr) } else { None };

        let line = |text: String, target: Option<Target>| {
            Emission::new(Severity::Error, text)
                .to(target)
                .timestamped(verbose)
                .end_line(true)
        };

        self.send(line(err.message.clone(), Some(Target::Stderr)));
        if let Some(details) = &err.details {
            self.send(line(format!("Detailed information: {details}"), full_target));
        }
        for cause in err.cause_chain() {
            self.send(line(format!("Caused by: {cause}"), full_target));
        }
        if let Some(resolution) = &err.resolution {
            self.send(line(
                format!("Recommended resolution: {resolution}"),
                Some(Target::Stderr),
            ));
        }
        if let Some(url) = &err.docs_url {
            self.send(line(
                format!("For more information, check out: {url}"),
                Some(Target::Stderr),
            ));
        }
        self.send(line(
            format!("Full execution log: '{}'", self.inner.log_path.display()),
            Some(Target::Stderr),
        ));
    }

    fn release_operation(&self) {
        let mut st = self.state();
        if matches!(&*st, OpState::Ongoing { .. }) {
            let prev = std::mem::replace(&mut *st, OpState::Idle);
            drop(st);
            if let OpState::Ongoing {
                session,
                controller,
            } = prev
            {
                session.cancel();
                if let Some(handle) = controller {
                    let _ = handle.join();
                }
            }
        }
    }

    fn resume(&self) {
        let mut st = self.state();
        if matches!(&*st, OpState::Paused) {
            *st = OpState::Idle;
            drop(st);
            self.send(Emission::new(
                Severity::Trace,
                "Resuming control of the terminal",
            ));
        }
    }

    fn ensure_live(&self, action: &'static str) -> Result<(), EmitterError> {
        let st = self.state();
        match &*st {
            OpState::Paused | OpState::Stopped => Err(EmitterError::invalid(action, st.name())),
            OpState::Idle | OpState::Ongoing { .. } => Ok(()),
        }
    }

    fn ensure_ongoing(&self, action: &'static str) -> Result<(), EmitterError> {
        let st = self.state();
        match &*st {
            OpState::Ongoing { .. } => Ok(()),
            other => Err(EmitterError::invalid(action, other.name())),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, OpState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, emission: Emission) {
        let _ = self.inner.tx.send(RenderInstr::Write(emission));
    }

    /// Producer handle for components that feed the queue directly (the
    /// tracing bridge); bypasses the state machine on purpose.
    pub(crate) fn queue(&self) -> SyncSender<RenderInstr> {
        self.inner.tx.clone()
    }

    fn send_instr(&self, instr: RenderInstr) {
        let _ = self.inner.tx.send(instr);
    }
}

/// A scoped, exclusive operation. Dropping it (any exit path) returns the
/// emitter to `Idle` and tears the spinner session down.
#[derive(Debug)]
pub struct Operation {
    emitter: Emitter,
}

impl Operation {
    /// Same as [`Emitter::progress`].
    pub fn progress(&self, text: &str, permanent: bool) -> Result<(), EmitterError> {
        self.emitter.progress(text, permanent)
    }

    /// Same as [`Emitter::progress_bar`].
    pub fn progress_bar(&self, text: &str, total: f64, delta: bool) -> Result<Progresser, EmitterError> {
        self.emitter.progress_bar(text, total, delta)
    }

    /// Stream lines from an external source (typically a child process'
    /// stdout) through the emitter: each line is logged with a `:: `
    /// prefix, and shown on stderr in the verbose modes.
    ///
    /// The reader runs on its own thread until the source ends; dropping
    /// the handle (or calling [`CaptureHandle::wait`]) joins it.
    pub fn capture<R: Read + Send + 'static>(&self, source: R) -> CaptureHandle {
        let emitter = self.emitter.clone();
        let target = if emitter.inner.mode >= EmitterMode::Verbose {
            Some(Target::Stderr)
        } else {
            None
        };
        let handle = std::thread::spawn(move || {
            let reader = BufReader::new(source);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                emitter.send(
                    Emission::new(Severity::Trace, format!(":: {line}"))
                        .to(target)
                        .timestamped(true)
                        .end_line(true),
                );
            }
        });
        CaptureHandle {
            handle: Some(handle),
        }
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        self.emitter.release_operation();
    }
}

/// Joins the capture thread on drop, so captured lines cannot outlive the
/// scope that spawned them.
#[derive(Debug)]
pub struct CaptureHandle {
    handle: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Block until the source is exhausted.
    pub fn wait(mut self) {
        self.join_reader();
    }

    fn join_reader(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.join_reader();
    }
}

/// Handle for a sized progress bar; one repaint per `advance`.
#[derive(Debug)]
pub struct Progresser {
    emitter: Emitter,
    session: Arc<SpinnerSession>,
    text: String,
    total: f64,
    accumulated: f64,
    delta: bool,
    target: Option<Target>,
}

impl Progresser {
    /// Report progress. With `delta` (the default mode), `amount` is added
    /// to the running total; otherwise it is the absolute progress so far.
    /// Negative amounts are treated as zero.
    pub fn advance(&mut self, amount: f64) -> Result<(), EmitterError> {
        self.emitter.ensure_ongoing("advance a progress bar")?;
        let amount = amount.max(0.0);
        if self.delta {
            self.accumulated += amount;
        } else {
            self.accumulated = amount;
        }
        self.session.keep_alive();
        self.emitter.send_instr(RenderInstr::Bar {
            text: self.text.clone(),
            progress: self.accumulated,
            total: self.total,
            target: self.target,
        });
        Ok(())
    }

    /// The bar's total, as given at creation.
    pub fn total(&self) -> f64 {
        self.total
    }
}

/// Returns the emitter to `Idle` when dropped.
#[derive(Debug)]
pub struct PauseGuard {
    emitter: Emitter,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.emitter.resume();
    }
}
