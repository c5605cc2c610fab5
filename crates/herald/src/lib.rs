//! herald - coordinated terminal and log output for multi-command CLIs
//!
//! # Overview
//!
//! Herald unifies command dispatch with an output orchestration engine: one
//! process-wide [`Emitter`] multiplexes user-facing messages, ephemeral
//! progress lines, spinners and progress bars, captured subprocess output,
//! and error reports across the terminal and a persistent run log — and
//! stays coherent under concurrent producers.
//!
//! # Architecture
//!
//! - **Actor pattern**: every output operation is a render instruction on a
//!   bounded queue consumed by one writer thread, which exclusively owns
//!   the terminal handles and the log sink. Concurrent producers can never
//!   interleave a line.
//! - **Tagged state machine**: the emitter is `Idle`, `Ongoing` (the state
//!   owns the spinner session), `Paused`, or `Stopped`; emissions that need
//!   an open operation fail fast anywhere else.
//! - **Single catch point**: handlers raise [`HeraldError`]; the
//!   [`Dispatcher`] converts failures to reports and exit codes.
//!
//! # Example
//!
//! ```no_run
//! use herald::{Command, CommandGroup, Dispatcher, Emitter, HeraldError};
//!
//! struct SyncMirror;
//!
//! impl Command for SyncMirror {
//!     fn name(&self) -> &'static str {
//!         "sync"
//!     }
//!
//!     fn help(&self) -> &'static str {
//!         "synchronize the local mirror"
//!     }
//!
//!     fn run(&self, emitter: &Emitter, _matches: &clap::ArgMatches) -> Result<(), HeraldError> {
//!         let op = emitter.begin("Synchronizing").expect("emitter is idle");
//!         op.progress("fetching index", false).expect("operation is open");
//!         // ... the actual work ...
//!         drop(op);
//!         emitter.message("Mirror is up to date").expect("emitter is live");
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), herald::EmitterError> {
//!     let dispatcher = Dispatcher::new("mirror", "mirror 1.0")
//!         .group(CommandGroup::new("repo").with(SyncMirror));
//!     let argv: Vec<String> = std::env::args().skip(1).collect();
//!     let code = dispatcher.dispatch(&argv)?;
//!     std::process::exit(code);
//! }
//! ```

mod bridge;
mod dispatch;
mod emitter;
mod errors;
mod paths;
mod printer;
mod sink;
mod spinner;
mod term;
mod theme;

#[cfg(test)]
mod testutil;

pub use bridge::EmitterLayer;
pub use dispatch::{Command, CommandGroup, Dispatcher};
pub use emitter::{
    CaptureHandle, Emitter, EmitterConfig, EmitterMode, Operation, PauseGuard, Progresser,
};
pub use errors::{BoxedCause, EmitterError, HeraldError, UsageError, RETCODE_FAILURE, RETCODE_USAGE};
pub use paths::{log_filepath, MAX_LOG_FILES};
pub use sink::Severity;
pub use spinner::SpinnerConfig;
pub use term::TermCaps;
