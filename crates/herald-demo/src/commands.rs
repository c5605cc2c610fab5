//! Demo command handlers.
//!
//! Each handler exercises a slice of the emitter surface: plain messages,
//! operation-scoped progress, a sized progress bar, captured subprocess
//! output, and the error reporting path.

use std::process::Stdio;
use std::time::Duration;

use clap::ArgMatches;
use herald::{Command, Emitter, HeraldError};

/// Say hello; the smallest possible handler.
pub struct Greet;

impl Command for Greet {
    fn name(&self) -> &'static str {
        "greet"
    }

    fn help(&self) -> &'static str {
        "print a friendly greeting"
    }

    fn fill_args(&self, command: clap::Command) -> clap::Command {
        command.arg(
            clap::Arg::new("name")
                .long("name")
                .help("who to greet")
                .default_value("world"),
        )
    }

    fn run(&self, emitter: &Emitter, matches: &ArgMatches) -> Result<(), HeraldError> {
        let name = matches.get_one::<String>("name").expect("defaulted");
        // Emitter misuse is fatal by contract, not a reportable failure.
        emitter
            .message(&format!("Hello, {name}!"))
            .expect("emitter is live");
        Ok(())
    }
}

/// Simulate a short build pipeline: progress lines, a bar, and a captured
/// subprocess.
pub struct Run;

impl Command for Run {
    fn name(&self) -> &'static str {
        "run"
    }

    fn help(&self) -> &'static str {
        "simulate a build pipeline"
    }

    fn fill_args(&self, command: clap::Command) -> clap::Command {
        command.arg(
            clap::Arg::new("units")
                .long("units")
                .help("how many compilation units to simulate")
                .value_parser(clap::value_parser!(u32).range(1..=100))
                .default_value("3"),
        )
    }

    fn run(&self, emitter: &Emitter, matches: &ArgMatches) -> Result<(), HeraldError> {
        let units = *matches.get_one::<u32>("units").expect("defaulted");
        tracing::debug!(units, "starting the simulated pipeline");

        let op = emitter.begin("Building project").expect("emitter is idle");
        for unit in 1..=units {
            op.progress(&format!("compiling unit {unit}/{units}"), false)
                .expect("operation is open");
            std::thread::sleep(Duration::from_millis(40));
        }

        let mut bar = op
            .progress_bar("downloading artifacts", 4.0, true)
            .expect("operation is open");
        for _ in 0..4 {
            bar.advance(1.0).expect("operation is open");
            std::thread::sleep(Duration::from_millis(25));
        }

        let mut child = std::process::Command::new("sh")
            .args(["-c", "echo linking objects; echo stripping symbols"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                HeraldError::new("could not spawn the linker step")
                    .with_resolution("check that 'sh' is on the PATH")
                    .with_cause(err)
            })?;
        if let Some(stdout) = child.stdout.take() {
            op.capture(stdout).wait();
        }
        let status = child.wait().map_err(|err| {
            HeraldError::new("the linker step got lost").with_cause(err)
        })?;
        if !status.success() {
            return Err(HeraldError::new("the linker step failed")
                .with_details(format!("exit status: {status}")));
        }

        drop(op);
        emitter.message("Build finished").expect("emitter is live");
        Ok(())
    }
}

/// Always fails; exists to show the error reporting path end to end.
pub struct Fail;

impl Command for Fail {
    fn name(&self) -> &'static str {
        "fail"
    }

    fn help(&self) -> &'static str {
        "fail mid-operation, on purpose"
    }

    fn run(&self, emitter: &Emitter, _matches: &ArgMatches) -> Result<(), HeraldError> {
        let op = emitter.begin("Writing output").expect("emitter is idle");
        op.progress("allocating blocks", false)
            .expect("operation is open");
        Err(HeraldError::new("disk full")
            .with_details("simulated failure while writing the output image")
            .with_resolution("free space and retry")
            .with_cause(std::io::Error::other("no space left on device")))
    }
}
