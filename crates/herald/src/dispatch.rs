//! Command dispatch: registry, resolution, and the emitter lifecycle
//! around each command run.
//!
//! The dispatcher is the single catch point for domain and usage failures:
//! handlers raise [`HeraldError`], bad invocations become [`UsageError`]s,
//! and both are routed through [`Emitter::error`] and mapped to exit codes.
//! Emitter misuse ([`EmitterError`]) is a bug in the application and
//! propagates out untouched.

use clap::ArgMatches;
use tracing_subscriber::prelude::*;

use crate::bridge::EmitterLayer;
use crate::emitter::{Emitter, EmitterConfig, EmitterMode};
use crate::errors::{EmitterError, HeraldError, UsageError, UsageHint};

/// The capability set every command handler exposes.
pub trait Command: Send + Sync {
    /// The name used to invoke the command.
    fn name(&self) -> &'static str;

    /// One-line description for the usage listing.
    fn help(&self) -> &'static str;

    /// Declare the command's arguments on the given parser.
    fn fill_args(&self, command: clap::Command) -> clap::Command {
        command
    }

    /// Execute with parsed arguments. Failures are reported through the
    /// emitter by the dispatcher; handlers just return them.
    fn run(&self, emitter: &Emitter, matches: &ArgMatches) -> Result<(), HeraldError>;
}

/// A named namespace of commands. Commands are reachable bare (when the
/// name is unique across groups) or prefixed with the group name.
pub struct CommandGroup {
    name: &'static str,
    commands: Vec<Box<dyn Command>>,
}

impl CommandGroup {
    /// Empty group.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            commands: Vec::new(),
        }
    }

    /// Register a command in this group.
    pub fn with(mut self, command: impl Command + 'static) -> Self {
        self.commands.push(Box::new(command));
        self
    }
}

impl std::fmt::Debug for CommandGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.commands.iter().map(|c| c.name()).collect();
        f.debug_struct("CommandGroup")
            .field("name", &self.name)
            .field("commands", &names)
            .finish()
    }
}

/// Resolves `argv` to a handler and runs it inside a managed emitter
/// lifecycle. Built once at startup from a static set of groups.
#[derive(Debug)]
pub struct Dispatcher {
    app_name: &'static str,
    greeting: String,
    groups: Vec<CommandGroup>,
    default_mode: EmitterMode,
    bridge_tracing: bool,
}

impl Dispatcher {
    /// New dispatcher; the greeting opens every run's log.
    pub fn new(app_name: &'static str, greeting: impl Into<String>) -> Self {
        Self {
            app_name,
            greeting: greeting.into(),
            groups: Vec::new(),
            default_mode: EmitterMode::Brief,
            bridge_tracing: false,
        }
    }

    /// Register a command group.
    pub fn group(mut self, group: CommandGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Verbosity used when no flag is given (brief by default).
    pub fn default_mode(mut self, mode: EmitterMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Route `tracing` events through the emitter for this process.
    pub fn with_tracing_bridge(mut self) -> Self {
        self.bridge_tracing = true;
        self
    }

    /// Dispatch `argv` (without the program name). Returns the process
    /// exit code: 0 on success, 2 for usage errors, the failure's retcode
    /// (default 1) for domain errors.
    pub fn dispatch(&self, argv: &[String]) -> Result<i32, EmitterError> {
        let config = EmitterConfig::new(self.default_mode, self.app_name, self.greeting.clone());
        self.dispatch_inner(argv, config, true)
    }

    /// Same as [`Dispatcher::dispatch`] with an explicit emitter config
    /// (log location, capability overrides, output sinks). The parsed
    /// verbosity flags still override the config's mode.
    pub fn dispatch_with_config(
        &self,
        argv: &[String],
        config: EmitterConfig,
    ) -> Result<i32, EmitterError> {
        self.dispatch_inner(argv, config, true)
    }

    pub(crate) fn dispatch_inner(
        &self,
        argv: &[String],
        mut config: EmitterConfig,
        guarded: bool,
    ) -> Result<i32, EmitterError> {
        // Global flags come first so the emitter starts in the right mode
        // even when the rest of the invocation is unusable.
        let pre_parsed = self.pre_parse(argv);
        if let Ok((Some(mode), _)) = &pre_parsed {
            config = config.mode(*mode);
        }

        let emitter = if guarded {
            Emitter::init(config)?
        } else {
            Emitter::init_unguarded(config)?
        };
        if self.bridge_tracing {
            let registry = tracing_subscriber::registry().with(EmitterLayer::new(&emitter));
            let _ = tracing::subscriber::set_global_default(registry);
        }

        let rest = match pre_parsed {
            Ok((_, consumed)) => &argv[consumed..],
            Err(usage) => return self.fail_usage(&emitter, usage),
        };

        if rest.is_empty() || rest[0] == "help" {
            emitter.message(&self.usage_text())?;
            emitter.ended_ok()?;
            return Ok(0);
        }

        let (command, consumed) = match self.resolve(rest) {
            Ok(found) => found,
            Err(usage) => return self.fail_usage(&emitter, usage),
        };

        let parser = command.fill_args(
            clap::Command::new(command.name())
                .about(command.help())
                .no_binary_name(true),
        );
        let matches = match parser.try_get_matches_from(rest[consumed..].iter().cloned()) {
            Ok(matches) => matches,
            Err(err)
                if matches!(
                    err.kind(),
                    clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
                ) =>
            {
                emitter.message(&err.to_string())?;
                emitter.ended_ok()?;
                return Ok(0);
            }
            Err(err) => {
                return self.fail_usage(&emitter, UsageError::new(err.to_string().trim_end()))
            }
        };

        match command.run(&emitter, &matches) {
            Ok(()) => {
                emitter.ended_ok()?;
                Ok(0)
            }
            Err(failure) => {
                let retcode = failure.retcode;
                emitter.error(&failure)?;
                Ok(retcode)
            }
        }
    }

    /// Pre-parse leading global flags. Returns the selected mode (if any)
    /// and how many arguments were consumed.
    fn pre_parse(&self, argv: &[String]) -> Result<(Option<EmitterMode>, usize), UsageError> {
        let mut mode = None;
        let mut i = 0;
        while i < argv.len() {
            let arg = argv[i].as_str();
            if arg == "-q" || arg == "--quiet" {
                mode = Some(EmitterMode::Quiet);
            } else if arg == "-v" || arg == "--verbose" {
                mode = Some(EmitterMode::Verbose);
            } else if arg == "--verbosity" {
                i += 1;
                let value = argv.get(i).ok_or_else(|| {
                    UsageError::new("'--verbosity' needs a value: quiet, brief, verbose, debug or trace")
                })?;
                mode = Some(parse_mode(value)?);
            } else if let Some(value) = arg.strip_prefix("--verbosity=") {
                mode = Some(parse_mode(value)?);
            } else if arg.starts_with('-') {
                return Err(UsageError::new(format!("unknown global option '{arg}'")));
            } else {
                break;
            }
            i += 1;
        }
        Ok((mode, i))
    }

    /// Find the handler for the leading tokens: `<group> <command>` or a
    /// bare `<command>` that is unique across groups.
    fn resolve<'a>(&'a self, rest: &[String]) -> Result<(&'a dyn Command, usize), UsageError> {
        let first = rest[0].as_str();

        if let Some(group) = self.groups.iter().find(|g| g.name == first) {
            let Some(sub) = rest.get(1) else {
                let names: Vec<&str> = group.commands.iter().map(|c| c.name()).collect();
                return Err(UsageError::new(format!(
                    "the '{first}' group needs a command: {}",
                    names.join(", ")
                )));
            };
            let command = group
                .commands
                .iter()
                .find(|c| c.name() == sub.as_str())
                .ok_or_else(|| UsageError::new(format!("no such command '{first} {sub}'")))?;
            return Ok((command.as_ref(), 2));
        }

        let mut found: Vec<(&str, &dyn Command)> = Vec::new();
        for group in &self.groups {
            for command in &group.commands {
                if command.name() == first {
                    found.push((group.name, command.as_ref()));
                }
            }
        }
        match found.len() {
            0 => Err(UsageError::new(format!("no such command '{first}'"))),
            1 => Ok((found[0].1, 1)),
            _ => {
                let forms: Vec<String> = found
                    .iter()
                    .map(|(group, _)| format!("'{group} {first}'"))
                    .collect();
                Err(UsageError::new(format!(
                    "'{first}' is ambiguous; use one of {}",
                    forms.join(" or ")
                )))
            }
        }
    }

    fn fail_usage(&self, emitter: &Emitter, usage: UsageError) -> Result<i32, EmitterError> {
        let failure = HeraldError::from(usage).with_resolution(UsageHint(self.app_name).to_string());
        let retcode = failure.retcode;
        emitter.error(&failure)?;
        Ok(retcode)
    }

    /// The usage listing shown by `help` and on empty invocations.
    fn usage_text(&self) -> String {
        let mut text = format!(
            "Usage: {} [--verbosity=<mode>] [group] <command> [args...]\n\nCommands:",
            self.app_name
        );
        for group in &self.groups {
            for command in &group.commands {
                text.push_str(&format!(
                    "\n  {:<24} {}",
                    format!("{} {}", group.name, command.name()),
                    command.help()
                ));
            }
        }
        text
    }
}

fn parse_mode(value: &str) -> Result<EmitterMode, UsageError> {
    EmitterMode::parse(value).ok_or_else(|| {
        UsageError::new(format!(
            "'{value}' is not a verbosity: quiet, brief, verbose, debug or trace"
        ))
    })
}
