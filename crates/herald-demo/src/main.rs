//! herald-demo - a small multi-command tool built on the herald framework.

use anyhow::Result;
use herald::{CommandGroup, Dispatcher};

mod commands;

fn main() -> Result<()> {
    let dispatcher = Dispatcher::new(
        "herald-demo",
        concat!("herald-demo ", env!("CARGO_PKG_VERSION")),
    )
    .with_tracing_bridge()
    .group(CommandGroup::new("basic").with(commands::Greet))
    .group(
        CommandGroup::new("build")
            .with(commands::Run)
            .with(commands::Fail),
    );

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let code = dispatcher.dispatch(&argv)?;
    std::process::exit(code);
}
