mod cli;
mod paths;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Check(args) => run::check(args),
        Command::Params(args) => run::params(args),
        Command::Render(args) => run::render(args, cli.config.as_deref()),
    }
}
