// Entrypoint for the `tfd` command.
// - Keeps `main` small: parse flags, set up logging, hand off to `cli::run`.
// - Logs go to stderr so command output on stdout stays pipeable.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tfd_utils::cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let fallback = if cli.verbose {
        "tfd_utils=debug,tfd=debug"
    } else {
        "tfd_utils=info,tfd=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(cli)
}
