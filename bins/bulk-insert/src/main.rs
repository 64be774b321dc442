//! `bulk-insert` — loads CSV node and relationship files into a graph
//! server in one sequential, single-connection pass.
//!
//! ```bash
//! bulk-insert social \
//!     --nodes-with-label Person people.csv \
//!     --nodes-with-label Country countries.csv \
//!     --relations-with-type KNOWS knows.csv \
//!     --relations-with-type VISITED visited.csv
//! ```

mod cli;
mod session;

use clap::Parser;
use cli::Args;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer())
        .init();

    let report = session::run(&args)?;
    print!("{}", session::format_report(&args.graph_name, &report));

    Ok(())
}
