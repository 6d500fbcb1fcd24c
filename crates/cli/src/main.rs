//! Entry point for `routectl`.

use clap::Parser;
use cli::CliConfig;

fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();
    config.run()
}
