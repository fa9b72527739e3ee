//! Command-line interface entry point for `reachnarrow`.

use anyhow::Result;

use reachnarrow::commands;

fn main() -> Result<()> {
    let code = commands::run_with_args(std::env::args().skip(1).collect())?;
    std::process::exit(code);
}
