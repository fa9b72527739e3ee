//! Command-line interface definition.

use clap::Parser;
use std::path::PathBuf;

/// Help text for configuration file options, shown at the bottom of --help.
const CONFIG_HELP: &str = "\
CONFIGURATION FILE (.reachnarrow.toml):
  Create this file next to your entry file to set defaults.

  [reachnarrow]
  module_backtracking = 2    # Directory levels to climb for module lookup
  print_cfg = false          # Print the call graph after analysis
  max_print_depth = 6        # Depth limit for the printed graph
  print_all_paths = false    # Print every call chain to a target
";

/// Command line interface configuration using `clap`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, after_help = CONFIG_HELP)]
pub struct Cli {
    /// Entry source file the analysis starts from.
    pub entry_file: PathBuf,

    /// Function or class name whose reachability is probed (repeatable).
    #[arg(long = "target")]
    pub targets: Vec<String>,

    /// Vulnerability identifier whose patched functions become the targets.
    #[arg(long)]
    pub osv_id: Option<String>,

    /// Print the resolved call graph to stdout (defaults to false).
    #[arg(long, value_name = "BOOL", action = clap::ArgAction::Set)]
    pub print_cfg: Option<bool>,

    /// Depth limit when printing the graph.
    #[arg(long)]
    pub max_print_depth: Option<usize>,

    /// Print every call chain from the entry to a target (defaults to false).
    #[arg(long, value_name = "BOOL", action = clap::ArgAction::Set)]
    pub print_all_paths: Option<bool>,

    /// Directory levels above the entry the module search may climb.
    #[arg(long)]
    pub module_backtracking: Option<usize>,

    /// SBOM to narrow using per-vulnerability reachability.
    #[arg(long)]
    pub input_file: Option<PathBuf>,

    /// Quiet mode: suppress progress and summaries.
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable verbose output for debugging.
    #[arg(short, long)]
    pub verbose: bool,
}
