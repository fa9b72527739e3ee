//! Command execution: target loading, analysis, narrowing, exit codes.
//!
//! Exit codes: `0` when a target was detected (or an SBOM was narrowed
//! successfully), `1` when no targets were given or none was detected, `2`
//! on malformed input.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::builder::CallGraphBuilder;
use crate::cli::Cli;
use crate::config::Config;
use crate::deps::PydepsProvider;
use crate::error::Error;
use crate::narrower::{GraphReachability, Narrower};
use crate::output;
use crate::targets::{CurlFetcher, OsvMiner, TargetMiner};

/// Default for `--module-backtracking`.
pub const DEFAULT_MODULE_BACKTRACK: usize = 2;

/// Effective options after merging CLI flags over the config file.
struct RunOptions {
    backtrack: usize,
    print_cfg: bool,
    max_print_depth: Option<usize>,
    print_all_paths: bool,
}

impl RunOptions {
    fn merge(cli: &Cli, config: &Config) -> Self {
        let file = &config.reachnarrow;
        Self {
            backtrack: cli
                .module_backtracking
                .or(file.module_backtracking)
                .unwrap_or(DEFAULT_MODULE_BACKTRACK),
            print_cfg: cli.print_cfg.or(file.print_cfg).unwrap_or(false),
            max_print_depth: cli.max_print_depth.or(file.max_print_depth),
            print_all_paths: cli
                .print_all_paths
                .or(file.print_all_paths)
                .unwrap_or(false),
        }
    }
}

/// Parses `args` (without the program name) and runs the selected command,
/// returning the process exit code.
pub fn run_with_args(args: Vec<String>) -> Result<i32> {
    let argv = std::iter::once("reachnarrow".to_owned()).chain(args);
    let cli = match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 2 } else { 0 };
            err.print()?;
            return Ok(code);
        }
    };
    let mut stdout = std::io::stdout();
    run(cli, &mut stdout)
}

/// Runs a parsed CLI invocation against `out`.
pub fn run(cli: Cli, out: &mut impl Write) -> Result<i32> {
    let config = Config::load_from_path(&cli.entry_file);
    let opts = RunOptions::merge(&cli, &config);

    if let Some(input) = cli.input_file.clone() {
        return run_narrow(&cli, &input, &opts, out);
    }
    run_analyze(&cli, &opts, out)
}

fn run_analyze(cli: &Cli, opts: &RunOptions, out: &mut impl Write) -> Result<i32> {
    let targets = match load_targets(cli) {
        Ok(targets) => targets,
        Err(err @ Error::TargetListEmpty) => {
            output::print_error(&err);
            return Ok(1);
        }
        Err(err) => {
            output::print_error(&err);
            return Ok(2);
        }
    };
    if cli.verbose {
        eprintln!("probing {} target(s): {}", targets.len(), targets.join(", "));
    }

    let mut builder = match CallGraphBuilder::new(
        targets.iter().cloned(),
        Box::new(PydepsProvider),
        opts.backtrack,
    ) {
        Ok(builder) => builder,
        Err(err) => {
            output::print_error(&err);
            return Ok(2);
        }
    };

    let spinner =
        (!cli.quiet).then(|| output::create_spinner("reachnarrow resolving call graph…"));
    let built = builder.build_from_entry(&cli.entry_file);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    if let Err(err) = built {
        output::print_error(&err);
        return Ok(2);
    }

    if opts.print_cfg {
        output::print_graph(out, &builder.graph().expanded(opts.max_print_depth))?;
    }
    if opts.print_all_paths {
        for target in &targets {
            output::print_paths(out, &builder.graph().paths_to(target))?;
        }
    }
    if !cli.quiet {
        output::print_detection(out, builder.detected(), &targets)?;
    }
    if cli.verbose {
        eprintln!(
            "parsed {} file(s); graph holds {} node(s), {} edge(s)",
            builder.parsed_files(),
            builder.graph().node_count(),
            builder.graph().edge_count()
        );
    }
    Ok(if builder.detected() { 0 } else { 1 })
}

fn run_narrow(cli: &Cli, input: &Path, opts: &RunOptions, out: &mut impl Write) -> Result<i32> {
    let contents = match std::fs::read_to_string(input) {
        Ok(contents) => contents,
        Err(err) => {
            output::print_error(&Error::Io(err));
            return Ok(2);
        }
    };

    let miner = OsvMiner::new(CurlFetcher);
    let reach = GraphReachability {
        entry: cli.entry_file.clone(),
        module_backtrack: opts.backtrack,
    };
    let narrower = Narrower::new(&miner, &reach);

    let spinner = (!cli.quiet).then(|| output::create_spinner("reachnarrow narrowing SBOM…"));
    let narrowed = narrower.narrow(&contents);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match narrowed {
        Ok(value) => {
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
            if !cli.quiet {
                eprintln!("{}", output::narrow_summary_table(&value));
            }
            Ok(0)
        }
        Err(err) => {
            output::print_error(&err);
            Ok(2)
        }
    }
}

/// Targets come from `--target` flags, or failing that from mining the
/// `--osv-id` advisory.
fn load_targets(cli: &Cli) -> Result<Vec<String>, Error> {
    let mut targets = cli.targets.clone();
    if targets.is_empty() {
        if let Some(osv_id) = &cli.osv_id {
            let miner = OsvMiner::new(CurlFetcher);
            targets = miner.find_targets(osv_id)?;
        }
    }
    if targets.is_empty() {
        return Err(Error::TargetListEmpty);
    }
    Ok(targets)
}
