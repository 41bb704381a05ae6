use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mcsplit::graph::{Graph, GraphFormat};
use mcsplit::search::{solve, SolveConfig};
use mcsplit::verify::check_mapping;

/// Maximum common (connected) subgraph solver.
#[derive(Parser, Debug)]
#[command(name = "mcsplit", version, about)]
struct Cli {
    /// First graph file.
    graph0: String,

    /// Second graph file.
    graph1: String,

    /// Read the inputs as LAD text instead of the binary format.
    #[arg(long)]
    lad: bool,

    /// Require the common subgraph to be connected.
    #[arg(short, long)]
    connected: bool,

    /// Worker threads (default: available CPUs).
    #[arg(short, long)]
    threads: Option<usize>,

    /// Wall-clock limit in milliseconds (0 = none).
    #[arg(long, default_value_t = 0)]
    timeout: u64,

    /// Only report errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Report search progress.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.lad {
        GraphFormat::Lad
    } else {
        GraphFormat::Binary
    };
    let g0 = match Graph::load(&cli.graph0, format) {
        Ok(g) => g,
        Err(e) => {
            error!("cannot load {}: {e}", cli.graph0);
            return ExitCode::FAILURE;
        }
    };
    let g1 = match Graph::load(&cli.graph1, format) {
        Ok(g) => g,
        Err(e) => {
            error!("cannot load {}: {e}", cli.graph1);
            return ExitCode::FAILURE;
        }
    };

    // Sort each side by descending degree unless the other graph is dense,
    // in which case ascending order pairs better with the size heuristic.
    // Reported vertex ids refer to the sorted instances.
    let g0 = g0.sorted_by_degree(g1.is_dense());
    let g1 = g1.sorted_by_degree(g0.is_dense());

    let mut cfg = SolveConfig {
        connected: cli.connected,
        timeout: (cli.timeout > 0).then(|| Duration::from_millis(cli.timeout)),
        ..SolveConfig::default()
    };
    if let Some(threads) = cli.threads {
        cfg.threads = threads.max(1);
    }

    info!(
        n0 = g0.n(),
        n1 = g1.n(),
        threads = cfg.threads,
        connected = cfg.connected,
        "starting search"
    );
    let start = std::time::Instant::now();
    let result = solve(&g0, &g1, &cfg);
    let elapsed = start.elapsed();

    if result.timed_out {
        println!("TIMEOUT");
    }
    println!("Solution size {}", result.pairs.len());
    for &(v, w) in &result.pairs {
        print!("|{v} {w}| ");
    }
    println!();
    println!("Time: {:.3}s", elapsed.as_secs_f64());

    if let Err(e) = check_mapping(&g0, &g1, &result.pairs) {
        error!("solution failed verification: {e}");
        return ExitCode::FAILURE;
    }
    info!(size = result.pairs.len(), "solution verified");
    ExitCode::SUCCESS
}
