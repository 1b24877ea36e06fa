use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use sftester_machines::pattern::TestPattern;
use sftester_machines::registry;

mod config;
mod runner;
mod terminal;

use config::FrontendConfig;
use terminal::TerminalSink;

/// Pmod SF3 serial flash tester, run headless on a simulated board.
#[derive(Parser, Debug)]
#[command(name = "sftester", version)]
struct Cli {
    /// Board variant to run (see --list).
    #[arg(required_unless_present = "list")]
    machine: Option<String>,

    /// Test pattern for one run; repeat for consecutive partitions.
    #[arg(long = "pattern", short = 'p', value_enum)]
    patterns: Vec<PatternArg>,

    /// Configuration file (default: <config dir>/sftester/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the reduced 128 KiB geometry.
    #[arg(long)]
    small: bool,

    /// Give up on a run after this many display frames.
    #[arg(long, default_value_t = 10_000_000)]
    max_frames: u64,

    #[arg(long, default_value = "warn")]
    log_level: log::LevelFilter,

    /// List the available board variants and exit.
    #[arg(long)]
    list: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PatternArg {
    A,
    B,
    C,
    D,
}

impl From<PatternArg> for TestPattern {
    fn from(arg: PatternArg) -> Self {
        match arg {
            PatternArg::A => TestPattern::A,
            PatternArg::B => TestPattern::B,
            PatternArg::C => TestPattern::C,
            PatternArg::D => TestPattern::D,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    simple_logger::SimpleLogger::new()
        .with_level(cli.log_level)
        .init()
        .context("failed to install logger")?;

    if cli.list {
        for entry in registry::all() {
            println!("{:10} {}", entry.name, entry.description);
        }
        return Ok(());
    }

    let Some(machine_name) = cli.machine.as_deref() else {
        bail!("no machine given");
    };
    let Some(entry) = registry::find(machine_name) else {
        let names: Vec<_> = registry::all().iter().map(|e| e.name).collect();
        bail!(
            "unknown machine {machine_name:?}, available: {}",
            names.join(", ")
        );
    };

    let board = FrontendConfig::discover(cli.config.as_deref())
        .and_then(|c| c.board_config(cli.small))
        .context("loading configuration")?;
    log::info!(
        "{}: {} bytes, {} ticks per frame",
        entry.name,
        board.geometry.total_bytes(),
        board.frame_ticks
    );

    let patterns: Vec<TestPattern> = if cli.patterns.is_empty() {
        vec![TestPattern::A]
    } else {
        cli.patterns.iter().copied().map(TestPattern::from).collect()
    };

    let mut machine = (entry.create)(&board);
    let mut sink = TerminalSink::new(std::io::stdout().lock());
    let status = runner::run_patterns(machine.as_mut(), &patterns, &mut sink, cli.max_frames)
        .with_context(|| format!("running {}", entry.name))?;
    drop(sink);

    println!(
        "partitions run: {}  errors: {}  pass: {}  done: {}  ticks: {}",
        status.partitions_run,
        status.error_count,
        status.test_pass,
        status.test_done,
        machine.clock()
    );
    Ok(())
}
