/// PGN 棋譜集からオープニングツリーを作り、JSON に書き出す。
///
/// エンジンを指定すると、対局数が `--engine-cut-off` を超える局面を UCI エンジンで
/// 評価し、勝率の代わりにエンジンの推奨手を `best` にする。
///
/// # 使用例
///
/// 勝率ベースのツリー:
/// ```shell
/// cargo run -p otree-tools --release --bin opening_tree -- \
///   --pgn games.pgn.gz --max-depth 8 --node-cut-off 100 tree.json
/// ```
///
/// エンジン評価（中断後は --resume で続きから）:
/// ```shell
/// cargo run -p otree-tools --release --bin opening_tree -- \
///   --pgn games.pgn.gz --engine /usr/local/bin/stockfish --engine-hash-mb 64 \
///   --time-per-node 2000 --concurrency 8 --resume tree.json tree.json
/// ```
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser as _;
use indicatif::{ProgressBar, ProgressStyle};

use otree_core::{
    ConfigError, EngineStats, EvalOptions, EvalProgress, NodeStats, OpeningTree, ProgressCallback,
    ScoreStats, TreeConfig, evaluate, merge_previous,
};
use otree_tools::artifact::{read_artifact, write_artifact};
use otree_tools::common::config::{ConfigOverrides, resolve_config};
use otree_tools::common::io::open_reader;
use otree_tools::pgn::{GameFilter, PgnReader, insert_games};
use otree_tools::uci::{EngineConfig, engine_factory};

/// 設定エラー時の終了コード
const EXIT_CONFIG: u8 = 3;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(clap::Parser, Debug)]
#[command(about = "build an opening tree from PGN games, optionally evaluated by a UCI engine")]
struct Cli {
    /// Output JSON path ("-" for stdout, ".gz" suffix for gzip)
    output: PathBuf,

    /// Input PGN file ("-" for stdin, ".gz" suffix for gzip)
    #[arg(long)]
    pgn: Option<PathBuf>,

    /// TOML config file; command-line options override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,

    /// Evaluate nodes with the engine (implied when an engine is configured)
    #[arg(long)]
    evaluate: bool,

    /// Previous output to reuse evaluations from (implies evaluation)
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Skip games whose TimeControl base time is below this many seconds
    #[arg(long)]
    min_base_time: Option<u64>,

    /// Print the size and time estimate, then exit without evaluating or writing
    #[arg(long)]
    estimate_only: bool,

    /// Hide the progress bar
    #[arg(long)]
    quiet: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if e.downcast_ref::<ConfigError>().is_some() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let pgn = cli.pgn.clone().ok_or(ConfigError::Missing { option: "pgn" })?;
    let cfg = resolve_config(cli.config.as_deref(), &cli.overrides)?;
    let filter = GameFilter {
        min_base_time: cli.min_base_time,
    };

    // エンジンはフラグでも設定ファイルでも指定でき、どちらでも評価モードになる
    if cli.evaluate || cli.resume.is_some() || cfg.engine.is_some() {
        let engine = EngineConfig::from_tree_config(&cfg)?;
        run_evaluation(cli, cfg, &engine, &pgn, &filter)
    } else {
        let mut tree: OpeningTree<ScoreStats> = OpeningTree::new(cfg);
        load_games(&pgn, &filter, &mut tree)?;
        log_estimate(&tree, tree.cut_size());
        if cli.estimate_only {
            return Ok(());
        }
        write_artifact(&tree, &pgn, &cli.output)
    }
}

fn run_evaluation(
    cli: &Cli,
    cfg: TreeConfig,
    engine: &EngineConfig,
    pgn: &Path,
    filter: &GameFilter,
) -> Result<()> {
    let mut tree: OpeningTree<EngineStats> = OpeningTree::new(cfg);
    load_games(pgn, filter, &mut tree)?;

    if let Some(prev) = &cli.resume {
        let prior = read_artifact(prev)?;
        let filled = merge_previous(&mut tree, &prior);
        log::info!("reused {filled} evaluations from {}", prev.display());
    }

    log_estimate(&tree, tree.eval_size());
    if cli.estimate_only {
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    // Ctrl-C ハンドラ
    {
        let shutdown_clone = shutdown.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nShutting down gracefully...");
            shutdown_clone.store(true, Ordering::Relaxed);
        })
        .ok();
    }

    let bar = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(tree.eval_size() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} (eta {eta}) {msg}")?,
        );
        bar
    };
    let on_progress: &mut ProgressCallback<'_> = &mut |p: &EvalProgress<'_>| {
        bar.inc(1);
        match p.result {
            Ok(best) => bar.set_message(format!("{} -> {best}", p.path.join(" "))),
            Err(e) => bar.println(format!("failed at [{}]: {e}", p.path.join(" "))),
        }
    };

    let factory = engine_factory(engine);
    let options = EvalOptions {
        shutdown: Some(shutdown.clone()),
    };
    let report = evaluate(&mut tree, &factory, &options, Some(on_progress));
    bar.finish_and_clear();

    for failure in &report.failures {
        log::warn!("[{}]: {}", failure.path.join(" "), failure.error);
    }
    log::info!(
        "evaluated {}/{} nodes ({} failed, {} skipped)",
        report.evaluated,
        report.scheduled,
        report.failures.len(),
        report.skipped
    );

    // 中断・失敗があっても評価済みの分は書き出し、--resume で再利用できるようにする
    write_artifact(&tree, pgn, &cli.output)?;
    if !report.is_complete() {
        log::warn!(
            "{} nodes left unevaluated; rerun with --resume {}",
            report.scheduled - report.evaluated,
            cli.output.display()
        );
    }
    if report.scheduled > 0 && report.evaluated == 0 && !shutdown.load(Ordering::Relaxed) {
        bail!("no node could be evaluated");
    }
    Ok(())
}

fn load_games<S: NodeStats>(
    pgn: &Path,
    filter: &GameFilter,
    tree: &mut OpeningTree<S>,
) -> Result<()> {
    let reader = open_reader(pgn).with_context(|| format!("failed to open {}", pgn.display()))?;
    let stats = insert_games(PgnReader::new(reader), filter, tree)
        .with_context(|| format!("failed to read {}", pgn.display()))?;
    log::info!(
        "{}: {} games read, {} inserted, {} without moves, {} filtered out, {} invalid",
        pgn.display(),
        stats.read,
        stats.inserted,
        stats.skipped_empty,
        stats.filtered,
        stats.invalid
    );
    Ok(())
}

fn log_estimate<S: NodeStats>(tree: &OpeningTree<S>, pending: usize) {
    log::info!(
        "tree: {} nodes, {} above engine cut-off, {} to evaluate",
        tree.len(),
        tree.cut_size(),
        pending
    );
    let eta = tree.estimate_for(pending);
    let finish = chrono::Duration::from_std(eta)
        .ok()
        .and_then(|d| Local::now().checked_add_signed(d));
    match finish {
        Some(at) => log::info!(
            "estimated evaluation time: {} (done around {})",
            format_duration(eta),
            at.format("%Y-%m-%d %H:%M:%S")
        ),
        None => log::info!("estimated evaluation time: {}", format_duration(eta)),
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}h{:02}m{:02}s", secs / 3600, secs / 60 % 60, secs % 60)
}
