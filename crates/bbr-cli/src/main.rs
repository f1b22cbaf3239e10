mod export;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bbr_core::{format_day, BacktestConfig, OptimizerConfig, PriceSeries, Signal, StrategyParams};
use bbr_engine::{
    best_by_sharpe, BacktestEngine, ComparisonRow, ComparisonRunner, Metrics, OptimizationResult,
    Optimizer,
};
use bbr_strategy::BandReversion;

#[derive(Parser, Debug)]
#[command(name = "bbr-backtest", about = "Bollinger band mean-reversion backtester")]
struct Cli {
    /// TOML config file(s), comma-separated for merge
    #[arg(long, global = true)]
    config: Option<String>,

    /// Ticker used to name exported files
    #[arg(long, global = true, default_value = "ASSET")]
    ticker: String,

    /// Directory for CSV exports
    #[arg(long, global = true, default_value = ".")]
    out_dir: PathBuf,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Backtest one parameter set and export the trade log
    Backtest(BacktestArgs),
    /// Grid-search window and band width for the best Sharpe ratio
    Optimize(OptimizeArgs),
    /// Backtest the configured comparison set side by side
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
struct PriceArgs {
    /// CSV file of daily prices (date column first, plus a close column)
    #[arg(long)]
    prices: PathBuf,

    /// First trading day to include (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last trading day to include (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct BacktestArgs {
    #[command(flatten)]
    prices: PriceArgs,

    #[arg(long)]
    window: Option<usize>,

    #[arg(long)]
    num_std: Option<f64>,

    #[arg(long)]
    initial_capital: Option<f64>,

    /// Optimize parameters first and backtest the winner
    #[arg(long)]
    optimize: bool,

    /// JSON report path (stdout if not specified)
    #[arg(long)]
    output_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct OptimizeArgs {
    #[command(flatten)]
    prices: PriceArgs,

    #[arg(long)]
    window_min: Option<usize>,

    #[arg(long)]
    window_max: Option<usize>,

    #[arg(long)]
    std_min: Option<f64>,

    #[arg(long)]
    std_max: Option<f64>,

    #[arg(long)]
    step: Option<f64>,

    /// Evaluate the grid on one thread
    #[arg(long)]
    sequential: bool,
}

#[derive(Args, Debug)]
struct CompareArgs {
    #[command(flatten)]
    prices: PriceArgs,

    #[arg(long)]
    initial_capital: Option<f64>,
}

#[derive(Debug, Serialize)]
struct BacktestReport {
    meta: ReportMeta,
    params: StrategyParams,
    initial_capital: f64,
    final_capital: f64,
    trades: usize,
    metrics: Metrics,
    optimization: Option<OptimizationResult>,
    signal_events: Vec<EventRow>,
}

#[derive(Debug, Serialize)]
struct ReportMeta {
    ticker: String,
    price_file: String,
    first_date: Option<String>,
    last_date: Option<String>,
    total_bars: usize,
    elapsed_ms: u128,
}

#[derive(Debug, Serialize)]
struct EventRow {
    date: String,
    price: f64,
    signal: Signal,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug);

    let config = load_config(cli.config.as_deref())?;
    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating output directory {}", cli.out_dir.display()))?;

    match &cli.command {
        Command::Backtest(args) => run_backtest(&cli, &config, args),
        Command::Optimize(args) => run_optimize(&config, args),
        Command::Compare(args) => run_compare(&cli, &config, args),
    }
}

fn default_filter(verbose: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    }
}

fn init_logging(verbose: bool, debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, debug)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(list: Option<&str>) -> Result<BacktestConfig> {
    let Some(list) = list else {
        return Ok(BacktestConfig::default());
    };
    let paths: Vec<PathBuf> = list.split(',').map(|p| PathBuf::from(p.trim())).collect();
    let refs: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
    BacktestConfig::from_toml_files(&refs).with_context(|| format!("loading config {list}"))
}

fn load_prices(args: &PriceArgs) -> Result<PriceSeries> {
    let load_start = Instant::now();
    let prices = PriceSeries::from_csv(&args.prices)
        .with_context(|| format!("loading prices from {}", args.prices.display()))?;
    let prices = prices.between(args.start, args.end);
    info!(
        bars = prices.len(),
        elapsed_ms = load_start.elapsed().as_millis() as u64,
        "prices loaded"
    );
    Ok(prices)
}

fn run_backtest(cli: &Cli, config: &BacktestConfig, args: &BacktestArgs) -> Result<()> {
    let start = Instant::now();
    let prices = load_prices(&args.prices)?;

    let mut section = config.backtest.clone();
    if let Some(capital) = args.initial_capital {
        section.initial_capital = capital;
    }
    let engine = BacktestEngine::from_config(&section);

    let optimization = if args.optimize {
        config
            .optimizer
            .validate()
            .context("invalid optimizer settings")?;
        let result = Optimizer::new(config.optimizer.clone(), engine)
            .optimize(&prices)
            .context("optimizing parameters")?;
        print_optimization(&result);
        Some(result)
    } else {
        None
    };
    let params = match &optimization {
        Some(result) => result.params(),
        None => StrategyParams::new(
            args.window.unwrap_or(config.strategy.window),
            args.num_std.unwrap_or(config.strategy.num_std),
        )
        .context("invalid strategy parameters")?,
    };

    let result = engine
        .run(&prices, &BandReversion::new(params))
        .context("running backtest")?;

    eprintln!("\n{}", "=".repeat(60));
    eprintln!("Backtest: {} ({})", cli.ticker, params);
    eprintln!("{}", "=".repeat(60));
    eprintln!(
        "Bars: {} | Trades: {} | Final capital: {:.2}",
        result.records.len(),
        result.trade_count(),
        result.final_capital()
    );
    eprintln!("{}", "-".repeat(60));
    eprintln!("{}", result.metrics);
    eprintln!("{}", "=".repeat(60));

    let csv_path = cli
        .out_dir
        .join(format!("{}_backtest_results.csv", cli.ticker));
    export::write_trade_log(&csv_path, &result.records)?;
    eprintln!("Trade log written to {}", csv_path.display());

    let report = BacktestReport {
        meta: ReportMeta {
            ticker: cli.ticker.clone(),
            price_file: args.prices.prices.display().to_string(),
            first_date: prices.timestamps.first().map(|&ts| format_day(ts)),
            last_date: prices.timestamps.last().map(|&ts| format_day(ts)),
            total_bars: prices.len(),
            elapsed_ms: start.elapsed().as_millis(),
        },
        params,
        initial_capital: section.initial_capital,
        final_capital: result.final_capital(),
        trades: result.trade_count(),
        metrics: result.metrics,
        optimization,
        signal_events: result
            .signal_events
            .iter()
            .map(|bar| EventRow {
                date: format_day(bar.timestamp),
                price: bar.close,
                signal: bar.signal,
            })
            .collect(),
    };
    let json = serde_json::to_string_pretty(&report).context("serializing report")?;
    match &args.output_file {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("writing report to {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn optimizer_config(base: &OptimizerConfig, args: &OptimizeArgs) -> OptimizerConfig {
    OptimizerConfig {
        window_min: args.window_min.unwrap_or(base.window_min),
        window_max: args.window_max.unwrap_or(base.window_max),
        std_min: args.std_min.unwrap_or(base.std_min),
        std_max: args.std_max.unwrap_or(base.std_max),
        step: args.step.unwrap_or(base.step),
        parallel: base.parallel && !args.sequential,
    }
}

fn run_optimize(config: &BacktestConfig, args: &OptimizeArgs) -> Result<()> {
    let prices = load_prices(&args.prices)?;
    let opt_config = optimizer_config(&config.optimizer, args);
    opt_config
        .validate()
        .context("invalid optimizer settings")?;
    eprintln!(
        "Searching {} parameter combinations over {} bars...",
        opt_config.cell_count(),
        prices.len()
    );

    let run_start = Instant::now();
    let engine = BacktestEngine::from_config(&config.backtest);
    let result = Optimizer::new(opt_config, engine)
        .optimize(&prices)
        .context("optimizing parameters")?;
    eprintln!(
        "Optimization complete in {:.1}ms",
        run_start.elapsed().as_secs_f64() * 1000.0
    );
    print_optimization(&result);

    let json = serde_json::to_string_pretty(&result).context("serializing result")?;
    println!("{json}");
    Ok(())
}

fn print_optimization(result: &OptimizationResult) {
    if result.used_fallback {
        eprintln!(
            "No parameter set produced a usable Sharpe ratio; using defaults ({})",
            result.params()
        );
    } else {
        eprintln!(
            "Optimal parameters: window={}, num_std={:.1}, Sharpe={:.2} ({} evaluated, {} skipped)",
            result.window, result.num_std, result.sharpe, result.evaluated, result.skipped
        );
    }
}

fn run_compare(cli: &Cli, config: &BacktestConfig, args: &CompareArgs) -> Result<()> {
    let prices = load_prices(&args.prices)?;

    let mut section = config.backtest.clone();
    if let Some(capital) = args.initial_capital {
        section.initial_capital = capital;
    }
    let runner = ComparisonRunner::new(BacktestEngine::from_config(&section));
    let rows = runner
        .run_all(&prices, &config.compare)
        .context("running strategy comparison")?;

    print_comparison(&cli.ticker, &rows);

    let table_path = cli
        .out_dir
        .join(format!("{}_strategy_comparison.csv", cli.ticker));
    export::write_comparison(&table_path, &rows)?;
    let curves_path = cli
        .out_dir
        .join(format!("{}_portfolio_values.csv", cli.ticker));
    export::write_portfolio_curves(&curves_path, &rows)?;
    eprintln!(
        "Comparison written to {} and {}",
        table_path.display(),
        curves_path.display()
    );
    Ok(())
}

fn print_comparison(ticker: &str, rows: &[ComparisonRow]) {
    eprintln!("\n{}", "=".repeat(112));
    eprintln!("Strategy comparison: {ticker}");
    eprintln!("{}", "=".repeat(112));
    eprintln!(
        "{:<26} {:>6} {:>7} {:>12} {:>9} {:>9} {:>8} {:>9} {:>8} {:>6} {:>9}",
        "Strategy",
        "Window",
        "NumStd",
        "Final",
        "Return",
        "Annual",
        "Sharpe",
        "MaxDD",
        "WinRate",
        "Trades",
        "Exposure"
    );
    eprintln!("{}", "-".repeat(112));
    for row in rows {
        let m = &row.metrics;
        eprintln!(
            "{:<26} {:>6} {:>7.1} {:>12.2} {:>8.2}% {:>8.2}% {:>8.2} {:>8.2}% {:>7.2}% {:>6} {:>8.2}%",
            row.name,
            row.window,
            row.num_std,
            row.final_capital,
            m.total_return * 100.0,
            m.annualized_return * 100.0,
            m.sharpe_ratio,
            m.max_drawdown * 100.0,
            m.win_rate * 100.0,
            row.trades,
            row.market_exposure * 100.0,
        );
    }
    eprintln!("{}", "-".repeat(112));
    if let Some(best) = best_by_sharpe(rows) {
        eprintln!(
            "Best by Sharpe: {} (Sharpe {:.2})",
            best.name, best.metrics.sharpe_ratio
        );
    }
    eprintln!("{}", "=".repeat(112));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_backtest_command() {
        let cli = Cli::try_parse_from([
            "bbr-backtest",
            "--ticker",
            "SPY",
            "backtest",
            "--prices",
            "spy.csv",
            "--window",
            "15",
            "--num-std",
            "1.5",
            "--start",
            "2023-01-03",
        ])
        .unwrap();
        assert_eq!(cli.ticker, "SPY");
        match cli.command {
            Command::Backtest(args) => {
                assert_eq!(args.window, Some(15));
                assert_eq!(args.num_std, Some(1.5));
                assert_eq!(args.prices.start, NaiveDate::from_ymd_opt(2023, 1, 3));
                assert!(!args.optimize);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "bbr-backtest",
            "compare",
            "--prices",
            "p.csv",
            "--debug",
            "--out-dir",
            "out",
        ])
        .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.out_dir, PathBuf::from("out"));
        assert!(matches!(cli.command, Command::Compare(_)));
    }

    #[test]
    fn test_rejects_bad_date() {
        assert!(Cli::try_parse_from([
            "bbr-backtest",
            "optimize",
            "--prices",
            "p.csv",
            "--end",
            "yesterday",
        ])
        .is_err());
    }

    #[test]
    fn test_default_filter_levels() {
        assert_eq!(default_filter(false, false), "warn");
        assert_eq!(default_filter(true, false), "info");
        assert_eq!(default_filter(true, true), "debug");
    }

    #[test]
    fn test_optimizer_flags_override_config() {
        let cli = Cli::try_parse_from([
            "bbr-backtest",
            "optimize",
            "--prices",
            "p.csv",
            "--window-min",
            "5",
            "--step",
            "0.5",
            "--sequential",
        ])
        .unwrap();
        let Command::Optimize(args) = cli.command else {
            panic!("expected optimize");
        };
        let merged = optimizer_config(&OptimizerConfig::default(), &args);
        assert_eq!(merged.window_min, 5);
        assert_eq!(merged.window_max, 30);
        assert_eq!(merged.step, 0.5);
        assert!(!merged.parallel);
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn test_tiny_step_flag_fails_validation() {
        let cli = Cli::try_parse_from([
            "bbr-backtest",
            "optimize",
            "--prices",
            "p.csv",
            "--step",
            "1e-300",
        ])
        .unwrap();
        let Command::Optimize(args) = cli.command else {
            panic!("expected optimize");
        };
        let merged = optimizer_config(&OptimizerConfig::default(), &args);
        assert!(merged.validate().is_err());
    }

    #[test]
    fn test_load_config_merges_files() {
        let mut base = tempfile::NamedTempFile::new().unwrap();
        writeln!(base, "[strategy]\nwindow = 12\n").unwrap();
        let mut overlay = tempfile::NamedTempFile::new().unwrap();
        writeln!(overlay, "[backtest]\ninitial_capital = 500.0\n").unwrap();

        let list = format!("{},{}", base.path().display(), overlay.path().display());
        let config = load_config(Some(&list)).unwrap();
        assert_eq!(config.strategy.window, 12);
        assert_eq!(config.backtest.initial_capital, 500.0);

        assert_eq!(load_config(None).unwrap().strategy, StrategyParams::default());
    }
}
