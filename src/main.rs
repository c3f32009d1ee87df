//! gptoss-bench CLI
//!
//! Usage:
//!   gptoss-bench acc                                   # Accuracy test only
//!   gptoss-bench perf                                  # Accuracy + performance test
//!   gptoss-bench submit <team>                         # All tests + leaderboard submission
//!   gptoss-bench perf -isl 1024 -osl 1024              # Sweep all concurrency levels
//!   gptoss-bench submit <team> -isl 1024 -osl 8192     # Sweep + submit every level

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;

use gptoss_bench::health::ThreadPause;
use gptoss_bench::http::ReqwestTransport;
use gptoss_bench::logging::{self, LogFormat};
use gptoss_bench::process::ProcessRunner;
use gptoss_bench::sweep::{InProcessRun, IsolatedRun, SubprocessRun};
use gptoss_bench::{BaselineTable, BenchConfig, BenchError, Mode, Pipeline, Services, SweepCoordinator};

/// Benchmark coordinator for a local vLLM server.
///
/// Configuration comes from the environment (MODEL, PORT, TP, CONC, ISL, OSL, ...).
#[derive(Parser)]
#[command(name = "gptoss-bench")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Input sequence length; together with --osl runs a concurrency sweep
    #[arg(long, global = true, value_name = "TOKENS")]
    isl: Option<u32>,

    /// Output sequence length; together with --isl runs a concurrency sweep
    #[arg(long, global = true, value_name = "TOKENS")]
    osl: Option<u32>,

    /// Run sweep levels inside this process instead of one subprocess per level
    #[arg(long, global = true)]
    in_process: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Health check + GPQA accuracy gate
    Acc,
    /// Accuracy gate + load test + normalized result file
    Perf,
    /// Everything in `perf`, then submit to the leaderboard
    Submit {
        /// Team name (falls back to TEAM_NAME_ENV)
        #[arg(value_name = "TEAM")]
        team: Option<String>,
    },
}

/// Accept the single-dash `-isl`/`-osl` spellings.
fn normalized_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| match arg.as_str() {
            "-isl" => "--isl".to_string(),
            "-osl" => "--osl".to_string(),
            _ => arg,
        })
        .collect()
}

fn resolve_mode(command: Commands, config: &BenchConfig) -> Result<Mode, BenchError> {
    Ok(match command {
        Commands::Acc => Mode::Accuracy,
        Commands::Perf => Mode::Performance,
        Commands::Submit { team } => {
            let team = team
                .or_else(|| config.tools.team_name.clone())
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| {
                    BenchError::Config("submit needs a team name (argument or TEAM_NAME_ENV)".into())
                })?;
            Mode::Submit { team }
        }
    })
}

/// `Some((isl, osl))` for a sweep, `None` for a single run.
fn sweep_shape(isl: Option<u32>, osl: Option<u32>) -> Result<Option<(u32, u32)>> {
    match (isl, osl) {
        (Some(isl), Some(osl)) => Ok(Some((isl, osl))),
        (None, None) => Ok(None),
        _ => bail!("-isl and -osl must be given together"),
    }
}

fn run(cli: Cli) -> Result<bool> {
    let shape = sweep_shape(cli.isl, cli.osl)?;
    let config = BenchConfig::from_env().context("loading configuration")?;
    let mode = resolve_mode(cli.command, &config)?;
    let baselines = BaselineTable::load(config.tools.baseline_file.as_deref())
        .context("loading baseline table")?;

    let http = ReqwestTransport::new(std::time::Duration::from_secs(config.tools.http_timeout_secs))
        .map_err(BenchError::Config)?;
    let commands = ProcessRunner;
    let pause = ThreadPause;
    let services = Services {
        http: &http,
        commands: &commands,
        pause: &pause,
    };

    match shape {
        Some((isl, osl)) => {
            let in_process;
            let subprocess;
            let runner: &dyn IsolatedRun = if cli.in_process {
                in_process = InProcessRun::new(&baselines, services);
                &in_process
            } else {
                let exe = std::env::current_exe().context("locating own executable")?;
                subprocess = SubprocessRun::new(exe, &commands);
                &subprocess
            };
            let summary = SweepCoordinator::new(&config, runner, &pause).run_sweep(isl, osl, &mode);
            println!("{}", summary.render());
            Ok(summary.all_passed())
        }
        None => {
            let report = Pipeline::new(&config, &baselines, services).run(&mode)?;
            println!("{}", report.render());
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalized_args(std::env::args()));
    logging::init(if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
