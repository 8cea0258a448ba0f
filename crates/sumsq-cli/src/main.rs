//! sumsq: find every `(x1, y1)` with `x1² + y1² = x² + y²` on all devices
//!
//! Exit codes: 0 on success or when no device is available, 1 on device or
//! build failure, 2 on configuration or input errors.

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::process;
use sumsq_backends::{list_devices, BackendType, DeviceOptions, KernelProgram, DEFAULT_CPU_DEVICES};
use sumsq_core::{run_search, BuildReport, SearchConfig, SearchError, WaitMode};
use sumsq_tracing::{init_global_tracing, TracingConfig};

mod output;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WaitArg {
    /// Block on completion notifications
    Signal,
    /// Re-check device status every poll interval
    Poll,
}

impl From<WaitArg> for WaitMode {
    fn from(arg: WaitArg) -> Self {
        match arg {
            WaitArg::Signal => WaitMode::Signal,
            WaitArg::Poll => WaitMode::Poll,
        }
    }
}

/// Multi-device sum-of-two-squares lattice search
#[derive(Debug, Parser)]
#[command(name = "sumsq", version, about)]
struct Cli {
    /// JSON configuration file; defaults are used when it does not exist
    #[arg(short, long, default_value = "sumsq.json")]
    config: PathBuf,

    /// Device backend (`cpu` or `opencl`)
    #[arg(short, long, default_value = "cpu")]
    backend: BackendType,

    /// Number of host devices for the cpu backend
    #[arg(short = 'n', long, default_value_t = DEFAULT_CPU_DEVICES)]
    devices: usize,

    /// Work-item threads per cpu device (default: one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Override the configured wait strategy
    #[arg(long, value_enum)]
    wait: Option<WaitArg>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let mut tracing_config = TracingConfig::from_env();
    if cli.verbose == 0 {
        tracing_config.default_directive = "warn".to_string();
    }
    if let Err(err) = init_global_tracing(&tracing_config.with_verbosity(cli.verbose)) {
        eprintln!("warning: tracing disabled: {err}");
    }

    process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let mut config = match SearchConfig::load(&cli.config) {
        Ok(loaded) => {
            tracing::info!(source = ?loaded.source, "configuration resolved");
            loaded.config
        }
        Err(err) => return fail(SearchError::from(err)),
    };
    if let Some(wait) = cli.wait {
        config.scheduler.wait = wait.into();
    }

    println!("{}", output::render_inputs(config.x, config.y));

    let options = DeviceOptions {
        cpu_devices: cli.devices,
        cpu_threads: cli.threads,
        ..DeviceOptions::default()
    };
    let devices = match list_devices(cli.backend, &options) {
        Ok(devices) => devices,
        Err(err) => return fail(SearchError::from(err)),
    };
    let infos: Vec<_> = devices.iter().map(|d| d.info().clone()).collect();
    println!("{}", output::render_devices(&infos));

    println!("Start tasks");
    match run_search(&config, devices, &KernelProgram::default()) {
        Ok(report) => {
            println!("{}", output::render_elapsed(report.elapsed));
            print!("{}", output::render_results(&report));
            0
        }
        Err(err) => fail(err),
    }
}

fn fail(err: SearchError) -> i32 {
    match &err {
        SearchError::NoDevices(reason) => println!("No devices found: {reason}"),
        SearchError::Build(failure) => eprintln!("{}", BuildReport(failure)),
        SearchError::Config(_) => eprintln!("config parse error\n{err}"),
        _ => eprintln!("error: {err}"),
    }
    err.exit_code()
}
