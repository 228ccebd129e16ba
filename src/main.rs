use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use companion_probe::core::config::{load_probe_config, ProbeConfig};
use companion_probe::features::runtime::{ChromiumSourceFactory, ProbeRuntime};
use companion_probe::features::worker_pool::write_failed_slots;
use companion_probe::features::{
    run_pool, BatchDriver, ConversationSource, CsvOutputStore, OutputStore, PoolOptions,
};

const USAGE: &str = "\
usage: companion-probe [run|pool] [options]

  run    collect conversations sequentially in one browser (default)
  pool   one browser per configured identity, single writer

options:
  --target N       conversations to collect (run mode)
  --output PATH    output CSV
  --headless       launch browsers without a window
  --skip-login     do not wait for manual login confirmation
  -h, --help       show this message

configuration: companion-probe.json (or $COMPANION_PROBE_CONFIG), .env";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Run,
    Pool,
}

#[derive(Debug)]
struct CliArgs {
    mode: Mode,
    target: Option<usize>,
    output: Option<String>,
    headless: bool,
    skip_login: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Option<CliArgs>> {
    let mut cli = CliArgs {
        mode: Mode::Run,
        target: None,
        output: None,
        headless: false,
        skip_login: false,
    };
    let mut args = args.into_iter();
    while let Some(a) = args.next() {
        match a.as_str() {
            "run" => cli.mode = Mode::Run,
            "pool" => cli.mode = Mode::Pool,
            "-h" | "--help" => return Ok(None),
            "--headless" => cli.headless = true,
            "--skip-login" => cli.skip_login = true,
            "--target" => {
                let v = args.next().ok_or_else(|| anyhow!("--target needs a value"))?;
                cli.target = Some(v.parse().with_context(|| format!("bad --target {}", v))?);
            }
            "--output" => {
                cli.output = Some(args.next().ok_or_else(|| anyhow!("--output needs a value"))?);
            }
            other => {
                if let Some(v) = other.strip_prefix("--target=") {
                    cli.target = Some(v.parse().with_context(|| format!("bad --target {}", v))?);
                } else if let Some(v) = other.strip_prefix("--output=") {
                    cli.output = Some(v.to_string());
                } else {
                    bail!("unknown argument: {}", other);
                }
            }
        }
    }
    Ok(Some(cli))
}

fn apply_overrides(cfg: &mut ProbeConfig, cli: &CliArgs) {
    if let Some(t) = cli.target {
        cfg.batch.target = Some(t);
    }
    if let Some(o) = &cli.output {
        cfg.batch.output = Some(o.clone());
    }
    if cli.headless {
        cfg.batch.headless = Some(true);
    }
}

/// stderr by default; a timestamped file under `log_dir` when configured.
fn init_tracing(log_dir: Option<&str>) -> Result<Option<PathBuf>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));

    let Some(dir) = log_dir.filter(|d| !d.trim().is_empty()) else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir).with_context(|| format!("creating log dir {}", dir))?;
    let path = Path::new(dir).join(format!(
        "companion_probe_{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file = std::fs::File::create(&path)
        .with_context(|| format!("creating log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(Some(path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let Some(cli) = parse_args(std::env::args().skip(1))? else {
        println!("{}", USAGE);
        return Ok(());
    };

    let mut cfg = load_probe_config();
    apply_overrides(&mut cfg, &cli);

    if let Some(path) = init_tracing(cfg.batch.log_dir.as_deref())? {
        eprintln!("logging to {}", path.display());
    }

    let runtime = ProbeRuntime::from_config(cfg)?;
    info!(
        "Starting companion-probe ({:?}) against {}",
        cli.mode, runtime.profile.name
    );

    match cli.mode {
        Mode::Run => run_sequential(runtime, cli.skip_login).await,
        Mode::Pool => run_parallel(runtime, cli.skip_login).await,
    }
}

async fn run_sequential(runtime: ProbeRuntime, skip_login: bool) -> Result<()> {
    let target = runtime.config.batch.resolve_target();
    let output = runtime.config.batch.resolve_output();

    let mut store = CsvOutputStore::open(&output)?;
    let existing = store.existing_records()?;
    if existing >= target {
        info!("{} already holds {} conversations (target {})", output.display(), existing, target);
        return Ok(());
    }

    let mut source = runtime
        .open_live_source(runtime.config.batch.resolve_profile_dir(), skip_login)
        .await?;

    let mut driver = BatchDriver::new(store).with_progress(true);
    let outcome = tokio::select! {
        r = driver.run(target, &mut source) => r,
        _ = tokio::signal::ctrl_c() => Err(anyhow!("interrupted")),
    };

    if let Err(e) = source.shutdown().await {
        warn!("browser close failed: {}", e);
    }

    match outcome {
        Ok(summary) => {
            info!("{}", serde_json::to_string(&summary)?);
            Ok(())
        }
        Err(e) => {
            error!("run ended: {:#}", e);
            Err(e)
        }
    }
}

async fn run_parallel(runtime: ProbeRuntime, skip_login: bool) -> Result<()> {
    let identities = runtime.config.pool.identities.clone();
    if identities.is_empty() {
        bail!("pool mode needs at least one entry in pool.identities");
    }
    let output = runtime.config.batch.resolve_output();
    let opts = PoolOptions {
        repetitions: runtime.config.pool.resolve_repetitions(),
        queue_capacity: runtime.config.pool.resolve_queue_capacity(),
        queue_timeout: runtime.config.timing.queue_timeout(),
        progress: true,
    };

    let mut store = CsvOutputStore::open(&output)?;
    let factory = Arc::new(ChromiumSourceFactory::new(runtime, skip_login));
    let summary = run_pool(identities, factory, &mut store, opts).await?;

    let report_dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    write_failed_slots(report_dir, &summary.failed_slots)?;
    info!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
