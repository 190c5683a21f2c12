use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{error::ErrorKind, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::browser::{Browser, BrowserError, BrowserOptions, ChromeSession};
use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::detector::DEFAULT_INFECTION_MARKER;
use crate::output::{self, OutputFormat};
use crate::runner::{Options, PayloadSource, Runner, ScanResult, TargetSource};
use crate::transform::MAX_ENCODE_DEPTH;

/// How a scan that did not fail ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanExit {
    Completed,
    Interrupted,
}

fn print_banner(no_color: bool) {
    const BANNER: &str = r#"
    __    ___           ____              __
   / /_  / (_)___  ____/ / /_  __  _______/ /____  _____
  / __ \/ / / __ \/ __  / __ \/ / / / ___/ __/ _ \/ ___/
 / /_/ / / / / / / /_/ / /_/ / /_/ (__  ) /_/  __/ /
/_.___/_/_/_/ /_/\__,_/_.___/\__,_/____/\__/\___/_/
"#;
    if no_color {
        print!("{BANNER}");
    } else {
        let _ = write!(&mut rainbowcoat::stdout(), "{BANNER}");
    }
    println!(
        "        v{} - blind XSS injection-point discovery",
        env!("CARGO_PKG_VERSION")
    );
    println!();
}

fn init_tracing(debug: bool, no_color: bool) {
    let level = if debug { "warn,blindbuster=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!no_color)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Clone, Debug)]
struct RunConfig {
    targets: TargetSource,
    payloads_path: String,
    encode: u8,
    require_star: bool,
    marker: String,
    settle: Duration,
    page_timeout: Duration,
    chrome: Option<PathBuf>,
    fixed_fingerprint: bool,
    output: Option<String>,
    output_format: OutputFormat,
    debug: bool,
    no_color: bool,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let payloads_path = args
        .payloads
        .or(cfg.payloads)
        .map(|p| config::user_path(&p))
        .ok_or_else(|| {
            "a payload file is required (--payloads or `payloads` in the config file)".to_string()
        })?;

    let targets = match (args.url, args.file.or(cfg.file)) {
        (Some(url), _) => TargetSource::Url(url),
        (None, Some(file)) => TargetSource::FilePath(config::user_path(&file)),
        (None, None) => TargetSource::Stdin,
    };

    let encode = args.encode.or(cfg.encode).unwrap_or(0);
    if encode > MAX_ENCODE_DEPTH {
        return Err(format!(
            "invalid encode {encode}, expected 0 to {MAX_ENCODE_DEPTH}"
        ));
    }

    let marker = args
        .marker
        .or(cfg.marker)
        .unwrap_or_else(|| DEFAULT_INFECTION_MARKER.to_string())
        .trim()
        .to_string();
    if marker.is_empty() {
        return Err("invalid marker, expected non-empty string".to_string());
    }

    let settle = Duration::from_secs(args.settle.or(cfg.settle).unwrap_or(3));
    let page_timeout = args.page_timeout.or(cfg.page_timeout).unwrap_or(20);
    if page_timeout == 0 {
        return Err("invalid page timeout, expected positive integer".to_string());
    }

    let output = args.output.or(cfg.output).map(|p| config::user_path(&p));
    let output_format = match args.output_format.or(cfg.output_format) {
        Some(raw) => OutputFormat::parse(&raw)
            .ok_or_else(|| format!("invalid output format '{raw}', expected text or json"))?,
        None => output
            .as_deref()
            .and_then(output::infer_format_from_path)
            .unwrap_or_default(),
    };

    Ok(RunConfig {
        targets,
        payloads_path,
        encode,
        require_star: args.require_star || cfg.require_star.unwrap_or(false),
        marker,
        settle,
        page_timeout: Duration::from_secs(page_timeout),
        chrome: args
            .chrome
            .or(cfg.chrome)
            .map(|p| config::expand_tilde(&p)),
        fixed_fingerprint: args.fixed_fingerprint || cfg.fixed_fingerprint.unwrap_or(false),
        output,
        output_format,
        debug: args.debug || cfg.debug.unwrap_or(false),
        no_color: args.no_color || cfg.no_color.unwrap_or(false),
    })
}

fn browser_options(run: &RunConfig) -> BrowserOptions {
    BrowserOptions {
        chrome_path: run.chrome.clone(),
        page_timeout: run.page_timeout,
        // Chrome must outlive the longest quiet stretch of a single probe.
        idle_timeout: run.settle + run.page_timeout + Duration::from_secs(60),
        randomize_fingerprint: !run.fixed_fingerprint,
        ..BrowserOptions::default()
    }
}

fn print_summary(result: &ScanResult) {
    println!();
    println!("{}", "[i] Scan finished!".bold().yellow());
    println!(
        "{}",
        format!("[i] Total URLs Scanned: {}", result.urls_scanned)
            .bold()
            .yellow()
    );
    println!(
        "{}",
        format!("[i] Vulnerable URLs Found: {}", result.findings.len())
            .bold()
            .yellow()
    );
    println!(
        "{}",
        format!("[i] Time Taken: {} seconds.", result.elapsed.as_secs())
            .bold()
            .yellow()
    );
    println!();
    debug!(
        probes = result.stats.probes,
        hits = result.stats.hits,
        errors = result.stats.errors,
        skipped_urls = result.stats.skipped_urls,
        "scan statistics"
    );
}

async fn save_results(run: &RunConfig, result: &ScanResult) {
    let Some(path) = run.output.as_deref() else {
        return;
    };
    println!("{}", format!("[i] Saving results to {path}...").bold().yellow());
    match output::save(&result.findings, PathBuf::from(path).as_path(), run.output_format).await {
        Ok(()) => println!("{}", format!("[i] Results saved to {path}").green()),
        Err(e) => {
            println!("{}", format!("[!] Error saving results to {path}: {e}").red());
            warn!(error = ?e, "failed to save results");
        }
    }
}

/// Races a browser launch against `cancel`. A launch still in flight when
/// cancellation wins is joined and its session shut down, so no browser
/// process outlives the run.
async fn launch_or_cancel<B, F>(launch: F, cancel: &CancellationToken) -> Result<Option<B>, String>
where
    B: Browser + 'static,
    F: Future<Output = Result<B, BrowserError>> + Send + 'static,
{
    let mut handle = tokio::spawn(launch);
    tokio::select! {
        joined = &mut handle => joined
            .map_err(|e| format!("browser launch task failed: {e}"))?
            .map(Some)
            .map_err(|e| format!("failed to initialize browser: {e}")),
        _ = cancel.cancelled() => {
            if let Ok(Ok(mut session)) = handle.await {
                if let Err(e) = session.shutdown() {
                    warn!(error = %e, "failed to close browser after interrupt");
                }
            }
            Ok(None)
        }
    }
}

async fn run_async(run: RunConfig) -> Result<ScanExit, String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    print_banner(run.no_color);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let runner = Runner::new(Options {
        targets: run.targets.clone(),
        payloads: PayloadSource::FilePath(run.payloads_path.clone()),
        encode_depth: run.encode,
        require_marker: run.require_star,
        marker: run.marker.clone(),
        settle: run.settle,
    })
    .map_err(|e| e.to_string())?;

    // Plain stdout while inputs load so the interactive prompt is not drawn over.
    let quiet = ProgressBar::hidden();
    let plan = tokio::select! {
        plan = runner.prepare(&quiet) => plan.map_err(|e| e.to_string())?,
        _ = cancel.cancelled() => {
            println!("{}", "\n[!] Program interrupted. Exiting...".red());
            return Ok(ScanExit::Interrupted);
        }
    };
    println!(
        "{}",
        format!(
            "[i] Loaded {} payloads from {}",
            plan.payloads.len(),
            run.payloads_path
        )
        .bold()
        .blue()
    );

    let result = if plan.targets.is_empty() {
        ScanResult::empty(&plan)
    } else {
        println!(
            "{}",
            "[i] Starting browser, please wait...".bold().cyan()
        );
        let launch = ChromeSession::launch(browser_options(&run));
        let Some(mut session) = launch_or_cancel(launch, &cancel).await? else {
            println!("{}", "\n[!] Program interrupted. Exiting...".red());
            return Ok(ScanExit::Interrupted);
        };
        debug!(fingerprint = %session.fingerprint().summary(), "browser fingerprint");
        println!();

        let pb = ProgressBar::new(0);
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.enable_steady_tick(Duration::from_millis(200));
        pb.set_style(
            ProgressStyle::with_template("{spinner:.blue} {elapsed} ({len}) {pos} {msg}")
                .map_err(|e| format!("failed to build progress bar style: {e}"))?,
        );

        let result = runner.scan(&plan, &mut session, &cancel, &pb).await;
        pb.finish_and_clear();

        if let Err(e) = session.shutdown() {
            println!("{}", format!("[!] {e}").red());
        }
        result
    };

    if result.cancelled {
        println!(
            "{}",
            "\n[!] Program interrupted. Keeping partial results...".red()
        );
    }
    print_summary(&result);
    save_results(&run, &result).await;

    Ok(if result.cancelled {
        ScanExit::Interrupted
    } else {
        ScanExit::Completed
    })
}

pub fn run_cli() -> Result<ScanExit, String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{e}");
                return Ok(ScanExit::Completed);
            }
            _ => return Err(e.to_string()),
        },
    };

    if args.init_config {
        let path = config::default_config_path().map_err(|e| e.to_string())?;
        if config::write_default_config(&path).map_err(|e| e.to_string())? {
            println!("config written to {}", path.display());
        } else {
            println!("config already exists at {}", path.display());
        }
        return Ok(ScanExit::Completed);
    }

    let cfg = config::resolve_config(args.config.as_deref()).map_err(|e| e.to_string())?;

    let run = build_run_config(args, cfg)?;
    init_tracing(run.debug, run.no_color);
    debug!(?run, "run configuration");

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    let exit = rt.block_on(run_async(run));
    // A pending stdin read would otherwise keep the runtime alive.
    rt.shutdown_timeout(Duration::from_millis(250));
    exit
}
