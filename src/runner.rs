use std::io::IsTerminal;
use std::time::Duration;

use colored::Colorize;
use indicatif::ProgressBar;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::browser::Browser;
use crate::detector::{
    self, Collector, Finding, ProbeContext, ProbeOutcome, ProbeSettings, ScanStats,
    DEFAULT_INFECTION_MARKER, DEFAULT_SETTLE,
};
use crate::expander;
use crate::output::emit;
use crate::target::{SkipReason, TargetUrl};
use crate::transform::MAX_ENCODE_DEPTH;

#[derive(Clone, Debug)]
pub enum PayloadSource {
    FilePath(String),
    Inline(Vec<String>),
}

#[derive(Clone, Debug)]
pub enum TargetSource {
    Url(String),
    FilePath(String),
    /// Interactive prompt on a terminal, batch read otherwise.
    Stdin,
    Inline(Vec<String>),
}

#[derive(Clone, Debug)]
pub struct Options {
    pub targets: TargetSource,
    pub payloads: PayloadSource,
    pub encode_depth: u8,
    pub require_marker: bool,
    pub marker: String,
    pub settle: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            targets: TargetSource::Stdin,
            payloads: PayloadSource::FilePath("./payloads/blind-xss.txt".to_string()),
            encode_depth: 0,
            require_marker: false,
            marker: DEFAULT_INFECTION_MARKER.to_string(),
            settle: DEFAULT_SETTLE,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("invalid encode depth {value}, expected 0 to {MAX_ENCODE_DEPTH}")]
    InvalidEncodeDepth { value: u8 },

    #[error("infection marker must not be empty")]
    EmptyMarker,

    #[error("failed to open file for {kind}: {path}: {source}")]
    FileOpen {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read lines for {kind}: {path}: {source}")]
    FileRead {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("payload file {path} is empty")]
    EmptyPayloads { path: String },

    #[error("failed to read URLs from stdin: {source}")]
    StdinRead {
        #[source]
        source: std::io::Error,
    },
}

/// Loaded inputs, ready to scan.
#[derive(Clone, Debug, Default)]
pub struct ScanPlan {
    pub payloads: Vec<String>,
    pub targets: Vec<TargetUrl>,
    pub rejected: Vec<(String, SkipReason)>,
}

#[derive(Clone, Debug)]
pub struct ScanResult {
    pub elapsed: Duration,
    pub urls_scanned: usize,
    pub findings: Vec<Finding>,
    pub stats: ScanStats,
    /// Set when the scan stopped early; `findings` holds what was confirmed so far.
    pub cancelled: bool,
}

impl ScanResult {
    /// Result of a plan with nothing to probe.
    pub fn empty(plan: &ScanPlan) -> Self {
        Self {
            elapsed: Duration::ZERO,
            urls_scanned: 0,
            findings: Vec::new(),
            stats: ScanStats {
                skipped_urls: plan.rejected.len(),
                ..ScanStats::default()
            },
            cancelled: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Runner {
    options: Options,
}

impl Runner {
    pub fn new(options: Options) -> Result<Self, RunnerError> {
        if options.encode_depth > MAX_ENCODE_DEPTH {
            return Err(RunnerError::InvalidEncodeDepth {
                value: options.encode_depth,
            });
        }
        if options.marker.is_empty() {
            return Err(RunnerError::EmptyMarker);
        }
        Ok(Self { options })
    }

    /// Loads payloads and targets, printing every rejected target.
    pub async fn prepare(&self, pb: &ProgressBar) -> Result<ScanPlan, RunnerError> {
        let payloads = load_payloads(&self.options.payloads).await?;
        let raw_targets = load_targets(&self.options.targets, pb).await?;

        let mut plan = ScanPlan {
            payloads,
            ..ScanPlan::default()
        };
        for raw in raw_targets {
            match TargetUrl::parse(&raw) {
                Ok(target) => plan.targets.push(target),
                Err(reason) => {
                    emit(pb, format!("[!] {reason}: {raw}").red().to_string());
                    plan.rejected.push((raw, reason));
                }
            }
        }

        info!(
            payloads = plan.payloads.len(),
            targets = plan.targets.len(),
            rejected = plan.rejected.len(),
            "inputs loaded"
        );
        Ok(plan)
    }

    /// Probes every candidate of every planned target, one at a time.
    pub async fn scan<B: Browser + ?Sized>(
        &self,
        plan: &ScanPlan,
        browser: &mut B,
        cancel: &CancellationToken,
        pb: &ProgressBar,
    ) -> ScanResult {
        let started_at = Instant::now();
        let depth = self.options.encode_depth;
        let require_marker = self.options.require_marker;
        let settings = ProbeSettings {
            marker: self.options.marker.clone(),
            settle: self.options.settle,
        };

        let total: usize = plan
            .targets
            .iter()
            .map(|t| expander::count(&t.params, plan.payloads.len(), depth, require_marker))
            .sum();
        pb.set_length(total as u64);
        debug!(candidates = total, "scan planned");

        let mut collector = Collector::new();
        collector.record_skips(plan.rejected.len());
        let mut urls_scanned = 0usize;
        let mut cancelled = false;

        'targets: for (index, target) in plan.targets.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            urls_scanned += 1;

            debug!(url = %target.original, "processing URL");
            debug!(params = %target.params, "query parameters");
            let marked: Vec<&str> = target
                .params
                .marked()
                .iter()
                .map(|p| p.name.as_str())
                .collect();
            debug!(?marked, "parameters with *");

            let candidates = match expander::expand(
                &target.base,
                &target.params,
                &plan.payloads,
                depth,
                require_marker,
            ) {
                Ok(candidates) => candidates,
                Err(reason) => {
                    emit(
                        pb,
                        format!("[!] {reason}: {}", target.original).red().to_string(),
                    );
                    collector.record_skips(1);
                    continue;
                }
            };

            let ctx = ProbeContext {
                url_index: index + 1,
                total_urls: plan.targets.len(),
                total_payloads: plan.payloads.len(),
                max_depth: depth,
            };

            for candidate in candidates {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'targets;
                }
                pb.set_message(candidate.url.clone());

                let outcome = detector::probe(&mut *browser, &candidate.url, &settings, cancel).await;
                collector.record(&target.original, &candidate, &outcome);
                detector::log_probe(pb, &ctx, &candidate, &outcome, collector.stats());
                if matches!(outcome, ProbeOutcome::Cancelled) {
                    cancelled = true;
                    break 'targets;
                }
                pb.inc(1);
            }
        }

        if cancelled {
            info!("scan cancelled, keeping partial results");
        }

        let (findings, stats) = collector.into_parts();
        ScanResult {
            elapsed: started_at.elapsed(),
            urls_scanned,
            findings,
            stats,
            cancelled,
        }
    }

    /// Library entry point: prepare and scan without a visible progress bar.
    pub async fn run<B: Browser + ?Sized>(
        &self,
        browser: &mut B,
        cancel: &CancellationToken,
    ) -> Result<ScanResult, RunnerError> {
        let pb = ProgressBar::hidden();
        let plan = self.prepare(&pb).await?;
        Ok(self.scan(&plan, browser, cancel, &pb).await)
    }
}

async fn load_targets(source: &TargetSource, pb: &ProgressBar) -> Result<Vec<String>, RunnerError> {
    let raw = match source {
        TargetSource::Url(url) => vec![url.clone()],
        TargetSource::Inline(values) => values.clone(),
        TargetSource::FilePath(path) => read_lines("input_file", path).await?,
        TargetSource::Stdin => read_stdin(pb).await?,
    };
    Ok(raw
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect())
}

async fn load_payloads(source: &PayloadSource) -> Result<Vec<String>, RunnerError> {
    let (path, lines) = match source {
        PayloadSource::Inline(values) => ("<inline>".to_string(), values.clone()),
        PayloadSource::FilePath(path) => (path.clone(), read_lines("payloads", path).await?),
    };
    let payloads: Vec<String> = lines
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if payloads.is_empty() {
        return Err(RunnerError::EmptyPayloads { path });
    }
    Ok(payloads)
}

async fn read_lines(kind: &'static str, path: &str) -> Result<Vec<String>, RunnerError> {
    let path = crate::config::user_path(path);
    let handle = File::open(&path).await.map_err(|e| RunnerError::FileOpen {
        kind,
        path: path.clone(),
        source: e,
    })?;
    let mut out = Vec::new();
    let mut lines = BufReader::new(handle).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => out.push(line),
            Ok(None) => break,
            Err(e) => {
                return Err(RunnerError::FileRead {
                    kind,
                    path,
                    source: e,
                })
            }
        }
    }
    Ok(out)
}

async fn read_stdin(pb: &ProgressBar) -> Result<Vec<String>, RunnerError> {
    let interactive = std::io::stdin().is_terminal();
    if interactive {
        emit(
            pb,
            "[?] Enter URLs (one per line, press Ctrl+D or empty line to finish):"
                .white()
                .to_string(),
        );
    }

    read_target_lines(BufReader::new(tokio::io::stdin()), interactive).await
}

/// Collects non-blank lines. Interactive input ends at the first blank line
/// or EOF; piped input ends at EOF only.
async fn read_target_lines<R: AsyncBufRead + Unpin>(
    reader: R,
    interactive: bool,
) -> Result<Vec<String>, RunnerError> {
    let mut out = Vec::new();
    let mut lines = reader.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|source| RunnerError::StdinRead { source })?
    {
        if line.trim().is_empty() {
            if interactive {
                break;
            }
            continue;
        }
        out.push(line);
    }
    Ok(out)
}
