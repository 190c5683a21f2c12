use std::time::Duration;

use colored::Colorize;
use indicatif::ProgressBar;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::browser::{Browser, BrowserError};
use crate::expander::Candidate;
use crate::output::emit;

/// Collector domain expected in a page once a payload has phoned home.
pub const DEFAULT_INFECTION_MARKER: &str = "xss.report";

pub const DEFAULT_SETTLE: Duration = Duration::from_secs(3);

#[derive(Clone, Debug)]
pub struct ProbeSettings {
    pub marker: String,
    /// Fixed wait between navigation and reading the page source.
    pub settle: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            marker: DEFAULT_INFECTION_MARKER.to_string(),
            settle: DEFAULT_SETTLE,
        }
    }
}

#[derive(Debug)]
pub enum ProbeOutcome {
    Hit,
    Miss,
    /// Navigation or page read failed; counted as a miss.
    Failed(BrowserError),
    Cancelled,
}

impl ProbeOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, ProbeOutcome::Hit)
    }
}

// a confirmed candidate
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub url: String,
    pub target: String,
    pub parameter: String,
    pub payload_index: usize,
    pub payload: String,
    pub depth: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub probes: usize,
    pub hits: usize,
    pub errors: usize,
    pub skipped_urls: usize,
}

/// Accumulates findings for one scan; owned by the scan loop.
#[derive(Debug, Default)]
pub struct Collector {
    findings: Vec<Finding>,
    stats: ScanStats,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, target: &str, candidate: &Candidate, outcome: &ProbeOutcome) {
        match outcome {
            ProbeOutcome::Hit => {
                self.stats.probes += 1;
                self.stats.hits += 1;
                self.findings.push(Finding {
                    url: candidate.url.clone(),
                    target: target.to_string(),
                    parameter: candidate.parameter.clone(),
                    payload_index: candidate.payload_index,
                    payload: candidate.payload.clone(),
                    depth: candidate.depth,
                });
            }
            ProbeOutcome::Miss => self.stats.probes += 1,
            ProbeOutcome::Failed(_) => {
                self.stats.probes += 1;
                self.stats.errors += 1;
            }
            ProbeOutcome::Cancelled => {}
        }
    }

    pub fn record_skips(&mut self, count: usize) {
        self.stats.skipped_urls += count;
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn into_parts(self) -> (Vec<Finding>, ScanStats) {
        (self.findings, self.stats)
    }
}

pub fn page_is_infected(source: &str, marker: &str) -> bool {
    !marker.is_empty() && source.contains(marker)
}

/// Visits one candidate URL and checks the settled page for the marker.
pub async fn probe<B: Browser + ?Sized>(
    browser: &mut B,
    url: &str,
    settings: &ProbeSettings,
    cancel: &CancellationToken,
) -> ProbeOutcome {
    if let Err(e) = browser.navigate(url).await {
        return ProbeOutcome::Failed(e);
    }

    if !settings.settle.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(settings.settle) => {}
            _ = cancel.cancelled() => return ProbeOutcome::Cancelled,
        }
    }

    match browser.page_source().await {
        Ok(source) if page_is_infected(&source, &settings.marker) => ProbeOutcome::Hit,
        Ok(_) => ProbeOutcome::Miss,
        Err(e) => ProbeOutcome::Failed(e),
    }
}

/// Numbering used when reporting a probe.
#[derive(Clone, Copy, Debug)]
pub struct ProbeContext {
    pub url_index: usize,
    pub total_urls: usize,
    pub total_payloads: usize,
    pub max_depth: u8,
}

pub fn log_probe(
    pb: &ProgressBar,
    ctx: &ProbeContext,
    candidate: &Candidate,
    outcome: &ProbeOutcome,
    stats: ScanStats,
) {
    emit(
        pb,
        format!(
            "{} {}",
            "[i] Parameter:".magenta(),
            candidate.parameter.white()
        ),
    );
    emit(
        pb,
        format!(
            "{} {}",
            format!(
                "[i] Payload({}/{}):",
                candidate.payload_index, ctx.total_payloads
            )
            .magenta(),
            candidate.payload.white()
        ),
    );
    emit(
        pb,
        format!(
            "{} {}",
            format!(
                "[i] Payload Encoded {}-{} times:",
                candidate.depth, ctx.max_depth
            )
            .magenta(),
            candidate.encoded_payload.white()
        ),
    );
    emit(
        pb,
        format!(
            "{} {}",
            format!("[i] URL({}/{}):", ctx.url_index, ctx.total_urls).cyan(),
            candidate.url.white()
        ),
    );

    match outcome {
        ProbeOutcome::Hit => emit(
            pb,
            format!(
                "{} {}",
                format!("[+] Infection marker found (hits: {}):", stats.hits)
                    .bold()
                    .green(),
                candidate.url.bold().green()
            ),
        ),
        ProbeOutcome::Miss => emit(
            pb,
            format!("[-] Infection marker not found (hits: {})", stats.hits)
                .dimmed()
                .to_string(),
        ),
        ProbeOutcome::Failed(e) => {
            emit(pb, format!("[!] {e}").red().to_string());
            debug!(error = ?e, url = %candidate.url, "probe failed");
        }
        ProbeOutcome::Cancelled => {
            emit(pb, "[!] Interrupted before the page settled".red().to_string());
            debug!(url = %candidate.url, "cancelled before the page settled");
        }
    }
    emit(pb, "");

    debug!(
        parameter = %candidate.parameter,
        value_index = candidate.value_index,
        payload_index = candidate.payload_index,
        depth = candidate.depth,
        probes = stats.probes,
        hits = stats.hits,
        errors = stats.errors,
        "probe finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ScriptedBrowser;

    fn candidate(url: &str) -> Candidate {
        Candidate {
            url: url.to_string(),
            parameter: "id".to_string(),
            value_index: 0,
            payload_index: 1,
            payload: "<x>".to_string(),
            encoded_payload: "<x>".to_string(),
            depth: 0,
            injected_value: "<x>".to_string(),
        }
    }

    fn instant() -> ProbeSettings {
        ProbeSettings {
            settle: Duration::ZERO,
            ..ProbeSettings::default()
        }
    }

    #[test]
    fn marker_must_be_a_substring() {
        assert!(page_is_infected("<script src=//abc.xss.report></script>", "xss.report"));
        assert!(!page_is_infected("<html></html>", "xss.report"));
        assert!(!page_is_infected("anything", ""));
    }

    #[tokio::test]
    async fn probe_reports_hit_and_miss() {
        let mut browser = ScriptedBrowser::new().infect("vuln");
        let cancel = CancellationToken::new();

        let hit = probe(&mut browser, "http://x.test/vuln?a=1", &instant(), &cancel).await;
        assert!(hit.is_hit());

        let miss = probe(&mut browser, "http://x.test/safe?a=1", &instant(), &cancel).await;
        assert!(matches!(miss, ProbeOutcome::Miss));
    }

    #[tokio::test]
    async fn navigation_failure_is_a_miss() {
        let mut browser = ScriptedBrowser::new().infect("x.test").fail_on("boom");
        let cancel = CancellationToken::new();

        let outcome = probe(&mut browser, "http://x.test/boom?a=1", &instant(), &cancel).await;
        assert!(matches!(
            outcome,
            ProbeOutcome::Failed(BrowserError::Navigation { .. })
        ));
        assert!(!outcome.is_hit());
    }

    #[tokio::test]
    async fn cancellation_interrupts_settle_wait() {
        let mut browser = ScriptedBrowser::new().infect("x.test");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let settings = ProbeSettings {
            settle: Duration::from_secs(60),
            ..ProbeSettings::default()
        };

        let outcome = probe(&mut browser, "http://x.test/?a=1", &settings, &cancel).await;
        assert!(matches!(outcome, ProbeOutcome::Cancelled));
    }

    #[test]
    fn collector_counts_outcomes() {
        let mut collector = Collector::new();
        let c = candidate("http://x.test/?id=%3Cx%3E");
        collector.record("http://x.test/?id=*", &c, &ProbeOutcome::Hit);
        collector.record("http://x.test/?id=*", &c, &ProbeOutcome::Miss);
        collector.record(
            "http://x.test/?id=*",
            &c,
            &ProbeOutcome::Failed(BrowserError::Closed),
        );
        collector.record("http://x.test/?id=*", &c, &ProbeOutcome::Cancelled);
        collector.record_skips(2);

        let stats = collector.stats();
        assert_eq!(stats.probes, 3);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.skipped_urls, 2);
        assert_eq!(collector.findings().len(), 1);
        assert_eq!(collector.findings()[0].url, c.url);
        assert_eq!(collector.findings()[0].target, "http://x.test/?id=*");
    }
}
