use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use crate::browser::{Browser, BrowserError};
use crate::expander::{self, Candidate};
use crate::runner::{Options, PayloadSource, Runner, TargetSource};
use crate::target::decompose;

const INFECTED_PAGE: &str =
    r#"<html><head><script src="https://h6.xss.report/c/test"></script></head></html>"#;
const CLEAN_PAGE: &str = "<html><head></head><body>ok</body></html>";

/// In-memory `Browser` whose behaviour is decided by substrings of the URL.
#[derive(Default)]
pub(crate) struct ScriptedBrowser {
    visited: Vec<String>,
    infected: Vec<String>,
    failing: Vec<String>,
    cancel_after: Option<(usize, CancellationToken)>,
    current: Option<String>,
}

impl ScriptedBrowser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pages whose URL contains `needle` carry the collector script.
    pub(crate) fn infect(mut self, needle: &str) -> Self {
        self.infected.push(needle.to_string());
        self
    }

    pub(crate) fn fail_on(mut self, needle: &str) -> Self {
        self.failing.push(needle.to_string());
        self
    }

    /// Cancels `token` once `count` navigations have been made.
    pub(crate) fn cancel_after(mut self, count: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((count, token));
        self
    }

    pub(crate) fn visited(&self) -> &[String] {
        &self.visited
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.visited.push(url.to_string());
        if let Some((count, token)) = self.cancel_after.as_ref() {
            if self.visited.len() >= *count {
                token.cancel();
            }
        }
        if self.failing.iter().any(|n| url.contains(n.as_str())) {
            self.current = None;
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        let url = self.current.as_deref().ok_or(BrowserError::Closed)?;
        if self.infected.iter().any(|n| url.contains(n.as_str())) {
            Ok(INFECTED_PAGE.to_string())
        } else {
            Ok(CLEAN_PAGE.to_string())
        }
    }

    fn shutdown(&mut self) -> Result<(), BrowserError> {
        self.current = None;
        Ok(())
    }
}

/// Shared buffer collecting formatted tracing output.
#[derive(Clone, Default)]
pub(crate) struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLog {
    type Writer = CapturedLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Routes debug-level events on the current thread into a `CapturedLog`
/// until the guard drops.
pub(crate) fn capture_debug_log() -> (CapturedLog, DefaultGuard) {
    let log = CapturedLog::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(log.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    (log, tracing::subscriber::set_default(subscriber))
}

fn inline_runner(targets: &[&str], payloads: &[&str], encode_depth: u8) -> Runner {
    Runner::new(Options {
        targets: TargetSource::Inline(targets.iter().map(|s| s.to_string()).collect()),
        payloads: PayloadSource::Inline(payloads.iter().map(|s| s.to_string()).collect()),
        encode_depth,
        settle: std::time::Duration::ZERO,
        ..Options::default()
    })
    .unwrap()
}

#[test]
fn decomposing_a_candidate_recovers_the_injected_value() {
    let (base, params) = decompose("http://x.test/p?q=a*b&q=c&z=+1&k=%2Fv");
    let payloads = vec!["\"><script src=//x.test/c></script>".to_string(), "a&b=c".to_string()];

    let candidates: Vec<Candidate> = expander::expand(&base, &params, &payloads, 3, false)
        .unwrap()
        .collect();
    assert!(!candidates.is_empty());

    for c in candidates.iter() {
        let (cbase, cparams) = decompose(&c.url);
        assert_eq!(cbase, base);
        assert_eq!(
            cparams.get(&c.parameter).unwrap().to_vec(),
            vec![c.injected_value.clone()]
        );
        assert_eq!(cparams.get("z").unwrap().to_vec(), vec![" 1".to_string()]);
        assert_eq!(cparams.get("k").unwrap().to_vec(), vec!["/v".to_string()]);
    }
}

#[test]
fn expansion_is_deterministic() {
    let (base, params) = decompose("http://x.test/?b=2&a=1&c=3");
    let payloads = vec!["<x>".to_string(), "<y>".to_string()];

    let first: Vec<Candidate> = expander::expand(&base, &params, &payloads, 2, false)
        .unwrap()
        .collect();
    let second: Vec<Candidate> = expander::expand(&base, &params, &payloads, 2, false)
        .unwrap()
        .collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3 * 2 * 3);
    assert_eq!(first[0].parameter, "b");
}

#[test]
fn each_depth_bound_yields_one_variant_per_level() {
    let (base, params) = decompose("http://x.test/?id=*");
    let payloads = vec!["<svg onload=x>".to_string()];
    for depth in 0..=3u8 {
        let out: Vec<Candidate> = expander::expand(&base, &params, &payloads, depth, true)
            .unwrap()
            .collect();
        assert_eq!(out.len(), usize::from(depth) + 1);
        assert_eq!(out[0].encoded_payload, "<svg onload=x>");
    }
}

#[tokio::test]
async fn navigation_failure_does_not_stop_the_scan() {
    let runner = inline_runner(&["http://x.test/?a=*&b=*"], &["P"], 0);
    let mut browser = ScriptedBrowser::new().fail_on("a=P").infect("b=P");

    let result = runner
        .run(&mut browser, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        browser.visited(),
        &[
            "http://x.test/?a=P&b=%2A".to_string(),
            "http://x.test/?a=%2A&b=P".to_string(),
        ]
    );
    assert_eq!(result.stats.errors, 1);
    assert_eq!(result.stats.probes, 2);
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].parameter, "b");
}

#[tokio::test]
async fn cancellation_keeps_partial_findings() {
    let cancel = CancellationToken::new();
    let runner = inline_runner(
        &["http://x.test/one?q=*", "http://x.test/two?q=*"],
        &["p1", "p2", "p3"],
        0,
    );
    let mut browser = ScriptedBrowser::new()
        .infect("q=p1")
        .cancel_after(2, cancel.clone());

    let result = runner.run(&mut browser, &cancel).await.unwrap();

    assert!(result.cancelled);
    assert_eq!(browser.visited().len(), 2);
    assert_eq!(result.urls_scanned, 1);
    assert_eq!(result.stats.probes, 2);
    assert_eq!(
        result.findings.iter().map(|f| f.url.as_str()).collect::<Vec<_>>(),
        vec!["http://x.test/one?q=p1"]
    );
}

#[tokio::test]
async fn duplicate_hits_are_all_recorded() {
    let runner = inline_runner(&["http://x.test/?q=*", "http://x.test/?q=*"], &["<b>"], 0);
    let mut browser = ScriptedBrowser::new().infect("q=%3Cb%3E");

    let result = runner
        .run(&mut browser, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.urls_scanned, 2);
    assert_eq!(result.findings.len(), 2);
    assert_eq!(result.findings[0].url, result.findings[1].url);
}
