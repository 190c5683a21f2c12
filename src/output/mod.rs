use std::path::Path;

use indicatif::ProgressBar;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::detector::Finding;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to serialize findings: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to open output file: {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output file: {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One vulnerable URL per line.
pub fn render_text(findings: &[Finding]) -> Vec<u8> {
    let mut out = String::new();
    for f in findings {
        out.push_str(&f.url);
        out.push('\n');
    }
    out.into_bytes()
}

pub fn render_json(findings: &[Finding]) -> Result<Vec<u8>, OutputError> {
    let mut out =
        serde_json::to_vec_pretty(findings).map_err(|source| OutputError::Serialize { source })?;
    out.push(b'\n');
    Ok(out)
}

pub fn render(findings: &[Finding], format: OutputFormat) -> Result<Vec<u8>, OutputError> {
    match format {
        OutputFormat::Text => Ok(render_text(findings)),
        OutputFormat::Json => render_json(findings),
    }
}

/// Writes `findings` to `path`, replacing any previous content.
pub async fn save(
    findings: &[Finding],
    path: &Path,
    format: OutputFormat,
) -> Result<(), OutputError> {
    let rendered = render(findings, format)?;
    let display = path.display().to_string();

    let mut outfile = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|source| OutputError::Open {
            path: display.clone(),
            source,
        })?;
    outfile
        .write_all(&rendered)
        .await
        .map_err(|source| OutputError::Write {
            path: display.clone(),
            source,
        })?;
    outfile
        .flush()
        .await
        .map_err(|source| OutputError::Write {
            path: display,
            source,
        })?;
    Ok(())
}

/// Prints above the progress bar, or straight to stdout when the bar is hidden.
pub fn emit<I: AsRef<str>>(pb: &ProgressBar, line: I) {
    if pb.is_hidden() {
        println!("{}", line.as_ref());
    } else {
        pb.println(line);
    }
}
