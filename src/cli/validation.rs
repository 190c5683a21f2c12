use crate::cli::args::CliArgs;
use crate::output::OutputFormat;
use crate::transform::MAX_ENCODE_DEPTH;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(depth) = args.encode {
        if depth > MAX_ENCODE_DEPTH {
            return Err(format!(
                "invalid --encode {depth}, expected 0 to {MAX_ENCODE_DEPTH}"
            ));
        }
    }
    if let Some(timeout) = args.page_timeout {
        if timeout == 0 {
            return Err("invalid --page-timeout, expected positive integer".to_string());
        }
    }
    if let Some(marker) = args.marker.as_deref() {
        if marker.trim().is_empty() {
            return Err("invalid --marker, expected non-empty string".to_string());
        }
    }
    if let Some(raw) = args.output_format.as_deref() {
        if OutputFormat::parse(raw).is_none() {
            return Err(format!("invalid --output-format '{raw}', expected text or json"));
        }
    }
    Ok(())
}
