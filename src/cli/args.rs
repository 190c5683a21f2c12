use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "blindbuster",
    version,
    about = "blind XSS injection-point discovery tool",
    long_about = "Blindbuster drives a headless browser through every payload and encoding of every query parameter and reports the URLs whose page ends up loading the blind XSS collector.\n\nMark injection points with * in a parameter value, or leave them out to replace every parameter in turn.\n\nExamples:\n  blindbuster -u 'https://target.tld/search?q=*' -p payloads.txt\n  blindbuster -f urls.txt -p payloads.txt -e 2 -o vulnerable.txt\n  cat urls.txt | blindbuster -p payloads.txt --require-star\n\nTip: Use --config to persist scan settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'u',
        long = "url",
        value_name = "URL",
        conflicts_with = "file",
        help_heading = "Input",
        help = "Single target URL."
    )]
    pub url: Option<String>,

    #[arg(
        short = 'f',
        long = "file",
        value_name = "FILE",
        help_heading = "Input",
        help = "Load target URLs from a file (one per line). Reads stdin when neither --url nor --file is given."
    )]
    pub file: Option<String>,

    #[arg(
        short = 'p',
        long = "payloads",
        value_name = "FILE",
        help_heading = "Input",
        help = "Payload list (one per line)."
    )]
    pub payloads: Option<String>,

    #[arg(
        short = 'C',
        long = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.blindbuster/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "init-config",
        help_heading = "Input",
        help = "Write a commented default config to the default path and exit."
    )]
    pub init_config: bool,

    #[arg(
        short = 'e',
        long = "encode",
        value_name = "N",
        help_heading = "Scan",
        help = "Also try each payload percent-encoded 1 to N times (0-3, default 0)."
    )]
    pub encode: Option<u8>,

    #[arg(
        long = "require-star",
        help_heading = "Scan",
        help = "Skip URLs that have no * injection marker."
    )]
    pub require_star: bool,

    #[arg(
        short = 'm',
        long = "marker",
        value_name = "STR",
        help_heading = "Scan",
        help = "Infection marker searched in the page source (default xss.report)."
    )]
    pub marker: Option<String>,

    #[arg(
        short = 's',
        long = "settle",
        value_name = "SECONDS",
        help_heading = "Scan",
        help = "Wait after each navigation before reading the page (default 3)."
    )]
    pub settle: Option<u64>,

    #[arg(
        long = "page-timeout",
        value_name = "SECONDS",
        help_heading = "Browser",
        help = "Navigation timeout (default 20)."
    )]
    pub page_timeout: Option<u64>,

    #[arg(
        long = "chrome",
        value_name = "PATH",
        help_heading = "Browser",
        help = "Chrome/Chromium binary to launch instead of the detected one."
    )]
    pub chrome: Option<String>,

    #[arg(
        long = "fixed-fingerprint",
        help_heading = "Browser",
        help = "Disable user agent, language, timezone and window size randomization."
    )]
    pub fixed_fingerprint: bool,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write vulnerable URLs to a file."
    )]
    pub output: Option<String>,

    #[arg(
        long = "output-format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Output format: text or json (default text)."
    )]
    pub output_format: Option<String>,

    #[arg(
        long = "debug",
        help_heading = "Output",
        help = "Print debug diagnostics (overridden by RUST_LOG)."
    )]
    pub debug: bool,

    #[arg(
        short = 'n',
        long = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,
}
