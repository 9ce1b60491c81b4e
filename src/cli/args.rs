use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "reqbuster",
    version,
    about = "seed-request HTTP fuzzing tool",
    long_about = "Reqbuster fuzzes HTTP endpoints from a captured wire-format request. Mark injection points in the body with a delimiter byte, name the headers, params and path segments to fuzz, and point it at a wordlist.\n\nExamples:\n  reqbuster -s ./seed.request -w ./wordlist.txt -H User-Agent\n  reqbuster -s ./seed.request -w ./wordlist.txt --dirbuster --https\n  reqbuster -s ./upload.request -w ./wordlist.txt --multipart-file-name file --automatic-file-payloads\n\nTip: Use --config to persist fuzzing settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 's',
        long = "sr",
        visible_alias = "seed-request",
        value_name = "FILE",
        help_heading = "Input",
        help = "Wire-format HTTP request file to fuzz."
    )]
    pub seed_request: Option<String>,

    #[arg(
        short = 'w',
        long = "wl",
        visible_alias = "wordlist",
        value_name = "FILE",
        help_heading = "Input",
        help = "Newline-separated payload wordlist."
    )]
    pub wordlist: Option<String>,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.reqbuster/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'H',
        long = "th",
        visible_alias = "target-header",
        value_name = "NAME",
        action = ArgAction::Append,
        help_heading = "Targets",
        help = "HTTP header to fuzz (repeatable)."
    )]
    pub target_header: Vec<String>,

    #[arg(
        short = 'P',
        long = "tp",
        visible_alias = "target-param",
        value_name = "NAME",
        action = ArgAction::Append,
        help_heading = "Targets",
        help = "URL query string param to fuzz (repeatable)."
    )]
    pub target_param: Vec<String>,

    #[arg(
        short = 'A',
        long = "tpa",
        visible_alias = "target-path-arg",
        value_name = "SEGMENT",
        action = ArgAction::Append,
        help_heading = "Targets",
        help = "URL path segment to fuzz; must appear in the seed URL (repeatable)."
    )]
    pub target_path_arg: Vec<String>,

    #[arg(
        short = 'd',
        long = "td",
        visible_alias = "target-delimiter",
        value_name = "BYTE",
        help_heading = "Targets",
        help = "Single byte marking injection sites in the request body."
    )]
    pub target_delimiter: Option<String>,

    #[arg(
        long = "mfn",
        visible_alias = "multipart-file-name",
        value_name = "NAME",
        action = ArgAction::Append,
        help_heading = "Multipart",
        help = "File field of a multipart request to fuzz (repeatable)."
    )]
    pub multipart_file_name: Vec<String>,

    #[arg(
        long = "mfo",
        visible_alias = "multipart-form-name",
        value_name = "NAME",
        action = ArgAction::Append,
        help_heading = "Multipart",
        help = "Form field of a multipart request to fuzz (repeatable)."
    )]
    pub multipart_form_name: Vec<String>,

    #[arg(
        long = "ffs",
        visible_alias = "fuzz-file-size",
        value_name = "BYTES",
        help_heading = "Multipart",
        help = "Size of autogenerated upload payload files."
    )]
    pub fuzz_file_size: Option<u64>,

    #[arg(
        long = "pd",
        visible_alias = "payload-dir",
        value_name = "DIR",
        help_heading = "Multipart",
        help = "Directory of payload files to attempt to upload."
    )]
    pub payload_dir: Option<String>,

    #[arg(
        long = "afp",
        visible_alias = "automatic-file-payloads",
        help_heading = "Multipart",
        help = "Autogenerate upload payload files from the magic-number registry."
    )]
    pub automatic_file_payloads: bool,

    #[arg(
        short = 'D',
        long = "db",
        visible_alias = "dirbuster",
        help_heading = "Scan",
        help = "Brute force directory names from the wordlist."
    )]
    pub dirbuster: bool,

    #[arg(
        long = "https",
        help_heading = "HTTP",
        help = "Send requests over HTTPS."
    )]
    pub https: bool,

    #[arg(
        short = 'k',
        long = "scv",
        visible_alias = "skip-cert-verify",
        help_heading = "HTTP",
        help = "Skip TLS certificate verification."
    )]
    pub skip_cert_verify: bool,

    #[arg(
        short = 'p',
        long = "px",
        visible_alias = "proxy-url",
        value_name = "URL",
        help_heading = "HTTP",
        help = "HTTP proxy to send requests through (e.g. http://127.0.0.1:8080)."
    )]
    pub proxy_url: Option<String>,

    #[arg(
        long = "pca",
        visible_alias = "proxy-ca-pem",
        value_name = "FILE",
        help_heading = "HTTP",
        help = "PEM-encoded CA certificate for TLS through a proxy."
    )]
    pub proxy_ca_pem: Option<String>,

    #[arg(
        long = "dms",
        visible_alias = "delay-ms",
        value_name = "MS",
        help_heading = "Performance",
        help = "Delay between request dispatches in milliseconds."
    )]
    pub delay_ms: Option<u64>,

    #[arg(
        short = 'c',
        long = "co",
        visible_alias = "count-only",
        help_heading = "Scan",
        help = "Compute the request count and exit without sending."
    )]
    pub count_only: bool,

    #[arg(
        long = "pl",
        visible_alias = "plugin",
        value_name = "NAME",
        action = ArgAction::Append,
        help_heading = "Plugins",
        help = "Analysis plugin to load by name (repeatable)."
    )]
    pub plugin: Vec<String>,

    #[arg(
        long = "pla",
        visible_alias = "plugin-arg",
        value_name = "VALUE",
        action = ArgAction::Append,
        help_heading = "Plugins",
        help = "Argument handed to plugins at initialization (repeatable)."
    )]
    pub plugin_arg: Vec<String>,

    #[arg(
        short = 'n',
        long = "nc",
        visible_alias = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,
}
