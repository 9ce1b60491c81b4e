use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use indicatif::ProgressBar;
use thiserror::Error;
use tokio::time::Instant;

use crate::executor::{Client, Executor};
use crate::files::FileError;
use crate::fuzzer::{FuzzConfig, FuzzError, Fuzzer};
use crate::parser::{self, ParseError};
use crate::plugin::{self, Broker, PluginEnv, PluginError};
use crate::request::RequestError;
use crate::wordlist::Wordlist;

/// Core configuration, one field per CLI flag.
#[derive(Clone, Debug)]
pub struct Options {
    pub seed_request: String,
    pub wordlist: String,
    pub target_headers: Vec<String>,
    pub target_params: Vec<String>,
    pub target_path_args: Vec<String>,
    pub target_delimiter: u8,
    pub multipart_file_keys: Vec<String>,
    pub multipart_form_names: Vec<String>,
    pub fuzz_file_size: u64,
    pub payload_dir: Option<String>,
    pub automatic_file_payloads: bool,
    pub fuzz_directory: bool,
    pub https: bool,
    pub skip_cert_verify: bool,
    pub proxy_url: Option<String>,
    pub proxy_ca_pem: Option<String>,
    pub request_delay: Duration,
    pub count_only: bool,
    pub plugins: Vec<String>,
    pub plugin_args: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            seed_request: String::new(),
            wordlist: String::new(),
            target_headers: Vec::new(),
            target_params: Vec::new(),
            target_path_args: Vec::new(),
            target_delimiter: b'`',
            multipart_file_keys: Vec::new(),
            multipart_form_names: Vec::new(),
            fuzz_file_size: 1024,
            payload_dir: None,
            automatic_file_payloads: false,
            fuzz_directory: false,
            https: false,
            skip_cert_verify: false,
            proxy_url: None,
            proxy_ca_pem: None,
            request_delay: Duration::ZERO,
            count_only: false,
            plugins: Vec::new(),
            plugin_args: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("seed-request is required")]
    MissingSeedRequest,

    #[error("wordlist is required")]
    MissingWordlist,

    #[error(transparent)]
    Seed(#[from] ParseError),

    #[error("seed request does not have URL path arg '{arg}'")]
    PathArgMissing { arg: String },

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("failed to open wordlist {path}: {source}")]
    WordlistOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read payload directory {path}: {source}")]
    PayloadDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read proxy CA bundle {path}: {source}")]
    ProxyCaRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid proxy CA bundle {path}: {source}")]
    ProxyCaParse {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to setup proxy {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Fuzz(#[from] FuzzError),
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub requests_planned: usize,
    pub dispatched: bool,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub struct Runner {
    options: Options,
}

impl Runner {
    pub fn new(options: Options) -> Result<Self, RunnerError> {
        if options.seed_request.trim().is_empty() {
            return Err(RunnerError::MissingSeedRequest);
        }
        if options.wordlist.trim().is_empty() {
            return Err(RunnerError::MissingWordlist);
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Pre-flight checks, count, then generation and dispatch. Every error
    /// before dispatch aborts the run and surfaces on the exit code.
    pub async fn run(&self, progress: ProgressBar) -> Result<RunSummary, RunnerError> {
        let started_at = Instant::now();
        let options = &self.options;

        let seed = parser::request_from_file(Path::new(&options.seed_request))?;

        for arg in &options.target_path_args {
            if !seed.has_path_argument(arg) {
                return Err(RunnerError::PathArgMissing { arg: arg.clone() });
            }
        }

        // Validate marker balance up front so a bad seed fails before any
        // request goes out. Multipart seeds skip this: their bodies are not
        // marker-fuzzed.
        if !seed.is_multipart_form() {
            seed.body_target_count(options.target_delimiter)?;
        }

        let wordlist =
            Wordlist::open(Path::new(&options.wordlist))
                .await
                .map_err(|source| RunnerError::WordlistOpen {
                    path: options.wordlist.clone(),
                    source,
                })?;

        let filesystem_payloads = match options.payload_dir.as_deref() {
            Some(dir) => collect_payload_files(dir)?,
            None => Vec::new(),
        };

        if filesystem_payloads.is_empty()
            && !options.automatic_file_payloads
            && !options.multipart_file_keys.is_empty()
        {
            progress.println(format!(
                "{} {}",
                "warning ::".bold().yellow(),
                "no file payloads have been specified".bold().white()
            ));
        }

        let client = build_http_client(options)?;

        let env = PluginEnv {
            args: options.plugin_args.clone(),
            progress: progress.clone(),
        };
        let plugins = plugin::load_plugins(&options.plugins, &env)?;

        let fuzzer = Fuzzer::new(FuzzConfig {
            seed: Arc::new(seed),
            wordlist: Arc::new(wordlist),
            target_headers: options.target_headers.clone(),
            target_params: options.target_params.clone(),
            target_path_args: options.target_path_args.clone(),
            target_file_keys: options.multipart_file_keys.clone(),
            target_multipart_field_names: options.multipart_form_names.clone(),
            filesystem_payloads,
            fuzz_directory: options.fuzz_directory,
            fuzz_file_size: options.fuzz_file_size,
            enable_generated_payloads: options.automatic_file_payloads,
            target_delimiter: options.target_delimiter,
        });

        let requests_planned = fuzzer.request_count().await?;
        progress.println(format!(
            "{} {} {}",
            "sending".bold().white(),
            requests_planned.to_string().bold().green(),
            "requests".bold().white()
        ));

        if options.count_only {
            return Ok(RunSummary {
                requests_planned,
                dispatched: false,
                elapsed: started_at.elapsed(),
            });
        }

        progress.set_length(requests_planned as u64);

        let url_scheme = if options.https { "https" } else { "http" };
        let broker = Broker::new(plugins, progress.clone());
        let executor = Executor::new(
            client,
            url_scheme,
            options.request_delay,
            broker,
            progress.clone(),
        );
        executor.wait_for(requests_planned);

        let (jobs, mut errors) = fuzzer.generate_requests();

        // The first generation error is fatal; everything else runs to a
        // clean drain.
        tokio::select! {
            _ = executor.process_requests(jobs) => {}
            Some(error) = errors.recv() => return Err(error.into()),
        }

        Ok(RunSummary {
            requests_planned,
            dispatched: true,
            elapsed: started_at.elapsed(),
        })
    }
}

/// Collects the regular files of a payload directory in sorted order, so
/// generation order is stable across runs.
fn collect_payload_files(dir: &str) -> Result<Vec<PathBuf>, RunnerError> {
    let entries = std::fs::read_dir(dir).map_err(|source| RunnerError::PayloadDir {
        path: dir.to_string(),
        source,
    })?;

    let mut payloads = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RunnerError::PayloadDir {
            path: dir.to_string(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        payloads.push(path);
    }
    payloads.sort();
    Ok(payloads)
}

fn build_http_client(options: &Options) -> Result<Client, RunnerError> {
    let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());

    if options.skip_cert_verify {
        builder = builder
            .danger_accept_invalid_hostnames(true)
            .danger_accept_invalid_certs(true);
    }

    if let Some(path) = options.proxy_ca_pem.as_deref().filter(|p| !p.is_empty()) {
        let pem = std::fs::read(path).map_err(|source| RunnerError::ProxyCaRead {
            path: path.to_string(),
            source,
        })?;
        let certificate =
            reqwest::Certificate::from_pem(&pem).map_err(|source| RunnerError::ProxyCaParse {
                path: path.to_string(),
                source,
            })?;
        builder = builder.add_root_certificate(certificate);
    }

    if let Some(proxy) = options.proxy_url.as_deref().filter(|p| !p.is_empty()) {
        let proxy = reqwest::Proxy::all(proxy).map_err(|source| RunnerError::ProxySetup {
            proxy: proxy.to_string(),
            source,
        })?;
        builder = builder.proxy(proxy);
    }

    let inner = builder
        .build()
        .map_err(|source| RunnerError::HttpClientBuild { source })?;
    Ok(Client::new(inner))
}
