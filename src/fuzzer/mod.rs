use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use itertools::iproduct;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::files::{self, FileError, FilePayload};
use crate::request::{Request, RequestError};
use crate::wordlist::Wordlist;

const JOB_QUEUE_DEPTH: usize = 1024;

pub const DIRECTORY_ROOT_FIELD: &str = "directory root";

/// The request location a payload was injected into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    Header,
    Body,
    UrlParam,
    UrlPathArg,
    UrlDirectoryRoot,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Location::Header => "header",
            Location::Body => "body",
            Location::UrlParam => "url-param",
            Location::UrlPathArg => "url-path-arg",
            Location::UrlDirectoryRoot => "url-directory-root",
        };
        f.write_str(name)
    }
}

/// One mutated request queued for dispatch, with attribution metadata so the
/// executor and plugins can tell which payload went where.
#[derive(Debug)]
pub struct Job {
    pub request: Request,
    pub field_name: String,
    pub location: Location,
    pub payload: String,
}

#[derive(Debug, Error)]
pub enum FuzzError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    File(#[from] FileError),

    #[error("wordlist error: {0}")]
    Wordlist(#[from] std::io::Error),
}

/// Everything the generator and the count oracle share. The two are coupled
/// to the unit: the executor waits on exactly `request_count()` completions,
/// so any drift between them deadlocks the run or ends it early.
#[derive(Clone)]
pub struct FuzzConfig {
    pub seed: Arc<Request>,
    pub wordlist: Arc<Wordlist>,
    pub target_headers: Vec<String>,
    pub target_params: Vec<String>,
    pub target_path_args: Vec<String>,
    pub target_file_keys: Vec<String>,
    pub target_multipart_field_names: Vec<String>,
    pub filesystem_payloads: Vec<PathBuf>,
    pub fuzz_directory: bool,
    pub fuzz_file_size: u64,
    pub enable_generated_payloads: bool,
    pub target_delimiter: u8,
}

/// The single place the count arithmetic lives. `request_count` and the
/// generator tests both go through here.
pub fn expected_count(config: &FuzzConfig, words: usize) -> Result<usize, FuzzError> {
    let multipart_field_targets = config.target_multipart_field_names.len();
    let mut total = words * config.target_headers.len()
        + words * config.target_params.len()
        + words * config.target_path_args.len()
        + words * multipart_field_targets
        + config.filesystem_payloads.len() * config.target_file_keys.len();

    let file_targets = config.target_file_keys.len() * files::supported_file_types().len();
    if file_targets > 0 || multipart_field_targets > 0 {
        if config.enable_generated_payloads {
            total += file_targets;
        }
    } else {
        let body_targets = config.seed.body_target_count(config.target_delimiter)?;
        total += words * body_targets;
    }

    if config.fuzz_directory {
        total += words;
    }

    Ok(total)
}

/// The fuzzer turns a seed request plus a wordlist into a stream of mutated
/// requests, producer-consumer style, so wordlists of any size run in
/// constant memory.
pub struct Fuzzer {
    config: FuzzConfig,
}

impl Fuzzer {
    pub fn new(config: FuzzConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FuzzConfig {
        &self.config
    }

    /// Computes the total number of requests before any are generated. The
    /// wordlist is rewound afterwards so the generator can stream it.
    pub async fn request_count(&self) -> Result<usize, FuzzError> {
        let words = self.config.wordlist.count().await?;
        expected_count(&self.config, words)
    }

    /// Starts the producer task and returns the job stream plus a sibling
    /// error stream. Both channels close when generation finishes; the first
    /// error aborts generation.
    pub fn generate_requests(&self) -> (mpsc::Receiver<Job>, mpsc::Receiver<FuzzError>) {
        let (job_tx, job_rx) = mpsc::channel::<Job>(JOB_QUEUE_DEPTH);
        let (error_tx, error_rx) = mpsc::channel::<FuzzError>(1);
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(error) = produce_jobs(&config, &job_tx).await {
                let _ = error_tx.send(error).await;
            }
            // Dropping the senders closes both channels; that is the whole
            // end-of-stream protocol.
        });

        (job_rx, error_rx)
    }
}

async fn produce_jobs(config: &FuzzConfig, jobs: &mpsc::Sender<Job>) -> Result<(), FuzzError> {
    // File payloads go out ahead of the wordlist, once per (file, file key).
    let mut payload_files = Vec::with_capacity(config.filesystem_payloads.len());
    for path in &config.filesystem_payloads {
        payload_files.push(files::file_from(path, "")?);
    }
    for (file, file_key) in iproduct!(payload_files.iter(), config.target_file_keys.iter()) {
        send_file_job(config, file, file_key, jobs).await?;
    }

    if config.enable_generated_payloads {
        for file_type in files::supported_file_types() {
            let file = files::generate_file(file_type, config.fuzz_file_size, "")?;
            for file_key in &config.target_file_keys {
                send_file_job(config, &file, file_key, jobs).await?;
            }
        }
    }

    let mut words = config.wordlist.stream();
    while let Some(word) = words.recv().await {
        fuzz_headers(config, &word, jobs).await?;
        fuzz_url_params(config, &word, jobs).await?;
        fuzz_url_path_args(config, &word, jobs).await?;

        if config.fuzz_directory {
            fuzz_directory_root(config, &word, jobs).await?;
        }

        // Marker fuzzing would mangle a multipart body, so multipart seeds
        // take the form-field path instead.
        if config.seed.is_multipart_form() {
            fuzz_multipart_form_fields(config, &word, jobs).await?;
        } else {
            fuzz_text_body_sites(config, &word, jobs).await?;
        }
    }

    Ok(())
}

async fn send_file_job(
    config: &FuzzConfig,
    file: &FilePayload,
    file_key: &str,
    jobs: &mpsc::Sender<Job>,
) -> Result<(), FuzzError> {
    let mut request = config.seed.clone_body();
    request.replace_multipart_file_data(file_key, file)?;
    let _ = jobs
        .send(Job {
            request,
            field_name: file_key.to_string(),
            location: Location::Body,
            payload: file.name.clone(),
        })
        .await;
    Ok(())
}

async fn fuzz_headers(
    config: &FuzzConfig,
    word: &str,
    jobs: &mpsc::Sender<Job>,
) -> Result<(), FuzzError> {
    for header in &config.target_headers {
        let mut request = config.seed.clone_body();
        request.set_header(header, word)?;
        request.remove_delimiters(config.target_delimiter);
        let _ = jobs
            .send(Job {
                request,
                field_name: header.clone(),
                location: Location::Header,
                payload: word.to_string(),
            })
            .await;
    }
    Ok(())
}

async fn fuzz_url_params(
    config: &FuzzConfig,
    word: &str,
    jobs: &mpsc::Sender<Job>,
) -> Result<(), FuzzError> {
    for param in &config.target_params {
        let mut request = config.seed.clone_body();
        request.set_query_param(param, word);
        request.remove_delimiters(config.target_delimiter);
        let _ = jobs
            .send(Job {
                request,
                field_name: param.clone(),
                location: Location::UrlParam,
                payload: word.to_string(),
            })
            .await;
    }
    Ok(())
}

async fn fuzz_url_path_args(
    config: &FuzzConfig,
    word: &str,
    jobs: &mpsc::Sender<Job>,
) -> Result<(), FuzzError> {
    for arg in &config.target_path_args {
        let mut request = config.seed.clone_body();
        request.set_url_path_argument(arg, word);
        request.remove_delimiters(config.target_delimiter);
        let _ = jobs
            .send(Job {
                request,
                field_name: arg.clone(),
                location: Location::UrlPathArg,
                payload: word.to_string(),
            })
            .await;
    }
    Ok(())
}

async fn fuzz_directory_root(
    config: &FuzzConfig,
    word: &str,
    jobs: &mpsc::Sender<Job>,
) -> Result<(), FuzzError> {
    let mut request = config.seed.clone_body();
    request.set_directory_root(word);
    request.remove_delimiters(config.target_delimiter);
    let _ = jobs
        .send(Job {
            request,
            field_name: DIRECTORY_ROOT_FIELD.to_string(),
            location: Location::UrlDirectoryRoot,
            payload: word.to_string(),
        })
        .await;
    Ok(())
}

async fn fuzz_multipart_form_fields(
    config: &FuzzConfig,
    word: &str,
    jobs: &mpsc::Sender<Job>,
) -> Result<(), FuzzError> {
    for field_name in &config.target_multipart_field_names {
        let mut request = config.seed.clone_body();
        request.replace_multipart_field(field_name, word)?;
        let _ = jobs
            .send(Job {
                request,
                field_name: field_name.clone(),
                location: Location::Body,
                payload: word.to_string(),
            })
            .await;
    }
    Ok(())
}

async fn fuzz_text_body_sites(
    config: &FuzzConfig,
    word: &str,
    jobs: &mpsc::Sender<Job>,
) -> Result<(), FuzzError> {
    let target_count = config.seed.body_target_count(config.target_delimiter)?;
    for position in 0..target_count {
        let mut request = config.seed.clone_body();
        request.set_body_payload_at(position, config.target_delimiter, word)?;
        request.remove_delimiters(config.target_delimiter);
        let _ = jobs
            .send(Job {
                request,
                field_name: position.to_string(),
                location: Location::Body,
                payload: word.to_string(),
            })
            .await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH};
    use reqwest::{Method, Url};
    use std::path::PathBuf;

    fn seed(body: Option<&str>) -> Arc<Request> {
        let mut headers = HeaderMap::new();
        if let Some(body) = body {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len() as u64));
        }
        Arc::new(Request {
            method: Method::GET,
            url: Url::parse("http://localhost:8000/api/user").unwrap(),
            headers,
            body: body.map(|body| body.as_bytes().to_vec()),
        })
    }

    async fn wordlist_fixture(name: &str) -> (Arc<Wordlist>, PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "reqbuster_fuzzer_{}_{}.txt",
            name,
            std::process::id()
        ));
        std::fs::write(&path, "one\ntwo\nthree\nfour\nfive").unwrap();
        let wordlist = Arc::new(Wordlist::open(&path).await.unwrap());
        (wordlist, path)
    }

    fn base_config(seed: Arc<Request>, wordlist: Arc<Wordlist>) -> FuzzConfig {
        FuzzConfig {
            seed,
            wordlist,
            target_headers: vec![
                "Host".to_string(),
                "Pragma".to_string(),
                "User-Agent".to_string(),
            ],
            target_params: vec!["fuzz".to_string()],
            target_path_args: Vec::new(),
            target_file_keys: Vec::new(),
            target_multipart_field_names: Vec::new(),
            filesystem_payloads: Vec::new(),
            fuzz_directory: true,
            fuzz_file_size: 1024,
            enable_generated_payloads: false,
            target_delimiter: b'*',
        }
    }

    async fn drain_jobs(fuzzer: &Fuzzer) -> Vec<Job> {
        let (mut jobs, mut errors) = fuzzer.generate_requests();
        let mut out = Vec::new();
        while let Some(job) = jobs.recv().await {
            out.push(job);
        }
        assert!(errors.recv().await.is_none());
        out
    }

    #[tokio::test]
    async fn count_for_a_simple_get() {
        let (wordlist, path) = wordlist_fixture("simple_get").await;
        let mut config = base_config(seed(None), wordlist);
        config.target_path_args = vec!["user".to_string()];

        let fuzzer = Fuzzer::new(config);
        // 5 words * (3 headers + 1 param + 1 path arg + 1 directory root)
        assert_eq!(fuzzer.request_count().await.unwrap(), 30);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn generator_emits_exactly_the_counted_jobs() {
        let (wordlist, path) = wordlist_fixture("generator").await;
        let mut config = base_config(seed(None), wordlist);
        config.target_path_args = vec!["user".to_string()];

        let fuzzer = Fuzzer::new(config);
        let expected = fuzzer.request_count().await.unwrap();
        let jobs = drain_jobs(&fuzzer).await;
        assert_eq!(jobs.len(), expected);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn count_for_a_marker_body_post() {
        let (wordlist, path) = wordlist_fixture("marker_body").await;
        let config = base_config(
            seed(Some("{\"type\": \"*body*\", \"second\": \"*value*\"}")),
            wordlist,
        );

        let fuzzer = Fuzzer::new(config);
        // 5 words * (3 headers + 1 param + 1 directory root + 2 body sites)
        let expected = fuzzer.request_count().await.unwrap();
        assert_eq!(expected, 35);

        let jobs = drain_jobs(&fuzzer).await;
        assert_eq!(jobs.len(), expected);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn body_jobs_carry_the_site_index_and_mutated_body() {
        let (wordlist, path) = wordlist_fixture("body_jobs").await;
        let mut config = base_config(
            seed(Some("{\"type\": \"*body*\", \"second\": \"*value*\"}")),
            wordlist,
        );
        config.target_headers = Vec::new();
        config.target_params = Vec::new();
        config.fuzz_directory = false;

        let fuzzer = Fuzzer::new(config);
        let jobs = drain_jobs(&fuzzer).await;

        let first = jobs
            .iter()
            .find(|job| job.payload == "one" && job.field_name == "0")
            .expect("site 0 job for first word");
        assert_eq!(first.location, Location::Body);
        assert_eq!(
            first.request.body.as_deref(),
            Some(b"{\"type\": \"one\", \"second\": \"value\"}".as_ref())
        );

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn unbalanced_seed_body_surfaces_on_the_error_channel() {
        let (wordlist, path) = wordlist_fixture("unbalanced").await;
        let mut config = base_config(seed(Some("{\"type\": \"*body\"}")), wordlist);
        config.target_headers = Vec::new();
        config.target_params = Vec::new();
        config.fuzz_directory = false;

        let fuzzer = Fuzzer::new(config);
        let (mut jobs, mut errors) = fuzzer.generate_requests();
        let mut received = 0;
        while jobs.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 0);
        assert!(matches!(
            errors.recv().await,
            Some(FuzzError::Request(_))
        ));

        std::fs::remove_file(&path).ok();
    }
}
