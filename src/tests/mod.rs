use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;

use crate::executor::{Client, Executor};
use crate::files;
use crate::fuzzer::{expected_count, FuzzConfig, Fuzzer, Location};
use crate::parser;
use crate::plugin::Broker;
use crate::request::multipart;
use crate::wordlist::Wordlist;

const MULTIPART_BOUNDARY: &str = "------------------------d74496d66958873e";

fn fixture_path(name: &str, extension: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "reqbuster_integration_{}_{}.{}",
        name,
        std::process::id(),
        extension
    ))
}

fn write_wordlist(name: &str) -> PathBuf {
    let path = fixture_path(name, "txt");
    std::fs::write(&path, "one\ntwo\nthree\nfour\nfive").unwrap();
    path
}

fn write_multipart_seed(name: &str) -> PathBuf {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"field\"\r\n\r\n");
    body.extend_from_slice(b"seed value\r\n");
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"seed.png\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(b"PNGDATA\r\n");
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    let mut raw = Vec::new();
    raw.extend_from_slice(b"POST /upload HTTP/1.1\r\n");
    raw.extend_from_slice(b"Host: localhost:8000\r\n");
    raw.extend_from_slice(
        format!("Content-Type: multipart/form-data; boundary={MULTIPART_BOUNDARY}\r\n").as_bytes(),
    );
    raw.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    raw.extend_from_slice(b"\r\n");
    raw.extend_from_slice(&body);

    let path = fixture_path(name, "request");
    std::fs::write(&path, raw).unwrap();
    path
}

fn write_payload_file(name: &str) -> PathBuf {
    let path = fixture_path(name, "php");
    std::fs::write(&path, "<?php echo phpinfo(); ?>").unwrap();
    path
}

async fn drain(fuzzer: &Fuzzer) -> Vec<crate::fuzzer::Job> {
    let (mut jobs, mut errors) = fuzzer.generate_requests();
    let mut out = Vec::new();
    while let Some(job) = jobs.recv().await {
        out.push(job);
    }
    assert!(errors.recv().await.is_none(), "generation errored");
    out
}

#[tokio::test]
async fn multipart_upload_count_matches_generated_jobs() {
    let seed_path = write_multipart_seed("upload_count");
    let wordlist_path = write_wordlist("upload_count");
    let payload_path = write_payload_file("upload_count");

    let seed = parser::request_from_file(&seed_path).unwrap();
    assert!(seed.is_multipart_form());

    let wordlist = Wordlist::open(&wordlist_path).await.unwrap();
    let config = FuzzConfig {
        seed: Arc::new(seed),
        wordlist: Arc::new(wordlist),
        target_headers: vec![
            "Host".to_string(),
            "Pragma".to_string(),
            "User-Agent".to_string(),
        ],
        target_params: vec!["fuzz".to_string()],
        target_path_args: Vec::new(),
        target_file_keys: vec!["file".to_string()],
        target_multipart_field_names: vec!["field".to_string()],
        filesystem_payloads: vec![payload_path.clone()],
        fuzz_directory: true,
        fuzz_file_size: 1024,
        enable_generated_payloads: true,
        target_delimiter: b'`',
    };

    let fuzzer = Fuzzer::new(config);
    let expected = fuzzer.request_count().await.unwrap();

    // 5 words across 3 headers, 1 param, 1 form field and the directory
    // root, plus one filesystem payload and one generated file per registry
    // entry against the single file key.
    let registry_size = files::supported_file_types().len();
    assert_eq!(expected, 5 * 3 + 5 + 5 + 5 + 1 + registry_size);

    let jobs = drain(&fuzzer).await;
    assert_eq!(jobs.len(), expected);

    std::fs::remove_file(&seed_path).ok();
    std::fs::remove_file(&wordlist_path).ok();
    std::fs::remove_file(&payload_path).ok();
}

#[tokio::test]
async fn count_matches_generator_across_configurations() {
    let wordlist_path = write_wordlist("matrix");
    let seed_path = fixture_path("matrix", "request");
    std::fs::write(
        &seed_path,
        b"POST /api/user HTTP/1.1\nHost: localhost:8000\nContent-Type: application/json\nContent-Length: 20\n\n{\"name\": \"`value`\"}",
    )
    .unwrap();

    let seed = Arc::new(parser::request_from_file(&seed_path).unwrap());

    // Sweep header/param/path-arg/dirbuster combinations and hold the oracle
    // to the generator for each.
    for headers in [0usize, 2] {
        for params in [0usize, 1] {
            for dirbuster in [false, true] {
                let wordlist = Wordlist::open(&wordlist_path).await.unwrap();
                let config = FuzzConfig {
                    seed: Arc::clone(&seed),
                    wordlist: Arc::new(wordlist),
                    target_headers: (0..headers).map(|i| format!("X-Fuzz-{i}")).collect(),
                    target_params: (0..params).map(|i| format!("param{i}")).collect(),
                    target_path_args: vec!["user".to_string()],
                    target_file_keys: Vec::new(),
                    target_multipart_field_names: Vec::new(),
                    filesystem_payloads: Vec::new(),
                    fuzz_directory: dirbuster,
                    fuzz_file_size: 64,
                    enable_generated_payloads: false,
                    target_delimiter: b'`',
                };

                let fuzzer = Fuzzer::new(config);
                let expected = fuzzer.request_count().await.unwrap();
                let jobs = drain(&fuzzer).await;
                assert_eq!(
                    jobs.len(),
                    expected,
                    "drift with headers={headers} params={params} dirbuster={dirbuster}"
                );
            }
        }
    }

    std::fs::remove_file(&seed_path).ok();
    std::fs::remove_file(&wordlist_path).ok();
}

#[tokio::test]
async fn expected_count_formula_spot_checks() {
    let seed_path = fixture_path("formula", "request");
    std::fs::write(
        &seed_path,
        b"GET /api/user HTTP/1.1\nHost: localhost:8000\n\n",
    )
    .unwrap();
    let seed = Arc::new(parser::request_from_file(&seed_path).unwrap());

    let config = FuzzConfig {
        seed,
        wordlist: Arc::new(Wordlist::empty()),
        target_headers: vec!["Host".to_string(), "Pragma".to_string()],
        target_params: vec!["q".to_string()],
        target_path_args: vec!["user".to_string()],
        target_file_keys: Vec::new(),
        target_multipart_field_names: Vec::new(),
        filesystem_payloads: Vec::new(),
        fuzz_directory: true,
        fuzz_file_size: 64,
        enable_generated_payloads: false,
        target_delimiter: b'`',
    };

    // words * (headers + params + path args + directory root)
    assert_eq!(expected_count(&config, 10).unwrap(), 10 * (2 + 1 + 1 + 1));
    assert_eq!(expected_count(&config, 0).unwrap(), 0);

    std::fs::remove_file(&seed_path).ok();
}

#[tokio::test]
async fn multipart_jobs_parse_under_the_original_boundary() {
    let seed_path = write_multipart_seed("boundary");
    let wordlist_path = write_wordlist("boundary");

    let seed = parser::request_from_file(&seed_path).unwrap();
    let wordlist = Wordlist::open(&wordlist_path).await.unwrap();

    let config = FuzzConfig {
        seed: Arc::new(seed),
        wordlist: Arc::new(wordlist),
        target_headers: Vec::new(),
        target_params: Vec::new(),
        target_path_args: Vec::new(),
        target_file_keys: Vec::new(),
        target_multipart_field_names: vec!["field".to_string()],
        filesystem_payloads: Vec::new(),
        fuzz_directory: false,
        fuzz_file_size: 64,
        enable_generated_payloads: false,
        target_delimiter: b'`',
    };

    let fuzzer = Fuzzer::new(config);
    let jobs = drain(&fuzzer).await;
    assert_eq!(jobs.len(), 5);

    for job in &jobs {
        assert_eq!(job.location, Location::Body);
        let body = job.request.body.as_deref().unwrap();
        let parts = multipart::parse(body, MULTIPART_BOUNDARY).unwrap();
        let mut names: Vec<String> = parts.iter().filter_map(|p| p.field_name()).collect();
        names.sort();
        assert_eq!(names, vec!["field".to_string(), "file".to_string()]);

        let field = parts
            .iter()
            .find(|p| p.field_name().as_deref() == Some("field"))
            .unwrap();
        assert_eq!(field.body, job.payload.as_bytes());

        // The untouched file part keeps its filename and content.
        let file = parts
            .iter()
            .find(|p| p.field_name().as_deref() == Some("file"))
            .unwrap();
        assert_eq!(file.body, b"PNGDATA");
    }

    std::fs::remove_file(&seed_path).ok();
    std::fs::remove_file(&wordlist_path).ok();
}

#[tokio::test]
async fn executor_drains_even_when_every_request_fails() {
    let seed_path = fixture_path("drain", "request");
    // Port 1 refuses connections, so every dispatch is a transport error;
    // the run must still complete because failed jobs release their
    // completion slot.
    std::fs::write(&seed_path, b"GET / HTTP/1.1\nHost: 127.0.0.1:1\n\n").unwrap();
    let wordlist_path = write_wordlist("drain");

    let seed = parser::request_from_file(&seed_path).unwrap();
    let wordlist = Wordlist::open(&wordlist_path).await.unwrap();

    let config = FuzzConfig {
        seed: Arc::new(seed),
        wordlist: Arc::new(wordlist),
        target_headers: vec!["User-Agent".to_string()],
        target_params: Vec::new(),
        target_path_args: Vec::new(),
        target_file_keys: Vec::new(),
        target_multipart_field_names: Vec::new(),
        filesystem_payloads: Vec::new(),
        fuzz_directory: false,
        fuzz_file_size: 64,
        enable_generated_payloads: false,
        target_delimiter: b'`',
    };

    let fuzzer = Fuzzer::new(config);
    let expected = fuzzer.request_count().await.unwrap();
    assert_eq!(expected, 5);

    let client = Client::new(reqwest::Client::new());
    let broker = Broker::new(Vec::new(), ProgressBar::hidden());
    let executor = Executor::new(
        client,
        "http",
        Duration::ZERO,
        broker,
        ProgressBar::hidden(),
    );
    executor.wait_for(expected);

    let (jobs, _errors) = fuzzer.generate_requests();
    tokio::time::timeout(Duration::from_secs(30), executor.process_requests(jobs))
        .await
        .expect("executor deadlocked waiting on failed requests");

    std::fs::remove_file(&seed_path).ok();
    std::fs::remove_file(&wordlist_path).ok();
}
