use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use indicatif::ProgressBar;
use reqwest::header::CONTENT_LENGTH;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::fuzzer::Job;
use crate::plugin::{Broker, FuzzResult};
use crate::request::{Request, Response};

#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(#[from] reqwest::Error);

/// An HTTP client that speaks the fuzzer's request and response types on top
/// of reqwest.
#[derive(Clone)]
pub struct Client {
    inner: reqwest::Client,
}

impl Client {
    pub fn new(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    pub async fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        let mut builder = self
            .inner
            .request(request.method.clone(), request.url.clone());

        // The body is authoritative; reqwest recomputes the length.
        let mut headers = request.headers.clone();
        headers.remove(CONTENT_LENGTH);
        builder = builder.headers(headers);

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

/// A counter the executor pre-loads with the oracle's request count; every
/// worker decrements it exactly once, success or transport failure alike.
pub(crate) struct WaitGroup {
    remaining: AtomicUsize,
    notify: Notify,
}

impl WaitGroup {
    fn new() -> Self {
        Self {
            remaining: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    fn add(&self, count: usize) {
        self.remaining.fetch_add(count, Ordering::AcqRel);
    }

    fn done(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }

    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.remaining.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Drains generated jobs and dispatches each on its own task, pacing
/// dispatches by the configured delay. Completed transactions fan out to
/// every plugin sink.
pub struct Executor {
    client: Client,
    url_scheme: String,
    request_delay: Duration,
    broker: Broker,
    wait_group: Arc<WaitGroup>,
    progress: ProgressBar,
}

impl Executor {
    pub fn new(
        client: Client,
        url_scheme: &str,
        request_delay: Duration,
        broker: Broker,
        progress: ProgressBar,
    ) -> Self {
        Self {
            client,
            url_scheme: url_scheme.to_string(),
            request_delay,
            broker,
            wait_group: Arc::new(WaitGroup::new()),
            progress,
        }
    }

    /// Pre-loads the completion counter. Must be called with the oracle's
    /// count before `process_requests`, which blocks until that many jobs
    /// have finished.
    pub fn wait_for(&self, requests: usize) {
        self.wait_group.add(requests);
    }

    /// Runs until the job channel closes and every in-flight worker has
    /// finished, then closes the plugin sinks.
    pub async fn process_requests(self, mut jobs: mpsc::Receiver<Job>) {
        let sinks = self.broker.senders();

        while let Some(job) = jobs.recv().await {
            let worker = Worker {
                client: self.client.clone(),
                url_scheme: self.url_scheme.clone(),
                sinks: sinks.clone(),
                wait_group: Arc::clone(&self.wait_group),
                progress: self.progress.clone(),
            };
            tokio::spawn(async move { worker.run(job).await });

            if !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
        }

        self.wait_group.wait().await;
        self.broker.close().await;
    }
}

struct Worker {
    client: Client,
    url_scheme: String,
    sinks: Vec<(String, mpsc::Sender<FuzzResult>)>,
    wait_group: Arc<WaitGroup>,
    progress: ProgressBar,
}

impl Worker {
    async fn run(self, mut job: Job) {
        let _ = job.request.url.set_scheme(&self.url_scheme);

        // Keep a copy of the request around for the plugins before the
        // transport consumes it.
        let replay = job.request.clone_body();

        let started = Instant::now();
        let response = match self.client.execute(&job.request).await {
            Ok(response) => response,
            Err(error) => {
                self.progress.println(format!(
                    "{} {}",
                    "request failed ::".bold().red(),
                    error
                ));
                self.progress.inc(1);
                self.wait_group.done();
                return;
            }
        };
        let time_elapsed = started.elapsed();

        self.progress.println(format!(
            "{} {} {} {}{}{} {} {}{}{}",
            "payload in".bold().white(),
            job.location.to_string().bold().white(),
            "field".bold().white(),
            "[".bold().white(),
            job.field_name.bold().cyan(),
            "]".bold().white(),
            job.payload.bold().blue(),
            "[".bold().white(),
            response.status.to_string().bold().green(),
            "]".bold().white(),
        ));
        self.progress.inc(1);

        for (name, sink) in &self.sinks {
            let result = FuzzResult {
                request: replay.clone_body(),
                response: response.clone_body(),
                payload: job.payload.clone(),
                location: job.location,
                field_name: job.field_name.clone(),
                time_elapsed,
            };
            if sink.send(result).await.is_err() {
                self.progress.println(format!(
                    "{} {}",
                    "plugin sink closed ::".bold().red(),
                    name
                ));
            }
        }

        self.wait_group.done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_group_releases_once_every_worker_is_done() {
        let wg = Arc::new(WaitGroup::new());
        wg.add(3);

        for _ in 0..3 {
            let wg = Arc::clone(&wg);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                wg.done();
            });
        }

        tokio::time::timeout(Duration::from_secs(1), wg.wait())
            .await
            .expect("wait group never drained");
    }

    #[tokio::test]
    async fn wait_group_with_zero_requests_returns_immediately() {
        let wg = WaitGroup::new();
        tokio::time::timeout(Duration::from_millis(50), wg.wait())
            .await
            .expect("empty wait group should not block");
    }
}
