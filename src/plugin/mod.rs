use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;
use indicatif::ProgressBar;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::fuzzer::Location;
use crate::request::{Request, Response};

const SINK_DEPTH: usize = 1024;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("unknown plugin '{name}'")]
    Unknown { name: String },

    #[error("plugin '{name}' failed to initialize: {message}")]
    Init { name: String, message: String },

    #[error("plugin '{name}' failed: {message}")]
    Runtime { name: String, message: String },
}

/// One request/response transaction handed to every plugin, with independent
/// body copies so a plugin can drain them freely.
#[derive(Debug)]
pub struct FuzzResult {
    pub request: Request,
    pub response: Response,
    pub payload: String,
    pub location: Location,
    pub field_name: String,
    pub time_elapsed: Duration,
}

/// Shared environment handed to plugins at startup.
#[derive(Clone)]
pub struct PluginEnv {
    pub args: Vec<String>,
    pub progress: ProgressBar,
}

/// An analysis plugin. Each plugin gets its own buffered sink of results and
/// consumes them in its own task until the executor closes the sink.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn initialize(&mut self, env: &PluginEnv) -> Result<(), PluginError>;

    async fn handle(&self, result: &FuzzResult) -> Result<(), PluginError>;
}

/// Resolves plugin names against the built-in registry and initializes them.
/// Discovery is deliberately a static registry here; dlopen/WASM/subprocess
/// adapters can wrap the same trait.
pub fn load_plugins(
    names: &[String],
    env: &PluginEnv,
) -> Result<Vec<Box<dyn Plugin>>, PluginError> {
    let mut plugins: Vec<Box<dyn Plugin>> = Vec::with_capacity(names.len());
    for name in names {
        let mut plugin: Box<dyn Plugin> = match name.as_str() {
            "status-log" => Box::new(StatusLogPlugin::new()),
            "file-uploaded" => Box::new(FileUploadedPlugin::new()),
            _ => {
                return Err(PluginError::Unknown {
                    name: name.clone(),
                })
            }
        };
        plugin.initialize(env)?;
        plugins.push(plugin);
    }
    Ok(plugins)
}

struct PluginSink {
    name: String,
    tx: mpsc::Sender<FuzzResult>,
    listener: JoinHandle<()>,
}

/// The broker owns one buffered sink per plugin and a listener task draining
/// each. A slow plugin backs up its own sink and therefore the executor's
/// result fan-out, never HTTP dispatch itself.
pub struct Broker {
    sinks: Vec<PluginSink>,
}

impl Broker {
    pub fn new(plugins: Vec<Box<dyn Plugin>>, progress: ProgressBar) -> Self {
        let mut sinks = Vec::with_capacity(plugins.len());
        for plugin in plugins {
            let (tx, mut rx) = mpsc::channel::<FuzzResult>(SINK_DEPTH);
            let name = plugin.name().to_string();
            let plugin: Arc<dyn Plugin> = Arc::from(plugin);
            let pb = progress.clone();
            let listener = tokio::spawn(async move {
                while let Some(result) = rx.recv().await {
                    if let Err(error) = plugin.handle(&result).await {
                        pb.println(format!(
                            "{} {}",
                            "plugin error ::".bold().red(),
                            error
                        ));
                    }
                }
            });
            sinks.push(PluginSink { name, tx, listener });
        }
        Self { sinks }
    }

    /// Sender handles for the executor's fan-out, one per plugin.
    pub fn senders(&self) -> Vec<(String, mpsc::Sender<FuzzResult>)> {
        self.sinks
            .iter()
            .map(|sink| (sink.name.clone(), sink.tx.clone()))
            .collect()
    }

    /// Closes every sink and waits for the listeners to drain.
    pub async fn close(self) {
        for sink in self.sinks {
            drop(sink.tx);
            let _ = sink.listener.await;
        }
    }
}

/// Logs every transaction's status code, colored by status class. The
/// poor man's Burp Intruder results table.
pub struct StatusLogPlugin {
    progress: Option<ProgressBar>,
}

impl StatusLogPlugin {
    pub fn new() -> Self {
        Self { progress: None }
    }
}

impl Default for StatusLogPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for StatusLogPlugin {
    fn name(&self) -> &str {
        "status-log"
    }

    fn initialize(&mut self, env: &PluginEnv) -> Result<(), PluginError> {
        self.progress = Some(env.progress.clone());
        Ok(())
    }

    async fn handle(&self, result: &FuzzResult) -> Result<(), PluginError> {
        let Some(pb) = &self.progress else {
            return Ok(());
        };
        let status = result.response.status.to_string();
        let status = match result.response.status {
            100..=199 => status.bold().purple(),
            200..=299 => status.bold().green(),
            300..=399 => status.bold().cyan(),
            400..=499 => status.bold().blue(),
            _ => status.bold().red(),
        };
        pb.println(format!(
            "{}{}{} {}{}{} {} {} {} {} {}",
            "[".bold().white(),
            status,
            "]".bold().white(),
            "[".bold().white(),
            result.request.url.as_str().bold().cyan(),
            "]".bold().white(),
            result.location.to_string().bold().white(),
            result.field_name.bold().white(),
            "<-".bold().white(),
            result.payload.bold().blue(),
            format!("({}ms)", result.time_elapsed.as_millis()).dimmed(),
        ));
        Ok(())
    }
}

/// Flags responses that echo an uploaded payload file name, a strong hint
/// that the upload was stored somewhere retrievable.
pub struct FileUploadedPlugin {
    progress: Option<ProgressBar>,
}

impl FileUploadedPlugin {
    pub fn new() -> Self {
        Self { progress: None }
    }
}

impl Default for FileUploadedPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for FileUploadedPlugin {
    fn name(&self) -> &str {
        "file-uploaded"
    }

    fn initialize(&mut self, env: &PluginEnv) -> Result<(), PluginError> {
        self.progress = Some(env.progress.clone());
        Ok(())
    }

    async fn handle(&self, result: &FuzzResult) -> Result<(), PluginError> {
        if result.location != Location::Body {
            return Ok(());
        }
        let needle = result.payload.as_bytes();
        if needle.is_empty() {
            return Ok(());
        }
        let found = result
            .response
            .body
            .windows(needle.len())
            .any(|window| window == needle);
        if found {
            if let Some(pb) = &self.progress {
                pb.println(format!(
                    "{} {} {}",
                    "possible stored upload ::".bold().green(),
                    result.payload.bold().blue(),
                    format!("(field {})", result.field_name).bold().white(),
                ));
            }
        }
        Ok(())
    }
}
