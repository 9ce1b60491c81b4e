use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// Persistent configuration, merged under the CLI flags so repeat runs stay
/// short.
#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ConfigFile {
    pub seed_request: Option<String>,
    pub wordlist: Option<String>,
    pub target_headers: Option<Vec<String>>,
    pub target_params: Option<Vec<String>>,
    pub target_path_args: Option<Vec<String>>,
    pub target_delimiter: Option<String>,
    pub multipart_file_names: Option<Vec<String>>,
    pub multipart_form_names: Option<Vec<String>>,
    pub fuzz_file_size: Option<u64>,
    pub payload_dir: Option<String>,
    pub automatic_file_payloads: Option<bool>,
    pub dirbuster: Option<bool>,
    pub https: Option<bool>,
    pub skip_cert_verify: Option<bool>,
    pub proxy_url: Option<String>,
    pub proxy_ca_pem: Option<String>,
    pub delay_ms: Option<u64>,
    pub plugins: Option<Vec<String>>,
    pub plugin_args: Option<Vec<String>>,
    pub no_color: Option<bool>,
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".reqbuster").join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn expand_tilde_string(path: &str) -> String {
    expand_tilde(path).to_string_lossy().to_string()
}

pub fn load_config(path: &PathBuf, allow_missing: bool) -> Result<ConfigFile, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str::<ConfigFile>(&contents)
            .map_err(|e| format!("failed to parse config '{}': {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("config file not found '{}'", path.display()))
        }
        Err(e) => Err(format!("failed to read config '{}': {e}", path.display())),
    }
}

fn default_config_yaml() -> String {
    r#"# Reqbuster config
#
# Location (default):
#   ~/.reqbuster/config.yml

# Input (choose on the CLI or persist here)
# seed_request: ./seed.request
# wordlist: ./wordlists/payloads.txt

# Targets
# target_headers:
#   - User-Agent
# target_params:
#   - q
# target_path_args:
#   - user
# target_delimiter: "`"

# Multipart
# multipart_file_names:
#   - file
# multipart_form_names:
#   - field
fuzz_file_size: 1024
# payload_dir: ./payloads
automatic_file_payloads: false

# Scan
dirbuster: false

# HTTP
https: false
skip_cert_verify: false
# proxy_url: http://127.0.0.1:8080
# proxy_ca_pem: ./burp-ca.pem
delay_ms: 0

# Plugins
# plugins:
#   - status-log
# plugin_args: []

# Output styling
no_color: false
"#
    .to_string()
}

pub fn ensure_default_config_file(path: &PathBuf) -> Result<(), String> {
    if path.exists() {
        return Ok(());
    }
    let parent = path
        .parent()
        .ok_or_else(|| format!("invalid config path '{}'", path.display()))?;
    std::fs::create_dir_all(parent).map_err(|e| {
        format!(
            "failed to create config directory '{}': {e}",
            parent.display()
        )
    })?;
    let contents = default_config_yaml();
    std::fs::write(path, contents)
        .map_err(|e| format!("failed to write config file '{}': {e}", path.display()))?;
    Ok(())
}
