use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(delimiter) = args.target_delimiter.as_deref() {
        if delimiter.len() != 1 {
            return Err("invalid target-delimiter, expected a single byte".to_string());
        }
    }
    if let Some(size) = args.fuzz_file_size {
        if size == 0 {
            return Err("invalid fuzz-file-size, expected a positive size".to_string());
        }
    }
    if let Some(proxy) = args.proxy_url.as_deref() {
        if !proxy.trim().is_empty() && reqwest::Url::parse(proxy.trim()).is_err() {
            return Err(format!("invalid proxy-url '{proxy}'"));
        }
    }
    Ok(())
}
