use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::runner::{Options, Runner};

fn print_banner() {
    const BANNER: &str = r#"
                     __               __
   ________  ____ _/ /_  __  _______/ /____  _____
  / ___/ _ \/ __ `/ __ \/ / / / ___/ __/ _ \/ ___/
 / /  /  __/ /_/ / /_/ / /_/ (__  ) /_/  __/ /
/_/   \___/\__, /_.___/\__,_/____/\__/\___/_/
             /_/
       v0.1.0 - seed-request fuzzing tool
    "#;
    print!("{}", BANNER);
    println!();
}

fn merge_string(cli: Option<String>, file: Option<String>) -> String {
    cli.or(file).unwrap_or_default()
}

fn merge_opt(cli: Option<String>, file: Option<String>) -> Option<String> {
    cli.or(file).filter(|value| !value.trim().is_empty())
}

fn merge_list(cli: Vec<String>, file: Option<Vec<String>>) -> Vec<String> {
    if !cli.is_empty() {
        return cli;
    }
    file.unwrap_or_default()
}

fn merge_flag(cli: bool, file: Option<bool>) -> bool {
    cli || file.unwrap_or(false)
}

fn parse_delimiter(value: &str) -> Result<u8, String> {
    let bytes = value.as_bytes();
    if bytes.len() != 1 {
        return Err("invalid target-delimiter, expected a single byte".to_string());
    }
    Ok(bytes[0])
}

/// Merges CLI flags over the config file into core Options. CLI wins; the
/// file fills in whatever was not given.
fn build_options(args: &CliArgs, file: ConfigFile) -> Result<Options, String> {
    let delimiter = match args
        .target_delimiter
        .clone()
        .or(file.target_delimiter)
        .filter(|value| !value.is_empty())
    {
        Some(value) => parse_delimiter(&value)?,
        None => b'`',
    };

    let seed_request = merge_string(args.seed_request.clone(), file.seed_request);
    let wordlist = merge_string(args.wordlist.clone(), file.wordlist);
    let seed_request = config::expand_tilde_string(&seed_request);
    let wordlist = config::expand_tilde_string(&wordlist);

    Ok(Options {
        seed_request,
        wordlist,
        target_headers: merge_list(args.target_header.clone(), file.target_headers),
        target_params: merge_list(args.target_param.clone(), file.target_params),
        target_path_args: merge_list(args.target_path_arg.clone(), file.target_path_args),
        target_delimiter: delimiter,
        multipart_file_keys: merge_list(
            args.multipart_file_name.clone(),
            file.multipart_file_names,
        ),
        multipart_form_names: merge_list(
            args.multipart_form_name.clone(),
            file.multipart_form_names,
        ),
        fuzz_file_size: args.fuzz_file_size.or(file.fuzz_file_size).unwrap_or(1024),
        payload_dir: merge_opt(args.payload_dir.clone(), file.payload_dir)
            .map(|dir| config::expand_tilde_string(&dir)),
        automatic_file_payloads: merge_flag(
            args.automatic_file_payloads,
            file.automatic_file_payloads,
        ),
        fuzz_directory: merge_flag(args.dirbuster, file.dirbuster),
        https: merge_flag(args.https, file.https),
        skip_cert_verify: merge_flag(args.skip_cert_verify, file.skip_cert_verify),
        proxy_url: merge_opt(args.proxy_url.clone(), file.proxy_url),
        proxy_ca_pem: merge_opt(args.proxy_ca_pem.clone(), file.proxy_ca_pem)
            .map(|path| config::expand_tilde_string(&path)),
        request_delay: Duration::from_millis(args.delay_ms.or(file.delay_ms).unwrap_or(0)),
        count_only: args.count_only,
        plugins: merge_list(args.plugin.clone(), file.plugins),
        plugin_args: merge_list(args.plugin_arg.clone(), file.plugin_args),
    })
}

fn build_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} {elapsed} ({len}) {pos} {per_sec}")
    {
        pb.set_style(style.progress_chars(r#"#>-"#));
    }
    pb
}

pub async fn run(args: CliArgs) -> Result<(), String> {
    let config_path = match args.config.as_deref() {
        Some(path) => Some(PathBuf::from(config::expand_tilde_string(path))),
        None => config::default_config_path(),
    };

    let file = match &config_path {
        Some(path) => {
            // Only auto-create the default config; an explicit --config that
            // does not exist is an error.
            let explicit = args.config.is_some();
            if !explicit {
                config::ensure_default_config_file(path).ok();
            }
            config::load_config(path, !explicit)?
        }
        None => ConfigFile::default(),
    };

    let no_color = args.no_color || file.no_color.unwrap_or(false);
    if no_color {
        colored::control::set_override(false);
    }

    print_banner();

    validation::validate(&args)?;
    let options = build_options(&args, file)?;

    let pb = build_progress_bar();
    let runner = Runner::new(options).map_err(|e| e.to_string())?;
    let summary = runner.run(pb.clone()).await.map_err(|e| e.to_string())?;
    pb.finish_and_clear();

    if summary.dispatched {
        println!(
            "\n{} {} {}{}",
            "Completed!".bold().green(),
            "fuzzing took".bold().white(),
            summary.elapsed.as_secs().to_string().bold().white(),
            "s".bold().white()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_flags_override_config_values() {
        let args = CliArgs::parse_from([
            "reqbuster",
            "--sr",
            "./cli.request",
            "--wl",
            "./cli.txt",
            "--th",
            "User-Agent",
            "--td",
            "*",
        ]);
        let file = ConfigFile {
            seed_request: Some("./file.request".to_string()),
            wordlist: Some("./file.txt".to_string()),
            target_headers: Some(vec!["Host".to_string()]),
            target_delimiter: Some("`".to_string()),
            ..ConfigFile::default()
        };

        let options = build_options(&args, file).unwrap();
        assert_eq!(options.seed_request, "./cli.request");
        assert_eq!(options.wordlist, "./cli.txt");
        assert_eq!(options.target_headers, vec!["User-Agent".to_string()]);
        assert_eq!(options.target_delimiter, b'*');
    }

    #[test]
    fn config_fills_in_missing_flags() {
        let args = CliArgs::parse_from(["reqbuster"]);
        let file = ConfigFile {
            seed_request: Some("./file.request".to_string()),
            wordlist: Some("./file.txt".to_string()),
            dirbuster: Some(true),
            delay_ms: Some(250),
            ..ConfigFile::default()
        };

        let options = build_options(&args, file).unwrap();
        assert_eq!(options.seed_request, "./file.request");
        assert!(options.fuzz_directory);
        assert_eq!(options.request_delay, Duration::from_millis(250));
        assert_eq!(options.target_delimiter, b'`');
        assert_eq!(options.fuzz_file_size, 1024);
    }

    #[test]
    fn delimiter_must_be_one_byte() {
        let args = CliArgs::parse_from(["reqbuster", "--td", "ab"]);
        assert!(build_options(&args, ConfigFile::default()).is_err());
    }
}
