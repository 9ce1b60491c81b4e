use std::process::exit;

use clap::Parser;
use colored::Colorize;

use reqbuster::app;
use reqbuster::cli::args::CliArgs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    if let Err(error) = app::run(args).await {
        eprintln!(
            "{}{}{} {}",
            "[".bold().white(),
            "ERR".bold().red(),
            "]".bold().white(),
            error.bold().white()
        );
        exit(1);
    }
}
