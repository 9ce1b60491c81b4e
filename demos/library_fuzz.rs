use indicatif::ProgressBar;
use reqbuster::runner::{Options, Runner};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let seed = concat!(
        "POST /api/search HTTP/1.1\n",
        "Host: localhost:8000\n",
        "Content-Type: application/json\n",
        "Content-Length: 18\n",
        "\n",
        "{\"query\": \"`term`\"}"
    );

    let seed_path = std::env::temp_dir().join(format!(
        "reqbuster_demo_seed_{}.request",
        std::process::id()
    ));
    std::fs::write(&seed_path, seed)?;

    let wordlist_path = std::env::temp_dir().join(format!(
        "reqbuster_demo_wordlist_{}.txt",
        std::process::id()
    ));
    std::fs::write(&wordlist_path, "admin\n' OR 1=1--\n<script>")?;

    let runner = Runner::new(Options {
        seed_request: seed_path.to_string_lossy().to_string(),
        wordlist: wordlist_path.to_string_lossy().to_string(),
        target_headers: vec!["User-Agent".to_string()],
        target_params: vec!["q".to_string()],
        count_only: true,
        ..Options::default()
    })?;

    let summary = runner.run(ProgressBar::hidden()).await?;
    println!("would send {} requests", summary.requests_planned);

    std::fs::remove_file(&seed_path).ok();
    std::fs::remove_file(&wordlist_path).ok();
    Ok(())
}
