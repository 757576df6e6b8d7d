use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use fitrag_cli::{init_tracing, load_config};
use fitrag_core::types::QueryInput;
use fitrag_vector::StructuredSearchEngine;

#[derive(Parser, Debug)]
#[command(name = "fitrag-match", about = "Find fitness records similar to a user's measurements")]
struct Cli {
    /// JSON file shaped like `{"user": {...}, "measurements": {...}}`
    #[arg(long)]
    input: PathBuf,

    /// Number of records to return; defaults to `retrieval.structured_top_k`
    #[arg(long)]
    top_k: Option<usize>,

    /// Print matches as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config()?;
    let top_k = cli.top_k.unwrap_or(config.settings()?.retrieval.structured_top_k);

    let raw = fs::read_to_string(&cli.input).with_context(|| format!("failed to read {}", cli.input.display()))?;
    let input: QueryInput = serde_json::from_str(&raw).with_context(|| format!("{} is not a valid request", cli.input.display()))?;

    let engine = StructuredSearchEngine::from_config(&config)?;
    let matches = engine.search(&input.user, &input.measurements, top_k).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }
    println!("Found {} similar records", matches.len());
    for (i, m) in matches.iter().enumerate() {
        println!(
            "\n  {}. similarity={:.4}  row={}  sex={}  age={}  source={}",
            i + 1,
            m.score,
            m.row_id,
            m.sex.as_deref().unwrap_or("-"),
            m.age.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()),
            m.source
        );
        println!("     {}", m.prescription_text);
    }
    Ok(())
}
