use anyhow::Result;
use clap::Parser;

use fitrag_cli::{init_tracing, load_config};
use fitrag_embed::get_default_provider;
use fitrag_vector::TextSearchEngine;

#[derive(Parser, Debug)]
#[command(name = "fitrag-search", about = "Query the guideline-text index")]
struct Cli {
    /// Free-text query
    query: String,

    /// Number of chunks to return; defaults to `retrieval.text_k`
    #[arg(short, long)]
    k: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config()?;
    let settings = config.settings()?;
    let k = cli.k.unwrap_or(settings.retrieval.text_k);

    let provider = get_default_provider(&settings.embedding)?;
    let engine = TextSearchEngine::from_config(&config, provider)?;
    let hits = engine.search(&cli.query, k).await?;

    println!("Found {} results for: \"{}\"", hits.len(), cli.query);
    for hit in &hits {
        println!("\n  {}. distance={:.4}  chunk={}", hit.rank, hit.score, hit.id);
        println!("     {}", hit.text.replace('\n', "\n     "));
    }
    Ok(())
}
