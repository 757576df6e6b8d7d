use anyhow::Result;
use clap::Parser;

use fitrag_cli::{init_tracing, load_config};
use fitrag_evidence::status_report;

#[derive(Parser, Debug)]
#[command(name = "fitrag-status", about = "Report which index builds are published")]
struct Cli {
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config()?;
    let report = status_report(&config)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for corpus in [&report.text, &report.structured] {
        println!("{} ({})", corpus.corpus, corpus.store);
        match (&corpus.build_id, &corpus.error) {
            (_, Some(err)) => println!("  error: {}", err),
            (Some(id), None) => {
                println!("  build:   {}", id);
                println!("  model:   {}", corpus.model.as_deref().unwrap_or("-"));
                println!("  vectors: {}", corpus.vector_count.unwrap_or(0));
                println!("  built:   {}", corpus.built_at.as_deref().unwrap_or("-"));
            }
            (None, None) => println!("  not built; run fitrag-indexer"),
        }
    }
    Ok(())
}
