use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fitrag_cli::{init_tracing, load_config};
use fitrag_embed::get_default_provider;
use fitrag_vector::{StructuredIndexBuilder, TextIndexBuilder};

#[derive(Parser, Debug)]
#[command(name = "fitrag-indexer", about = "Rebuild a retrieval index and publish it atomically")]
struct Cli {
    #[command(subcommand)]
    corpus: Corpus,
}

#[derive(Subcommand, Debug)]
enum Corpus {
    /// Chunk and embed the guideline corpus
    Text {
        /// Corpus JSON; defaults to `data.acsm_source`
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Fit the feature pipeline and index the fitness-record table
    Structured {
        /// Record JSON array; defaults to `data.structured_source`
        #[arg(long)]
        source: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config()?;
    let settings = config.settings()?;

    let report = match cli.corpus {
        Corpus::Text { source } => {
            let source = source.unwrap_or_else(|| config.resolve(&settings.data.acsm_source));
            println!("Rebuilding text index from {}", source.display());
            let provider = get_default_provider(&settings.embedding)?;
            TextIndexBuilder::from_config(&config, provider)?.rebuild(&source).await?
        }
        Corpus::Structured { source } => {
            let source = source.unwrap_or_else(|| config.resolve(&settings.data.structured_source));
            println!("Rebuilding structured index from {}", source.display());
            StructuredIndexBuilder::from_config(&config)?.rebuild(&source).await?
        }
    };

    tracing::info!(build_id = %report.build_id, vectors = report.vector_count, "index rebuild finished");
    println!("Published build {} ({} vectors, dim {})", report.build_id, report.vector_count, report.dim);
    println!("  {}", report.dir.display());
    Ok(())
}
