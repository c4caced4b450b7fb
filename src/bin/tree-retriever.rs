//! Tree Retriever command line
//!
//! `build` indexes a text file into a persisted tree, `query` answers a
//! question from a persisted tree.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tree_retriever::{
    config::Config,
    embedding::EmbeddingGateway,
    observability::init_observability,
    tree::{RetrievalOptions, Tree, TreeBuilder, TreeRetriever},
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (or `CONFIG_PATH`); built-in offline defaults when omitted
    #[clap(short, long)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a tree from a text file and save it
    Build {
        input: PathBuf,
        #[clap(short, long, default_value = "tree.json")]
        output: PathBuf,
    },
    /// Retrieve context for a question from a saved tree
    Query {
        tree: PathBuf,
        question: String,
        /// Walk down from a layer instead of scoring all layers together
        #[clap(long)]
        traverse: bool,
        #[clap(long)]
        top_k: Option<usize>,
        #[clap(long)]
        start_layer: Option<usize>,
        #[clap(long)]
        num_layers: Option<usize>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(Config::default_config()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("CONFIG_PATH").map(PathBuf::from));
    let config = load_config(config_path.as_deref())?;

    init_observability(&config.logging.level, &config.logging.format)
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    let codec = config.persistence.codec.codec();

    match cli.command {
        Commands::Build { input, output } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;

            let builder = TreeBuilder::from_config(&config)?;
            let tree = builder.build_from_text(&text).await?;
            tree.save(&output, codec.as_ref())?;

            info!(
                "Indexed {} into {} nodes across {} layers",
                input.display(),
                tree.len(),
                tree.num_layers() + 1
            );
        }
        Commands::Query {
            tree,
            question,
            traverse,
            top_k,
            start_layer,
            num_layers,
        } => {
            let tree = Tree::load(&tree, codec.as_ref())?;
            let embeddings = EmbeddingGateway::from_config(&config.embedding, &config.retry)?;
            let retriever = TreeRetriever::new(&tree, &config.retriever, &embeddings)?;

            let defaults = retriever.defaults();
            let options = RetrievalOptions {
                collapse_tree: defaults.collapse_tree && !traverse,
                top_k: top_k.unwrap_or(defaults.top_k),
                start_layer: start_layer.or(defaults.start_layer),
                num_layers: num_layers.or(defaults.num_layers),
                ..defaults.clone()
            };

            let result = retriever.retrieve_with(&question, &options).await?;
            for node in &result.nodes {
                info!("node {} (layer {}) score {:.4}", node.id, node.layer, node.score);
            }
            println!("{}", result.context());
        }
    }

    Ok(())
}
