//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "mnemo",
    version,
    about = "Self-learning retrieval index for document question answering",
    long_about = "Mnemo turns document text into searchable, semantically-embedded chunks, \
                  serves nearest-neighbor lookups with ownership filtering, and adapts itself \
                  over time by writing back synthetic memory documents when retrieval quality \
                  is poor or a user corrects an answer."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/mnemo/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// User scope identifier
    #[arg(short, long, global = true, default_value = "default")]
    pub user: String,

    /// Agent scope identifier (addresses the agent's independent index)
    #[arg(short, long, global = true)]
    pub agent: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a document into the scope's collection
    Index {
        /// Path to the document file
        file: PathBuf,

        /// Document identifier (defaults to a random id)
        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Retrieve the most similar chunks for a query
    Query {
        /// Query text
        query: String,

        /// Maximum number of results to return
        #[arg(short, long, default_value = "5")]
        k: usize,

        /// Restrict results to one document or agent (ownership filter)
        #[arg(long)]
        owner: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the scope's collection from raw documents and synthetic memories
    Rebuild,

    /// Show how many chunks the scope has indexed
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
