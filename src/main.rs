use mnemo::cli::{Cli, Commands, ConfigAction};
use mnemo::config::Config;
use mnemo::engine::Engine;
use mnemo::error::{MnemoError, Result};
use mnemo::store::Scope;
use std::path::PathBuf;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse_args();

    let scope = match &cli.agent {
        Some(agent) => Scope::agent(cli.user.clone(), agent.clone()),
        None => Scope::user(cli.user.clone()),
    };

    match cli.command {
        Commands::Index { file, doc_id } => {
            cmd_index(cli.config, &scope, &file, doc_id).await?;
        }
        Commands::Query {
            query,
            k,
            owner,
            json,
        } => {
            cmd_query(cli.config, &scope, &query, k, owner, json).await?;
        }
        Commands::Rebuild => {
            cmd_rebuild(cli.config, &scope).await?;
        }
        Commands::Status => {
            cmd_status(cli.config, &scope).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mnemo=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'mnemo config init' to create one."
        );
        return Ok(Config::default());
    }

    Config::load(&path)
}

async fn cmd_index(
    config_path: Option<PathBuf>,
    scope: &Scope,
    file: &std::path::Path,
    doc_id: Option<String>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = Engine::open(&config)?;

    let bytes = std::fs::read(file).map_err(|e| MnemoError::Io {
        source: e,
        context: format!("Failed to read document: {}", file.display()),
    })?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();
    let doc_id = doc_id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    let added = engine
        .index_document(scope, &doc_id, &filename, "", &bytes)
        .await?;

    if added == 0 {
        println!("No indexable text found in {filename}");
    } else {
        println!("✓ Indexed {filename} into {scope} ({added} chunks)");
    }

    Ok(())
}

async fn cmd_query(
    config_path: Option<PathBuf>,
    scope: &Scope,
    query: &str,
    k: usize,
    owner: Option<String>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = Engine::open(&config)?;

    let hits = match engine.search(scope, query, k, owner.as_deref()).await {
        Ok(hits) => hits,
        Err(e) if e.is_not_found() => {
            println!("No documents indexed for {scope} yet.");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if json {
        let encoded = serde_json::to_string_pretty(&hits).map_err(|e| MnemoError::Json {
            source: e,
            context: "Failed to serialize search results".to_string(),
        })?;
        println!("{encoded}");
        return Ok(());
    }

    if hits.is_empty() {
        println!("No matching chunks for '{query}'.");
        return Ok(());
    }

    println!("Top {} results for '{}':", hits.len(), query);
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "  {}. [{:.3}] {} ({})",
            i + 1,
            hit.score,
            truncate(&hit.text, 120),
            hit.source_name
        );
    }

    Ok(())
}

async fn cmd_rebuild(config_path: Option<PathBuf>, scope: &Scope) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = Engine::open(&config)?;

    match engine.rebuild(scope).await {
        Ok(stats) => {
            println!("✓ Rebuilt index for {scope}");
            println!("  Candidate chunks: {}", stats.total_chunks);
            println!("  Unique chunks:    {}", stats.unique_chunks);
            println!("  Synthetic blocks: {}", stats.synthetic_items);
            Ok(())
        }
        Err(MnemoError::NothingToRebuild { .. }) => {
            println!("Nothing to rebuild for {scope}: no raw documents or synthetic memories.");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn cmd_status(config_path: Option<PathBuf>, scope: &Scope) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = Engine::open(&config)?;

    let chunks = engine.status(scope).await?;
    if chunks == 0 {
        println!("{scope}: no chunks indexed");
    } else {
        println!("{scope}: {chunks} chunks indexed");
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let encoded = toml::to_string_pretty(&config)?;
            println!("{encoded}");
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            Config::load(&path)?;
            println!("✓ Configuration is valid");
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            let config = Config::default();
            config.save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    let flattened = text.replace('\n', " ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    let cut: String = flattened.chars().take(max_chars).collect();
    format!("{cut}…")
}
