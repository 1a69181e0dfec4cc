use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use docfind_core::cache::{self, CachePaths};
use docfind_core::config::{default_accounts, SearchSettings};
use docfind_core::indexer::ProgressFn;
use docfind_core::{AuthManager, DocumentExtractor, SearchHit, SearchIndexer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "docfind")]
#[command(about = "Index and search office documents in a folder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or refresh the search index for a directory
    Index {
        /// Directory to index
        dir: PathBuf,
        /// Only index the top level, not subdirectories
        #[arg(long, default_value_t = false)]
        no_recursive: bool,
        /// Suppress per-file progress output
        #[arg(long, default_value_t = false)]
        quiet: bool,
    },
    /// Search a previously indexed directory
    Search {
        /// Indexed directory
        dir: PathBuf,
        /// Query string (two characters minimum)
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// Match file names only, skipping content
        #[arg(long, default_value_t = false)]
        filename_only: bool,
        /// Rebuild the in-memory index instead of reading the cache file
        #[arg(long, default_value_t = false)]
        memory: bool,
        /// Emit results as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show cache statistics for a directory
    Status {
        dir: PathBuf,
    },
    /// Validate credentials against the built-in account table
    Login {
        username: String,
        password: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Index {
            dir,
            no_recursive,
            quiet,
        } => cmd_index(&dir, !no_recursive, quiet),
        Commands::Search {
            dir,
            query,
            limit,
            filename_only,
            memory,
            json,
        } => cmd_search(&dir, &query, limit, filename_only, memory, json),
        Commands::Status { dir } => cmd_status(&dir),
        Commands::Login { username, password } => cmd_login(&username, &password),
    }
}

fn cmd_index(dir: &Path, recursive: bool, quiet: bool) -> Result<()> {
    let extractor = Arc::new(DocumentExtractor::default());
    let mut indexer = SearchIndexer::new(extractor);

    let print_progress = |path: &Path, pct: f32| {
        println!("[{pct:5.1}%] {}", path.display());
    };
    let progress: Option<&ProgressFn> = if quiet { None } else { Some(&print_progress) };

    let summary = indexer.index_directory(dir, recursive, progress)?;
    tracing::info!(dir = %dir.display(), indexed = summary.indexed, "indexing pass done");
    println!(
        "indexed {} files ({} unchanged, {} changed, {} new, {} deleted) in {:.2}s",
        summary.indexed,
        summary.unchanged,
        summary.changed,
        summary.new_files,
        summary.deleted,
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}

fn cmd_search(
    dir: &Path,
    query: &str,
    limit: usize,
    filename_only: bool,
    memory: bool,
    json: bool,
) -> Result<()> {
    let settings = SearchSettings::default();
    if query.trim().chars().count() < settings.min_query_len {
        bail!(
            "query must be at least {} characters",
            settings.min_query_len
        );
    }

    let paths = CachePaths::new(dir);
    let hits: Vec<SearchHit> = if memory {
        let extractor = Arc::new(DocumentExtractor::default());
        let mut indexer = SearchIndexer::new(extractor);
        indexer.index_directory(dir, true, None)?;
        indexer.index().search(query, limit)
    } else if filename_only {
        cache::search_cache_filenames(&paths, query, limit)
            .map_err(|err| anyhow::anyhow!("no usable cache ({err}); run `docfind index` first"))?
    } else {
        cache::search_cache(&paths, query, limit)
            .map_err(|err| anyhow::anyhow!("no usable cache ({err}); run `docfind index` first"))?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("no results for '{query}'");
        return Ok(());
    }
    for hit in &hits {
        println!(
            "{:6.2}  {}  ({}, {:.2} MB)",
            hit.score,
            hit.path.display(),
            hit.file_type,
            hit.size_mb
        );
        let preview = hit.preview.replace('\n', " ");
        if !preview.trim().is_empty() {
            println!("        {}", preview.trim());
        }
    }
    println!("{} result(s)", hits.len());
    Ok(())
}

fn cmd_status(dir: &Path) -> Result<()> {
    let stats = cache::cache_stats(&CachePaths::new(dir));
    if !stats.available {
        println!("no cache at {}", stats.cache_file.display());
        return Ok(());
    }
    println!("cache file:  {}", stats.cache_file.display());
    println!("files:       {}", stats.total_files);
    println!("size:        {:.2} MB", stats.size_mb);
    if let Some(modified) = &stats.modified {
        println!("modified:    {modified}");
    }
    Ok(())
}

fn cmd_login(username: &str, password: &str) -> Result<()> {
    let mut auth = AuthManager::new(default_accounts());
    let is_admin = match auth.authenticate(username, password) {
        Ok(session) => session.is_admin,
        Err(err) => bail!("login failed: {err}"),
    };
    if is_admin {
        println!("logged in as administrator {username}");
    } else if let Some(days) = auth.remaining_days() {
        println!("logged in as {username} ({days} days remaining)");
    } else {
        println!("logged in as {username}");
    }
    Ok(())
}
