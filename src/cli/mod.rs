//! CLI entry point.
//!
//! An `index`/`serve` pair plus a query-verb mirror of the HTTP gateway
//! (`wicked-search {verb} {source} [--project] [--limit] ...`), so the
//! same verb surface is reachable locally without a running daemon.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::config;
use crate::error::WickedError;
use crate::gateway::{self, AppState};
use crate::orchestrator::{self, IndexOptions};
use crate::query::{Direction, QueryEngine};
use crate::store::Store;

mod http_backend;
use http_backend::HttpQueryBackend;

#[derive(Parser, Debug)]
#[command(
    name = "wicked-search",
    about = "Structural code-and-document understanding engine",
    author = "wicked-garden developers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build or update the index for a project.
    Index(IndexArgs),
    /// Run the HTTP gateway.
    Serve(ServeArgs),
    /// `list(source)`: paginated enumeration of every indexed symbol.
    List(VerbArgs),
    /// `get(source, id)`: direct symbol lookup.
    Get(VerbArgs),
    /// `search(source, query)`: multi-tier ranked symbol search.
    Search(VerbArgs),
    /// `stats(source)`: aggregate counts and histograms.
    Stats(VerbArgs),
    /// `refs(id)`: references where the symbol is source or target.
    Refs(VerbArgs),
    /// `traverse(id, depth, direction)`: bounded BFS over the ref graph.
    Traverse(VerbArgs),
    /// `blast_radius(id, depth)`: depth-grouped upstream dependents.
    BlastRadius(VerbArgs),
    /// `hotspots(limit, filters)`: symbols ranked by total degree.
    Hotspots(VerbArgs),
    /// `lineage(symbol_name)`: precomputed UI-to-database paths.
    Lineage(VerbArgs),
    /// `service_map()`: merged infra + code-inferred service graph.
    ServiceMap(VerbArgs),
    /// `categories()`: folksonomy grouping with cross-category edges.
    Categories(VerbArgs),
    /// `impact(symbol_name)`: composed blast-radius + lineage report.
    Impact(VerbArgs),
    /// `content(id)`: source text slice for a symbol.
    Content(VerbArgs),
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Root directory to index (defaults to the current directory).
    #[arg(long = "root")]
    pub root: Option<PathBuf>,

    /// Project namespace; empty or "default" selects the legacy flat
    /// project.
    #[arg(long = "project")]
    pub project: Option<String>,

    /// Force a full re-index, discarding incremental state.
    #[arg(long = "full")]
    pub full: bool,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Root directory the gateway serves (defaults to the current
    /// directory).
    #[arg(long = "root")]
    pub root: Option<PathBuf>,

    /// Socket address to bind to.
    #[arg(long = "addr", default_value_t = default_addr())]
    pub addr: String,
}

fn default_addr() -> String {
    format!("127.0.0.1:{}", gateway::DEFAULT_PORT)
}

/// Shared arguments for every query-verb subcommand. Not every field
/// applies to every verb; unused fields are ignored (`get`/`content`
/// ignore `query`, `search`/`lineage`/`impact` ignore `id`, etc.).
#[derive(Args, Debug)]
pub struct VerbArgs {
    /// Source this query targets. Only "wicked-search" is implemented
    /// by this binary; present for parity with the HTTP gateway's
    /// `{plugin}/{source}/{verb}` surface.
    #[arg(default_value = "wicked-search")]
    pub source: String,

    /// Root directory the on-disk index lives under (defaults to the
    /// current directory).
    #[arg(long = "root")]
    pub root: Option<PathBuf>,

    #[arg(long = "project")]
    pub project: Option<String>,

    #[arg(long = "query")]
    pub query: Option<String>,

    #[arg(long = "id")]
    pub id: Option<String>,

    #[arg(long = "limit", default_value_t = crate::query::DEFAULT_LIMIT)]
    pub limit: u32,

    #[arg(long = "offset", default_value_t = 0)]
    pub offset: u32,

    #[arg(long = "depth")]
    pub depth: Option<u32>,

    #[arg(long = "direction", default_value = "both")]
    pub direction: String,

    #[arg(long = "layer")]
    pub layer: Option<String>,

    #[arg(long = "type")]
    pub symbol_type: Option<String>,

    /// Query a running gateway (e.g. "http://127.0.0.1:18889") instead of
    /// opening the on-disk store directly.
    #[arg(long = "remote")]
    pub remote: Option<String>,
}

/// Entry point for the CLI binary. Returns a process exit code:
/// 0 success, 1 not found, 2 bad input, 3 internal error.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Index(args)) => run_index(args),
        Some(Commands::Serve(args)) => run_serve(args),
        Some(Commands::List(args)) => run_verb("list", args),
        Some(Commands::Get(args)) => run_verb("get", args),
        Some(Commands::Search(args)) => run_verb("search", args),
        Some(Commands::Stats(args)) => run_verb("stats", args),
        Some(Commands::Refs(args)) => run_verb("refs", args),
        Some(Commands::Traverse(args)) => run_verb("traverse", args),
        Some(Commands::BlastRadius(args)) => run_verb("blast_radius", args),
        Some(Commands::Hotspots(args)) => run_verb("hotspots", args),
        Some(Commands::Lineage(args)) => run_verb("lineage", args),
        Some(Commands::ServiceMap(args)) => run_verb("service_map", args),
        Some(Commands::Categories(args)) => run_verb("categories", args),
        Some(Commands::Impact(args)) => run_verb("impact", args),
        Some(Commands::Content(args)) => run_verb("content", args),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(0)
        }
    }
}

fn resolve_root(root: &Option<PathBuf>) -> Result<PathBuf> {
    match root {
        Some(p) => Ok(p.clone()),
        None => Ok(std::env::current_dir()?),
    }
}

fn open_store_for_root(root: &PathBuf) -> Result<Store> {
    let cli_config = config::load_cli_config_from(root)?;
    let index_path = config::resolve_index_path(&cli_config, root);
    if let Some(parent) = index_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Store::open(&index_path)?)
}

fn run_index(args: IndexArgs) -> Result<i32> {
    let root = resolve_root(&args.root)?;
    let mut store = open_store_for_root(&root)?;
    let cli_config = config::load_cli_config_from(&root)?;
    let index_section = cli_config.as_ref().and_then(|c| c.index.as_ref());

    let project = args
        .project
        .clone()
        .or_else(|| index_section.and_then(|s| s.project.clone()));

    let options = IndexOptions {
        project: crate::model::normalize_project(project.as_deref()),
        incremental: !args.full && index_section.and_then(|s| s.incremental).unwrap_or(true),
        max_file_size_bytes: index_section
            .and_then(|s| s.max_file_size_bytes)
            .unwrap_or(crate::discovery::DEFAULT_MAX_FILE_SIZE_BYTES),
        include_globs: index_section.map(|s| s.include_globs.clone()).unwrap_or_default(),
        exclude_globs: index_section.map(|s| s.exclude_globs.clone()).unwrap_or_default(),
        ..IndexOptions::default()
    };
    let summary = orchestrator::index(&mut store, &root, &options)?;
    serde_json::to_writer(std::io::stdout(), &summary)?;
    println!();
    Ok(0)
}

fn run_serve(args: ServeArgs) -> Result<i32> {
    let root = resolve_root(&args.root)?;
    let store = open_store_for_root(&root)?;
    let addr: SocketAddr = args.addr.parse()?;

    tracing::info!(%addr, root = %root.display(), "starting wicked-search HTTP gateway");

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        root_path: root,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(gateway::run(addr, state))?;
    Ok(0)
}

fn run_verb(verb: &str, args: VerbArgs) -> Result<i32> {
    if let Some(base_url) = args.remote.clone() {
        return run_verb_remote(verb, &base_url, &args);
    }

    let root = resolve_root(&args.root)?;
    let store = open_store_for_root(&root)?;
    let engine = QueryEngine::new(&store);
    let project = crate::model::normalize_project(args.project.as_deref());

    let result = (|| -> Result<serde_json::Value, WickedError> {
        crate::model::validate_project_name(&project)?;
        Ok(match verb {
            "list" => serde_json::to_value(engine.list(&project, args.limit, args.offset)?).unwrap(),
            "get" => {
                let id = args.id.as_deref().ok_or_else(|| WickedError::InputError("missing --id".to_string()))?;
                serde_json::to_value(engine.get(&project, id)?).unwrap()
            }
            "content" => {
                let id = args.id.as_deref().ok_or_else(|| WickedError::InputError("missing --id".to_string()))?;
                serde_json::json!({ "content": engine.content(&project, id)? })
            }
            "search" => {
                let query = args.query.as_deref().unwrap_or("");
                serde_json::to_value(engine.search(&project, query, args.limit, args.offset)?).unwrap()
            }
            "stats" => serde_json::to_value(engine.stats(&project)?).unwrap(),
            "refs" => {
                let id = args.id.as_deref().ok_or_else(|| WickedError::InputError("missing --id".to_string()))?;
                serde_json::to_value(engine.refs(&project, id)?).unwrap()
            }
            "traverse" => {
                let id = args.id.as_deref().ok_or_else(|| WickedError::InputError("missing --id".to_string()))?;
                let depth = args.depth.unwrap_or(1);
                let direction = Direction::parse(&args.direction)?;
                serde_json::to_value(engine.traverse(&project, id, depth, direction)?).unwrap()
            }
            "blast_radius" => {
                let id = args.id.as_deref().ok_or_else(|| WickedError::InputError("missing --id".to_string()))?;
                let depth = args.depth.unwrap_or(2);
                serde_json::to_value(engine.blast_radius(&project, id, depth)?).unwrap()
            }
            "hotspots" => serde_json::to_value(engine.hotspots(
                &project,
                args.limit,
                args.layer.as_deref(),
                args.symbol_type.as_deref(),
            )?)
            .unwrap(),
            "lineage" => {
                let name = args.query.as_deref().ok_or_else(|| WickedError::InputError("missing --query".to_string()))?;
                serde_json::to_value(engine.lineage(&project, name)?).unwrap()
            }
            "service_map" => serde_json::to_value(engine.service_map(&project)?).unwrap(),
            "categories" => serde_json::to_value(engine.categories(&project)?).unwrap(),
            "impact" => {
                let name = args.query.as_deref().ok_or_else(|| WickedError::InputError("missing --query".to_string()))?;
                let depth = args.depth.unwrap_or(2);
                serde_json::to_value(engine.impact(&project, name, depth)?).unwrap()
            }
            other => bail_input(other)?,
        })
    })();

    match result {
        Ok(value) => {
            serde_json::to_writer(std::io::stdout(), &value)?;
            println!();
            Ok(0)
        }
        Err(err @ WickedError::NotFound { .. }) => {
            eprintln!("{err}");
            Ok(1)
        }
        Err(err @ WickedError::InputError(_)) => {
            eprintln!("{err}");
            Ok(2)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(3)
        }
    }
}

fn bail_input(verb: &str) -> Result<serde_json::Value, WickedError> {
    Err(WickedError::InputError(format!("unknown verb: {verb}")))
}

/// Mirrors `run_verb`'s exit-code mapping but dispatches over HTTP to a
/// running gateway rather than opening the store in-process.
fn run_verb_remote(verb: &str, base_url: &str, args: &VerbArgs) -> Result<i32> {
    let backend = HttpQueryBackend::new(base_url)?;
    let (status, body) = backend.call_verb(verb, args)?;

    if status == 200 {
        serde_json::to_writer(std::io::stdout(), &body)?;
        println!();
        return Ok(0);
    }

    eprintln!("{body}");
    Ok(match status {
        404 => 1,
        400 => 2,
        _ => 3,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_index_subcommand_with_project_flag() {
        let cli = Cli::parse_from(["wicked-search", "index", "--project", "alpha", "--full"]);
        match cli.command {
            Some(Commands::Index(args)) => {
                assert_eq!(args.project.as_deref(), Some("alpha"));
                assert!(args.full);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_search_verb_with_query() {
        let cli = Cli::parse_from(["wicked-search", "search", "wicked-search", "--query", "Login"]);
        match cli.command {
            Some(Commands::Search(args)) => {
                assert_eq!(args.query.as_deref(), Some("Login"));
                assert_eq!(args.source, "wicked-search");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_defaults_limit_and_direction() {
        let cli = Cli::parse_from(["wicked-search", "traverse", "wicked-search", "--id", "x"]);
        match cli.command {
            Some(Commands::Traverse(args)) => {
                assert_eq!(args.limit, crate::query::DEFAULT_LIMIT);
                assert_eq!(args.direction, "both");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
