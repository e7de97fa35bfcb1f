use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use uttale_audio::{SegmentExtractor, SymphoniaDecoder};
use uttale_core::config::{expand_path, Config};
use uttale_core::timecode::format_timecode;
use uttale_index::{Indexer, IndexStore, SearchService};
use uttale_server::{AppState, Server};

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() {
        eprintln!("Usage: {} <serve|reindex|search|scopes> [args...]", prog);
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    (cmd, args)
}

struct Settings {
    corpus_root: PathBuf,
    index_dir: PathBuf,
    addr: String,
    audio_ext: String,
    page_size: usize,
    snippet_len: usize,
    cache_entries: usize,
}

fn settings(config: &Config) -> Settings {
    Settings {
        corpus_root: expand_path(config.get_or("corpus.root", ".".to_string())),
        index_dir: expand_path(config.get_or("index.dir", "./uttale_index".to_string())),
        addr: config.get_or("server.addr", "0.0.0.0:7010".to_string()),
        audio_ext: config.get_or("corpus.audio_ext", "ogg".to_string()),
        page_size: config.get_or("search.page_size", 20),
        snippet_len: config.get_or("search.snippet_len", 160),
        cache_entries: config.get_or("audio.cache_entries", 64),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let s = settings(&config);
    let (cmd, args) = parse_args();
    match cmd.as_str() {
        "reindex" => {
            let root = args.first().map(PathBuf::from).unwrap_or(s.corpus_root);
            let store = Arc::new(IndexStore::open(&s.index_dir)?);
            let report = Indexer::new(store).reindex(&root)?;
            println!(
                "added {} updated {} removed {} unchanged {} failed {}",
                report.added,
                report.updated,
                report.removed,
                report.unchanged,
                report.failed.len()
            );
            for path in &report.failed {
                eprintln!("failed: {}", path);
            }
        }
        "search" => {
            let query = args.first().cloned().unwrap_or_else(|| {
                eprintln!("Usage: uttale search \"<query>\" [scope] [page]");
                std::process::exit(1)
            });
            let scope = args.get(1).cloned();
            let page: usize = args.get(2).and_then(|p| p.parse().ok()).unwrap_or(0);
            let store = Arc::new(IndexStore::open(&s.index_dir)?);
            let service = SearchService::new(store, s.page_size, s.snippet_len);
            let hits = service.search(&query, scope.as_deref(), page)?;
            for hit in hits {
                let display = hit.snippet.as_deref().unwrap_or(&hit.text);
                println!(
                    "{}  {} --> {}  {}",
                    hit.file,
                    format_timecode(hit.start),
                    format_timecode(hit.end),
                    display.replace('\n', " / ")
                );
            }
        }
        "scopes" => {
            let store = IndexStore::open(&s.index_dir)?;
            for scope in store.scopes() {
                println!("{}", scope);
            }
        }
        "serve" => {
            let store = Arc::new(IndexStore::open(&s.index_dir)?);
            let state = AppState::new(
                store.clone(),
                SearchService::new(store, s.page_size, s.snippet_len),
                SegmentExtractor::new(Box::new(SymphoniaDecoder), s.cache_entries),
                s.corpus_root,
                s.audio_ext,
            );
            let addr = s.addr.parse()?;
            tokio::runtime::Runtime::new()?
                .block_on(Server::new(Arc::new(state), addr).start())?;
        }
        other => {
            eprintln!("Unknown command: {}", other);
            std::process::exit(1);
        }
    }
    Ok(())
}
