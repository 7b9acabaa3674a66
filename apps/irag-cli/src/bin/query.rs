//! Query the multi-modal index from the command line.

use std::env;

use tracing_subscriber::EnvFilter;

use irag_core::cache::InMemoryCache;
use irag_core::config::{expand_path, Config};
use irag_core::error::Error;
use irag_core::types::Meta;
use irag_embed::get_default_provider;
use irag_rerank::get_default_scorer;
use irag_retrieval::RagEngine;
use irag_store::LanceVectorStore;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let config = Config::load()?;

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <query> [--top-k N] [--context] [--filter key=value ...] [db_path] [table_name]", args[0]);
        eprintln!("Example: {} 'how much is floor replacement covered?' --top-k 3 --filter company=AIA", args[0]);
        std::process::exit(1);
    }
    let query_text = args[1].clone();
    if query_text.trim().is_empty() {
        return Err(Error::InvalidQuery("query must be a non-empty string".to_string()).into());
    }

    let mut top_k = 5usize;
    let mut want_context = false;
    let mut filters: Meta = Meta::new();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--top-k" => {
                let value = args.get(i + 1).and_then(|v| v.parse::<usize>().ok());
                match value {
                    Some(k) => {
                        top_k = k;
                        i += 1;
                    }
                    None => {
                        eprintln!("Error: --top-k requires a number");
                        std::process::exit(1);
                    }
                }
            }
            "--context" => want_context = true,
            "--filter" => match args.get(i + 1).and_then(|v| v.split_once('=')) {
                Some((k, v)) => {
                    filters.insert(k.to_string(), v.to_string());
                    i += 1;
                }
                None => {
                    eprintln!("Error: --filter requires key=value");
                    std::process::exit(1);
                }
            },
            _ if !args[i].starts_with('-') => positional.push(args[i].clone()),
            _ => {}
        }
        i += 1;
    }

    let db_path = positional.first().cloned().unwrap_or_else(|| {
        config.get("data.lancedb_dir").unwrap_or_else(|_| "data/lancedb".to_string())
    });
    let table_name = positional.get(1).cloned().unwrap_or_else(|| {
        config.get("data.table_name").unwrap_or_else(|_| "insurance_docs".to_string())
    });

    println!("irag-query\n==========");
    println!("Query: {}", query_text);
    println!("Database path: {}  Table: {}", db_path, table_name);

    let provider = get_default_provider()?;
    let store = LanceVectorStore::open(&expand_path(&db_path), &table_name)?;
    let scorer = get_default_scorer();
    let retrieval_cfg = config.retrieval()?;
    let engine = RagEngine::new(provider, Box::new(store), scorer, retrieval_cfg)?
        .with_context_cache(Box::new(InMemoryCache::new()));

    if want_context {
        let context = engine.retrieve_context(&query_text, top_k)?;
        println!("\n{}", context);
        return Ok(());
    }

    let filter_arg = if filters.is_empty() { None } else { Some(&filters) };
    let results = engine.retrieve(&query_text, top_k, filter_arg)?;
    println!("\nFound {} results for: \"{}\"", results.len(), query_text);
    for (i, result) in results.iter().enumerate() {
        println!(
            "\n  {}. cost={:.4}  modality={}  source={}  page={}",
            i + 1,
            result.score,
            result.modality.as_str(),
            result.metadata.get("source").map(String::as_str).unwrap_or("unknown"),
            result.metadata.get("page_number").map(String::as_str).unwrap_or("na"),
        );
        if let Some(text) = &result.text {
            let preview: String = text.chars().take(300).collect();
            println!("     Text: {}", preview);
        }
        if let Some(table) = &result.table {
            println!("     Table: {}", table.header.join(" | "));
            for row in &table.rows {
                println!("            {}", row.join(" | "));
            }
        }
    }
    Ok(())
}
