use anyhow::{anyhow, Context};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ragdb_core::config::{resolve_with_base, Config, DataSettings};
use ragdb_core::traits::LexicalIndex;
use ragdb_core::types::WorkspaceId;
use ragdb_embed::get_default_embedder;
use ragdb_hybrid::{CallerPath, HybridRetriever, QueryContext, RetrievalMetrics};
use ragdb_text::{open_or_unavailable, UnavailableLexicalIndex};
use ragdb_vector::{build_nodes, LanceStore, LanceWriter, TableNames};

const USAGE: &str = "Usage: ragdb <command> [args...]

Commands:
  query <workspace> \"<text>\" [top_k] [answer|stream|search]
  build-nodes <workspace>
  config";

const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

fn parse_args() -> (String, Vec<String>) {
    let mut args = env::args().skip(1);
    let Some(cmd) = args.next() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };
    (cmd, args.collect())
}

fn data_path(dir: &str) -> anyhow::Result<PathBuf> {
    Ok(resolve_with_base(&env::current_dir()?, dir))
}

async fn open_store(data: &DataSettings) -> anyhow::Result<LanceStore> {
    let uri = data_path(&data.lancedb_dir)?;
    LanceStore::open(&uri.to_string_lossy(), TableNames::from(data)).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config = Config::load().context("loading config")?;
    let (cmd, args) = parse_args();
    match cmd.as_str() {
        "query" => query(&config, &args).await,
        "build-nodes" => {
            let workspace = args.first().map(WorkspaceId::new).ok_or_else(|| anyhow!("{USAGE}"))?;
            let retrieval = config.retrieval()?;
            let embedding = config.embedding()?;
            let store = open_store(&config.data()?).await?;
            let writer = LanceWriter::for_store(&store, embedding.dimension);
            let embedder = get_default_embedder(&embedding)?;
            let report = build_nodes(&store, &writer, embedder.as_ref(), &workspace, &retrieval, true).await?;
            println!("{} documents, {} nodes", report.documents, report.nodes);
            for (document, reason) in &report.skipped {
                println!("skipped {document}: {reason}");
            }
            Ok(())
        }
        "config" => {
            println!("[retrieval]\n{:#?}", config.retrieval()?);
            println!("[embedding]\n{:#?}", config.embedding()?);
            println!("[data]\n{:#?}", config.data()?);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
    }
}

async fn query(config: &Config, args: &[String]) -> anyhow::Result<()> {
    let (Some(workspace), Some(text)) = (args.first(), args.get(1)) else {
        return Err(anyhow!("{USAGE}"));
    };
    let workspace = WorkspaceId::new(workspace.as_str());
    let top_k = args.get(2).map(|s| s.parse::<usize>()).transpose().context("top_k must be a number")?.unwrap_or(10);
    let caller = match args.get(3) {
        Some(s) => CallerPath::parse(s).ok_or_else(|| anyhow!("unknown caller path '{s}'"))?,
        None => CallerPath::Search,
    };

    let retrieval = config.retrieval()?;
    let data = config.data()?;
    let embedder = get_default_embedder(&config.embedding()?)?;
    let query_vector = embedder.embed(text)?;

    let store = Arc::new(open_store(&data).await?);
    let lexical: Arc<dyn LexicalIndex> = if retrieval.hybrid_search_enabled {
        open_or_unavailable(&data_path(&data.tantivy_dir)?)
    } else {
        Arc::new(UnavailableLexicalIndex::new("hybrid search disabled"))
    };
    let metrics = Arc::new(RetrievalMetrics::new());
    let retriever = HybridRetriever::new(retrieval, store.clone(), lexical, store, metrics.clone())?;

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling query");
            on_interrupt.cancel();
        }
    });
    let ctx = QueryContext::new(caller).with_cancellation(token).with_timeout(QUERY_TIMEOUT);

    let result = retriever.retrieve(&ctx, &workspace, text, &query_vector, top_k).await?;
    let meta = &result.metadata;
    println!(
        "hybrid_used={} degraded={} lexical={:?} dense_path={:?} language={}",
        meta.hybrid_used,
        meta.degraded,
        meta.lexical,
        meta.dense_path,
        meta.language.map_or_else(|| "-".to_string(), |l| l.to_string()),
    );
    for (i, p) in result.passages.iter().enumerate() {
        let channels: Vec<String> = p.channels.iter().map(ToString::to_string).collect();
        println!("\n  {}. score={:.5}  {}#{}  [{}]", i + 1, p.score, p.document_id, p.chunk_index, channels.join(","));
        let preview: String = p.content.chars().take(200).collect();
        println!("     {preview}");
    }
    for usage in metrics.snapshot() {
        tracing::debug!(caller = %usage.caller, outcome = %usage.outcome, count = usage.count, "usage");
    }
    Ok(())
}
