// NetInf node: run fetch pipelines and serve cached content to peers.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use netinf_core::download::HttpDownloader;
use netinf_core::peer::{PeerProvider, PeerServer, TcpConnector};
use netinf_core::store::ContentStore;
use netinf_core::transfer::{FileProvider, HttpProvider};
use netinf_core::{
    Context, Event, EventSink, FetchPipeline, LocalCache, NamingClient, ResolutionChain,
    SearchFederation, TransferDispatcher,
};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "usage: netinf-node fetch <url> [-o <file>] | serve | --version";

enum Command {
    Fetch { url: String, out: Option<PathBuf> },
    Serve,
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    match args.first().map(String::as_str) {
        Some("fetch") => {
            let Some(url) = args.get(1) else {
                bail!(USAGE);
            };
            let out = match args.get(2).map(String::as_str) {
                Some("-o") | Some("--output") => match args.get(3) {
                    Some(p) => Some(PathBuf::from(p)),
                    None => bail!(USAGE),
                },
                Some(_) => bail!(USAGE),
                None => None,
            };
            Ok(Command::Fetch {
                url: url.clone(),
                out,
            })
        }
        Some("serve") => Ok(Command::Serve),
        _ => bail!(USAGE),
    }
}

/// Pipeline events go to the log.
struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        info!(?event, "event");
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("netinf-node {}", VERSION);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let command = parse_args(&args)?;
    let cfg = config::load();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        match command {
            Command::Fetch { url, out } => fetch(&cfg, &url, out).await,
            Command::Serve => serve(&cfg).await,
        }
    })
}

fn build_pipeline(cfg: &config::Config, cache: LocalCache) -> anyhow::Result<FetchPipeline> {
    let sink: Arc<dyn EventSink> = Arc::new(LogSink);
    let naming = Arc::new(NamingClient::new(cfg.authority(), cfg.wire_form)?.with_events(sink.clone()));
    let local = Arc::new(cache.with_events(sink.clone()));

    let dispatcher = TransferDispatcher::new()
        .with_provider(Arc::new(FileProvider))
        .with_provider(Arc::new(PeerProvider::new(Arc::new(TcpConnector))))
        .with_provider(Arc::new(HttpProvider::default()))
        .with_verification(cfg.verify_content)
        .with_events(sink.clone());

    Ok(FetchPipeline::new(
        SearchFederation::new(local.clone(), naming.clone()),
        ResolutionChain::new()
            .with_backend(10, local)
            .with_backend(1, naming),
        dispatcher,
        Arc::new(HttpDownloader::default()),
        ContentStore::new(&cfg.content_dir),
    )
    .with_publishing(cfg.publish)
    .with_verification(cfg.verify_content)
    .with_local_locator(Arc::new(cfg.local_locator()))
    .with_search_ext(cfg.search_ext.clone())
    .with_events(sink))
}

async fn fetch(cfg: &config::Config, url: &str, out: Option<PathBuf>) -> anyhow::Result<()> {
    let cache = LocalCache::open(&cfg.cache_path)?;
    let pipeline = build_pipeline(cfg, cache)?;

    let ctx = Context::new(cfg.timeout());
    let cancel = ctx.clone();
    tokio::spawn(async move {
        if shutdown_signal().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = pipeline.fetch(url, &ctx).await?;
    info!(
        id = %outcome.id,
        content_type = %outcome.content_type,
        source = ?outcome.source,
        publish = ?outcome.publish,
        "fetched"
    );
    match out {
        Some(path) => tokio::fs::write(&path, &outcome.bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&outcome.bytes).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn serve(cfg: &config::Config) -> anyhow::Result<()> {
    let cache = LocalCache::open(&cfg.cache_path)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.peer_port));
    let server = PeerServer::bind(addr, cache).await?;
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));
    shutdown_signal().await?;
    shutdown.cancel();
    handle.await??;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
