//! telemetryd - dual-protocol daemon for the DNS filter telemetry engine.
//!
//! Owns nothing of the DNS resolution path itself: it loads a persisted
//! ring on startup, keeps it flushed to disk on a timer, and serves line,
//! HTTP, and length-tagged binary readers over the aggregations in
//! `telemetry_core::dispatch`. The resolver that actually calls the ingest
//! API lives outside this binary (spec.md §1).

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Releases unused memory back to the operating system.
/// Uses jemalloc's arena purge to reduce RSS after a flush cycle frees ring
/// entries and interned strings grown during the cycle.
fn release_memory_to_os() {
    unsafe {
        tikv_jemalloc_sys::mallctl(
            c"arena.0.purge".as_ptr().cast(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            0,
        );
    }
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use clap::Parser;
use sqlx::Connection;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tower_http::cors::CorsLayer;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use telemetry_core::config::EngineConfig;
use telemetry_core::dispatch::{dispatch_binary_stats, dispatch_http, dispatch_line};
use telemetry_core::persistence;
use telemetry_core::{Engine, EngineError};

/// Dual-protocol daemon for the DNS filter telemetry engine.
#[derive(Parser)]
#[command(name = "telemetryd", about = "DNS filter telemetry daemon", version)]
struct Args {
    /// Path to the key=value configuration file.
    #[arg(short, long, default_value = "/etc/telemetry/telemetry.conf")]
    config: String,

    /// Line-protocol listen address.
    #[arg(long, default_value = "127.0.0.1:4711")]
    listen_line: String,

    /// HTTP listen address.
    #[arg(long, default_value = "127.0.0.1:4712")]
    listen_http: String,

    /// Length-tagged binary protocol listen address.
    #[arg(long, default_value = "127.0.0.1:4713")]
    listen_binary: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("telemetryd={level}").parse().unwrap())
        .add_directive(format!("telemetry_core={level}").parse().unwrap());

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!("telemetryd {} starting", env!("CARGO_PKG_VERSION"));

    let config = match EngineConfig::from_file(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("could not read {}: {e}, falling back to defaults", args.config);
            EngineConfig::default()
        }
    };
    info!(
        "config: privacy_level={:?} db_file={:?} db_interval={}s max_db_days={}",
        config.privacy_level, config.db_file, config.db_interval_secs, config.max_db_days
    );

    let engine = Arc::new(Engine::new(config));

    if let Err(e) = bootstrap_if_configured(&engine).await {
        error!("bootstrap failed: {e}");
    }

    let killed = Arc::new(AtomicBool::new(false));
    {
        let killed = killed.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("received shutdown signal");
            killed.store(true, Ordering::SeqCst);
        }) {
            warn!("failed to set signal handler: {e}");
        }
    }

    let persistence_handle = persistence::spawn(engine.clone());
    if persistence_handle.is_none() {
        info!("persistence disabled (DBFILE empty)");
    }

    tokio::spawn(memory_release_loop(killed.clone()));

    let line_task = tokio::spawn(run_line_listener(engine.clone(), killed.clone(), args.listen_line.clone()));
    let binary_task =
        tokio::spawn(run_binary_listener(engine.clone(), killed.clone(), args.listen_binary.clone()));
    let http_task = tokio::spawn(run_http_server(engine.clone(), killed.clone(), args.listen_http.clone()));

    let _ = tokio::join!(line_task, binary_task, http_task);
    if let Some(handle) = persistence_handle {
        handle.abort();
    }
    info!("telemetryd stopped");
}

async fn bootstrap_if_configured(engine: &Arc<Engine>) -> Result<(), EngineError> {
    let Some(path) = engine.config.db_file.clone() else {
        return Ok(());
    };
    let mut conn = persistence::open(&path).await?;
    let now = now_secs();
    persistence::bootstrap(engine, &mut conn, &engine.config, now).await?;
    let _ = conn.close().await;
    Ok(())
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Purges jemalloc arenas periodically; entity tables grow monotonically by
/// design (spec.md §5) but the ring and interner churn enough during a
/// flush cycle that returning freed pages to the OS is worth the syscalls.
async fn memory_release_loop(killed: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(300));
    loop {
        ticker.tick().await;
        if killed.load(Ordering::SeqCst) {
            return;
        }
        release_memory_to_os();
    }
}

async fn run_line_listener(engine: Arc<Engine>, killed: Arc<AtomicBool>, addr: String) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("line listener failed to bind {addr}: {e}");
            return;
        }
    };
    info!("line protocol listening on {addr}");
    loop {
        if killed.load(Ordering::SeqCst) {
            return;
        }
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("line accept error: {e}");
                    continue;
                }
            },
            _ = tokio::time::sleep(Duration::from_millis(500)) => continue,
        };
        let engine = engine.clone();
        let killed = killed.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_line_connection(&engine, &killed, socket).await {
                debug!("line connection {peer} closed: {e}");
            }
        });
    }
}

async fn serve_line_connection(
    engine: &Engine,
    killed: &AtomicBool,
    socket: TcpStream,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let outcome = dispatch_line(engine, killed, &line);
        write_half.write_all(outcome.body.as_bytes()).await?;
        write_half.flush().await?;
        if outcome.close_connection {
            break;
        }
    }
    Ok(())
}

async fn run_binary_listener(engine: Arc<Engine>, killed: Arc<AtomicBool>, addr: String) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("binary listener failed to bind {addr}: {e}");
            return;
        }
    };
    info!("binary protocol listening on {addr}");
    loop {
        if killed.load(Ordering::SeqCst) {
            return;
        }
        let (mut socket, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("binary accept error: {e}");
                    continue;
                }
            },
            _ = tokio::time::sleep(Duration::from_millis(500)) => continue,
        };
        let engine = engine.clone();
        tokio::spawn(async move {
            let frame = dispatch_binary_stats(&engine);
            if let Err(e) = socket.write_all(&frame).await {
                debug!("binary connection {peer} write failed: {e}");
            }
        });
    }
}

async fn run_http_server(engine: Arc<Engine>, killed: Arc<AtomicBool>, addr: String) {
    let addr: SocketAddr = match addr.parse() {
        Ok(a) => a,
        Err(e) => {
            error!("invalid HTTP listen address: {e}");
            return;
        }
    };

    let app = Router::new()
        .fallback(http_handler)
        .layer(middleware::from_fn(no_cache_header))
        .layer(CorsLayer::permissive())
        .with_state(engine);

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("HTTP listener failed to bind {addr}: {e}");
            return;
        }
    };
    info!("HTTP listening on {addr}");

    let shutdown = async move {
        while !killed.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    };
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!("HTTP server error: {e}");
    }
}

/// `Cache-Control: no-cache` is required on every response (spec.md §6); a
/// layer is simpler than repeating the header in every handler branch.
async fn no_cache_header(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

async fn http_handler(State(engine): State<Arc<Engine>>, uri: Uri) -> Response {
    match dispatch_http(&engine, uri.path()) {
        Some(body) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap(),
        None => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(header::CONTENT_TYPE, "application/json")
            .body(telemetry_core::dispatch::format::not_found_json().into())
            .unwrap(),
    }
}
