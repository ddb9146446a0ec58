use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use regularity::server::{build_router, AppState, StaticDirs};
use regularity::startup;
use regularity_core::{
    detail, score, AnalyzeResponse, AnalyzeTextRequest, AnalyzeTextResponse, ADAPTER_TOP_K,
    DEFAULT_TOP_K,
};
use regularity_local::{build_client, default_catalog, HttpPageFetcher, PageCache};
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "regularity")]
#[command(about = "Token predictability scoring (HTTP service + CLI)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP service.
    Serve(ServeCmd),
    /// Score a text once and print the response JSON.
    Score(ScoreCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ServeCmd {
    /// Model to load; unknown ids fall back to the default model.
    #[arg(long, env = "REGULARITY_MODEL", default_value = regularity_local::DEFAULT_MODEL_ID)]
    model: String,

    #[arg(long, env = "REGULARITY_ADDRESS", default_value = "127.0.0.1")]
    address: IpAddr,

    #[arg(long, env = "REGULARITY_PORT", default_value_t = 5001)]
    port: u16,

    /// Disable the permissive CORS layer.
    #[arg(long)]
    no_cors: bool,

    /// Data directory served under `/data`.
    #[arg(long, env = "REGULARITY_DATA_DIR", default_value = "data")]
    dir: PathBuf,

    /// Built client bundle served under `/client`.
    #[arg(long, env = "REGULARITY_CLIENT_DIR", default_value = "client/dist")]
    client_dir: PathBuf,

    /// Candidates consulted per position when scoring.
    #[arg(long, env = "REGULARITY_TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Upper bound on a single model call.
    #[arg(long, env = "REGULARITY_MODEL_TIMEOUT_MS", default_value_t = 60_000)]
    model_timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct ScoreCmd {
    #[arg(long, env = "REGULARITY_MODEL", default_value = regularity_local::DEFAULT_MODEL_ID)]
    model: String,

    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Text to score. Reads `--file`, then stdin, when absent.
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,

    #[arg(long)]
    file: Option<PathBuf>,

    /// Emit per-token detail instead of the bare score.
    #[arg(long)]
    detail: bool,

    #[arg(long, env = "REGULARITY_MODEL_TIMEOUT_MS", default_value_t = 60_000)]
    model_timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn init_tracing() {
    // stdout carries command output; logs go to stderr.
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(args: ServeCmd) -> Result<()> {
    let model_timeout = Duration::from_millis(args.model_timeout_ms);
    let model_client = build_client(model_timeout).context("build model client")?;
    let catalog = default_catalog(model_client);
    let registry = startup::load_registry(&catalog, &args.model).context("load model")?;

    let page_client = build_client(Duration::from_secs(30)).context("build page client")?;
    let pages = PageCache::new(Arc::new(HttpPageFetcher::new(page_client)));

    let state = AppState {
        registry: Arc::new(registry),
        pages: Arc::new(pages),
        top_k: args.top_k,
        model_timeout,
    };
    let dirs = StaticDirs {
        client_dir: args.client_dir,
        data_dir: args.dir,
    };
    let app = build_router(state, &dirs, !args.no_cors);

    let addr = SocketAddr::new(args.address, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(
        %addr,
        top_k = args.top_k,
        cors = !args.no_cors,
        client_dir = %dirs.client_dir.display(),
        data_dir = %dirs.data_dir.display(),
        "listening"
    );
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}

fn read_text(args: &ScoreCmd) -> Result<String> {
    if let Some(t) = &args.text {
        return Ok(t.clone());
    }
    if let Some(p) = &args.file {
        return std::fs::read_to_string(p).with_context(|| format!("read {}", p.display()));
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("read stdin")?;
    Ok(buf)
}

async fn score_once(args: ScoreCmd) -> Result<()> {
    let text = read_text(&args)?;
    let model_timeout = Duration::from_millis(args.model_timeout_ms);
    let catalog = default_catalog(build_client(model_timeout).context("build model client")?);
    let registry = startup::load_registry(&catalog, &args.model).context("load model")?;
    // Known ids and fallback aliases are both registered under the requested id.
    let project = registry
        .resolve(&args.model)
        .with_context(|| format!("model {} not registered", args.model))?;

    let fetch_k = if args.detail {
        ADAPTER_TOP_K.max(args.top_k)
    } else {
        args.top_k
    };
    let predictions = tokio::time::timeout(model_timeout, project.model().predict(&text, fetch_k))
        .await
        .with_context(|| format!("model did not answer within {model_timeout:?}"))??;

    let request = AnalyzeTextRequest {
        project: args.model.clone(),
        text,
    };
    let out = if args.detail {
        serde_json::to_string(&AnalyzeResponse {
            request,
            result: Some(detail(&predictions, args.top_k)),
        })?
    } else {
        let result = score(&predictions, args.top_k);
        serde_json::to_string(&AnalyzeTextResponse::new(request, &result))?
    };
    println!("{out}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            init_tracing();
            serve(args).await?;
        }
        Commands::Score(args) => {
            init_tracing();
            score_once(args).await?;
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "name": "regularity",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("regularity {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", v),
            }
        }
    }
    Ok(())
}
