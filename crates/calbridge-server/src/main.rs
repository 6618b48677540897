//! calbridge server entry point.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::{Level, info};

use calbridge_server::config::ServerConfig;
use calbridge_server::error::{ServerError, ServerResult};
use calbridge_server::logging::{self, LogConfig, LogFormat};
use calbridge_server::routes;
use calbridge_server::state::AppState;

#[derive(Debug, Parser)]
#[command(
    name = "calbridge",
    about = "HTTP bridge exposing Google Calendar event CRUD over REST",
    version
)]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = calbridge_server::DEFAULT_PORT)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Path to the OAuth client configuration JSON.
    #[arg(long, env = "CALBRIDGE_CREDENTIALS", default_value = "credentials.json")]
    credentials: PathBuf,

    /// Path to the stored credential record.
    #[arg(long, env = "CALBRIDGE_TOKEN", default_value = "token.json")]
    token_path: PathBuf,

    /// Calendar to operate on.
    #[arg(long, default_value = "primary")]
    calendar_id: String,

    /// Seconds to wait for the browser consent flow.
    #[arg(long, default_value_t = 300)]
    consent_timeout: u64,

    /// Emit JSON logs.
    #[arg(long)]
    log_json: bool,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_config = LogConfig::default()
        .with_level(if args.debug { Level::DEBUG } else { Level::INFO })
        .with_format(if args.log_json {
            LogFormat::Json
        } else {
            LogFormat::Compact
        });
    if let Err(e) = logging::init(log_config) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> ServerResult<()> {
    let config = ServerConfig::default()
        .with_bind_addr(SocketAddr::new(args.host, args.port))
        .with_credentials_path(args.credentials)
        .with_token_path(args.token_path)
        .with_calendar_id(args.calendar_id)
        .with_consent_timeout(Duration::from_secs(args.consent_timeout));
    config.validate().map_err(ServerError::config)?;

    let bind_addr = config.bind_addr;
    let state = AppState::new(config);

    // The upstream clients are browser apps; mirror their permissive
    // cross-origin expectations.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(routes::router())
        .with_state(state)
        .layer(cors);

    info!("listening on http://{bind_addr}");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
