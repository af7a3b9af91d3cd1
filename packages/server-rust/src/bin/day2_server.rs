//! `day2-server`: serves the demo day-2 catalog over HTTP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use day2_server::network::{AuthConfig, JwtAuthenticator, NetworkConfig, NetworkModule, TlsConfig};
use day2_server::service::domain::{register_catalog, InMemoryBackend};
use day2_server::service::{
    BackgroundWorker, Dispatcher, OperationRegistry, ServerConfig, ThrottleConfig, ThrottleSweeper,
};
use day2_server::telemetry::{init_logging, install_metrics, LogFormat};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "day2-server", version, about = "Governed day-2 operation dispatch")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the operation catalog (default).
    Serve,
    /// Print a signed bearer token for local testing.
    Token(TokenArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long, env = "DAY2_HOST", default_value = "0.0.0.0", global = true)]
    host: String,
    #[arg(long, env = "DAY2_PORT", default_value_t = 8080, global = true)]
    port: u16,
    /// HS256 secret used to verify bearer tokens.
    #[arg(long, env = "DAY2_JWT_SECRET", global = true, hide_env_values = true)]
    jwt_secret: Option<String>,
    /// Required `iss` claim.
    #[arg(long, env = "DAY2_JWT_ISSUER", global = true)]
    jwt_issuer: Option<String>,
    #[arg(long, env = "DAY2_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
    /// Calls admitted per caller and operation within one window. 0 disables throttling.
    #[arg(long, env = "DAY2_THROTTLE_MAX_CALLS", default_value_t = 30)]
    throttle_max_calls: u32,
    #[arg(long, env = "DAY2_THROTTLE_WINDOW_SECS", default_value_t = 60)]
    throttle_window_secs: u64,
    /// Default operation timeout in milliseconds. 0 disables it.
    #[arg(long, env = "DAY2_OPERATION_TIMEOUT_MS", default_value_t = 30_000)]
    operation_timeout_ms: u64,
    #[arg(long, env = "DAY2_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    drain_timeout_secs: u64,
    /// Serve Prometheus text on `GET /metrics`.
    #[arg(long, env = "DAY2_METRICS", default_value_t = true, action = clap::ArgAction::Set)]
    metrics: bool,
    #[arg(long, env = "DAY2_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,
    #[arg(long, env = "DAY2_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct TokenArgs {
    /// Token subject, used as the caller id.
    subject: String,
    /// Role to grant. Repeatable.
    #[arg(long = "role")]
    roles: Vec<String>,
    #[arg(long, default_value_t = 3_600)]
    ttl_secs: u64,
}

impl ServeArgs {
    fn auth_config(&self) -> anyhow::Result<AuthConfig> {
        let secret = self
            .jwt_secret
            .clone()
            .filter(|s| !s.is_empty())
            .context("a JWT secret is required (--jwt-secret or DAY2_JWT_SECRET)")?;
        let mut auth = AuthConfig::new(secret);
        auth.issuer.clone_from(&self.jwt_issuer);
        Ok(auth)
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            default_operation_timeout_ms: self.operation_timeout_ms,
            throttle: ThrottleConfig {
                enabled: self.throttle_max_calls > 0,
                max_calls_per_window: self.throttle_max_calls.max(1),
                window: Duration::from_secs(self.throttle_window_secs),
            },
            ..ServerConfig::default()
        }
    }

    fn network_config(&self) -> NetworkConfig {
        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
            _ => None,
        };
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            tls,
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
            ..NetworkConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.serve.log_format);

    match cli.command {
        Some(Command::Token(args)) => print_token(&cli.serve, &args),
        Some(Command::Serve) | None => serve(cli.serve).await,
    }
}

fn print_token(serve: &ServeArgs, args: &TokenArgs) -> anyhow::Result<()> {
    let auth = JwtAuthenticator::new(&serve.auth_config()?);
    let roles: Vec<&str> = args.roles.iter().map(String::as_str).collect();
    let token = auth
        .issue(&args.subject, &roles, args.ttl_secs)
        .context("failed to sign token")?;
    println!("{token}");
    Ok(())
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let auth = args.auth_config()?;
    let server_config = args.server_config();
    let sweep_interval_ms = server_config.throttle_gc_interval_ms;

    let registry = Arc::new(OperationRegistry::new());
    let registered = register_catalog(&registry, Arc::new(InMemoryBackend::demo()))
        .context("failed to register operation catalog")?;
    info!(operations = registered, "operation catalog registered");

    let dispatcher = Dispatcher::builder(Arc::clone(&registry))
        .config(server_config)
        .build()
        .context("invalid throttle configuration")?;
    let dispatcher = Arc::new(dispatcher);

    let mut sweeper = BackgroundWorker::start(
        ThrottleSweeper::new(Arc::clone(dispatcher.limiter())),
        sweep_interval_ms,
    );

    let mut module = NetworkModule::new(args.network_config(), &auth, dispatcher);
    if args.metrics {
        let handle = install_metrics().context("failed to install metrics recorder")?;
        module = module.with_metrics(handle);
    }

    let port = module.start().await?;
    info!(port, "day2-server listening");

    module
        .serve(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    sweeper.stop().await;
    Ok(())
}
