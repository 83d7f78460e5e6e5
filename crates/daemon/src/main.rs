use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use prms_backup_daemon::config::{self, Config, Settings};
use prms_backup_daemon::{build_router, AppState, GatewayReply, Method, OperationGateway, Status};
use prms_backup_engine::BackupOrchestrator;
use prms_backup_storage::ArchiveStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let (cfg, command) = parse_args()?;
    let settings = cfg.resolve()?;
    info!(
        archive_dir = %settings.archive_dir.display(),
        database = ?settings.database,
        engine = ?settings.engine,
        "configuration loaded"
    );
    let gateway = build_gateway(&settings);

    match command {
        Some(command) => run_command(gateway, command).await,
        None => {
            run_service(gateway, &settings.listen).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// A single action given on the command line, e.g. `backup` or `restore <file>`.
struct CliCommand {
    action: String,
    file: Option<String>,
}

/// Parse CLI args, returning the loaded config and optional one-shot action.
fn parse_args() -> Result<(Config, Option<CliCommand>)> {
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut positional = Vec::new();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                if i >= args.len() {
                    bail!("--config requires a path argument");
                }
                config_path = Some(PathBuf::from(&args[i]));
            }
            other => positional.push(other.to_owned()),
        }
        i += 1;
    }

    let cfg = match config_path {
        Some(path) => {
            info!(?path, "loading config file");
            config::load_config(&path)?
        }
        None => Config::default(),
    };

    let mut positional = positional.into_iter();
    let command = positional.next().map(|action| CliCommand {
        action,
        file: positional.next(),
    });
    if let Some(extra) = positional.next() {
        bail!("unexpected argument {extra:?}");
    }

    Ok((cfg, command))
}

fn build_gateway(settings: &Settings) -> OperationGateway {
    let store = ArchiveStore::new(&settings.archive_dir).with_retry_policy(settings.retry);
    let orchestrator =
        BackupOrchestrator::new(store, settings.database.clone(), settings.engine.clone());
    OperationGateway::new(orchestrator).with_timeout(settings.timeout)
}

async fn run_command(gateway: OperationGateway, command: CliCommand) -> Result<ExitCode> {
    let method = match command.action.as_str() {
        "download" => bail!("download streams a file and is only available over HTTP"),
        "backup" | "create" | "restore" | "delete" => Method::Write,
        _ => Method::Read,
    };
    let mut params = HashMap::new();
    if let Some(file) = command.file {
        params.insert("file".to_owned(), file);
    }

    let GatewayReply::Envelope(envelope) = gateway.dispatch(method, &command.action, &params).await
    else {
        bail!("unexpected download reply");
    };
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(match envelope.status {
        Status::Success => ExitCode::SUCCESS,
        Status::Error => ExitCode::FAILURE,
    })
}

async fn run_service(gateway: OperationGateway, listen: &str) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address: {listen}"))?;
    let app = build_router(AppState { gateway });

    info!(%addr, "starting backup gateway");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(err) => {
            warn!(error = %err, "cannot listen for ctrl-c, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
