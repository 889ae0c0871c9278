//! Quadrant Live — real-time client entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Resolve the identity (CLI `-u` > env/config > signed-in user)
//!   6. Create the realtime client and register listeners
//!   7. Connect
//!   8. Spawn the proxy (if enabled)
//!   9. Spawn Ctrl-C → shutdown signal watcher
//!  10. Wait for shutdown, close the connection, join the proxy

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use quadrant_live::api::{ApiClient, ApiError};
use quadrant_live::client::{ClientSettings, RealtimeClient};
use quadrant_live::envelope::kinds;
use quadrant_live::error::AppError;
use quadrant_live::router::Listener;
use quadrant_live::transport::ws::WsConnector;
use quadrant_live::{config, logger};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();

    logger::init(effective_log_level, force_cli_level, config.log_file.as_deref())?;

    info!(
        origin = %config.realtime.origin,
        port = config.realtime.port,
        api = %config.api.base_url,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let api = ApiClient::new(&config.api)?;
    let identity = match args.user_id.or(config.realtime.user_id) {
        Some(id) => Some(id),
        None => signed_in_user(&api).await,
    };

    let client = RealtimeClient::create(ClientSettings::from(&config.realtime), Arc::new(WsConnector));
    let handle = client.handle();

    for kind in kinds::ALL {
        let listener = Listener::new(move |data| {
            info!(kind, %data, "update received");
            Ok(())
        });
        handle.on(kind, &listener);
    }

    handle
        .connect_queued(identity)
        .await
        .map_err(|e| AppError::Client(format!("connect request failed: {e}")))?;

    // Shared shutdown token — Ctrl-C cancels it, all tasks watch it.
    let shutdown = CancellationToken::new();

    #[cfg(feature = "proxy")]
    let proxy_task = if config.proxy.enabled {
        let server = quadrant_live::proxy::ProxyServer::new(&config.proxy)?;
        let token = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(token.clone()).await {
                tracing::error!("proxy stopped: {e}");
                token.cancel();
            }
        }))
    } else {
        None
    };

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let mut connected = handle.connected();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = connected.changed() => {
                if changed.is_err() {
                    break;
                }
                let up = *connected.borrow_and_update();
                debug!(connected = up, "connection status changed");
            }
        }
    }

    client.shutdown().await?;

    #[cfg(feature = "proxy")]
    {
        if let Some(task) = proxy_task {
            task.await.ok();
        }
    }

    Ok(())
}

/// Ask the backend who the stored token belongs to. Any failure means the
/// connection is opened without an identity.
async fn signed_in_user(api: &ApiClient) -> Option<u64> {
    api.auth_token()?;
    match api.auth().current_user().await {
        Ok(Some(user)) => {
            let id = user.get("id").and_then(|v| v.as_u64());
            info!(user_id = ?id, "signed in");
            id
        }
        Ok(None) => None,
        Err(ApiError::AuthorizationRequired) => {
            warn!("stored token rejected; connecting without identity");
            None
        }
        Err(e) => {
            warn!("cannot resolve current user: {e}");
            None
        }
    }
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
    user_id: Option<u64>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;
    let mut user_id = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: quadrant-live [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -u, --user <ID>            Identity to connect as (overrides config)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => match iter.next() {
                Some(path) => config_path = Some(path),
                None => {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            },
            "-u" | "--user" => match iter.next().map(|raw| raw.parse::<u64>()) {
                Some(Ok(id)) => user_id = Some(id),
                Some(Err(e)) => {
                    eprintln!("error: invalid user id: {e}");
                    std::process::exit(1);
                }
                None => {
                    eprintln!("error: -u/--user requires an id argument");
                    std::process::exit(1);
                }
            },
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (connection lifecycle, listener registration)
    //   -vvvv+  → trace  (every dispatched message)
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path, user_id }
}
