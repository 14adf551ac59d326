//! Novagate gateway server.
//!
//! Loads configuration (defaults < TOML file < `NOVAGATE_*` env < flags),
//! registers the demo command table through the payload dispatcher, and
//! serves until ctrl-c.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use novagate::config::GatewayConfig;
use novagate::protocol::commands::{CMD_ORDER_CREATE, CMD_PING, CMD_USER_LOGIN};
use novagate::protocol::{register_full_method_command, set_strict_command_mapping};
use novagate::{bridge_handler, Dispatcher, RequestContext, Router, Server};

#[derive(Parser, Debug)]
#[command(name = "novagate-server", about = "Novagate protocol gateway")]
struct Args {
    /// Path to a TOML config file (default: novagate.toml, if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:9000.
    #[arg(long)]
    addr: Option<String>,

    /// Connection idle timeout in seconds (0 disables).
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    /// Response write timeout in seconds (0 disables).
    #[arg(long)]
    write_timeout_secs: Option<u64>,
}

fn setup_router() -> Router {
    // Stable command table; unknown methods must not hash-map silently.
    register_full_method_command("NovaService.Ping", CMD_PING);
    register_full_method_command("UserService.Login", CMD_USER_LOGIN);
    register_full_method_command("OrderService.Create", CMD_ORDER_CREATE);
    set_strict_command_mapping(true);

    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.register(CMD_PING, |_ctx: RequestContext, _payload: Bytes| async {
        Ok(Bytes::from_static(b"pong"))
    });
    dispatcher.register(CMD_USER_LOGIN, |_ctx: RequestContext, _payload: Bytes| async {
        Ok(Bytes::from_static(b"ok"))
    });
    dispatcher.register(CMD_ORDER_CREATE, |_ctx: RequestContext, _payload: Bytes| async {
        Ok(Bytes::from_static(b"ok"))
    });

    let router = Router::new();
    for cmd in [CMD_PING, CMD_USER_LOGIN, CMD_ORDER_CREATE] {
        router.register(cmd, bridge_handler(cmd, dispatcher.clone()));
    }
    router
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = GatewayConfig::load(args.config.as_deref())?;

    let mut server_config = config.server_config();
    if let Some(addr) = args.addr {
        server_config.addr = addr;
    }
    if let Some(secs) = args.idle_timeout_secs {
        server_config.idle_timeout = std::time::Duration::from_secs(secs);
    }
    if let Some(secs) = args.write_timeout_secs {
        server_config.write_timeout = std::time::Duration::from_secs(secs);
    }

    let listener = TcpListener::bind(&server_config.addr)
        .await
        .with_context(|| format!("bind {}", server_config.addr))?;
    tracing::info!(addr = %server_config.addr, "novagate listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let server = Server::new(setup_router()).with_config(server_config);
    server.serve_with_shutdown(listener, shutdown_rx).await?;
    tracing::info!("novagate stopped");
    Ok(())
}
