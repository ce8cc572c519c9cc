use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use rmpv::Value;
use tracing::info;

use mux_rpc::client::{run_client, ClientArgs};
use mux_rpc::{
    init_logging, map_get, register_events, register_requests, Registry, Server, ServerConfig,
    ShutdownCoordinator, TlsConfig,
};

#[derive(Parser, Debug)]
#[command(name = "mux-rpc")]
#[command(about = "Pattern-addressed RPC over framed TCP", long_about = None)]
struct Opts {
    #[command(subcommand)]
    cmd: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the RPC server with the demo handlers
    Server {
        #[arg(short, long, default_value = "127.0.0.1:4000")]
        addr: String,

        /// PEM certificate path; enables TLS together with --key
        #[arg(long, requires = "key")]
        cert: Option<PathBuf>,

        /// PEM private key path
        #[arg(long, requires = "cert")]
        key: Option<PathBuf>,
    },

    /// Run a one-shot client request or event
    Client {
        #[command(flatten)]
        client: ClientArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    match opts.cmd {
        Mode::Server { addr, cert, key } => run_server(addr, cert, key).await?,
        Mode::Client { client } => run_client(client).await?,
    }
    Ok(())
}

async fn run_server(addr: String, cert: Option<PathBuf>, key: Option<PathBuf>) -> anyhow::Result<()> {
    init_logging();

    let mut config = ServerConfig::new(addr, demo_registry());
    if let (Some(cert), Some(key)) = (cert, key) {
        config = config.with_tls(TlsConfig::from_files(cert, key)?);
    }

    let server = Server::bind(config).await?;

    let coordinator = Arc::new(ShutdownCoordinator::new());
    let signals = coordinator.clone();
    tokio::spawn(async move { signals.wait_for_signal().await });

    coordinator.triggered().await;
    server.shutdown().await;
    info!(metrics = ?server.metrics(), "served");
    Ok(())
}

fn demo_registry() -> Registry {
    let mut registry = Registry::new();

    register_requests!(registry, {
        "math.add" => |data: Value| async move {
            let a = map_get(&data, "a")
                .and_then(Value::as_i64)
                .ok_or_else(|| anyhow!("missing numeric 'a'"))?;
            let b = map_get(&data, "b")
                .and_then(Value::as_i64)
                .ok_or_else(|| anyhow!("missing numeric 'b'"))?;
            Ok(Some(Value::from(a + b)))
        },
        "echo" => |data: Value| async move { Ok(Some(data)) },
    });

    register_events!(registry, {
        "user.created" => |data: Value| async move {
            info!(user = %data, "user.created event received");
            Ok(None)
        },
    });

    registry
}
