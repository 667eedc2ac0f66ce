use clap::Parser;
use color_eyre::{eyre::Report, eyre::WrapErr};
use futures::{FutureExt, SinkExt};
use std::net::ToSocketAddrs;
use std::time::{Duration, Instant};
use teerank_codec::BackendCodec;
use tokio::net::UdpSocket;
use tokio_stream::StreamExt;
use tokio_util::udp::UdpFramed;
use tracing::{debug, info, warn};

mod game_server;
mod master_server;
mod pool;
mod rank;
mod server;
mod store;

use game_server::GameServer;
use master_server::MasterServer;
use pool::ServerPool;
use server::Server;
use store::{MemoryStore, Store, DEFAULT_MASTER_SERVERS};

#[derive(Parser, Debug)]
struct Opts {
    /// UDP port to bind
    #[clap(short, long, env = "TEERANK_BACKEND_PORT", default_value = "8311")]
    port: u16,

    /// Host to bind
    #[clap(long, env = "TEERANK_BACKEND_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Master servers to poll when the store lists none (comma separated)
    #[clap(
        short,
        long,
        env = "TEERANK_MASTERS",
        use_value_delimiter = true,
        value_delimiter = ','
    )]
    masters: Vec<String>,
}

#[tokio::main]
pub async fn main() -> Result<(), Report> {
    install_tracing();

    color_eyre::install()?;

    let opts: Opts = Opts::parse();
    debug!(?opts, "Parsed CLI options");

    let store = MemoryStore::new();
    let now = Instant::now();

    let master_addresses = {
        let stored = store.list_master_servers()?;
        if !stored.is_empty() {
            stored
        } else if !opts.masters.is_empty() {
            opts.masters.clone()
        } else {
            DEFAULT_MASTER_SERVERS.iter().map(|s| s.to_string()).collect()
        }
    };
    let game_addresses = store.list_game_servers()?;

    let socket = UdpSocket::bind((opts.host.as_str(), opts.port))
        .await
        .wrap_err_with(|| format!("Failed to bind UDP socket on {}:{}", opts.host, opts.port))?;
    info!(local_addr = % socket.local_addr()?, "Bound UDP socket");

    let mut pool = ServerPool::new(store);

    for address in master_addresses {
        // Master server addresses may carry a DNS name and must be resolved
        // before use. An unresolvable master is skipped, not fatal.
        match address.to_socket_addrs().map(|mut addrs| addrs.next()) {
            Ok(Some(socket_address)) => {
                pool.add(Server::Master(MasterServer::new(address, socket_address)), now);
            }
            Ok(None) => warn!(master_server = %address, "Master server resolves to no address"),
            Err(error) => {
                warn!(master_server = %address, "Failed to resolve master server: {}", error)
            }
        }
    }

    for address in game_addresses {
        // Game server addresses are already numeric.
        match address.parse() {
            Ok(socket_address) => {
                let snapshot = pool.store().load_game_server(&address)?;
                pool.add(
                    Server::Game(GameServer::with_snapshot(socket_address, snapshot)),
                    now,
                );
            }
            Err(_) => warn!(game_server = %address, "Ignoring unparseable game server address"),
        }
    }

    info!(servers = pool.len(), "Starting poll loop");

    let mut framed = UdpFramed::new(socket, BackendCodec::new());
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        ticker.tick().await;

        // Drain whatever arrived since the last tick; never block on the
        // socket.
        while let Some(Some(datagram)) = framed.next().now_or_never() {
            match datagram {
                Ok((reply, from)) => pool.route(from, reply),
                Err(error) => info!("Dropping packet: {}", error),
            }
        }

        let now = Instant::now();
        pool.close_rounds(now);

        for (request, to) in pool.start_batch(now) {
            if let Err(error) = framed.send((request, to)).await {
                warn!(%to, "Failed to send request: {}", error);
            }
        }
    }
}

fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let fmt_layer = fmt::layer().with_target(false);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}
