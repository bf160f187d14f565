//! Echo server demo.
//!
//! Listens on the given port, greets each client and echoes everything it
//! receives. A client typing `QUIT` ends its own session; `SHUTDOWN` stops
//! the whole server. SIGINT and SIGTERM shut down the same way.

use anyhow::{Context, Result};
use clap::Parser;
use greensocket::{EchoServer, Family, ServerConfig, ServerState};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "echo_server", about = "Multi-client echo server with QUIT and SHUTDOWN commands")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = 1337)]
    port: u16,

    /// Pending connection queue length
    #[arg(short, long, default_value_t = 128)]
    backlog: i32,

    /// Listen on IPv6 instead of IPv4
    #[arg(long)]
    ipv6: bool,

    /// Per-connection read/write timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = ServerConfig::new()
        .port(cli.port)
        .backlog(cli.backlog)
        .family(if cli.ipv6 { Family::Inet6 } else { Family::Inet })
        .connection_timeout(cli.timeout.map(Duration::from_secs));

    let server = EchoServer::bind(config)
        .with_context(|| format!("failed to start echo server on port {}", cli.port))?;

    println!(
        "Listening on port {}",
        server.local_port().unwrap_or(cli.port)
    );

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    {
        use signal_hook::consts::signal::{SIGINT, SIGTERM};
        use signal_hook::flag;
        flag::register(SIGINT, Arc::clone(&shutdown_requested))?;
        flag::register(SIGTERM, Arc::clone(&shutdown_requested))?;
    }

    let handle = server.handle();
    thread::Builder::new()
        .name("signal-watcher".to_string())
        .spawn(move || {
            while handle.state() == ServerState::Running {
                if shutdown_requested.load(Ordering::Relaxed) {
                    log::info!("Signal received, shutting down");
                    handle.shutdown();
                    break;
                }
                thread::sleep(SIGNAL_POLL_INTERVAL);
            }
        })
        .context("failed to spawn signal watcher")?;

    server.run()?;

    println!("Server terminated");
    Ok(())
}
