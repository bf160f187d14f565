//! Interactive client for the echo server.
//!
//! Prints the banner, then sends each line from stdin and prints whatever the
//! server sends back until either side closes.

use anyhow::{Context, Result};
use clap::Parser;
use greensocket::{Family, SocketBuilder};
use std::io::{self, BufRead, Write};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "echo_client", about = "Line-oriented client for the echo server")]
struct Cli {
    /// Server host name or address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 1337)]
    port: u16,

    /// How long to wait for each reply, in milliseconds
    #[arg(long, default_value_t = 500)]
    reply_timeout: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let reply_timeout = Duration::from_millis(cli.reply_timeout);

    let mut socket = SocketBuilder::new(Family::Inet).build()?;
    socket
        .connect(&cli.host, cli.port, Some(Duration::from_secs(5)))
        .with_context(|| format!("failed to connect to {}:{}", cli.host, cli.port))?;

    let mut buffer = [0u8; 4096];
    let mut stdout = io::stdout();

    // Banner, plus anything else the server has queued.
    if !drain_replies(&socket, &mut buffer, reply_timeout, &mut stdout)? {
        return Ok(());
    }

    for line in io::stdin().lock().lines() {
        let mut line = line.context("failed to read stdin")?;
        line.push('\n');

        socket.write_all(line.as_bytes())?;

        if !drain_replies(&socket, &mut buffer, reply_timeout, &mut stdout)? {
            break;
        }
    }

    socket.close();
    Ok(())
}

/// Prints replies until the server goes quiet. Returns false once it closed.
fn drain_replies(
    socket: &greensocket::Socket,
    buffer: &mut [u8],
    timeout: Duration,
    out: &mut impl Write,
) -> Result<bool> {
    loop {
        match socket.read_with_timeout(buffer, Some(timeout)) {
            Ok(0) => {
                writeln!(out, "Connection closed by server")?;
                return Ok(false);
            }
            Ok(count) => {
                out.write_all(&buffer[..count])?;
                out.flush()?;
            }
            Err(error) if error.is_timeout() => return Ok(true),
            Err(error) => return Err(error.into()),
        }
    }
}
