//! Length-prefixed message exchange over TCP.
//!
//! A server thread receives one framed message and prints it; the main
//! thread connects and sends it.

use anyhow::{Context, Result};
use clap::Parser;
use greensocket::{Family, MessageFramer, SocketBuilder};
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "message_demo", about = "Sends one framed message over loopback TCP")]
struct Cli {
    /// Message to send
    #[arg(default_value = "Hello Swift World!")]
    message: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let timeout = Some(Duration::from_secs(5));

    let mut listener = SocketBuilder::new(Family::Inet)
        .read_timeout(Duration::from_secs(5))
        .build()?;
    listener.listen(0, 1)?;
    let port = listener
        .listening_port()
        .context("listener has no bound port")?;

    let server = thread::spawn(move || -> Result<String> {
        let connection = listener.accept_client_connection()?;
        let mut payload = Vec::new();
        let count = connection.recv_message(&mut payload, timeout)?;
        Ok(String::from_utf8_lossy(&payload[..count]).into_owned())
    });

    let mut client = SocketBuilder::new(Family::Inet).build()?;
    client.connect("127.0.0.1", port, timeout)?;
    let sent = client.send_message(cli.message.as_bytes(), timeout)?;
    println!("Sent {} bytes (2 byte header + {} byte payload)", sent, cli.message.len());

    let received = server
        .join()
        .map_err(|_| anyhow::anyhow!("server thread panicked"))??;
    println!("Received message: {}", received);

    Ok(())
}
