//! Datagram round trip on the loopback interface.
//!
//! Binds a UDP socket, sends it two datagrams from a second socket and prints
//! what arrives along with the sender address.

use anyhow::Result;
use clap::Parser;
use greensocket::{Address, Family, SocketBuilder, SocketType};
use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "udp_demo", about = "Sends two datagrams to a local UDP socket")]
struct Cli {
    /// Port to receive on; 0 picks a free one
    #[arg(short, long, default_value_t = 0)]
    port: u16,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut receiver = SocketBuilder::new(Family::Inet)
        .socket_type(SocketType::Datagram)
        .read_timeout(Duration::from_secs(2))
        .build()?;
    receiver.listen(cli.port, 0)?;

    let port = receiver
        .listening_port()
        .ok_or_else(|| anyhow::anyhow!("receiver has no bound port"))?;
    let target = Address::ipv4(Ipv4Addr::LOCALHOST, port);

    let sender = SocketBuilder::new(Family::Inet)
        .socket_type(SocketType::Datagram)
        .build()?;

    for message in ["Hello, datagram!", "Second datagram"] {
        sender.write_to(message.as_bytes(), &target)?;
    }

    let mut buffer = [0u8; 1024];
    for _ in 0..2 {
        let (count, from) = receiver.read_datagram(&mut buffer)?;
        let from = from.map_or_else(|| "unknown".to_string(), |address| address.to_string());
        println!(
            "Received {} bytes from {}: {}",
            count,
            from,
            String::from_utf8_lossy(&buffer[..count])
        );
    }

    Ok(())
}
