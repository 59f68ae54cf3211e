//! Open a listen stream, print updates for a while, then cancel it.
//!
//! Usage:
//!   cargo run --example listen -- <address:port> <username> <password> [command]
//!
//! The command defaults to `/ip/firewall/address-list/listen`.

use std::time::Duration;

use rosapi::{Client, ClientConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let address = args.next().unwrap_or_else(|| "127.0.0.1:8728".to_string());
    let username = args.next().unwrap_or_else(|| "admin".to_string());
    let password = args.next().unwrap_or_default();
    let command = args
        .next()
        .unwrap_or_else(|| "/ip/firewall/address-list/listen".to_string());

    let stream = std::net::TcpStream::connect(address.as_str())?;
    let client = Client::with_config(
        stream,
        ClientConfig {
            queue: 100,
            ..ClientConfig::default()
        },
    )?;
    client.login(&username, &password)?;

    let listener = client.listen([command.as_str()])?;
    eprintln!("listening as {}; cancelling in 10s", listener.tag());

    std::thread::scope(|scope| -> rosapi::Result<()> {
        scope.spawn(|| {
            std::thread::sleep(Duration::from_secs(10));
            if let Err(err) = listener.cancel() {
                eprintln!("cancel failed: {err}");
            }
        });

        for sentence in listener.iter() {
            println!("{sentence}");
        }
        Ok(())
    })?;

    if let Some(err) = listener.err() {
        return Err(err.into());
    }
    client.close();
    Ok(())
}
