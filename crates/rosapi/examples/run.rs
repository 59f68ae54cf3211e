//! Run one command and print the reply.
//!
//! Usage:
//!   cargo run --example run -- <address:port> <username> <password> [command...]
//!
//! The command defaults to `/system/resource/print`.

use rosapi::Client;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let address = args.next().unwrap_or_else(|| "127.0.0.1:8728".to_string());
    let username = args.next().unwrap_or_else(|| "admin".to_string());
    let password = args.next().unwrap_or_default();
    let command: Vec<String> = {
        let rest: Vec<String> = args.collect();
        if rest.is_empty() {
            vec!["/system/resource/print".to_string()]
        } else {
            rest
        }
    };

    let client = Client::connect(address.as_str(), &username, &password)?;
    let reply = client.run(command)?;
    println!("{reply}");

    if let Some(trap) = reply.trap {
        eprintln!("device reported: {trap}");
    }

    client.close();
    Ok(())
}
