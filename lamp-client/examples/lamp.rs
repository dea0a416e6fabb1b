//! Lamp - stand-in for a lamp device, prints every state it is sent
//!
//! Usage:
//!   LAMP_SERVER=127.0.0.1:8182 cargo run --example lamp -p lamp-client -- <owner>

use lamp_client::{DEFAULT_SERVER_ADDR, Owner, State, run_device};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let owner: Owner = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => {
            eprintln!("Usage: lamp <arni|ian>");
            std::process::exit(1);
        }
    };
    let addr = std::env::var("LAMP_SERVER").unwrap_or_else(|_| DEFAULT_SERVER_ADDR.to_string());

    run_device(addr.as_str(), owner, |state| {
        let light = match state {
            State::OnPaired => "on (paired)",
            State::OnWaiting => "on (waiting)",
            State::Off => "off",
            State::NotConnected | State::ServerOffline => "offline",
        };
        println!("{}'s lamp: {}", owner, light);
    })
    .await?;
    Ok(())
}
