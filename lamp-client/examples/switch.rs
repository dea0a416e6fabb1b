//! Switch - turn a lamp on or off
//!
//! Usage:
//!   LAMP_SERVER=127.0.0.1:8182 cargo run --example switch -p lamp-client -- <owner> <on|off>

use lamp_client::{Connection, DEFAULT_SERVER_ADDR, Owner};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: switch <arni|ian> <on|off>");
        std::process::exit(1);
    }
    let owner: Owner = args[1].parse()?;
    let addr = std::env::var("LAMP_SERVER").unwrap_or_else(|_| DEFAULT_SERVER_ADDR.to_string());

    let mut conn = Connection::connect(addr.as_str()).await?;
    if !conn.declare_client_connection(owner).await {
        return Err("server refused the switch".into());
    }

    let ok = match args[2].as_str() {
        "on" => conn.power_on().await,
        "off" => conn.power_off().await,
        other => {
            eprintln!("Unknown command: {}", other);
            std::process::exit(1);
        }
    };
    conn.disconnect().await;

    if ok {
        println!("{}'s lamp is {}", owner, args[2]);
    } else {
        println!("{}'s lamp did not switch {}", owner, args[2]);
    }
    Ok(())
}
