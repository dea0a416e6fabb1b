mod router;
mod server;
mod session;

use server::Server;
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser)]
#[command(name = "lamp-srv")]
#[command(about = "Pairs lamp switches with their lamps")]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8182")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli: Cli = clap::Parser::parse();
    let server = Server::bind(&cli.bind).await?;
    server.run().await?;
    Ok(())
}
