//! TCP server setup and connection handling

use std::sync::Arc;
use tokio::net::TcpListener;

use crate::router::Router;
use crate::session::Session;

pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
}

impl Server {
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(address = %listener.local_addr()?, "lamp server listening");

        Ok(Self {
            listener,
            router: Router::new(),
        })
    }

    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let router = self.router.clone();

            tokio::spawn(async move {
                tracing::info!(%addr, "incoming connection");
                if let Err(e) = Session::new(stream, router).run().await {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        tracing::info!(%addr, "connection closed");
                    } else {
                        tracing::error!(%addr, error = %e, "error handling connection");
                    }
                }
            });
        }
    }
}
