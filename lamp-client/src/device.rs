//! Device side: a lamp following the state the server pushes to it

use std::io;

use lamp_proto::{ClientType, Owner, State};
use tokio::net::ToSocketAddrs;

use crate::connection::Connection;

/// Run a lamp for `owner` until the server goes away
///
/// `on_state` sees every state the server sends, starting with the one
/// right after the declaration. When the server closes the connection
/// the lamp moves to [`State::ServerOffline`] and the loop returns it.
pub async fn run_device<F>(addr: impl ToSocketAddrs, owner: Owner, mut on_state: F) -> io::Result<State>
where
    F: FnMut(State),
{
    let mut conn = Connection::connect(addr).await?;
    conn.declare(ClientType::Device, owner).await?;
    tracing::info!(%owner, "lamp declared");

    let mut state = State::NotConnected;
    loop {
        match conn.receive_state().await {
            Ok(next) => {
                if next != state {
                    tracing::info!(%owner, from = ?state, to = ?next, "lamp state changed");
                }
                state = next;
                on_state(state);
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::warn!(%owner, "server went offline");
                state = State::ServerOffline;
                on_state(state);
                return Ok(state);
            }
            Err(e) => return Err(e),
        }
    }
}
