//! Session: handles a single client connection

use std::io;
use std::sync::Arc;

use lamp_proto::async_io::{read_command, write_command};
use lamp_proto::{ClientType, Command, CommandError, Owner, State};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use crate::router::Router;

fn unexpected(expected: &'static str, got: &Command) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        CommandError::Unexpected {
            expected,
            got: got.name(),
        },
    )
}

pub struct Session<S> {
    stream: S,
    router: Arc<Router>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    pub fn new(stream: S, router: Arc<Router>) -> Self {
        Self { stream, router }
    }

    pub async fn run(mut self) -> io::Result<()> {
        let command = read_command(&mut self.stream).await?;
        let Command::DeclareClientType(client_type, owner) = command else {
            return Err(unexpected("DeclareClientType", &command));
        };
        write_command(&mut self.stream, Command::DeclareClientTypeAck).await?;

        match client_type {
            ClientType::Device => self.run_device(owner).await,
            ClientType::User => self.run_user(owner).await,
        }
    }

    async fn run_device(&mut self, owner: Owner) -> io::Result<()> {
        tracing::info!(%owner, "device connected");
        let token = self.router.device_connected(owner);
        let mut states = self.router.subscribe(owner);

        let result = self.push_states(&mut states).await;

        self.router.device_disconnected(owner, token);
        tracing::info!(%owner, "device disconnected");
        result
    }

    async fn push_states(&mut self, states: &mut watch::Receiver<State>) -> io::Result<()> {
        let state = *states.borrow_and_update();
        write_command(&mut self.stream, Command::DeviceStateChanged(state)).await?;

        loop {
            tokio::select! {
                changed = states.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    let state = *states.borrow_and_update();
                    tracing::debug!(?state, "sending new state to device");
                    write_command(&mut self.stream, Command::DeviceStateChanged(state)).await?;
                }

                // devices only listen; a read ends when they hang up
                command = read_command(&mut self.stream) => {
                    let command = command?;
                    return Err(unexpected("nothing", &command));
                }
            }
        }
    }

    async fn run_user(&mut self, owner: Owner) -> io::Result<()> {
        tracing::info!(%owner, "user connected");
        loop {
            let command = read_command(&mut self.stream).await?;
            let state = match command {
                Command::PowerDeviceOn => self.router.power_on(owner),
                Command::PowerDeviceOff => self.router.power_off(owner),
                other => return Err(unexpected("PowerDeviceOn or PowerDeviceOff", &other)),
            };
            tracing::info!(%owner, command = command.name(), ?state, "user command");
            write_command(&mut self.stream, Command::DeviceStateChanged(state)).await?;
        }
    }
}
