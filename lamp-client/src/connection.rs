//! Connection to the lamp server

use std::io;

use lamp_proto::async_io::{read_command, write_command};
use lamp_proto::{ClientType, Command, CommandError, Owner, State};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, ToSocketAddrs};

fn unexpected(expected: &'static str, got: &Command) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        CommandError::Unexpected {
            expected,
            got: got.name(),
        },
    )
}

/// A connection to `lamp-srv`
pub struct Connection {
    stream: TcpStream,
    owner: Option<Owner>,
}

impl Connection {
    /// Open a connection. Nothing is sent until the client declares itself.
    pub async fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            owner: None,
        })
    }

    /// Close the connection
    pub async fn disconnect(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(error = %e, "shutdown failed");
        }
    }

    /// Owner this connection was declared for, if any
    pub fn owner(&self) -> Option<Owner> {
        self.owner
    }

    /// Tell the server who we are and wait for the ack
    pub async fn declare(&mut self, client_type: ClientType, owner: Owner) -> io::Result<()> {
        write_command(&mut self.stream, Command::DeclareClientType(client_type, owner)).await?;
        match read_command(&mut self.stream).await? {
            Command::DeclareClientTypeAck => {
                self.owner = Some(owner);
                Ok(())
            }
            other => Err(unexpected("DeclareClientTypeAck", &other)),
        }
    }

    /// Declare a user switch for `owner`. Returns false if the server did
    /// not acknowledge.
    pub async fn declare_client_connection(&mut self, owner: Owner) -> bool {
        match self.declare(ClientType::User, owner).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%owner, error = %e, "declaring client failed");
                false
            }
        }
    }

    /// Switch our lamp on. True if it is on afterwards.
    pub async fn power_on(&mut self) -> bool {
        match self.power(Command::PowerDeviceOn).await {
            Ok(state) => state.is_on(),
            Err(e) => {
                tracing::warn!(error = %e, "power on failed");
                false
            }
        }
    }

    /// Switch our lamp off. True if it is off afterwards.
    pub async fn power_off(&mut self) -> bool {
        match self.power(Command::PowerDeviceOff).await {
            Ok(state) => state == State::Off,
            Err(e) => {
                tracing::warn!(error = %e, "power off failed");
                false
            }
        }
    }

    async fn power(&mut self, command: Command) -> io::Result<State> {
        if self.owner.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "client type not declared",
            ));
        }
        write_command(&mut self.stream, command).await?;
        self.receive_state().await
    }

    /// Wait for the next state the server sends
    pub async fn receive_state(&mut self) -> io::Result<State> {
        match read_command(&mut self.stream).await? {
            Command::DeviceStateChanged(state) => Ok(state),
            other => Err(unexpected("DeviceStateChanged", &other)),
        }
    }
}
