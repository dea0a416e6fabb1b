//! Lamp control commands exchanged with `lamp-srv`
//!
//! A command is carried by one [`Frame`]: the frame's `msg_type` is the
//! opcode and the payload holds the one-byte arguments.

use crate::Frame;

// Opcodes
pub const OP_DECLARE_CLIENT_TYPE: u16 = 0x0010;
pub const OP_DECLARE_CLIENT_TYPE_ACK: u16 = 0x0011;
pub const OP_DEVICE_STATE_CHANGED: u16 = 0x0012;
pub const OP_POWER_DEVICE_ON: u16 = 0x0013;
pub const OP_POWER_DEVICE_OFF: u16 = 0x0014;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("invalid opcode 0x{0:04x}")]
    InvalidOpcode(u16),
    #[error("incomplete {command} command: missing {missing}")]
    MissingArgument {
        command: &'static str,
        missing: &'static str,
    },
    #[error("invalid {command} command: too many arguments ({arguments:?})")]
    TooManyArguments {
        command: &'static str,
        arguments: Vec<u8>,
    },
    #[error("invalid {kind} 0x{byte:02x}")]
    InvalidArgument { kind: &'static str, byte: u8 },
    #[error("expected {expected}, got {got}")]
    Unexpected {
        expected: &'static str,
        got: &'static str,
    },
}

/// What kind of client is on the other end of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientType {
    /// A lamp
    Device,
    /// A person's switch (phone, desktop)
    User,
}

impl From<ClientType> for u8 {
    fn from(client_type: ClientType) -> u8 {
        match client_type {
            ClientType::Device => 0x20,
            ClientType::User => 0x21,
        }
    }
}

impl TryFrom<u8> for ClientType {
    type Error = CommandError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x20 => Ok(Self::Device),
            0x21 => Ok(Self::User),
            _ => Err(CommandError::InvalidArgument { kind: "client type", byte }),
        }
    }
}

/// Which person a client belongs to. Display only, not access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Arni,
    Ian,
}

impl Owner {
    /// The other half of the lamp pair
    pub fn partner(&self) -> Owner {
        match self {
            Owner::Arni => Owner::Ian,
            Owner::Ian => Owner::Arni,
        }
    }
}

impl From<Owner> for u8 {
    fn from(owner: Owner) -> u8 {
        match owner {
            Owner::Arni => 0x30,
            Owner::Ian => 0x31,
        }
    }
}

impl TryFrom<u8> for Owner {
    type Error = CommandError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x30 => Ok(Self::Arni),
            0x31 => Ok(Self::Ian),
            _ => Err(CommandError::InvalidArgument { kind: "owner", byte }),
        }
    }
}

impl std::str::FromStr for Owner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "arni" => Ok(Owner::Arni),
            "ian" => Ok(Owner::Ian),
            _ => Err(format!("invalid owner \"{}\"", s)),
        }
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::Arni => write!(f, "Arni"),
            Owner::Ian => write!(f, "Ian"),
        }
    }
}

/// State of one lamp as tracked by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// The lamp has no open connection to the server
    NotConnected,
    /// The lamp lost its server connection
    ServerOffline,
    Off,
    /// Switched on, partner lamp is off
    OnWaiting,
    /// Switched on together with the partner lamp
    OnPaired,
}

impl State {
    pub fn is_on(&self) -> bool {
        matches!(self, State::OnWaiting | State::OnPaired)
    }
}

impl From<State> for u8 {
    fn from(state: State) -> u8 {
        match state {
            State::NotConnected => 0x40,
            State::ServerOffline => 0x41,
            State::Off => 0x42,
            State::OnWaiting => 0x43,
            State::OnPaired => 0x44,
        }
    }
}

impl TryFrom<u8> for State {
    type Error = CommandError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x40 => Ok(Self::NotConnected),
            0x41 => Ok(Self::ServerOffline),
            0x42 => Ok(Self::Off),
            0x43 => Ok(Self::OnWaiting),
            0x44 => Ok(Self::OnPaired),
            _ => Err(CommandError::InvalidArgument { kind: "device state", byte }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    DeclareClientType(ClientType, Owner),
    DeclareClientTypeAck,
    DeviceStateChanged(State),
    PowerDeviceOn,
    PowerDeviceOff,
}

impl Command {
    pub fn opcode(&self) -> u16 {
        match self {
            Command::DeclareClientType(_, _) => OP_DECLARE_CLIENT_TYPE,
            Command::DeclareClientTypeAck => OP_DECLARE_CLIENT_TYPE_ACK,
            Command::DeviceStateChanged(_) => OP_DEVICE_STATE_CHANGED,
            Command::PowerDeviceOn => OP_POWER_DEVICE_ON,
            Command::PowerDeviceOff => OP_POWER_DEVICE_OFF,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::DeclareClientType(_, _) => "DeclareClientType",
            Command::DeclareClientTypeAck => "DeclareClientTypeAck",
            Command::DeviceStateChanged(_) => "DeviceStateChanged",
            Command::PowerDeviceOn => "PowerDeviceOn",
            Command::PowerDeviceOff => "PowerDeviceOff",
        }
    }

    pub fn to_frame(&self) -> Frame {
        let payload = match *self {
            Command::DeclareClientType(client_type, owner) => {
                vec![client_type.into(), owner.into()]
            }
            Command::DeviceStateChanged(state) => vec![state.into()],
            _ => Vec::new(),
        };
        Frame::new(self.opcode(), payload)
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, CommandError> {
        let args = frame.payload.as_slice();
        match frame.msg_type {
            OP_DECLARE_CLIENT_TYPE => match args {
                [] => Err(CommandError::MissingArgument {
                    command: "DeclareClientType",
                    missing: "client type, owner arguments",
                }),
                [_] => Err(CommandError::MissingArgument {
                    command: "DeclareClientType",
                    missing: "owner argument",
                }),
                [client_type, owner] => Ok(Command::DeclareClientType(
                    ClientType::try_from(*client_type)?,
                    Owner::try_from(*owner)?,
                )),
                _ => Err(too_many("DeclareClientType", args)),
            },
            OP_DEVICE_STATE_CHANGED => match args {
                [] => Err(CommandError::MissingArgument {
                    command: "DeviceStateChanged",
                    missing: "state argument",
                }),
                [state] => Ok(Command::DeviceStateChanged(State::try_from(*state)?)),
                _ => Err(too_many("DeviceStateChanged", args)),
            },
            OP_DECLARE_CLIENT_TYPE_ACK => no_arguments(Command::DeclareClientTypeAck, args),
            OP_POWER_DEVICE_ON => no_arguments(Command::PowerDeviceOn, args),
            OP_POWER_DEVICE_OFF => no_arguments(Command::PowerDeviceOff, args),
            other => Err(CommandError::InvalidOpcode(other)),
        }
    }
}

fn too_many(command: &'static str, args: &[u8]) -> CommandError {
    CommandError::TooManyArguments {
        command,
        arguments: args.to_vec(),
    }
}

fn no_arguments(command: Command, args: &[u8]) -> Result<Command, CommandError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(too_many(command.name(), args))
    }
}

impl From<Command> for Frame {
    fn from(command: Command) -> Frame {
        command.to_frame()
    }
}

impl TryFrom<&Frame> for Command {
    type Error = CommandError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        Command::from_frame(frame)
    }
}
