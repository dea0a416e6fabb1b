//! Lamp client - talks to `lamp-srv` as a user switch or as a lamp
//!
//! A switch opens a [`Connection`], declares itself with
//! [`Connection::declare_client_connection`] and then calls
//! [`Connection::power_on`] / [`Connection::power_off`]. A lamp hands its
//! owner to [`run_device`] and follows the states the server pushes.

mod connection;
mod device;

pub use connection::Connection;
pub use device::run_device;

pub use lamp_proto::{ClientType, Owner, State};

/// Where `lamp-srv` listens unless told otherwise
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8182";
