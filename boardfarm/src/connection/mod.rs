//! Connection factory.
//!
//! Turns a transport kind (`ssh`, `local_cmd`, `telnet`, `ser2net`) plus
//! endpoint parameters into a [`Console`](crate::console::Console) that
//! sits at the device's shell prompt.

mod builder;
mod config;
mod factory;

pub use builder::ConnectionBuilder;
pub use config::{ConnectionKind, ConnectionParams, UnknownConnectionKind};
pub use factory::{connection_factory, find_in_path, spawn_spec};
