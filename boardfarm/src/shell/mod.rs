//! Shell definitions.
//!
//! A shell definition bundles the prompt set, logout command and
//! post-login commands of a flavour of device command line. The
//! connection factory receives one and configures the console with it.

pub mod builtin;
mod definition;
mod registry;

pub use definition::ShellDefinition;
pub use registry::{ShellRegistry, lookup};
