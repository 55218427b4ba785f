//! Interactive console layer.
//!
//! A [`Console`] owns one child process (ssh, telnet, a local shell, a
//! serial terminal program) and drives it as a text channel: send a line,
//! then wait for a regex or literal under a timeout.

mod buffer;
mod interactive;
mod patterns;
mod pty;
mod transcript;

pub use buffer::PatternBuffer;
pub use interactive::{InteractiveBuilder, InteractiveEvent, InteractiveResult, InteractiveStep};
pub use patterns::{ExpectPattern, Found, compile_all, compile_prompts};
pub use pty::{
    Console, ConsoleConfig, ConsoleStream, DEFAULT_TIMEOUT, ExpectMatch, SpawnSpec,
    normalize_newlines, strip_command_echo,
};
pub use transcript::{RecentOutput, Transcript};
