//! Parsers for the output of common network tools.
//!
//! These turn what a shell prints into typed results; they never look
//! at protocol payloads themselves.

mod dns;
mod http;
mod ping;

pub use dns::DnsLookup;
pub use http::HttpResult;
pub use ping::{PingStatistics, RttStats};
