//! `nslookup` output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

static SERVER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Server:\s+(\S+)").unwrap());
static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Name:\s+(\S+)").unwrap());
static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Address(?:es)?(?:\s+\d+)?:\s+(\S+)").unwrap());

/// Result of a DNS lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsLookup {
    pub dns_server: String,
    pub domain_name: String,
    pub domain_ip_addr: Vec<String>,
}

impl DnsLookup {
    /// Parse the output of `nslookup DOMAIN [SERVER]`.
    ///
    /// Addresses carrying a `#port` suffix, or equal to the server before
    /// any `Name:` line, belong to the server and are skipped.
    pub fn parse(output: &str, domain: &str) -> Result<Self> {
        if output.contains("can't find") || output.contains("NXDOMAIN") {
            return Err(Error::UseCase(format!("DNS lookup of {domain} failed: {}", output.trim())));
        }

        let mut dns_server = None;
        let mut domain_name = None;
        let mut addresses = Vec::new();

        for line in output.lines().map(str::trim) {
            if let Some(caps) = SERVER_RE.captures(line) {
                dns_server = Some(caps[1].to_string());
            } else if let Some(caps) = NAME_RE.captures(line) {
                domain_name.get_or_insert_with(|| caps[1].to_string());
            } else if let Some(caps) = ADDRESS_RE.captures(line) {
                let addr = &caps[1];
                let is_server = domain_name.is_none() && dns_server.as_deref() == Some(addr);
                if !addr.contains('#') && !is_server {
                    addresses.push(addr.to_string());
                }
            }
        }

        let dns_server = dns_server.ok_or_else(|| {
            Error::UseCase(format!("no DNS server in nslookup output for {domain}"))
        })?;
        if addresses.is_empty() {
            return Err(Error::UseCase(format!("{domain} did not resolve via {dns_server}")));
        }

        Ok(Self {
            dns_server,
            domain_name: domain_name.unwrap_or_else(|| domain.to_string()),
            domain_ip_addr: addresses,
        })
    }
}
