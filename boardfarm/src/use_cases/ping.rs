//! `ping` summary lines.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

static SUMMARY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received(?:, \+\d+ errors)?, ([\d.]+)% packet loss")
        .unwrap()
});
static RTT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"min/avg/max(?:/(?:mdev|stddev))? = ([\d.]+)/([\d.]+)/([\d.]+)").unwrap()
});

/// Round-trip times in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RttStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// Summary printed at the end of a ping run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingStatistics {
    pub transmitted: u32,
    pub received: u32,
    pub packet_loss: f64,
    pub rtt: Option<RttStats>,
}

impl PingStatistics {
    /// Parse iputils or busybox ping output.
    pub fn parse(output: &str) -> Result<Self> {
        let caps = SUMMARY_RE.captures(output).ok_or_else(|| {
            Error::UseCase(format!("no ping statistics in output: {}", output.trim()))
        })?;
        let number = |i: usize| caps[i].parse::<u32>().unwrap_or_default();
        let rtt = RTT_RE.captures(output).map(|r| RttStats {
            min: r[1].parse().unwrap_or_default(),
            avg: r[2].parse().unwrap_or_default(),
            max: r[3].parse().unwrap_or_default(),
        });

        Ok(Self {
            transmitted: number(1),
            received: number(2),
            packet_loss: caps[3].parse().unwrap_or(100.0),
            rtt,
        })
    }

    /// Every packet came back.
    pub fn is_success(&self) -> bool {
        self.received > 0 && self.packet_loss == 0.0
    }
}
