//! Template contracts.
//!
//! A template is a capability a device declares. Tests ask the device
//! manager for "the LAN" or "the provisioner", never for a concrete type,
//! so swapping a device in the inventory does not touch the tests.

use std::fmt;
use std::str::FromStr;

mod cpe;
mod lan;
mod provisioner;
mod sip;
mod tftp;
mod wan;
mod wlan;

pub use cpe::{Cpe, CpeHw, CpeSw};
pub use lan::Lan;
pub use provisioner::{Provisioner, Reservation};
pub use sip::{SipPhone, SipServer};
pub use tftp::Tftp;
pub use wan::Wan;
pub use wlan::{WifiBand, Wlan};

/// Capabilities a device can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Template {
    Cpe,
    Lan,
    Wan,
    Provisioner,
    SipServer,
    SipPhone,
    Tftp,
    Wlan,
}

impl Template {
    /// Every template, in declaration order.
    pub const ALL: [Template; 8] = [
        Template::Cpe,
        Template::Lan,
        Template::Wan,
        Template::Provisioner,
        Template::SipServer,
        Template::SipPhone,
        Template::Tftp,
        Template::Wlan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Template::Cpe => "CPE",
            Template::Lan => "LAN",
            Template::Wan => "WAN",
            Template::Provisioner => "Provisioner",
            Template::SipServer => "SIPServer",
            Template::SipPhone => "SIPPhone",
            Template::Tftp => "TFTP",
            Template::Wlan => "WLAN",
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a template name no device can satisfy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown template '{0}'")]
pub struct UnknownTemplate(pub String);

impl FromStr for Template {
    type Err = UnknownTemplate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownTemplate(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_names_round_trip() {
        for t in Template::ALL {
            assert_eq!(t.as_str().parse::<Template>().unwrap(), t);
        }
        assert_eq!("lan".parse::<Template>().unwrap(), Template::Lan);
        let err = "ACS".parse::<Template>().unwrap_err();
        assert_eq!(err, UnknownTemplate("ACS".into()));
        assert_eq!(err.to_string(), "unknown template 'ACS'");
    }
}
