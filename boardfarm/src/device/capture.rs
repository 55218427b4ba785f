//! Scoped packet captures.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use super::linux::LinuxDevice;
use crate::error::{DeviceError, Result};

static JOB_PID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]\s+(\d+)").unwrap());

/// A running `tcpdump` on a device.
///
/// The capture keeps the device borrowed; it derefs to the device so
/// traffic can be generated while it runs. Call [`stop`](Self::stop) to
/// end it. Dropping it without stopping queues `kill` on the console so
/// the next command on that console ends the capture.
pub struct TcpdumpCapture<'a> {
    device: &'a mut LinuxDevice,
    pid: u32,
    fname: String,
    stopped: bool,
}

impl<'a> TcpdumpCapture<'a> {
    /// Start `tcpdump -w fname` on `iface` in the background.
    pub async fn start(
        device: &'a mut LinuxDevice,
        fname: &str,
        iface: &str,
        extra: Option<&str>,
    ) -> Result<Self> {
        let mut command = format!("tcpdump -U -i {iface} -n -w {fname}");
        if let Some(extra) = extra {
            command.push(' ');
            command.push_str(extra);
        }
        command.push_str(" &");

        let output = device.execute(&command).await?;
        let pid = JOB_PID_RE
            .captures(&output)
            .and_then(|c| c[1].parse().ok())
            .ok_or_else(|| DeviceError::UnexpectedOutput {
                device: device.name().to_string(),
                command: command.clone(),
                output: output.trim().to_string(),
            })?;
        debug!("[{}] tcpdump on {} running as {}", device.name(), iface, pid);

        Ok(Self {
            device,
            pid,
            fname: fname.to_string(),
            stopped: false,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Capture file on the device.
    pub fn fname(&self) -> &str {
        &self.fname
    }

    /// Kill tcpdump and flush the file. Returns the capture file name.
    pub async fn stop(mut self) -> Result<String> {
        self.stopped = true;
        let command = format!("kill {}; sync", self.pid);
        self.device
            .execute_with_timeout(&command, Duration::from_secs(30))
            .await?;
        Ok(std::mem::take(&mut self.fname))
    }
}

impl LinuxDevice {
    /// Start a packet capture. See [`TcpdumpCapture`].
    pub async fn tcpdump_capture(
        &mut self,
        fname: &str,
        iface: &str,
        extra: Option<&str>,
    ) -> Result<TcpdumpCapture<'_>> {
        TcpdumpCapture::start(self, fname, iface, extra).await
    }
}

impl Deref for TcpdumpCapture<'_> {
    type Target = LinuxDevice;

    fn deref(&self) -> &LinuxDevice {
        self.device
    }
}

impl DerefMut for TcpdumpCapture<'_> {
    fn deref_mut(&mut self) -> &mut LinuxDevice {
        self.device
    }
}

impl Drop for TcpdumpCapture<'_> {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        warn!(
            "[{}] tcpdump {} dropped without stop(); queueing kill",
            self.device.name(),
            self.pid
        );
        let pid = self.pid;
        match self.device.console() {
            Ok(console) => console.defer_cleanup(format!("kill {pid}; sync")),
            Err(e) => warn!("tcpdump {} left running: {}", pid, e),
        }
    }
}
