//! Linux device base.
//!
//! [`LinuxDevice`] is what concrete devices are built from: it owns the
//! inventory record, the parsed options and the consoles, and carries the
//! shell helpers every Linux-flavoured device shares.

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use super::DeviceSettings;
use super::options::DeviceOptions;
use crate::connection::{ConnectionKind, ConnectionParams, connection_factory};
use crate::console::Console;
use crate::error::{DeviceError, Error, InventoryError, Result};
use crate::inventory::DeviceRecord;
use crate::shell::{self, ShellDefinition};
use crate::use_cases::{DnsLookup, HttpResult, PingStatistics};

/// Role of the console every device opens first.
pub const DEFAULT_ROLE: &str = "console";

const STATUS_MARKER: &str = "__bft_rc=";

static IPV4_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"inet (?:addr:)?(\d{1,3}(?:\.\d{1,3}){3})").unwrap());
static IPV6_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"inet6 (?:addr:\s*)?([0-9a-fA-F:]+)/\d+ (?:[Ss]cope:?\s*)?(\w+)").unwrap());
static MAC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b([0-9a-f]{2}(?::[0-9a-f]{2}){5})\b").unwrap());
static LINK_UP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*\bUP\b[^>]*>").unwrap());
static GATEWAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"default via (\S+)").unwrap());
static MD5_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([0-9a-f]{32})\b").unwrap());
static STATUS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"__bft_rc=(\d+)").unwrap());

/// Address scope for [`LinuxDevice::get_interface_ipv6addr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ipv6Scope {
    #[default]
    Global,
    LinkLocal,
}

impl Ipv6Scope {
    fn matches(&self, scope: &str) -> bool {
        match self {
            Ipv6Scope::Global => scope.eq_ignore_ascii_case("global"),
            Ipv6Scope::LinkLocal => scope.eq_ignore_ascii_case("link"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkState::Up => "up",
            LinkState::Down => "down",
        })
    }
}

/// Options for [`LinuxDevice::ping`].
#[derive(Debug, Clone)]
pub struct PingOptions {
    pub count: u32,
    pub iface: Option<String>,
    /// Extra `ping` arguments, passed through verbatim.
    pub extra: Option<String>,
    pub timeout: Duration,
}

impl Default for PingOptions {
    fn default() -> Self {
        Self {
            count: 4,
            iface: None,
            extra: None,
            timeout: Duration::from_secs(50),
        }
    }
}

impl PingOptions {
    pub fn count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn iface(mut self, iface: impl Into<String>) -> Self {
        self.iface = Some(iface.into());
        self
    }

    pub fn extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, host: &str) -> String {
        let mut cmd = format!("ping -c {}", self.count);
        if let Some(iface) = &self.iface {
            cmd.push_str(&format!(" -I {iface}"));
        }
        if let Some(extra) = &self.extra {
            cmd.push(' ');
            cmd.push_str(extra);
        }
        cmd.push(' ');
        cmd.push_str(host);
        cmd
    }
}

/// Inventory record, options and consoles of a Linux-flavoured device.
pub struct LinuxDevice {
    record: DeviceRecord,
    options: DeviceOptions,
    kind: ConnectionKind,
    shell: ShellDefinition,
    settings: DeviceSettings,
    consoles: IndexMap<String, Console>,
    shut_down: bool,
}

impl LinuxDevice {
    /// Bind a record. No console is opened here.
    ///
    /// `accepted_options` is the option set of the concrete device type.
    pub fn new(record: DeviceRecord, settings: DeviceSettings, accepted_options: &[&str]) -> Result<Self> {
        let kind = record.connection_kind()?;
        let shell_name = record.shell.as_deref().unwrap_or("bash");
        let shell = shell::lookup(shell_name).map_err(|_| InventoryError::InvalidRecord {
            name: record.name.clone(),
            message: format!("unknown shell '{shell_name}'"),
        })?;
        if matches!(kind, ConnectionKind::Ssh | ConnectionKind::Telnet) && record.ipaddr.is_none() {
            return Err(InventoryError::InvalidRecord {
                name: record.name.clone(),
                message: format!("connection_type '{}' needs 'ipaddr'", record.connection_type),
            }
            .into());
        }
        if matches!(kind, ConnectionKind::LocalCmd | ConnectionKind::Ser2Net) && record.conn_cmd.is_none() {
            return Err(InventoryError::InvalidRecord {
                name: record.name.clone(),
                message: format!("connection_type '{}' needs 'conn_cmd'", record.connection_type),
            }
            .into());
        }
        let options = DeviceOptions::parse(&record.name, &record.options, accepted_options);

        Ok(Self {
            record,
            options,
            kind,
            shell,
            settings,
            consoles: IndexMap::new(),
            shut_down: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn device_type(&self) -> &str {
        &self.record.device_type
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }

    pub fn options(&self) -> &DeviceOptions {
        &self.options
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    pub fn shell(&self) -> &ShellDefinition {
        &self.shell
    }

    pub fn connection_kind(&self) -> ConnectionKind {
        self.kind
    }

    /// Parameters for a console in `role`.
    pub fn connection_params(&self, role: &str) -> ConnectionParams {
        let mut params = ConnectionParams::new(self.shell.clone());
        params.host = self.record.ipaddr.clone();
        params.port = self.record.port;
        params.username = self.record.username.clone();
        params.password = self.record.password.clone();
        params.conn_cmd = self.record.conn_cmd.as_ref().map(|c| c.argv()).unwrap_or_default();
        params.timeout = self.settings.console_timeout;
        params.char_delay = self.record.char_delay();
        params.echo_stdout = self.settings.echo_stdout;
        params.transcript = self
            .settings
            .console_log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{}.log", self.record.name, role)));
        params
    }

    // ------------------------------------------------------------------
    // Consoles
    // ------------------------------------------------------------------

    /// Open the default console unless it is already up.
    pub async fn connect(&mut self) -> Result<()> {
        if self.consoles.get(DEFAULT_ROLE).is_some_and(Console::is_alive) {
            return Ok(());
        }
        let params = self.connection_params(DEFAULT_ROLE);
        self.connect_role(DEFAULT_ROLE, self.kind, params).await
    }

    /// Open a console in `role`, replacing any previous one.
    pub async fn connect_role(
        &mut self,
        role: &str,
        kind: ConnectionKind,
        params: ConnectionParams,
    ) -> Result<()> {
        if let Some(mut old) = self.consoles.shift_remove(role) {
            if let Err(e) = old.close().await {
                debug!("[{}] closing stale {} console: {}", self.name(), role, e);
            }
        }

        let name = format!("{}.{}", self.record.name, role);
        let run_on_open = params.run_on_open;
        let mut console = connection_factory(kind, &name, params).await?;

        if !kind.auto_login() {
            if kind == ConnectionKind::Ser2Net {
                // Serial lines stay silent until they see a keystroke.
                console.sendline("").await?;
            }
            if let Err(e) = self.settle(&mut console, run_on_open).await {
                if let Err(close_err) = console.close().await {
                    debug!("[{}] close after failed connect: {}", name, close_err);
                }
                return Err(e);
            }
        }

        info!("[{}] {} console connected", self.name(), role);
        self.consoles.insert(role.to_string(), console);
        Ok(())
    }

    async fn settle(&self, console: &mut Console, run_on_open: bool) -> Result<()> {
        console.expect_prompt(None).await?;
        if run_on_open {
            for command in &self.shell.on_open_commands {
                console.execute_command(command, None).await?;
            }
        }
        Ok(())
    }

    /// Register an already-open console.
    pub fn attach_console(&mut self, role: impl Into<String>, console: Console) {
        self.consoles.insert(role.into(), console);
    }

    /// The default console.
    pub fn console(&mut self) -> Result<&mut Console> {
        self.console_by_role(DEFAULT_ROLE)
    }

    pub fn console_by_role(&mut self, role: &str) -> Result<&mut Console> {
        let device = self.record.name.clone();
        self.consoles.get_mut(role).ok_or_else(|| {
            DeviceError::UnknownConsole {
                device,
                role: role.to_string(),
            }
            .into()
        })
    }

    pub fn console_roles(&self) -> Vec<String> {
        self.consoles.keys().cloned().collect()
    }

    pub fn is_connected(&self) -> bool {
        self.consoles.get(DEFAULT_ROLE).is_some_and(Console::is_alive)
    }

    pub fn transcript_tail(&self, lines: usize) -> Vec<(String, Vec<String>)> {
        self.consoles
            .iter()
            .map(|(role, console)| (role.clone(), console.transcript_tail(lines)))
            .collect()
    }

    /// Close every console. Errors are logged, never returned.
    pub async fn disconnect(&mut self) {
        for (role, mut console) in self.consoles.drain(..) {
            if let Err(e) = console.close().await {
                warn!("[{}] failed to close {} console: {}", self.record.name, role, e);
            }
        }
    }

    /// Shutdown hook body shared by every Linux device. Idempotent.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            debug!("[{}] already shut down", self.name());
            return Ok(());
        }
        self.shut_down = true;
        self.disconnect().await;
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    // ------------------------------------------------------------------
    // Command helpers
    // ------------------------------------------------------------------

    /// Run `command` on the default console.
    pub async fn execute(&mut self, command: &str) -> Result<String> {
        self.console()?.execute_command(command, None).await
    }

    pub async fn execute_with_timeout(&mut self, command: &str, timeout: Duration) -> Result<String> {
        self.console()?.execute_command(command, Some(timeout)).await
    }

    /// Run `command`; on timeout interrupt it and resync with the prompt
    /// before returning the timeout.
    pub async fn execute_or_interrupt(&mut self, command: &str, timeout: Duration) -> Result<String> {
        let console = self.console()?;
        match console.execute_command(command, Some(timeout)).await {
            Err(e) if e.is_recoverable() => {
                if let Err(resync) = console.resync(None).await {
                    if !resync.is_transport_or_timeout() {
                        return Err(resync);
                    }
                    warn!("[{}] resync after '{}' failed: {}", console.name(), command, resync);
                }
                Err(e)
            }
            other => other,
        }
    }

    /// Run `command` and return its output with its exit status.
    pub async fn run_with_status(&mut self, command: &str) -> Result<(String, i32)> {
        let wrapped = format!("{command}; echo {STATUS_MARKER}$?");
        let output = self.execute(&wrapped).await?;
        let status = STATUS_RE
            .captures_iter(&output)
            .last()
            .and_then(|c| c[1].parse().ok())
            .ok_or_else(|| self.unexpected(command, &output))?;
        let body = match output.rfind(STATUS_MARKER) {
            Some(pos) => output[..pos].to_string(),
            None => output,
        };
        Ok((body, status))
    }

    /// Run `command` and fail unless it exits 0 without a shell failure marker.
    pub async fn check_output(&mut self, command: &str) -> Result<String> {
        let (output, status) = self.run_with_status(command).await?;
        if status != 0 || self.shell.detect_failure(&output).is_some() {
            return Err(self.unexpected(command, &output));
        }
        Ok(output)
    }

    fn unexpected(&self, command: &str, output: &str) -> Error {
        DeviceError::UnexpectedOutput {
            device: self.record.name.clone(),
            command: command.to_string(),
            output: output.trim().to_string(),
        }
        .into()
    }

    fn configuration_error(&self, message: String) -> Error {
        DeviceError::Configuration {
            device: self.record.name.clone(),
            message,
        }
        .into()
    }

    // ------------------------------------------------------------------
    // Interfaces
    // ------------------------------------------------------------------

    /// IPv4 address of `iface` in dotted-quad form.
    pub async fn get_interface_ipv4addr(&mut self, iface: &str) -> Result<String> {
        let command = format!("ifconfig {iface}");
        let output = self.execute(&command).await?;
        IPV4_RE
            .captures(&output)
            .map(|c| c[1].to_string())
            .ok_or_else(|| self.unexpected(&command, &output))
    }

    /// First IPv6 address of `iface` in `scope`.
    pub async fn get_interface_ipv6addr(&mut self, iface: &str, scope: Ipv6Scope) -> Result<String> {
        let command = format!("ip -6 addr show dev {iface}");
        let output = self.execute(&command).await?;
        IPV6_RE
            .captures_iter(&output)
            .find(|c| scope.matches(&c[2]))
            .map(|c| c[1].to_string())
            .ok_or_else(|| self.unexpected(&command, &output))
    }

    /// MAC address of `iface`, read from sysfs.
    pub async fn get_interface_macaddr(&mut self, iface: &str) -> Result<String> {
        let command = format!("cat /sys/class/net/{iface}/address");
        let output = self.execute(&command).await?;
        MAC_RE
            .captures(&output)
            .map(|c| c[1].to_lowercase())
            .ok_or_else(|| self.unexpected(&command, &output))
    }

    pub async fn set_link_state(&mut self, iface: &str, state: LinkState) -> Result<()> {
        self.check_output(&format!("ip link set {iface} {state}")).await?;
        Ok(())
    }

    pub async fn is_link_up(&mut self, iface: &str) -> Result<bool> {
        let output = self.check_output(&format!("ip link show {iface}")).await?;
        Ok(LINK_UP_RE.is_match(&output))
    }

    pub async fn get_default_gateway(&mut self) -> Result<String> {
        let command = "ip route list 0/0";
        let output = self.execute(command).await?;
        GATEWAY_RE
            .captures(&output)
            .map(|c| c[1].to_string())
            .ok_or_else(|| self.unexpected(command, &output))
    }

    /// Add `cidr` (e.g. `10.0.0.2/24`) to `iface` and verify it took.
    ///
    /// Undone by [`del_static_ip`](Self::del_static_ip).
    pub async fn set_static_ip(&mut self, iface: &str, cidr: &str) -> Result<()> {
        self.check_output(&format!("ip addr add {cidr} dev {iface}")).await?;
        let wanted = cidr.split('/').next().unwrap_or(cidr);
        let actual = self.get_interface_ipv4addr(iface).await?;
        if actual != wanted {
            return Err(self.configuration_error(format!(
                "{iface} has {actual} after setting {wanted}"
            )));
        }
        Ok(())
    }

    pub async fn del_static_ip(&mut self, iface: &str, cidr: &str) -> Result<()> {
        self.check_output(&format!("ip addr del {cidr} dev {iface}")).await?;
        Ok(())
    }

    /// Undone by [`del_route`](Self::del_route).
    pub async fn add_route(&mut self, destination: &str, gateway: &str) -> Result<()> {
        self.check_output(&format!("ip route add {destination} via {gateway}"))
            .await?;
        Ok(())
    }

    pub async fn del_route(&mut self, destination: &str) -> Result<()> {
        self.check_output(&format!("ip route del {destination}")).await?;
        Ok(())
    }

    pub async fn release_dhcp(&mut self, iface: &str) -> Result<()> {
        self.execute_or_interrupt(&format!("dhclient -r {iface}"), Duration::from_secs(30))
            .await?;
        Ok(())
    }

    /// Request a new lease on `iface`; returns the IPv4 address obtained.
    pub async fn renew_dhcp(&mut self, iface: &str) -> Result<String> {
        self.execute_or_interrupt(&format!("dhclient -v {iface}"), Duration::from_secs(60))
            .await?;
        self.get_interface_ipv4addr(iface).await
    }

    // ------------------------------------------------------------------
    // Reachability
    // ------------------------------------------------------------------

    /// True when every packet came back.
    pub async fn ping(&mut self, host: &str, options: &PingOptions) -> Result<bool> {
        match self.ping_statistics(host, options).await {
            Ok(stats) => Ok(stats.is_success()),
            Err(Error::UseCase(message)) => {
                debug!("[{}] ping {} failed: {}", self.name(), host, message);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Parsed summary of a ping run.
    pub async fn ping_statistics(&mut self, host: &str, options: &PingOptions) -> Result<PingStatistics> {
        let output = self
            .execute_or_interrupt(&options.command(host), options.timeout)
            .await?;
        PingStatistics::parse(&output)
    }

    /// Resolve `domain`, optionally against a specific server.
    pub async fn nslookup(&mut self, domain: &str, server: Option<&str>) -> Result<DnsLookup> {
        let command = match server {
            Some(server) => format!("nslookup {domain} {server}"),
            None => format!("nslookup {domain}"),
        };
        let output = self.execute_or_interrupt(&command, Duration::from_secs(30)).await?;
        DnsLookup::parse(&output, domain)
    }

    /// Raw `curl` output.
    pub async fn curl(&mut self, url: &str, extra: &str, timeout: Duration) -> Result<String> {
        let command = format!("curl {extra} --max-time {} '{url}'", timeout.as_secs().max(1));
        self.execute_or_interrupt(&command, timeout + Duration::from_secs(5))
            .await
    }

    /// HTTP GET via `curl -v`, classified.
    pub async fn http_get(&mut self, url: &str, timeout: Duration) -> Result<HttpResult> {
        let output = self.curl(url, "-v", timeout).await?;
        HttpResult::parse(&output)
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Fetch `uri` into `dir` with wget; returns the path on the device.
    pub async fn download_file_from_uri(&mut self, uri: &str, dir: &str) -> Result<String> {
        let file = uri
            .rsplit('/')
            .next()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| self.configuration_error(format!("no file name in '{uri}'")))?
            .to_string();
        let path = format!("{}/{}", dir.trim_end_matches('/'), file);
        let command = format!("wget -q '{uri}' -O {path}");
        let (output, status) = self.run_with_status(&command).await?;
        if status != 0 {
            return Err(self.unexpected(&command, &output));
        }
        Ok(path)
    }

    /// md5 of a file on the device.
    pub async fn get_file_md5(&mut self, path: &str) -> Result<String> {
        let command = format!("md5sum {path}");
        let output = self.check_output(&command).await?;
        MD5_RE
            .captures(&output)
            .map(|c| c[1].to_string())
            .ok_or_else(|| self.unexpected(&command, &output))
    }

    /// Decode a capture file with tshark.
    ///
    /// A missing file and a rejected display filter are reported as
    /// distinct errors. With `rm` the file is deleted afterwards.
    pub async fn tshark_read_pcap(
        &mut self,
        fname: &str,
        filter: Option<&str>,
        rm: bool,
    ) -> Result<String> {
        let command = match filter {
            Some(filter) => format!("tshark -r {fname} -Y '{filter}'"),
            None => format!("tshark -r {fname}"),
        };
        let output = self
            .execute_or_interrupt(&command, Duration::from_secs(60))
            .await?;

        if output.contains("doesn't exist") || output.contains("No such file") {
            return Err(DeviceError::CaptureFileNotFound {
                device: self.record.name.clone(),
                path: fname.to_string(),
            }
            .into());
        }
        if output.contains("isn't a valid display filter")
            || output.contains("is neither a field nor a protocol name")
            || output.contains("was unexpected in this context")
        {
            return Err(DeviceError::InvalidFilter {
                device: self.record.name.clone(),
                filter: filter.unwrap_or_default().to_string(),
            }
            .into());
        }

        if rm {
            self.execute(&format!("rm {fname}")).await?;
        }
        Ok(output)
    }
}

impl fmt::Debug for LinuxDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinuxDevice")
            .field("name", &self.record.name)
            .field("type", &self.record.device_type)
            .field("connection", &self.kind)
            .field("consoles", &self.console_roles())
            .finish()
    }
}
