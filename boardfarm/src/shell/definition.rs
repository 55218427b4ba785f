//! Shell definition: what a device's command line looks like.

use std::fmt;

use regex::bytes::Regex;

use crate::console::Console;
use crate::error::Result;

/// Everything the harness needs to know about a flavour of shell.
///
/// The prompt list becomes a console's steady-state prompt set; the
/// on-open commands run right after login.
#[derive(Clone)]
pub struct ShellDefinition {
    /// Key in the shell registry, e.g. `bash` or `rdkb`.
    pub name: String,

    /// Prompt patterns; any of them ends `execute_command`.
    pub prompts: Vec<Regex>,

    /// Command that logs out of this shell.
    pub logout_command: Option<String>,

    /// Commands to run once the shell is reached.
    pub on_open_commands: Vec<String>,

    /// Output fragments that mark a command as failed.
    pub failed_when_contains: Vec<String>,
}

impl ShellDefinition {
    /// Empty definition; add prompts before use.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompts: Vec::new(),
            logout_command: None,
            on_open_commands: vec![],
            failed_when_contains: vec![],
        }
    }

    pub fn with_prompt(mut self, pattern: &str) -> std::result::Result<Self, regex::Error> {
        self.prompts.push(Regex::new(pattern)?);
        Ok(self)
    }

    /// Typed on `close()` before the child is killed.
    pub fn with_logout(mut self, command: impl Into<String>) -> Self {
        self.logout_command = Some(command.into());
        self
    }

    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    /// Output fragment such as `command not found`.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// First failure marker found in `output`, if any.
    pub fn detect_failure(&self, output: &str) -> Option<&str> {
        self.failed_when_contains
            .iter()
            .find(|p| output.contains(p.as_str()))
            .map(String::as_str)
    }

    /// Install this shell's prompts on a console and run the on-open commands.
    pub async fn apply(&self, console: &mut Console) -> Result<()> {
        console.set_prompts(self.prompts.clone());
        for command in &self.on_open_commands {
            console.execute_command(command, None).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for ShellDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellDefinition")
            .field("name", &self.name)
            .field(
                "prompts",
                &self.prompts.iter().map(Regex::as_str).collect::<Vec<_>>(),
            )
            .field("logout_command", &self.logout_command)
            .field("on_open_commands", &self.on_open_commands)
            .field("failed_when_contains", &self.failed_when_contains)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_failure() {
        let shell = ShellDefinition::new("test")
            .with_failure_pattern("command not found")
            .with_failure_pattern("Permission denied");
        assert_eq!(
            shell.detect_failure("sh: foo: command not found"),
            Some("command not found")
        );
        assert_eq!(shell.detect_failure("all good"), None);
    }

    #[test]
    fn test_with_prompt_rejects_invalid_regex() {
        assert!(ShellDefinition::new("bad").with_prompt("(").is_err());
    }
}
