//! Global shell registry for looking up shell definitions by name.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use super::builtin;
use super::definition::ShellDefinition;
use crate::error::{Error, Result};

/// Global shell registry.
static REGISTRY: Lazy<RwLock<ShellRegistry>> = Lazy::new(|| {
    let mut registry = ShellRegistry::new();
    registry.register_builtin_shells();
    RwLock::new(registry)
});

/// Registry for shell definitions.
#[derive(Debug, Default)]
pub struct ShellRegistry {
    shells: HashMap<String, ShellDefinition>,
}

impl ShellRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            shells: HashMap::new(),
        }
    }

    /// Get the global registry.
    pub fn global() -> &'static RwLock<ShellRegistry> {
        &REGISTRY
    }

    fn register_builtin_shells(&mut self) {
        for shell in builtin::all() {
            self.shells.insert(shell.name.clone(), shell);
        }
    }

    /// Register a shell definition.
    pub fn register(&mut self, shell: ShellDefinition) -> Result<()> {
        if self.shells.contains_key(&shell.name) {
            return Err(Error::Boardfarm(format!(
                "shell '{}' is already registered",
                shell.name
            )));
        }
        self.shells.insert(shell.name.clone(), shell);
        Ok(())
    }

    /// Definition registered under `name`.
    pub fn get(&self, name: &str) -> Option<&ShellDefinition> {
        self.shells.get(name)
    }

    /// Check if a shell is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.shells.contains_key(name)
    }

    /// Registered names, unordered.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.shells.keys()
    }
}

/// Clone a shell definition out of the global registry.
pub fn lookup(name: &str) -> Result<ShellDefinition> {
    ShellRegistry::global()
        .read()
        .map_err(|_| Error::Boardfarm("shell registry lock poisoned".to_string()))?
        .get(name)
        .cloned()
        .ok_or_else(|| Error::Boardfarm(format!("unknown shell '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_registered() {
        let registry = ShellRegistry::global().read().unwrap();
        for name in ["bash", "busybox", "openwrt", "prplos", "rdkb"] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_lookup_unknown() {
        let err = lookup("tcsh").unwrap_err();
        assert_eq!(err.kind(), "BoardfarmException");
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ShellRegistry::new();
        registry.register(builtin::bash()).unwrap();
        assert!(registry.register(builtin::bash()).is_err());
        assert_eq!(registry.names().count(), 1);
    }
}
