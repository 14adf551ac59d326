//! Process-wide registry mapping `"Service.Method"` names to 16-bit
//! protocol commands.
//!
//! The registry is populated by server bootstrap before any connection is
//! accepted and is read-hot afterwards, so it sits behind a readers-writer
//! lock. Binding a command to a second, different method is a programming
//! error and panics so that startup aborts instead of serving a corrupted
//! table.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::error::{NovagateError, Result};

static COMMANDS: Lazy<CommandMap> = Lazy::new(CommandMap::new);

/// A bidirectional method-name/command registry with a strict-mode toggle.
///
/// Most callers use the process-wide free functions below; a standalone map
/// is useful for tests.
pub struct CommandMap {
    inner: RwLock<MapInner>,
}

#[derive(Default)]
struct MapInner {
    method_to_command: HashMap<String, u16>,
    command_to_method: HashMap<u16, String>,
    strict: bool,
}

impl CommandMap {
    /// Create an empty, non-strict map.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MapInner::default()),
        }
    }

    /// Toggle strict mode: when strict, unregistered methods fail instead
    /// of falling back to the FNV-1a hash.
    pub fn set_strict(&self, strict: bool) {
        self.inner.write().unwrap().strict = strict;
    }

    /// Bind a full method name (`"Service.Method"`) to a command id.
    ///
    /// Re-binding the same method to the same command is a no-op.
    ///
    /// # Panics
    ///
    /// Panics when `full_method` is malformed, or when `cmd` is already
    /// bound to a different method.
    pub fn register_full(&self, full_method: &str, cmd: u16) {
        let full_method = full_method.trim();
        if full_method.is_empty() {
            panic!("register_full_method_command: empty method");
        }
        let (service, method) = match split_full_method(full_method) {
            Ok(parts) => parts,
            Err(err) => panic!("register_full_method_command: {err}"),
        };
        let normalized = format!("{service}.{method}");

        let mut inner = self.inner.write().unwrap();
        if let Some(existing) = inner.command_to_method.get(&cmd) {
            if existing != &normalized {
                panic!(
                    "command 0x{cmd:04X} already bound to {existing:?} (attempted {normalized:?})"
                );
            }
        }
        inner.method_to_command.insert(normalized.clone(), cmd);
        inner.command_to_method.insert(cmd, normalized);
    }

    /// Resolve a full method name to its command id.
    ///
    /// On a miss, strict mode fails with
    /// [`NovagateError::UnregisteredMapping`]; otherwise the command is the
    /// FNV-1a hash of `service || 0x00 || method` truncated to 16 bits.
    pub fn map(&self, full_method: &str) -> Result<u16> {
        let (service, method) = split_full_method(full_method.trim())?;
        let normalized = format!("{service}.{method}");

        let inner = self.inner.read().unwrap();
        if let Some(&cmd) = inner.method_to_command.get(&normalized) {
            return Ok(cmd);
        }
        if inner.strict {
            return Err(NovagateError::UnregisteredMapping(normalized));
        }
        drop(inner);

        Ok(fnv32a_command(service, method))
    }
}

impl Default for CommandMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Bind `service` + `method` to a command id in the process-wide map.
pub fn register_method_command(service: &str, method: &str, cmd: u16) {
    COMMANDS.register_full(&format!("{service}.{method}"), cmd);
}

/// Bind a full method name (`"Service.Method"`) to a command id in the
/// process-wide map.
pub fn register_full_method_command(full_method: &str, cmd: u16) {
    COMMANDS.register_full(full_method, cmd);
}

/// Make [`map_method_to_command`] fail for methods that were not explicitly
/// registered.
pub fn set_strict_command_mapping(strict: bool) {
    COMMANDS.set_strict(strict);
}

/// Resolve a full method name against the process-wide map.
pub fn map_method_to_command(full_method: &str) -> Result<u16> {
    COMMANDS.map(full_method)
}

fn split_full_method(full_method: &str) -> Result<(&str, &str)> {
    let invalid = || NovagateError::InvalidMethod(full_method.to_string());

    let idx = full_method.rfind('.').ok_or_else(invalid)?;
    let service = full_method[..idx].trim();
    let method = full_method[idx + 1..].trim();
    if service.is_empty() || method.is_empty() {
        return Err(invalid());
    }
    Ok((service, method))
}

fn fnv32a_command(service: &str, method: &str) -> u16 {
    const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    let mut hash = FNV_OFFSET_BASIS;
    for &byte in service
        .as_bytes()
        .iter()
        .chain(std::iter::once(&0u8))
        .chain(method.as_bytes())
    {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash as u16
}
