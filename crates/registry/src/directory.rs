//! Lease-based directory of live tool declarations.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tm_domain::ToolDeclaration;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("register: {0} already registered")]
    AlreadyRegistered(String),
    #[error("unregister: {0} not found")]
    NotFound(String),
}

/// One live (or not yet swept) lease.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub declaration: ToolDeclaration,
    pub deadline: Instant,
}

impl RegistryEntry {
    fn is_live(&self, now: Instant) -> bool {
        now <= self.deadline
    }
}

/// Thread-safe `name → entry` map.
///
/// Every mutation takes the write lock; `list` and the GC snapshot take
/// the read lock.  Entries never leave the lock by reference.
pub struct ToolDirectory {
    entries: RwLock<HashMap<String, RegistryEntry>>,
    lease: Duration,
}

impl ToolDirectory {
    pub fn new(lease: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            lease,
        }
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub fn register(&self, declaration: ToolDeclaration) -> Result<(), RegistryError> {
        self.register_at(declaration, Instant::now())
    }

    /// Fails while `name` holds a live lease.  An expired entry that the
    /// GC has not swept yet is replaced.
    pub fn register_at(&self, declaration: ToolDeclaration, now: Instant) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        if entries.get(&declaration.name).is_some_and(|e| e.is_live(now)) {
            return Err(RegistryError::AlreadyRegistered(declaration.name));
        }
        tracing::info!(tool = %declaration.name, "tool registered");
        entries.insert(
            declaration.name.clone(),
            RegistryEntry { declaration, deadline: now + self.lease },
        );
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        self.unregister_at(name, Instant::now())
    }

    pub fn unregister_at(&self, name: &str, now: Instant) -> Result<(), RegistryError> {
        match self.entries.write().remove(name) {
            Some(e) if e.is_live(now) => {
                tracing::info!(tool = %name, "tool unregistered");
                Ok(())
            }
            _ => Err(RegistryError::NotFound(name.to_string())),
        }
    }

    pub fn list(&self) -> Vec<ToolDeclaration> {
        self.list_at(Instant::now())
    }

    /// Snapshot of live declarations, sorted by name.
    pub fn list_at(&self, now: Instant) -> Vec<ToolDeclaration> {
        let mut out: Vec<ToolDeclaration> = self
            .entries
            .read()
            .values()
            .filter(|e| e.is_live(now))
            .map(|e| e.declaration.clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn keepalive(&self, declarations: Vec<ToolDeclaration>) {
        self.keepalive_at(declarations, Instant::now())
    }

    /// Extend each lease, creating entries that are missing.
    pub fn keepalive_at(&self, declarations: Vec<ToolDeclaration>, now: Instant) {
        let deadline = now + self.lease;
        let mut entries = self.entries.write();
        for declaration in declarations {
            match entries.get_mut(&declaration.name) {
                Some(entry) => entry.deadline = deadline,
                None => {
                    tracing::info!(tool = %declaration.name, "tool re-registered by keepalive");
                    entries.insert(
                        declaration.name.clone(),
                        RegistryEntry { declaration, deadline },
                    );
                }
            }
        }
    }

    /// Names whose lease has run out, under the read lock.
    pub fn expired_at(&self, now: Instant) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| !e.is_live(now))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn sweep(&self) -> Vec<String> {
        self.sweep_at(Instant::now())
    }

    /// Two-phase GC: snapshot expired names, then delete each one under a
    /// short write lock.  A lease extended in between is left alone.
    pub fn sweep_at(&self, now: Instant) -> Vec<String> {
        let candidates = self.expired_at(now);
        let mut removed = Vec::with_capacity(candidates.len());
        for name in candidates {
            let mut entries = self.entries.write();
            if entries.get(&name).is_some_and(|e| !e.is_live(now)) {
                entries.remove(&name);
                tracing::info!(tool = %name, "tool lease expired");
                removed.push(name);
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
