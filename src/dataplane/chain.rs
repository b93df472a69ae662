//! NF chain registry
//!
//! An ordered list of named network functions evaluated as an AND-chain:
//! the first enabled entry that denies stops the walk. The list is
//! copy-on-write, so `process` walks a snapshot without holding the lock and
//! always sees either the whole old chain or the whole new one.

use super::nf::{NetworkFunction, NfKind, Verdict};
use super::packet::PacketRef;
use super::{read_table, write_table};
use crate::error::NfTarget;
use crate::telemetry::Counter;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

struct NfEntry {
    name: String,
    kind: NfKind,
    enabled: AtomicBool,
    nf: Arc<dyn NetworkFunction>,
    evaluated: Counter,
    dropped: Counter,
}

impl NfEntry {
    fn new(name: String, kind: NfKind, nf: Arc<dyn NetworkFunction>) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind,
            enabled: AtomicBool::new(true),
            nf,
            evaluated: Counter::new(),
            dropped: Counter::new(),
        })
    }
}

impl std::fmt::Debug for NfEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NfEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Listing row for one chain entry
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChainEntry {
    /// Zero-based position in evaluation order
    pub position: usize,
    pub name: String,
    pub kind: NfKind,
    pub enabled: bool,
    /// Packets this entry classified
    pub evaluated: u64,
    /// Packets this entry denied
    pub dropped: u64,
}

type Snapshot = Arc<Vec<Arc<NfEntry>>>;

/// Ordered, named, individually enableable sequence of NFs
#[derive(Debug, Default)]
pub struct NfChain {
    entries: RwLock<Snapshot>,
}

impl NfChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain of built-ins in the given order, all enabled
    ///
    /// Each entry is named after its kind; a repeated kind is skipped.
    pub(crate) fn with_builtins(
        builtins: impl IntoIterator<Item = (NfKind, Arc<dyn NetworkFunction>)>,
    ) -> Self {
        let mut entries: Vec<Arc<NfEntry>> = Vec::new();
        for (kind, nf) in builtins {
            if entries.iter().any(|e| e.kind == kind) {
                continue;
            }
            info!(nf = %kind, position = entries.len(), "NF added to chain");
            entries.push(NfEntry::new(kind.to_string(), kind, nf));
        }
        Self {
            entries: RwLock::new(Arc::new(entries)),
        }
    }

    /// Append a user-defined NF, enabled
    pub fn add(&self, name: impl Into<String>, nf: Arc<dyn NetworkFunction>) -> Result<()> {
        self.add_with_kind(name.into(), NfKind::Custom, nf)
    }

    pub(crate) fn add_with_kind(
        &self,
        name: String,
        kind: NfKind,
        nf: Arc<dyn NetworkFunction>,
    ) -> Result<()> {
        let mut entries = write_table(&self.entries, "chain");
        if entries.iter().any(|e| e.name == name) {
            return Err(Error::DuplicateName { name });
        }

        info!(nf = %name, %kind, position = entries.len(), "NF added to chain");
        Arc::make_mut(&mut *entries).push(NfEntry::new(name, kind, nf));
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let mut entries = write_table(&self.entries, "chain");
        let Some(index) = entries.iter().position(|e| e.name == name) else {
            return Err(Error::not_found(NfTarget::Function(name.to_string())));
        };

        Arc::make_mut(&mut *entries).remove(index);
        info!(nf = %name, "NF removed from chain");
        Ok(())
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let entries = read_table(&self.entries, "chain");
        let entry = entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::not_found(NfTarget::Function(name.to_string())))?;

        entry.enabled.store(enabled, Ordering::Release);
        info!(nf = %name, enabled, "NF toggled");
        Ok(())
    }

    pub fn clear(&self) {
        *write_table(&self.entries, "chain") = Arc::default();
        info!("NF chain cleared");
    }

    /// Entries in evaluation order
    pub fn list(&self) -> Vec<ChainEntry> {
        self.snapshot()
            .iter()
            .enumerate()
            .map(|(position, e)| ChainEntry {
                position,
                name: e.name.clone(),
                kind: e.kind,
                enabled: e.enabled.load(Ordering::Acquire),
                evaluated: e.evaluated.get(),
                dropped: e.dropped.get(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `pkt` through every enabled entry in order
    ///
    /// Disabled entries are skipped without side effects. An empty chain
    /// allows.
    pub fn process(&self, pkt: &PacketRef<'_>) -> Verdict {
        let entries = self.snapshot();
        for entry in entries.iter() {
            if !entry.enabled.load(Ordering::Acquire) {
                continue;
            }

            entry.evaluated.inc();
            if entry.nf.classify(pkt) == Verdict::Deny {
                entry.dropped.inc();
                debug!(nf = %entry.name, "Packet denied by chain");
                return Verdict::Deny;
            }
        }
        Verdict::Allow
    }

    fn snapshot(&self) -> Snapshot {
        read_table(&self.entries, "chain").clone()
    }
}
