//! Challenge record storage.
//!
//! Holds every outstanding [RFC-8555][RFC-8555] [DNS-01] proof value, keyed by the canonical
//! FQDN it should be served for in the [DNS server][crate::dns]. Multiple values per FQDN are
//! kept in publication order so concurrent challenges for the same name are all answered.
//!
//! Only [`memory::InMemoryRecordStore`] is provided; records are not durable across restarts.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4

use std::sync::Arc;
use tokio::sync::RwLock;

pub mod memory;

#[allow(clippy::module_name_repetitions)]
pub use memory::InMemoryRecordStore;

/// `DynRecordStore` is a type alias for a [`RecordStore`] that can be used by multiple
/// read/write consumers that coordinate through an [`Arc`] and a [`RwLock`] wrapping the
/// [`RecordStore`].
#[allow(clippy::module_name_repetitions)]
pub type DynRecordStore = Arc<RwLock<dyn RecordStore + Send + Sync>>;

/// All outstanding proof values for one FQDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtRecord {
    /// Canonical FQDN, see [`canonicalize`].
    pub fqdn: String,
    /// Hostname this server claims to be in NS and SOA answers for `fqdn`.
    pub owner_hostname: String,
    /// Proof values in publication order. Never empty while the record is stored.
    pub values: Vec<String>,
}

/// Storage of proof values keyed by canonical FQDN.
///
/// Implementations canonicalize every name they're given with [`canonicalize`], so lookups are
/// case-insensitive and indifferent to a missing trailing dot.
pub trait RecordStore {
    /// Snapshot of the record for `fqdn` (if any).
    fn lookup(&self, fqdn: &str) -> Option<TxtRecord>;

    /// Append `value` to the record for `fqdn`, creating it with `owner_hostname` if needed.
    /// Duplicate values are kept.
    fn add_value(&mut self, fqdn: &str, owner_hostname: &str, value: String);

    /// Remove one occurrence of `value` from the record for `fqdn`, deleting the record once no
    /// values remain. Returns whether anything was removed; an unknown pair is a no-op.
    fn remove_value(&mut self, fqdn: &str, value: &str) -> bool;

    /// Number of records (not values) held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Canonical form of a domain name: lower-cased and fully qualified.
#[must_use]
pub fn canonicalize(fqdn: &str) -> String {
    let mut canonical = fqdn.trim().to_ascii_lowercase();
    if !canonical.ends_with('.') {
        canonical.push('.');
    }
    canonical
}
