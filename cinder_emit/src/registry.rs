//! Name registry for synthesized code objects.
//!
//! Synthesized names must be unique for the life of the process. The
//! registry claims names with a single atomic insert-if-absent per
//! candidate; on a collision it retries with a numeric suffix drawn from a
//! monotonic counter that is never reused, even after a losing race.
//!
//! Sessions can share the process-wide default or carry their own registry;
//! the builder takes the registry as an explicit handle.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Registry of names already issued to synthesized code objects.
///
/// Cleared only at process exit.
#[derive(Debug, Default)]
pub struct NameRegistry {
    /// Names already claimed.
    names: DashMap<Arc<str>, ()>,
    /// Suffix counter for collision retries.
    counter: AtomicU64,
}

/// Process-wide default registry.
static GLOBAL_REGISTRY: OnceLock<Arc<NameRegistry>> = OnceLock::new();

impl NameRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default registry.
    #[must_use]
    pub fn global() -> Arc<NameRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(NameRegistry::new()))
            .clone()
    }

    /// Claim a unique name derived from `base`.
    ///
    /// The base itself is tried first; afterwards `base$N` with increasing
    /// `N`. Each attempt is one atomic insert, so concurrent claimants can
    /// never both win the same name.
    #[must_use]
    pub fn claim(&self, base: &str) -> Arc<str> {
        let bare: Arc<str> = Arc::from(base);
        if let Entry::Vacant(slot) = self.names.entry(bare.clone()) {
            slot.insert(());
            return bare;
        }
        loop {
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            let candidate: Arc<str> = format!("{}${}", base, n).into();
            if let Entry::Vacant(slot) = self.names.entry(candidate.clone()) {
                slot.insert(());
                return candidate;
            }
        }
    }

    /// Whether `name` has been claimed.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Number of claimed names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no names have been claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_claim_keeps_the_base_name() {
        let reg = NameRegistry::new();
        assert_eq!(&*reg.claim("dyn"), "dyn");
        assert!(reg.contains("dyn"));
    }

    #[test]
    fn test_collisions_get_suffixes() {
        let reg = NameRegistry::new();
        let a = reg.claim("dyn");
        let b = reg.claim("dyn");
        let c = reg.claim("dyn");
        assert_eq!(&*a, "dyn");
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert!(b.starts_with("dyn$"));
    }

    #[test]
    fn test_suffix_counter_is_shared_across_bases() {
        let reg = NameRegistry::new();
        let _ = reg.claim("f");
        let f1 = reg.claim("f");
        let _ = reg.claim("g");
        let g1 = reg.claim("g");
        // Counter is monotonic process-wide, not per base.
        assert_ne!(
            f1.rsplit('$').next().unwrap(),
            g1.rsplit('$').next().unwrap()
        );
    }

    #[test]
    fn test_concurrent_claims_are_unique() {
        let reg = Arc::new(NameRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let reg = reg.clone();
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| reg.claim("shared")).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<Arc<str>> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn test_global_is_shared() {
        let a = NameRegistry::global();
        let b = NameRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
