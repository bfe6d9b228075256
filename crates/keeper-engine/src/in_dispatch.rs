//! In-dispatch flags of one snapshot generation.

use dashmap::DashSet;
use keeper_core::OrderSignature;

/// Orders of one snapshot that have a trigger submission dispatched.
///
/// A fresh, empty set is installed with every snapshot rebuild, so a flag
/// left set by a successful trigger lasts until the next rebuild. A failed
/// trigger clears its flag in the set it was marked in.
#[derive(Debug, Default)]
pub struct InDispatchFlags {
    generation: u64,
    flags: DashSet<OrderSignature>,
}

impl InDispatchFlags {
    #[must_use]
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            flags: DashSet::new(),
        }
    }

    /// Snapshot generation owning this set.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Mark an order. Returns false if it was already marked.
    pub fn mark(&self, signature: OrderSignature) -> bool {
        self.flags.insert(signature)
    }

    #[must_use]
    pub fn is_marked(&self, signature: &OrderSignature) -> bool {
        self.flags.contains(signature)
    }

    /// Clear an order's flag. Returns false if it was not marked.
    pub fn clear(&self, signature: &OrderSignature) -> bool {
        self.flags.remove(signature).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::{AccountId, OrderId};

    #[test]
    fn test_mark_and_clear() {
        let flags = InDispatchFlags::new(3);
        let sig = OrderSignature::new(&AccountId::new("a"), OrderId(1));

        assert!(flags.mark(sig.clone()));
        assert!(!flags.mark(sig.clone()));
        assert!(flags.is_marked(&sig));
        assert!(flags.clear(&sig));
        assert!(!flags.clear(&sig));
        assert!(flags.is_empty());
        assert_eq!(flags.generation(), 3);
    }
}
