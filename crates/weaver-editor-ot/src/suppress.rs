//! Echo suppression.
//!
//! While the bridge writes to the editor on the document's behalf (remote
//! replay, divergence repair) it holds a [`SuppressionGuard`]. Every listener
//! checks [`EchoSuppressor::is_engaged`] first and returns early, so the
//! bridge never translates its own writes back into operations.

use std::cell::Cell;
use std::rc::Rc;

/// Shared on/off switch for the bridge's listeners.
#[derive(Clone, Debug, Default)]
pub struct EchoSuppressor {
    engaged: Rc<Cell<bool>>,
}

impl EchoSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.get()
    }

    /// Engage until the returned guard is dropped.
    ///
    /// Guards nest: dropping an inner guard restores the state it found.
    #[must_use = "suppression ends as soon as the guard is dropped"]
    pub fn engage(&self) -> SuppressionGuard {
        let previous = self.engaged.replace(true);
        SuppressionGuard {
            engaged: self.engaged.clone(),
            previous,
        }
    }
}

/// Keeps an [`EchoSuppressor`] engaged for its lifetime.
#[derive(Debug)]
pub struct SuppressionGuard {
    engaged: Rc<Cell<bool>>,
    previous: bool,
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        self.engaged.set(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_releases_on_drop() {
        let suppressor = EchoSuppressor::new();
        assert!(!suppressor.is_engaged());
        {
            let _guard = suppressor.engage();
            assert!(suppressor.is_engaged());
        }
        assert!(!suppressor.is_engaged());
    }

    #[test]
    fn test_nested_guards() {
        let suppressor = EchoSuppressor::new();
        let outer = suppressor.engage();
        {
            let _inner = suppressor.clone().engage();
            assert!(suppressor.is_engaged());
        }
        assert!(suppressor.is_engaged());
        drop(outer);
        assert!(!suppressor.is_engaged());
    }

    #[test]
    fn test_guard_releases_on_unwind() {
        let suppressor = EchoSuppressor::new();
        let inner = suppressor.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.engage();
            panic!("replay failed");
        }));
        assert!(result.is_err());
        assert!(!suppressor.is_engaged());
    }
}
