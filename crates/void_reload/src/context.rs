//! Current-requester context
//!
//! One slot naming the unit whose load or reload is in progress. Entering a
//! unit returns a guard that puts the previous requester back when dropped,
//! so strictly nested loads see a stack even though only one value is
//! stored at a time.

use parking_lot::Mutex;

use crate::unit::UnitName;

/// Slot holding the active requester
#[derive(Debug, Default)]
pub struct RequesterContext {
    current: Mutex<Option<UnitName>>,
}

impl RequesterContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active requester, if a load or reload is in progress
    pub fn current(&self) -> Option<UnitName> {
        self.current.lock().clone()
    }

    /// Make `unit` the active requester until the guard is dropped
    pub fn enter(&self, unit: UnitName) -> RequesterGuard<'_> {
        log::trace!("requester -> {}", unit);
        let previous = self.current.lock().replace(unit);
        RequesterGuard {
            context: self,
            previous,
        }
    }

    /// Forget any active requester
    pub fn clear(&self) {
        *self.current.lock() = None;
    }
}

/// Restores the previous requester on drop
#[must_use = "the requester is restored as soon as the guard is dropped"]
pub struct RequesterGuard<'a> {
    context: &'a RequesterContext,
    previous: Option<UnitName>,
}

impl Drop for RequesterGuard<'_> {
    fn drop(&mut self) {
        let previous = self.previous.take();
        log::trace!("requester <- {:?}", previous);
        *self.context.current.lock() = previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guards_nest() {
        let ctx = RequesterContext::new();
        assert_eq!(ctx.current(), None);

        {
            let _a = ctx.enter("a".into());
            assert_eq!(ctx.current(), Some("a".into()));
            {
                let _b = ctx.enter("b".into());
                assert_eq!(ctx.current(), Some("b".into()));
            }
            assert_eq!(ctx.current(), Some("a".into()));
        }

        assert_eq!(ctx.current(), None);
    }

    #[test]
    fn test_guard_restores_on_error_path() {
        fn failing(ctx: &RequesterContext) -> Result<(), String> {
            let _guard = ctx.enter("broken".into());
            Err("boom".into())
        }

        let ctx = RequesterContext::new();
        assert!(failing(&ctx).is_err());
        assert_eq!(ctx.current(), None);
    }

    #[test]
    fn test_clear() {
        let ctx = RequesterContext::new();
        let guard = ctx.enter("a".into());
        ctx.clear();
        assert_eq!(ctx.current(), None);
        drop(guard);
        assert_eq!(ctx.current(), None);
    }
}
