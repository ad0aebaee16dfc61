//! Handler wrapping
//!
//! [`Annotator::wrap`] turns any `Fn(A) -> R` into one with the same
//! signature that runs inside a named frame of a [`TaskRegistry`]. The frame
//! is pushed on entry and popped by a [`FrameGuard`] on every exit path,
//! panics included, so the sampler sees the handler exactly while it runs.
//!
//! ```
//! use spanscope::annotate::Annotator;
//! use spanscope::domain::ContextId;
//! use spanscope::probe::TaskRegistry;
//!
//! let registry = TaskRegistry::new();
//! let annotator = Annotator::new(registry.clone(), true);
//!
//! let peek = registry.clone();
//! let get_user = annotator.wrap(ContextId(1), "get_user", move |id: u32| {
//!     assert_eq!(peek.stack(ContextId(1)).unwrap(), vec!["get_user"]);
//!     id * 2
//! });
//!
//! assert_eq!(get_user(21), 42);
//! assert_eq!(registry.stack(ContextId(1)).unwrap(), Vec::<String>::new());
//! ```

use std::sync::Arc;

use crate::domain::{Config, ContextId};
use crate::probe::{FrameGuard, TaskRegistry};

/// Pushes named frames around host handlers.
#[derive(Debug, Clone)]
pub struct Annotator {
    registry: TaskRegistry,
    enabled: bool,
}

impl Annotator {
    /// Create an annotator; a disabled one returns handlers unchanged.
    #[must_use]
    pub fn new(registry: TaskRegistry, enabled: bool) -> Self {
        Self { registry, enabled }
    }

    /// Annotator honoring [`Config::wrap_handlers`].
    #[must_use]
    pub fn from_config(config: &Config, registry: TaskRegistry) -> Self {
        Self::new(registry, config.wrap_handlers)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Enter `name` on `ctx` for the lifetime of the returned guard.
    ///
    /// Returns `None` when handler wrapping is disabled.
    #[must_use]
    pub fn scope(&self, ctx: ContextId, name: &str) -> Option<FrameGuard> {
        self.enabled.then(|| self.registry.enter(ctx, name))
    }

    /// Wrap `handler` so each call runs inside a `name` frame on `ctx`.
    ///
    /// Arguments, return value and panics pass through untouched.
    pub fn wrap<A, R, F>(&self, ctx: ContextId, name: impl Into<String>, handler: F) -> impl Fn(A) -> R
    where
        F: Fn(A) -> R,
    {
        let annotator = self.clone();
        let name: Arc<str> = Arc::from(name.into());

        move |arg| {
            let _guard = annotator.scope(ctx, &name);
            handler(arg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_wrapped_handler_runs_inside_frame() {
        let registry = TaskRegistry::new();
        let annotator = Annotator::new(registry.clone(), true);
        let ctx = ContextId(7);

        let _request = registry.enter(ctx, "request");
        let peek = registry.clone();
        let handler = annotator.wrap(ctx, "list_posts", move |limit: usize| {
            peek.stack(ctx).unwrap_or_default().len() + limit
        });

        assert_eq!(handler(10), 12);
        assert_eq!(registry.stack(ctx).unwrap(), vec!["request"]);
    }

    #[test]
    fn test_frame_popped_when_handler_panics() {
        let registry = TaskRegistry::new();
        let annotator = Annotator::new(registry.clone(), true);
        let ctx = ContextId(1);
        let _outer = registry.enter(ctx, "server");

        let handler = annotator.wrap(ctx, "explode", |(): ()| -> u32 { panic!("handler error") });
        let result = catch_unwind(AssertUnwindSafe(|| handler(())));

        assert!(result.is_err());
        assert_eq!(registry.stack(ctx).unwrap(), vec!["server"]);
    }

    #[test]
    fn test_disabled_annotator_pushes_nothing() {
        let registry = TaskRegistry::new();
        let config = Config { wrap_handlers: false, ..Config::default() };
        let annotator = Annotator::from_config(&config, registry.clone());

        let peek = registry.clone();
        let handler = annotator.wrap(ContextId(1), "noop", move |(): ()| peek.len());
        assert_eq!(handler(()), 0);
        assert!(annotator.scope(ContextId(1), "x").is_none());
    }

    #[test]
    fn test_nested_wrapped_handlers_stack_up() {
        let registry = TaskRegistry::new();
        let annotator = Annotator::new(registry.clone(), true);
        let ctx = ContextId(3);

        let peek = registry.clone();
        let inner = annotator.wrap(ctx, "inner", move |(): ()| peek.stack(ctx).unwrap_or_default());
        let outer = annotator.wrap(ctx, "outer", move |(): ()| inner(()));

        assert_eq!(outer(()), vec!["outer", "inner"]);
    }
}
