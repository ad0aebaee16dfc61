//! # Stack Probes
//!
//! The live sampler does not know how to read a call stack; it asks a
//! [`StackProbe`]. A probe answers two questions on every tick:
//!
//! - which execution contexts are running and what are their stacks
//!   ([`StackProbe::capture`])
//! - which contexts has the host destroyed since the last tick
//!   ([`StackProbe::take_finished`])
//!
//! ## Task Registry
//!
//! [`TaskRegistry`] is the probe for hosts that describe their own work:
//! each unit of work enters named frames with [`TaskRegistry::enter`] and
//! the returned [`FrameGuard`] pops the frame when dropped, on normal return,
//! early return and unwinding alike.
//!
//! ```text
//! host thread                     sampler thread (every tick)
//! ───────────                     ───────────────────────────
//! let _g = reg.enter(ctx, "a");   reg.capture()  → [(ctx, ["a"])]
//!   let _h = reg.enter(ctx, "b"); reg.capture()  → [(ctx, ["a", "b"])]
//!   drop(_h)                      reg.capture()  → [(ctx, ["a"])]
//! reg.finish(ctx)                 reg.take_finished() → [ctx]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::domain::ContextId;

/// One context's stack at capture time, outermost frame first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedStack {
    pub context: ContextId,
    /// Raw frame descriptors; the frame filter cleans them up
    pub frames: Vec<String>,
}

/// Source of execution-context identity and stacks.
pub trait StackProbe: Send + Sync {
    /// Stacks of every context that is alive right now.
    ///
    /// Single-threaded hosts return at most one entry.
    fn capture(&self) -> Vec<CapturedStack>;

    /// Contexts the host destroyed since the previous call.
    fn take_finished(&self) -> Vec<ContextId>;
}

impl<P: StackProbe + ?Sized> StackProbe for Arc<P> {
    fn capture(&self) -> Vec<CapturedStack> {
        (**self).capture()
    }

    fn take_finished(&self) -> Vec<ContextId> {
        (**self).take_finished()
    }
}

#[derive(Debug, Default)]
struct Registry {
    /// Live contexts and their current frames
    stacks: BTreeMap<ContextId, Vec<String>>,
    /// Contexts finished since the last `take_finished`
    finished: Vec<ContextId>,
    /// Generation of each live context; a reused id gets a fresh one, so
    /// guards from its earlier life leave the new stack alone
    generations: HashMap<ContextId, u64>,
    next_generation: u64,
}

/// Host-maintained shadow stacks, one per execution context.
///
/// Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl TaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `frame` onto `ctx`'s stack until the guard is dropped.
    ///
    /// The first frame entered for a context brings it to life.
    #[must_use = "the frame is popped as soon as the guard is dropped"]
    pub fn enter(&self, ctx: ContextId, frame: impl Into<String>) -> FrameGuard {
        let mut registry = self.lock();
        let existing = registry.generations.get(&ctx).copied();
        let generation = match existing {
            Some(generation) => generation,
            None => {
                let generation = registry.next_generation;
                registry.next_generation += 1;
                registry.generations.insert(ctx, generation);
                generation
            }
        };
        let stack = registry.stacks.entry(ctx).or_default();
        let depth = stack.len();
        stack.push(frame.into());

        FrameGuard { registry: self.clone(), context: ctx, depth, generation }
    }

    /// Mark `ctx` as destroyed.
    ///
    /// The sampler tears its spans down on the next tick. Unknown contexts
    /// are ignored.
    pub fn finish(&self, ctx: ContextId) {
        let mut registry = self.lock();
        if registry.stacks.remove(&ctx).is_some() {
            registry.generations.remove(&ctx);
            registry.finished.push(ctx);
            debug!("{ctx} finished");
        }
    }

    /// Current frames of `ctx`, outermost first.
    #[must_use]
    pub fn stack(&self, ctx: ContextId) -> Option<Vec<String>> {
        self.lock().stacks.get(&ctx).cloned()
    }

    /// Number of live contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().stacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // A panic while holding the lock cannot leave a stack half-updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StackProbe for TaskRegistry {
    fn capture(&self) -> Vec<CapturedStack> {
        self.lock()
            .stacks
            .iter()
            .map(|(&context, frames)| CapturedStack { context, frames: frames.clone() })
            .collect()
    }

    fn take_finished(&self) -> Vec<ContextId> {
        std::mem::take(&mut self.lock().finished)
    }
}

/// Pops its frame (and anything entered after it) when dropped.
#[derive(Debug)]
pub struct FrameGuard {
    registry: TaskRegistry,
    context: ContextId,
    depth: usize,
    generation: u64,
}

impl FrameGuard {
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Index of the guarded frame in its context's stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        // Finished contexts have no stack left to pop
        if registry.generations.get(&self.context) != Some(&self.generation) {
            return;
        }
        if let Some(stack) = registry.stacks.get_mut(&self.context) {
            stack.truncate(self.depth);
        }
    }
}
