//! Render Phase Tracking
//!
//! The host alternates between two phases. During the render phase,
//! components run and describe their children; nothing observable may
//! happen. During the commit phase, effects run: subscriptions are attached,
//! containers publish, and cleanups of unmounted instances fire.
//!
//! # Implementation
//!
//! A thread-local stack records which phase is active and, while rendering,
//! which instance is on the stack. Entering a phase pushes an entry and
//! returns a guard that pops it on drop, so the stack stays balanced even
//! when a component panics.
//!
//! Nesting happens when one host flushes inside another host's commit.

use std::cell::RefCell;

use super::node::InstanceId;

thread_local! {
    static PHASE_STACK: RefCell<Vec<PhaseEntry>> = RefCell::new(Vec::new());
}

/// The two halves of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Components are being rendered.
    Render,
    /// Effects and cleanups are running.
    Commit,
}

#[derive(Debug, Clone, Copy)]
struct PhaseEntry {
    phase: Phase,
    instance: Option<InstanceId>,
}

/// Guard that pops the phase entry when dropped.
pub struct PhaseGuard {
    phase: Phase,
}

impl PhaseGuard {
    /// Enter the render phase for one instance.
    pub fn render(instance: InstanceId) -> Self {
        Self::push(PhaseEntry {
            phase: Phase::Render,
            instance: Some(instance),
        })
    }

    /// Enter the commit phase.
    pub fn commit() -> Self {
        Self::push(PhaseEntry {
            phase: Phase::Commit,
            instance: None,
        })
    }

    fn push(entry: PhaseEntry) -> Self {
        PHASE_STACK.with(|stack| stack.borrow_mut().push(entry));
        Self { phase: entry.phase }
    }

    /// The innermost active phase, if any.
    pub fn current() -> Option<Phase> {
        PHASE_STACK.with(|stack| stack.borrow().last().map(|entry| entry.phase))
    }

    /// Whether a component is rendering on this thread right now.
    pub fn is_rendering() -> bool {
        Self::current() == Some(Phase::Render)
    }

    /// The instance currently rendering, if any.
    pub fn rendering_instance() -> Option<InstanceId> {
        PHASE_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .filter(|entry| entry.phase == Phase::Render)
                .and_then(|entry| entry.instance)
        })
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        PHASE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.phase, self.phase,
                    "phase stack mismatch: expected {:?}, got {:?}",
                    self.phase, entry.phase
                );
            }
        });
    }
}
