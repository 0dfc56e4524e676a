use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

/// Why a context was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Cause {
    Cancelled,
    Signal(i32),
}

impl std::fmt::Display for Cause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::Signal(number) => match nix::sys::signal::Signal::try_from(*number) {
                Ok(signal) => write!(f, "received {}", signal.as_str()),
                Err(_) => write!(f, "received signal {}", number),
            },
        }
    }
}

/// A cancellation scope shared between the supervisor and the processes it
/// spawns.
///
/// Cancelling a context cancels every context derived from it with
/// [`Context::child`], but never its parent. Only the first cancellation
/// counts; later ones keep the original cause.
#[derive(Clone)]
pub struct Context(Arc<Node>);

struct Node {
    state: Mutex<State>,
    condvar: Condvar,
}

#[derive(Default)]
struct State {
    cause: Option<Cause>,
    children: Vec<Weak<Node>>,
}

impl Node {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Context {
    pub fn new() -> Self {
        Self(Arc::new(Node {
            state: Mutex::new(State::default()),
            condvar: Condvar::new(),
        }))
    }

    pub fn child(&self) -> Self {
        let child = Self::new();
        let mut state = self.0.lock();
        match state.cause {
            Some(cause) => {
                child.0.lock().cause = Some(cause);
            }
            None => {
                state.children.retain(|node| node.strong_count() > 0);
                state.children.push(Arc::downgrade(&child.0));
            }
        }
        child
    }

    pub fn cancel(&self) {
        self.cancel_with(Cause::Cancelled)
    }

    pub(crate) fn cancel_with(&self, cause: Cause) {
        let children = {
            let mut state = self.0.lock();
            if state.cause.is_some() {
                return;
            }
            state.cause = Some(cause);
            self.0.condvar.notify_all();
            std::mem::take(&mut state.children)
        };
        for node in children.iter().filter_map(Weak::upgrade) {
            Self(node).cancel_with(cause);
        }
    }

    pub fn cause(&self) -> Option<Cause> {
        self.0.lock().cause
    }

    pub fn is_cancelled(&self) -> bool {
        self.cause().is_some()
    }

    /// Blocks until the context is cancelled.
    pub fn wait(&self) -> Cause {
        let mut state = self.0.lock();
        loop {
            if let Some(cause) = state.cause {
                return cause;
            }
            state = self
                .0
                .condvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cause", &self.cause())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    #[ntest::timeout(2000)]
    fn test_wait_until_cancelled() {
        let context = Context::new();
        let context_in_thread = context.clone();

        let waiter = thread::spawn(move || context_in_thread.wait());
        context.cancel();

        assert_eq!(waiter.join().ok(), Some(Cause::Cancelled));
    }

    #[test]
    fn test_cancelling_a_parent_cancels_its_children() {
        let parent = Context::new();
        let child = parent.child();
        let grandchild = child.child();

        parent.cancel_with(Cause::Signal(15));

        assert_eq!(child.cause(), Some(Cause::Signal(15)));
        assert_eq!(grandchild.cause(), Some(Cause::Signal(15)));
    }

    #[test]
    fn test_cancelling_a_child_leaves_its_parent_alone() {
        let parent = Context::new();
        let child = parent.child();

        child.cancel();

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_children_of_cancelled_contexts_start_cancelled() {
        let parent = Context::new();
        parent.cancel();

        assert_eq!(parent.child().cause(), Some(Cause::Cancelled));
    }

    #[test]
    fn test_the_first_cause_wins() {
        let context = Context::new();

        context.cancel_with(Cause::Signal(2));
        context.cancel();

        assert_eq!(context.wait(), Cause::Signal(2));
    }

    #[test]
    fn test_describing_a_signal() {
        assert_eq!(Cause::Signal(15).to_string(), "received SIGTERM");
        assert_eq!(Cause::Cancelled.to_string(), "cancelled");
    }
}
