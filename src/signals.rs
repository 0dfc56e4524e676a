//! Termination signal handling.
//!
//! `SIGINT` and `SIGTERM` are turned into a cancellation of the supervisor's
//! shutdown context, carrying the signal as its cause.

use std::thread;

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};

use crate::context::{Cause, Context};
use crate::error::{SupervisorError, SupervisorResult};

pub const TERMINATION_SIGNALS: [i32; 2] = [SIGINT, SIGTERM];

pub(crate) struct SignalListener {
    handle: Handle,
    thread: Option<thread::JoinHandle<()>>,
}

impl SignalListener {
    /// Starts listening. The first signal received cancels `context`; any
    /// later ones are absorbed until the listener is closed.
    pub(crate) fn start(context: &Context) -> SupervisorResult<Self> {
        let mut signals = Signals::new(TERMINATION_SIGNALS)
            .map_err(|error| SupervisorError::SignalRegistrationError(error.into()))?;
        let handle = signals.handle();
        let context = context.clone();
        let thread = thread::spawn(move || {
            for signal in signals.forever() {
                context.cancel_with(Cause::Signal(signal));
            }
        });
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub(crate) fn close(mut self) {
        self.shut_down();
    }

    fn shut_down(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.shut_down();
    }
}
