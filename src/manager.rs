use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::context::{Cause, Context};
use crate::error::{Errors, SupervisorError};
use crate::log;
use crate::services::*;
use crate::signals::SignalListener;

/// Owns every registered service for the lifetime of one supervisor run.
///
/// Registration and the bulk start and stop traversals all hold the same lock,
/// so none of them interleave, and services are always visited in
/// registration order.
pub struct Manager {
    services: Mutex<Vec<Service>>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    pub fn new() -> Self {
        Self {
            services: Mutex::new(Vec::new()),
        }
    }

    /// Registers a service in the `STOPPED` state. Names are not checked for
    /// uniqueness.
    pub fn create_service(&self, spec: ServiceSpec) -> ServiceInfo {
        let service = Service::new(spec);
        let info = service.info();
        log::debug!(event = "REGISTER", service = info);
        self.lock().push(service);
        info
    }

    pub fn services(&self) -> Vec<ServiceInfo> {
        self.lock().iter().map(Service::info).collect()
    }

    /// Starts every service, waits for a shutdown trigger, then stops every
    /// service.
    ///
    /// The triggers are cancellation of `context` and `SIGINT`/`SIGTERM`. Both
    /// stop everything the same way; only cancellation counts as an error.
    /// Start failures don't end the run early. The result holds the start
    /// failures, the cancellation and the stop failures, in that order.
    pub fn run(&self, context: &Context) -> Result<(), Errors> {
        let shutdown = context.child();
        let listener = SignalListener::start(&shutdown)?;

        let mut errors = self.start_all(context);
        if !errors.is_empty() {
            log::warning!(event = "START", failures = errors.len(), errors);
        }

        match shutdown.wait() {
            cause @ Cause::Cancelled => {
                log::error!(event = "SHUTDOWN", cause = cause.to_string());
                errors.push(SupervisorError::Cancelled);
            }
            cause @ Cause::Signal(_) => {
                log::info!(event = "SHUTDOWN", cause = cause.to_string());
            }
        }

        errors.extend(self.stop_all());
        listener.close();
        errors.into_result()
    }

    fn start_all(&self, context: &Context) -> Errors {
        self.lock()
            .iter_mut()
            .filter_map(|service| service.start(context).err())
            .collect()
    }

    fn stop_all(&self) -> Errors {
        self.lock()
            .iter_mut()
            .filter_map(|service| service.stop().err())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Service>> {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
