use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;

use crate::context::Context;
use crate::error::{SupervisorError, SupervisorResult};
use crate::log;
use crate::services::{ServiceInfo, ServiceSpec, ServiceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ExitStatus {
    ExitedWithCode(u8),
    ExitedWithSignal(u8),
    None,
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(value: std::process::ExitStatus) -> Self {
        match (value.code(), value.signal()) {
            (Some(code), _) => u8::try_from(code).map_or(Self::None, Self::ExitedWithCode),
            (None, Some(signal)) => u8::try_from(signal).map_or(Self::None, Self::ExitedWithSignal),
            (None, None) => Self::None,
        }
    }
}

/// The runtime counterpart of a [`ServiceSpec`].
///
/// Each spawned process is owned by a watcher thread, which kills and reaps it
/// once the service's guard context is cancelled. The guard is a child of the
/// context the service was started with, so the process goes away either when
/// that context is cancelled or when [`Service::stop`] is called.
pub struct Service {
    spec: ServiceSpec,
    status: ServiceStatus,
    process: Option<Process>,
}

struct Process {
    id: u32,
    guard: Context,
    watcher: Watcher,
}

impl Service {
    pub(crate) fn new(spec: ServiceSpec) -> Self {
        Self {
            spec,
            status: ServiceStatus::Stopped,
            process: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    pub(crate) fn process_id(&self) -> Option<u32> {
        self.process.as_ref().map(|process| process.id)
    }

    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: self.spec.name.clone(),
            description: self.spec.description.clone(),
            command: self.spec.command.clone(),
            args: self.spec.args.clone(),
            status: self.status,
        }
    }

    /// Spawns the process. Success means the OS accepted it, nothing more.
    pub(crate) fn start(&mut self, context: &Context) -> SupervisorResult<()> {
        if self.process.is_some() {
            return Err(SupervisorError::AlreadyStarted {
                service: self.spec.name.clone(),
            });
        }
        self.status = ServiceStatus::Starting;
        log::info!(event = "START", service = self.info(), environment = self.spec.environment);
        match self.spawn(context) {
            Ok(process) => {
                log::debug!(event = "START", service = self.spec.name, process_id = process.id);
                self.process = Some(process);
                Ok(())
            }
            Err(error) => {
                self.status = ServiceStatus::Failed;
                log::error!(event = "START_FAILED", service = self.info(), error);
                Err(error)
            }
        }
    }

    fn spawn(&self, context: &Context) -> SupervisorResult<Process> {
        if context.is_cancelled() {
            return Err(SupervisorError::StartCancelled {
                service: self.spec.name.clone(),
            });
        }
        let guard = context.child();
        let (sender, watcher) = watch(&self.spec.name, &guard).map_err(|error| {
            SupervisorError::WatcherError {
                service: self.spec.name.clone(),
                inner: error.into(),
            }
        })?;

        let mut command = Command::new(&self.spec.command);
        command
            .args(&self.spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        // no declared environment means the supervisor's own is inherited
        if !self.spec.environment.is_empty() {
            command.env_clear();
        }
        for entry in &self.spec.environment {
            match entry.split_once('=') {
                Some((key, value)) => {
                    command.env(key, value);
                }
                None => {
                    log::warning!(
                        event = "START",
                        service = self.spec.name,
                        message = "skipping an environment entry without '='",
                        entry,
                    );
                }
            }
        }

        // on failure the sender is dropped, which lets the watcher exit
        let child = command
            .spawn()
            .map_err(|error| SupervisorError::StartProcessError {
                service: self.spec.name.clone(),
                inner: error.into(),
            })?;
        let id = child.id();
        if let Err(mpsc::SendError(mut child)) = sender.send(child) {
            // the watcher is gone, so nothing else will reap this process
            let _ = kill(&self.spec.name, id);
            let _ = child.wait();
            return Err(SupervisorError::WatcherLost {
                service: self.spec.name.clone(),
                process_id: id,
            });
        }
        Ok(Process { id, guard, watcher })
    }

    /// Kills the process and waits for it to exit.
    ///
    /// A service without a process keeps its status and reports `NotStarted`.
    pub(crate) fn stop(&mut self) -> SupervisorResult<ExitStatus> {
        let Some(process) = self.process.take() else {
            log::debug!(event = "STOP", service = self.info(), message = "nothing to stop");
            return Err(SupervisorError::NotStarted {
                service: self.spec.name.clone(),
            });
        };
        self.status = ServiceStatus::Stopping;
        log::info!(event = "STOP", service = self.info(), process_id = process.id);

        process.guard.cancel();
        let result = process.watcher.join().unwrap_or_else(|_| {
            Err(SupervisorError::WatcherLost {
                service: self.spec.name.clone(),
                process_id: process.id,
            })
        });
        match result {
            Ok(exit_status) => {
                self.status = ServiceStatus::Stopped;
                log::info!(event = "STOPPED", service = self.info(), exit_status);
                Ok(exit_status)
            }
            Err(error) => {
                self.status = ServiceStatus::Failed;
                log::error!(event = "STOP_FAILED", service = self.info(), error);
                Err(error)
            }
        }
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        if self.process.is_some() {
            // failures are logged by `stop`
            let _ = self.stop();
        }
    }
}

type Watcher = thread::JoinHandle<SupervisorResult<ExitStatus>>;

/// Starts the thread that will own the process, before there is a process to
/// own. It exits early if the sender is dropped without sending a child.
fn watch(service: &str, guard: &Context) -> std::io::Result<(mpsc::Sender<Child>, Watcher)> {
    let (sender, receiver) = mpsc::channel();
    let watcher = {
        let service = service.to_owned();
        let guard = guard.clone();
        thread::Builder::new().spawn(move || match receiver.recv() {
            Ok(child) => terminate_once_cancelled(&service, child, &guard),
            Err(mpsc::RecvError) => Ok(ExitStatus::None),
        })?
    };
    Ok((sender, watcher))
}

fn terminate_once_cancelled(
    service: &str,
    mut child: Child,
    guard: &Context,
) -> SupervisorResult<ExitStatus> {
    guard.wait();
    let process_id = child.id();
    kill(service, process_id)?;
    let exit_status = child
        .wait()
        .map_err(|error| SupervisorError::WaitProcessError {
            service: service.to_owned(),
            process_id,
            inner: error.into(),
        })?;
    Ok(exit_status.into())
}

fn kill(service: &str, process_id: u32) -> SupervisorResult<()> {
    let stop_error = |inner: std::io::Error| SupervisorError::StopProcessError {
        service: service.to_owned(),
        process_id,
        inner: inner.into(),
    };
    let pid = i32::try_from(process_id)
        .map(nix::unistd::Pid::from_raw)
        .map_err(|error| stop_error(std::io::Error::new(std::io::ErrorKind::InvalidInput, error)))?;
    match nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => Ok(()), // the process was already gone
        Err(error) => Err(stop_error(std::io::Error::from_raw_os_error(error as i32))),
    }
}
