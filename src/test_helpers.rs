#![cfg(test)]

use std::thread;
use std::time;

use crate::services::ServiceSpec;

const QUANTUM: time::Duration = time::Duration::from_millis(100);

pub fn spec(name: &str, command: &str, args: &[&str]) -> ServiceSpec {
    ServiceSpec {
        name: name.to_owned(),
        command: command.to_owned(),
        args: args.iter().map(|&arg| arg.to_owned()).collect(),
        ..Default::default()
    }
}

pub fn pause() {
    thread::sleep(QUANTUM);
}

pub fn process_exists(process_id: u32) -> bool {
    let Ok(raw) = i32::try_from(process_id) else {
        return false;
    };
    match nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

pub fn test_eq<A: std::fmt::Debug + PartialEq>(left: A, right: A) -> anyhow::Result<()> {
    if left == right {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Equality test failed.\n  left:  {:?}\n  right: {:?}\n",
            left,
            right
        ))
    }
}

pub fn eventually<A: std::fmt::Debug>(action: impl Fn() -> anyhow::Result<A>) -> anyhow::Result<A> {
    let start_time = time::Instant::now();
    loop {
        let result = action();
        match result {
            Ok(_) => {
                return result;
            }
            Err(_) => {
                // fail if we've taken too long, otherwise retry after a short delay
                if time::Instant::now() - start_time >= time::Duration::from_secs(3) {
                    return result;
                }
            }
        }
        pause();
    }
}
