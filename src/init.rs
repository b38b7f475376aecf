// SPDX-License-Identifier: GPL-3.0-only

use rustix::process::getpid;

use std::{
    ffi::OsString,
    fs::OpenOptions,
    io,
    os::{fd::AsRawFd, unix::process::CommandExt},
    process::Command,
    thread,
};

/// The init program we hand over to when running as PID 1.
pub const INIT: &str = "/sbin/init";

pub fn is_pid1() -> bool {
    getpid().is_init()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fork {
    Parent(libc::pid_t),
    Child,
}

pub fn fork() -> io::Result<Fork> {
    // SAFETY: the process is single threaded, nothing else can hold a lock at this point
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(Fork::Child),
        pid => Ok(Fork::Parent(pid)),
    }
}

/// Points stdin, stdout and stderr at `/dev/null`, so the console can be
/// taken over by whatever runs next.
pub fn redirect_stdio() -> io::Result<()> {
    let null = OpenOptions::new().read(true).write(true).open("/dev/null")?;
    for fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: both descriptors are valid, dup2 closes `fd` atomically
        if unsafe { libc::dup2(null.as_raw_fd(), fd) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Keeps the device and all mappings alive until we get killed.
pub fn hold() -> ! {
    loop {
        thread::park();
    }
}

/// Replaces the current process with init, passing `args` along.
/// Only returns if that failed.
pub fn exec_init(args: impl IntoIterator<Item = OsString>) -> anyhow::Error {
    let err = Command::new(INIT).arg0(INIT).args(args).exec();
    anyhow::Error::new(err).context(format!("Failed to exec {}", INIT))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_runner_is_not_init() {
        assert!(!is_pid1());
    }

    #[test]
    fn fork_reports_both_sides() {
        match fork().unwrap() {
            Fork::Child => unsafe { libc::_exit(7) },
            Fork::Parent(pid) => {
                let mut status = 0;
                assert_eq!(unsafe { libc::waitpid(pid, &mut status, 0) }, pid);
                assert!(libc::WIFEXITED(status));
                assert_eq!(libc::WEXITSTATUS(status), 7);
            }
        }
    }
}
