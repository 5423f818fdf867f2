//! Busy flags for in-flight operations
//!
//! The coordinator is mutably borrowed for the whole of an operation, so the
//! flags live behind a shared handle the UI can clone and poll from
//! elsewhere. A flag is raised by [`BusyFlags::begin`] and lowered when the
//! returned guard drops, which covers early returns, errors, panics and a
//! dropped operation future alike.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Operations that carry a busy flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CheckAuth,
    SignUp,
    LogIn,
    UpdateProfile,
    FetchUsers,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::CheckAuth,
        Operation::SignUp,
        Operation::LogIn,
        Operation::UpdateProfile,
        Operation::FetchUsers,
    ];

    fn index(self) -> usize {
        match self {
            Operation::CheckAuth => 0,
            Operation::SignUp => 1,
            Operation::LogIn => 2,
            Operation::UpdateProfile => 3,
            Operation::FetchUsers => 4,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::CheckAuth => "check-auth",
            Operation::SignUp => "signup",
            Operation::LogIn => "login",
            Operation::UpdateProfile => "update-profile",
            Operation::FetchUsers => "fetch-users",
        };
        f.write_str(name)
    }
}

/// Shared, independent busy flags; clones observe the same flags
#[derive(Debug, Clone, Default)]
pub struct BusyFlags {
    flags: Arc<[AtomicBool; 5]>,
}

impl BusyFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self, op: Operation) -> bool {
        self.flags[op.index()].load(Ordering::SeqCst)
    }

    pub fn any_busy(&self) -> bool {
        Operation::ALL.iter().any(|op| self.is_busy(*op))
    }

    pub fn checking_auth(&self) -> bool {
        self.is_busy(Operation::CheckAuth)
    }

    pub fn signing_up(&self) -> bool {
        self.is_busy(Operation::SignUp)
    }

    pub fn logging_in(&self) -> bool {
        self.is_busy(Operation::LogIn)
    }

    pub fn updating_profile(&self) -> bool {
        self.is_busy(Operation::UpdateProfile)
    }

    pub fn fetching_users(&self) -> bool {
        self.is_busy(Operation::FetchUsers)
    }

    /// Raise the flag for `op` until the guard is dropped
    #[must_use = "the flag is cleared as soon as the guard is dropped"]
    pub fn begin(&self, op: Operation) -> BusyGuard {
        self.flags[op.index()].store(true, Ordering::SeqCst);
        log::debug!("{} started", op);
        BusyGuard {
            flags: self.flags.clone(),
            op,
        }
    }
}

/// Clears its operation's flag on drop
#[derive(Debug)]
pub struct BusyGuard {
    flags: Arc<[AtomicBool; 5]>,
    op: Operation,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flags[self.op.index()].store(false, Ordering::SeqCst);
        log::debug!("{} finished", self.op);
    }
}
