//! Call surface exposed to front ends.
//!
//! Front ends depend on [`CommandService`] rather than on the link directly,
//! so they can be driven by a mock in tests.

use std::future::Future;

use crate::link::LinkHandle;
use crate::models::{Command, CommandResult};

/// Trait for issuing controller commands.
///
/// Implementations never fail out-of-band: every problem is reported as
/// `CommandResult { ok: false, error }`.
pub trait CommandService {
    /// Issue `command` and resolve with its correlated result.
    fn issue_command(&self, command: Command) -> impl Future<Output = CommandResult> + Send;
}

impl CommandService for LinkHandle {
    fn issue_command(&self, command: Command) -> impl Future<Output = CommandResult> + Send {
        LinkHandle::issue_command(self, command)
    }
}
