//! `CommandSink` trait for the differential-drive base.
//!
//! The controllers never talk to a motor driver directly; every velocity
//! command goes through this trait so the bus, a simulator, or a real base
//! driver can sit behind it.

use trailbot_types::{FollowError, VelocityCommand};

/// Consumer of velocity commands.
///
/// Publishing is fire-and-forget: an implementation must not block waiting
/// for the base to acknowledge a command.
pub trait CommandSink: Send {
    /// Stable identifier for log lines, e.g. `"cmd_vel"`.
    fn id(&self) -> &str;

    /// Forward `cmd` to the base.
    ///
    /// # Errors
    ///
    /// Returns [`FollowError::Actuation`] if the command could not be handed
    /// off.  Callers log the error and keep running.
    fn publish(&mut self, cmd: VelocityCommand) -> Result<(), FollowError>;
}

impl<S: CommandSink + ?Sized> CommandSink for Box<S> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn publish(&mut self, cmd: VelocityCommand) -> Result<(), FollowError> {
        (**self).publish(cmd)
    }
}
