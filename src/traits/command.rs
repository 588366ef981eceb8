//! Command source consumed by the control tick.

use crate::commands::Command;

/// A source of queued commands.
///
/// The controller drains a stream once per tick until it returns `None`.
/// Implemented by [`CommandQueue`](crate::commands::CommandQueue) and its
/// [`CommandReceiver`](crate::commands::CommandReceiver) half.
pub trait CommandStream {
    /// Take the next pending command.
    fn next_command(&mut self) -> Option<Command>;
}

impl<T: CommandStream + ?Sized> CommandStream for &mut T {
    fn next_command(&mut self) -> Option<Command> {
        (**self).next_command()
    }
}

/// A stream that never yields a command.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCommands;

impl CommandStream for NoCommands {
    fn next_command(&mut self) -> Option<Command> {
        None
    }
}
