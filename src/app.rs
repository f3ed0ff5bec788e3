/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits through which the consensus core exchanges commands with the application it replicates.
//!
//! Consensus treats [`Command`]s as opaque payloads. What to propose next, whether a proposed payload
//! is admissible, and what it means to execute a committed payload are all decided by the application
//! through three narrow traits:
//! 1. [`CommandQueue`]: supplies the payload of the blocks this replica proposes.
//! 2. [`Acceptor`]: decides whether this replica is willing to vote for a proposed payload.
//! 3. [`Executor`]: receives committed payloads, in commit order, exactly once each.
//!
//! All three are called from the algorithm thread and should return quickly: the replica cannot
//! process any other event while one of them is running.

use crate::types::data_types::Command;

/// Supplies payloads for the blocks this replica proposes when it is the leader.
pub trait CommandQueue: Send {
    /// Get the next command to propose, or `None` if there is nothing to propose right now. In the
    /// latter case the leader proposes a block with an [empty](Command::empty) command.
    fn get_command(&mut self) -> Option<Command>;
}

/// Admission policy for proposed commands.
pub trait Acceptor: Send {
    /// Decide whether to vote for a block carrying `command`.
    fn accept(&mut self, command: &Command) -> bool;
}

/// Receives committed commands.
///
/// `exec` is called in commit order, i.e., in ascending order of the views of the blocks that carry
/// the commands, and never more than once for the same block. Empty commands are not passed in.
pub trait Executor: Send {
    fn exec(&mut self, command: Command);
}

/// Handle bundling the application's [`CommandQueue`], [`Acceptor`], and [`Executor`], owned by the
/// algorithm thread.
pub(crate) struct AppHandle {
    command_queue: Box<dyn CommandQueue>,
    acceptor: Box<dyn Acceptor>,
    executor: Box<dyn Executor>,
}

impl AppHandle {
    pub(crate) fn new(
        command_queue: Box<dyn CommandQueue>,
        acceptor: Box<dyn Acceptor>,
        executor: Box<dyn Executor>,
    ) -> Self {
        Self {
            command_queue,
            acceptor,
            executor,
        }
    }

    pub(crate) fn get_command(&mut self) -> Option<Command> {
        self.command_queue.get_command()
    }

    pub(crate) fn accept(&mut self, command: &Command) -> bool {
        self.acceptor.accept(command)
    }

    pub(crate) fn exec(&mut self, command: Command) {
        self.executor.exec(command)
    }
}
