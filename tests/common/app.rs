/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A simple application: commands are queued by the test, proposed in FIFO order, and appended to a
//! shared log when committed.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use chained_hotstuff::{
    app::{Acceptor, CommandQueue, Executor},
    types::data_types::Command,
};

#[derive(Clone, Default)]
pub(crate) struct Commands(Arc<Mutex<VecDeque<Command>>>);

impl Commands {
    pub(crate) fn push(&self, command: impl Into<Command>) {
        self.0.lock().unwrap().push_back(command.into())
    }
}

impl CommandQueue for Commands {
    fn get_command(&mut self) -> Option<Command> {
        self.0.lock().unwrap().pop_front()
    }
}

/// Accepts every command except those equal to `rejected`.
#[derive(Clone, Default)]
pub(crate) struct RejectList(Arc<Mutex<Vec<Command>>>);

impl RejectList {
    pub(crate) fn reject(&self, command: impl Into<Command>) {
        self.0.lock().unwrap().push(command.into())
    }
}

impl Acceptor for RejectList {
    fn accept(&mut self, command: &Command) -> bool {
        !self.0.lock().unwrap().contains(command)
    }
}

/// Records executed commands in order.
#[derive(Clone, Default)]
pub(crate) struct CommitLog(Arc<Mutex<Vec<Command>>>);

impl CommitLog {
    pub(crate) fn commands(&self) -> Vec<Command> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

impl Executor for CommitLog {
    fn exec(&mut self, command: Command) {
        self.0.lock().unwrap().push(command)
    }
}

/// Assert that of any two logs, one is a prefix of the other.
pub(crate) fn assert_prefix_consistent(logs: &[Vec<Command>]) {
    for a in logs {
        for b in logs {
            let shared = a.len().min(b.len());
            assert_eq!(a[..shared], b[..shared], "committed logs diverge");
        }
    }
}
