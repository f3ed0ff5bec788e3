/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{
    collections::BTreeMap,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
};

use chained_hotstuff::{
    networking::{messages::Message, network::Network},
    types::data_types::ReplicaID,
};

/// A mock network stub which passes messages from and to threads using channels.
///
/// Clones share the same inbox, so a test can keep a clone to inspect or drain the messages addressed
/// to a replica whose stub it handed over.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    me: ReplicaID,
    all_peers: BTreeMap<ReplicaID, Sender<(ReplicaID, Message)>>,
    inbox: Arc<Mutex<Receiver<(ReplicaID, Message)>>>,
}

impl NetworkStub {
    pub(crate) fn id(&self) -> ReplicaID {
        self.me
    }

    /// Take every message currently waiting in the inbox.
    pub(crate) fn drain(&self) -> Vec<(ReplicaID, Message)> {
        let inbox = self.inbox.lock().unwrap();
        let mut messages = Vec::new();
        while let Ok(message) = inbox.try_recv() {
            messages.push(message);
        }
        messages
    }
}

impl Network for NetworkStub {
    fn send(&mut self, peer: ReplicaID, message: Message) {
        if let Some(peer) = self.all_peers.get(&peer) {
            let _ = peer.send((self.me, message));
        }
    }

    fn broadcast(&mut self, message: Message) {
        for (peer_id, peer) in &self.all_peers {
            if *peer_id != self.me {
                let _ = peer.send((self.me, message.clone()));
            }
        }
    }

    fn recv(&mut self) -> Option<(ReplicaID, Message)> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok(o_m) => Some(o_m),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!(),
        }
    }
}

/// Create one connected stub per ID in `peers`, in the same order.
pub(crate) fn mock_network(peers: impl Iterator<Item = ReplicaID>) -> Vec<NetworkStub> {
    let mut all_peers = BTreeMap::new();
    let peer_and_inboxes: Vec<(ReplicaID, Receiver<(ReplicaID, Message)>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);

            (peer, receiver)
        })
        .collect();

    peer_and_inboxes
        .into_iter()
        .map(|(me, inbox)| NetworkStub {
            me,
            all_peers: all_peers.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
        })
        .collect()
}
