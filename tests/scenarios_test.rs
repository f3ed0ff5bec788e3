/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Step-by-step runs of a four-replica cluster driven by hand, checking the state of every replica at
//! the interesting points of the normal case, a failed view, and stale messages.
//!
//! With replicas `0..4` in round-robin order, view `v` is led by replica `v mod 4`.

use std::time::Instant;

use chained_hotstuff::{
    block_store::BlockStore,
    hotstuff::messages::{HotStuffMessage, Proposal},
    networking::messages::Message,
    types::{
        block::Block,
        data_types::{Command, ReplicaID, ViewNumber},
    },
};
use log::LevelFilter;

mod common;

use crate::common::{
    cluster::{deliver_everything, Cluster, BASE_VIEW_TIMEOUT},
    logging::setup_logger,
};

fn proposal_view(message: &Message) -> Option<ViewNumber> {
    match message {
        Message::HotStuffMessage(HotStuffMessage::Proposal(proposal)) => Some(proposal.block.view),
        _ => None,
    }
}

/// Drops every proposal for `view` or later.
fn proposals_below(view: u64) -> impl FnMut(ReplicaID, ReplicaID, &Message) -> bool {
    move |_, _, message| proposal_view(message).map_or(true, |v| v < ViewNumber::new(view))
}

#[test]
fn commit_after_three_chain_test() {
    setup_logger(LevelFilter::Info);

    // 1. Give every replica a command to propose, and enter view 1 everywhere.
    let t0 = Instant::now();
    let mut cluster = Cluster::new(4, t0);
    for peer in &cluster.peers {
        peer.commands.push(format!("command from {}", peer.id()).as_str());
    }
    cluster.tick_all(t0);
    assert!(cluster
        .peers
        .iter()
        .all(|peer| peer.algorithm.view() == ViewNumber::new(1)));

    // 2. Nothing is committed until some replica has voted for B3.
    let committed = cluster.run_until(
        t0,
        &mut deliver_everything,
        |cluster| cluster.peers.iter().any(|peer| peer.committed_view() > ViewNumber::init()),
        50,
    );
    assert!(committed);
    for peer in cluster.peers.iter().filter(|peer| peer.committed_view() > ViewNumber::init()) {
        assert!(peer.algorithm.last_vote() >= ViewNumber::new(3));
    }

    // 3. Every replica commits B1, and only B1.
    let committed = cluster.run_until(
        t0,
        &mut deliver_everything,
        |cluster| cluster.peers.iter().all(|peer| peer.committed_view() > ViewNumber::init()),
        50,
    );
    assert!(committed);

    let (b1, b1_view) = cluster.peer(0).algorithm.last_committed();
    assert_eq!(b1_view, ViewNumber::new(1));
    for peer in &cluster.peers {
        assert_eq!(peer.algorithm.last_committed(), (b1, b1_view));
        assert_eq!(
            peer.commit_log.commands(),
            vec![Command::from("command from 1")]
        );
    }

    // 4. B1 extends genesis and was proposed by the leader of view 1. Genesis has been pruned.
    let block = cluster.peer(2).algorithm.block_store().get(&b1).unwrap();
    assert_eq!(block.parent, Block::genesis().hash);
    assert_eq!(block.proposer, ReplicaID::new(1));
    assert!(!cluster
        .peer(2)
        .algorithm
        .block_store()
        .contains(&Block::genesis().hash));
}

#[test]
fn timeout_cert_moves_everyone_past_a_silent_leader_test() {
    setup_logger(LevelFilter::Info);

    // 1. Run views 1 to 4 normally, but lose the proposal of view 5. Replica 0 formed QC4 and replica
    //    1 (the leader of view 5) learnt it through a NewView. Replicas 2 and 3 are left in view 4.
    let t0 = Instant::now();
    let mut cluster = Cluster::new(4, t0);
    cluster.tick_all(t0);
    cluster.settle(t0, &mut proposals_below(5), 100);

    assert_eq!(cluster.peer(0).algorithm.view(), ViewNumber::new(5));
    assert_eq!(cluster.peer(1).algorithm.view(), ViewNumber::new(5));
    assert_eq!(cluster.peer(2).algorithm.view(), ViewNumber::new(4));
    assert_eq!(cluster.peer(3).algorithm.view(), ViewNumber::new(4));
    let qc4 = cluster.peer(0).algorithm.high_qc().clone();
    let b4 = cluster.peer(0).algorithm.block_store().get(&qc4.block).unwrap();
    assert_eq!(b4.view, ViewNumber::new(4));

    // 2. Every timer fires. The timeouts of replicas 0 and 1 carry QC4, which pulls replicas 2 and 3
    //    into view 5. Two timeouts for view 5 are not enough for a TC.
    let t1 = t0 + BASE_VIEW_TIMEOUT;
    cluster.tick_all(t1);
    cluster.settle(t1, &mut proposals_below(5), 100);

    for peer in &cluster.peers {
        assert_eq!(peer.algorithm.view(), ViewNumber::new(5));
        assert_eq!(*peer.algorithm.high_qc(), qc4);
        assert!(peer.algorithm.highest_tc().is_none());
    }

    // 3. Replicas 2 and 3 time out in view 5 too: TC5 forms, and replica 2 leads view 6. It fills view
    //    5 with a dummy block and proposes B6 on top of it.
    let t2 = t1 + BASE_VIEW_TIMEOUT;
    cluster.tick_all(t2);
    cluster.settle(t2, &mut proposals_below(7), 100);

    for peer in &cluster.peers {
        assert_eq!(peer.algorithm.highest_tc().unwrap().view, ViewNumber::new(5));
        assert!(peer.algorithm.view() >= ViewNumber::new(6));
    }
    for id in 0..3 {
        assert_eq!(cluster.peer(id).algorithm.last_vote(), ViewNumber::new(6));
    }
    // Replica 2 certified B6 and handed QC6 to replica 3, which proposed and voted for B7 before its
    // proposal was lost.
    assert_eq!(cluster.peer(3).algorithm.last_vote(), ViewNumber::new(7));

    let qc6 = cluster.peer(2).algorithm.high_qc().clone();
    let b6 = cluster.peer(2).algorithm.block_store().get(&qc6.block).unwrap();
    assert_eq!(b6.view, ViewNumber::new(6));
    assert_eq!(b6.proposer, ReplicaID::new(2));
    assert_eq!(b6.justify, qc4);

    for peer in &cluster.peers {
        let dummy = peer.algorithm.block_store().get(&b6.parent).unwrap();
        assert_eq!(dummy.view, ViewNumber::new(5));
        assert!(dummy.command.is_empty());
        assert_eq!(dummy.parent, b4.hash);
    }

    // 4. B6 does not extend a run of consecutive views, so it commits nothing new: the last commit is
    //    still B2, made when B4 was voted for.
    for peer in &cluster.peers {
        assert_eq!(peer.committed_view(), ViewNumber::new(2));
    }
}

#[test]
fn stale_proposals_are_dropped_test() {
    setup_logger(LevelFilter::Info);

    // 1. Run views 1 to 4, recording the proposal for view 3 and losing the proposal for view 5.
    let t0 = Instant::now();
    let mut cluster = Cluster::new(4, t0);
    cluster.tick_all(t0);

    let mut recorded: Vec<(ReplicaID, Proposal)> = Vec::new();
    let mut record_and_drop = |origin: ReplicaID, _: ReplicaID, message: &Message| {
        if let Message::HotStuffMessage(HotStuffMessage::Proposal(proposal)) = message {
            if proposal.block.view == ViewNumber::new(3) || proposal.block.view == ViewNumber::new(4) {
                recorded.push((origin, proposal.clone()));
            }
        }
        proposal_view(message).map_or(true, |v| v < ViewNumber::new(5))
    };
    cluster.settle(t0, &mut record_and_drop, 100);

    let (b3_origin, b3) = recorded
        .iter()
        .find(|(_, proposal)| proposal.block.view == ViewNumber::new(3))
        .cloned()
        .unwrap();
    let (b4_origin, b4) = recorded
        .iter()
        .find(|(_, proposal)| proposal.block.view == ViewNumber::new(4))
        .cloned()
        .unwrap();

    // 2. Replica 2 voted at view 4. Replaying the proposals for views 3 and 4 changes nothing and makes
    //    it send nothing.
    let peer = cluster.peer_mut(2);
    assert_eq!(peer.algorithm.last_vote(), ViewNumber::new(4));
    let high_qc = peer.algorithm.high_qc().clone();
    let locked_qc = peer.algorithm.locked_qc().clone();

    peer.algorithm.handle_proposal(b3_origin, b3, t0).unwrap();
    peer.algorithm.handle_proposal(b4_origin, b4, t0).unwrap();

    assert_eq!(peer.algorithm.last_vote(), ViewNumber::new(4));
    assert_eq!(*peer.algorithm.high_qc(), high_qc);
    assert_eq!(*peer.algorithm.locked_qc(), locked_qc);
    for peer in &cluster.peers {
        assert!(peer.inbox.drain().is_empty());
    }
}

#[test]
fn rejected_command_is_not_voted_for_test() {
    setup_logger(LevelFilter::Info);

    // Replicas 2 and 3 refuse the command proposed in view 1, so its leader cannot form a QC.
    let t0 = Instant::now();
    let mut cluster = Cluster::new(4, t0);
    cluster.peer(1).commands.push("contentious");
    cluster.peer(2).rejects.reject("contentious");
    cluster.peer(3).rejects.reject("contentious");

    cluster.tick_all(t0);
    cluster.settle(t0, &mut deliver_everything, 100);

    assert_eq!(cluster.peer(0).algorithm.last_vote(), ViewNumber::new(1));
    assert_eq!(cluster.peer(2).algorithm.last_vote(), ViewNumber::init());
    assert_eq!(cluster.peer(3).algorithm.last_vote(), ViewNumber::init());
    for peer in &cluster.peers {
        assert_eq!(peer.algorithm.view(), ViewNumber::new(1));
        assert!(peer.algorithm.high_qc().is_genesis());
    }
}
