//! Integration tests for the stable multicast engine.
//!
//! These tests run whole groups over the in-memory network and verify:
//! - The join handshake assigns ids in arrival order on every member
//! - Messages are delivered, stamped and buffered as expected
//! - Buffered messages are evicted once every member has seen them
//! - Bad input never stops a receive loop
//! - A closed endpoint stops only its own receive loop

use stablecast_sdk::{
    ChannelDeliver, CoreError, Endpoint, Envelope, GroupConfigBuilder, GroupEvent, JoinState,
    MemberId, MemoryNetwork, MemoryTransport, PeerInfo, SdkError, StableMulticast, Targets,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

struct Node {
    engine: StableMulticast<MemoryTransport>,
    deliveries: mpsc::UnboundedReceiver<String>,
    events: broadcast::Receiver<GroupEvent>,
}

impl Node {
    fn new(network: &MemoryNetwork, name: &str, join_timeout: Option<Duration>) -> Self {
        let config = GroupConfigBuilder::new()
            .user_name(name)
            .join_timeout(join_timeout)
            .build()
            .unwrap();
        let (deliver, deliveries) = ChannelDeliver::new();
        let engine =
            StableMulticast::new(config, Arc::new(network.attach_next()), deliver).unwrap();
        let events = engine.subscribe();
        Node {
            engine,
            deliveries,
            events,
        }
    }

    async fn next_delivery(&mut self) -> String {
        timeout(WAIT, self.deliveries.recv())
            .await
            .expect("timed out waiting for a delivery")
            .expect("delivery channel closed")
    }

    async fn wait_for(&mut self, wanted: impl Fn(&GroupEvent) -> bool) -> GroupEvent {
        timeout(WAIT, async {
            loop {
                match self.events.recv().await {
                    Ok(event) if wanted(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for an event")
    }

    async fn wait_joined(&mut self) -> MemberId {
        match self
            .wait_for(|e| matches!(e, GroupEvent::Joined { .. }))
            .await
        {
            GroupEvent::Joined { id, .. } => id,
            _ => unreachable!(),
        }
    }
}

/// Found a group with the first node and join the rest one at a time.
async fn form_group(network: &MemoryNetwork, names: &[&str]) -> Vec<Node> {
    let mut nodes: Vec<Node> = names
        .iter()
        .map(|name| Node::new(network, name, None))
        .collect();

    nodes[0].engine.start().await.unwrap();
    nodes[0].engine.found_group().await.unwrap();
    nodes[0].wait_joined().await;

    for i in 1..nodes.len() {
        nodes[i].engine.start().await.unwrap();
        let id = nodes[i].wait_joined().await;
        assert_eq!(id, MemberId(i));
        for earlier in nodes.iter_mut().take(i) {
            let notice = earlier.next_delivery().await;
            assert_eq!(notice, format!("Welcome {} to the group!", names[i]));
        }
    }
    nodes
}

#[tokio::test]
async fn test_three_members_join_in_order() {
    let network = MemoryNetwork::new();
    let nodes = form_group(&network, &["a", "b", "c"]).await;

    for node in &nodes {
        assert_eq!(node.engine.list_members(), vec!["a", "b", "c"]);
    }
    let ids: Vec<_> = nodes.iter().map(|n| n.engine.join_state()).collect();
    assert_eq!(
        ids,
        vec![
            JoinState::Member(MemberId(0)),
            JoinState::Member(MemberId(1)),
            JoinState::Member(MemberId(2)),
        ]
    );

    for n in &nodes {
        n.engine.shutdown();
    }
}

#[tokio::test]
async fn test_message_is_delivered_and_buffered() {
    let network = MemoryNetwork::new();
    let mut nodes = form_group(&network, &["a", "b", "c"]).await;

    let sent = nodes[0].engine.send("hi").await.unwrap();
    assert_eq!(sent, 3);

    for node in nodes.iter_mut() {
        assert_eq!(node.next_delivery().await, "hi");
    }

    let dump = nodes[1].engine.dump_state();
    assert_eq!(dump.matrix[0], vec![1, -1, -1]);
    assert_eq!(dump.matrix[1][0], 1);
    assert_eq!(dump.buffer.len(), 1);
    assert_eq!(dump.buffer[0].text, "hi");
    assert_eq!(dump.buffer[0].sender, MemberId(0));

    for n in &nodes {
        n.engine.shutdown();
    }
}

#[tokio::test]
async fn test_message_evicted_once_everyone_has_seen_it() {
    let network = MemoryNetwork::new();
    let mut nodes = form_group(&network, &["a", "b", "c"]).await;

    nodes[0].engine.send("hi").await.unwrap();
    for node in nodes.iter_mut() {
        assert_eq!(node.next_delivery().await, "hi");
    }

    nodes[1].engine.send("from b").await.unwrap();
    nodes[2].engine.send("from c").await.unwrap();

    let evicted = nodes[0]
        .wait_for(|e| matches!(e, GroupEvent::Evicted { text, .. } if text == "hi"))
        .await;
    assert_eq!(
        evicted,
        GroupEvent::Evicted {
            from: MemberId(0),
            text: "hi".into()
        }
    );
    assert!(nodes[0]
        .engine
        .dump_state()
        .buffer
        .iter()
        .all(|m| m.text != "hi"));

    for n in &nodes {
        n.engine.shutdown();
    }
}

#[tokio::test]
async fn test_send_to_subset() {
    let network = MemoryNetwork::new();
    let mut nodes = form_group(&network, &["a", "b", "c"]).await;

    let sent = nodes[0]
        .engine
        .send_to("just b", &Targets::Members(vec![MemberId(1)]))
        .await
        .unwrap();
    assert_eq!(sent, 1);
    assert_eq!(nodes[1].next_delivery().await, "just b");

    // c never saw it, so a later broadcast arrives first in c's queue
    nodes[0].engine.send("everyone").await.unwrap();
    assert_eq!(nodes[2].next_delivery().await, "everyone");

    for n in &nodes {
        n.engine.shutdown();
    }
}

#[tokio::test]
async fn test_msg_before_join_is_rejected() {
    let network = MemoryNetwork::new();
    let lurker = Node::new(&network, "lurker", None);

    let mut sender = PeerInfo::new("a", "127.0.0.1:9".parse().unwrap());
    sender.assign(MemberId(0));
    let msg = Envelope::msg(sender, vec![1, -1, -1], "early");

    let err = lurker.engine.process(msg).await.unwrap_err();
    assert!(matches!(err, SdkError::Core(CoreError::NotJoined)));
    assert!(lurker.engine.dump_state().buffer.is_empty());
}

#[tokio::test]
async fn test_malformed_datagram_does_not_stop_listener() {
    let network = MemoryNetwork::new();
    let mut nodes = form_group(&network, &["a", "b"]).await;

    let a_addr = nodes[0].engine.local().socket_addr();
    network.send_raw(a_addr, b"{not json".to_vec());
    network.send_raw(a_addr, br#"{"kind":"msg","sender":{"name":"x","id":0}}"#.to_vec());

    nodes[1].engine.send("still alive").await.unwrap();
    assert_eq!(nodes[0].next_delivery().await, "still alive");

    for n in &nodes {
        n.engine.shutdown();
    }
}

#[tokio::test]
async fn test_lone_process_founds_group_after_timeout() {
    let network = MemoryNetwork::new();
    let mut solo = Node::new(&network, "solo", Some(Duration::from_millis(50)));

    solo.engine.start().await.unwrap();
    let joined = solo
        .wait_for(|e| matches!(e, GroupEvent::Joined { .. }))
        .await;
    assert_eq!(
        joined,
        GroupEvent::Joined {
            id: MemberId(0),
            members: 1
        }
    );

    solo.engine.send("echo").await.unwrap();
    assert_eq!(solo.next_delivery().await, "echo");
    assert_eq!(solo.engine.dump_state().matrix[0][0], 1);
    solo.engine.shutdown();
}

#[tokio::test]
async fn test_late_joiner_is_answered_by_timeout_founder() {
    let network = MemoryNetwork::new();
    let mut first = Node::new(&network, "first", Some(Duration::from_millis(50)));
    let mut second = Node::new(&network, "second", Some(Duration::from_secs(30)));

    first.engine.start().await.unwrap();
    first.wait_joined().await;

    second.engine.start().await.unwrap();
    assert_eq!(second.wait_joined().await, MemberId(1));
    assert_eq!(first.next_delivery().await, "Welcome second to the group!");

    first.engine.shutdown();
    second.engine.shutdown();
}

#[tokio::test]
async fn test_closed_endpoint_stops_only_its_listener() {
    let network = MemoryNetwork::new();
    let mut nodes = form_group(&network, &["a", "b"]).await;

    let a_addr = nodes[0].engine.local().socket_addr();
    nodes[0]
        .engine
        .transport()
        .network()
        .close(a_addr, Endpoint::Direct);

    // a's group listener still admits newcomers
    let mut c = Node::new(&network, "c", None);
    c.engine.start().await.unwrap();
    assert_eq!(c.wait_joined().await, MemberId(2));
    assert_eq!(nodes[0].next_delivery().await, "Welcome c to the group!");
    assert_eq!(nodes[0].engine.list_members(), vec!["a", "b", "c"]);

    // while nothing reaches its closed point-to-point endpoint
    nodes[1].engine.send("unheard").await.unwrap();
    assert_eq!(c.next_delivery().await, "unheard");
    assert!(nodes[0].deliveries.try_recv().is_err());

    c.engine.shutdown();
    for n in &nodes {
        n.engine.shutdown();
    }
}
