//! Property-based tests for the protocol core
//!
//! These tests verify the laws the rest of the system relies on:
//!  - Codec round-trip: decode(encode(e)) == e for every envelope kind
//!  - Send counting: MC[self][self] equals the number of local sends,
//!    whatever remote traffic is interleaved
//!  - Stability monotonicity: with non-decreasing counters, a message that
//!    became stable never becomes unstable again

use proptest::prelude::*;
use stablecast_core::{
    decode, encode, BufferedMessage, Envelope, MemberId, PeerInfo, TimestampMatrix,
};
use std::net::{IpAddr, Ipv4Addr};

const CAPACITY: usize = 4;

fn peer_strategy() -> impl Strategy<Value = PeerInfo> {
    ("[a-z]{1,8}", -1i32..8, any::<[u8; 4]>(), any::<u16>()).prop_map(
        |(name, id, octets, port)| PeerInfo {
            name,
            id,
            address: IpAddr::V4(Ipv4Addr::from(octets)),
            port,
        },
    )
}

fn envelope_strategy() -> impl Strategy<Value = Envelope> {
    prop_oneof![
        peer_strategy().prop_map(Envelope::join),
        (peer_strategy(), prop::collection::vec(peer_strategy(), 0..5))
            .prop_map(|(sender, members)| Envelope::hello(sender, members)),
        (
            peer_strategy(),
            prop::collection::vec(-1i32..100, CAPACITY),
            ".{0,64}"
        )
            .prop_map(|(sender, ts, text)| Envelope::msg(sender, ts, text)),
    ]
}

#[derive(Clone, Debug)]
enum Op {
    Send,
    Receive { sender: usize, row: Vec<i32> },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Send),
        (1usize..CAPACITY, prop::collection::vec(-1i32..50, CAPACITY))
            .prop_map(|(sender, row)| Op::Receive { sender, row }),
    ]
}

// ============================================================================
// Codec
// ============================================================================

proptest! {
    #[test]
    fn codec_roundtrip(env in envelope_strategy()) {
        let bytes = encode(&env).unwrap();
        prop_assert_eq!(decode(&bytes).unwrap(), env);
    }

    #[test]
    fn codec_never_panics_on_garbage(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode(&bytes);
    }
}

// ============================================================================
// Matrix
// ============================================================================

proptest! {
    #[test]
    fn self_cell_counts_sends(ops in prop::collection::vec(op_strategy(), 0..64)) {
        let me = MemberId(0);
        let mut mc = TimestampMatrix::new(CAPACITY);
        mc.init_self(me).unwrap();

        let mut sends = 0;
        for op in ops {
            match op {
                Op::Send => {
                    mc.record_send(me).unwrap();
                    sends += 1;
                }
                Op::Receive { sender, row } => {
                    let sender = MemberId(sender);
                    mc.adopt_remote_row(sender, &row).unwrap();
                    mc.record_direct_receipt(me, sender).unwrap();
                }
            }
        }
        prop_assert_eq!(mc.get(me, me), Some(sends));
    }

    #[test]
    fn stability_is_monotone(
        seq in 0i32..10,
        bumps in prop::collection::vec((0usize..CAPACITY, prop::collection::vec(0i32..4, CAPACITY)), 1..40)
    ) {
        let entry = BufferedMessage {
            sender: MemberId(1),
            sender_name: "p1".to_string(),
            timestamp: vec![0, seq, 0, 0],
            text: "m".to_string(),
        };
        let mut mc = TimestampMatrix::new(CAPACITY);
        let mut was_stable = false;

        for (row, deltas) in bumps {
            let current = mc.rows()[row].clone();
            let next: Vec<i32> = current
                .iter()
                .zip(&deltas)
                .map(|(c, d)| (*c).max(0) + d)
                .collect();
            mc.adopt_remote_row(MemberId(row), &next).unwrap();

            let stable = entry.is_stable(&mc);
            prop_assert!(!(was_stable && !stable));
            was_stable |= stable;
        }
    }
}
