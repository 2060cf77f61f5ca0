/*!
 * Ring Protocol Tests
 * Send/read semantics over the in-process backend
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sibling_ipc::core::sync::LocalSemaphore;
use sibling_ipc::ipc::layout::{slot_offset, STATUS_OFFSET};
use sibling_ipc::ipc::platform::HeapRegion;
use sibling_ipc::ipc::ring::Ring;
use sibling_ipc::{ChecksumPolicy, IpcError, CAPACITY, MAX_MESSAGE_LEN};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn strict_ring() -> Ring<HeapRegion, LocalSemaphore> {
    Ring::in_process(ChecksumPolicy::Strict)
}

#[test]
fn test_fifo_order() {
    let ring = strict_ring();
    for i in 0..10u32 {
        ring.send(i, i * 2, format!("msg-{}", i).as_bytes(), None).unwrap();
    }
    for i in 0..10u32 {
        let message = ring.read(None).unwrap();
        assert_eq!(message.command, i);
        assert_eq!(message.flags, i * 2);
        assert_eq!(message.payload, format!("msg-{}", i).into_bytes());
        assert_eq!(message.sequence, i as u64);
    }
}

#[test]
fn test_backpressure_blocks_until_read() {
    let ring = Arc::new(strict_ring());
    for i in 0..CAPACITY {
        ring.send(1, 0, &[b'a' + (i % 26) as u8], None).unwrap();
    }

    let (tx, rx) = mpsc::channel();
    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            let sequence = ring.send(2, 0, b"overflow", None).unwrap();
            tx.send(sequence).unwrap();
        })
    };

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    let first = ring.read(None).unwrap();
    assert_eq!(first.sequence, 0);
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        CAPACITY as u64
    );
    producer.join().unwrap();
}

#[test]
fn test_empty_read_times_out_without_side_effects() {
    let ring = strict_ring();
    let err = ring.read(Some(Duration::from_millis(10))).unwrap_err();
    assert!(matches!(err, IpcError::Timeout { .. }));
    assert_eq!(ring.status().unwrap().counter, 0);
    assert_eq!(ring.credits().unwrap().write, CAPACITY as u32);
}

#[test]
fn test_truncation_and_nul_padding() {
    let ring = strict_ring();
    let exact = vec![b'z'; MAX_MESSAGE_LEN];
    let long = vec![b'q'; MAX_MESSAGE_LEN + 1];
    ring.send(0, 0, &exact, None).unwrap();
    ring.send(0, 0, &long, None).unwrap();
    ring.send(0, 0, b"", None).unwrap();

    assert_eq!(ring.read(None).unwrap().payload, exact);
    assert_eq!(ring.read(None).unwrap().payload, long[..MAX_MESSAGE_LEN].to_vec());
    assert!(ring.read(None).unwrap().payload.is_empty());
}

#[test]
fn test_corrupt_status_fails_both_directions() {
    let ring = strict_ring();
    ring.send(1, 0, b"before", None).unwrap();
    ring.region().corrupt(STATUS_OFFSET + 9, 0x80);

    assert_eq!(ring.read(None).unwrap_err(), IpcError::CorruptedStatus);
    assert_eq!(ring.send(1, 0, b"after", None).unwrap_err(), IpcError::CorruptedStatus);
    assert_eq!(ring.credits().unwrap().total(), CAPACITY as u32);
}

#[test]
fn test_corrupt_message_is_skipped_under_strict_policy() {
    let ring = strict_ring();
    ring.send(1, 0, b"first", None).unwrap();
    ring.send(2, 0, b"second", None).unwrap();
    ring.region().corrupt(slot_offset(0) + 12, 0x01);

    assert_eq!(
        ring.read(None).unwrap_err(),
        IpcError::CorruptedMessage { sequence: 0 }
    );
    let next = ring.read(None).unwrap();
    assert_eq!(next.command, 2);
    assert_eq!(next.payload, b"second".to_vec());
}

#[test]
fn test_lenient_policy_rejects_future_sequence() {
    let ring = Ring::in_process(ChecksumPolicy::LegacyLenient);
    ring.send(1, 0, b"x", None).unwrap();
    // Flip a bit in the high byte of the stored sequence
    let sequence_offset = slot_offset(0) + 8 + MAX_MESSAGE_LEN;
    ring.region().corrupt(sequence_offset + 7, 0x40);

    assert!(matches!(
        ring.read(None).unwrap_err(),
        IpcError::CorruptedMessage { .. }
    ));
}

#[test]
fn test_multiple_producers_deliver_everything() {
    let ring = Arc::new(strict_ring());
    let producers: Vec<_> = (0..4u32)
        .map(|p| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for i in 0..100u32 {
                    ring.send(p, i, b"work", None).unwrap();
                }
            })
        })
        .collect();

    let mut last_per_producer = [None::<u32>; 4];
    let mut sequences = Vec::new();
    for _ in 0..400 {
        let message = ring.read(None).unwrap();
        let slot = &mut last_per_producer[message.command as usize];
        if let Some(previous) = *slot {
            assert!(message.flags > previous);
        }
        *slot = Some(message.flags);
        sequences.push(message.sequence);
    }
    for producer in producers {
        producer.join().unwrap();
    }

    assert_eq!(sequences, (0..400u64).collect::<Vec<_>>());
    assert_eq!(ring.credits().unwrap().write, CAPACITY as u32);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_credits_conserved(ops in prop::collection::vec(any::<bool>(), 1..400)) {
        let ring = strict_ring();
        let mut pending = 0usize;
        for send in ops {
            if send && pending < CAPACITY {
                ring.send(0, 0, b"p", None).unwrap();
                pending += 1;
            } else if !send && pending > 0 {
                ring.read(None).unwrap();
                pending -= 1;
            }
            let credits = ring.credits().unwrap();
            prop_assert_eq!(credits.total(), CAPACITY as u32);
            prop_assert_eq!(credits.read as usize, pending);
        }
    }

    #[test]
    fn prop_nul_free_payload_round_trips(
        payload in prop::collection::vec(1u8..=255, 0..=MAX_MESSAGE_LEN),
        command: u32,
        flags: u32,
    ) {
        let ring = strict_ring();
        ring.send(command, flags, &payload, None).unwrap();
        let message = ring.read(None).unwrap();
        prop_assert_eq!(message.command, command);
        prop_assert_eq!(message.flags, flags);
        prop_assert_eq!(message.payload, payload);
    }
}
