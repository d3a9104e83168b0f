//! Swap buffer tests: lag-one read semantics, snapshot consistency under
//! concurrent publish/read, and block-role separation.

use loong_driver::swap::SwapBuffer;
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering, fence};
use std::thread;
use std::time::Duration;

const FRAME_WORDS: usize = 8;
const FRAME: usize = FRAME_WORDS * 8;

fn frame(seq: u64) -> [u8; FRAME] {
    let mut bytes = [0u8; FRAME];
    for word in bytes.chunks_exact_mut(8) {
        word.copy_from_slice(&seq.to_ne_bytes());
    }
    bytes
}

/// Every word of `bytes` carries the same sequence number.
fn uniform_seq(bytes: &[u8]) -> Option<u64> {
    let mut words = bytes
        .chunks_exact(8)
        .map(|w| u64::from_ne_bytes(w.try_into().unwrap()));
    let first = words.next()?;
    words.all(|w| w == first).then_some(first)
}

#[test]
fn reads_are_one_publish_behind() {
    let swap = SwapBuffer::new(16);
    let mut out = [0u8; 16];

    swap.publish(&[1u8; 16]).expect("publish 1");
    swap.publish(&[2u8; 16]).expect("publish 2");
    swap.read_latest(&mut out).expect("read");
    assert_eq!(out, [1u8; 16]);

    swap.publish(&[3u8; 16]).expect("publish 3");
    swap.read_latest(&mut out).expect("read");
    assert_eq!(out, [2u8; 16]);
}

proptest! {
    /// Single-threaded model: a read returns the second-to-last publish in
    /// full (zeroes before two publishes), never a mix.
    #[test]
    fn read_matches_second_to_last_publish(ops in prop::collection::vec(prop::option::of(any::<u8>()), 1..64)) {
        let swap = SwapBuffer::new(32);
        let mut published: Vec<u8> = Vec::new();

        for op in ops {
            match op {
                Some(value) => {
                    swap.publish(&[value; 32]).unwrap();
                    published.push(value);
                }
                None => {
                    let mut out = [0xEEu8; 32];
                    swap.read_latest(&mut out).unwrap();
                    let expected = if published.len() >= 2 {
                        published[published.len() - 2]
                    } else {
                        0
                    };
                    prop_assert_eq!(out, [expected; 32]);
                }
            }
        }
    }
}

#[test]
fn concurrent_reads_never_see_mixed_frames() {
    const PUBLISHES: u64 = 3_000;
    const READERS: usize = 3;

    let swap = Arc::new(SwapBuffer::new(FRAME));
    let started = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let swap = Arc::clone(&swap);
            let started = Arc::clone(&started);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut out = [0u8; FRAME];
                let mut checked = 0u64;
                let mut last_seq = 0u64;
                while !done.load(Ordering::SeqCst) {
                    let before = started.load(Ordering::SeqCst);

                    let idx = swap.indices();
                    assert_ne!(idx.read, idx.current);
                    assert_ne!(idx.write, idx.current);
                    assert_ne!(idx.read, idx.write);

                    swap.read_latest(&mut out).unwrap();
                    fence(Ordering::SeqCst);
                    let after = started.load(Ordering::SeqCst);

                    // Only quiet reads fall under the cadence assumption.
                    if before == after {
                        let seq = uniform_seq(&out).expect("torn snapshot");
                        assert!(seq >= last_seq, "snapshot went backwards");
                        last_seq = seq;
                        checked += 1;
                    }
                }
                checked
            })
        })
        .collect();

    for seq in 1..=PUBLISHES {
        started.fetch_add(1, Ordering::SeqCst);
        swap.publish(&frame(seq)).unwrap();
        thread::sleep(Duration::from_micros(20));
    }
    done.store(true, Ordering::SeqCst);

    let checked: u64 = readers
        .into_iter()
        .map(|r| r.join().expect("reader panicked"))
        .sum();
    assert!(checked > 0, "no quiet reads were observed");
}

#[test]
fn advance_exposes_in_place_writes() {
    let swap = SwapBuffer::new(4);
    // Nothing written yet: the read block is still zero after rotation.
    swap.advance();
    let mut out = [0xFFu8; 4];
    swap.read_latest(&mut out).unwrap();
    assert_eq!(out, [0u8; 4]);

    swap.publish(&[7u8; 4]).unwrap();
    swap.advance();
    swap.read_latest(&mut out).unwrap();
    assert_eq!(out, [7u8; 4]);
}

#[test]
fn zero_sized_buffer_accepts_empty_copies() {
    let swap = SwapBuffer::new(0);
    swap.publish(&[]).unwrap();
    swap.read_latest(&mut []).unwrap();
    assert!(swap.publish(&[1]).is_err());
}
