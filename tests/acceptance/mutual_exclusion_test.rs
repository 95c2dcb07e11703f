//! Port exclusion acceptance tests.
//!
//! A sync interrupt and attribute reads race on the same port. These tests
//! verify from the port journal that each three-operation write and each
//! six-operation read ran without interleaving, and that every read
//! observed the most recent complete write.
//!
//! # Acceptance Criteria
//!
//! - The journal splits cleanly into write and read transactions
//! - Each read returns exactly the fields of the preceding write
//! - No read ever observes a partially written time

use super::common::{split_transactions, Rig, Transaction, EPOCH};
use clock_common::time::WallClockSample;
use crossbeam_utils::thread;
use std::sync::atomic::{AtomicBool, Ordering};

const WRITES: usize = 2_000;
const READERS: usize = 3;

#[test]
fn test_sync_and_query_never_interleave() {
    let rig = &Rig::new(EPOCH);
    let irq = rig.driver.device().irq;
    let done = &AtomicBool::new(false);

    let readings = thread::scope(|s| {
        s.spawn(move |_| {
            for _ in 0..WRITES {
                // 37 s steps keep minutes and seconds crossing 32
                rig.clock.advance(37);
                assert_eq!(rig.bus.raise_irq(irq), clock_driver::IrqReturn::Handled);
            }
            done.store(true, Ordering::Release);
        });

        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                s.spawn(move |_| {
                    let mut seen = Vec::new();
                    while !done.load(Ordering::Acquire) {
                        seen.push(rig.query());
                    }
                    seen
                })
            })
            .collect();

        readers
            .into_iter()
            .flat_map(|h| h.join().expect("reader panicked"))
            .collect::<Vec<_>>()
    })
    .expect("scope panicked");

    let ops = rig.journal.snapshot();
    let transactions = split_transactions(&ops).expect("interleaved port access");

    let writes = transactions
        .iter()
        .filter(|t| matches!(t, Transaction::Write(_)))
        .count();
    assert_eq!(writes, WRITES);
    assert_eq!(transactions.len() - writes, readings.len());

    let mut last_written = [0u8; 3];
    for transaction in &transactions {
        match *transaction {
            Transaction::Write(values) => last_written = values,
            Transaction::Read(values) => assert_eq!(values, last_written, "torn read"),
        }
    }

    for reading in &readings {
        assert!(
            WallClockSample::new(reading[0], reading[1], reading[2]).is_some(),
            "reading out of range: {reading:?}"
        );
    }
    assert_eq!(rig.driver.sync_handler().syncs(), WRITES as u64);
}

#[test]
fn test_concurrent_signals_serialize() {
    let rig = &Rig::new(EPOCH);
    let irq = rig.driver.device().irq;

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(move |_| {
                for _ in 0..250 {
                    rig.bus.raise_irq(irq);
                }
            });
        }
    })
    .expect("scope panicked");

    let transactions = split_transactions(&rig.journal.snapshot()).expect("interleaved writes");
    assert_eq!(transactions.len(), 1_000);
    assert!(transactions
        .iter()
        .all(|t| *t == Transaction::Write([14, 5, 9])));
    assert_eq!(rig.query(), [14, 5, 9]);
}
