//! Mailbox channel tests against the loopback transport.

use loong_common::descriptor::{BitLength, TransportDescriptor};
use loong_common::driver_config::MailboxConfig;
use loong_driver::channel::{MailboxChannel, MailboxError};
use loong_driver::loopback::LoopbackTransport;
use loong_driver::mailbox::{
    MailboxFailure, MailboxHandle, MailboxOperation, MailboxState, MailboxTransaction,
};
use loong_driver::transport::TransportError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const TEMPERATURE: TransportDescriptor = TransportDescriptor {
    index: 0x2026,
    subindex: 0,
    bit_length: BitLength::Bits16,
    signed: true,
};

fn channel(pool_size: usize, timeout_cycles: u32) -> Arc<MailboxChannel> {
    MailboxChannel::new(MailboxConfig {
        pool_size,
        max_starts_per_cycle: 4,
        timeout_cycles,
    })
    .expect("valid mailbox config")
}

fn read(handle: u32, alias: u16) -> MailboxTransaction {
    MailboxTransaction::template(MailboxHandle(handle), alias).with_descriptor(
        TEMPERATURE,
        MailboxOperation::Read,
        0,
    )
}

#[test]
fn read_walks_through_every_state() {
    let channel = channel(4, 100);
    let mut servicer = channel.servicer().expect("servicer");
    let mut transport = LoopbackTransport::new(1, 1);
    // -10 as a 16-bit two's complement object.
    transport
        .insert_object(MailboxHandle(0), 0x2026, 0, 0xFFF6)
        .expect("insert");

    channel.submit(read(0, 7)).expect("submit");
    let state_after_service = |servicer: &mut loong_driver::MailboxServicer,
                               transport: &mut LoopbackTransport| {
        servicer.service(transport);
        servicer.in_flight().next().map(|t| t.state)
    };

    assert_eq!(
        state_after_service(&mut servicer, &mut transport),
        Some(MailboxState::AwaitingSend)
    );
    assert!(channel.poll_response().is_none());
    assert_eq!(
        state_after_service(&mut servicer, &mut transport),
        Some(MailboxState::AwaitingAck)
    );
    assert!(channel.poll_response().is_none());
    assert_eq!(state_after_service(&mut servicer, &mut transport), None);

    let response = channel.poll_response().expect("response after ack");
    assert_eq!(response.state, MailboxState::Completed);
    assert_eq!(response.alias, 7);
    assert_eq!(response.index, 0x2026);
    assert_eq!(response.subindex, 0);
    assert_eq!(response.value, -10);
    assert!(response.failure.is_none());
    assert!(response.recycled);

    let stats = channel.stats();
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.started, 1);
    assert_eq!(stats.completed, 1);
}

#[test]
fn unresponsive_device_times_out_and_slot_is_recycled() {
    const TIMEOUT: u32 = 5;
    let channel = channel(2, TIMEOUT);
    let mut servicer = channel.servicer().expect("servicer");
    let mut transport = LoopbackTransport::new(1, 0);
    transport
        .insert_object(MailboxHandle(0), 0x2026, 0, 30)
        .expect("insert");
    transport
        .set_responsive(MailboxHandle(0), false)
        .expect("known handle");

    channel.submit(read(0, 3)).expect("submit");
    assert_eq!(channel.available(), 1);

    // Started on the first cycle, then aged once per cycle.
    for _ in 0..TIMEOUT {
        servicer.service(&mut transport);
        assert!(channel.poll_response().is_none());
    }
    let report = servicer.service(&mut transport);
    assert_eq!(report.finished, 1);
    assert_eq!(report.in_flight, 0);

    let response = channel.poll_response().expect("timed-out response");
    assert_eq!(response.state, MailboxState::Error);
    assert_eq!(response.failure, Some(MailboxFailure::Timeout));
    assert_eq!(channel.available(), 2);
    assert_eq!(channel.stats().timed_out, 1);
}

#[test]
fn timed_out_device_answers_resubmitted_request() {
    const TIMEOUT: u32 = 5;
    let channel = channel(2, TIMEOUT);
    let mut servicer = channel.servicer().expect("servicer");
    let mut transport = LoopbackTransport::new(1, 0);
    transport
        .insert_object(MailboxHandle(0), 0x2026, 0, 30)
        .expect("insert");
    transport
        .set_responsive(MailboxHandle(0), false)
        .expect("known handle");

    channel.submit(read(0, 3)).expect("submit");
    for _ in 0..=TIMEOUT {
        servicer.service(&mut transport);
    }
    let response = channel.poll_response().expect("timed-out response");
    assert_eq!(response.failure, Some(MailboxFailure::Timeout));

    // The device recovers; its mailbox must not still hold the abandoned request.
    transport
        .set_responsive(MailboxHandle(0), true)
        .expect("known handle");
    channel.submit(read(0, 3)).expect("resubmit");

    let mut retried = None;
    for _ in 0..TIMEOUT {
        servicer.service(&mut transport);
        if let Some(response) = channel.poll_response() {
            retried = Some(response);
            break;
        }
    }
    let retried = retried.expect("retry answered before its own timeout");
    assert_eq!(retried.state, MailboxState::Completed);
    assert_eq!(retried.value, 30);

    let stats = channel.stats();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.completed, 1);
}

#[test]
fn slow_device_is_not_left_busy_by_a_timeout() {
    const LATENCY: u32 = 8;
    let mut transport = LoopbackTransport::new(1, LATENCY);
    transport
        .insert_object(MailboxHandle(0), 0x2026, 0, 33)
        .expect("insert");

    let impatient = channel(2, 5);
    let mut servicer = impatient.servicer().expect("servicer");
    impatient.submit(read(0, 3)).expect("submit");
    for _ in 0..6 {
        servicer.service(&mut transport);
    }
    let response = impatient.poll_response().expect("timed-out response");
    assert_eq!(response.failure, Some(MailboxFailure::Timeout));

    let patient = channel(2, 4 * LATENCY);
    let mut servicer = patient.servicer().expect("servicer");
    patient.submit(read(0, 3)).expect("submit");
    let mut answered = None;
    for _ in 0..4 * LATENCY {
        servicer.service(&mut transport);
        if let Some(response) = patient.poll_response() {
            answered = Some(response);
            break;
        }
    }
    let answered = answered.expect("answered within the longer timeout");
    assert_eq!(answered.state, MailboxState::Completed);
    assert_eq!(answered.value, 33);
}

#[test]
fn write_updates_device_object() {
    let channel = channel(4, 100);
    let mut servicer = channel.servicer().expect("servicer");
    let mut transport = LoopbackTransport::new(2, 0);
    transport
        .insert_object(MailboxHandle(1), 0x6060, 0, 0)
        .expect("insert");

    let mode = TransportDescriptor {
        index: 0x6060,
        subindex: 0,
        bit_length: BitLength::Bits8,
        signed: true,
    };
    let request = MailboxTransaction::template(MailboxHandle(1), 2).with_descriptor(
        mode,
        MailboxOperation::Write,
        -3,
    );
    channel.submit(request).expect("submit");

    for _ in 0..3 {
        servicer.service(&mut transport);
    }
    let response = channel.poll_response().expect("write acknowledged");
    assert_eq!(response.state, MailboxState::Completed);
    assert_eq!(response.value, -3);
    assert_eq!(transport.object(MailboxHandle(1), 0x6060, 0), Some(0xFD));
}

#[test]
fn missing_object_surfaces_abort_code() {
    let channel = channel(4, 100);
    let mut servicer = channel.servicer().expect("servicer");
    let mut transport = LoopbackTransport::new(1, 0);

    channel.submit(read(0, 1)).expect("submit");
    for _ in 0..3 {
        servicer.service(&mut transport);
    }
    let response = channel.poll_response().expect("aborted response");
    assert_eq!(response.state, MailboxState::Error);
    assert_eq!(
        response.failure,
        Some(MailboxFailure::Transport(TransportError::Aborted(
            TransportError::ABORT_NO_OBJECT
        )))
    );
}

#[test]
fn pool_is_bounded_until_responses_are_drained() {
    let channel = channel(2, 100);
    channel.submit(read(0, 1)).expect("first");
    channel.submit(read(0, 1)).expect("second");
    assert_eq!(channel.submit(read(0, 1)), Err(MailboxError::PoolExhausted));
}

#[test]
fn application_and_cycle_threads_exchange_transactions() {
    const DEVICES: u32 = 4;
    const REQUESTS: usize = 200;

    let channel = channel(8, 1_000);
    let mut servicer = channel.servicer().expect("servicer");
    let stop = Arc::new(AtomicBool::new(false));

    let cycle = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut transport = LoopbackTransport::new(DEVICES as usize, 1);
            for handle in 0..DEVICES {
                transport
                    .insert_object(MailboxHandle(handle), 0x2026, 0, 40 + handle)
                    .expect("insert");
            }
            while !stop.load(Ordering::SeqCst) {
                servicer.service(&mut transport);
                thread::sleep(Duration::from_micros(50));
            }
        })
    };

    let deadline = Instant::now() + Duration::from_secs(20);
    let mut sent = 0usize;
    let mut received = 0usize;
    while received < REQUESTS {
        assert!(Instant::now() < deadline, "responses stalled");
        if sent < REQUESTS {
            let handle = (sent as u32) % DEVICES;
            match channel.submit(read(handle, handle as u16 + 10)) {
                Ok(()) => sent += 1,
                Err(MailboxError::PoolExhausted) => {}
                Err(e) => panic!("unexpected submit error: {e}"),
            }
        }
        while let Some(response) = channel.poll_response() {
            assert_eq!(response.state, MailboxState::Completed);
            let handle = response.handle.0;
            assert_eq!(response.alias, handle as u16 + 10);
            assert_eq!(response.value, 40 + i64::from(handle));
            received += 1;
        }
        thread::yield_now();
    }

    stop.store(true, Ordering::SeqCst);
    cycle.join().expect("cycle thread panicked");
    assert_eq!(channel.available(), 8);
    assert_eq!(channel.stats().completed, REQUESTS as u64);
}
