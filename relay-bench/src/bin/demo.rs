//! Walks a handful of messages through each queue design.
//!
//! The producer pauses `RELAY_DEMO_INTERVAL_MS` between messages (default
//! 100). The double buffer publishes every third message and once at the end.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_utils::Backoff;
use relay_bench::config::demo_interval_from_env;
use relay_queue::{Dequeue, DoubleBufferQueue, Enqueue, Full, LockingBoundedQueue, RingBufferQueue};

const MESSAGES: u32 = 10;
const PUBLISH_EVERY: u32 = 3;

#[derive(Debug)]
struct Message {
    id: u32,
    content: String,
}

impl Message {
    fn new(id: u32, from: &str) -> Self {
        Self {
            id,
            content: format!("hello from {from} producer {id}"),
        }
    }
}

fn main() -> ExitCode {
    relay_bench::init_tracing();

    let interval = match demo_interval_from_env() {
        Ok(interval) => interval,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    println!("=== Ring buffer ===");
    let (tx, rx) = RingBufferQueue::<Message, 16>::new();
    run(tx, rx, "ring", interval);

    println!("\n=== Locked queue ===");
    let queue = LockingBoundedQueue::new(16);
    run(&queue, &queue, "locked", interval);

    println!("\n=== Double buffer ===");
    let (tx, rx) = DoubleBufferQueue::new(16);
    run_double_buffer(tx, rx, interval);

    println!("\ndone");
    ExitCode::SUCCESS
}

fn run<P, C>(mut tx: P, rx: C, from: &str, interval: Duration)
where
    P: Enqueue<Message> + Send,
    C: Dequeue<Message> + Send,
{
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| receive(rx, &done));

        let backoff = Backoff::new();
        for id in 0..MESSAGES {
            let mut msg = Message::new(id, from);
            backoff.reset();
            while let Err(Full(back)) = tx.enqueue(msg) {
                msg = back;
                backoff.snooze();
            }
            println!("producer: sent {id}");
            thread::sleep(interval);
        }
        done.store(true, Ordering::Release);
    });
}

fn run_double_buffer(
    mut tx: relay_queue::double_buffer::Producer<Message>,
    rx: relay_queue::double_buffer::Consumer<Message>,
    interval: Duration,
) {
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| receive(rx, &done));

        let backoff = Backoff::new();
        for id in 0..MESSAGES {
            let mut msg = Message::new(id, "double buffer");
            backoff.reset();
            while let Err(Full(back)) = tx.enqueue(msg) {
                msg = back;
                if tx.swap_buffers().is_err() {
                    backoff.snooze();
                }
            }
            println!("producer: sent {id}");

            if id % PUBLISH_EVERY == PUBLISH_EVERY - 1 {
                publish(&mut tx, &backoff);
                println!("producer: swapped buffers");
            }
            thread::sleep(interval);
        }

        publish(&mut tx, &backoff);
        done.store(true, Ordering::Release);
    });
}

/// Swaps once the consumer has drained the previous batch.
fn publish(tx: &mut relay_queue::double_buffer::Producer<Message>, backoff: &Backoff) {
    backoff.reset();
    while let Err(e) = tx.swap_buffers() {
        tracing::debug!(error = %e, "waiting for consumer");
        backoff.snooze();
    }
}

fn receive<C: Dequeue<Message>>(mut rx: C, done: &AtomicBool) {
    let backoff = Backoff::new();
    let mut received = 0;

    while !done.load(Ordering::Acquire) || rx.has_data() {
        if let Some(msg) = rx.dequeue() {
            println!("consumer: received {} - {}", msg.id, msg.content);
            received += 1;
            backoff.reset();
        } else {
            backoff.snooze();
        }
    }

    println!("consumer: {received} messages in total");
}
