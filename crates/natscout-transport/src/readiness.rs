//! Multi-socket readiness wait.
//!
//! Blocks until one of several UDP sockets has a datagram queued, or the
//! timeout expires. Each socket is watched by a scoped thread that peeks
//! (without consuming) in short slices and reports back over a channel; the
//! caller gets the first ready index and the watchers are stopped and joined
//! before returning.

use crossbeam_channel::{Sender, bounded};
use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on a single watcher peek, so stopped watchers exit promptly
const WATCH_SLICE: Duration = Duration::from_millis(20);

/// Large enough for any STUN datagram (Windows rejects truncating peeks)
const PEEK_BUFFER_SIZE: usize = 2048;

/// Wait until any socket in `sockets` is readable
///
/// Returns the index of the first readable socket, or `None` when nothing
/// arrived within `timeout`. The sockets' read timeouts are modified; callers
/// must set their own timeout before reading.
///
/// # Errors
///
/// Currently infallible at the aggregate level: per-socket errors are treated
/// as readiness so that the caller's read observes them.
pub fn wait_readable(sockets: &[&UdpSocket], timeout: Duration) -> io::Result<Option<usize>> {
    if sockets.is_empty() {
        return Ok(None);
    }

    let deadline = Instant::now() + timeout;
    let (tx, rx) = bounded(sockets.len());
    let stop = AtomicBool::new(false);

    let ready = thread::scope(|scope| {
        for (index, socket) in sockets.iter().enumerate() {
            let tx = tx.clone();
            let stop = &stop;
            scope.spawn(move || watch(index, socket, deadline, stop, &tx));
        }
        drop(tx);

        let first = rx.recv_deadline(deadline).ok();
        stop.store(true, Ordering::Relaxed);
        first
    });

    Ok(ready)
}

fn watch(index: usize, socket: &UdpSocket, deadline: Instant, stop: &AtomicBool, tx: &Sender<usize>) {
    let mut buf = [0u8; PEEK_BUFFER_SIZE];

    while !stop.load(Ordering::Relaxed) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        if crate::udp::set_read_timeout(socket, Some(remaining.min(WATCH_SLICE))).is_err() {
            return;
        }

        match socket.peek_from(&mut buf) {
            Ok(_) => {
                let _ = tx.try_send(index);
                return;
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => {
                tracing::trace!("Socket {} reported {} while waiting", index, e);
                let _ = tx.try_send(index);
                return;
            }
        }
    }
}
