use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::shared::constants::READINESS_CAPACITY;
use crate::shared::frame::Frame;

struct Held {
    frame: Option<Arc<Frame>>,
    next_sequence: u64,
}

/// Single-slot holder of the latest ingested frame plus a counting
/// readiness signal.
///
/// Writers replace the frame wholesale under the lock (latest wins, older
/// frames are dropped). Readers take an `Arc` under the same lock and do any
/// copying outside it, so detection never blocks ingestion.
///
/// The readiness count lives in a bounded channel of unit events: `put`
/// adds one, a successful `wait_ready` removes one, and a timed-out wait
/// removes nothing.
pub struct FrameSlot {
    held: Mutex<Held>,
    ready_tx: Sender<()>,
    ready_rx: Receiver<()>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::with_capacity(READINESS_CAPACITY)
    }

    /// `capacity` bounds how many unconsumed readiness events can build up.
    pub fn with_capacity(capacity: usize) -> Self {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(capacity.max(1));
        Self {
            held: Mutex::new(Held {
                frame: None,
                next_sequence: 1,
            }),
            ready_tx,
            ready_rx,
        }
    }

    /// Replaces the held frame and signals readiness once.
    ///
    /// Returns the sequence number stamped on the stored frame.
    pub fn put(&self, mut frame: Frame) -> u64 {
        let sequence = {
            let mut held = self.lock();
            let sequence = held.next_sequence;
            held.next_sequence += 1;
            frame.set_sequence(sequence);
            held.frame = Some(Arc::new(frame));
            sequence
        };

        // Saturated: the waiter already has wake-ups queued and will read
        // this frame on its next cycle. Disconnection is impossible since the
        // slot owns both ends.
        if let Err(TrySendError::Full(())) = self.ready_tx.try_send(()) {
            log::debug!("Readiness signal saturated; frame {sequence} replaces an unread frame");
        }
        sequence
    }

    /// The latest frame, or `None` if nothing has been put yet.
    pub fn try_take_snapshot(&self) -> Option<Arc<Frame>> {
        self.lock().frame.clone()
    }

    /// Blocks until a readiness event is available or `timeout` elapses.
    ///
    /// Returns `true` and consumes one event when signalled.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        self.ready_rx.recv_timeout(timeout).is_ok()
    }

    /// Unconsumed readiness events.
    pub fn pending_signals(&self) -> usize {
        self.ready_rx.len()
    }

    fn lock(&self) -> MutexGuard<'_, Held> {
        // The held state is only ever replaced wholesale, so it is consistent
        // even if a holder panicked.
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Instant;

    const SHORT: Duration = Duration::from_millis(20);

    fn frame(value: u8) -> Frame {
        Frame::filled(8, 8, [value, value, value])
    }

    #[test]
    fn test_empty_slot_has_no_snapshot_and_no_signal() {
        let slot = FrameSlot::new();
        assert!(slot.try_take_snapshot().is_none());
        assert_eq!(slot.pending_signals(), 0);
    }

    #[test]
    fn test_put_then_snapshot_returns_frame() {
        let slot = FrameSlot::new();
        let seq = slot.put(frame(7));
        let snap = slot.try_take_snapshot().unwrap();
        assert_eq!(snap.data()[0], 7);
        assert_eq!(snap.sequence(), seq);
    }

    #[test]
    fn test_last_write_wins() {
        let slot = FrameSlot::new();
        for v in 1..=5 {
            slot.put(frame(v));
        }
        let snap = slot.try_take_snapshot().unwrap();
        assert_eq!(snap.data()[0], 5);
        assert_eq!(snap.sequence(), 5);
    }

    #[test]
    fn test_sequences_increase_monotonically() {
        let slot = FrameSlot::new();
        let a = slot.put(frame(1));
        let b = slot.put(frame(2));
        let c = slot.put(frame(3));
        assert!(a < b && b < c);
    }

    #[test]
    fn test_snapshot_does_not_consume_frame() {
        let slot = FrameSlot::new();
        slot.put(frame(3));
        assert!(slot.try_take_snapshot().is_some());
        assert!(slot.try_take_snapshot().is_some());
    }

    #[test]
    fn test_each_put_signals_once() {
        let slot = FrameSlot::new();
        slot.put(frame(1));
        slot.put(frame(2));
        slot.put(frame(3));
        assert_eq!(slot.pending_signals(), 3);
    }

    #[test]
    fn test_successful_wait_consumes_one_signal() {
        let slot = FrameSlot::new();
        slot.put(frame(1));
        slot.put(frame(2));
        assert!(slot.wait_ready(SHORT));
        assert_eq!(slot.pending_signals(), 1);
    }

    #[test]
    fn test_timed_out_wait_consumes_nothing() {
        let slot = FrameSlot::new();
        let start = Instant::now();
        assert!(!slot.wait_ready(SHORT));
        assert!(start.elapsed() >= SHORT);
        assert_eq!(slot.pending_signals(), 0);

        slot.put(frame(1));
        assert!(slot.wait_ready(SHORT));
        assert!(!slot.wait_ready(SHORT));
        assert_eq!(slot.pending_signals(), 0);
    }

    #[test]
    fn test_signal_count_is_bounded() {
        let slot = FrameSlot::with_capacity(2);
        for v in 0..10 {
            slot.put(frame(v));
        }
        assert_eq!(slot.pending_signals(), 2);
        assert_eq!(slot.try_take_snapshot().unwrap().data()[0], 9);
    }

    #[test]
    fn test_waiter_wakes_on_put_from_other_thread() {
        let slot = Arc::new(FrameSlot::new());
        let waiter = {
            let slot = slot.clone();
            thread::spawn(move || slot.wait_ready(Duration::from_secs(10)))
        };
        thread::sleep(SHORT);
        slot.put(frame(1));
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_puts() {
        let slot = FrameSlot::new();
        slot.put(frame(1));
        let held = slot.try_take_snapshot().unwrap();
        slot.put(frame(2));
        assert_eq!(held.data()[0], 1);
        assert_eq!(slot.try_take_snapshot().unwrap().data()[0], 2);
    }

    #[test]
    fn test_racing_puts_leave_exactly_one_frame() {
        for _ in 0..50 {
            let slot = Arc::new(FrameSlot::new());
            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = [10u8, 20u8]
                .into_iter()
                .map(|v| {
                    let slot = slot.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        slot.put(frame(v));
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            let snap = slot.try_take_snapshot().unwrap();
            let first = snap.data()[0];
            assert!(first == 10 || first == 20);
            assert!(snap.data().iter().all(|&b| b == first));
            assert_eq!(slot.pending_signals(), 2);
        }
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_frames() {
        let slot = Arc::new(FrameSlot::with_capacity(4));
        let writers: Vec<_> = (0..3u8)
            .map(|w| {
                let slot = slot.clone();
                thread::spawn(move || {
                    for i in 0..200u8 {
                        slot.put(Frame::filled(32, 32, [w * 80 + i % 50; 3]));
                    }
                })
            })
            .collect();
        let reader = {
            let slot = slot.clone();
            thread::spawn(move || {
                let mut seen = 0;
                for _ in 0..500 {
                    if let Some(snap) = slot.try_take_snapshot() {
                        let first = snap.data()[0];
                        assert!(snap.data().iter().all(|&b| b == first));
                        seen += 1;
                    }
                }
                seen
            })
        };
        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();
        assert!(slot.try_take_snapshot().is_some());
        assert!(slot.pending_signals() <= 4);
    }
}
