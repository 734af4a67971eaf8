//! Ingestion queue between the stream reader and the aggregator.
//!
//! An unbounded FIFO: [`LineSender::enqueue`] never blocks and
//! [`LineReceiver::drain_all`] never blocks. Senders are cloneable, so any
//! number of producers may feed one consumer. All synchronization lives
//! inside the channel; callers never see a lock.
//!
//! There is no backpressure. If producers outpace the consumer the queue grows
//! until memory runs out; [`LineReceiver::pending`] exposes the depth so a
//! long-running session can show it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use thiserror::Error;

/// The consumer side was dropped; no further lines will ever be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ingestion queue closed")]
pub struct QueueClosed(pub String);

/// Create a connected sender/receiver pair.
pub fn queue() -> (LineSender, LineReceiver) {
    let (tx, rx) = mpsc::channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        LineSender {
            tx,
            depth: Arc::clone(&depth),
        },
        LineReceiver { rx, depth },
    )
}

/// Producer handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LineSender {
    tx: Sender<String>,
    depth: Arc<AtomicUsize>,
}

impl LineSender {
    /// Append one raw line. Never blocks.
    ///
    /// Fails only when the receiver has been dropped, handing the line back.
    pub fn enqueue(&self, line: String) -> Result<(), QueueClosed> {
        self.depth.fetch_add(1, Ordering::Relaxed);
        self.tx.send(line).map_err(|mpsc::SendError(line)| {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            QueueClosed(line)
        })
    }
}

/// Consumer handle. Exactly one exists per queue.
#[derive(Debug)]
pub struct LineReceiver {
    rx: Receiver<String>,
    depth: Arc<AtomicUsize>,
}

impl LineReceiver {
    /// Remove and return everything currently queued, in enqueue order.
    ///
    /// Returns an empty vector when nothing is pending. Never blocks.
    pub fn drain_all(&self) -> Vec<String> {
        // Disconnected means the reader is gone; anything it sent is still
        // delivered before try_recv reports it.
        let lines: Vec<String> = self.rx.try_iter().collect();
        self.depth.fetch_sub(lines.len(), Ordering::Relaxed);
        lines
    }

    /// Approximate number of lines waiting to be drained.
    pub fn pending(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn drain_returns_everything_in_order() {
        let (tx, rx) = queue();
        for i in 0..100 {
            tx.enqueue(format!("line {i}")).unwrap();
        }
        let lines = rx.drain_all();
        assert_eq!(lines.len(), 100);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(line, &format!("line {i}"));
        }
    }

    #[test]
    fn second_drain_is_empty() {
        let (tx, rx) = queue();
        tx.enqueue("a".into()).unwrap();
        tx.enqueue("b".into()).unwrap();
        assert_eq!(rx.drain_all().len(), 2);
        assert!(rx.drain_all().is_empty());
    }

    #[test]
    fn drain_on_fresh_queue_is_empty() {
        let (_tx, rx) = queue();
        assert!(rx.drain_all().is_empty());
        assert_eq!(rx.pending(), 0);
    }

    #[test]
    fn pending_tracks_depth() {
        let (tx, rx) = queue();
        tx.enqueue("a".into()).unwrap();
        tx.enqueue("b".into()).unwrap();
        tx.enqueue("c".into()).unwrap();
        assert_eq!(rx.pending(), 3);
        rx.drain_all();
        assert_eq!(rx.pending(), 0);
    }

    #[test]
    fn enqueue_after_receiver_dropped_fails_with_line() {
        let (tx, rx) = queue();
        drop(rx);
        let err = tx.enqueue("orphan".into()).unwrap_err();
        assert_eq!(err.0, "orphan");
    }

    #[test]
    fn lines_survive_sender_drop() {
        let (tx, rx) = queue();
        tx.enqueue("last words".into()).unwrap();
        drop(tx);
        assert_eq!(rx.drain_all(), vec!["last words".to_string()]);
    }

    #[test]
    fn multiple_producers_preserve_per_producer_order() {
        let (tx, rx) = queue();
        let handles: Vec<_> = (0..4)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        tx.enqueue(format!("{p}:{i}")).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let lines = rx.drain_all();
        assert_eq!(lines.len(), 1000);
        for p in 0..4 {
            let seq: Vec<usize> = lines
                .iter()
                .filter_map(|l| l.strip_prefix(&format!("{p}:")))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..250).collect::<Vec<_>>());
        }
    }
}
