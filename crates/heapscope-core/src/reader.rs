//! Stream reader: the producer side of the pipeline.
//!
//! Runs on its own thread, performs blocking reads of newline-terminated text
//! from the transport and enqueues each non-empty line verbatim (trimmed of
//! surrounding whitespace). Nothing is decoded here; record semantics belong
//! to the aggregator.
//!
//! The loop ends on:
//! - end of stream (capture file exhausted, pipe closed by the writer),
//! - a stop request, observed between reads,
//! - the queue's receiver being dropped,
//! - a transport fault, which is returned to whoever joins the thread.
//!
//! A read that is blocked when a stop is requested is not interrupted; the
//! thread exits after the next line arrives or the transport closes. Callers
//! that cannot wait simply drop the handle and let the thread finish on its own.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use log::{debug, error, info};

use crate::error::TransportFault;
use crate::ingest::LineSender;

/// Why the read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// The transport reported end of stream.
    EndOfStream,
    /// A stop was requested through [`ReaderHandle::request_stop`].
    Stopped,
    /// The consumer dropped its end of the queue.
    QueueClosed,
    /// The transport failed; fatal for this session.
    Fault(TransportFault),
}

impl ReaderExit {
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

impl std::fmt::Display for ReaderExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfStream => write!(f, "end of stream"),
            Self::Stopped => write!(f, "stopped"),
            Self::QueueClosed => write!(f, "queue closed"),
            Self::Fault(fault) => write!(f, "{fault}"),
        }
    }
}

/// Owner handle for a running reader thread.
pub struct ReaderHandle {
    stop: Arc<AtomicBool>,
    lines_read: Arc<AtomicU64>,
    thread: Option<JoinHandle<ReaderExit>>,
    exit: Option<ReaderExit>,
}

impl ReaderHandle {
    /// Ask the loop to exit before its next read.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Lines enqueued so far.
    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::Relaxed)
    }

    /// True once the thread has returned (or was already joined).
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Non-blocking: collect the exit reason if the thread has finished.
    ///
    /// Keeps returning the same reason on later calls.
    pub fn poll_exit(&mut self) -> Option<&ReaderExit> {
        if self.exit.is_none() && self.is_finished() {
            if let Some(thread) = self.thread.take() {
                self.exit = Some(join_thread(thread));
            }
        }
        self.exit.as_ref()
    }

    /// Block until the thread returns.
    pub fn join(mut self) -> ReaderExit {
        if let Some(exit) = self.exit.take() {
            return exit;
        }
        match self.thread.take() {
            Some(thread) => join_thread(thread),
            None => ReaderExit::Stopped,
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        // Detach: a thread stuck in a read finishes when the transport closes.
        self.request_stop();
    }
}

fn join_thread(thread: JoinHandle<ReaderExit>) -> ReaderExit {
    thread.join().unwrap_or_else(|_| {
        ReaderExit::Fault(TransportFault {
            kind: io::ErrorKind::Other,
            message: "reader thread panicked".to_string(),
        })
    })
}

/// Spawn the read loop on a dedicated thread.
pub fn spawn<R>(transport: R, sender: LineSender) -> io::Result<ReaderHandle>
where
    R: BufRead + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let lines_read = Arc::new(AtomicU64::new(0));

    let thread = {
        let stop = Arc::clone(&stop);
        let lines_read = Arc::clone(&lines_read);
        thread::Builder::new()
            .name("heapscope-reader".into())
            .spawn(move || {
                info!("stream reader started");
                let exit = read_lines(transport, &sender, &stop, &lines_read);
                info!(
                    "stream reader exited after {} lines: {exit}",
                    lines_read.load(Ordering::Relaxed)
                );
                exit
            })?
    };

    Ok(ReaderHandle {
        stop,
        lines_read,
        thread: Some(thread),
        exit: None,
    })
}

/// The read loop itself. Runs on the calling thread until one of the exit
/// conditions in [`ReaderExit`] is met.
pub fn read_lines<R: BufRead>(
    mut transport: R,
    sender: &LineSender,
    stop: &AtomicBool,
    lines_read: &AtomicU64,
) -> ReaderExit {
    let mut buf = Vec::with_capacity(128);

    loop {
        if stop.load(Ordering::Acquire) {
            return ReaderExit::Stopped;
        }

        // On error, bytes read so far stay in `buf` and are completed by the
        // next successful read.
        match transport.read_until(b'\n', &mut buf) {
            Ok(0) => {
                if !buf.is_empty() {
                    debug!("unterminated record at end of stream");
                    if forward(&buf, sender, lines_read).is_err() {
                        return ReaderExit::QueueClosed;
                    }
                }
                return ReaderExit::EndOfStream;
            }
            Ok(_) => {
                let result = forward(&buf, sender, lines_read);
                buf.clear();
                if result.is_err() {
                    return ReaderExit::QueueClosed;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) => {
                error!("transport read failed: {e}");
                return ReaderExit::Fault(TransportFault::from(e));
            }
        }
    }
}

/// Trim one raw record and enqueue it unless it is blank.
fn forward(
    raw: &[u8],
    sender: &LineSender,
    lines_read: &AtomicU64,
) -> Result<(), crate::ingest::QueueClosed> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if line.is_empty() {
        return Ok(());
    }
    sender.enqueue(line.to_string())?;
    lines_read.fetch_add(1, Ordering::Relaxed);
    Ok(())
}
