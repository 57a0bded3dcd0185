//! The capture stream ring (§4.2 "Attachment streaming"): a single-writer,
//! multi-reader byte buffer. The writer is the microphone capture path;
//! readers are attachment streams AIP opens against the Recognize event
//! (and, conceivably, any other consumer of the raw capture).
//!
//! This is the lock-free SDS the spec's §5 "Shared-resource policy"
//! describes in spirit; we implement the same single-writer/multi-reader
//! contract behind a `parking_lot::Mutex` rather than hand-rolling a
//! lock-free structure — the buffer is small and short-lived per
//! utterance, so the mutex is never a contention point in practice.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::Notify;

use va_infra::events::AttachmentSource;

use crate::observer::AipStateObserver;

/// Notified when a reader overruns (the writer has advanced further than
/// the buffer can retain since the reader last caught up).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderNotification {
    Overrun,
    Closed,
}

struct RingInner {
    buffer: BytesMut,
    capacity: usize,
    /// Total bytes ever written (monotonic), used as the cursor readers
    /// compare themselves against.
    write_index: u64,
    closed: bool,
}

/// Shared backing store for one capture utterance.
pub struct AudioRing {
    inner: Mutex<RingInner>,
    notify: Notify,
}

impl AudioRing {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(AudioRing {
            inner: Mutex::new(RingInner {
                buffer: BytesMut::with_capacity(capacity),
                capacity,
                write_index: 0,
                closed: false,
            }),
            notify: Notify::new(),
        })
    }

    pub fn current_write_index(&self) -> u64 {
        self.inner.lock().write_index
    }

    fn write(&self, data: &[u8]) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            if inner.buffer.len() + data.len() > inner.capacity {
                let overflow = inner.buffer.len() + data.len() - inner.capacity;
                let _ = inner.buffer.split_to(overflow.min(inner.buffer.len()));
            }
            inner.buffer.extend_from_slice(data);
            inner.write_index += data.len() as u64;
        }
        self.notify.notify_waiters();
    }

    fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
    }
}

/// The writer half; the capture path owns exactly one of these per ring.
pub struct AudioRingWriter {
    ring: Arc<AudioRing>,
}

impl AudioRingWriter {
    pub fn new(ring: Arc<AudioRing>) -> Self {
        AudioRingWriter { ring }
    }

    pub fn write(&self, data: &[u8]) {
        self.ring.write(data);
    }

    pub fn close(&self) {
        self.ring.close();
    }
}

/// A reader attached to the ring at a given start index. Multiple readers
/// may coexist; each tracks its own cursor independently.
pub struct AudioRingReader {
    ring: Arc<AudioRing>,
    read_index: u64,
}

impl AudioRingReader {
    /// Creates a reader whose cursor starts at `start_index`, or at the
    /// writer's current position if `start_index` is `None` (§4.2
    /// "when both are missing it begins from the current write cursor").
    pub fn new(ring: Arc<AudioRing>, start_index: Option<u64>) -> Self {
        let read_index = start_index.unwrap_or_else(|| ring.current_write_index());
        AudioRingReader { ring, read_index }
    }

    /// Returns the bytes available since this reader's last read, or a
    /// notification if the writer overran the reader or closed the ring.
    ///
    /// Repositions to the writer's current position on overrun, per
    /// §4.2: "Overrun on the reader triggers repositioning to the
    /// writer's current position and a state observer notification of
    /// OVERRUN."
    pub fn read_available(&mut self) -> Result<Bytes, ReaderNotification> {
        let inner = self.ring.inner.lock();
        if inner.closed && self.read_index >= inner.write_index {
            return Err(ReaderNotification::Closed);
        }

        let retained_start = inner.write_index - inner.buffer.len() as u64;
        if self.read_index < retained_start {
            self.read_index = inner.write_index;
            return Err(ReaderNotification::Overrun);
        }

        let offset = (self.read_index - retained_start) as usize;
        let available = inner.buffer[offset..].to_vec();
        self.read_index = inner.write_index;
        Ok(Bytes::from(available))
    }

    /// Suspends until new bytes are written or the ring closes. Part of
    /// AIP's executor suspension points (§5).
    pub async fn wait_for_data(&self) {
        self.ring.notify.notified().await;
    }

    /// Opens an independent reader against the same ring, positioned
    /// wherever this reader currently is. Used to bind a `Recognize`
    /// event's attachment to the capture stream (§4.2 "Attachment
    /// streaming") without consuming the `AudioProvider`'s own reader.
    pub fn open_attachment_reader(&self) -> AudioRingReader {
        AudioRingReader::new(self.ring.clone(), Some(self.read_index))
    }
}

/// Adapts an [`AudioRingReader`] into the [`AttachmentSource`] a
/// `MessageSender` pulls chunks from while sending a `Recognize` event.
/// A `tokio::sync::Mutex` rather than `parking_lot`'s here deliberately —
/// `next_chunk` awaits `wait_for_data` while holding it.
pub struct RingAttachmentSource {
    reader: tokio::sync::Mutex<AudioRingReader>,
    observer: Option<Arc<dyn AipStateObserver>>,
}

impl RingAttachmentSource {
    pub fn new(reader: AudioRingReader, observer: Option<Arc<dyn AipStateObserver>>) -> Self {
        RingAttachmentSource {
            reader: tokio::sync::Mutex::new(reader),
            observer,
        }
    }
}

#[async_trait]
impl AttachmentSource for RingAttachmentSource {
    async fn next_chunk(&self) -> Option<Bytes> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.read_available() {
                Ok(bytes) if !bytes.is_empty() => return Some(bytes),
                Ok(_) => reader.wait_for_data().await,
                Err(ReaderNotification::Overrun) => {
                    if let Some(observer) = &self.observer {
                        observer.on_overrun().await;
                    }
                }
                Err(ReaderNotification::Closed) => return None,
            }
        }
    }
}
