//! Directory objects: lazy streams and cached snapshots.
//!
//! Streamed directories drain a channel whose items are `Result<StreamEntry>`
//! with at most one trailing `Err`. Snapshot directories walk a cloned slice
//! and can be rewound; streams cannot.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::EntryStream;
use crate::error::{Error, Kind, Result};
use crate::ipld::StreamEntry;

const RELAY_DEPTH: usize = 64;

/// A readable directory handle.
#[async_trait]
pub trait GuestDir: Send {
    /// Pulls at most `count` entries; `count <= 0` reads everything.
    ///
    /// An empty return signals end-of-stream. A failed fetch surfaces as the
    /// stream's single trailing error.
    async fn read_dir(&mut self, count: i64) -> Result<Vec<StreamEntry>>;

    /// Rewinds to the first entry. Only snapshot directories support this.
    async fn reset(&mut self) -> Result<()>;

    /// Releases the handle; a second close reports `Closed`.
    async fn close(&mut self) -> Result<()>;
}

/// Outcome handed to a [`StreamDir`] completion sink: the accumulated
/// entries when the stream drained cleanly, `None` otherwise.
pub type StreamOutcome = Option<Vec<StreamEntry>>;

/// Lazily streamed directory.
pub struct StreamDir {
    entries: EntryStream,
    relay: Option<JoinHandle<()>>,
    closed: bool,
}

impl StreamDir {
    /// Wraps a raw entry stream with no completion bookkeeping.
    pub fn new(entries: EntryStream) -> Self {
        Self { entries, relay: None, closed: false }
    }

    /// Relays `source` to the reader while accumulating every entry.
    ///
    /// `sink` always runs when the relay stops: with the full accumulation
    /// if the stream ended cleanly, with `None` if it errored or the reader
    /// went away early. Callers use it to install listing snapshots and to
    /// release any lock held across the fetch.
    pub fn with_sink<F>(source: EntryStream, sink: F) -> Self
    where
        F: FnOnce(StreamOutcome) + Send + 'static,
    {
        let (entry_send, entry_recv) = mpsc::channel(RELAY_DEPTH);
        let relay = tokio::spawn(relay(source, entry_send, sink));
        Self { entries: entry_recv, relay: Some(relay), closed: false }
    }
}

async fn relay<F>(mut source: EntryStream, dest: mpsc::Sender<Result<StreamEntry>>, sink: F)
where
    F: FnOnce(StreamOutcome) + Send + 'static,
{
    let mut collected = Vec::new();
    let mut clean = true;
    while let Some(item) = source.recv().await {
        if let Ok(entry) = &item {
            collected.push(entry.clone());
        } else {
            clean = false;
        }
        let stop = item.is_err();
        if dest.send(item).await.is_err() {
            // Reader gone before the fetch finished; the accumulation is
            // incomplete and must not be cached.
            clean = false;
            break;
        }
        if stop {
            break;
        }
    }
    sink(clean.then_some(collected));
}

#[async_trait]
impl GuestDir for StreamDir {
    async fn read_dir(&mut self, count: i64) -> Result<Vec<StreamEntry>> {
        if self.closed {
            return Err(Error::new("readdir", "", Kind::Closed));
        }
        let mut out = Vec::new();
        loop {
            if count > 0 && out.len() as i64 >= count {
                break;
            }
            match self.entries.recv().await {
                Some(Ok(entry)) => out.push(entry),
                Some(Err(err)) => return Err(err),
                None => break,
            }
        }
        Ok(out)
    }

    async fn reset(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::new("reset", "", Kind::Closed));
        }
        // Stream offsets are not re-seekable.
        Err(Error::new("reset", "", Kind::InvalidOperation))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::new("close", "", Kind::Closed));
        }
        self.closed = true;
        self.entries.close();
        if let Some(relay) = self.relay.take() {
            relay.abort();
            let _ = relay.await;
        }
        Ok(())
    }
}

impl Drop for StreamDir {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }
    }
}

/// Directory view over an owned snapshot of entries.
pub struct SnapshotDir {
    entries: Vec<StreamEntry>,
    cursor: usize,
    closed: bool,
}

impl SnapshotDir {
    pub fn new(entries: Vec<StreamEntry>) -> Self {
        Self { entries, cursor: 0, closed: false }
    }
}

#[async_trait]
impl GuestDir for SnapshotDir {
    async fn read_dir(&mut self, count: i64) -> Result<Vec<StreamEntry>> {
        if self.closed {
            return Err(Error::new("readdir", "", Kind::Closed));
        }
        let remaining = self.entries.len() - self.cursor;
        let take = if count <= 0 { remaining } else { remaining.min(count as usize) };
        let out = self.entries[self.cursor..self.cursor + take].to_vec();
        self.cursor += take;
        Ok(out)
    }

    async fn reset(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::new("reset", "", Kind::Closed));
        }
        self.cursor = 0;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::new("close", "", Kind::Closed));
        }
        self.closed = true;
        Ok(())
    }
}
