use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{Error, Kind};
use crate::guest::dir::{GuestDir, SnapshotDir, StreamDir};
use crate::ipld::{EntryKind, StreamEntry};

fn entry(name: &str) -> StreamEntry {
    StreamEntry { name: name.to_string(), cid: None, size: 0, kind: EntryKind::Regular }
}

#[tokio::test]
async fn stream_reads_all_entries_on_non_positive_count() {
    let (send, recv) = mpsc::channel(8);
    for name in ["a", "b", "c"] {
        send.send(Ok(entry(name))).await.unwrap();
    }
    drop(send);

    let mut dir = StreamDir::new(recv);
    let entries = dir.read_dir(0).await.unwrap();
    assert_eq!(entries.len(), 3);
    // A drained stream keeps returning end-of-stream.
    assert!(dir.read_dir(-1).await.unwrap().is_empty());
}

#[tokio::test]
async fn stream_respects_positive_counts() {
    let (send, recv) = mpsc::channel(8);
    for name in ["a", "b", "c"] {
        send.send(Ok(entry(name))).await.unwrap();
    }
    drop(send);

    let mut dir = StreamDir::new(recv);
    assert_eq!(dir.read_dir(2).await.unwrap().len(), 2);
    assert_eq!(dir.read_dir(2).await.unwrap().len(), 1);
    assert!(dir.read_dir(2).await.unwrap().is_empty());
}

#[tokio::test]
async fn stream_surfaces_the_error_tail() {
    let (send, recv) = mpsc::channel(8);
    send.send(Ok(entry("a"))).await.unwrap();
    send.send(Err(Error::new("readdir", "/", Kind::Io))).await.unwrap();
    drop(send);

    let mut dir = StreamDir::new(recv);
    assert_eq!(dir.read_dir(1).await.unwrap().len(), 1);
    let err = dir.read_dir(1).await.unwrap_err();
    assert_eq!(err.kind(), Kind::Io);
}

#[tokio::test]
async fn stream_cannot_reset() {
    let (_send, recv) = mpsc::channel(1);
    let mut dir = StreamDir::new(recv);
    assert_eq!(dir.reset().await.unwrap_err().kind(), Kind::InvalidOperation);
}

#[tokio::test]
async fn stream_double_close_reports_closed() {
    let (_send, recv) = mpsc::channel(1);
    let mut dir = StreamDir::new(recv);
    dir.close().await.unwrap();
    assert_eq!(dir.close().await.unwrap_err().kind(), Kind::Closed);
    assert_eq!(dir.read_dir(0).await.unwrap_err().kind(), Kind::Closed);
}

#[tokio::test]
async fn sink_receives_accumulation_on_clean_drain() {
    let (send, source) = mpsc::channel(8);
    for name in ["a", "b"] {
        send.send(Ok(entry(name))).await.unwrap();
    }
    drop(send);

    let (out_send, mut out_recv) = mpsc::channel(1);
    let mut dir = StreamDir::with_sink(source, move |outcome| {
        out_send.try_send(outcome).unwrap();
    });
    assert_eq!(dir.read_dir(0).await.unwrap().len(), 2);
    let outcome = out_recv.recv().await.unwrap();
    assert_eq!(outcome.unwrap().len(), 2);
}

#[tokio::test]
async fn sink_discards_accumulation_after_error_tail() {
    let (send, source) = mpsc::channel(8);
    send.send(Ok(entry("a"))).await.unwrap();
    send.send(Err(Error::new("readdir", "/", Kind::Io))).await.unwrap();
    drop(send);

    let discarded = Arc::new(AtomicBool::new(false));
    let flag = discarded.clone();
    let (done_send, mut done_recv) = mpsc::channel(1);
    let mut dir = StreamDir::with_sink(source, move |outcome| {
        flag.store(outcome.is_none(), Ordering::SeqCst);
        done_send.try_send(()).unwrap();
    });
    let _ = dir.read_dir(0).await;
    done_recv.recv().await.unwrap();
    assert!(discarded.load(Ordering::SeqCst));
}

#[tokio::test]
async fn snapshot_supports_offsets_and_reset() {
    let mut dir = SnapshotDir::new(vec![entry("a"), entry("b"), entry("c")]);
    assert_eq!(dir.read_dir(2).await.unwrap().len(), 2);
    assert_eq!(dir.read_dir(0).await.unwrap().len(), 1);
    assert!(dir.read_dir(0).await.unwrap().is_empty());

    dir.reset().await.unwrap();
    let names: Vec<String> =
        dir.read_dir(0).await.unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, ["a", "b", "c"]);
}

#[tokio::test]
async fn snapshot_double_close_reports_closed() {
    let mut dir = SnapshotDir::new(Vec::new());
    dir.close().await.unwrap();
    assert_eq!(dir.close().await.unwrap_err().kind(), Kind::Closed);
}
