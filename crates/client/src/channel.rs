//! Sequenced line channel over the fsavd socket.
//!
//! Every command takes a [`Ticket`] carrying a monotonically increasing id. A ticket
//! owns one turn on the write side and one on the read side: writes happen in id
//! order, and so do reads, so command N consumes its whole response before command
//! N+1 sees a single line, no matter which task polls first.

use std::collections::BTreeSet;
use std::future::Future;
use std::io;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::codec::FsavdCodec;

/// Longest line accepted from fsavd.
const MAX_LINE_LEN: usize = 64 * 1024;

const FIRST_ID: u64 = 1;

/// Absolute deadline for a single read or write. The default waits forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// Now plus `timeout`; a timeout too large to represent means no deadline.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    #[cfg(test)]
    const fn instant(self) -> Option<Instant> {
        self.0
    }

    async fn run<T>(self, fut: impl Future<Output = io::Result<T>>) -> io::Result<T> {
        match self.0 {
            None => fut.await,
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"))?,
        }
    }
}

#[derive(Debug)]
struct Turns {
    current: u64,
    abandoned: BTreeSet<u64>,
}

impl Turns {
    fn advance(&mut self) {
        self.current += 1;
        while self.abandoned.remove(&self.current) {
            self.current += 1;
        }
    }
}

/// Hands out turns strictly in id order.
#[derive(Debug)]
struct Sequencer {
    turns: watch::Sender<Turns>,
}

impl Sequencer {
    fn new() -> Self {
        let (turns, _) = watch::channel(Turns {
            current: FIRST_ID,
            abandoned: BTreeSet::new(),
        });
        Self { turns }
    }

    async fn wait(&self, id: u64) {
        let mut rx = self.turns.subscribe();
        // Only fails once the sender is gone, and the sender outlives every turn.
        let _ = rx.wait_for(|t| t.current == id).await;
    }

    /// Finish `id`'s turn, or mark it to be skipped if it has not come up yet.
    fn release(&self, id: u64) {
        self.turns.send_modify(|t| {
            if t.current == id {
                t.advance();
            } else if id > t.current {
                t.abandoned.insert(id);
            }
        });
    }
}

struct Turn<'a> {
    seq: &'a Sequencer,
    id: u64,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        self.seq.release(self.id);
    }
}

/// One command's place in the write and read queues.
///
/// Ending a phase early, returning with `?`, or dropping the ticket mid-flight
/// all release the ticket's turns, so later commands never stall behind it.
pub struct Ticket<'a> {
    id: u64,
    request: Option<Turn<'a>>,
    response: Option<Turn<'a>>,
}

impl Ticket<'_> {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Wait until every lower id has finished writing.
    pub async fn begin_request(&self) {
        if let Some(turn) = &self.request {
            turn.seq.wait(turn.id).await;
        }
    }

    pub fn end_request(&mut self) {
        self.request.take();
    }

    /// End the write phase, then wait until every lower id has finished reading.
    pub async fn begin_response(&mut self) {
        self.end_request();
        if let Some(turn) = &self.response {
            turn.seq.wait(turn.id).await;
        }
    }

    pub fn end_response(&mut self) {
        self.response.take();
    }
}

pub struct LineChannel<R, W> {
    reader: Mutex<Option<FramedRead<R, FsavdCodec>>>,
    writer: Mutex<Option<FramedWrite<W, FsavdCodec>>>,
    next_id: AtomicU64,
    requests: Sequencer,
    responses: Sequencer,
    shutdown: CancellationToken,
}

impl<S> LineChannel<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn from_stream(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(Some(FramedRead::new(
                reader,
                FsavdCodec::new(MAX_LINE_LEN),
            ))),
            writer: Mutex::new(Some(FramedWrite::new(
                writer,
                FsavdCodec::new(MAX_LINE_LEN),
            ))),
            next_id: AtomicU64::new(FIRST_ID),
            requests: Sequencer::new(),
            responses: Sequencer::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Take the next sequence ticket.
    pub fn next(&self) -> Ticket<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ticket {
            id,
            request: Some(Turn {
                seq: &self.requests,
                id,
            }),
            response: Some(Turn {
                seq: &self.responses,
                id,
            }),
        }
    }

    /// Run `fut` unless the channel is closed first.
    async fn cancellable<T>(&self, fut: impl Future<Output = io::Result<T>>) -> io::Result<T> {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(not_connected()),
            res = fut => res,
        }
    }

    /// Write one line (newline appended) and flush it.
    ///
    /// A write cut short by the deadline may leave part of the line buffered, so
    /// the write side is dropped and every later write fails with `NotConnected`.
    pub async fn write_line(&self, line: &str, deadline: Deadline) -> io::Result<()> {
        self.cancellable(async {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or_else(not_connected)?;
            trace!(line, "send");
            let res = deadline.run(writer.send(line)).await;
            if matches!(&res, Err(e) if e.kind() == io::ErrorKind::TimedOut) {
                warn!("write timed out, disabling further writes");
                guard.take();
            }
            res
        })
        .await
    }

    /// Read one line without its terminator.
    pub async fn read_line(&self, deadline: Deadline) -> io::Result<String> {
        let line = self
            .cancellable(async {
                let mut guard = self.reader.lock().await;
                let reader = guard.as_mut().ok_or_else(not_connected)?;
                deadline
                    .run(async {
                        reader.next().await.unwrap_or_else(|| {
                            Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "fsavd closed the connection",
                            ))
                        })
                    })
                    .await
            })
            .await?;
        trace!(line = %line, "recv");
        Ok(line)
    }

    /// Run one command cycle: write `request` (if any) during this command's write
    /// turn, then pass reply lines to `on_line` during its read turn until it breaks.
    ///
    /// `timeout` bounds each individual read and write, not the cycle as a whole.
    pub async fn exchange<T>(
        &self,
        request: Option<&str>,
        timeout: Duration,
        mut on_line: impl FnMut(String) -> ControlFlow<T>,
    ) -> io::Result<T> {
        let mut ticket = self.next();

        ticket.begin_request().await;
        if let Some(line) = request {
            self.write_line(line, Deadline::after(timeout)).await?;
        }

        ticket.begin_response().await;
        loop {
            let line = self.read_line(Deadline::after(timeout)).await?;
            if let ControlFlow::Break(out) = on_line(line) {
                ticket.end_response();
                return Ok(out);
            }
        }
    }

    /// Release the socket. Only the first call does anything.
    ///
    /// Reads and writes already in flight fail at once with `NotConnected`.
    pub async fn close(&self) -> io::Result<()> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        self.shutdown.cancel();
        trace!("closing connection");

        let writer = self.writer.lock().await.take();
        drop(self.reader.lock().await.take());
        if let Some(mut writer) = writer {
            writer.get_mut().shutdown().await?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is closed")
}
