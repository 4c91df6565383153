//! A single line-framed connection over an owned transport.
//!
//! The transport is split into an output half, serialized behind a FIFO
//! async mutex for `send`, and an input half wrapped in a [`LineCodec`]
//! framer, serialized behind another async mutex for the message stream and
//! raw reads.

use crate::codec::LineCodec;
use crate::encoding::Encoding;
use crate::error::SerialError;
use crate::executor::{CallbackExecutor, InlineExecutor};
use crate::listener::ListenerAdapter;
use crate::transport::BoxedTransport;
use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf};
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Initial capacity of the inbound framing buffer.
pub const DEFAULT_READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// Infinite sequence of inbound lines.
///
/// Ends when the consumer drops it, when the connection closes, or at end of
/// file. A read failure is delivered as one final `Err` item.
pub type MessageStream = BoxStream<'static, Result<String, SerialError>>;

type FramedInput = FramedRead<ReadHalf<BoxedTransport>, LineCodec>;
type Output = WriteHalf<BoxedTransport>;

pub(crate) struct ConnectionInner {
    address: String,
    encoding: Encoding,
    closed: AtomicBool,
    close_token: CancellationToken,
    input: Arc<AsyncMutex<Option<FramedInput>>>,
    output: Arc<AsyncMutex<Option<Output>>>,
    /// Cached listener adapter. Also guards the open -> closed transition.
    owner: Mutex<Option<Arc<ListenerAdapter>>>,
    runtime: Handle,
    executor: Arc<dyn CallbackExecutor>,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        // Wakes any stream still parked on the input half.
        self.close_token.cancel();
    }
}

/// Handle to one open (or closed) connection.
///
/// Cloning is cheap; all clones refer to the same link.
#[derive(Clone)]
pub struct SerialConnection {
    inner: Arc<ConnectionInner>,
}

impl SerialConnection {
    /// Wrap an established transport.
    ///
    /// Callbacks of the listener adapter run inline on the background task.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn new(address: impl Into<String>, transport: BoxedTransport, encoding: Encoding) -> Self {
        Self::with_options(
            address,
            transport,
            encoding,
            DEFAULT_READ_BUFFER_CAPACITY,
            Arc::new(InlineExecutor),
        )
    }

    pub(crate) fn with_options(
        address: impl Into<String>,
        transport: BoxedTransport,
        encoding: Encoding,
        read_buffer_capacity: usize,
        executor: Arc<dyn CallbackExecutor>,
    ) -> Self {
        let (reader, writer) = tokio::io::split(transport);
        let framed = FramedRead::with_capacity(reader, LineCodec::new(encoding), read_buffer_capacity);

        Self {
            inner: Arc::new(ConnectionInner {
                address: address.into(),
                encoding,
                closed: AtomicBool::new(false),
                close_token: CancellationToken::new(),
                input: Arc::new(AsyncMutex::new(Some(framed))),
                output: Arc::new(AsyncMutex::new(Some(writer))),
                owner: Mutex::new(None),
                runtime: Handle::current(),
                executor,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ConnectionInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ConnectionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    pub(crate) fn executor(&self) -> Arc<dyn CallbackExecutor> {
        Arc::clone(&self.inner.executor)
    }

    /// Remote address this connection was opened for.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn encoding(&self) -> Encoding {
        self.inner.encoding
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// True when both handles refer to the same underlying connection.
    pub fn same_as(&self, other: &SerialConnection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn ensure_open(&self) -> Result<(), SerialError> {
        if self.is_closed() {
            Err(SerialError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Encode `message` and write it to the transport.
    ///
    /// No delimiter is appended. Concurrent sends are written one after the
    /// other in arrival order, never interleaved.
    pub async fn send(&self, message: &str) -> Result<(), SerialError> {
        self.ensure_open()?;
        let bytes = self.inner.encoding.encode(message);

        let mut guard = self.inner.output.lock().await;
        let output = match guard.as_mut() {
            Some(output) if !self.is_closed() => output,
            _ => return Err(SerialError::ConnectionClosed),
        };

        let write = async {
            output.write_all(&bytes).await?;
            output.flush().await
        };

        tokio::select! {
            biased;
            _ = self.inner.close_token.cancelled() => Err(SerialError::ConnectionClosed),
            result = write => result.map_err(|e| {
                if self.is_closed() {
                    SerialError::ConnectionClosed
                } else {
                    debug!(address = %self.inner.address, error = %e, "write failed");
                    SerialError::from(e)
                }
            }),
        }
    }

    /// Open the inbound line stream.
    ///
    /// Nothing is read until the stream is first polled. Only one stream
    /// reads at a time; a second one waits until the first is dropped.
    pub fn message_stream(&self) -> Result<MessageStream, SerialError> {
        self.ensure_open()?;

        let input = Arc::clone(&self.inner.input);
        let close_token = self.inner.close_token.clone();
        let address = self.inner.address.clone();

        let messages = stream! {
            let guard = tokio::select! {
                biased;
                _ = close_token.cancelled() => None,
                guard = input.lock_owned() => Some(guard),
            };

            if let Some(mut guard) = guard {
                debug!(%address, "message stream started");
                while let Some(framed) = guard.as_mut() {
                    let next = tokio::select! {
                        biased;
                        _ = close_token.cancelled() => None,
                        next = framed.next() => next,
                    };

                    match next {
                        Some(Ok(line)) => yield Ok(line),
                        Some(Err(e)) => {
                            if !close_token.is_cancelled() {
                                warn!(%address, error = %e, "read failed");
                                yield Err(SerialError::from(e));
                            }
                            break;
                        }
                        None => break,
                    }
                }
                if close_token.is_cancelled() {
                    guard.take();
                }
                debug!(%address, "message stream finished");
            }
        };

        Ok(messages.boxed())
    }

    /// Exclusive access to the raw input side.
    ///
    /// Bytes already buffered by the framer are returned first. Must not be
    /// mixed with [`message_stream`](Self::message_stream).
    pub async fn raw_input(&self) -> Result<RawInput, SerialError> {
        self.ensure_open()?;
        let guard = Arc::clone(&self.inner.input).lock_owned().await;
        if guard.is_none() {
            return Err(SerialError::ConnectionClosed);
        }
        Ok(RawInput { guard })
    }

    /// Exclusive access to the raw output side. Must not be mixed with
    /// [`send`](Self::send).
    pub async fn raw_output(&self) -> Result<RawOutput, SerialError> {
        self.ensure_open()?;
        let guard = Arc::clone(&self.inner.output).lock_owned().await;
        if guard.is_none() {
            return Err(SerialError::ConnectionClosed);
        }
        Ok(RawOutput { guard })
    }

    /// Return the listener adapter of this connection, creating it on first
    /// use (or after the previous one was closed). Creation subscribes to the
    /// message stream immediately.
    pub fn to_listener_interface(&self) -> Result<Arc<ListenerAdapter>, SerialError> {
        let mut owner = self.inner.owner.lock();
        self.ensure_open()?;

        if let Some(adapter) = owner.as_ref().filter(|adapter| !adapter.is_closed()) {
            return Ok(Arc::clone(adapter));
        }

        let adapter = Arc::new(ListenerAdapter::new(self)?);
        *owner = Some(Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Flip the closed flag. Returns whether this call did it, plus the
    /// cached adapter.
    fn mark_closed(&self) -> (bool, Option<Arc<ListenerAdapter>>) {
        let mut owner = self.inner.owner.lock();
        let first = !self.inner.closed.swap(true, Ordering::SeqCst);
        if first {
            self.inner.close_token.cancel();
        }
        (first, owner.take())
    }

    /// Drop the input half now if nobody holds it, otherwise once they do.
    fn release_input(&self) {
        match self.inner.input.try_lock() {
            Ok(mut input) => {
                input.take();
            }
            Err(_) => {
                let input = Arc::clone(&self.inner.input);
                self.inner.runtime.spawn(async move {
                    input.lock().await.take();
                });
            }
        }
    }

    /// Close the connection. Idempotent and infallible: teardown failures
    /// are logged and otherwise ignored.
    pub async fn close(&self) {
        let (first, adapter) = self.mark_closed();

        if first {
            info!(address = %self.inner.address, "closing connection");
            self.release_input();

            let output = self.inner.output.lock().await.take();
            if let Some(mut output) = output {
                if let Err(e) = output.shutdown().await {
                    debug!(address = %self.inner.address, error = %e, "output shutdown failed");
                }
            }
        }

        if let Some(adapter) = adapter {
            adapter.close();
        }
    }

    /// Close without awaiting: flags, tokens and the adapter are handled
    /// synchronously, I/O teardown is spawned on the connection's runtime.
    pub(crate) fn close_detached(&self) {
        let (first, adapter) = self.mark_closed();

        if first {
            debug!(address = %self.inner.address, "closing connection in background");
            self.release_input();

            let output = Arc::clone(&self.inner.output);
            let address = self.inner.address.clone();
            self.inner.runtime.spawn(async move {
                if let Some(mut output) = output.lock().await.take() {
                    if let Err(e) = output.shutdown().await {
                        debug!(%address, error = %e, "output shutdown failed");
                    }
                }
            });
        }

        if let Some(adapter) = adapter {
            adapter.close();
        }
    }
}

impl fmt::Debug for SerialConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialConnection")
            .field("address", &self.inner.address)
            .field("encoding", &self.inner.encoding)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Guard over the raw input side; see [`SerialConnection::raw_input`].
pub struct RawInput {
    guard: OwnedMutexGuard<Option<FramedInput>>,
}

impl AsyncRead for RawInput {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let Some(framed) = this.guard.as_mut() else {
            return Poll::Ready(Ok(()));
        };

        let buffered = framed.read_buffer_mut();
        if !buffered.is_empty() {
            let n = buffered.len().min(buf.remaining());
            buf.put_slice(&buffered.split_to(n));
            framed.decoder_mut().reset();
            return Poll::Ready(Ok(()));
        }

        Pin::new(framed.get_mut()).poll_read(cx, buf)
    }
}

impl fmt::Debug for RawInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawInput").finish_non_exhaustive()
    }
}

/// Guard over the raw output side; see [`SerialConnection::raw_output`].
pub struct RawOutput {
    guard: OwnedMutexGuard<Option<Output>>,
}

impl RawOutput {
    fn output(&mut self) -> io::Result<Pin<&mut Output>> {
        self.guard
            .as_mut()
            .map(Pin::new)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))
    }
}

impl AsyncWrite for RawOutput {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().output() {
            Ok(output) => output.poll_write(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().output() {
            Ok(output) => output.poll_flush(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().output() {
            Ok(output) => output.poll_shutdown(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl fmt::Debug for RawOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawOutput").finish_non_exhaustive()
    }
}
