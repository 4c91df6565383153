//! Callback-style access to a connection.
//!
//! A [`ListenerAdapter`] subscribes once to its connection's message stream
//! and fans events out to at most one listener per kind. Every callback is
//! handed to the connection's [`CallbackExecutor`], so the caller decides
//! which thread or task observes it.

use crate::connection::{ConnectionInner, SerialConnection};
use crate::error::SerialError;
use crate::executor::CallbackExecutor;
use futures::StreamExt;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Called with every inbound line.
pub trait OnMessageReceived: Send + Sync {
    fn on_message_received(&self, message: &str);
}

/// Called with the original text once a `send_message` write completed.
pub trait OnMessageSent: Send + Sync {
    fn on_message_sent(&self, message: &str);
}

/// Called when reading or an adapter-initiated write fails.
pub trait OnError: Send + Sync {
    fn on_error(&self, error: &SerialError);
}

impl<F> OnMessageReceived for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_message_received(&self, message: &str) {
        self(message)
    }
}

impl<F> OnMessageSent for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_message_sent(&self, message: &str) {
        self(message)
    }
}

impl<F> OnError for F
where
    F: Fn(&SerialError) + Send + Sync,
{
    fn on_error(&self, error: &SerialError) {
        self(error)
    }
}

#[derive(Default)]
struct Listeners {
    received: Option<Arc<dyn OnMessageReceived>>,
    sent: Option<Arc<dyn OnMessageSent>>,
    error: Option<Arc<dyn OnError>>,
}

/// Schedules listener calls on the executor.
///
/// The slot is read when the job runs, not when it is scheduled.
#[derive(Clone)]
struct Dispatcher {
    executor: Arc<dyn CallbackExecutor>,
    listeners: Arc<Mutex<Listeners>>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    fn received(&self, message: String) {
        let listeners = Arc::clone(&self.listeners);
        let shutdown = self.shutdown.clone();
        self.executor.execute(Box::new(move || {
            if shutdown.is_cancelled() {
                return;
            }
            let listener = listeners.lock().received.clone();
            if let Some(listener) = listener {
                listener.on_message_received(&message);
            }
        }));
    }

    fn sent(&self, message: String) {
        let listeners = Arc::clone(&self.listeners);
        let shutdown = self.shutdown.clone();
        self.executor.execute(Box::new(move || {
            if shutdown.is_cancelled() {
                return;
            }
            let listener = listeners.lock().sent.clone();
            if let Some(listener) = listener {
                listener.on_message_sent(&message);
            }
        }));
    }

    fn error(&self, error: SerialError) {
        let listeners = Arc::clone(&self.listeners);
        let shutdown = self.shutdown.clone();
        self.executor.execute(Box::new(move || {
            if shutdown.is_cancelled() {
                return;
            }
            let listener = listeners.lock().error.clone();
            if let Some(listener) = listener {
                listener.on_error(&error);
            }
        }));
    }
}

/// Listener-based view of one [`SerialConnection`].
///
/// Obtained through [`SerialConnection::to_listener_interface`]. Closing the
/// adapter stops dispatching but leaves the connection open; closing the
/// connection closes the adapter.
pub struct ListenerAdapter {
    address: String,
    connection: Weak<ConnectionInner>,
    listeners: Arc<Mutex<Listeners>>,
    outbound: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
}

impl ListenerAdapter {
    pub(crate) fn new(connection: &SerialConnection) -> Result<Self, SerialError> {
        let mut messages = connection.message_stream()?;

        let listeners = Arc::new(Mutex::new(Listeners::default()));
        let shutdown = CancellationToken::new();
        let dispatcher = Dispatcher {
            executor: connection.executor(),
            listeners: Arc::clone(&listeners),
            shutdown: shutdown.clone(),
        };
        let address = connection.address().to_string();
        let runtime = connection.runtime();

        let pump = dispatcher.clone();
        let pump_address = address.clone();
        runtime.spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = pump.shutdown.cancelled() => break,
                    next = messages.next() => next,
                };
                match next {
                    Some(Ok(line)) => {
                        trace!(address = %pump_address, %line, "dispatching message");
                        pump.received(line);
                    }
                    Some(Err(e)) => {
                        pump.error(e);
                        break;
                    }
                    None => break,
                }
            }
            debug!(address = %pump_address, "subscription ended");
        });

        let (outbound, queue) = mpsc::unbounded_channel();
        runtime.spawn(drain_outbound(connection.downgrade(), queue, dispatcher));

        Ok(Self {
            address,
            connection: connection.downgrade(),
            listeners,
            outbound,
            shutdown,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The wrapped connection, if it is still alive.
    pub fn connection(&self) -> Option<SerialConnection> {
        self.connection.upgrade().map(SerialConnection::from_inner)
    }

    /// True when this adapter was created for `connection`, even if the
    /// adapter's own link has since been dropped.
    pub(crate) fn wraps(&self, connection: &SerialConnection) -> bool {
        Weak::ptr_eq(&self.connection, &connection.downgrade())
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Queue `message` for sending and return immediately.
    ///
    /// The outcome is reported to the sent or error listener. Queued
    /// messages are written in call order.
    pub fn send_message(&self, message: impl Into<String>) -> Result<(), SerialError> {
        if self.is_closed() {
            return Err(SerialError::ConnectionClosed);
        }
        match self.connection() {
            Some(connection) if !connection.is_closed() => {}
            _ => return Err(SerialError::ConnectionClosed),
        }
        self.outbound
            .send(message.into())
            .map_err(|_| SerialError::ConnectionClosed)
    }

    /// Replace all three listeners at once. `None` clears a slot.
    pub fn set_listeners(
        &self,
        received: Option<Arc<dyn OnMessageReceived>>,
        sent: Option<Arc<dyn OnMessageSent>>,
        error: Option<Arc<dyn OnError>>,
    ) {
        let mut listeners = self.listeners.lock();
        listeners.received = received;
        listeners.sent = sent;
        listeners.error = error;
    }

    pub fn set_message_received_listener(&self, listener: Option<Arc<dyn OnMessageReceived>>) {
        self.listeners.lock().received = listener;
    }

    pub fn set_message_sent_listener(&self, listener: Option<Arc<dyn OnMessageSent>>) {
        self.listeners.lock().sent = listener;
    }

    pub fn set_error_listener(&self, listener: Option<Arc<dyn OnError>>) {
        self.listeners.lock().error = listener;
    }

    /// Stop the subscription and discard pending dispatches. Idempotent.
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            debug!(address = %self.address, "closing listener adapter");
            self.shutdown.cancel();
        }
    }
}

impl Drop for ListenerAdapter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for ListenerAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerAdapter")
            .field("address", &self.address)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn drain_outbound(
    connection: Weak<ConnectionInner>,
    mut queue: mpsc::UnboundedReceiver<String>,
    dispatcher: Dispatcher,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = dispatcher.shutdown.cancelled() => break,
            message = queue.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let Some(inner) = connection.upgrade() else {
            dispatcher.error(SerialError::ConnectionClosed);
            continue;
        };

        // A started write is not abandoned when the adapter closes.
        let result = SerialConnection::from_inner(inner).send(&message).await;
        match result {
            Ok(()) => dispatcher.sent(message),
            Err(e) => dispatcher.error(e),
        }
    }
}
