//! In-process message protocol.
//!
//! Messages travel as [`Envelope`]s encoded one JSON object per line. Two
//! delivery styles share the same wire format:
//!
//! - **topic fan-out**: [`Protocol::publish`] / [`Protocol::transmit`]
//!   deliver to every live [`Subscription`] on the envelope's topic;
//! - **mailbox**: [`Protocol::post`] queues per topic and
//!   [`Protocol::get`] takes the oldest entry.
//!
//! [`Protocol::send`] bridges the two: it fans out, and falls back to the
//! mailbox when the topic has no subscribers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::token_space::{TokenStack, token_space_for};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("protocol state lock poisoned")]
    Poisoned,
}

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub topic: String,
    pub payload: Value,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self { id: Uuid::new_v4(), topic: topic.into(), payload }
    }
}

/// Receiving end of a topic subscription.
#[derive(Debug)]
pub struct Subscription {
    pub id: Uuid,
    pub topic: String,
    receiver: mpsc::UnboundedReceiver<Envelope>,
}

impl Subscription {
    /// Wait for the next envelope; `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }
}

pub trait Protocol {
    /// Serialise an envelope to its wire form.
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError>;

    /// Parse wire bytes back into an envelope.
    fn decode(&self, bytes: &[u8]) -> Result<Envelope, ProtocolError>;

    /// Deliver encoded bytes to the subscribers of their topic.
    /// Returns how many subscribers received the envelope.
    fn transmit(&self, bytes: &[u8]) -> Result<usize, ProtocolError>;

    /// Deliver a prebuilt envelope, queueing it when nobody is listening.
    fn send(&self, envelope: Envelope) -> Result<usize, ProtocolError>;

    /// Take the oldest queued envelope for `topic`.
    fn get(&self, topic: &str) -> Result<Option<Envelope>, ProtocolError>;

    /// Queue `payload` for `topic` and return the new envelope id.
    fn post(&self, topic: &str, payload: Value) -> Result<Uuid, ProtocolError>;

    /// Build, encode and transmit an envelope on `topic`.
    fn publish(&self, topic: &str, payload: Value) -> Result<usize, ProtocolError>;

    fn subscribe(&self, topic: &str) -> Result<Subscription, ProtocolError>;

    /// Drop a subscription by id. Returns whether it existed.
    fn unsubscribe(&self, id: Uuid) -> Result<bool, ProtocolError>;
}

#[derive(Debug, Default)]
struct Inner {
    subscribers: HashMap<String, Vec<(Uuid, mpsc::UnboundedSender<Envelope>)>>,
    mailboxes: HashMap<String, VecDeque<Envelope>>,
}

/// Single-process [`Protocol`] implementation.
#[derive(Debug, Default)]
pub struct LocalProtocol {
    inner: Mutex<Inner>,
}

impl LocalProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log entry now and exit when the returned guard drops.
    pub fn open(&self) -> ProtocolSession {
        info!("entering protocol");
        ProtocolSession { _private: () }
    }

    /// Attach a token stack when `keys` ask for one.
    pub fn token_space<T>(&self, keys: &[&str]) -> Option<TokenStack<T>> {
        token_space_for(keys.iter().copied())
    }

    /// Number of envelopes waiting in `topic`'s mailbox.
    pub fn pending(&self, topic: &str) -> Result<usize, ProtocolError> {
        Ok(self.lock()?.mailboxes.get(topic).map_or(0, VecDeque::len))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, ProtocolError> {
        self.inner.lock().map_err(|_| ProtocolError::Poisoned)
    }

    fn fan_out(&self, envelope: &Envelope) -> Result<usize, ProtocolError> {
        let mut inner = self.lock()?;
        let Some(subs) = inner.subscribers.get_mut(&envelope.topic) else {
            return Ok(0);
        };
        // Closed receivers are pruned as a side effect of delivery.
        subs.retain(|(_, tx)| tx.send(envelope.clone()).is_ok());
        let delivered = subs.len();
        if subs.is_empty() {
            inner.subscribers.remove(&envelope.topic);
        }
        debug!(topic = %envelope.topic, id = %envelope.id, delivered, "envelope transmitted");
        Ok(delivered)
    }

    fn enqueue(&self, envelope: Envelope) -> Result<(), ProtocolError> {
        self.lock()?
            .mailboxes
            .entry(envelope.topic.clone())
            .or_default()
            .push_back(envelope);
        Ok(())
    }
}

impl Protocol for LocalProtocol {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes =
            serde_json::to_vec(envelope).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Envelope, ProtocolError> {
        let line = bytes.strip_suffix(b"\n").unwrap_or(bytes);
        serde_json::from_slice(line).map_err(|e| {
            warn!(error = %e, "rejecting malformed envelope");
            ProtocolError::Decode(e.to_string())
        })
    }

    fn transmit(&self, bytes: &[u8]) -> Result<usize, ProtocolError> {
        let envelope = self.decode(bytes)?;
        self.fan_out(&envelope)
    }

    fn send(&self, envelope: Envelope) -> Result<usize, ProtocolError> {
        let delivered = self.fan_out(&envelope)?;
        if delivered == 0 {
            debug!(topic = %envelope.topic, id = %envelope.id, "no subscribers, queued");
            self.enqueue(envelope)?;
        }
        Ok(delivered)
    }

    fn get(&self, topic: &str) -> Result<Option<Envelope>, ProtocolError> {
        let mut inner = self.lock()?;
        let Some(queue) = inner.mailboxes.get_mut(topic) else {
            return Ok(None);
        };
        let envelope = queue.pop_front();
        // Drained mailboxes are dropped so idle topics do not accumulate.
        if queue.is_empty() {
            inner.mailboxes.remove(topic);
        }
        Ok(envelope)
    }

    fn post(&self, topic: &str, payload: Value) -> Result<Uuid, ProtocolError> {
        let envelope = Envelope::new(topic, payload);
        let id = envelope.id;
        self.enqueue(envelope)?;
        Ok(id)
    }

    fn publish(&self, topic: &str, payload: Value) -> Result<usize, ProtocolError> {
        let bytes = self.encode(&Envelope::new(topic, payload))?;
        self.transmit(&bytes)
    }

    fn subscribe(&self, topic: &str) -> Result<Subscription, ProtocolError> {
        let (tx, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.lock()?.subscribers.entry(topic.to_string()).or_default().push((id, tx));
        debug!(%topic, %id, "subscribed");
        Ok(Subscription { id, topic: topic.to_string(), receiver })
    }

    fn unsubscribe(&self, id: Uuid) -> Result<bool, ProtocolError> {
        let mut inner = self.lock()?;
        let mut found = false;
        inner.subscribers.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|(sub_id, _)| *sub_id != id);
            found |= subs.len() != before;
            !subs.is_empty()
        });
        Ok(found)
    }
}

/// Guard returned by [`LocalProtocol::open`].
#[derive(Debug)]
pub struct ProtocolSession {
    _private: (),
}

impl Drop for ProtocolSession {
    fn drop(&mut self) {
        info!("exiting protocol");
    }
}
