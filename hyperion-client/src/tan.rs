//! Transaction number registry.
//!
//! Every outbound request carries a tan; the server echoes it on the
//! matching reply. This table is the single place where a sender waiting
//! for a reply and the receive loop delivering one meet. Auto-allocated
//! tans form a strictly increasing sequence per session; caller-supplied
//! tans are honored only while not already in flight.

use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::Error;
use crate::messages::{reply_matches, Message};

pub(crate) struct TanRegistry {
    inner: Mutex<TanTable>,
}

struct TanTable {
    /// Next auto-allocation candidate. Never rewound within a session,
    /// so auto tans stay strictly increasing even across reconnects.
    next: u32,
    slots: HashMap<u32, Slot>,
}

#[derive(Default)]
struct Slot {
    pending: Option<Pending>,
}

struct Pending {
    expected: String,
    sink: oneshot::Sender<Message>,
}

impl TanRegistry {
    pub fn new() -> Self {
        TanRegistry {
            inner: Mutex::new(TanTable {
                next: 1,
                slots: HashMap::new(),
            }),
        }
    }

    /// Registers and returns the smallest free tan not below the session
    /// counter, then advances the counter past it.
    pub fn allocate(&self) -> u32 {
        let mut table = self.inner.lock();
        let tan = table.free_from_counter();
        table.next = tan.wrapping_add(1).max(1);
        table.slots.insert(tan, Slot::default());
        tan
    }

    /// Consumes a counter value for a request that will not wait for its
    /// reply. No slot is registered, so nothing has to free it.
    pub fn next_send_tan(&self) -> u32 {
        let mut table = self.inner.lock();
        let tan = table.free_from_counter();
        table.next = tan.wrapping_add(1).max(1);
        tan
    }

    /// Registers a caller-supplied tan. The counter is not moved.
    pub fn reserve(&self, tan: u32) -> Result<(), Error> {
        let mut table = self.inner.lock();
        if tan == 0 || table.slots.contains_key(&tan) {
            return Err(Error::TanNotAvailable(tan));
        }
        table.slots.insert(tan, Slot::default());
        Ok(())
    }

    /// Attaches a completion sink to a registered tan. Must happen before
    /// the request is written so an immediate reply cannot slip past.
    pub fn park(&self, tan: u32, expected_command: impl Into<String>) -> ParkedReply<'_> {
        let (sink, rx) = oneshot::channel();
        let mut table = self.inner.lock();
        table.slots.entry(tan).or_default().pending = Some(Pending {
            expected: expected_command.into(),
            sink,
        });
        ParkedReply {
            registry: self,
            tan,
            rx,
        }
    }

    /// Frees a tan registered without a sink (the connect sequence matches
    /// its replies inline).
    pub fn release(&self, tan: u32) {
        self.inner.lock().slots.remove(&tan);
    }

    /// Hands a message to the caller parked on its tan, freeing the slot.
    /// Returns false when no parked caller claims it.
    pub fn deliver(&self, msg: &Message) -> bool {
        let Some(tan) = msg.solicited_tan() else {
            return false;
        };
        let mut table = self.inner.lock();
        let claimed = table
            .slots
            .get(&tan)
            .and_then(|slot| slot.pending.as_ref())
            .is_some_and(|pending| reply_matches(&pending.expected, &msg.command));
        if !claimed {
            return false;
        }
        let pending = table
            .slots
            .remove(&tan)
            .and_then(|slot| slot.pending);
        match pending {
            Some(pending) => pending.sink.send(msg.clone()).is_ok(),
            None => false,
        }
    }

    /// Completes every parked caller with no reply and clears the table.
    /// Invoked on session termination.
    pub fn drain_all(&self) {
        self.inner.lock().slots.clear();
    }

    /// Starts a fresh tan sequence for a new session.
    pub fn reset(&self) {
        let mut table = self.inner.lock();
        table.slots.clear();
        table.next = 1;
    }
}

impl TanTable {
    fn free_from_counter(&self) -> u32 {
        let mut tan = self.next.max(1);
        while self.slots.contains_key(&tan) {
            tan = tan.wrapping_add(1).max(1);
        }
        tan
    }
}

/// A caller parked on a tan, waiting for the receive loop to deliver the
/// matching reply. Dropping it frees the slot.
pub(crate) struct ParkedReply<'a> {
    registry: &'a TanRegistry,
    tan: u32,
    rx: oneshot::Receiver<Message>,
}

impl ParkedReply<'_> {
    /// Waits for the reply until the deadline. Timeout and session
    /// termination both surface as `None`.
    pub async fn wait(mut self, deadline: tokio::time::Instant) -> Option<Message> {
        match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(Ok(msg)) => Some(msg),
            _ => None,
        }
    }
}

impl Drop for ParkedReply<'_> {
    fn drop(&mut self) {
        self.registry.release(self.tan);
    }
}
