//! Subscription ledger and the [`Subscription`] token.
//!
//! The station only pushes the asynchronous message categories whose
//! broadcast flag is raised, so the client refcounts listeners per
//! [`EventGroup`]: the first listener of a flag-gated group raises its
//! flag, the last removal clears it. Groups guarded by a firmware
//! version still count listeners on older stations but never raise
//! their flag.

use std::collections::HashMap;

use tokio::sync::broadcast;

use z21_core::error::{Error, Result};
use z21_core::{BroadcastFlags, EventGroup, FirmwareVersion, Z21Event};

/// Listener counts per event group.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionLedger {
    counts: HashMap<EventGroup, usize>,
}

impl SubscriptionLedger {
    /// Register a listener. Returns `true` on the 0 → 1 transition.
    pub fn add(&mut self, group: EventGroup) -> bool {
        let count = self.counts.entry(group).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Remove a listener. Returns `true` on the 1 → 0 transition.
    pub fn remove(&mut self, group: EventGroup) -> bool {
        match self.counts.get_mut(&group) {
            Some(count) if *count > 0 => {
                *count -= 1;
                *count == 0
            }
            _ => false,
        }
    }

    /// Current listener count for a group.
    pub fn count(&self, group: EventGroup) -> usize {
        self.counts.get(&group).copied().unwrap_or(0)
    }

    /// Union of the flags of all groups with listeners whose firmware
    /// guard passes. Guarded groups contribute nothing while the
    /// firmware is unknown.
    pub fn active_mask(&self, firmware: Option<FirmwareVersion>) -> BroadcastFlags {
        let mut mask = BroadcastFlags::empty();
        for (group, &count) in &self.counts {
            if count == 0 {
                continue;
            }
            if let Some(min) = group.min_firmware() {
                match firmware {
                    Some(fw) if fw >= min => {}
                    _ => continue,
                }
            }
            mask |= group.required_flags();
        }
        mask
    }
}

/// A live event subscription.
///
/// Produced by [`Z21Client::subscribe`](crate::Z21Client::subscribe);
/// delivers only the events matching its group. Hand it back to
/// [`Z21Client::unsubscribe`](crate::Z21Client::unsubscribe) when done so
/// the ledger can clear broadcast flags the station no longer needs to
/// push.
pub struct Subscription {
    pub(crate) group: EventGroup,
    pub(crate) receiver: broadcast::Receiver<Z21Event>,
}

impl Subscription {
    /// The group this subscription filters on.
    pub fn group(&self) -> EventGroup {
        self.group
    }

    /// Await the next event of this group.
    ///
    /// Lagged intervals are skipped silently; a closed channel (client
    /// dropped) surfaces as [`Error::ConnectionLost`].
    pub async fn recv(&mut self) -> Result<Z21Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.matches(self.group) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, group = ?self.group, "subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(Error::ConnectionLost),
            }
        }
    }

    /// Pop the next already-buffered event of this group, if any.
    pub fn try_recv(&mut self) -> Option<Z21Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.matches(self.group) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
