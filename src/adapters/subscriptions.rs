//! Subscription bookkeeping for a clean-session MQTT client.
//!
//! The broker forgets every subscription when the session drops.  The
//! client's event callback marks the set stale on each `Connected`; the
//! dispatch task then replays all filters through
//! [`restore`](SubscriptionSet::restore).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::config::TOPIC_BUFFER_SIZE;

/// Topic filters one device subscribes to: start-next accepted, the two
/// update-result filters and stream data.
pub const MAX_SUBSCRIPTIONS: usize = 4;

type Filter = heapless::String<TOPIC_BUFFER_SIZE>;

#[derive(Debug, Default)]
pub struct SubscriptionSet {
    filters: heapless::Vec<Filter, MAX_SUBSCRIPTIONS>,
    stale: Arc<AtomicBool>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag shared with the transport callback.
    pub fn stale_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stale)
    }

    /// Record `filter`.  Returns `false` if it does not fit; a repeated
    /// filter is accepted once.
    pub fn add(&mut self, filter: &str) -> bool {
        if self.filters.iter().any(|f| f.as_str() == filter) {
            return true;
        }
        let mut stored = Filter::new();
        if stored.push_str(filter).is_err() || self.filters.push(stored).is_err() {
            warn!("MQTT: filter '{}' not recorded", filter);
            return false;
        }
        self.stale.store(true, Ordering::Release);
        true
    }

    pub fn filters(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(Filter::as_str)
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Replay every filter through `subscribe` if the set is stale.  Any
    /// failure leaves the set stale for the next call.  Returns the number
    /// of filters subscribed.
    pub fn restore<F>(&self, mut subscribe: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        if !self.stale.swap(false, Ordering::AcqRel) {
            return 0;
        }
        let mut done = 0;
        for filter in self.filters() {
            if subscribe(filter) {
                done += 1;
            } else {
                self.stale.store(true, Ordering::Release);
            }
        }
        if done > 0 {
            info!("MQTT: {} subscriptions restored", done);
        }
        done
    }
}
