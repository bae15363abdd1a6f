//! Process-wide map from request fingerprint to callback stack.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;

use crate::error::RequestError;
use super::executor::Outcome;
use super::request::{Method, Request};
use super::stack::{CallbackStack, NotificationSink, Subscriber};

/// Coalesces concurrent requests that share a fingerprint into one
/// exchange and fans the single result out to every subscriber.
///
/// All stack and map mutation happens under one lock, held only for the
/// mutation itself. Callbacks are never invoked under the lock; delivery
/// tasks are posted to the notification sink instead.
pub struct Registry {
    stacks: Mutex<HashMap<String, CallbackStack>>,
    sink: Arc<dyn NotificationSink>,
}

impl Registry {
    /// Create a registry delivering notifications through `sink`.
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            stacks: Mutex::new(HashMap::new()),
            sink,
        }
    }

    /// Attach a subscriber to the stack for `request`'s fingerprint.
    ///
    /// Returns `true` when a new stack was created with `request` as its
    /// driver: the caller must then start exactly one executor run.
    /// Returns `false` when the subscriber joined an existing stack and
    /// no new exchange may be started.
    pub fn subscribe(&self, request: &Request, subscriber: Arc<dyn Subscriber>) -> bool {
        let fingerprint = request.fingerprint();
        let mut stacks = self.stacks.lock();
        match stacks.get_mut(&fingerprint) {
            Some(stack) => {
                stack.push(subscriber, request);
                tracing::debug!(
                    fingerprint,
                    subscribers = stack.len(),
                    "joined in-flight request"
                );
                false
            }
            None => {
                let mut stack = CallbackStack::new(request.clone());
                stack.push(subscriber, request);
                stacks.insert(fingerprint, stack);
                true
            }
        }
    }

    /// Deliver the terminal outcome to every subscriber of the
    /// fingerprint's stack, in push order, then retire the stack. A
    /// no-op when the stack was already retired (cancellation emptied
    /// it).
    pub fn complete(&self, fingerprint: &str, outcome: Outcome) {
        let stack = self.stacks.lock().remove(fingerprint);
        let Some(stack) = stack else { return };
        let (_, subscribers) = stack.into_parts();
        self.sink.post(Box::new(move || {
            for subscriber in subscribers {
                subscriber.on_complete(&outcome);
            }
        }));
    }

    /// Broadcast transfer progress to the fingerprint's subscribers.
    /// Converts `(current, total)` to a percentage; unchanged values are
    /// suppressed.
    pub fn progress(&self, fingerprint: &str, current: u64, total: Option<u64>) {
        let percent = percent_of(current, total);
        let subscribers = {
            let mut stacks = self.stacks.lock();
            match stacks.get_mut(fingerprint) {
                Some(stack) => stack.progress(percent),
                None => None,
            }
        };
        if let Some(subscribers) = subscribers {
            self.sink.post(Box::new(move || {
                for subscriber in subscribers {
                    subscriber.on_progress(percent);
                }
            }));
        }
    }

    /// Cancel subscribers of one fingerprint. See [`CallbackStack::cancel`]
    /// for the tag/force semantics. Returns `true` when the stack was
    /// emptied and retired, which also flags the driver request so the
    /// executor winds down.
    pub fn cancel(&self, fingerprint: &str, tag: Option<&str>, force: bool) -> bool {
        let (removed, retired) = {
            let mut stacks = self.stacks.lock();
            let Some(stack) = stacks.get_mut(fingerprint) else {
                return false;
            };
            let removed = stack.cancel(tag, force);
            let retired = stack.is_empty();
            if retired {
                stack.driver().cancel();
                stacks.remove(fingerprint);
            }
            (removed, retired)
        };
        self.deliver_cancelled(removed);
        retired
    }

    /// Cancel matching subscribers across every in-flight stack.
    /// Returns the number of stacks fully retired.
    pub fn cancel_all(&self, tag: Option<&str>, force: bool) -> usize {
        self.cancel_where(|_| true, tag, force)
    }

    /// Criteria-based bulk cancellation: cancel every stack whose driver
    /// matches the method (if given) and whose URL matches the pattern.
    /// Returns the number of stacks fully retired.
    pub fn cancel_matching(
        &self,
        method: Option<Method>,
        url_pattern: &Regex,
        force: bool,
    ) -> usize {
        self.cancel_where(
            |driver| {
                method.is_none_or(|m| driver.method() == m) && url_pattern.is_match(driver.url())
            },
            None,
            force,
        )
    }

    /// Number of in-flight stacks.
    pub fn in_flight(&self) -> usize {
        self.stacks.lock().len()
    }

    fn cancel_where(
        &self,
        matches: impl Fn(&Request) -> bool,
        tag: Option<&str>,
        force: bool,
    ) -> usize {
        let mut removed = Vec::new();
        let retired = {
            let mut stacks = self.stacks.lock();
            let mut retired_keys = Vec::new();
            for (fingerprint, stack) in stacks.iter_mut() {
                if !matches(stack.driver()) {
                    continue;
                }
                removed.extend(stack.cancel(tag, force));
                if stack.is_empty() {
                    stack.driver().cancel();
                    retired_keys.push(fingerprint.clone());
                }
            }
            for key in &retired_keys {
                stacks.remove(key);
            }
            retired_keys.len()
        };
        self.deliver_cancelled(removed);
        retired
    }

    fn deliver_cancelled(&self, subscribers: Vec<Arc<dyn Subscriber>>) {
        if subscribers.is_empty() {
            return;
        }
        let outcome = Outcome::failure(None, RequestError::Cancelled);
        self.sink.post(Box::new(move || {
            for subscriber in subscribers {
                subscriber.on_complete(&outcome);
            }
        }));
    }
}

/// Convert transfer counters to a percentage. An unknown total reports
/// zero until completion is signalled elsewhere.
fn percent_of(current: u64, total: Option<u64>) -> u8 {
    match total {
        Some(0) => 100,
        Some(total) => ((current.saturating_mul(100)) / total).min(100) as u8,
        None => 0,
    }
}
