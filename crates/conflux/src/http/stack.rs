//! Subscriber stacks for coalesced requests.

use std::sync::Arc;

use super::executor::Outcome;
use super::request::Request;

/// A completion/progress listener attached to an in-flight request.
///
/// Implementations must be `Sync` because one subscriber list fans out
/// from the notification sink while the registry may still be appending.
pub trait Subscriber: Send + Sync {
    /// Called exactly once with the terminal outcome.
    fn on_complete(&self, outcome: &Outcome);

    /// Called with transfer progress as a percentage in `0..=100`.
    /// Values are strictly increasing; repeats and regressions are
    /// suppressed before this is invoked.
    fn on_progress(&self, _percent: u8) {}
}

/// A closure-backed [`Subscriber`].
pub struct Callbacks {
    complete: Box<dyn Fn(&Outcome) + Send + Sync>,
    progress: Option<Box<dyn Fn(u8) + Send + Sync>>,
}

impl Callbacks {
    /// Create a subscriber from a completion closure.
    pub fn new(complete: impl Fn(&Outcome) + Send + Sync + 'static) -> Self {
        Self {
            complete: Box::new(complete),
            progress: None,
        }
    }

    /// Attach a progress closure.
    pub fn on_progress(mut self, progress: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }
}

impl Subscriber for Callbacks {
    fn on_complete(&self, outcome: &Outcome) {
        (self.complete)(outcome);
    }

    fn on_progress(&self, percent: u8) {
        if let Some(progress) = &self.progress {
            progress(percent);
        }
    }
}

/// Where notifications are delivered.
///
/// The registry never invokes subscriber callbacks while holding its
/// lock; it posts a delivery task here instead. Applications with a
/// designated callback thread (a UI loop, an actor) provide their own
/// sink.
pub trait NotificationSink: Send + Sync {
    /// Run the delivery task.
    fn post(&self, task: Box<dyn FnOnce() + Send>);
}

/// A sink that delivers on the calling thread.
pub struct InlineSink;

impl NotificationSink for InlineSink {
    fn post(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

/// One subscriber plus the cancellability and tag copied from its
/// originating descriptor.
struct Entry {
    subscriber: Arc<dyn Subscriber>,
    cancellable: bool,
    tag: Option<String>,
}

/// The subscribers coalesced behind one in-flight request.
///
/// Holds the driver descriptor (the first one pushed, the only one
/// actually executed) and the subscriber list in push order. Progress
/// percentages are de-duplicated here so subscribers never see the same
/// value twice in a row.
pub struct CallbackStack {
    driver: Request,
    entries: Vec<Entry>,
    last_percent: Option<u8>,
}

impl CallbackStack {
    /// Create a stack for a newly in-flight request, driven by
    /// `driver`.
    pub fn new(driver: Request) -> Self {
        Self {
            driver,
            entries: Vec::new(),
            last_percent: None,
        }
    }

    /// The driver descriptor.
    pub fn driver(&self) -> &Request {
        &self.driver
    }

    /// Append a subscriber, recording cancellability and tag from its
    /// originating descriptor. It will be notified after all earlier
    /// ones.
    pub fn push(&mut self, subscriber: Arc<dyn Subscriber>, origin: &Request) {
        self.entries.push(Entry {
            subscriber,
            cancellable: origin.cancellable(),
            tag: origin.tag().map(str::to_string),
        });
    }

    /// Number of subscribers attached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no subscribers are attached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a progress percentage. Returns the subscribers to notify,
    /// or `None` when the value does not advance past the last one
    /// delivered.
    ///
    /// Delivered percentages are strictly increasing for the lifetime of
    /// the stack: an upload phase that reached 100 before the download
    /// starts, or a retry restarting the transfer, never rewinds what
    /// subscribers have already seen.
    pub fn progress(&mut self, percent: u8) -> Option<Vec<Arc<dyn Subscriber>>> {
        let percent = percent.min(100);
        if self.last_percent.is_some_and(|last| percent <= last) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(self.entries.iter().map(|e| e.subscriber.clone()).collect())
    }

    /// Remove every subscriber whose tag matches (all, when `tag` is
    /// `None`) and whose cancellability allows it (ignored when
    /// `force`). Returns the removed subscribers; if the stack is now
    /// empty the caller must set the driver's cancellation flag and
    /// retire the stack.
    pub fn cancel(&mut self, tag: Option<&str>, force: bool) -> Vec<Arc<dyn Subscriber>> {
        let mut removed = Vec::new();
        self.entries.retain(|entry| {
            let tag_matches = tag.is_none_or(|t| entry.tag.as_deref() == Some(t));
            if tag_matches && (force || entry.cancellable) {
                removed.push(entry.subscriber.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Dissolve the stack into its driver and subscriber list.
    pub fn into_parts(self) -> (Request, Vec<Arc<dyn Subscriber>>) {
        let subscribers = self.entries.into_iter().map(|e| e.subscriber).collect();
        (self.driver, subscribers)
    }
}
