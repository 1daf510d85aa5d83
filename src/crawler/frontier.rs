//! Frontier queue shared by the crawl worker pool.

use std::collections::{HashSet, VecDeque};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Mutex, Notify};

/// Outcome of offering a discovered URL to the frontier.
#[derive(Debug, PartialEq, Eq)]
pub enum Enqueue {
    Scheduled,
    /// The document key was already seen, this session or a previous one.
    Deduped,
    Closed,
}

/// Work queue for the crawler. URLs enter once per document key: the seen
/// set is checked and updated under a single lock, so two workers racing on
/// the same URL can never both schedule it.
pub struct Frontier {
    queue: Mutex<VecDeque<String>>,
    seen: Mutex<HashSet<String>>,
    in_flight: AtomicUsize,
    closed: AtomicBool,
    notify: Notify,
}

impl Frontier {
    /// `visited` is the key set rehydrated from the checkpoint store; those
    /// URLs are never fetched again, which is the resume-safety guarantee.
    pub fn new(visited: HashSet<String>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            seen: Mutex::new(visited),
            in_flight: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Offers a URL under its document key.
    pub async fn offer(&self, key: &str, url: &str) -> Enqueue {
        if self.closed.load(Ordering::Acquire) {
            return Enqueue::Closed;
        }

        if !self.mark_seen(key).await {
            return Enqueue::Deduped;
        }

        self.queue.lock().await.push_back(url.to_string());
        self.notify.notify_waiters();
        Enqueue::Scheduled
    }

    /// Inserts a key without queueing anything. Returns false when the key
    /// was already present.
    pub async fn mark_seen(&self, key: &str) -> bool {
        self.seen.lock().await.insert(key.to_string())
    }

    /// Next URL to process. Parks until work arrives; returns `None` once
    /// the queue is drained with no task in flight, or after `close`.
    ///
    /// Every `Some` must be balanced by a `task_done` call, otherwise the
    /// pool never observes the drained state.
    pub async fn next_url(&self) -> Option<String> {
        loop {
            let mut notified = pin!(self.notify.notified());
            // Register before re-checking so a wakeup between the check and
            // the await is not lost.
            notified.as_mut().enable();

            if self.closed.load(Ordering::Acquire) {
                return None;
            }

            {
                let mut queue = self.queue.lock().await;
                if let Some(url) = queue.pop_front() {
                    self.in_flight.fetch_add(1, Ordering::AcqRel);
                    return Some(url);
                }
            }

            if self.in_flight.load(Ordering::Acquire) == 0 {
                // Drained: wake the other parked workers so they exit too.
                self.notify.notify_waiters();
                return None;
            }

            notified.await;
        }
    }

    /// Marks a task handed out by `next_url` as finished.
    pub fn task_done(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }
}
