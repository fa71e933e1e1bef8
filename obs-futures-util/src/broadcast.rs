use fnv::FnvHashMap;
use futures::{prelude::*, stream::FusedStream};
use parking_lot::Mutex;
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

/// A stream of the latest values published to a [`LatestValue`].
///
/// Unlike an mpsc channel, a slow subscriber never builds up a backlog: if several updates land
/// before it polls again, it only ever observes the most recent one. This is exactly the
/// semantics the pipeline's checkpoint (spec §3, §4.10) needs: a sink resubscribing after a gap
/// should see "where things stand now", not a replay of everything it missed.
pub struct LatestValueSubscriber<T> {
    id: usize,
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> LatestValueSubscriber<T> {
    fn new(inner: Arc<Mutex<Inner<T>>>) -> Self {
        let id = inner.lock().next_subscriber_id();
        Self { id, inner }
    }
}

impl<T: Clone> Stream for LatestValueSubscriber<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let id = self.id;
        let mut inner = self.inner.lock();
        if inner.publisher_dropped {
            if let Some(sub) = inner.subscribers.remove(&id) {
                if !sub.delivered {
                    return Poll::Ready(Some(inner.latest.clone()));
                }
            }
            Poll::Ready(None)
        } else if let Some(sub) = inner.subscribers.get_mut(&id) {
            if sub.delivered {
                sub.waker = Some(cx.waker().clone());
                Poll::Pending
            } else {
                sub.delivered = true;
                Poll::Ready(Some(inner.latest.clone()))
            }
        } else {
            Poll::Ready(None)
        }
    }
}

impl<T: Clone> FusedStream for LatestValueSubscriber<T> {
    fn is_terminated(&self) -> bool {
        let inner = self.inner.lock();
        inner.publisher_dropped && !inner.subscribers.contains_key(&self.id)
    }
}

impl<T> Unpin for LatestValueSubscriber<T> {}

impl<T> Clone for LatestValueSubscriber<T> {
    fn clone(&self) -> Self {
        LatestValueSubscriber::new(self.inner.clone())
    }
}

impl<T> Drop for LatestValueSubscriber<T> {
    fn drop(&mut self) {
        self.inner.lock().subscribers.remove(&self.id);
    }
}

/// A cell whose updates can be observed by any number of [`LatestValueSubscriber`] streams.
///
/// Used by the sequencer (spec §4.10) to publish checkpoint updates and by the ring buffer to
/// wake `subscribe`d sinks without holding the delivery lock while they run.
#[derive(Debug, Clone)]
pub struct LatestValue<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> LatestValue<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new(value))),
        }
    }

    pub fn subscribe(&self) -> LatestValueSubscriber<T> {
        LatestValueSubscriber::new(self.inner.clone())
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Publishes a new value and wakes every subscriber currently parked on the old one.
    ///
    /// Never fails, even with zero subscribers: an unobserved update is simply overwritten by
    /// the next one, matching the backpressure policy in spec §5 (sinks, not producers, absorb
    /// slowness).
    pub fn set(&self, value: T) {
        self.inner.lock().set(value)
    }

    pub fn get_cloned(&self) -> T
    where
        T: Clone,
    {
        self.inner.lock().latest.clone()
    }
}

#[derive(Debug)]
struct Subscription {
    delivered: bool,
    waker: Option<Waker>,
}

#[derive(Debug)]
struct Inner<T> {
    latest: T,
    next_id: usize,
    subscribers: FnvHashMap<usize, Subscription>,
    publisher_dropped: bool,
}

impl<T> Inner<T> {
    fn new(value: T) -> Self {
        Self {
            latest: value,
            next_id: 0,
            subscribers: FnvHashMap::default(),
            publisher_dropped: false,
        }
    }

    fn next_subscriber_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.insert(
            id,
            Subscription {
                delivered: false,
                waker: None,
            },
        );
        id
    }

    fn set(&mut self, value: T) {
        self.latest = value;
        for sub in self.subscribers.values_mut() {
            sub.delivered = false;
            if let Some(waker) = sub.waker.take() {
                waker.wake();
            }
        }
    }
}

impl<T> Drop for LatestValue<T> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        inner.publisher_dropped = true;
        for sub in inner.subscribers.values_mut() {
            if let Some(waker) = sub.waker.take() {
                waker.wake();
            }
        }
    }
}
