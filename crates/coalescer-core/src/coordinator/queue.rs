//! Pending request queue and homogeneous batch extraction.

use std::collections::VecDeque;
use std::fmt;

use tokio::sync::oneshot;

use crate::error::CoordinatorResult;

/// Which batch function a pending request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    Load,
    Save,
}

impl BatchKind {
    /// What the batch function receives, as named in error messages.
    pub fn subject(&self) -> &'static str {
        match self {
            BatchKind::Load => "keys",
            BatchKind::Save => "[key, value] entries",
        }
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKind::Load => f.write_str("load"),
            BatchKind::Save => f.write_str("save"),
        }
    }
}

/// Sending half of a caller's future.
pub(crate) type Responder<T> = oneshot::Sender<CoordinatorResult<T>>;

pub(crate) struct LoadRequest<K, V> {
    pub key: K,
    pub responder: Responder<V>,
}

pub(crate) struct SaveRequest<K, W, R> {
    pub key: K,
    pub value: W,
    pub responder: Responder<R>,
}

/// A batch removed from the queue, ready for dispatch.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Batch<L, S> {
    Load(Vec<L>),
    Save(Vec<S>),
}

impl<L, S> Batch<L, S> {
    pub fn kind(&self) -> BatchKind {
        match self {
            Batch::Load(_) => BatchKind::Load,
            Batch::Save(_) => BatchKind::Save,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Batch::Load(items) => items.len(),
            Batch::Save(items) => items.len(),
        }
    }
}

/// Consecutive requests of one kind, in arrival order.
enum Run<L, S> {
    Load(VecDeque<L>),
    Save(VecDeque<S>),
}

impl<L, S> Run<L, S> {
    fn len(&self) -> usize {
        match self {
            Run::Load(items) => items.len(),
            Run::Save(items) => items.len(),
        }
    }

    /// Splits off the first `count` items as a batch.
    fn take_front(&mut self, count: usize) -> Batch<L, S> {
        match self {
            Run::Load(items) => Batch::Load(items.drain(..count).collect()),
            Run::Save(items) => Batch::Save(items.drain(..count).collect()),
        }
    }

    fn into_batch(self) -> Batch<L, S> {
        match self {
            Run::Load(items) => Batch::Load(items.into()),
            Run::Save(items) => Batch::Save(items.into()),
        }
    }
}

/// FIFO of pending loads (`L`) and saves (`S`).
///
/// Requests are grouped into same-kind runs as they arrive, so a batch taken
/// from the front can never mix kinds.
pub(crate) struct PendingQueue<L, S> {
    runs: VecDeque<Run<L, S>>,
    len: usize,
}

impl<L, S> PendingQueue<L, S> {
    pub fn new() -> Self {
        Self {
            runs: VecDeque::new(),
            len: 0,
        }
    }

    pub fn push_load(&mut self, item: L) {
        match self.runs.back_mut() {
            Some(Run::Load(items)) => items.push_back(item),
            _ => self.runs.push_back(Run::Load(VecDeque::from([item]))),
        }
        self.len += 1;
    }

    pub fn push_save(&mut self, item: S) {
        match self.runs.back_mut() {
            Some(Run::Save(items)) => items.push_back(item),
            _ => self.runs.push_back(Run::Save(VecDeque::from([item]))),
        }
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Removes up to `limit` items from the front run.
    ///
    /// Returns `None` when the queue is empty. A batch always holds at least
    /// the head item, even for a `limit` of zero.
    pub fn take_batch(&mut self, limit: usize) -> Option<Batch<L, S>> {
        let front = self.runs.front_mut()?;
        let count = limit.clamp(1, front.len());

        let batch = if count == front.len() {
            self.runs.pop_front()?.into_batch()
        } else {
            front.take_front(count)
        };
        self.len -= batch.len();
        Some(batch)
    }

    /// Empties the queue, returning its runs as batches in arrival order.
    pub fn take_all(&mut self) -> Vec<Batch<L, S>> {
        self.len = 0;
        self.runs.drain(..).map(Run::into_batch).collect()
    }
}
