//! Optimistic updates with rollback.
//!
//! A mutation first changes the locally displayed value, then calls the
//! backend. If the backend refuses, the displayed value goes back to what
//! it was before. [`MutationGate`] keeps at most one unsettled mutation per
//! item, so a rollback never restores over a newer optimistic value.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::lock::{MutexExt, RwLockExt};

/// Where a view keeps the value an optimistic update changes.
pub trait StateSlot<T>: Send + Sync {
    fn load(&self) -> T;
    fn store(&self, value: T);
}

impl<T> StateSlot<T> for RwLock<T>
where
    T: Clone + Send + Sync,
{
    fn load(&self) -> T {
        self.read_recovered("slot.load").clone()
    }

    fn store(&self, value: T) {
        *self.write_recovered("slot.store") = value;
    }
}

/// Stores are broadcast to every receiver of the channel.
impl<T> StateSlot<T> for watch::Sender<T>
where
    T: Clone + Send + Sync,
{
    fn load(&self) -> T {
        self.borrow().clone()
    }

    fn store(&self, value: T) {
        self.send_replace(value);
    }
}

impl<T, S> StateSlot<T> for Arc<S>
where
    S: StateSlot<T> + ?Sized,
{
    fn load(&self) -> T {
        (**self).load()
    }

    fn store(&self, value: T) {
        (**self).store(value);
    }
}

/// A slot made of a getter and a setter, for projecting one field out of
/// a larger piece of view state.
pub struct SlotFn<G, S> {
    get: G,
    set: S,
}

impl<G, S> SlotFn<G, S> {
    pub fn new(get: G, set: S) -> Self {
        Self { get, set }
    }
}

impl<T, G, S> StateSlot<T> for SlotFn<G, S>
where
    G: Fn() -> T + Send + Sync,
    S: Fn(T) + Send + Sync,
{
    fn load(&self) -> T {
        (self.get)()
    }

    fn store(&self, value: T) {
        (self.set)(value);
    }
}

/// Another mutation of the same item has not settled yet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("a change to `{item}` is already in flight")]
pub struct InFlight {
    pub item: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError<E> {
    #[error("a change to `{item}` is already in flight")]
    InFlight { item: String },
    #[error("mutation rejected: {0}")]
    Rejected(#[source] E),
}

impl<E> From<InFlight> for MutationError<E> {
    fn from(err: InFlight) -> Self {
        Self::InFlight { item: err.item }
    }
}

/// Tracks which items have an unsettled optimistic update.
#[derive(Clone, Default)]
pub struct MutationGate {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl MutationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the slot's value, replace it with `optimistic(&current)` and
    /// claim `item` until the returned handle is settled or dropped.
    pub fn begin<'a, T, S, O>(
        &self,
        item: impl Into<String>,
        slot: &'a S,
        optimistic: O,
    ) -> Result<Optimistic<'a, T>, InFlight>
    where
        T: Clone,
        S: StateSlot<T>,
        O: FnOnce(&T) -> T,
    {
        let item = item.into();
        if !self
            .in_flight
            .lock_recovered("gate.begin")
            .insert(item.clone())
        {
            debug!(item = %item, "Optimistic update refused, item busy");
            return Err(InFlight { item });
        }

        let previous = slot.load();
        let applied = optimistic(&previous);
        slot.store(applied.clone());
        debug!(item = %item, "Optimistic value applied");

        Ok(Optimistic {
            gate: self.clone(),
            item,
            slot,
            previous,
            applied,
            settled: false,
        })
    }

    pub fn is_in_flight(&self, item: &str) -> bool {
        self.in_flight.lock_recovered("gate.is_in_flight").contains(item)
    }

    fn release(&self, item: &str) {
        self.in_flight.lock_recovered("gate.release").remove(item);
    }
}

impl fmt::Debug for MutationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let in_flight = self.in_flight.lock_recovered("gate.debug").len();
        f.debug_struct("MutationGate")
            .field("in_flight", &in_flight)
            .finish()
    }
}

/// An applied, not yet confirmed, optimistic update.
///
/// Dropping it without calling [`confirm`](Self::confirm) or
/// [`settle`](Self::settle) restores the captured value.
#[must_use = "an unsettled optimistic update is rolled back on drop"]
pub struct Optimistic<'a, T: Clone> {
    gate: MutationGate,
    item: String,
    slot: &'a dyn StateSlot<T>,
    previous: T,
    applied: T,
    settled: bool,
}

impl<T: Clone> Optimistic<'_, T> {
    pub fn item(&self) -> &str {
        &self.item
    }

    pub fn applied(&self) -> &T {
        &self.applied
    }

    pub fn previous(&self) -> &T {
        &self.previous
    }

    /// Keep the optimistic value.
    pub fn confirm(mut self) {
        self.settled = true;
        debug!(item = %self.item, "Optimistic update confirmed");
    }

    /// Put the captured value back.
    pub fn rollback(mut self) {
        self.restore();
    }

    /// Confirm on `Ok`, roll back on `Err`, and hand the result back.
    pub fn settle<R, E>(self, result: Result<R, E>) -> Result<R, E> {
        match result {
            Ok(value) => {
                self.confirm();
                Ok(value)
            }
            Err(err) => {
                self.rollback();
                Err(err)
            }
        }
    }

    fn restore(&mut self) {
        self.slot.store(self.previous.clone());
        self.settled = true;
        warn!(item = %self.item, "Optimistic update rolled back");
    }
}

impl<T: Clone> Drop for Optimistic<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            self.restore();
        }
        self.gate.release(&self.item);
    }
}

/// Apply `optimistic` to `slot`, run `mutation` with the applied value, then
/// keep it on success or restore the previous value on failure.
pub async fn run_optimistic<T, S, O, M, Fut, R, E>(
    gate: &MutationGate,
    item: impl Into<String>,
    slot: &S,
    optimistic: O,
    mutation: M,
) -> Result<R, MutationError<E>>
where
    T: Clone,
    S: StateSlot<T>,
    O: FnOnce(&T) -> T,
    M: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let pending = gate.begin(item, slot, optimistic)?;
    let result = mutation(pending.applied().clone()).await;
    pending.settle(result).map_err(MutationError::Rejected)
}
