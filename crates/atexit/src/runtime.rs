// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! The event loop abstraction and the Tokio-backed loop adapter.

use std::{
    cell::RefCell,
    fmt::Display,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::future::BoxFuture;
use tokio::runtime::{Builder, Runtime};

/// Stable identity for one event loop instance.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoopId(u64);

static LOOP_ID: AtomicU64 = AtomicU64::new(1);

impl LoopId {
    /// Allocates the next unused loop ID.
    #[must_use]
    pub fn next() -> Self {
        Self(LOOP_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the inner value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for LoopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "loop-{}", self.0)
    }
}

/// Narrow interface to an asynchronous execution context.
///
/// The registry needs exactly two capabilities from a loop: run a unit of
/// work to completion on it, and invoke its native (unpatched) close. Loop
/// implementations own scheduling and I/O multiplexing; none of that is
/// visible here.
pub trait EventLoop: Send + Sync + 'static {
    /// The stable identity of this loop.
    fn loop_id(&self) -> LoopId;

    /// Runs `work` to completion on this loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop cannot run the work, e.g. it is closed
    /// or currently running.
    fn run_until_complete(&self, work: BoxFuture<'static, ()>) -> anyhow::Result<()>;

    /// Closes the loop with its native, unpatched semantics.
    ///
    /// Must be idempotent: closing an already-closed loop is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying runtime fails to shut down.
    fn native_close(&self) -> anyhow::Result<()>;

    /// Whether the loop has been closed.
    fn is_closed(&self) -> bool;
}

/// Shared handle to an event loop.
pub type LoopRef = Arc<dyn EventLoop>;

thread_local! {
    static CURRENT_LOOP: RefCell<Vec<Weak<dyn EventLoop>>> = const { RefCell::new(Vec::new()) };
}

/// Returns the innermost loop entered on the calling thread, if still alive.
#[must_use]
pub fn current_loop() -> Option<LoopRef> {
    CURRENT_LOOP.with(|stack| stack.borrow().iter().rev().find_map(Weak::upgrade))
}

/// Marks `event_loop` as current for the calling thread until the returned
/// guard is dropped. Entries nest; the innermost live loop wins.
pub fn enter(event_loop: &LoopRef) -> LoopEnterGuard {
    CURRENT_LOOP.with(|stack| stack.borrow_mut().push(Arc::downgrade(event_loop)));
    LoopEnterGuard(())
}

/// RAII guard returned by [`enter`].
#[derive(Debug)]
pub struct LoopEnterGuard(());

impl Drop for LoopEnterGuard {
    fn drop(&mut self) {
        CURRENT_LOOP.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Event loop adapter over a current-thread [`tokio`] runtime.
///
/// One `TokioLoop` owns one runtime; work submitted through
/// [`block_on`](Self::block_on) executes on the calling thread, which gives
/// the single active execution context per loop that the registry relies on.
/// Dropping the last handle removes the loop's registry entry and cancels its
/// process-exit fallback.
#[derive(Debug)]
pub struct TokioLoop {
    id: LoopId,
    runtime: Mutex<Option<Runtime>>,
    self_ref: Weak<Self>,
}

impl TokioLoop {
    /// Creates a new loop backed by a fresh current-thread runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the Tokio runtime could not be built.
    pub fn new() -> anyhow::Result<Arc<Self>> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Arc::new_cyclic(|self_ref| Self {
            id: LoopId::next(),
            runtime: Mutex::new(Some(runtime)),
            self_ref: self_ref.clone(),
        }))
    }

    /// Runs `fut` to completion on this loop, entering it as the current loop
    /// for the duration so hooks can be registered without naming it.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop is closed or already running.
    pub fn block_on<F>(&self, fut: F) -> anyhow::Result<F::Output>
    where
        F: Future,
    {
        let guard = self
            .runtime
            .try_lock()
            .map_err(|_| anyhow::anyhow!("{} is already running", self.id))?;
        let runtime = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("{} is closed", self.id))?;
        let _enter = enter(&self.handle());
        Ok(runtime.block_on(fut))
    }

    /// Closes the loop, draining registered shutdown hooks first.
    ///
    /// Delegates to [`close`](crate::close), so hooks run even when callers
    /// reach closure through the adapter rather than the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop is currently running, or if the native
    /// close fails.
    pub fn close(&self) -> anyhow::Result<()> {
        crate::registry::close(&self.handle())
    }

    /// Shared handle usable wherever a [`LoopRef`] is expected.
    ///
    /// # Panics
    ///
    /// Panics if called while the loop is being destroyed.
    #[must_use]
    pub fn handle(&self) -> LoopRef {
        self.self_ref
            .upgrade()
            .expect("loop referenced after destruction")
    }
}

impl EventLoop for TokioLoop {
    fn loop_id(&self) -> LoopId {
        self.id
    }

    fn run_until_complete(&self, work: BoxFuture<'static, ()>) -> anyhow::Result<()> {
        let guard = self
            .runtime
            .try_lock()
            .map_err(|_| anyhow::anyhow!("{} is already running", self.id))?;
        match guard.as_ref() {
            Some(runtime) => {
                runtime.block_on(work);
                Ok(())
            }
            None => anyhow::bail!("{} is closed", self.id),
        }
    }

    fn native_close(&self) -> anyhow::Result<()> {
        let mut guard = self
            .runtime
            .try_lock()
            .map_err(|_| anyhow::anyhow!("Cannot close {} while it is running", self.id))?;
        if let Some(runtime) = guard.take() {
            // Background shutdown: closing must not block on worker cleanup
            runtime.shutdown_background();
            log::debug!("Closed {}", self.id);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.runtime.try_lock().is_ok_and(|guard| guard.is_none())
    }
}

impl Drop for TokioLoop {
    fn drop(&mut self) {
        crate::registry::remove(self.id);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::*;

    use super::{EventLoop, LoopId, TokioLoop, current_loop, enter};

    #[rstest]
    fn test_loop_ids_are_unique() {
        let a = LoopId::next();
        let b = LoopId::next();
        assert_ne!(a, b);
        assert!(a.as_u64() < b.as_u64());
    }

    #[rstest]
    fn test_loop_id_display() {
        let id = LoopId::next();
        assert_eq!(id.to_string(), format!("loop-{}", id.as_u64()));
    }

    #[rstest]
    fn test_no_current_loop_outside_block_on() {
        assert!(current_loop().is_none());
    }

    #[rstest]
    fn test_current_loop_inside_block_on() {
        let event_loop = TokioLoop::new().unwrap();
        let expected = event_loop.id;

        let observed = event_loop
            .block_on(async move { current_loop().map(|l| l.loop_id()) })
            .unwrap();

        assert_eq!(observed, Some(expected));
        assert!(current_loop().is_none());
    }

    #[rstest]
    fn test_enter_guard_nests() {
        let outer = TokioLoop::new().unwrap();
        let inner = TokioLoop::new().unwrap();

        let _outer_guard = enter(&outer.handle());
        {
            let _inner_guard = enter(&inner.handle());
            assert_eq!(current_loop().map(|l| l.loop_id()), Some(inner.id));
        }
        assert_eq!(current_loop().map(|l| l.loop_id()), Some(outer.id));
    }

    #[rstest]
    fn test_block_on_returns_value() {
        let event_loop = TokioLoop::new().unwrap();
        let value = event_loop.block_on(async { 40 + 2 }).unwrap();
        assert_eq!(value, 42);
    }

    #[rstest]
    fn test_native_close_is_idempotent() {
        let event_loop = TokioLoop::new().unwrap();
        assert!(!event_loop.is_closed());

        event_loop.native_close().unwrap();
        assert!(event_loop.is_closed());

        // Second close is a no-op
        event_loop.native_close().unwrap();
        assert!(event_loop.is_closed());
    }

    #[rstest]
    fn test_block_on_closed_loop_errors() {
        let event_loop = TokioLoop::new().unwrap();
        event_loop.native_close().unwrap();

        let result = event_loop.block_on(async {});
        assert!(result.unwrap_err().to_string().contains("is closed"));
    }

    #[rstest]
    fn test_reentrant_block_on_errors() {
        let event_loop = TokioLoop::new().unwrap();
        let inner = event_loop.clone();

        let result = event_loop
            .block_on(async move { inner.block_on(async {}) })
            .unwrap();

        assert!(result.unwrap_err().to_string().contains("already running"));
    }
}
