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

//! The per-loop shutdown hook registry and closure interception.
//!
//! One registry entry exists per live loop, created lazily on first use and
//! keyed by loop identity. Entries hold only a [`Weak`] loop reference, so
//! the registry never extends a loop's lifetime; the entry is removed when
//! the loop object itself is destroyed. Installing an entry also arms a
//! process-exit fallback which forces closure for loops the application
//! abandons without closing.

use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, Weak};

use ahash::AHashMap;

use crate::{
    callback::ShutdownCallback,
    error::AtexitError,
    exit::{self, ExitHookHandle},
    runner,
    runtime::{self, EventLoop, LoopId, LoopRef},
};

/// Per-loop registry state.
struct RegistryEntry {
    /// Non-owning reference to the loop.
    loop_ref: Weak<dyn EventLoop>,
    /// Pending callbacks in registration order; duplicates permitted.
    callbacks: Vec<ShutdownCallback>,
    /// Handle for cancelling the process-exit fallback.
    exit_hook: Option<ExitHookHandle>,
}

static REGISTRY: LazyLock<Mutex<AHashMap<LoopId, RegistryEntry>>> =
    LazyLock::new(|| Mutex::new(AHashMap::new()));

fn lock_registry() -> MutexGuard<'static, AHashMap<LoopId, RegistryEntry>> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Gets or creates the entry for `event_loop`, arming the process-exit
/// fallback on first use. Installation is idempotent: the membership check
/// guarantees at most one entry (and one fallback hook) per loop.
fn ensure_entry<'a>(
    map: &'a mut AHashMap<LoopId, RegistryEntry>,
    event_loop: &LoopRef,
) -> &'a mut RegistryEntry {
    let id = event_loop.loop_id();
    let entry = map.entry(id).or_insert_with(|| {
        log::debug!("Installing shutdown hook registry entry for {id}");
        RegistryEntry {
            loop_ref: Arc::downgrade(event_loop),
            callbacks: Vec::new(),
            exit_hook: Some(install_exit_hook(Arc::downgrade(event_loop))),
        }
    });
    debug_assert!(
        entry.loop_ref.ptr_eq(&Arc::downgrade(event_loop)),
        "registry entry for {id} bound to a different loop instance",
    );
    entry
}

fn install_exit_hook(loop_ref: Weak<dyn EventLoop>) -> ExitHookHandle {
    exit::register(move || force_close(&loop_ref))
}

/// Resolves the target loop: the explicit one if given, otherwise the loop
/// currently entered on this thread.
fn resolve_loop(event_loop: Option<&LoopRef>) -> Result<LoopRef, AtexitError> {
    let event_loop = match event_loop {
        Some(event_loop) => event_loop.clone(),
        None => runtime::current_loop().ok_or(AtexitError::NoRunningLoop)?,
    };
    if event_loop.is_closed() {
        return Err(AtexitError::LoopClosed(event_loop.loop_id()));
    }
    Ok(event_loop)
}

/// Registers `callback` to run when the target event loop closes.
///
/// Like a process-exit hook, but scoped to loop closure: the callback runs
/// exactly once, in registration order relative to other hooks on the same
/// loop, immediately before the loop is torn down. Registering the same
/// callback again queues an additional run.
///
/// With `event_loop` as `None` the currently entered loop is targeted.
///
/// # Errors
///
/// Returns an error if no loop was given and none is currently running, or
/// if the target loop is already closed.
pub fn register(
    callback: ShutdownCallback,
    event_loop: Option<&LoopRef>,
) -> Result<(), AtexitError> {
    let event_loop = resolve_loop(event_loop)?;
    let mut map = lock_registry();
    let entry = ensure_entry(&mut map, &event_loop);
    if entry.exit_hook.is_none() {
        // Re-arm after an unregister emptied the list and cancelled the hook
        entry.exit_hook = Some(install_exit_hook(Arc::downgrade(&event_loop)));
    }
    entry.callbacks.push(callback);
    Ok(())
}

/// Unregisters `callback` from the target event loop.
///
/// Removes **all** occurrences matching by callback identity; a callback that
/// was never registered is a silent no-op. When the last callback is removed
/// the loop's process-exit fallback is cancelled as well (a later
/// [`register`] re-arms it).
///
/// # Errors
///
/// Returns an error if no loop was given and none is currently running, or
/// if the target loop is already closed.
pub fn unregister(
    callback: &ShutdownCallback,
    event_loop: Option<&LoopRef>,
) -> Result<(), AtexitError> {
    let event_loop = resolve_loop(event_loop)?;
    let mut map = lock_registry();
    let entry = ensure_entry(&mut map, &event_loop);
    entry.callbacks.retain(|registered| registered != callback);
    if entry.callbacks.is_empty()
        && let Some(handle) = entry.exit_hook.take()
    {
        exit::cancel(handle);
    }
    Ok(())
}

/// Closes `event_loop`, draining its pending shutdown callbacks first.
///
/// This is the closure entry point applications call in place of the loop's
/// native close. The drain executes on the loop itself, strictly in
/// registration order; failures while draining are logged and swallowed so
/// closure always proceeds to the native close. Closing a loop nothing was
/// registered against behaves exactly like the native close.
///
/// # Errors
///
/// Returns an error if the loop's native close fails, e.g. when closure is
/// attempted from code running on the loop itself.
pub fn close(event_loop: &LoopRef) -> anyhow::Result<()> {
    let id = event_loop.loop_id();
    let (callbacks, exit_hook) = match lock_registry().get_mut(&id) {
        Some(entry) => (std::mem::take(&mut entry.callbacks), entry.exit_hook.take()),
        None => (Vec::new(), None),
    };

    if !callbacks.is_empty() {
        log::debug!("Draining {} shutdown callback(s) for {id}", callbacks.len());
        let _enter = runtime::enter(event_loop);
        if let Err(e) = event_loop.run_until_complete(Box::pin(runner::drain(callbacks))) {
            log::error!("Failed to drain shutdown callbacks for {id}: {e:?}");
        }
        // Hooks registered while draining die with the loop
        if let Some(entry) = lock_registry().get_mut(&id) {
            entry.callbacks.clear();
        }
    }

    if let Some(handle) = exit_hook {
        exit::cancel(handle);
    }

    event_loop.native_close()
}

/// Forced-closure path invoked by the process-exit fallback.
///
/// A loop that has already been dropped is skipped; failures are reported
/// and never propagate into process shutdown.
pub(crate) fn force_close(loop_ref: &Weak<dyn EventLoop>) {
    let Some(event_loop) = loop_ref.upgrade() else {
        return;
    };
    log::debug!("Forcing closure of {} at process exit", event_loop.loop_id());
    if let Err(e) = close(&event_loop) {
        log::error!("Failed to close {} at process exit: {e:?}", event_loop.loop_id());
    }
}

/// Removes the entry for a destroyed loop, cancelling its exit fallback.
///
/// Called from loop adapter destructors; loops without collector hooks get
/// their registry association severed here.
pub(crate) fn remove(id: LoopId) {
    let exit_hook = lock_registry().remove(&id).and_then(|entry| entry.exit_hook);
    if let Some(handle) = exit_hook {
        log::debug!("Removing shutdown hook registry entry for {id}");
        exit::cancel(handle);
    }
}
