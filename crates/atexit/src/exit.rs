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

//! Process-exit hook facility backing the forced-closure fallback.
//!
//! Wraps the host C runtime's `atexit(3)` behind a handle-based interface so
//! individual hooks can be cancelled, which `atexit(3)` itself does not
//! support. A single trampoline is installed on first use; pending hooks run
//! in registration order when the process exits normally. Relative order
//! against exit handlers registered elsewhere in the process is unspecified.

use std::sync::{Mutex, MutexGuard, Once, PoisonError};

/// Opaque handle used to cancel a registered process-exit hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ExitHookHandle(u64);

type ExitHookFn = Box<dyn FnOnce() + Send>;

struct ExitHooks {
    next_id: u64,
    hooks: Vec<(u64, ExitHookFn)>,
}

static EXIT_HOOKS: Mutex<ExitHooks> = Mutex::new(ExitHooks {
    next_id: 1,
    hooks: Vec::new(),
});

static INSTALL_TRAMPOLINE: Once = Once::new();

extern "C" fn run_exit_hooks() {
    run_all();
}

fn lock() -> MutexGuard<'static, ExitHooks> {
    // Keep draining even if a prior panic poisoned the lock.
    EXIT_HOOKS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registers `hook` to run when the process exits normally.
pub(crate) fn register(hook: impl FnOnce() + Send + 'static) -> ExitHookHandle {
    INSTALL_TRAMPOLINE.call_once(|| {
        // SAFETY: hands a plain `extern "C" fn()` to the C runtime; the
        // trampoline touches only synchronized statics.
        let rc = unsafe { libc::atexit(run_exit_hooks) };
        if rc != 0 {
            log::error!("Failed to install process-exit trampoline (atexit returned {rc})");
        }
    });

    let mut state = lock();
    let id = state.next_id;
    state.next_id += 1;
    state.hooks.push((id, Box::new(hook)));
    log::debug!("Registered process-exit hook {id}");
    ExitHookHandle(id)
}

/// Cancels a previously registered hook; an unknown or already-run handle is
/// a no-op.
pub(crate) fn cancel(handle: ExitHookHandle) {
    lock().hooks.retain(|(id, _)| *id != handle.0);
    log::debug!("Cancelled process-exit hook {}", handle.0);
}

/// Runs and removes every pending hook, in registration order.
///
/// Hooks are moved out of the lock before running so a hook may re-enter this
/// module (e.g. to cancel another handle) without deadlocking.
pub(crate) fn run_all() {
    let hooks = std::mem::take(&mut lock().hooks);
    for (_, hook) in hooks {
        hook();
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use rstest::*;

    use super::{cancel, register, run_all};
    use crate::testing::exclusive_exit_state;

    // The hook list is process-global, so tests drain it exclusively
    fn test_guard() -> std::sync::MutexGuard<'static, ()> {
        let guard = exclusive_exit_state();
        run_all();
        guard
    }

    #[rstest]
    fn test_hooks_run_once_in_registration_order() {
        let _guard = test_guard();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in 1..=3 {
            let order_clone = order.clone();
            register(move || order_clone.lock().unwrap().push(label));
        }

        run_all();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);

        // Already drained; a second pass must not re-run anything
        run_all();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[rstest]
    fn test_cancelled_hook_never_runs() {
        let _guard = test_guard();
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = count.clone();
        let handle = register(move || {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });
        cancel(handle);

        run_all();
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[rstest]
    fn test_cancel_after_run_is_noop() {
        let _guard = test_guard();
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = count.clone();
        let handle = register(move || {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });

        run_all();
        cancel(handle);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[rstest]
    fn test_hook_may_cancel_another_while_running() {
        let _guard = test_guard();
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = count.clone();
        let victim = register(move || {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });
        register(move || cancel(victim));

        // The victim was registered first, so it runs before the canceller;
        // the re-entrant cancel must simply not deadlock.
        run_all();
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
