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

//! Shutdown callback handles registered against an event loop.

use std::{
    any::Any,
    fmt::{Debug, Display},
    panic::AssertUnwindSafe,
    sync::Arc,
};

use futures::{FutureExt, future::BoxFuture};
use ustr::Ustr;

type SyncFn = dyn Fn() -> anyhow::Result<()> + Send + Sync;
type AsyncFn = dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// A zero-argument shutdown hook, either synchronous or asynchronous.
///
/// Callbacks take no arguments; captures carry any state they need. Cloning
/// is shallow: clones share the underlying closure and compare equal, so the
/// clone a caller keeps can later unregister the one the registry holds.
#[derive(Clone)]
pub struct ShutdownCallback {
    name: Ustr,
    func: CallbackFn,
}

#[derive(Clone)]
enum CallbackFn {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl ShutdownCallback {
    /// Creates a synchronous callback with the given diagnostic `name`.
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: Ustr::from(name),
            func: CallbackFn::Sync(Arc::new(func)),
        }
    }

    /// Creates an asynchronous callback with the given diagnostic `name`.
    pub fn new_async<F, Fut>(name: &str, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: Ustr::from(name),
            func: CallbackFn::Async(Arc::new(move || func().boxed())),
        }
    }

    /// The callback's diagnostic name.
    #[must_use]
    pub const fn name(&self) -> Ustr {
        self.name
    }

    /// Whether the callback is asynchronous.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self.func, CallbackFn::Async(_))
    }

    /// Invokes the callback, containing panics as errors.
    ///
    /// An asynchronous callback is awaited to completion before this returns;
    /// a panic raised while constructing or awaiting its future is contained
    /// the same way as a synchronous panic.
    pub(crate) async fn invoke(&self) -> anyhow::Result<()> {
        match &self.func {
            CallbackFn::Sync(func) => std::panic::catch_unwind(AssertUnwindSafe(|| func()))
                .unwrap_or_else(|payload| Err(panic_error(payload.as_ref()))),
            CallbackFn::Async(func) => {
                match std::panic::catch_unwind(AssertUnwindSafe(|| func())) {
                    Ok(fut) => AssertUnwindSafe(fut)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| Err(panic_error(payload.as_ref()))),
                    Err(payload) => Err(panic_error(payload.as_ref())),
                }
            }
        }
    }

    const fn kind(&self) -> &'static str {
        match self.func {
            CallbackFn::Sync(_) => "sync",
            CallbackFn::Async(_) => "async",
        }
    }
}

fn panic_error(payload: &(dyn Any + Send)) -> anyhow::Error {
    let msg = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload");
    anyhow::anyhow!("Callback panicked: {msg}")
}

/// Identity comparison: two handles are equal when they share a closure.
impl PartialEq for ShutdownCallback {
    fn eq(&self, other: &Self) -> bool {
        match (&self.func, &other.func) {
            (CallbackFn::Sync(a), CallbackFn::Sync(b)) => Arc::ptr_eq(a, b),
            (CallbackFn::Async(a), CallbackFn::Async(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for ShutdownCallback {}

impl Debug for ShutdownCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ShutdownCallback))
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish()
    }
}

impl Display for ShutdownCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
