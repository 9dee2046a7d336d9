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

//! Process-exit style shutdown hooks scoped to asynchronous event loops.
//!
//! The `loop-atexit` crate lets applications register zero-argument callbacks
//! (synchronous or asynchronous) that run exactly once, in registration
//! order, immediately before an event loop is torn down, whether the loop is
//! closed explicitly through [`close`] or abandoned and reaped by the
//! process-exit fallback. This allows coroutine-style resources such as
//! connections or subprocesses to clean themselves up while their owning
//! loop can still run them.
//!
//! Hooks attach to a loop by identity and the registry holds only weak loop
//! references, so registering hooks never extends a loop's lifetime. Each
//! loop's hooks are fully independent: closing one loop never runs another's.
//!
//! ```no_run
//! use loop_atexit::{ShutdownCallback, TokioLoop, register};
//!
//! let event_loop = TokioLoop::new()?;
//! register(
//!     ShutdownCallback::new_async("flush_store", || async {
//!         // flush buffers, close connections, ...
//!         Ok(())
//!     }),
//!     Some(&event_loop.handle()),
//! )?;
//!
//! event_loop.block_on(async {
//!     // application work
//! })?;
//!
//! // Runs `flush_store` on the loop, then closes it
//! event_loop.close()?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Failures inside individual hooks are reported to the [`log`] facade and
//! never abort the closure sequence; only registration itself can fail, with
//! [`AtexitError`].

#![warn(rustc::all)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod callback;
pub mod error;
pub mod registry;
pub mod runtime;
pub mod testing;

mod exit;
mod runner;

pub use crate::{
    callback::ShutdownCallback,
    error::AtexitError,
    registry::{close, register, unregister},
    runtime::{EventLoop, LoopId, LoopRef, TokioLoop, current_loop},
};
