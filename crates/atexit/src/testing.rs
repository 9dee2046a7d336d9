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

//! Common test related helper functions.

use std::sync::{Mutex, MutexGuard, PoisonError};

static EXIT_STATE_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that touch the process-global exit-hook state.
///
/// Forced-closure tests drain the whole pending hook list, so any test that
/// registers hooks or simulates process exit must hold this guard for its
/// duration to avoid draining another test's hooks.
pub fn exclusive_exit_state() -> MutexGuard<'static, ()> {
    EXIT_STATE_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}
