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

//! Sequential execution of pending shutdown callbacks.

use crate::callback::ShutdownCallback;

/// Runs `callbacks` in registration order, isolating per-callback failures.
///
/// Runs inside the owning loop. A later callback never starts before an
/// earlier one (sync or async) has fully finished, and a failing callback is
/// reported to the log and never aborts the drain.
pub(crate) async fn drain(callbacks: Vec<ShutdownCallback>) {
    for callback in callbacks {
        if let Err(e) = callback.invoke().await {
            log::error!("Unhandled error in shutdown callback '{callback}': {e:?}");
        }
    }
}
