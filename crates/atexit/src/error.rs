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

//! Errors surfaced by the registration API.

use crate::runtime::LoopId;

/// Errors returned by [`register`](crate::register) and [`unregister`](crate::unregister).
///
/// Failures occurring *during* a closure sequence (callback errors, forced
/// closes at process exit) are reported to the log and swallowed rather than
/// surfaced here, since closure must always run to completion.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AtexitError {
    #[error("No event loop is currently running and no loop was provided")]
    NoRunningLoop,
    #[error("Event loop {0} is already closed")]
    LoopClosed(LoopId),
}
