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

//! Client-side networking core: a request pipeline of composable round-trip
//! wrappers, a response-adaptive rate limiter, API-key and OAuth2 credential
//! providers, a retrying HTTP client, and a parallel file-transfer engine
//! (generic HTTP range downloads plus S3/GCS/Azure reference downloads)
//! orchestrated by a bounded-concurrency transfer manager.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

pub mod backoff;
pub mod credentials;
pub mod http;
pub mod operation;
pub mod ratelimiter;
pub mod transfer;
