// Copyright 2025 tinyrpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # tinyrpc CLI
//!
//! Command-line interface for running tinyrpc components:
//!
//! - **Servers**: serve the built-in [`arith`] demo service, optionally
//!   heartbeating to a registry
//! - **Registry**: the heartbeat registry servers announce themselves to
//! - **Calls**: one-off calls with JSON arguments, printing the raw JSON reply
//!
//! ## Key Commands
//!
//! - `tinyrpc serve`: start a server
//! - `tinyrpc registry`: start a registry
//! - `tinyrpc call`: make an RPC call (outputs raw JSON for scripting)

pub mod arith;
