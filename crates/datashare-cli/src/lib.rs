// Copyright 2025 DataShare Authors
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

//! # DataShare CLI
//!
//! Command-line interface for DataShare providers and callers.
//!
//! - **Provider**: `datashare serve` runs the in-memory reference provider
//! - **Data**: `insert`, `update`, `query`, `delete` against a running provider
//! - **Observers**: `notify` and `watch` exercise change notifications
//! - **Published data**: `publish` and `get-published`
//!
//! ## Architecture
//!
//! The CLI uses the `argh` crate for argument parsing. Client commands go
//! through `datashare-client`'s helper; results are printed to stdout as
//! compact JSON for piping into other tools.

pub mod format;
