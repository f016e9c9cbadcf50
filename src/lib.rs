// Copyright 2025 Johann Kempter
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
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # bytescope
//!
//! A control-flow and dataflow analysis engine for stack-machine bytecode,
//! built for static defect detection. `bytescope` consumes decoded method
//! bodies (instruction lists grouped into classes, delivered by an external
//! decoder), builds control flow graphs, runs pluggable lattice-based
//! dataflow analyses to a fixed point, and memoizes every result in a
//! dependency-aware, whole-run analysis cache keyed by stable method and
//! class identities.
//!
//! ## Features
//!
//! - **Exception-aware CFG construction** - basic blocks, typed edges
//!   (branches, switch dispatch, handler edges tagged with the guarded
//!   exception type), a single synthetic exit, dead-code flagging
//! - **Generic fixed-point solver** - one worklist engine for forward and
//!   backward analyses, bit-set and structured-frame facts alike, with
//!   iteration diagnostics and a convergence sanity bound
//! - **A catalog of concrete analyses** - value numbering, nullness with
//!   branch refinement, lock-state tracking, type tracking, live stores,
//!   constant propagation, return paths, dominators and orderings
//! - **Dependency-aware caching** - one factory per result type, recursive
//!   dependency resolution, per-key serialization under parallelism, memoized
//!   failures, and a definitive "unprofitable" outcome for oversized methods
//! - **Parallel-by-method execution** - rayon-driven fan-out with a
//!   read-mostly class hierarchy built up front and coarse cancellation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bytescope::prelude::*;
//!
//! let mut run = AnalysisRun::new(CacheConfig::default());
//! run.add_class(decoded_class);
//!
//! run.for_each_method(|ctx| {
//!     let cfg = ctx.cfg()?;
//!     let nullness = ctx.nullness()?;
//!     // ... feed detector logic ...
//!     Ok(())
//! })?;
//!
//! for report in run.collector().iter() {
//!     eprintln!("{report}");
//! }
//! # Ok::<(), bytescope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Dependency order, leaves first:
//!
//! - [`descriptor`] - interned class/method identities used as cache keys
//! - [`bytecode`] - the decoded-instruction boundary model
//! - [`utils`] - bit vectors and the directed-graph substrate
//! - [`analysis`] - CFG builder, generic dataflow framework, concrete
//!   analyses
//! - [`hierarchy`] - class hierarchy boundary and the error collector
//! - [`cache`] - the lazy, memoizing orchestrator and its engine catalog
//! - [`engine`] - the run driver and the detector-facing visit contract
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. Per-method failures (malformed
//! control structure, un-analyzable bytecode) are memoized by the cache and
//! never abort the run; missing classes degrade to conservative facts and are
//! collected once; programming errors (analysis dependency cycles,
//! non-convergence) are fatal by design. See [`Error`] for the taxonomy.

pub(crate) mod error;

pub mod analysis;
pub mod bytecode;
pub mod cache;
pub mod descriptor;
pub mod engine;
pub mod hierarchy;
pub mod prelude;
pub mod utils;

/// The error type covering every failure mode of the engine.
///
/// See the variant documentation for the recoverable/fatal split.
pub use error::Error;

/// Convenience alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The whole-run, dependency-aware analysis cache.
///
/// See [`cache::AnalysisCache`] for the memoization and concurrency
/// contract.
pub use cache::AnalysisCache;

/// The run driver: class registration, visit contract, parallel execution.
///
/// See [`engine::AnalysisRun`].
pub use engine::AnalysisRun;
