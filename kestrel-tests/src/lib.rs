//! Kestrel Tests - deterministic scenario tests for Kestrel partition views.
//!
//! Every test runs a `ReplicatedPartition` over a simulated replica and a
//! simulated remote tier, drives the collaborators into a situation, and
//! checks what a protocol handler would observe.
//!
//! ## Test Organization
//!
//! **Scenario Tests** (`*_tests.rs`): cross-crate behavior
//! - `boundary_tests`: offset space invariants over seeded logs
//! - `truncation_tests`: prefix and suffix truncation against open queries
//! - `read_replica_tests`: boundaries and write rejection on read replicas
//! - `tiered_read_tests`: stitching local and remote data
//!
//! **Support Modules**:
//! - `properties`: offset space property checkers
//! - `scenarios`: harness, seeds, and tracing setup
//!
//! ## Naming Conventions
//!
//! - Scenario tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
pub mod scenarios;

#[cfg(test)]
mod truncation_tests;
