//! Property-based test strategies and runtime invariant checkers shared by
//! the DFTL engine's scenario and property test suites.

pub mod backend;
pub mod invariants;
pub mod strategies;
