//! Property-based tests for the refinement loop and its heuristics.
//!
//! - Selected indices always fall inside the candidate list
//! - Round estimates stay within `1..=max_rounds`
//! - Completed runs have one trace entry per round plus the initial one
//! - A judge that always keeps the current best never changes the answer
