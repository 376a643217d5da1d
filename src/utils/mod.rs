//! Shared utilities that are not specific to bundles or generations.

pub mod synchronization;

pub use synchronization::LockSet;
