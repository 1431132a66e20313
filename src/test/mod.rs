//! Shared fixtures for the unit tests of this crate.

pub(crate) mod factories;
