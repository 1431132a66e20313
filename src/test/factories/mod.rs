//! Factories for small, hand-assembled programs.

mod program;

pub(crate) use program::{broken_program, fields_program, hierarchy_program};
