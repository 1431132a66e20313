//! Unused field removal.
//!
//! Obfuscators pad classes with fields that no instruction ever touches. This pass
//! collects every field referenced by a field-access instruction anywhere in the
//! program, resolved to the class that actually declares it, and deletes every
//! declared field outside that set.
//!
//! # Algorithm
//!
//! 1. Scan all method bodies in parallel; each `getfield`, `putfield`, `getstatic` and
//!    `putstatic` adds its resolved field to a concurrent set. References that resolve
//!    outside the program name library fields and are ignored.
//! 2. Once the scan is complete, remove every declared field missing from the set.
//!
//! Instruction sequences are never modified, so no method needs to be re-analysed.
//! The pass is idempotent: a second run over its own output removes nothing.

use std::collections::HashSet;

use dashmap::DashSet;
use rayon::prelude::*;

use crate::{
    deobfuscation::{
        changes::{EventKind, EventLog},
        context::AnalysisContext,
        pass::DeobfuscationPass,
    },
    program::{ClassFile, FieldRef, Method, Program},
    Result,
};

/// Removes fields that no instruction in the program references.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnusedFieldsPass;

impl UnusedFieldsPass {
    /// Creates a new unused-field pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Collects the resolved targets of every field-access instruction in `program`.
    ///
    /// # Arguments
    ///
    /// * `program` - The program to scan.
    ///
    /// # Returns
    ///
    /// The set of used fields, each keyed by its declaring class.
    #[must_use]
    pub fn used_fields(program: &Program) -> HashSet<FieldRef> {
        let used = DashSet::new();

        program.classes().par_iter().for_each(|class| {
            for instruction in class
                .methods
                .iter()
                .filter_map(|method| method.code.as_ref())
                .flat_map(|code| code.iter())
            {
                if let Some(resolved) = instruction
                    .kind()
                    .field()
                    .and_then(|field| program.resolve_field(field))
                {
                    used.insert(resolved);
                }
            }
        });

        used.into_iter().collect()
    }

    /// Deletes every declared field of `program` that is not in `used`.
    ///
    /// # Returns
    ///
    /// The removed fields.
    pub fn remove_unused(program: &mut Program, used: &HashSet<FieldRef>) -> Vec<FieldRef> {
        let mut removed = Vec::new();

        for class in program.classes_mut() {
            let unused: Vec<FieldRef> = class
                .fields
                .iter()
                .map(|field| field.reference(class.name()))
                .filter(|field| !used.contains(field))
                .collect();

            for field in unused {
                if class.remove_field(field.name(), field.descriptor()).is_some() {
                    removed.push(field);
                }
            }
        }

        removed
    }

    /// Runs the pass over `program` without recording events.
    ///
    /// # Returns
    ///
    /// The number of removed fields.
    pub fn run(&self, program: &mut Program) -> usize {
        let used = Self::used_fields(program);
        Self::remove_unused(program, &used).len()
    }
}

impl DeobfuscationPass for UnusedFieldsPass {
    fn name(&self) -> &'static str {
        "unused-fields"
    }

    fn description(&self) -> &'static str {
        "Removes fields that no instruction reads or writes"
    }

    fn is_global(&self) -> bool {
        true
    }

    fn should_run(&self, _class: &ClassFile, _method: &Method, _ctx: &AnalysisContext) -> bool {
        false
    }

    fn run_on_method(
        &self,
        _class: &str,
        _method: &mut Method,
        _ctx: &AnalysisContext,
    ) -> Result<bool> {
        Ok(false)
    }

    fn run_global(&self, program: &mut Program, ctx: &AnalysisContext) -> Result<bool> {
        let used = Self::used_fields(program);
        let removed = Self::remove_unused(program, &used);
        if removed.is_empty() {
            return Ok(false);
        }

        let changes = EventLog::new();
        for field in &removed {
            changes
                .record(EventKind::FieldRemoved)
                .message(format!("{field} ({} used fields)", used.len()));
        }
        ctx.events.merge(changes);
        Ok(true)
    }
}
