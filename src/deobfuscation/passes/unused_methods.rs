//! Unused method removal.
//!
//! Removes methods that no invocation in the program can reach. Dispatch makes this
//! less exact than field removal: `invokestatic` and `invokespecial` name their target
//! precisely and are resolved through the hierarchy, while `invokevirtual` and
//! `invokeinterface` may land on any override, so they keep every method with a
//! matching name and descriptor.
//!
//! Some methods are entry points the program itself never calls and are always kept:
//!
//! - constructors and static initializers
//! - `public static void main(String[])`
//! - abstract and native methods, which have no body to judge
//! - overrides of `java/lang/Object` methods
//! - instance methods of classes that extend or implement something outside the
//!   program, since library code may call them through an override

use std::collections::HashSet;

use dashmap::DashSet;
use rayon::prelude::*;

use crate::{
    deobfuscation::{
        changes::{EventKind, EventLog},
        context::AnalysisContext,
        pass::DeobfuscationPass,
    },
    program::{ClassFile, InstructionKind, InvokeKind, Method, MethodRef, Program},
    Result,
};

/// Virtual methods of `java/lang/Object` that subclasses routinely override.
const OBJECT_METHODS: &[(&str, &str)] = &[
    ("equals", "(Ljava/lang/Object;)Z"),
    ("hashCode", "()I"),
    ("toString", "()Ljava/lang/String;"),
    ("clone", "()Ljava/lang/Object;"),
    ("finalize", "()V"),
];

/// Every invocation target collected from a program.
#[derive(Debug, Default)]
pub struct MethodUsage {
    /// Resolved targets of `invokestatic` and `invokespecial`.
    pub exact: HashSet<MethodRef>,
    /// Name and descriptor of every `invokevirtual` and `invokeinterface` target.
    pub dispatched: HashSet<(String, String)>,
}

impl MethodUsage {
    /// Returns `true` if `method`, declared by `class`, may be invoked.
    #[must_use]
    pub fn is_used(&self, class: &str, method: &Method) -> bool {
        if self.exact.contains(&method.reference(class)) {
            return true;
        }
        !method.is_static()
            && self
                .dispatched
                .contains(&(method.name().to_string(), method.descriptor().to_string()))
    }
}

/// Removes methods that are never invoked.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnusedMethodsPass;

impl UnusedMethodsPass {
    /// Creates a new unused-method pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Scans every method body of `program` for invocations.
    #[must_use]
    pub fn collect_usage(program: &Program) -> MethodUsage {
        let exact = DashSet::new();
        let dispatched = DashSet::new();

        program.classes().par_iter().for_each(|class| {
            for instruction in class
                .methods
                .iter()
                .filter_map(|method| method.code.as_ref())
                .flat_map(|code| code.iter())
            {
                let InstructionKind::Invoke(kind, target) = instruction.kind() else {
                    continue;
                };
                match kind {
                    InvokeKind::Static | InvokeKind::Special => {
                        if let Some(resolved) = program.resolve_method(target) {
                            exact.insert(resolved);
                        }
                    }
                    InvokeKind::Virtual | InvokeKind::Interface => {
                        dispatched
                            .insert((target.name().to_string(), target.descriptor().to_string()));
                    }
                }
            }
        });

        MethodUsage {
            exact: exact.into_iter().collect(),
            dispatched: dispatched.into_iter().collect(),
        }
    }

    /// Returns `true` if `method` must be kept whether or not it is invoked.
    #[must_use]
    pub fn is_entry_point(program: &Program, class: &ClassFile, method: &Method) -> bool {
        if method.is_constructor() || method.is_static_initializer() || method.is_bodiless() {
            return true;
        }
        if method.is_static()
            && method.name() == "main"
            && method.descriptor() == "([Ljava/lang/String;)V"
        {
            return true;
        }
        if method.is_static() {
            return false;
        }
        OBJECT_METHODS
            .iter()
            .any(|&(name, descriptor)| method.name() == name && method.descriptor() == descriptor)
            || program.has_library_ancestor(class.name())
    }

    /// Removes every method that is neither an entry point nor used.
    ///
    /// # Returns
    ///
    /// The removed methods.
    pub fn remove_unused(program: &mut Program, usage: &MethodUsage) -> Vec<MethodRef> {
        let view: &Program = program;
        let doomed: Vec<MethodRef> = view
            .classes()
            .iter()
            .flat_map(|class| {
                class
                    .methods
                    .iter()
                    .filter(move |method| {
                        !Self::is_entry_point(view, class, method)
                            && !usage.is_used(class.name(), method)
                    })
                    .map(move |method| method.reference(class.name()))
            })
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for method in doomed {
            let Ok(class) = program.class_mut(method.class()) else {
                continue;
            };
            if class
                .remove_method(method.name(), method.descriptor())
                .is_some()
            {
                removed.push(method);
            }
        }
        removed
    }

    /// Runs the pass over `program` without recording events.
    ///
    /// # Returns
    ///
    /// The number of removed methods.
    pub fn run(&self, program: &mut Program) -> usize {
        let usage = Self::collect_usage(program);
        Self::remove_unused(program, &usage).len()
    }
}

impl DeobfuscationPass for UnusedMethodsPass {
    fn name(&self) -> &'static str {
        "unused-methods"
    }

    fn description(&self) -> &'static str {
        "Removes methods that are never invoked and are not entry points"
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
        let usage = Self::collect_usage(program);
        let removed = Self::remove_unused(program, &usage);
        if removed.is_empty() {
            return Ok(false);
        }

        let changes = EventLog::new();
        for method in &removed {
            changes
                .record(EventKind::MethodRemoved)
                .method(method)
                .message(format!("{method} is never invoked"));
        }
        ctx.events.merge(changes);
        Ok(true)
    }
}
