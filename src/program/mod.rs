//! In-memory model of a group of JVM classes.
//!
//! This is the structure the class-file loader hands to the engine and receives back,
//! mutated, for re-encoding. It carries exactly what the analyses and passes need:
//! classes with their hierarchy links, field and method declarations, and decoded method
//! bodies.
//!
//! # Key Components
//!
//! - [`Program`] - The class group, with JVMS-style member resolution
//! - [`ClassFile`], [`Field`], [`Method`] - Declarations
//! - [`Code`] and [`Instruction`] - Mutable instruction sequences with stable ids
//! - [`CodeAssembler`] - Fluent construction of bodies
//! - [`ValueType`] and [`MethodDescriptor`] - Parsed descriptors
//!
//! # Resolution
//!
//! Field and method references name the class they were *compiled against*, which is
//! not necessarily the declaring class. [`Program::resolve_field`] and
//! [`Program::resolve_method`] follow the JVM resolution order within the program and
//! return a reference to the declaring class, or `None` when the member lives in a
//! library outside the group.

mod assembler;
mod class;
mod code;
mod descriptor;
mod flags;
mod instruction;
mod members;

pub use assembler::CodeAssembler;
pub use class::{ClassFile, Field, Method};
pub use code::Code;
pub use descriptor::{MethodDescriptor, ValueType};
pub use flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
pub use instruction::{
    ArithmeticOp, Condition, Constant, Instruction, InstructionId, InstructionKind, InvokeKind,
    LocalType, LocalVariable, NumericType, StackEffect,
};
pub use members::{FieldRef, MethodRef};

use std::collections::HashSet;

use crate::{Error, Result};

/// A group of classes analysed and transformed together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    classes: Vec<ClassFile>,
}

impl Program {
    /// Creates an empty program.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class.
    #[must_use]
    pub fn with_class(mut self, class: ClassFile) -> Self {
        self.classes.push(class);
        self
    }

    /// Adds a class.
    pub fn add_class(&mut self, class: ClassFile) {
        self.classes.push(class);
    }

    /// All classes, in load order.
    #[must_use]
    pub fn classes(&self) -> &[ClassFile] {
        &self.classes
    }

    /// Mutable access to all classes.
    pub fn classes_mut(&mut self) -> &mut [ClassFile] {
        &mut self.classes
    }

    /// Looks up a class by internal name.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassFile> {
        self.classes.iter().find(|c| c.name() == name)
    }

    /// Looks up a class by internal name for mutation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if the class is not part of the program.
    pub fn class_mut(&mut self, name: &str) -> Result<&mut ClassFile> {
        self.classes
            .iter_mut()
            .find(|c| c.name() == name)
            .ok_or_else(|| Error::ClassNotFound(name.to_string()))
    }

    /// Total number of declared fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.classes.iter().map(|c| c.fields.len()).sum()
    }

    /// Total number of declared methods.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.classes.iter().map(|c| c.methods.len()).sum()
    }

    /// Total number of instructions over all method bodies.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.classes
            .iter()
            .flat_map(|c| &c.methods)
            .filter_map(|m| m.code.as_ref())
            .map(Code::len)
            .sum()
    }

    /// Resolves a field reference to its declaring class (JVMS §5.4.3.2).
    ///
    /// Looks at the named class, then its superinterfaces recursively, then its
    /// superclass chain. Returns `None` if resolution leaves the program.
    #[must_use]
    pub fn resolve_field(&self, field: &FieldRef) -> Option<FieldRef> {
        let mut visited = HashSet::new();
        self.resolve_field_in(field.class(), field, &mut visited)
    }

    fn resolve_field_in<'a>(
        &'a self,
        class_name: &'a str,
        field: &FieldRef,
        visited: &mut HashSet<&'a str>,
    ) -> Option<FieldRef> {
        if !visited.insert(class_name) {
            return None;
        }

        let class = self.class(class_name)?;
        if class.field(field.name(), field.descriptor()).is_some() {
            return Some(field.with_class(class_name));
        }

        for interface in class.interfaces() {
            if let Some(found) = self.resolve_field_in(interface, field, visited) {
                return Some(found);
            }
        }

        class
            .super_name()
            .and_then(|parent| self.resolve_field_in(parent, field, visited))
    }

    /// Resolves a method reference to its declaring class (JVMS §5.4.3.3).
    ///
    /// Looks at the named class and its superclass chain, then at the superinterfaces
    /// of every class on that chain. Returns `None` if resolution leaves the program.
    #[must_use]
    pub fn resolve_method(&self, method: &MethodRef) -> Option<MethodRef> {
        let chain = self.superclass_chain(method.class());
        for class in &chain {
            if class.method(method.name(), method.descriptor()).is_some() {
                return Some(method.with_class(class.name()));
            }
        }

        let mut visited = HashSet::new();
        let mut pending: Vec<&str> = chain
            .iter()
            .flat_map(|c| c.interfaces().iter().map(String::as_str))
            .collect();
        while let Some(name) = pending.pop() {
            if !visited.insert(name) {
                continue;
            }
            if let Some(interface) = self.class(name) {
                if interface
                    .method(method.name(), method.descriptor())
                    .is_some()
                {
                    return Some(method.with_class(name));
                }
                pending.extend(interface.interfaces().iter().map(String::as_str));
            }
        }

        None
    }

    /// The class named `name` followed by its superclasses, as far as they are part of
    /// the program.
    #[must_use]
    pub fn superclass_chain(&self, name: &str) -> Vec<&ClassFile> {
        let mut chain: Vec<&ClassFile> = Vec::new();
        let mut current = self.class(name);
        while let Some(class) = current {
            if chain.iter().any(|c| c.name() == class.name()) {
                break;
            }
            chain.push(class);
            current = class.super_name().and_then(|parent| self.class(parent));
        }
        chain
    }

    /// Returns `true` if some ancestor of `name` (superclass or interface, transitively)
    /// lies outside the program and is not `java/lang/Object`.
    ///
    /// Methods of such classes may override library methods and be called by library
    /// code, so they cannot be judged unused from the program alone.
    #[must_use]
    pub fn has_library_ancestor(&self, name: &str) -> bool {
        let mut visited = HashSet::new();
        let mut pending = vec![name];
        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            match self.class(current) {
                Some(class) => {
                    pending.extend(class.super_name());
                    pending.extend(class.interfaces().iter().map(String::as_str));
                }
                None if current != "java/lang/Object" => return true,
                None => {}
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories::hierarchy_program;

    #[test]
    fn test_resolve_field_through_hierarchy() {
        let program = hierarchy_program();

        // Declared on the named class
        let direct = FieldRef::new("test/Base", "count", "I").unwrap();
        assert_eq!(program.resolve_field(&direct), Some(direct.clone()));

        // Inherited from the superclass
        let inherited = FieldRef::new("test/Child", "count", "I").unwrap();
        assert_eq!(program.resolve_field(&inherited), Some(direct));

        // Interface constant reached through the superclass
        let constant = FieldRef::new("test/Child", "LIMIT", "I").unwrap();
        assert_eq!(
            program.resolve_field(&constant),
            Some(constant.with_class("test/Limits"))
        );

        // Library field
        let out = FieldRef::new("java/lang/System", "out", "Ljava/io/PrintStream;").unwrap();
        assert_eq!(program.resolve_field(&out), None);

        // Wrong descriptor does not resolve
        let wrong = FieldRef::new("test/Child", "count", "J").unwrap();
        assert_eq!(program.resolve_field(&wrong), None);
    }

    #[test]
    fn test_resolve_method() {
        let program = hierarchy_program();

        let inherited = MethodRef::new("test/Child", "work", "()V").unwrap();
        assert_eq!(
            program.resolve_method(&inherited).unwrap().class(),
            "test/Base"
        );

        let library = MethodRef::new("test/Child", "hashCode", "()I").unwrap();
        assert_eq!(program.resolve_method(&library), None);
    }

    #[test]
    fn test_library_ancestors() {
        let program = hierarchy_program();
        assert!(!program.has_library_ancestor("test/Child"));
        assert!(program.has_library_ancestor("test/Worker"));
        assert_eq!(program.superclass_chain("test/Child").len(), 2);
    }

    #[test]
    fn test_class_lookup() {
        let mut program = hierarchy_program();
        assert!(program.class("test/Base").is_some());
        assert!(matches!(
            program.class_mut("test/Missing"),
            Err(Error::ClassNotFound(name)) if name == "test/Missing"
        ));
    }
}
