//! Classes and their members.

use crate::{
    program::{
        code::Code,
        descriptor::{MethodDescriptor, ValueType},
        flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags},
        members::{FieldRef, MethodRef},
    },
    Result,
};

/// A field declared by a class.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    name: String,
    descriptor: String,
    ty: ValueType,
    /// Access flags
    pub access: FieldAccessFlags,
}

impl Field {
    /// Creates a field declaration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn new(name: &str, descriptor: &str, access: FieldAccessFlags) -> Result<Self> {
        Ok(Field {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            ty: ValueType::parse(descriptor)?,
            access,
        })
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw field descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Stack type of the field's value.
    #[must_use]
    pub fn field_type(&self) -> &ValueType {
        &self.ty
    }

    /// Returns `true` if the field is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(FieldAccessFlags::STATIC)
    }

    /// A symbolic reference to this field as declared by `class`.
    #[must_use]
    pub fn reference(&self, class: &str) -> FieldRef {
        FieldRef::from_parts(class, &self.name, &self.descriptor, self.ty.clone())
    }
}

/// A method declared by a class.
#[derive(Clone, Debug, PartialEq)]
pub struct Method {
    name: String,
    descriptor: String,
    signature: MethodDescriptor,
    /// Access flags
    pub access: MethodAccessFlags,
    /// Body, absent for abstract and native methods
    pub code: Option<Code>,
}

impl Method {
    /// Creates a method declaration without a body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn new(name: &str, descriptor: &str, access: MethodAccessFlags) -> Result<Self> {
        Ok(Method {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: MethodDescriptor::parse(descriptor)?,
            access,
            code: None,
        })
    }

    /// Attaches a body.
    #[must_use]
    pub fn with_code(mut self, code: Code) -> Self {
        self.code = Some(code);
        self
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw method descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Parsed descriptor.
    #[must_use]
    pub fn signature(&self) -> &MethodDescriptor {
        &self.signature
    }

    /// Returns `true` if the method is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }

    /// Returns `true` for abstract and native methods, which never carry code.
    #[must_use]
    pub fn is_bodiless(&self) -> bool {
        self.access
            .intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE)
    }

    /// Returns `true` for `<init>`.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// Returns `true` for `<clinit>`.
    #[must_use]
    pub fn is_static_initializer(&self) -> bool {
        self.name == "<clinit>"
    }

    /// A symbolic reference to this method as declared by `class`.
    #[must_use]
    pub fn reference(&self, class: &str) -> MethodRef {
        MethodRef::from_parts(class, &self.name, &self.descriptor, self.signature.clone())
    }
}

/// One class of a [`crate::program::Program`].
#[derive(Clone, Debug, PartialEq)]
pub struct ClassFile {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    /// Access flags
    pub access: ClassAccessFlags,
    /// Declared fields, in declaration order
    pub fields: Vec<Field>,
    /// Declared methods, in declaration order
    pub methods: Vec<Method>,
}

impl ClassFile {
    /// Creates an empty class extending `super_name` (`None` only for `java/lang/Object`).
    #[must_use]
    pub fn new(name: &str, super_name: Option<&str>, access: ClassAccessFlags) -> Self {
        ClassFile {
            name: name.to_string(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            access,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Adds an implemented interface.
    #[must_use]
    pub fn with_interface(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Internal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Internal name of the superclass.
    #[must_use]
    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    /// Internal names of the directly implemented interfaces.
    #[must_use]
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Returns `true` if this is an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access.contains(ClassAccessFlags::INTERFACE)
    }

    /// Looks up a declared field by name and descriptor.
    #[must_use]
    pub fn field(&self, name: &str, descriptor: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor)
    }

    /// Looks up a declared method by name and descriptor.
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Removes a declared field, returning it.
    pub fn remove_field(&mut self, name: &str, descriptor: &str) -> Option<Field> {
        let pos = self
            .fields
            .iter()
            .position(|f| f.name == name && f.descriptor == descriptor)?;
        Some(self.fields.remove(pos))
    }

    /// Removes a declared method, returning it.
    pub fn remove_method(&mut self, name: &str, descriptor: &str) -> Option<Method> {
        let pos = self
            .methods
            .iter()
            .position(|m| m.name == name && m.descriptor == descriptor)?;
        Some(self.methods.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_members() {
        let mut class = ClassFile::new("a/B", Some("java/lang/Object"), ClassAccessFlags::PUBLIC)
            .with_field(Field::new("x", "I", FieldAccessFlags::PRIVATE).unwrap())
            .with_field(Field::new("x", "J", FieldAccessFlags::STATIC).unwrap())
            .with_method(Method::new("<init>", "()V", MethodAccessFlags::PUBLIC).unwrap());

        assert!(class.field("x", "J").unwrap().is_static());
        assert!(class.method("<init>", "()V").unwrap().is_constructor());
        assert_eq!(
            class.fields[0].reference("a/B"),
            FieldRef::new("a/B", "x", "I").unwrap()
        );

        let removed = class.remove_field("x", "I").unwrap();
        assert_eq!(removed.descriptor(), "I");
        assert!(class.field("x", "I").is_none());
        assert!(class.remove_field("x", "I").is_none());
        assert_eq!(class.fields.len(), 1);
    }

    #[test]
    fn test_method_flags() {
        let method = Method::new("run", "()V", MethodAccessFlags::ABSTRACT).unwrap();
        assert!(method.is_bodiless());
        assert!(!method.is_static());
        assert!(Method::new("run", "(V)V", MethodAccessFlags::empty()).is_err());
    }
}
