//! Symbolic references to fields and methods.
//!
//! Field and method instructions name their target symbolically, exactly like a
//! constant-pool `Fieldref`/`Methodref`: owner class, member name and descriptor. The
//! descriptor is parsed once at construction so the interpreter can derive stack effects
//! without re-parsing.

use std::fmt;

use crate::{
    program::descriptor::{MethodDescriptor, ValueType},
    Result,
};

/// A reference to a field, as found in a field-access instruction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    class: String,
    name: String,
    descriptor: String,
    ty: ValueType,
}

impl FieldRef {
    /// Creates a field reference, parsing its descriptor.
    ///
    /// # Arguments
    ///
    /// * `class` - Internal name of the owner class (`com/example/Foo`)
    /// * `name` - Field name
    /// * `descriptor` - Field descriptor (`I`, `Ljava/lang/String;`, ...)
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn new(class: &str, name: &str, descriptor: &str) -> Result<Self> {
        let ty = ValueType::parse(descriptor)?;
        Ok(Self::from_parts(class, name, descriptor, ty))
    }

    pub(crate) fn from_parts(class: &str, name: &str, descriptor: &str, ty: ValueType) -> Self {
        FieldRef {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            ty,
        }
    }

    /// Internal name of the owner class.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
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

    /// The same name and descriptor, owned by another class.
    #[must_use]
    pub fn with_class(&self, class: &str) -> Self {
        FieldRef {
            class: class.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class, self.name, self.descriptor)
    }
}

/// A reference to a method, as found in an invocation instruction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef {
    class: String,
    name: String,
    descriptor: String,
    signature: MethodDescriptor,
}

impl MethodRef {
    /// Creates a method reference, parsing its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn new(class: &str, name: &str, descriptor: &str) -> Result<Self> {
        let signature = MethodDescriptor::parse(descriptor)?;
        Ok(Self::from_parts(class, name, descriptor, signature))
    }

    pub(crate) fn from_parts(
        class: &str,
        name: &str,
        descriptor: &str,
        signature: MethodDescriptor,
    ) -> Self {
        MethodRef {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature,
        }
    }

    /// Internal name of the owner class.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
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

    /// The same name and descriptor, owned by another class.
    #[must_use]
    pub fn with_class(&self, class: &str) -> Self {
        MethodRef {
            class: class.to_string(),
            ..self.clone()
        }
    }

    /// Returns `true` if this references an instance initializer (`<init>`).
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
    }
}
