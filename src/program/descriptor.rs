//! JVM type and method descriptor parsing.
//!
//! Descriptors arrive as raw strings from the class-file loader (`I`, `Ljava/lang/String;`,
//! `(IJ[Ljava/lang/Object;)V`, ...). The analysis only needs the *stack* view of a type,
//! so sub-int primitives collapse to [`ValueType::Int`] and arrays are kept as references
//! named by their full descriptor.

use std::fmt;

use crate::Result;

/// The semantic type tag of a value on the simulated operand stack.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    /// `int`, and the sub-int types `byte`, `char`, `short`, `boolean`
    Int,
    /// `long` (category 2)
    Long,
    /// `float`
    Float,
    /// `double` (category 2)
    Double,
    /// Object or array reference. Arrays keep their descriptor (`[I`).
    Reference(String),
    /// The `null` literal
    Null,
}

impl ValueType {
    /// Parses a complete field descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is empty, names `void`, or
    /// has trailing characters.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let (ty, next) = parse_type_at(descriptor, 0)?;
        if next != descriptor.len() {
            return Err(malformed_error!(
                "Trailing characters in field descriptor '{}'",
                descriptor
            ));
        }

        Ok(ty)
    }

    /// Returns a reference type for the given internal class name.
    #[must_use]
    pub fn reference(class: &str) -> Self {
        ValueType::Reference(class.to_string())
    }

    /// Returns `true` for category-2 types, which occupy two local slots.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, ValueType::Long | ValueType::Double)
    }

    /// Number of local-variable slots this type occupies.
    #[must_use]
    pub fn slots(&self) -> u16 {
        if self.is_wide() {
            2
        } else {
            1
        }
    }

    /// Returns `true` for references and `null`.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, ValueType::Reference(_) | ValueType::Null)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int => write!(f, "int"),
            ValueType::Long => write!(f, "long"),
            ValueType::Float => write!(f, "float"),
            ValueType::Double => write!(f, "double"),
            ValueType::Reference(name) => write!(f, "{name}"),
            ValueType::Null => write!(f, "null"),
        }
    }
}

/// A parsed method descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodDescriptor {
    /// Parameter types, in declaration order
    pub params: Vec<ValueType>,
    /// Return type, `None` for `void`
    pub ret: Option<ValueType>,
}

impl MethodDescriptor {
    /// Parses a method descriptor such as `(ILjava/lang/String;)V`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for a missing parameter list, an invalid
    /// parameter or return type, or trailing characters.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(malformed_error!(
                "Method descriptor '{}' does not start with '('",
                descriptor
            ));
        }

        let mut params = Vec::new();
        let mut pos = 1;
        loop {
            match bytes.get(pos) {
                Some(b')') => {
                    pos += 1;
                    break;
                }
                Some(_) => {
                    let (ty, next) = parse_type_at(descriptor, pos)?;
                    params.push(ty);
                    pos = next;
                }
                None => {
                    return Err(malformed_error!(
                        "Unterminated parameter list in '{}'",
                        descriptor
                    ))
                }
            }
        }

        let ret = if bytes.get(pos) == Some(&b'V') {
            pos += 1;
            None
        } else {
            let (ty, next) = parse_type_at(descriptor, pos)?;
            pos = next;
            Some(ty)
        };

        if pos != bytes.len() {
            return Err(malformed_error!(
                "Trailing characters in method descriptor '{}'",
                descriptor
            ));
        }

        Ok(MethodDescriptor { params, ret })
    }

    /// Number of local slots taken by the parameters (excluding `this`).
    #[must_use]
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(ValueType::slots).sum()
    }
}

/// Parses one type starting at `pos`, returning it and the position after it.
fn parse_type_at(descriptor: &str, pos: usize) -> Result<(ValueType, usize)> {
    let bytes = descriptor.as_bytes();
    let Some(&tag) = bytes.get(pos) else {
        return Err(malformed_error!(
            "Unexpected end of descriptor '{}' at {}",
            descriptor,
            pos
        ));
    };

    match tag {
        b'B' | b'C' | b'S' | b'Z' | b'I' => Ok((ValueType::Int, pos + 1)),
        b'J' => Ok((ValueType::Long, pos + 1)),
        b'F' => Ok((ValueType::Float, pos + 1)),
        b'D' => Ok((ValueType::Double, pos + 1)),
        b'L' => {
            let end = descriptor[pos..].find(';').map(|off| pos + off).ok_or_else(|| {
                malformed_error!("Unterminated class name in '{}'", descriptor)
            })?;
            if end == pos + 1 {
                return Err(malformed_error!("Empty class name in '{}'", descriptor));
            }
            Ok((ValueType::reference(&descriptor[pos + 1..end]), end + 1))
        }
        b'[' => {
            let mut dims = pos;
            while bytes.get(dims) == Some(&b'[') {
                dims += 1;
            }
            // Validate the element type, but keep the whole array descriptor as the name
            let (_, next) = parse_type_at(descriptor, dims)?;
            Ok((ValueType::reference(&descriptor[pos..next]), next))
        }
        other => Err(malformed_error!(
            "Invalid type tag '{}' in descriptor '{}'",
            char::from(other),
            descriptor
        )),
    }
}
