//! Access flags for classes, fields and methods (JVMS §4.1, §4.5, §4.6).

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    /// Access and property flags of a class or interface
    pub struct ClassAccessFlags : u16 {
        /// Declared public; may be accessed from outside its package
        const PUBLIC = 0x0001;
        /// Declared final; no subclasses allowed
        const FINAL = 0x0010;
        /// Treat superclass methods specially when invoked by invokespecial
        const SUPER = 0x0020;
        /// Is an interface, not a class
        const INTERFACE = 0x0200;
        /// Declared abstract; must not be instantiated
        const ABSTRACT = 0x0400;
        /// Not present in the source code
        const SYNTHETIC = 0x1000;
        /// Declared as an annotation interface
        const ANNOTATION = 0x2000;
        /// Declared as an enum class
        const ENUM = 0x4000;
        /// Is a module, not a class or interface
        const MODULE = 0x8000;
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    /// Access and property flags of a field
    pub struct FieldAccessFlags : u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final; never directly assigned after construction
        const FINAL = 0x0010;
        /// Declared volatile; cannot be cached
        const VOLATILE = 0x0040;
        /// Declared transient; not written or read by a persistent object manager
        const TRANSIENT = 0x0080;
        /// Not present in the source code
        const SYNTHETIC = 0x1000;
        /// Declared as an element of an enum class
        const ENUM = 0x4000;
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    /// Access and property flags of a method
    pub struct MethodAccessFlags : u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final; must not be overridden
        const FINAL = 0x0010;
        /// Declared synchronized
        const SYNCHRONIZED = 0x0020;
        /// A bridge method, generated by the compiler
        const BRIDGE = 0x0040;
        /// Declared with variable number of arguments
        const VARARGS = 0x0080;
        /// Declared native; implemented outside the JVM
        const NATIVE = 0x0100;
        /// Declared abstract; no implementation is provided
        const ABSTRACT = 0x0400;
        /// Declared strictfp
        const STRICT = 0x0800;
        /// Not present in the source code
        const SYNTHETIC = 0x1000;
    }
}
