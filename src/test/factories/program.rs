//! Programs used across the unit tests.

use crate::program::{
    ClassAccessFlags, ClassFile, Code, CodeAssembler, Field, FieldAccessFlags, Method,
    MethodAccessFlags, Program,
};

fn assemble(f: impl FnOnce(&mut CodeAssembler) -> crate::Result<()>) -> Code {
    let mut asm = CodeAssembler::new();
    f(&mut asm).unwrap();
    asm.finish().unwrap()
}

fn constructor() -> Method {
    Method::new("<init>", "()V", MethodAccessFlags::PUBLIC)
        .unwrap()
        .with_code(assemble(|asm| {
            asm.aload(0)
                .invokespecial("java/lang/Object", "<init>", "()V")?
                .return_();
            Ok(())
        }))
}

/// `test/Fields` with an unreferenced field `x:I` and a field `y:I` read once.
///
/// Two methods, both with code and both valid: `<init>()V` and `getY()I`.
pub(crate) fn fields_program() -> Program {
    let get_y = Method::new("getY", "()I", MethodAccessFlags::PUBLIC)
        .unwrap()
        .with_code(assemble(|asm| {
            asm.aload(0).getfield("test/Fields", "y", "I")?.ireturn();
            Ok(())
        }));

    let class = ClassFile::new("test/Fields", Some("java/lang/Object"), ClassAccessFlags::PUBLIC)
        .with_field(Field::new("x", "I", FieldAccessFlags::PRIVATE).unwrap())
        .with_field(Field::new("y", "I", FieldAccessFlags::PRIVATE).unwrap())
        .with_method(constructor())
        .with_method(get_y);

    Program::new().with_class(class)
}

/// A small hierarchy:
///
/// - `test/Limits`: interface declaring `static LIMIT:I`
/// - `test/Base`: implements `test/Limits`, declares `count:I` and `work()V`
/// - `test/Child`: extends `test/Base`
/// - `test/Worker`: extends the library class `java/lang/Thread`
pub(crate) fn hierarchy_program() -> Program {
    let limits = ClassFile::new(
        "test/Limits",
        Some("java/lang/Object"),
        ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
    )
    .with_field(
        Field::new(
            "LIMIT",
            "I",
            FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        )
        .unwrap(),
    );

    let base = ClassFile::new("test/Base", Some("java/lang/Object"), ClassAccessFlags::PUBLIC)
        .with_interface("test/Limits")
        .with_field(Field::new("count", "I", FieldAccessFlags::PROTECTED).unwrap())
        .with_method(constructor())
        .with_method(
            Method::new("work", "()V", MethodAccessFlags::PUBLIC)
                .unwrap()
                .with_code(assemble(|asm| {
                    asm.return_();
                    Ok(())
                })),
        );

    let child = ClassFile::new("test/Child", Some("test/Base"), ClassAccessFlags::PUBLIC);

    let worker = ClassFile::new("test/Worker", Some("java/lang/Thread"), ClassAccessFlags::PUBLIC)
        .with_method(
            Method::new("run", "()V", MethodAccessFlags::PUBLIC)
                .unwrap()
                .with_code(assemble(|asm| {
                    asm.return_();
                    Ok(())
                })),
        );

    Program::new()
        .with_class(limits)
        .with_class(base)
        .with_class(child)
        .with_class(worker)
}

/// `test/Broken` with two static methods with code: `broken()V` pops from an empty
/// stack, `valid()I` is well formed and has nothing to clean up.
pub(crate) fn broken_program() -> Program {
    let broken = Method::new("broken", "()V", MethodAccessFlags::STATIC)
        .unwrap()
        .with_code(assemble(|asm| {
            asm.pop().return_();
            Ok(())
        }));
    let valid = Method::new("valid", "()I", MethodAccessFlags::STATIC)
        .unwrap()
        .with_code(assemble(|asm| {
            asm.iconst(1).ireturn();
            Ok(())
        }));

    let class = ClassFile::new("test/Broken", Some("java/lang/Object"), ClassAccessFlags::PUBLIC)
        .with_method(broken)
        .with_method(valid);

    Program::new().with_class(class)
}
