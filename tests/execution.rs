//! Abstract execution tests.
//!
//! Every test builds a method body with `CodeAssembler`, executes it with
//! `MethodExecution` and checks the recorded provenance: which context pushed each
//! value, which contexts popped it, and what the duplication queries answer.

use classdeob::{
    analysis::{AbstractValue, MethodExecution},
    program::{CodeAssembler, InstructionId, Method, MethodAccessFlags, ValueType},
    Error, Result,
};

fn execute(
    descriptor: &str,
    build: impl FnOnce(&mut CodeAssembler) -> Result<()>,
) -> Result<(Method, MethodExecution)> {
    let mut asm = CodeAssembler::new();
    build(&mut asm)?;
    let method =
        Method::new("m", descriptor, MethodAccessFlags::STATIC)?.with_code(asm.finish()?);
    let execution = MethodExecution::run(&method)?;
    Ok((method, execution))
}

fn id(index: u32) -> InstructionId {
    InstructionId::new(index)
}

#[test]
fn test_contexts_match_stack_effects() -> Result<()> {
    let (method, execution) = execute("(IJ)V", |asm| {
        asm.iload(0)
            .iconst(3)
            .imul()
            .lload(1)
            .invokestatic("a/Sink", "take", "(IJ)V")?
            .getstatic("a/Config", "name", "Ljava/lang/String;")?
            .pop()
            .return_();
        Ok(())
    })?;

    let code = method.code.as_ref().unwrap();
    for instruction in code {
        let ctx = execution.context_of(instruction.id()).unwrap();
        let context = execution.graph().context(ctx).unwrap();
        assert!(
            context.matches(instruction.kind().stack_effect()),
            "{instruction} recorded {} pops / {} pushes",
            context.pops().len(),
            context.pushes().len()
        );
    }

    let call = execution.pops_of(id(4));
    assert_eq!(call.len(), 2);
    // Arguments are popped top first: the long, then the product
    assert_eq!(call[0], execution.pushes_of(id(3))[0]);
    assert_eq!(call[1], execution.pushes_of(id(2))[0]);
    assert!(execution.graph().check_consistency().is_ok());
    Ok(())
}

#[test]
fn test_dup_creates_fresh_aliases() -> Result<()> {
    let (method, execution) = execute("()V", |asm| {
        asm.iconst(42).dup().iadd().pop().return_();
        Ok(())
    })?;

    let graph = execution.graph();
    let source = execution.pushes_of(id(0))[0];
    let aliases = execution.pushes_of(id(1)).to_vec();
    assert_eq!(aliases.len(), 2);
    assert!(!aliases.contains(&source));

    for &alias in &aliases {
        let node = graph.value(alias).unwrap();
        assert_eq!(node.value_type(), &ValueType::Int);
        assert_eq!(node.value(), &AbstractValue::Int(42));
        assert_eq!(graph.resolve_origin(alias), source);
    }

    let code = method.code.as_ref().unwrap();
    let dup = code.get(id(1)).unwrap().as_duplication().unwrap();
    assert_eq!(dup.original(graph, aliases[0])?, source);
    assert_eq!(dup.original(graph, aliases[1])?, source);
    assert_eq!(dup.other_branch(graph, aliases[0])?, aliases[1]);
    assert_eq!(dup.other_branch(graph, aliases[1])?, aliases[0]);

    // The sum of both aliases is folded
    let sum = execution.pushes_of(id(2))[0];
    assert_eq!(graph.value(sum).unwrap().value(), &AbstractValue::Int(84));
    Ok(())
}

#[test]
fn test_duplication_rejects_foreign_values() -> Result<()> {
    let (method, execution) = execute("()V", |asm| {
        asm.iconst(1).dup().iadd().istore(0).return_();
        Ok(())
    })?;

    let graph = execution.graph();
    let code = method.code.as_ref().unwrap();
    let dup = code.get(id(1)).unwrap().as_duplication().unwrap();
    let foreign = execution.pushes_of(id(0))[0];

    assert!(matches!(
        dup.original(graph, foreign),
        Err(Error::ContractViolation { .. })
    ));
    assert!(matches!(
        dup.other_branch(graph, foreign),
        Err(Error::ContractViolation { .. })
    ));
    assert!(code.get(id(2)).unwrap().as_duplication().is_none());
    Ok(())
}

#[test]
fn test_underflow_reports_instruction() -> Result<()> {
    let mut asm = CodeAssembler::new();
    asm.iconst(1).istore(0).iadd().ireturn();
    let method = Method::new("m", "()I", MethodAccessFlags::STATIC)?.with_code(asm.finish()?);

    match MethodExecution::run(&method) {
        Err(Error::StackUnderflow { pc, mnemonic }) => {
            assert_eq!(mnemonic, "iadd");
            assert_eq!(pc, 2);
        }
        other => panic!("expected underflow, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_locals_carry_provenance() -> Result<()> {
    let (_, execution) = execute("()I", |asm| {
        asm.lconst(7).lstore(0).lload(0).lconst(1).ladd().pop2().iconst(3).ireturn();
        Ok(())
    })?;

    let graph = execution.graph();
    let loaded = execution.pushes_of(id(2))[0];
    assert_eq!(graph.value(loaded).unwrap().value(), &AbstractValue::Long(7));

    let sum = execution.pushes_of(id(4))[0];
    assert_eq!(graph.value(sum).unwrap().value(), &AbstractValue::Long(8));
    assert!(execution.frame().stack().is_empty());
    Ok(())
}

#[test]
fn test_narrow_dup2_is_unsupported() -> Result<()> {
    let mut asm = CodeAssembler::new();
    asm.iconst(1).iconst(2).dup2().return_();
    let method = Method::new("m", "()V", MethodAccessFlags::STATIC)?.with_code(asm.finish()?);

    assert!(matches!(
        MethodExecution::run(&method),
        Err(Error::Unsupported(_))
    ));
    Ok(())
}
