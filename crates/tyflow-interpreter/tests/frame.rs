use indexmap::IndexMap;
use tyflow_interpreter::{
    AtomId, Binding, BuildKind, ClassId, Condition, Context, Frame, FrameKind, InterpreterError,
};
use tyflow_ir::{BlockId, CodeBuilder, CodeFlags, CodeObject, Constant, Opcode};
use tyflow_test_utils::{ToyValue, ToyValues, run_module};

fn values(var: &tyflow_interpreter::Variable<ToyValue>) -> Vec<ToyValue> {
    var.values().cloned().collect()
}

fn diamond(test: Constant<Box<CodeObject>>) -> CodeObject {
    let mut b = CodeBuilder::new("diamond");
    let orelse = b.label();
    let join = b.label();
    b.load_const(test).jump(Opcode::PopJumpIfFalse, orelse);
    b.load_int(1).store_name("x").jump(Opcode::JumpForward, join);
    b.bind(orelse);
    b.load_int(2).store_name("x");
    b.bind(join);
    b.load_name("x").return_value();
    b.finish().unwrap()
}

#[test]
fn undecided_branch_conditions_each_arm() {
    let mut b = CodeBuilder::new("diamond");
    let orelse = b.label();
    let join = b.label();
    b.load_name("flag").jump(Opcode::PopJumpIfFalse, orelse);
    b.load_int(1).store_name("x").jump(Opcode::JumpForward, join);
    b.bind(orelse);
    b.load_int(2).store_name("x");
    b.bind(join);
    b.load_name("x").return_value();
    let (frame, mut ctx) = run_module(b.finish().unwrap()).unwrap();

    assert_eq!(ctx.atom_count(), 1);
    assert_eq!(ctx.atom_site(AtomId::from(0)), Some(("diamond", 1)));
    let a = Condition::atom(AtomId::from(0));

    let then = frame.block_state(BlockId(2)).unwrap();
    assert_eq!(then.condition(), &a);
    let orelse = frame.block_state(BlockId(5)).unwrap();
    assert_eq!(orelse.condition(), &Condition::not(a.clone()));

    let join = frame.block_state(BlockId(7)).unwrap();
    assert!(join.condition().is_true());
    assert_eq!(
        join.get("x").unwrap().bindings(),
        [
            Binding::new(ToyValue::Int(1), a.clone()),
            Binding::new(ToyValue::Int(2), Condition::not(a)),
        ]
    );
    assert_eq!(
        frame.final_value("x", &mut ctx),
        Some(ToyValue::Union(vec![ToyValue::Int(1), ToyValue::Int(2)]))
    );
    assert_eq!(frame.return_variable().len(), 2);
}

#[test]
fn decided_branch_prunes_the_dead_arm() {
    let (frame, mut ctx) = run_module(diamond(Constant::Int(0))).unwrap();
    assert_eq!(ctx.atom_count(), 0);
    assert!(frame.block_state(BlockId(2)).is_none());
    assert!(!frame.is_done(BlockId(2)));
    assert_eq!(frame.final_value("x", &mut ctx), Some(ToyValue::Int(2)));

    let (frame, mut ctx) = run_module(diamond(Constant::Str("yes".into()))).unwrap();
    assert!(frame.block_state(BlockId(5)).is_none());
    assert_eq!(frame.final_value("x", &mut ctx), Some(ToyValue::Int(1)));
}

#[test]
fn jump_if_or_pop_keeps_the_value_on_the_jump_path() {
    // x = a or 5
    let mut b = CodeBuilder::new("or_else");
    let done = b.label();
    b.load_name("a").jump(Opcode::JumpIfTrueOrPop, done);
    b.load_int(5);
    b.bind(done);
    b.store_name("x");
    b.load_none().return_value();
    let (frame, _ctx) = run_module(b.finish().unwrap()).unwrap();

    let a = Condition::atom(AtomId::from(0));
    let x = frame.final_locals().get("x").unwrap();
    assert_eq!(
        x.bindings(),
        [
            Binding::new(ToyValue::Unknown, a.clone()),
            Binding::new(ToyValue::Int(5), Condition::not(a)),
        ]
    );
}

#[test]
fn loop_body_runs_once_and_back_edge_is_dropped() {
    let mut b = CodeBuilder::new("loop");
    let exit = b.label();
    let cleanup = b.label();
    let top = b.label();
    b.load_int(0).store_name("x");
    b.jump(Opcode::SetupLoop, exit);
    b.load_int(1).load_int(2).op_arg(Opcode::BuildList, 2);
    b.op(Opcode::GetIter);
    b.bind(top);
    b.jump(Opcode::ForIter, cleanup);
    b.store_name("x");
    b.jump(Opcode::JumpAbsolute, top);
    b.bind(cleanup);
    b.op(Opcode::PopBlock);
    b.bind(exit);
    b.load_name("x").return_value();
    let (frame, ctx) = run_module(b.finish().unwrap()).unwrap();

    // 0 LOAD_CONST, 1 STORE_NAME, 2 SETUP_LOOP, 3-5 list, 6 GET_ITER,
    // 7 FOR_ITER, 8 STORE_NAME, 9 JUMP_ABSOLUTE, 10 POP_BLOCK
    assert!(frame.is_done(BlockId(7)));
    assert_eq!(ctx.atom_site(AtomId::from(0)), Some(("loop", 7)));

    let body = frame.block_state(BlockId(8)).unwrap();
    assert_eq!(body.stack().len(), 2);
    assert_eq!(
        values(&body.stack()[1]),
        [ToyValue::Union(vec![ToyValue::Int(1), ToyValue::Int(2)])]
    );

    let after = frame.block_state(BlockId(10)).unwrap();
    assert!(after.stack().is_empty());
    assert_eq!(after.condition(), &Condition::not(Condition::atom(AtomId::from(0))));
    assert_eq!(values(frame.return_variable()), [ToyValue::Int(0)]);
}

#[test]
fn except_handler_sees_unwound_stack() {
    let mut b = CodeBuilder::new("try_except");
    let handler = b.label();
    let end = b.label();
    b.load_name("keep");
    b.jump(Opcode::SetupExcept, handler);
    b.load_int(1).store_name("x");
    b.op(Opcode::PopBlock);
    b.jump(Opcode::JumpForward, end);
    b.bind(handler);
    b.pop_top().pop_top().pop_top();
    b.load_int(2).store_name("x");
    b.op(Opcode::PopExcept);
    b.jump(Opcode::JumpForward, end);
    b.bind(end);
    b.pop_top();
    b.load_name("x").return_value();
    let (frame, _ctx) = run_module(b.finish().unwrap()).unwrap();

    // 0 LOAD_NAME, 1 SETUP_EXCEPT, 2-3 body, 4 POP_BLOCK, 5 JUMP_FORWARD
    let handler = frame.block_state(BlockId(6)).unwrap();
    let stack = handler.stack();
    assert_eq!(stack.len(), 7);
    assert_eq!(values(&stack[0]), [ToyValue::Unknown]);
    for slot in &stack[1..] {
        assert_eq!(values(slot), [ToyValue::Typed("BaseException")]);
    }
    // the handler starts from the locals at setup time
    assert!(handler.get("x").is_none());

    let returned = values(frame.return_variable());
    assert_eq!(returned.len(), 2);
    assert!(returned.contains(&ToyValue::Int(1)));
    assert!(returned.contains(&ToyValue::Int(2)));
}

#[test]
fn finally_merges_normal_and_exceptional_entries() {
    let mut b = CodeBuilder::new("try_finally");
    let finally = b.label();
    b.jump(Opcode::SetupFinally, finally);
    b.load_int(1).store_name("x");
    b.op(Opcode::PopBlock);
    b.load_none();
    b.bind(finally);
    b.op(Opcode::EndFinally);
    b.load_none().return_value();
    let (frame, _ctx) = run_module(b.finish().unwrap()).unwrap();

    let finally = frame.block_state(BlockId(5)).unwrap();
    assert_eq!(finally.stack().len(), 1);
    assert_eq!(
        values(&finally.stack()[0]),
        [ToyValue::Typed("BaseException"), ToyValue::None]
    );
    assert_eq!(values(frame.final_locals().get("x").unwrap()), [ToyValue::Int(1)]);
}

#[test]
fn with_block_balances_the_stack() {
    let mut b = CodeBuilder::new("with");
    let cleanup = b.label();
    b.load_name("manager");
    b.jump(Opcode::SetupWith, cleanup);
    b.store_name("v");
    b.op(Opcode::PopBlock);
    b.load_none();
    b.bind(cleanup);
    b.op(Opcode::WithCleanupStart);
    b.op(Opcode::WithCleanupFinish);
    b.op(Opcode::EndFinally);
    b.load_none().return_value();
    let (frame, _ctx) = run_module(b.finish().unwrap()).unwrap();

    let cleanup = frame.block_state(BlockId(5)).unwrap();
    assert_eq!(cleanup.stack().len(), 2);
    assert_eq!(
        values(&cleanup.stack()[1]),
        [ToyValue::Typed("BaseException"), ToyValue::None]
    );
    assert_eq!(values(frame.final_locals().get("v").unwrap()), [ToyValue::Unknown]);
}

#[test]
fn global_write_in_callee_reaches_module() {
    let mut f = CodeBuilder::new("f");
    f.load_int(1).store_global("g");
    f.load_none().return_value();
    let f = f.finish().unwrap();

    let mut b = CodeBuilder::new("<module>");
    b.make_function(f, 0).store_name("f");
    b.load_name("f").call(0).pop_top();
    b.load_none().return_value();
    let (frame, mut ctx) = run_module(b.finish().unwrap()).unwrap();

    assert_eq!(frame.kind(), FrameKind::Module);
    assert_eq!(frame.final_value("g", &mut ctx), Some(ToyValue::Int(1)));
    assert!(frame.shadowed_globals().is_empty());

    let f = frame.functions()[0];
    assert_eq!(ctx.expect_function(f).name(), "f");
    let body = ctx.analyze_function(f).unwrap();
    assert!(body.final_locals().get("g").is_none());
    assert_eq!(values(body.shadowed_globals().get("g").unwrap()), [ToyValue::Int(1)]);
}

#[test]
fn callee_reads_module_globals() {
    let mut f = CodeBuilder::new("f");
    f.load_global("k").load_int(1).op(Opcode::BinaryOp(tyflow_ir::BinaryOperator::Add));
    f.return_value();
    let f = f.finish().unwrap();

    let mut b = CodeBuilder::new("<module>");
    b.load_int(41).store_name("k");
    b.make_function(f, 0).store_name("f");
    b.load_name("f").call(0).store_name("r");
    b.load_none().return_value();
    let (frame, mut ctx) = run_module(b.finish().unwrap()).unwrap();
    assert_eq!(frame.final_value("r", &mut ctx), Some(ToyValue::Int(42)));
}

#[test]
fn nonlocal_write_returns_to_defining_frame() {
    let mut inner = CodeBuilder::new("inner");
    inner.freevar("x");
    inner.load_int(2).store_deref("x");
    inner.load_none().return_value();
    let inner = inner.finish().unwrap();

    let mut outer = CodeBuilder::new("outer");
    outer.cellvar("x");
    outer.load_int(1).store_deref("x");
    outer.load_closure("x").op_arg(Opcode::BuildTuple, 1);
    outer.make_function(inner, 0x08).store_fast("inner");
    outer.load_fast("inner").call(0).pop_top();
    outer.load_deref("x").return_value();
    let outer = outer.finish().unwrap();

    let mut b = CodeBuilder::new("<module>");
    b.make_function(outer, 0).store_name("outer");
    b.load_name("outer").call(0).store_name("r");
    b.load_none().return_value();
    let (frame, mut ctx) = run_module(b.finish().unwrap()).unwrap();

    assert_eq!(frame.final_value("r", &mut ctx), Some(ToyValue::Int(2)));
    assert_eq!(ctx.functions().count(), 2);
}

#[test]
fn class_body_members_and_method_calls() {
    let mut get = CodeBuilder::new("get");
    get.params(&["self"]);
    get.load_fast("self").load_attr("v").return_value();
    let get = get.finish().unwrap();

    let mut body = CodeBuilder::new("A");
    body.make_function(get, 0).store_name("get");
    body.load_int(7).store_name("k");
    body.load_none().return_value();
    let body = body.finish().unwrap();

    let mut b = CodeBuilder::new("<module>");
    b.op(Opcode::LoadBuildClass);
    b.make_function(body, 0).load_str("A").call(2).store_name("A");
    b.load_name("A").call(0).store_name("a");
    b.load_int(1).load_name("a").store_attr("v");
    b.load_name("a").load_method("get").op_arg(Opcode::CallMethod, 0);
    b.store_name("r");
    b.load_none().return_value();
    let (frame, mut ctx) = run_module(b.finish().unwrap()).unwrap();

    let class = ClassId::from(0);
    assert_eq!(frame.classes(), [class]);
    assert_eq!(ctx.expect_class(class).name(), "A");
    assert_eq!(ctx.expect_class(class).functions.len(), 1);
    assert_eq!(ctx.values().class_member(class, "k"), Some(&ToyValue::Int(7)));
    assert_eq!(ctx.values().instance_attribute(class, "v"), Some(&ToyValue::Int(1)));
    assert_eq!(frame.final_value("a", &mut ctx), Some(ToyValue::Instance(class)));
    assert_eq!(frame.final_value("r", &mut ctx), Some(ToyValue::Int(1)));
}

#[test]
fn defaults_and_keyword_arguments_bind() {
    let mut f = CodeBuilder::new("f");
    f.params(&["a", "b"]);
    f.load_fast("a").load_fast("b").op_arg(Opcode::BuildTuple, 2);
    f.return_value();
    let f = f.finish().unwrap();

    let mut b = CodeBuilder::new("<module>");
    b.load_int(5).op_arg(Opcode::BuildTuple, 1);
    b.make_function(f, 0x01).store_name("f");
    b.load_name("f").load_int(1).call(1).store_name("defaulted");
    b.load_name("f").load_int(1).load_int(7);
    b.load_const(Constant::Tuple(vec![Constant::Str("b".into())]));
    b.op_arg(Opcode::CallFunctionKw, 2).store_name("keyword");
    b.load_name("f").call(0).store_name("missing");
    b.load_none().return_value();
    let (frame, mut ctx) = run_module(b.finish().unwrap()).unwrap();

    let pair = |a, b| ToyValue::Collection(BuildKind::Tuple, vec![a, b]);
    assert_eq!(
        frame.final_value("defaulted", &mut ctx),
        Some(pair(ToyValue::Int(1), ToyValue::Int(5)))
    );
    assert_eq!(
        frame.final_value("keyword", &mut ctx),
        Some(pair(ToyValue::Int(1), ToyValue::Int(7)))
    );
    assert_eq!(
        frame.final_value("missing", &mut ctx),
        Some(pair(ToyValue::Unknown, ToyValue::Int(5)))
    );
}

#[test]
fn surplus_keywords_collect_into_kwargs() {
    let mut g = CodeBuilder::new("g");
    g.params(&["a"]);
    g.varname("kw");
    g.flags(CodeFlags::VARKEYWORDS);
    g.load_fast("kw").return_value();
    let g = g.finish().unwrap();

    let mut b = CodeBuilder::new("<module>");
    b.make_function(g, 0).store_name("g");
    b.load_name("g").load_int(1).load_int(2);
    b.load_const(Constant::Tuple(vec![Constant::Str("extra".into())]));
    b.op_arg(Opcode::CallFunctionKw, 2).store_name("r");
    b.load_none().return_value();
    let (frame, mut ctx) = run_module(b.finish().unwrap()).unwrap();

    assert_eq!(
        frame.final_value("r", &mut ctx),
        Some(ToyValue::Collection(
            BuildKind::Dict,
            vec![ToyValue::Str("extra".into()), ToyValue::Int(2)]
        ))
    );
}

#[test]
fn generator_call_collects_yields() {
    let mut gen_body = CodeBuilder::new("gen");
    gen_body.flags(CodeFlags::GENERATOR);
    gen_body.load_int(1).op(Opcode::YieldValue).pop_top();
    gen_body.load_int(2).op(Opcode::YieldValue).pop_top();
    gen_body.load_none().return_value();
    let gen_body = gen_body.finish().unwrap();

    let mut b = CodeBuilder::new("<module>");
    b.make_function(gen_body, 0).store_name("gen");
    b.load_name("gen").call(0).store_name("it");
    b.load_none().return_value();
    let (frame, mut ctx) = run_module(b.finish().unwrap()).unwrap();

    assert_eq!(
        frame.final_value("it", &mut ctx),
        Some(ToyValue::Collection(
            BuildKind::Generator,
            vec![ToyValue::Int(1), ToyValue::Int(2)]
        ))
    );
}

#[test]
fn recursive_calls_are_not_followed() {
    // Every level calls itself twice; following the calls would double the
    // work per level up to the depth limit.
    let mut f = CodeBuilder::new("f");
    f.load_global("f").call(0).pop_top();
    f.load_global("f").call(0).return_value();
    let f = f.finish().unwrap();

    let mut b = CodeBuilder::new("<module>");
    b.make_function(f, 0).store_name("f");
    b.load_name("f").call(0).store_name("r");
    b.load_none().return_value();
    let (frame, mut ctx) = run_module(b.finish().unwrap()).unwrap();

    assert_eq!(ctx.config().max_depth, 32);
    assert_eq!(frame.final_value("r", &mut ctx), Some(ToyValue::Unknown));
    assert!(!ctx.is_active(frame.functions()[0]));
}

#[test]
fn call_chain_stops_at_the_depth_limit() {
    let mut h = CodeBuilder::new("h");
    h.load_int(1).return_value();
    let h = h.finish().unwrap();
    let mut g = CodeBuilder::new("g");
    g.load_global("h").call(0).return_value();
    let g = g.finish().unwrap();
    let mut f = CodeBuilder::new("f");
    f.load_global("g").call(0).return_value();
    let f = f.finish().unwrap();

    let module = || {
        let mut b = CodeBuilder::new("<module>");
        b.make_function(h.clone(), 0).store_name("h");
        b.make_function(g.clone(), 0).store_name("g");
        b.make_function(f.clone(), 0).store_name("f");
        b.load_name("f").call(0).store_name("r");
        b.load_none().return_value();
        b.finish().unwrap()
    };

    let mut ctx = Context::new(ToyValues::default()).with_max_depth(2);
    let mut frame = Frame::from_code(module(), IndexMap::new()).unwrap();
    frame.run(&mut ctx).unwrap();
    assert_eq!(frame.final_value("r", &mut ctx), Some(ToyValue::Unknown));

    let (frame, mut ctx) = run_module(module()).unwrap();
    assert_eq!(frame.final_value("r", &mut ctx), Some(ToyValue::Int(1)));
}

#[test]
fn uncalled_function_sees_module_globals() {
    let mut f = CodeBuilder::new("f");
    f.load_global("k").return_value();
    let f = f.finish().unwrap();
    let mut g = CodeBuilder::new("g");
    g.load_global("late").return_value();
    let g = g.finish().unwrap();

    let mut b = CodeBuilder::new("<module>");
    b.load_int(41).store_name("k");
    b.make_function(f, 0).store_name("f");
    b.make_function(g, 0).store_name("g");
    b.load_int(7).store_name("late");
    b.load_none().return_value();
    let (frame, mut ctx) = run_module(b.finish().unwrap()).unwrap();
    let (f, g) = (frame.functions()[0], frame.functions()[1]);

    let body = ctx.analyze_function(f).unwrap();
    assert_eq!(values(body.return_variable()), [ToyValue::Int(41)]);

    let body = ctx.analyze_function(g).unwrap();
    assert_eq!(values(body.return_variable()), [ToyValue::Unknown]);
    let body = ctx
        .analyze_function_with_globals(g, frame.final_locals().clone())
        .unwrap();
    assert_eq!(values(body.return_variable()), [ToyValue::Int(7)]);
}

#[test]
fn builtins_resolve_after_every_scope() {
    let mut b = CodeBuilder::new("<module>");
    b.load_name("len").load_name("xs").call(1).store_name("n");
    b.load_name("undefined").store_name("u");
    b.load_none().return_value();
    let (frame, mut ctx) = run_module(b.finish().unwrap()).unwrap();
    assert_eq!(frame.final_value("n", &mut ctx), Some(ToyValue::Typed("int")));
    assert_eq!(frame.final_value("u", &mut ctx), Some(ToyValue::Unknown));
}

#[test]
fn initial_globals_seed_the_module() {
    let mut b = CodeBuilder::new("<module>");
    b.load_name("seed").store_name("copy");
    b.load_none().return_value();
    let mut globals = IndexMap::new();
    globals.insert(
        "seed".to_owned(),
        tyflow_interpreter::Variable::from_value(ToyValue::Int(3)),
    );

    let mut ctx = Context::new(ToyValues::default());
    let mut frame = Frame::from_code(b.finish().unwrap(), globals).unwrap();
    frame.run(&mut ctx).unwrap();
    assert_eq!(frame.final_value("copy", &mut ctx), Some(ToyValue::Int(3)));
    assert_eq!(frame.final_value("seed", &mut ctx), Some(ToyValue::Int(3)));
}

#[test]
fn stack_underflow_is_an_error() {
    let mut b = CodeBuilder::new("<module>");
    b.pop_top();
    b.load_none().return_value();
    let err = run_module(b.finish().unwrap()).unwrap_err();
    assert!(matches!(
        err,
        InterpreterError::StackUnderflow { needed: 1, depth: 0 }
    ));
    insta::assert_snapshot!(err.to_string(), @"operand stack underflow: needed 1, depth 0");
}

#[test]
fn unpacking_splits_the_sequence() {
    let mut b = CodeBuilder::new("<module>");
    b.load_int(1).load_int(2).op_arg(Opcode::BuildTuple, 2);
    b.op_arg(Opcode::UnpackSequence, 2).store_name("a").store_name("b");
    b.load_name("n").op_arg(Opcode::UnpackSequence, 3).store_name("c");
    b.pop_top().pop_top();
    b.load_none().return_value();
    let (frame, mut ctx) = run_module(b.finish().unwrap()).unwrap();
    assert_eq!(frame.final_value("a", &mut ctx), Some(ToyValue::Int(1)));
    assert_eq!(frame.final_value("b", &mut ctx), Some(ToyValue::Int(2)));
    assert_eq!(frame.final_value("c", &mut ctx), Some(ToyValue::Unknown));
}

#[test]
fn oversized_unpack_count_is_an_error() {
    let mut b = CodeBuilder::new("<module>");
    b.load_none().op_arg(Opcode::UnpackSequence, u32::MAX);
    b.load_none().return_value();
    let err = run_module(b.finish().unwrap()).unwrap_err();
    assert!(matches!(
        err,
        InterpreterError::InvalidArgument { index: 1, op: Opcode::UnpackSequence, arg: u32::MAX }
    ));
    insta::assert_snapshot!(
        err.to_string(),
        @"instruction 1 (UNPACK_SEQUENCE) has invalid argument 4294967295"
    );
}

#[test]
fn aborted_callee_yields_unknown() {
    let mut f = CodeBuilder::new("broken");
    f.pop_top();
    f.load_none().return_value();
    let f = f.finish().unwrap();

    let mut b = CodeBuilder::new("<module>");
    b.make_function(f, 0).store_name("broken");
    b.load_name("broken").call(0).store_name("r");
    b.load_none().return_value();
    let (frame, mut ctx) = run_module(b.finish().unwrap()).unwrap();
    assert_eq!(frame.final_value("r", &mut ctx), Some(ToyValue::Unknown));
}

#[test]
fn frames_run_once() {
    let mut b = CodeBuilder::new("once");
    b.load_none().return_value();
    let mut ctx = Context::new(ToyValues::default());
    let mut frame = Frame::<ToyValue>::from_code(b.finish().unwrap(), IndexMap::new()).unwrap();
    frame.run(&mut ctx).unwrap();
    let err = frame.run(&mut ctx).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"frame 'once' has already been run");
}
