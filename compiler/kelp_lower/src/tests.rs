//! End-to-end lowering of small modules.

use kelp_ir::ast::{
    BinaryOp, Binding, Boxing, Builtin, CaseFields, CaseKind, DeclRef, ExprId, ExprKind,
    FieldDecl, FieldInit, FunctionRef, IntKind, MatchArm, Pattern, StaticFieldDecl, Stmt, Type,
    TypeRef,
};
use kelp_ir::Span;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::ir::Local;
use crate::pretty::pretty;
use crate::test_helpers::{block, capturing_module, ModuleBuilder, I32};
use crate::{lower, LowerConfig, LowerError};

fn function_type(params: Vec<Type>, ret: Type) -> Type {
    Type::Function {
        params,
        ret: Box::new(ret),
    }
}

/// `union U { A, B }`
fn two_unit_cases(b: &mut ModuleBuilder) {
    let a = b.case("A", CaseKind::Unit);
    let bee = b.case("B", CaseKind::Unit);
    let union = b.union("U", &[], vec![a, bee]);
    b.module.unions.push(union);
}

fn case_pattern(b: &ModuleBuilder, union: &str, case: &str, fields: CaseFields) -> Pattern {
    Pattern::Case {
        union: b.type_ref(union, Vec::new()),
        case: b.name(case),
        fields,
    }
}

#[test]
fn binary_operator_on_parameters() {
    let mut b = ModuleBuilder::new();
    let a = b.param("a", I32);
    let c = b.param("b", I32);
    let lhs = b.read(a.var, I32);
    let rhs = b.read(c.var, I32);
    let sum = b.expr(
        ExprKind::Binary {
            op: BinaryOp::Add,
            lhs,
            rhs,
        },
        I32,
    );
    let add = b.function("Add", vec![a, c], I32, block(Vec::new(), Some(sum)));
    b.module.functions.push(add);

    let module = b.lower_ok();
    assert_eq!(b.method_names(&module), vec!["Add"]);
    assert!(module.data_types.is_empty());
    assert_eq!(
        b.render(b.method(&module, "Add")),
        "\
fn Add(_param0 (a): i32, _param1 (b): i32) -> i32 {
    let _returnValue: i32;

    bb0: {
        _returnValue = _param0 + _param1;
        goto -> bb1;
    }

    bb1: {
        return;
    }
}
"
    );
}

#[test]
fn payload_case_used_as_value_becomes_unbound_function_object() {
    let mut b = ModuleBuilder::new();
    let a = b.case("A", CaseKind::Tuple(vec![I32]));
    let bee = b.case("B", CaseKind::Unit);
    let union = b.union("U", &[], vec![a, bee]);
    b.module.unions.push(union);

    let ty = function_type(vec![I32], b.named("U"));
    let case = ExprKind::UnionCase {
        union: b.type_ref("U", Vec::new()),
        case: b.name("A"),
    };
    let value = b.expr(case, ty.clone());
    let (_, decl) = b.declare("f", ty, value);
    b.module.main = block(vec![decl], None);

    let module = b.lower_ok();
    assert_eq!(b.data_type_names(&module), vec!["U", "Function`2"]);
    assert_eq!(
        b.method_names(&module),
        vec!["U__Create__A", "_Main", "Function`2__Call"]
    );
    assert_eq!(
        b.render(b.method(&module, "_Main")),
        "\
fn _Main() -> unit {
    let _returnValue: unit;
    let _local0 (f): *Function`2<i32, *U>;

    bb0: {
        _local0 = allocate<Function`2<i32, *U>>() -> bb1;
    }

    bb1: {
        (*_local0) = new Function`2<i32, *U>;
        (*_local0).FunctionReference = const U__Create__A;
        goto -> bb2;
    }

    bb2: {
        return;
    }
}
"
    );
}

#[test]
fn captured_parameter_is_read_through_the_closure() {
    let b = capturing_module();
    let module = b.lower_ok();

    assert_eq!(
        b.data_type_names(&module),
        vec!["Outer__Locals", "Outer__Inner__Closure"]
    );
    assert_eq!(b.method_names(&module), vec!["Outer__Inner", "Outer"]);
    assert_eq!(
        b.render(b.method(&module, "Outer")),
        "\
fn Outer(_param0 (x): i32) -> i32 {
    let _returnValue: i32;
    let _localsObject: *Outer__Locals;
    let _local1: *Outer__Inner__Closure;

    bb0: {
        _localsObject = allocate<Outer__Locals>() -> bb1;
    }

    bb1: {
        (*_localsObject) = new Outer__Locals;
        (*_localsObject).x = _param0;
        _local1 = allocate<Outer__Inner__Closure>() -> bb2;
    }

    bb2: {
        (*_local1) = new Outer__Inner__Closure;
        (*_local1).Outer__Locals = _localsObject;
        _returnValue = Outer__Inner(_local1) -> bb3;
    }

    bb3: {
        return;
    }
}
"
    );
    assert_eq!(
        b.render(b.method(&module, "Outer__Inner")),
        "\
fn Outer__Inner(_param0 (closure): *Outer__Inner__Closure) -> i32 {
    let _returnValue: i32;

    bb0: {
        _returnValue = (*(*_param0).Outer__Locals).x;
        goto -> bb1;
    }

    bb1: {
        return;
    }
}
"
    );
}

#[test]
fn array_index_is_bounds_checked() {
    let mut b = ModuleBuilder::new();
    let array = Type::Array {
        element: Box::new(I32),
        length: 4,
        boxing: Boxing::Boxed,
    };
    let a = b.param("a", array.clone());
    let base = b.read(a.var, array);
    let two = b.int(2);
    let index = b.expr(
        ExprKind::Index {
            array: base,
            index: two,
        },
        I32,
    );
    let get = b.function("Get", vec![a], I32, block(Vec::new(), Some(index)));
    b.module.functions.push(get);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "Get")),
        "\
fn Get(_param0 (a): *[i32; 4]) -> i32 {
    let _returnValue: i32;
    let _local0: bool;

    bb0: {
        _local0 = 2_i32 < 4_i32;
        assert(_local0) -> bb1;
    }

    bb1: {
        _returnValue = (*_param0)[2_i32];
        goto -> bb2;
    }

    bb2: {
        return;
    }
}
"
    );
}

/// ```text
/// fn SomeFn() -> result<i32, string> { Ok(1) }
/// fn Caller() -> result<i32, string> { var v: i32 = SomeFn()?; Ok(v) }
/// ```
fn propagating_module() -> ModuleBuilder {
    let mut b = ModuleBuilder::new();
    let result = Type::result(I32, Type::String);
    let ok = b.name("Ok");
    let ok_call = |b: &mut ModuleBuilder, arg: ExprId| {
        let constructor = ExprKind::UnionCase {
            union: TypeRef {
                decl: DeclRef::Builtin(Builtin::Result),
                args: vec![I32, Type::String],
            },
            case: ok,
        };
        let callee = b.expr(constructor, function_type(vec![I32], result.clone()));
        b.expr(
            ExprKind::Call {
                callee,
                args: vec![arg],
            },
            result.clone(),
        )
    };

    let one = b.int(1);
    let some_body = ok_call(&mut b, one);
    let some_fn = b.function(
        "SomeFn",
        Vec::new(),
        result.clone(),
        block(Vec::new(), Some(some_body)),
    );

    let call = b.call(&["SomeFn"], Vec::new(), result.clone());
    let unwrapped = b.expr(ExprKind::Propagate(call), I32);
    let (v, decl) = b.declare("v", I32, unwrapped);
    let read = b.read(v, I32);
    let tail = ok_call(&mut b, read);
    let caller = b.function("Caller", Vec::new(), result, block(vec![decl], Some(tail)));

    b.module.functions.push(some_fn);
    b.module.functions.push(caller);
    b
}

#[test]
fn question_mark_returns_rewrapped_error() {
    let b = propagating_module();
    let module = b.lower_ok();

    assert_eq!(b.data_type_names(&module), vec!["result"]);
    assert_eq!(
        b.method_names(&module),
        vec!["SomeFn", "Caller", "result__Create__Ok", "result__Create__Error"]
    );
    assert_eq!(
        b.render(b.method(&module, "Caller")),
        "\
fn Caller() -> *result<i32, string> {
    let _returnValue: *result<i32, string>;
    let _local0 (v): i32;
    let _local1: *result<i32, string>;

    bb0: {
        _local1 = SomeFn() -> bb1;
    }

    bb1: {
        switchInt(((*_local1) as Ok)._variantIdentifier) -> [0: bb3, otherwise: bb2];
    }

    bb2: {
        _returnValue = result__Create__Error<i32, string>(((*_local1) as Error).Item0) -> bb4;
    }

    bb3: {
        _local0 = ((*_local1) as Ok).Item0;
        _returnValue = result__Create__Ok<i32, string>(_local0) -> bb4;
    }

    bb4: {
        return;
    }
}
"
    );
}

#[test]
fn question_mark_needs_a_result_returning_function() {
    let mut b = ModuleBuilder::new();
    let result = Type::result(I32, Type::String);
    let call = b.call(&["Source"], Vec::new(), result);
    let unwrapped = b.expr_at(ExprKind::Propagate(call), I32, Span::new(10, 11));
    let user = b.function("User", Vec::new(), I32, block(Vec::new(), Some(unwrapped)));
    b.module.functions.push(user);

    match b.lower() {
        Err(LowerError::PropagateOutsideResult { context }) => {
            assert_eq!(context.decl, "Mod.User");
            assert_eq!(context.span, Span::new(10, 11));
        }
        other => panic!("expected `?` outside result, got {other:?}"),
    }
}

#[test]
fn boxed_empty_array_is_allocated() {
    let mut b = ModuleBuilder::new();
    let array = Type::Array {
        element: Box::new(I32),
        length: 0,
        boxing: Boxing::Boxed,
    };
    let literal = b.expr(ExprKind::Array(Vec::new()), array.clone());
    let make = b.function("Make", Vec::new(), array, block(Vec::new(), Some(literal)));
    b.module.functions.push(make);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "Make")),
        "\
fn Make() -> *[i32; 0] {
    let _returnValue: *[i32; 0];

    bb0: {
        _returnValue = allocate<[i32; 0]>() -> bb1;
    }

    bb1: {
        (*_returnValue) = new [i32; 0];
        goto -> bb2;
    }

    bb2: {
        return;
    }
}
"
    );
}

#[test]
fn unboxed_array_is_built_in_place() {
    let mut b = ModuleBuilder::new();
    let array = Type::Array {
        element: Box::new(I32),
        length: 2,
        boxing: Boxing::Unboxed,
    };
    let one = b.int(1);
    let two = b.int(2);
    let literal = b.expr(ExprKind::Array(vec![one, two]), array.clone());
    let pair = b.function("Pair", Vec::new(), array, block(Vec::new(), Some(literal)));
    b.module.functions.push(pair);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "Pair")),
        "\
fn Pair() -> [i32; 2] {
    let _returnValue: [i32; 2];

    bb0: {
        _returnValue = new [i32; 2];
        _returnValue[0_u64] = 1_i32;
        _returnValue[1_u64] = 2_i32;
        goto -> bb1;
    }

    bb1: {
        return;
    }
}
"
    );
}

#[test]
fn match_dispatches_on_the_discriminant() {
    // union Shape { Circle(i32), Square(i32), Empty }
    // fn Area(s: Shape) -> i32 { match s { Circle(r) => r, Square(w) => w, Empty => 0 } }
    let mut b = ModuleBuilder::new();
    let circle = b.case("Circle", CaseKind::Tuple(vec![I32]));
    let square = b.case("Square", CaseKind::Tuple(vec![I32]));
    let empty = b.case("Empty", CaseKind::Unit);
    let union = b.union("Shape", &[], vec![circle, square, empty]);
    b.module.unions.push(union);

    let s = b.param("s", b.named("Shape"));
    let scrutinee = b.read(s.var, b.named("Shape"));
    let mut arms = Vec::new();
    for (case, binding) in [("Circle", "r"), ("Square", "w")] {
        let var = b.fresh_var();
        let pattern = case_pattern(
            &b,
            "Shape",
            case,
            CaseFields::Tuple(vec![Pattern::Binding {
                var,
                name: b.name(binding),
                ty: I32,
            }]),
        );
        let body = b.read(var, I32);
        arms.push(MatchArm { pattern, body });
    }
    let zero = b.int(0);
    arms.push(MatchArm {
        pattern: case_pattern(&b, "Shape", "Empty", CaseFields::None),
        body: zero,
    });
    let matched = b.expr(ExprKind::Match { scrutinee, arms }, I32);
    let area = b.function("Area", vec![s], I32, block(Vec::new(), Some(matched)));
    b.module.functions.push(area);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "Area")),
        "\
fn Area(_param0 (s): *Shape) -> i32 {
    let _returnValue: i32;
    let _local0 (r): i32;
    let _local1 (w): i32;

    bb0: {
        switchInt(((*_param0) as Circle)._variantIdentifier) -> [0: bb1, 1: bb2, otherwise: bb3];
    }

    bb1: {
        _local0 = ((*_param0) as Circle).Item0;
        goto -> bb4;
    }

    bb2: {
        _local1 = ((*_param0) as Square).Item0;
        goto -> bb5;
    }

    bb3: {
        goto -> bb6;
    }

    bb4: {
        _returnValue = _local0;
        goto -> bb7;
    }

    bb5: {
        _returnValue = _local1;
        goto -> bb7;
    }

    bb6: {
        _returnValue = 0_i32;
        goto -> bb7;
    }

    bb7: {
        return;
    }
}
"
    );
}

#[test]
fn matches_yields_a_bool() {
    let mut b = ModuleBuilder::new();
    two_unit_cases(&mut b);
    let u = b.param("u", b.named("U"));
    let value = b.read(u.var, b.named("U"));
    let pattern = case_pattern(&b, "U", "A", CaseFields::None);
    let test = b.expr(ExprKind::Matches { value, pattern }, Type::Bool);
    let is_a = b.function("IsA", vec![u], Type::Bool, block(Vec::new(), Some(test)));
    b.module.functions.push(is_a);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "IsA")),
        "\
fn IsA(_param0 (u): *U) -> bool {
    let _returnValue: bool;

    bb0: {
        switchInt(((*_param0) as A)._variantIdentifier) -> [0: bb1, otherwise: bb2];
    }

    bb1: {
        goto -> bb3;
    }

    bb2: {
        goto -> bb4;
    }

    bb3: {
        _returnValue = true;
        goto -> bb5;
    }

    bb4: {
        _returnValue = false;
        goto -> bb5;
    }

    bb5: {
        return;
    }
}
"
    );
}

#[test]
fn non_exhaustive_match_is_rejected() {
    let mut b = ModuleBuilder::new();
    two_unit_cases(&mut b);
    let u = b.param("u", b.named("U"));
    let scrutinee = b.read(u.var, b.named("U"));
    let one = b.int(1);
    let arms = vec![MatchArm {
        pattern: case_pattern(&b, "U", "A", CaseFields::None),
        body: one,
    }];
    let matched = b.expr(ExprKind::Match { scrutinee, arms }, I32);
    let f = b.function("F", vec![u], I32, block(Vec::new(), Some(matched)));
    b.module.functions.push(f);

    match b.lower() {
        Err(LowerError::NonExhaustiveMatch { context, union }) => {
            assert_eq!(context.decl, "Mod.F");
            assert_eq!(union, "U");
        }
        other => panic!("expected non-exhaustive match, got {other:?}"),
    }
}

#[test]
fn while_loop_with_break() {
    let mut b = ModuleBuilder::new();
    let flag = b.param("flag", Type::Bool);
    let cond = b.read(flag.var, Type::Bool);
    let stop = b.expr(ExprKind::Break, Type::Unit);
    let body = b.block_expr(vec![Stmt::Expr(stop)], None, Type::Unit);
    let lp = b.expr(ExprKind::While { cond, body }, Type::Unit);
    let spin = b.function("Spin", vec![flag], Type::Unit, block(vec![Stmt::Expr(lp)], None));
    b.module.functions.push(spin);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "Spin")),
        "\
fn Spin(_param0 (flag): bool) -> unit {
    let _returnValue: unit;

    bb0: {
        goto -> bb1;
    }

    bb1: {
        switchInt(_param0) -> [0: bb3, otherwise: bb2];
    }

    bb2: {
        goto -> bb3;
    }

    bb3: {
        return;
    }
}
"
    );
}

#[test]
fn break_outside_loop_is_rejected() {
    let mut b = ModuleBuilder::new();
    let stop = b.expr(ExprKind::Break, Type::Unit);
    let f = b.function("F", Vec::new(), Type::Unit, block(Vec::new(), Some(stop)));
    b.module.functions.push(f);

    match b.lower() {
        Err(LowerError::OutsideLoop { context, keyword }) => {
            assert_eq!(context.decl, "Mod.F");
            assert_eq!(keyword, "break");
        }
        other => panic!("expected break outside loop, got {other:?}"),
    }
}

#[test]
fn logical_and_short_circuits() {
    let mut b = ModuleBuilder::new();
    let a = b.param("a", Type::Bool);
    let c = b.param("b", Type::Bool);
    let lhs = b.read(a.var, Type::Bool);
    let rhs = b.read(c.var, Type::Bool);
    let both = b.expr(
        ExprKind::Binary {
            op: BinaryOp::And,
            lhs,
            rhs,
        },
        Type::Bool,
    );
    let f = b.function("Both", vec![a, c], Type::Bool, block(Vec::new(), Some(both)));
    b.module.functions.push(f);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "Both")),
        "\
fn Both(_param0 (a): bool, _param1 (b): bool) -> bool {
    let _returnValue: bool;

    bb0: {
        switchInt(_param0) -> [0: bb2, otherwise: bb1];
    }

    bb1: {
        _returnValue = _param1;
        goto -> bb3;
    }

    bb2: {
        _returnValue = false;
        goto -> bb3;
    }

    bb3: {
        return;
    }
}
"
    );
}

#[test]
fn if_else_as_a_value() {
    let mut b = ModuleBuilder::new();
    let c = b.param("c", Type::Bool);
    let cond = b.read(c.var, Type::Bool);
    let one = b.int(1);
    let two = b.int(2);
    let choice = b.expr(
        ExprKind::If {
            cond,
            then_branch: one,
            else_branch: Some(two),
        },
        I32,
    );
    let f = b.function("Pick", vec![c], I32, block(Vec::new(), Some(choice)));
    b.module.functions.push(f);

    let module = b.lower_ok();
    let body = &b.method(&module, "Pick").body;
    assert_eq!(body.blocks.len(), 4);
    assert_eq!(
        b.render(b.method(&module, "Pick")),
        "\
fn Pick(_param0 (c): bool) -> i32 {
    let _returnValue: i32;

    bb0: {
        switchInt(_param0) -> [0: bb2, otherwise: bb1];
    }

    bb1: {
        _returnValue = 1_i32;
        goto -> bb3;
    }

    bb2: {
        _returnValue = 2_i32;
        goto -> bb3;
    }

    bb3: {
        return;
    }
}
"
    );
}

#[test]
fn code_after_return_lands_in_an_unreached_block() {
    let mut b = ModuleBuilder::new();
    let one = b.int(1);
    let ret = b.expr(ExprKind::Return(Some(one)), Type::Unit);
    let two = b.int(2);
    let f = b.function("F", Vec::new(), I32, block(vec![Stmt::Expr(ret)], Some(two)));
    b.module.functions.push(f);

    let Ok((module, problems)) = b.lower() else {
        panic!("code after return lowers");
    };
    assert_eq!(problems, Vec::new());
    assert_eq!(
        b.render(b.method(&module, "F")),
        "\
fn F() -> i32 {
    let _returnValue: i32;

    bb0: {
        _returnValue = 1_i32;
        goto -> bb2;
    }

    bb1: {
        _returnValue = 2_i32;
        goto -> bb2;
    }

    bb2: {
        return;
    }
}
"
    );
}

#[test]
fn static_initializer_is_attached_to_its_class() {
    let mut b = ModuleBuilder::new();
    let ten = b.int(10);
    let mut class = b.class("Config", &[]);
    class.static_fields.push(StaticFieldDecl {
        name: b.name("Limit"),
        ty: I32,
        init: ten,
        span: Span::DUMMY,
    });
    b.module.classes.push(class);

    let module = b.lower_ok();
    assert!(module.methods.is_empty());
    assert_eq!(
        pretty(b.data_type(&module, "Config"), &b.interner).to_string(),
        "\
type Config {
    variant _classVariant
    static Limit: i32 = {
        let _returnValue: i32;

        bb0: {
            _returnValue = 10_i32;
            goto -> bb1;
        }

        bb1: {
            return;
        }
    }
}
"
    );
}

#[test]
fn instance_method_value_binds_this() {
    // class Counter { count: i32; fn Get() -> i32 { count } fn Getter() -> () -> i32 { Get } }
    let mut b = ModuleBuilder::new();
    let count = b.name("count");
    let read = b.expr(ExprKind::Variable(Binding::Field(count)), I32);
    let mut get = b.function("Get", Vec::new(), I32, block(Vec::new(), Some(read)));
    get.is_static = false;

    let getter_ty = function_type(Vec::new(), I32);
    let value = b.function_value(&["Counter", "Get"], getter_ty.clone());
    let mut getter = b.function("Getter", Vec::new(), getter_ty, block(Vec::new(), Some(value)));
    getter.is_static = false;

    let mut class = b.class("Counter", &[("count", I32)]);
    class.methods = vec![get, getter];
    b.module.classes.push(class);

    let module = b.lower_ok();
    assert_eq!(b.data_type_names(&module), vec!["Counter", "Function`1"]);
    assert_eq!(
        b.method_names(&module),
        vec!["Counter__Get", "Counter__Getter", "Function`1__Call"]
    );
    assert_eq!(
        b.render(b.method(&module, "Counter__Getter")),
        "\
fn Counter__Getter(_param0 (this): *Counter) -> *Function`1<i32> {
    let _returnValue: *Function`1<i32>;

    bb0: {
        _returnValue = allocate<Function`1<i32>>() -> bb1;
    }

    bb1: {
        (*_returnValue) = new Function`1<i32>;
        (*_returnValue).FunctionReference = const Counter__Get;
        (*_returnValue).FunctionParameter = _param0;
        goto -> bb2;
    }

    bb2: {
        return;
    }
}
"
    );
    assert_eq!(
        b.render(b.method(&module, "Counter__Get")),
        "\
fn Counter__Get(_param0 (this): *Counter) -> i32 {
    let _returnValue: i32;

    bb0: {
        _returnValue = (*_param0).count;
        goto -> bb1;
    }

    bb1: {
        return;
    }
}
"
    );
}

#[test]
fn function_values_are_called_through_the_record() {
    let mut b = ModuleBuilder::new();
    let ty = function_type(vec![I32], I32);
    let f = b.param("f", ty.clone());
    let callee = b.read(f.var, ty);
    let three = b.int(3);
    let call = b.expr(
        ExprKind::Call {
            callee,
            args: vec![three],
        },
        I32,
    );
    let apply = b.function("Apply", vec![f], I32, block(Vec::new(), Some(call)));
    b.module.functions.push(apply);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "Apply")),
        "\
fn Apply(_param0 (f): *Function`2<i32, i32>) -> i32 {
    let _returnValue: i32;

    bb0: {
        _returnValue = Function`2__Call<i32, i32>(_param0, 3_i32) -> bb1;
    }

    bb1: {
        return;
    }
}
"
    );
}

#[test]
fn printf_calls_the_intrinsic() {
    let mut b = ModuleBuilder::new();
    let printf = FunctionRef::plain(DeclRef::Builtin(Builtin::Printf));
    let callee = b.expr(
        ExprKind::Function(printf),
        function_type(vec![Type::String], Type::Unit),
    );
    let text = b.name("hi");
    let message = b.expr(ExprKind::String(text), Type::String);
    let call = b.expr(
        ExprKind::Call {
            callee,
            args: vec![message],
        },
        Type::Unit,
    );
    b.module.main = block(vec![Stmt::Expr(call)], None);

    let module = b.lower_ok();
    assert_eq!(b.method_names(&module), vec!["_Main"]);
    assert!(module.data_types.is_empty());
    assert_eq!(
        b.render(b.method(&module, "_Main")),
        "\
fn _Main() -> unit {
    let _returnValue: unit;
    let _local0: unit;

    bb0: {
        _local0 = printf(\"hi\") -> bb1;
    }

    bb1: {
        return;
    }
}
"
    );
}

#[test]
fn function_value_arity_is_limited_by_config() {
    let mut b = ModuleBuilder::new();
    let f = b.param("f", function_type(vec![I32, I32], I32));
    let func = b.function("Takes", vec![f], Type::Unit, block(Vec::new(), None));
    b.module.functions.push(func);

    let config = LowerConfig::default().with_max_function_arity(1);
    match lower(&b.module, &b.interner, &config) {
        Err(LowerError::ArityOverflow { context, params, max }) => {
            assert_eq!(context.decl, "Mod.Takes");
            assert_eq!((params, max), (2, 1));
        }
        other => panic!("expected arity overflow, got {other:?}"),
    }
    assert!(b.lower().is_ok());
}

#[test]
fn continue_jumps_to_the_condition() {
    // fn Step(flag: bool) { while flag { if flag { continue; } break; } }
    let mut b = ModuleBuilder::new();
    let flag = b.param("flag", Type::Bool);
    let cond = b.read(flag.var, Type::Bool);
    let test = b.read(flag.var, Type::Bool);
    let skip = b.expr(ExprKind::Continue, Type::Unit);
    let then_branch = b.block_expr(vec![Stmt::Expr(skip)], None, Type::Unit);
    let check = b.expr(
        ExprKind::If {
            cond: test,
            then_branch,
            else_branch: None,
        },
        Type::Unit,
    );
    let stop = b.expr(ExprKind::Break, Type::Unit);
    let body = b.block_expr(vec![Stmt::Expr(check), Stmt::Expr(stop)], None, Type::Unit);
    let lp = b.expr(ExprKind::While { cond, body }, Type::Unit);
    let step = b.function("Step", vec![flag], Type::Unit, block(vec![Stmt::Expr(lp)], None));
    b.module.functions.push(step);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "Step")),
        "\
fn Step(_param0 (flag): bool) -> unit {
    let _returnValue: unit;

    bb0: {
        goto -> bb1;
    }

    bb1: {
        switchInt(_param0) -> [0: bb3, otherwise: bb2];
    }

    bb2: {
        switchInt(_param0) -> [0: bb5, otherwise: bb4];
    }

    bb3: {
        goto -> bb6;
    }

    bb4: {
        goto -> bb1;
    }

    bb5: {
        goto -> bb3;
    }

    bb6: {
        return;
    }
}
"
    );
}

#[test]
fn logical_or_short_circuits() {
    let mut b = ModuleBuilder::new();
    let a = b.param("a", Type::Bool);
    let c = b.param("b", Type::Bool);
    let lhs = b.read(a.var, Type::Bool);
    let rhs = b.read(c.var, Type::Bool);
    let either = b.expr(
        ExprKind::Binary {
            op: BinaryOp::Or,
            lhs,
            rhs,
        },
        Type::Bool,
    );
    let f = b.function("Either", vec![a, c], Type::Bool, block(Vec::new(), Some(either)));
    b.module.functions.push(f);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "Either")),
        "\
fn Either(_param0 (a): bool, _param1 (b): bool) -> bool {
    let _returnValue: bool;

    bb0: {
        switchInt(_param0) -> [0: bb1, otherwise: bb2];
    }

    bb1: {
        _returnValue = _param1;
        goto -> bb3;
    }

    bb2: {
        _returnValue = true;
        goto -> bb3;
    }

    bb3: {
        return;
    }
}
"
    );
}

#[test]
fn array_fill_is_a_single_statement() {
    let mut b = ModuleBuilder::new();
    let array = Type::Array {
        element: Box::new(I32),
        length: 3,
        boxing: Boxing::Boxed,
    };
    let v = b.param("v", I32);
    let value = b.read(v.var, I32);
    let filled = b.expr(ExprKind::ArrayFill { value, count: 3 }, array.clone());
    let f = b.function("Fill", vec![v], array, block(Vec::new(), Some(filled)));
    b.module.functions.push(f);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "Fill")),
        "\
fn Fill(_param0 (v): i32) -> *[i32; 3] {
    let _returnValue: *[i32; 3];

    bb0: {
        _returnValue = allocate<[i32; 3]>() -> bb1;
    }

    bb1: {
        (*_returnValue) = [_param0; 3];
        goto -> bb2;
    }

    bb2: {
        return;
    }
}
"
    );
}

#[test]
fn tuple_is_a_builtin_record() {
    let mut b = ModuleBuilder::new();
    let tuple = Type::Tuple {
        elements: vec![I32, Type::Bool],
        boxing: Boxing::Boxed,
    };
    let a = b.param("a", I32);
    let first = b.read(a.var, I32);
    let second = b.expr(ExprKind::Bool(true), Type::Bool);
    let literal = b.expr(ExprKind::Tuple(vec![first, second]), tuple.clone());
    let f = b.function("Two", vec![a], tuple, block(Vec::new(), Some(literal)));
    b.module.functions.push(f);

    let module = b.lower_ok();
    assert_eq!(b.data_type_names(&module), vec!["Tuple`2"]);
    assert_eq!(
        b.render(b.method(&module, "Two")),
        "\
fn Two(_param0 (a): i32) -> *Tuple`2<i32, bool> {
    let _returnValue: *Tuple`2<i32, bool>;

    bb0: {
        _returnValue = allocate<Tuple`2<i32, bool>>() -> bb1;
    }

    bb1: {
        (*_returnValue) = new Tuple`2<i32, bool>;
        (*_returnValue).Item0 = _param0;
        (*_returnValue).Item1 = true;
        goto -> bb2;
    }

    bb2: {
        return;
    }
}
"
    );
}

#[test]
fn class_like_case_is_built_inline() {
    // union Shape { Dot, Rect { w: i32, h: i32 } }
    // fn MakeRect(w: i32) -> Shape { new Shape::Rect { h = 2, w = w } }
    let mut b = ModuleBuilder::new();
    let dot = b.case("Dot", CaseKind::Unit);
    let fields = vec![
        FieldDecl {
            name: b.name("w"),
            ty: I32,
        },
        FieldDecl {
            name: b.name("h"),
            ty: I32,
        },
    ];
    let rect = b.case("Rect", CaseKind::Class(fields));
    let union = b.union("Shape", &[], vec![dot, rect]);
    b.module.unions.push(union);

    let w = b.param("w", I32);
    let width = b.read(w.var, I32);
    let height = b.int(2);
    let fields = vec![
        FieldInit {
            name: b.name("h"),
            value: height,
        },
        FieldInit {
            name: b.name("w"),
            value: width,
        },
    ];
    let built = b.expr(
        ExprKind::NewCase {
            union: b.type_ref("Shape", Vec::new()),
            case: b.name("Rect"),
            fields,
        },
        b.named("Shape"),
    );
    let f = b.function("MakeRect", vec![w], b.named("Shape"), block(Vec::new(), Some(built)));
    b.module.functions.push(f);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "MakeRect")),
        "\
fn MakeRect(_param0 (w): i32) -> *Shape {
    let _returnValue: *Shape;

    bb0: {
        _returnValue = allocate<Shape>() -> bb1;
    }

    bb1: {
        (*_returnValue) = new Shape;
        ((*_returnValue) as Rect)._variantIdentifier = 1_u16;
        ((*_returnValue) as Rect).w = _param0;
        ((*_returnValue) as Rect).h = 2_i32;
        goto -> bb2;
    }

    bb2: {
        return;
    }
}
"
    );
}

/// `class Point { x: i32 }` plus `fn {name}() -> Point { new Point { x = 1 } }`
/// with the given storage class.
fn point_constructor(name: &str, boxing: Boxing) -> ModuleBuilder {
    let mut b = ModuleBuilder::new();
    let class = b.class("Point", &[("x", I32)]);
    b.module.classes.push(class);
    let point = point_type(&b, boxing);
    let one = b.int(1);
    let built = b.expr(
        ExprKind::New {
            class: b.type_ref("Point", Vec::new()),
            fields: vec![FieldInit {
                name: b.name("x"),
                value: one,
            }],
        },
        point.clone(),
    );
    let f = b.function(name, Vec::new(), point, block(Vec::new(), Some(built)));
    b.module.functions.push(f);
    b
}

fn point_type(b: &ModuleBuilder, boxing: Boxing) -> Type {
    Type::Named {
        decl: DeclRef::Path(b.path(&["Point"])),
        args: Vec::new(),
        boxing,
    }
}

#[test]
fn boxed_object_is_allocated() {
    let b = point_constructor("Boxed", Boxing::Boxed);
    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "Boxed")),
        "\
fn Boxed() -> *Point {
    let _returnValue: *Point;

    bb0: {
        _returnValue = allocate<Point>() -> bb1;
    }

    bb1: {
        (*_returnValue) = new Point;
        (*_returnValue).x = 1_i32;
        goto -> bb2;
    }

    bb2: {
        return;
    }
}
"
    );
}

#[test]
fn unboxed_object_never_allocates() {
    let b = point_constructor("Inline", Boxing::Unboxed);
    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "Inline")),
        "\
fn Inline() -> Point {
    let _returnValue: Point;

    bb0: {
        _returnValue = new Point;
        _returnValue.x = 1_i32;
        goto -> bb1;
    }

    bb1: {
        return;
    }
}
"
    );
}

/// `_Main { var a = new Point { x = 1 }; a = new Point { x = a.x }; }`
fn rebuild_from_old_value(boxing: Boxing) -> ModuleBuilder {
    let mut b = ModuleBuilder::new();
    let class = b.class("Point", &[("x", I32)]);
    b.module.classes.push(class);
    let point = point_type(&b, boxing);
    let x = b.name("x");

    let one = b.int(1);
    let first = b.expr(
        ExprKind::New {
            class: b.type_ref("Point", Vec::new()),
            fields: vec![FieldInit { name: x, value: one }],
        },
        point.clone(),
    );
    let (a, decl) = b.declare("a", point.clone(), first);
    let object = b.read(a, point.clone());
    let old = b.expr(ExprKind::Field { object, field: x }, I32);
    let second = b.expr(
        ExprKind::New {
            class: b.type_ref("Point", Vec::new()),
            fields: vec![FieldInit { name: x, value: old }],
        },
        point.clone(),
    );
    let target = b.read(a, point);
    let assign = b.expr(
        ExprKind::Assign {
            target,
            value: second,
        },
        Type::Unit,
    );
    b.module.main = block(vec![decl, Stmt::Expr(assign)], None);
    b
}

#[test]
fn reassigned_object_reads_the_old_value() {
    let b = rebuild_from_old_value(Boxing::Boxed);
    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "_Main")),
        "\
fn _Main() -> unit {
    let _returnValue: unit;
    let _local0 (a): *Point;
    let _local1: *Point;

    bb0: {
        _local0 = allocate<Point>() -> bb1;
    }

    bb1: {
        (*_local0) = new Point;
        (*_local0).x = 1_i32;
        _local1 = allocate<Point>() -> bb2;
    }

    bb2: {
        (*_local1) = new Point;
        (*_local1).x = (*_local0).x;
        _local0 = _local1;
        goto -> bb3;
    }

    bb3: {
        return;
    }
}
"
    );
}

#[test]
fn reassigned_unboxed_object_reads_the_old_value() {
    let b = rebuild_from_old_value(Boxing::Unboxed);
    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "_Main")),
        "\
fn _Main() -> unit {
    let _returnValue: unit;
    let _local0 (a): Point;
    let _local1: Point;

    bb0: {
        _local0 = new Point;
        _local0.x = 1_i32;
        _local1 = new Point;
        _local1.x = _local0.x;
        _local0 = _local1;
        goto -> bb1;
    }

    bb1: {
        return;
    }
}
"
    );
}

#[test]
fn index_bound_takes_the_index_type() {
    let mut b = ModuleBuilder::new();
    let array = Type::Array {
        element: Box::new(I32),
        length: 4,
        boxing: Boxing::Boxed,
    };
    let byte = Type::Int(IntKind::U8);
    let a = b.param("a", array.clone());
    let i = b.param("i", byte.clone());
    let base = b.read(a.var, array);
    let index = b.read(i.var, byte);
    let element = b.expr(ExprKind::Index { array: base, index }, I32);
    let at = b.function("At", vec![a, i], I32, block(Vec::new(), Some(element)));
    b.module.functions.push(at);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "At")),
        "\
fn At(_param0 (a): *[i32; 4], _param1 (i): u8) -> i32 {
    let _returnValue: i32;
    let _local0: bool;

    bb0: {
        _local0 = _param1 < 4_u8;
        assert(_local0) -> bb1;
    }

    bb1: {
        _returnValue = (*_param0)[_param1];
        goto -> bb2;
    }

    bb2: {
        return;
    }
}
"
    );
}

#[test]
fn capturing_function_value_holds_its_closure() {
    // fn Outer(x: i32) -> () -> i32 { fn Inner() -> i32 { x } Inner }
    let mut b = ModuleBuilder::new();
    let x = b.param("x", I32);
    let read = b.read(x.var, I32);
    let inner = b.function("Inner", Vec::new(), I32, block(Vec::new(), Some(read)));
    let ty = function_type(Vec::new(), I32);
    let value = b.function_value(&["Outer", "Inner"], ty.clone());
    let outer = b.function(
        "Outer",
        vec![x],
        ty,
        block(vec![Stmt::Function(Box::new(inner))], Some(value)),
    );
    b.module.functions.push(outer);

    let module = b.lower_ok();
    assert_eq!(
        b.data_type_names(&module),
        vec!["Outer__Locals", "Outer__Inner__Closure", "Function`1"]
    );
    assert_eq!(
        b.render(b.method(&module, "Outer")),
        "\
fn Outer(_param0 (x): i32) -> *Function`1<i32> {
    let _returnValue: *Function`1<i32>;
    let _localsObject: *Outer__Locals;
    let _local1: *Outer__Inner__Closure;

    bb0: {
        _localsObject = allocate<Outer__Locals>() -> bb1;
    }

    bb1: {
        (*_localsObject) = new Outer__Locals;
        (*_localsObject).x = _param0;
        _local1 = allocate<Outer__Inner__Closure>() -> bb2;
    }

    bb2: {
        (*_local1) = new Outer__Inner__Closure;
        (*_local1).Outer__Locals = _localsObject;
        _returnValue = allocate<Function`1<i32>>() -> bb3;
    }

    bb3: {
        (*_returnValue) = new Function`1<i32>;
        (*_returnValue).FunctionReference = const Outer__Inner;
        (*_returnValue).FunctionParameter = _local1;
        goto -> bb4;
    }

    bb4: {
        return;
    }
}
"
    );
}

#[test]
fn member_function_value_binds_the_receiver() {
    // class Counter { count: i32; fn Get() -> i32 { count } }
    // fn Take(c: Counter) -> () -> i32 { c.Get }
    let mut b = ModuleBuilder::new();
    let count = b.name("count");
    let read = b.expr(ExprKind::Variable(Binding::Field(count)), I32);
    let mut get = b.function("Get", Vec::new(), I32, block(Vec::new(), Some(read)));
    get.is_static = false;
    let mut class = b.class("Counter", &[("count", I32)]);
    class.methods.push(get);
    b.module.classes.push(class);

    let c = b.param("c", b.named("Counter"));
    let receiver = b.read(c.var, b.named("Counter"));
    let ty = function_type(Vec::new(), I32);
    let value = b.expr(
        ExprKind::MemberFunction {
            receiver,
            function: FunctionRef::plain(DeclRef::Path(b.path(&["Counter", "Get"]))),
        },
        ty.clone(),
    );
    let take = b.function("Take", vec![c], ty, block(Vec::new(), Some(value)));
    b.module.functions.push(take);

    let module = b.lower_ok();
    assert_eq!(
        b.method_names(&module),
        vec!["Counter__Get", "Take", "Function`1__Call"]
    );
    assert_eq!(
        b.render(b.method(&module, "Take")),
        "\
fn Take(_param0 (c): *Counter) -> *Function`1<i32> {
    let _returnValue: *Function`1<i32>;

    bb0: {
        _returnValue = allocate<Function`1<i32>>() -> bb1;
    }

    bb1: {
        (*_returnValue) = new Function`1<i32>;
        (*_returnValue).FunctionReference = const Counter__Get;
        (*_returnValue).FunctionParameter = _param0;
        goto -> bb2;
    }

    bb2: {
        return;
    }
}
"
    );
}

#[test]
fn generic_function_value_is_instantiated() {
    // fn Identity<T>(v: T) -> T { v }
    // fn Take() -> (i32) -> i32 { Identity<i32> }
    let mut b = ModuleBuilder::new();
    let t = b.generic(&["Identity"], "T");
    let v = b.param("v", t.clone());
    let read = b.read(v.var, t.clone());
    let mut identity = b.function("Identity", vec![v], t, block(Vec::new(), Some(read)));
    identity.type_params = vec![b.name("T")];
    b.module.functions.push(identity);

    let ty = function_type(vec![I32], I32);
    let reference = FunctionRef {
        decl: DeclRef::Path(b.path(&["Identity"])),
        type_args: vec![I32],
        owner_args: Vec::new(),
    };
    let value = b.expr(ExprKind::Function(reference), ty.clone());
    let take = b.function("Take", Vec::new(), ty, block(Vec::new(), Some(value)));
    b.module.functions.push(take);

    let module = b.lower_ok();
    assert_eq!(
        b.render(b.method(&module, "Take")),
        "\
fn Take() -> *Function`2<i32, i32> {
    let _returnValue: *Function`2<i32, i32>;

    bb0: {
        _returnValue = allocate<Function`2<i32, i32>>() -> bb1;
    }

    bb1: {
        (*_returnValue) = new Function`2<i32, i32>;
        (*_returnValue).FunctionReference = const Identity<i32>;
        goto -> bb2;
    }

    bb2: {
        return;
    }
}
"
    );
}

/// Shape of one generated module function.
#[derive(Clone, Debug)]
enum Generated {
    /// `fn F{i}() -> i32 { value }`
    Constant(u64),
    /// `fn F{i}(x: i32) -> i32 { fn Inner() -> i32 { x } Inner() }`
    Closure(u64),
    /// `fn F{i}(u: U) -> i32 { match u { A => 1, B => 2 } }`
    Match,
}

fn generated() -> impl Strategy<Value = Generated> {
    prop_oneof![
        (0u64..1000).prop_map(Generated::Constant),
        (0u64..1000).prop_map(Generated::Closure),
        Just(Generated::Match),
    ]
}

/// One function per shape, each called once from `_Main`.
fn generated_module(shapes: &[Generated]) -> ModuleBuilder {
    let mut b = ModuleBuilder::new();
    two_unit_cases(&mut b);
    let mut calls = Vec::with_capacity(shapes.len());
    for (i, shape) in shapes.iter().enumerate() {
        let name = format!("F{i}");
        let (f, arg) = match shape {
            Generated::Constant(value) => {
                let literal = b.int(*value);
                let f = b.function(&name, Vec::new(), I32, block(Vec::new(), Some(literal)));
                (f, None)
            }
            Generated::Closure(value) => {
                let x = b.param("x", I32);
                let read = b.read(x.var, I32);
                let inner = b.function("Inner", Vec::new(), I32, block(Vec::new(), Some(read)));
                let call = b.call(&[name.as_str(), "Inner"], Vec::new(), I32);
                let body = block(vec![Stmt::Function(Box::new(inner))], Some(call));
                let f = b.function(&name, vec![x], I32, body);
                (f, Some(b.int(*value)))
            }
            Generated::Match => {
                let u = b.param("u", b.named("U"));
                let scrutinee = b.read(u.var, b.named("U"));
                let one = b.int(1);
                let two = b.int(2);
                let arms = vec![
                    MatchArm {
                        pattern: case_pattern(&b, "U", "A", CaseFields::None),
                        body: one,
                    },
                    MatchArm {
                        pattern: case_pattern(&b, "U", "B", CaseFields::None),
                        body: two,
                    },
                ];
                let matched = b.expr(ExprKind::Match { scrutinee, arms }, I32);
                let f = b.function(&name, vec![u], I32, block(Vec::new(), Some(matched)));
                let case = ExprKind::UnionCase {
                    union: b.type_ref("U", Vec::new()),
                    case: b.name("A"),
                };
                let value = b.expr(case, b.named("U"));
                (f, Some(value))
            }
        };
        b.module.functions.push(f);
        let call = b.call(&[name.as_str()], arg.into_iter().collect(), I32);
        calls.push(Stmt::Expr(call));
    }
    b.module.main = block(calls, None);
    b
}

proptest! {
    #[test]
    fn lowering_is_deterministic(shapes in prop::collection::vec(generated(), 1..6)) {
        let b = generated_module(&shapes);
        let first = b.lower_ok();
        let second = b.lower_ok();
        prop_assert_eq!(&first, &second);

        let closures = shapes
            .iter()
            .filter(|shape| matches!(shape, Generated::Closure(_)))
            .count();
        // One method per function, one per nested function, plus `_Main`.
        prop_assert_eq!(first.methods.len(), shapes.len() + closures + 1);
        // `U`, then a locals and a closure record per capturing function.
        prop_assert_eq!(first.data_types.len(), 1 + 2 * closures);

        for method in &first.methods {
            let blocks = method.body.blocks.len();
            for block in &method.body.blocks {
                for target in block.terminator.successors() {
                    prop_assert!(target.index() < blocks);
                }
            }
        }
        for (i, shape) in shapes.iter().enumerate() {
            if let Generated::Closure(_) = shape {
                let f = b.method(&first, &format!("F{i}"));
                prop_assert_eq!(f.body.locals[0].local, Local::LocalsObject);
            }
        }
    }
}
