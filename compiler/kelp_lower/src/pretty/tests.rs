use kelp_ir::{BinaryOp, StringInterner, UnaryOp};
use pretty_assertions::assert_eq;

use super::*;
use crate::ir::{DefId, GenericPlaceholder, PrimitiveType};

fn show<T>(value: &T, interner: &StringInterner) -> String
where
    for<'a> Pretty<'a, T>: fmt::Display,
{
    pretty(value, interner).to_string()
}

#[test]
fn places_show_variant_views() {
    let interner = StringInterner::new();
    let class_variant = interner.intern("_classVariant");
    let ok = interner.intern("Ok");
    let field = interner.intern("Item0");
    let base = Place::local(Local::Param(1)).deref();

    assert_eq!(
        show(&base.clone().field(field, class_variant), &interner),
        "(*_param1).Item0"
    );
    assert_eq!(
        show(&base.clone().field(field, ok), &interner),
        "((*_param1) as Ok).Item0"
    );
    assert_eq!(
        show(&base.index(Operand::uint(3, 8)), &interner),
        "(*_param1)[3_u64]"
    );
    assert_eq!(show(&Place::local(Local::LocalsObject), &interner), "_localsObject");
}

#[test]
fn static_fields_are_qualified_by_owner() {
    let interner = StringInterner::new();
    let module = interner.intern("Mod");
    let owner = interner.intern("Config");
    let place = Place::StaticField {
        owner: ConcreteType {
            name: owner,
            def: DefId::new(module, owner),
            args: Vec::new(),
        },
        field: interner.intern("Limit"),
    };
    assert_eq!(show(&place, &interner), "Config::Limit");
}

#[test]
fn constants_carry_their_width() {
    let interner = StringInterner::new();
    let cases = [
        (Constant::Int { value: -5, bytes: 4 }, "-5_i32"),
        (Constant::UInt { value: 7, bytes: 1 }, "7_u8"),
        (Constant::Bool(false), "false"),
        (Constant::String(interner.intern("a\"b")), "\"a\\\"b\""),
        (Constant::Unit, "()"),
    ];
    for (constant, expected) in cases {
        assert_eq!(show(&constant, &interner), expected);
    }

    let name = interner.intern("Identity");
    let reference = Constant::Function(FunctionRef {
        name,
        def: DefId::new(interner.intern("Mod"), name),
        type_args: vec![LoweredType::BOOL],
    });
    assert_eq!(show(&reference, &interner), "const Identity<bool>");
}

#[test]
fn rvalues() {
    let interner = StringInterner::new();
    let x = Place::local(Local::Var(0)).copy();
    let binary = Rvalue::Binary {
        op: BinaryOp::LtEq,
        lhs: x.clone(),
        rhs: Operand::uint(1, 2),
    };
    assert_eq!(show(&binary, &interner), "_local0 <= 1_u16");
    let negated = Rvalue::Unary {
        op: UnaryOp::Not,
        operand: x.clone(),
    };
    assert_eq!(show(&negated, &interner), "!_local0");
    let filled = Rvalue::Fill {
        value: x,
        count: 4,
    };
    assert_eq!(show(&filled, &interner), "[_local0; 4]");
}

#[test]
fn types() {
    let interner = StringInterner::new();
    let owner = DefId::new(interner.intern("Mod"), interner.intern("Box"));
    let t = LoweredType::Generic(GenericPlaceholder {
        owner,
        name: interner.intern("T"),
    });
    let boxed = LoweredType::Concrete(ConcreteType {
        name: interner.intern("Box"),
        def: owner,
        args: vec![t.clone()],
    })
    .pointer();
    assert_eq!(show(&boxed, &interner), "*Box<T>");

    let array = LoweredType::Array {
        element: Box::new(LoweredType::Primitive(PrimitiveType::I8)),
        length: 0,
    };
    assert_eq!(show(&array, &interner), "[i8; 0]");

    let pointer = LoweredType::FunctionPointer {
        params: vec![t.clone(), LoweredType::UNIT.pointer()],
        ret: Box::new(t),
    };
    assert_eq!(show(&pointer, &interner), "fn(T, *unit) -> T");
}

#[test]
fn terminators() {
    let interner = StringInterner::new();
    let name = interner.intern("Work");
    let call = Terminator::MethodCall {
        function: Callee::Direct(FunctionRef {
            name,
            def: DefId::new(interner.intern("Mod"), name),
            type_args: Vec::new(),
        }),
        args: vec![Operand::bool(true), Operand::UNIT],
        destination: Place::local(Local::ReturnValue),
        target: crate::ir::BlockId::new(4),
    };
    assert_eq!(show(&call, &interner), "_returnValue = Work(true, ()) -> bb4");
    assert_eq!(show(&Terminator::Return, &interner), "return");
}

#[test]
fn module_lists_types_before_methods() {
    let interner = StringInterner::new();
    let module_name = interner.intern("Mod");
    let unit = interner.intern("Marker");
    let entry = interner.intern("_Main");
    let lowered = LoweredModule {
        id: module_name,
        data_types: vec![DataType {
            id: DefId::new(module_name, unit),
            name: unit,
            type_params: Vec::new(),
            variants: vec![Variant {
                name: interner.intern("Only"),
                fields: Vec::new(),
            }],
            static_fields: Vec::new(),
        }],
        methods: vec![Method {
            id: DefId::new(module_name, entry),
            name: entry,
            type_params: Vec::new(),
            params: Vec::new(),
            body: crate::lower::BodyBuilder::new().finish(LoweredType::UNIT),
        }],
    };

    assert_eq!(
        module(&lowered, &interner),
        "\
module Mod

type Marker {
    variant Only
}

fn _Main() -> unit {
    let _returnValue: unit;

    bb0: {
        return;
    }
}
"
    );
}
