//! Shared test utilities for the lowering pass.
//!
//! [`ModuleBuilder`] assembles a checked module by hand, the way the checker
//! would hand it over: every expression typed, every name resolved, every
//! variable given a fresh [`VarId`]. Only compiled in test builds.

use kelp_ir::ast::{
    Binding, Block, CaseDecl, CaseKind, CheckedModule, ClassDecl, DeclPath, DeclRef, Expr,
    ExprId, ExprKind, FieldDecl, FunctionDecl, FunctionRef, IntKind, ParamDecl, Stmt, Type,
    TypeRef, UnionDecl, VarDecl, VarId,
};
use kelp_ir::{Name, Span, StringInterner};

use crate::closure::CaptureAnalysis;
use crate::context::{LowerCx, Site};
use crate::identity::DeclIndex;
use crate::ir::{DataType, DefId, LoweredModule, Method};
use crate::{lower, pretty, LowerConfig, LowerError, LowerProblem};

pub(crate) const I32: Type = Type::Int(IntKind::I32);

/// A checked module under construction, with the interner its names live in.
pub(crate) struct ModuleBuilder {
    pub interner: StringInterner,
    pub module: CheckedModule,
    next_var: u32,
}

impl ModuleBuilder {
    /// Empty module `Mod`.
    pub(crate) fn new() -> Self {
        let interner = StringInterner::new();
        let module = CheckedModule::new(interner.intern("Mod"));
        ModuleBuilder {
            interner,
            module,
            next_var: 0,
        }
    }

    pub(crate) fn name(&self, text: &str) -> Name {
        self.interner.intern(text)
    }

    pub(crate) fn path(&self, segments: &[&str]) -> DeclPath {
        DeclPath::from_segments(segments.iter().map(|segment| self.name(segment)))
    }

    /// Boxed reference to a non-generic module type.
    pub(crate) fn named(&self, name: &str) -> Type {
        Type::named(self.path(&[name]), Vec::new())
    }

    /// Reference to a module type, for construction and case expressions.
    pub(crate) fn type_ref(&self, name: &str, args: Vec<Type>) -> TypeRef {
        TypeRef {
            decl: DeclRef::Path(self.path(&[name])),
            args,
        }
    }

    /// Generic parameter `name` declared by `owner`.
    pub(crate) fn generic(&self, owner: &[&str], name: &str) -> Type {
        Type::Generic {
            owner: DeclRef::Path(self.path(owner)),
            name: self.name(name),
        }
    }

    // Expressions

    pub(crate) fn expr(&mut self, kind: ExprKind, ty: Type) -> ExprId {
        self.module.arena.alloc(Expr {
            kind,
            ty,
            span: Span::DUMMY,
        })
    }

    /// Expression with a distinct span, for diagnostics.
    pub(crate) fn expr_at(&mut self, kind: ExprKind, ty: Type, span: Span) -> ExprId {
        self.module.arena.alloc(Expr { kind, ty, span })
    }

    /// `i32` literal.
    pub(crate) fn int(&mut self, value: u64) -> ExprId {
        self.expr(ExprKind::Int(value), I32)
    }

    pub(crate) fn fresh_var(&mut self) -> VarId {
        let var = VarId::new(self.next_var);
        self.next_var += 1;
        var
    }

    pub(crate) fn read(&mut self, var: VarId, ty: Type) -> ExprId {
        self.expr(ExprKind::Variable(Binding::Var(var)), ty)
    }

    /// A function named by its declaration path, used as a value.
    pub(crate) fn function_value(&mut self, segments: &[&str], ty: Type) -> ExprId {
        let decl = DeclRef::Path(self.path(segments));
        self.expr(ExprKind::Function(FunctionRef::plain(decl)), ty)
    }

    /// Direct call of a non-generic function; the callee's type is derived
    /// from the arguments.
    pub(crate) fn call(&mut self, segments: &[&str], args: Vec<ExprId>, ret: Type) -> ExprId {
        let params = args
            .iter()
            .map(|&arg| self.module.arena.get_expr(arg).ty.clone())
            .collect();
        let callee = self.function_value(
            segments,
            Type::Function {
                params,
                ret: Box::new(ret.clone()),
            },
        );
        self.expr(ExprKind::Call { callee, args }, ret)
    }

    pub(crate) fn block_expr(&mut self, stmts: Vec<Stmt>, tail: Option<ExprId>, ty: Type) -> ExprId {
        self.expr(ExprKind::Block(block(stmts, tail)), ty)
    }

    // Declarations

    pub(crate) fn param(&mut self, name: &str, ty: Type) -> ParamDecl {
        ParamDecl {
            var: self.fresh_var(),
            name: self.name(name),
            ty,
        }
    }

    /// `var name: ty = init`.
    pub(crate) fn declare(&mut self, name: &str, ty: Type, init: ExprId) -> (VarId, Stmt) {
        let var = self.fresh_var();
        let stmt = Stmt::Var(VarDecl {
            var,
            name: self.name(name),
            ty,
            init: Some(init),
            span: Span::DUMMY,
        });
        (var, stmt)
    }

    /// Non-generic static function.
    pub(crate) fn function(
        &self,
        name: &str,
        params: Vec<ParamDecl>,
        return_type: Type,
        body: Block,
    ) -> FunctionDecl {
        FunctionDecl {
            name: self.name(name),
            type_params: Vec::new(),
            params,
            return_type,
            is_static: true,
            body,
            span: Span::DUMMY,
        }
    }

    pub(crate) fn case(&self, name: &str, kind: CaseKind) -> CaseDecl {
        CaseDecl {
            name: self.name(name),
            kind,
        }
    }

    /// Union without methods; push it onto `module.unions` when done.
    pub(crate) fn union(&self, name: &str, type_params: &[&str], cases: Vec<CaseDecl>) -> UnionDecl {
        UnionDecl {
            name: self.name(name),
            type_params: type_params.iter().map(|param| self.name(param)).collect(),
            cases,
            methods: Vec::new(),
            span: Span::DUMMY,
        }
    }

    /// Non-generic class with instance fields only.
    pub(crate) fn class(&self, name: &str, fields: &[(&str, Type)]) -> ClassDecl {
        ClassDecl {
            name: self.name(name),
            type_params: Vec::new(),
            fields: fields
                .iter()
                .map(|(field, ty)| FieldDecl {
                    name: self.name(field),
                    ty: ty.clone(),
                })
                .collect(),
            static_fields: Vec::new(),
            methods: Vec::new(),
            span: Span::DUMMY,
        }
    }

    // Lowering

    /// Run `f` against a fresh lowering context for the module, before any
    /// capture record is planned.
    pub(crate) fn with_cx<R>(&self, f: impl FnOnce(&mut LowerCx<'_>) -> R) -> R {
        let config = LowerConfig::default();
        let index = DeclIndex::build(&self.module, &self.interner, &config);
        let analysis = CaptureAnalysis::analyze(&index);
        let mut cx = LowerCx::new(&self.interner, &config, index, analysis);
        f(&mut cx)
    }

    /// Site attributed to the module itself.
    pub(crate) fn site(&self) -> Site {
        Site {
            def: self.def(self.interner.lookup(self.module.id)),
            span: Span::DUMMY,
        }
    }

    /// Identifier `Mod.{path}`.
    pub(crate) fn def(&self, path: &str) -> DefId {
        DefId::new(self.module.id, self.name(path))
    }

    pub(crate) fn lower(&self) -> Result<(LoweredModule, Vec<LowerProblem>), LowerError> {
        lower(&self.module, &self.interner, &LowerConfig::default())
    }

    pub(crate) fn lower_ok(&self) -> LoweredModule {
        match self.lower() {
            Ok((module, _)) => module,
            Err(error) => panic!("lowering failed: {error}"),
        }
    }

    pub(crate) fn method<'m>(&self, module: &'m LoweredModule, name: &str) -> &'m Method {
        module
            .method(self.name(name))
            .unwrap_or_else(|| panic!("no method `{name}`"))
    }

    pub(crate) fn data_type<'m>(&self, module: &'m LoweredModule, name: &str) -> &'m DataType {
        module
            .data_type(self.name(name))
            .unwrap_or_else(|| panic!("no data type `{name}`"))
    }

    /// Pretty-printed method, for golden comparisons.
    pub(crate) fn render(&self, method: &Method) -> String {
        pretty::method(method, &self.interner)
    }

    /// Names of every emitted method, in order.
    pub(crate) fn method_names(&self, module: &LoweredModule) -> Vec<&str> {
        module
            .methods
            .iter()
            .map(|method| self.interner.lookup(method.name))
            .collect()
    }

    /// Names of every emitted data type, in order.
    pub(crate) fn data_type_names(&self, module: &LoweredModule) -> Vec<&str> {
        module
            .data_types
            .iter()
            .map(|ty| self.interner.lookup(ty.name))
            .collect()
    }
}

pub(crate) fn block(stmts: Vec<Stmt>, tail: Option<ExprId>) -> Block {
    Block { stmts, tail }
}

/// ```text
/// fn Outer(x: i32) -> i32 {
///     fn Inner() -> i32 { x }
///     Inner()
/// }
/// ```
pub(crate) fn capturing_module() -> ModuleBuilder {
    let mut b = ModuleBuilder::new();
    let x = b.param("x", I32);
    let read = b.read(x.var, I32);
    let inner = b.function("Inner", Vec::new(), I32, block(Vec::new(), Some(read)));
    let call = b.call(&["Outer", "Inner"], Vec::new(), I32);
    let outer = b.function(
        "Outer",
        vec![x],
        I32,
        block(vec![Stmt::Function(Box::new(inner))], Some(call)),
    );
    b.module.functions.push(outer);
    b
}
