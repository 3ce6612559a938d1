//! Closure analysis and capture planning.
//!
//! # Analysis
//!
//! Every scope is scanned once for the variables it declares, the variables
//! it references, whether it needs `this`, and which nested functions it
//! references. The variables a nested function needs from outside itself are
//! then computed as a fixpoint:
//!
//! ```text
//! free(F) = (uses(F) ∪ free(children of F) ∪ free(nested functions F references))
//!           − declared(F)
//! ```
//!
//! A variable is *promoted* when some function nested in its declaring scope
//! has it free. Promoted variables live in the declaring scope's
//! `{scope}__Locals` record instead of a local slot.
//!
//! # Plan
//!
//! For each scope with promoted variables: a `{scope}__Locals` record with
//! captured parameters first, then captured locals in declaration order.
//!
//! For each nested function with free variables or a need for `this`: a
//! `{function}__Closure` record holding `this` (when needed) and one pointer
//! per ancestor `Locals` record it reads from, outermost first, each field
//! named after the record it points to.

use kelp_ir::ast::{
    Binding, DeclRef, Expr, ExprArena, ExprId, ExprKind, FunctionDecl, ParamDecl, Pattern, Type,
    VarDecl, VarId,
};
use kelp_ir::visitor::{walk_expr, walk_pattern, Visitor};
use kelp_ir::Name;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::{LowerCx, Site};
use crate::error::LowerError;
use crate::identity::{DeclIndex, ScopeId, ScopeKind};
use crate::ir::{ConcreteType, DataType, Field, LoweredType, Variant};
use crate::types::placeholder_args;

/// A local variable declared in a scope body: `var` statements and match
/// bindings, in source order.
#[derive(Copy, Clone, Debug)]
pub(crate) struct LocalDecl<'a> {
    pub var: VarId,
    pub name: Name,
    pub ty: &'a Type,
}

/// What one scope declares and references, ignoring nested functions.
#[derive(Debug, Default)]
pub(crate) struct ScopeScan<'a> {
    pub params: Vec<&'a ParamDecl>,
    pub locals: Vec<LocalDecl<'a>>,
    uses: FxHashSet<VarId>,
    uses_this: bool,
    references: Vec<ScopeId>,
}

struct Scanner<'i, 'a> {
    index: &'i DeclIndex<'a>,
    scan: ScopeScan<'a>,
}

impl<'a> Visitor<'a> for Scanner<'_, 'a> {
    fn visit_expr(&mut self, _id: ExprId, expr: &'a Expr, arena: &'a ExprArena) {
        match &expr.kind {
            ExprKind::Variable(Binding::Var(var)) => {
                self.scan.uses.insert(*var);
            }
            ExprKind::Variable(Binding::This | Binding::Field(_)) => self.scan.uses_this = true,
            ExprKind::Function(function) => {
                if let DeclRef::Path(path) = &function.decl {
                    if let Some(target) = self.index.function_by_path(path) {
                        let info = self.index.scope(target);
                        if info.is_nested() {
                            self.scan.references.push(target);
                        }
                        // An instance method named without a receiver is
                        // bound to the current `this`.
                        if info.is_instance {
                            self.scan.uses_this = true;
                        }
                    }
                }
            }
            _ => {}
        }
        kelp_stack::ensure_sufficient_stack(|| walk_expr(self, expr, arena));
    }

    fn visit_var_decl(&mut self, decl: &'a VarDecl, arena: &'a ExprArena) {
        self.scan.locals.push(LocalDecl {
            var: decl.var,
            name: decl.name,
            ty: &decl.ty,
        });
        if let Some(init) = decl.init {
            self.visit_expr_id(init, arena);
        }
    }

    fn visit_function(&mut self, _function: &'a FunctionDecl, _arena: &'a ExprArena) {}

    fn visit_pattern(&mut self, pattern: &'a Pattern) {
        if let Pattern::Binding { var, name, ty } = pattern {
            self.scan.locals.push(LocalDecl {
                var: *var,
                name: *name,
                ty,
            });
        }
        walk_pattern(self, pattern);
    }
}

fn scan_scope<'a>(index: &DeclIndex<'a>, scope: ScopeId) -> ScopeScan<'a> {
    let arena = &index.module.arena;
    let mut scanner = Scanner {
        index,
        scan: ScopeScan::default(),
    };
    match index.scope(scope).kind {
        ScopeKind::Main(block) => scanner.visit_block(block, arena),
        ScopeKind::Function(decl) => {
            scanner.scan.params.extend(decl.params.iter());
            scanner.visit_block(&decl.body, arena);
        }
        ScopeKind::StaticInit(field) => scanner.visit_expr_id(field.init, arena),
    }
    scanner.scan
}

/// Result of the capture fixpoint.
pub(crate) struct CaptureAnalysis<'a> {
    scans: Vec<ScopeScan<'a>>,
    free: Vec<FxHashSet<VarId>>,
    needs_this: Vec<bool>,
    declared_in: FxHashMap<VarId, ScopeId>,
    promoted: FxHashSet<VarId>,
}

impl<'a> CaptureAnalysis<'a> {
    pub(crate) fn analyze(index: &DeclIndex<'a>) -> Self {
        let scans: Vec<ScopeScan<'a>> = index
            .scopes()
            .map(|(scope, _)| scan_scope(index, scope))
            .collect();

        let mut declared_in = FxHashMap::default();
        let mut declared: Vec<FxHashSet<VarId>> = Vec::with_capacity(scans.len());
        for ((scope, _), scan) in index.scopes().zip(&scans) {
            let vars: FxHashSet<VarId> = scan
                .params
                .iter()
                .map(|param| param.var)
                .chain(scan.locals.iter().map(|local| local.var))
                .collect();
            for &var in &vars {
                declared_in.insert(var, scope);
            }
            declared.push(vars);
        }

        let mut free: Vec<FxHashSet<VarId>> = scans
            .iter()
            .zip(&declared)
            .map(|(scan, declared)| scan.uses.difference(declared).copied().collect())
            .collect();
        let mut needs_this: Vec<bool> = scans.iter().map(|scan| scan.uses_this).collect();

        let mut rounds = 0usize;
        loop {
            rounds += 1;
            let mut changed = false;
            for (scope, info) in index.scopes() {
                let i = scope.index();
                let sources = info.children.iter().chain(&scans[i].references);
                let mut incoming = Vec::new();
                let mut this_incoming = false;
                for source in sources {
                    incoming.extend(free[source.index()].iter().copied());
                    this_incoming |= needs_this[source.index()];
                }
                for var in incoming {
                    if !declared[i].contains(&var) && free[i].insert(var) {
                        changed = true;
                    }
                }
                if this_incoming && !needs_this[i] {
                    needs_this[i] = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut promoted = FxHashSet::default();
        for (scope, info) in index.scopes() {
            for child in &info.children {
                promoted.extend(
                    free[child.index()]
                        .iter()
                        .copied()
                        .filter(|var| declared[scope.index()].contains(var)),
                );
            }
        }

        tracing::debug!(rounds, promoted = promoted.len(), "closure analysis converged");
        CaptureAnalysis {
            scans,
            free,
            needs_this,
            declared_in,
            promoted,
        }
    }

    pub(crate) fn scan(&self, scope: ScopeId) -> &ScopeScan<'a> {
        &self.scans[scope.index()]
    }

    pub(crate) fn is_promoted(&self, var: VarId) -> bool {
        self.promoted.contains(&var)
    }

    /// Scope declaring `var`.
    pub(crate) fn declaring_scope(&self, var: VarId) -> Option<ScopeId> {
        self.declared_in.get(&var).copied()
    }

    /// Does `scope` need `this` from an enclosing instance method?
    pub(crate) fn needs_this(&self, scope: ScopeId) -> bool {
        self.needs_this[scope.index()]
    }

    fn free_vars(&self, scope: ScopeId) -> &FxHashSet<VarId> {
        &self.free[scope.index()]
    }
}

/// Synthesized capture record of one scope.
#[derive(Clone, Debug)]
pub(crate) struct LocalsRecord {
    /// The record instantiated with the scope's own placeholders.
    pub ty: ConcreteType,
    pub fields: FxHashMap<VarId, Name>,
}

#[derive(Clone, Debug)]
pub(crate) struct ClosureRecord {
    pub ty: ConcreteType,
    pub captures_this: bool,
    /// Ancestor scopes whose `Locals` record is reachable, outermost first.
    pub ancestors: Vec<ScopeId>,
}

/// Capture records of every scope.
#[derive(Default)]
pub(crate) struct CapturePlan {
    locals: Vec<Option<LocalsRecord>>,
    closures: Vec<Option<ClosureRecord>>,
    /// Record data types in emission order.
    pub records: Vec<DataType>,
}

impl CapturePlan {
    pub(crate) fn locals(&self, scope: ScopeId) -> Option<&LocalsRecord> {
        self.locals.get(scope.index()).and_then(Option::as_ref)
    }

    pub(crate) fn closure(&self, scope: ScopeId) -> Option<&ClosureRecord> {
        self.closures.get(scope.index()).and_then(Option::as_ref)
    }
}

/// Synthesize the `Locals` and `Closure` records of every scope, in scope
/// order: a scope's `Locals`, then its `Closure`, then its nested functions'.
pub(crate) fn plan_records(cx: &mut LowerCx<'_>) -> Result<CapturePlan, LowerError> {
    let scope_count = cx.index.scope_count();
    let mut plan = CapturePlan {
        locals: Vec::with_capacity(scope_count),
        closures: Vec::with_capacity(scope_count),
        records: Vec::new(),
    };

    let scopes: Vec<ScopeId> = cx.index.scopes().map(|(scope, _)| scope).collect();
    for scope in scopes {
        validate_captures(cx, scope)?;

        let locals = plan_locals(cx, scope, &mut plan.records)?;
        plan.locals.push(locals);
        let closure = plan_closure(cx, &plan, scope)?;
        if let Some((record, data_type)) = closure {
            plan.records.push(data_type);
            plan.closures.push(Some(record));
        } else {
            plan.closures.push(None);
        }
    }
    Ok(plan)
}

/// Every free variable must be declared by an ancestor, and `this` must be
/// available from the outermost enclosing method.
fn validate_captures(cx: &LowerCx<'_>, scope: ScopeId) -> Result<(), LowerError> {
    let info = cx.index.scope(scope);
    let site = Site {
        def: info.id,
        span: info.span,
    };
    let mut free: Vec<VarId> = cx.analysis.free_vars(scope).iter().copied().collect();
    free.sort_unstable();
    for var in free {
        let reachable = cx
            .analysis
            .declaring_scope(var)
            .is_some_and(|declaring| cx.index.is_ancestor(declaring, scope));
        if !reachable {
            return Err(LowerError::UnresolvedCapture {
                context: cx.context(site),
                name: cx.var_name(var),
            });
        }
    }

    if info.is_nested() && cx.analysis.needs_this(scope) {
        let root = cx.index.ancestors(scope).first().copied().unwrap_or(scope);
        if !cx.index.scope(root).is_instance {
            return Err(LowerError::NoReceiver {
                context: cx.context(site),
            });
        }
    }
    Ok(())
}

fn plan_locals<'a>(
    cx: &mut LowerCx<'a>,
    scope: ScopeId,
    records: &mut Vec<DataType>,
) -> Result<Option<LocalsRecord>, LowerError> {
    let info = cx.index.scope(scope);
    let (scope_name, scope_def, span) = (info.name, info.id, info.span);
    let type_params = info.type_params.clone();
    let scan = cx.analysis.scan(scope);

    let captured: Vec<(VarId, Name, &'a Type)> = scan
        .params
        .iter()
        .map(|&param| (param.var, param.name, &param.ty))
        .chain(scan.locals.iter().map(|local| (local.var, local.name, local.ty)))
        .filter(|(var, _, _)| cx.analysis.is_promoted(*var))
        .collect();
    if captured.is_empty() {
        return Ok(None);
    }

    let site = Site {
        def: scope_def,
        span,
    };
    let mut seen: FxHashMap<Name, usize> = FxHashMap::default();
    let mut fields = Vec::with_capacity(captured.len());
    let mut by_var = FxHashMap::default();
    for (var, name, ty) in captured {
        let count = seen.entry(name).or_insert(0);
        let field_name = if *count == 0 {
            name
        } else {
            cx.intern(format!("{}_{count}", cx.name(name)))
        };
        *count += 1;
        fields.push(Field {
            name: field_name,
            ty: cx.lower_type(ty, site)?,
        });
        by_var.insert(var, field_name);
    }

    let name = cx.intern(format!("{}__Locals", cx.name(scope_name)));
    let def = cx.module_def(name);
    tracing::debug!(record = cx.name(name), fields = fields.len(), "planned locals record");
    records.push(DataType {
        id: def,
        name,
        type_params: type_params.clone(),
        variants: vec![Variant {
            name: cx.names.class_variant,
            fields,
        }],
        static_fields: Vec::new(),
    });
    Ok(Some(LocalsRecord {
        ty: ConcreteType {
            name,
            def,
            args: placeholder_args(&type_params),
        },
        fields: by_var,
    }))
}

fn plan_closure(
    cx: &LowerCx<'_>,
    plan: &CapturePlan,
    scope: ScopeId,
) -> Result<Option<(ClosureRecord, DataType)>, LowerError> {
    let info = cx.index.scope(scope);
    if !info.is_nested() {
        return Ok(None);
    }
    let captures_this = cx.analysis.needs_this(scope);
    let free = cx.analysis.free_vars(scope);
    let ancestors: Vec<ScopeId> = cx
        .index
        .ancestors(scope)
        .into_iter()
        .filter(|&ancestor| {
            plan.locals(ancestor)
                .is_some_and(|record| free.iter().any(|var| record.fields.contains_key(var)))
        })
        .collect();
    if !captures_this && ancestors.is_empty() {
        return Ok(None);
    }

    let (scope_name, type_params, owner) = (info.name, info.type_params.clone(), info.owner);
    let mut fields = Vec::with_capacity(ancestors.len() + 1);
    if captures_this {
        let Some(owner) = owner else {
            return Err(LowerError::NoReceiver {
                context: cx.context(Site {
                    def: info.id,
                    span: info.span,
                }),
            });
        };
        let owner = cx.index.ty(owner);
        let this_ty = ConcreteType {
            name: owner.name,
            def: owner.id,
            args: placeholder_args(&owner.type_params),
        };
        fields.push(Field {
            name: cx.names.this,
            ty: LoweredType::Concrete(this_ty).pointer(),
        });
    }
    for &ancestor in &ancestors {
        if let Some(record) = plan.locals(ancestor) {
            fields.push(Field {
                name: record.ty.name,
                ty: LoweredType::Concrete(record.ty.clone()).pointer(),
            });
        }
    }

    let name = cx.intern(format!("{}__Closure", cx.name(scope_name)));
    let def = cx.module_def(name);
    tracing::debug!(record = cx.name(name), fields = fields.len(), "planned closure record");
    let record = ClosureRecord {
        ty: ConcreteType {
            name,
            def,
            args: placeholder_args(&type_params),
        },
        captures_this,
        ancestors,
    };
    let data_type = DataType {
        id: def,
        name,
        type_params,
        variants: vec![Variant {
            name: cx.names.class_variant,
            fields,
        }],
        static_fields: Vec::new(),
    };
    Ok(Some((record, data_type)))
}

impl LowerCx<'_> {
    /// Source name of a variable, for error messages.
    pub(crate) fn var_name(&self, var: VarId) -> String {
        self.analysis
            .declaring_scope(var)
            .and_then(|scope| {
                let scan = self.analysis.scan(scope);
                scan.params
                    .iter()
                    .find(|param| param.var == var)
                    .map(|param| param.name)
                    .or_else(|| {
                        scan.locals
                            .iter()
                            .find(|local| local.var == var)
                            .map(|local| local.name)
                    })
            })
            .map_or_else(|| format!("{var:?}"), |name| self.name(name).to_owned())
    }
}
