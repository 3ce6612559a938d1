//! Module assembly: drives every other stage and collects their output.
//!
//! Lowering runs in two phases over a shared [`LowerCx`]:
//!
//! 1. **Layout**: union and class data types (with case factories), then
//!    the capture records of every scope. Nothing is lowered yet, so every
//!    record a body may reference exists before the first body is built.
//! 2. **Bodies**: per union its methods then its factories, per class its
//!    static initializers then its methods, then `_Main`, then module
//!    functions. Nested functions are emitted before the function that
//!    declares them.
//!
//! Data types are emitted as unions, classes, capture records, then
//! built-ins in discovery order; methods as the bodies above followed by
//! built-in methods.

use kelp_ir::ast::CheckedModule;
use kelp_ir::StringInterner;
use tracing::Level;

use crate::closure::{plan_records, CaptureAnalysis};
use crate::context::{LowerCx, Site};
use crate::error::{LowerError, LowerProblem};
use crate::identity::{DeclIndex, ScopeId, TypeKind};
use crate::ir::{DataType, LoweredModule, Method};
use crate::layout::{lower_class, lower_union};
use crate::lower::lower_scope;
use crate::statics::lower_static;
use crate::types::first_unbound;
use crate::{pretty, LowerConfig};

pub(crate) fn lower_module(
    module: &CheckedModule,
    interner: &StringInterner,
    config: &LowerConfig,
) -> Result<(LoweredModule, Vec<LowerProblem>), LowerError> {
    let _span = tracing::debug_span!("lower_module", module = interner.lookup(module.id)).entered();

    let index = DeclIndex::build(module, interner, config);
    let analysis = CaptureAnalysis::analyze(&index);
    let mut cx = LowerCx::new(interner, config, index, analysis);

    // Phase 1: layouts and capture records.
    let mut unions = Vec::new();
    let mut classes = Vec::new();
    let types: Vec<_> = cx.index.types().map(|(id, info)| (id, info.kind)).collect();
    for (id, kind) in types {
        match kind {
            TypeKind::Union(decl) => unions.push((id, lower_union(&mut cx, id, decl)?)),
            TypeKind::Class(decl) => classes.push((id, lower_class(&mut cx, id, decl)?)),
        }
    }
    cx.plan = plan_records(&mut cx)?;

    // Phase 2: bodies.
    let mut data_types: Vec<DataType> = Vec::with_capacity(unions.len() + classes.len());
    let mut methods: Vec<Method> = Vec::new();

    for (id, (data_type, factories)) in unions {
        let scopes = cx.index.ty(id).methods.clone();
        for scope in scopes {
            lower_tree(&mut cx, scope, &mut methods)?;
        }
        methods.extend(factories);
        data_types.push(data_type);
    }

    for (id, mut data_type) in classes {
        let statics = cx.index.ty(id).statics.clone();
        for scope in statics {
            // Functions nested in an initializer are ordinary methods.
            let nested = cx.index.scope(scope).children.clone();
            for child in nested {
                lower_tree(&mut cx, child, &mut methods)?;
            }
            if let Some(field) = lower_static(&mut cx, scope)? {
                data_type.static_fields.push(field);
            }
        }
        let scopes = cx.index.ty(id).methods.clone();
        for scope in scopes {
            lower_tree(&mut cx, scope, &mut methods)?;
        }
        data_types.push(data_type);
    }

    if let Some(main) = cx.index.main {
        lower_tree(&mut cx, main, &mut methods)?;
    }
    let functions = cx.index.functions.clone();
    for scope in functions {
        lower_tree(&mut cx, scope, &mut methods)?;
    }

    let plan = std::mem::take(&mut cx.plan);
    data_types.extend(plan.records);
    let builtins = std::mem::take(&mut cx.builtins);
    data_types.extend(builtins.data_types);
    methods.extend(builtins.methods);

    let lowered = LoweredModule {
        id: module.id,
        data_types,
        methods,
    };
    tracing::debug!(
        data_types = lowered.data_types.len(),
        methods = lowered.methods.len(),
        "lowered module"
    );
    Ok((lowered, Vec::new()))
}

/// Lower `root` and every function nested in it, innermost first.
fn lower_tree(
    cx: &mut LowerCx<'_>,
    root: ScopeId,
    methods: &mut Vec<Method>,
) -> Result<(), LowerError> {
    for scope in cx.index.post_order(root) {
        methods.push(lower_method(cx, scope)?);
    }
    Ok(())
}

fn lower_method(cx: &mut LowerCx<'_>, scope: ScopeId) -> Result<Method, LowerError> {
    let info = cx.index.scope(scope);
    let (id, name, span, type_params) = (info.id, info.name, info.span, info.type_params.clone());
    let lowered = lower_scope(cx, scope)?;

    // Every placeholder a signature or slot mentions must be bound by the
    // method.
    let slot_types = lowered
        .params
        .iter()
        .chain(&lowered.body.locals)
        .map(|local| &local.ty)
        .chain(std::iter::once(&lowered.body.return_type));
    for ty in slot_types {
        if let Some(unbound) = first_unbound(ty, &type_params) {
            return Err(LowerError::UnboundGeneric {
                context: cx.context(Site { def: id, span }),
                name: cx.name(unbound.name).to_owned(),
            });
        }
    }

    let method = Method {
        id,
        name,
        type_params,
        params: lowered.params,
        body: lowered.body,
    };
    if tracing::enabled!(Level::TRACE) {
        tracing::trace!("\n{}", pretty::pretty(&method, cx.interner));
    }
    Ok(method)
}
