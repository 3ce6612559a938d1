//! Object and union layout.
//!
//! - A class becomes a data type with a single `_classVariant` variant
//!   holding its instance fields. Classes carry no discriminant.
//! - A union becomes one variant per case. Each variant starts with
//!   `_variantIdentifier: u16`, valued at the case's declaration index,
//!   followed by `Item0..` for tuple cases or the declared fields for
//!   class-like cases.
//! - Every case with at least one field gets a factory
//!   `{Union}__Create__{Case}` that allocates, tags, fills in the fields and
//!   returns the pointer. Unit cases are constructed inline where used.
//!
//! The owning type's generic parameters are in scope for every field type
//! and factory signature.

use kelp_ir::ast::{Builtin, CaseKind, ClassDecl, DeclRef, Type, TypeRef, UnionDecl};
use kelp_ir::Name;

use crate::context::{LowerCx, Site};
use crate::error::LowerError;
use crate::identity::{TypeId, TypeKind};
use crate::ir::{
    Callee, ConcreteType, DataType, DefId, Field, FunctionRef, GenericPlaceholder, Local,
    LoweredType, Method, MethodLocal, Operand, Place, Rvalue, Variant,
};
use crate::lower::BodyBuilder;
use crate::types::{placeholder_args, substitute};

/// One case of a union as seen from a use site: generic arguments of the
/// use site already substituted into the field types.
#[derive(Clone, Debug)]
pub(crate) struct CaseLayout {
    pub name: Name,
    pub discriminant: u64,
    pub fields: Vec<(Name, Type)>,
}

/// Everything needed to synthesize one factory method.
pub(crate) struct FactoryPlan {
    pub id: DefId,
    pub name: Name,
    pub type_params: Vec<GenericPlaceholder>,
    /// The union instantiated with its own placeholders.
    pub union: ConcreteType,
    pub case: Name,
    pub discriminant: u64,
    pub fields: Vec<Field>,
}

/// Data type of a class. Static fields are attached once their
/// initializers are lowered.
pub(crate) fn lower_class(
    cx: &mut LowerCx<'_>,
    ty: TypeId,
    decl: &ClassDecl,
) -> Result<DataType, LowerError> {
    let info = cx.index.ty(ty);
    let (id, name, type_params) = (info.id, info.name, info.type_params.clone());
    let site = Site {
        def: id,
        span: decl.span,
    };

    let mut fields = Vec::with_capacity(decl.fields.len());
    for field in &decl.fields {
        fields.push(Field {
            name: field.name,
            ty: cx.lower_type(&field.ty, site)?,
        });
    }

    tracing::debug!(class = cx.name(name), fields = fields.len(), "lowered class layout");
    Ok(DataType {
        id,
        name,
        type_params,
        variants: vec![Variant {
            name: cx.names.class_variant,
            fields,
        }],
        static_fields: Vec::new(),
    })
}

/// Data type of a union plus the factories of its payload cases.
pub(crate) fn lower_union(
    cx: &mut LowerCx<'_>,
    ty: TypeId,
    decl: &UnionDecl,
) -> Result<(DataType, Vec<Method>), LowerError> {
    let info = cx.index.ty(ty);
    let (id, name, type_params) = (info.id, info.name, info.type_params.clone());
    let site = Site {
        def: id,
        span: decl.span,
    };
    let union = ConcreteType {
        name,
        def: id,
        args: placeholder_args(&type_params),
    };

    let mut variants = Vec::with_capacity(decl.cases.len());
    let mut factories = Vec::new();
    for (discriminant, case) in decl.cases.iter().enumerate() {
        let mut payload = Vec::new();
        match &case.kind {
            CaseKind::Unit => {}
            CaseKind::Tuple(items) => {
                for (i, item) in items.iter().enumerate() {
                    payload.push(Field {
                        name: cx.item(i),
                        ty: cx.lower_type(item, site)?,
                    });
                }
            }
            CaseKind::Class(fields) => {
                for field in fields {
                    payload.push(Field {
                        name: field.name,
                        ty: cx.lower_type(&field.ty, site)?,
                    });
                }
            }
        }

        if !payload.is_empty() {
            let factory_name = factory_name(cx, name, case.name);
            factories.push(build_factory(
                cx,
                FactoryPlan {
                    id: cx.module_def(factory_name),
                    name: factory_name,
                    type_params: type_params.clone(),
                    union: union.clone(),
                    case: case.name,
                    discriminant: discriminant as u64,
                    fields: payload.clone(),
                },
            ));
        }

        let mut fields = Vec::with_capacity(payload.len() + 1);
        fields.push(cx.discriminant_field());
        fields.extend(payload);
        variants.push(Variant {
            name: case.name,
            fields,
        });
    }

    tracing::debug!(
        union = cx.name(name),
        cases = variants.len(),
        factories = factories.len(),
        "lowered union layout"
    );
    Ok((
        DataType {
            id,
            name,
            type_params,
            variants,
            static_fields: Vec::new(),
        },
        factories,
    ))
}

fn factory_name(cx: &LowerCx<'_>, union: Name, case: Name) -> Name {
    cx.intern(format!("{}__Create__{}", cx.name(union), cx.name(case)))
}

/// Factory body: allocate into `_returnValue`, write the discriminant and
/// every field from the parameters, return the pointer.
pub(crate) fn build_factory(cx: &LowerCx<'_>, plan: FactoryPlan) -> Method {
    let union_ty = LoweredType::Concrete(plan.union.clone());
    let ret = Place::local(Local::ReturnValue);
    let object = ret.clone().deref();

    let mut builder = BodyBuilder::new();
    builder.call(
        Callee::Direct(cx.allocate_ref(union_ty.clone())),
        Vec::new(),
        ret,
    );
    builder.assign(object.clone(), Rvalue::CreateObject(plan.union));
    builder.assign(
        object.clone().field(cx.names.variant_id, plan.case),
        Rvalue::Use(Operand::uint(plan.discriminant, 2)),
    );

    let mut params = Vec::with_capacity(plan.fields.len());
    for (i, field) in plan.fields.into_iter().enumerate() {
        let param = Local::param(i);
        builder.assign(
            object.clone().field(field.name, plan.case),
            Rvalue::Use(Place::local(param).copy()),
        );
        params.push(MethodLocal {
            local: param,
            user_name: Some(field.name),
            ty: field.ty,
        });
    }

    tracing::debug!(factory = cx.name(plan.name), "synthesized case factory");
    Method {
        id: plan.id,
        name: plan.name,
        type_params: plan.type_params,
        params,
        body: builder.finish(union_ty.pointer()),
    }
}

impl LowerCx<'_> {
    /// Cases of the union `union`, instantiated for its type arguments.
    pub(crate) fn union_cases(
        &self,
        union: &TypeRef,
        site: Site,
    ) -> Result<Vec<CaseLayout>, LowerError> {
        match &union.decl {
            DeclRef::Builtin(Builtin::Result) => {
                let item0 = self.item(0);
                let arg = |i: usize| union.args.get(i).cloned().unwrap_or(Type::Unit);
                Ok(vec![
                    CaseLayout {
                        name: self.names.ok,
                        discriminant: 0,
                        fields: vec![(item0, arg(0))],
                    },
                    CaseLayout {
                        name: self.names.error,
                        discriminant: 1,
                        fields: vec![(item0, arg(1))],
                    },
                ])
            }
            DeclRef::Path(path) => {
                let decl = self
                    .index
                    .type_by_path(path)
                    .map(|ty| self.index.ty(ty).kind);
                let Some(TypeKind::Union(decl)) = decl else {
                    return Err(self.unknown_decl(&union.decl, site));
                };
                let subst = |ty: &Type| substitute(ty, &union.decl, &decl.type_params, &union.args);
                Ok(decl
                    .cases
                    .iter()
                    .enumerate()
                    .map(|(discriminant, case)| CaseLayout {
                        name: case.name,
                        discriminant: discriminant as u64,
                        fields: match &case.kind {
                            CaseKind::Unit => Vec::new(),
                            CaseKind::Tuple(items) => items
                                .iter()
                                .enumerate()
                                .map(|(i, item)| (self.item(i), subst(item)))
                                .collect(),
                            CaseKind::Class(fields) => fields
                                .iter()
                                .map(|field| (field.name, subst(&field.ty)))
                                .collect(),
                        },
                    })
                    .collect())
            }
            DeclRef::Builtin(Builtin::Printf) => Err(self.unknown_decl(&union.decl, site)),
        }
    }

    /// One case of `union`.
    pub(crate) fn union_case(
        &self,
        union: &TypeRef,
        case: Name,
        site: Site,
    ) -> Result<CaseLayout, LowerError> {
        self.union_cases(union, site)?
            .into_iter()
            .find(|layout| layout.name == case)
            .ok_or_else(|| LowerError::UnknownMember {
                context: self.context(site),
                owner: self.index.display_ref(&union.decl),
                name: self.name(case).to_owned(),
            })
    }

    /// Factory of a payload case, instantiated for the union's arguments.
    pub(crate) fn factory_ref(
        &mut self,
        union: &TypeRef,
        case: Name,
        site: Site,
    ) -> Result<FunctionRef, LowerError> {
        let args = self.lower_types(&union.args, site)?;
        match &union.decl {
            DeclRef::Builtin(Builtin::Result) => Ok(self.result_factory(case, args)),
            DeclRef::Path(path) => {
                let Some(ty) = self.index.type_by_path(path) else {
                    return Err(self.unknown_decl(&union.decl, site));
                };
                let name = factory_name(self, self.index.ty(ty).name, case);
                Ok(FunctionRef {
                    name,
                    def: self.module_def(name),
                    type_args: args,
                })
            }
            DeclRef::Builtin(Builtin::Printf) => Err(self.unknown_decl(&union.decl, site)),
        }
    }
}
