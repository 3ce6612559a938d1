//! Type lowering: checked [`Type`]s to [`LoweredType`]s.
//!
//! | Checked type            | Lowered type                                   |
//! |-------------------------|------------------------------------------------|
//! | `i32`, `bool`, ...      | primitive                                      |
//! | class / union           | concrete type; pointer to it unless `unboxed`  |
//! | generic parameter       | placeholder (declaring definition + name)      |
//! | `[T; n]`                | array; pointer to it unless `unboxed`          |
//! | `(A, B)`                | `Tuple`2<A, B>`; pointer to it unless `unboxed` |
//! | `(A) -> R`              | pointer to `Function`2<A, R>`                  |
//!
//! Referencing a tuple, function or `result` type registers the matching
//! built-in declaration on first use.

use kelp_ir::ast::{Boxing, Builtin, DeclRef, Type};
use kelp_ir::Name;

use crate::context::{LowerCx, Site};
use crate::error::LowerError;
use crate::ir::{ConcreteType, GenericPlaceholder, LoweredType, PrimitiveType};

impl LowerCx<'_> {
    pub(crate) fn lower_type(&mut self, ty: &Type, site: Site) -> Result<LoweredType, LowerError> {
        kelp_stack::ensure_sufficient_stack(|| self.lower_type_inner(ty, site))
    }

    fn lower_type_inner(&mut self, ty: &Type, site: Site) -> Result<LoweredType, LowerError> {
        Ok(match ty {
            Type::Int(kind) => LoweredType::Primitive((*kind).into()),
            Type::Bool => LoweredType::Primitive(PrimitiveType::Bool),
            Type::String => LoweredType::Primitive(PrimitiveType::String),
            Type::Unit => LoweredType::Primitive(PrimitiveType::Unit),
            Type::Named { decl, args, boxing } => {
                let concrete = self.named_type(decl, args, site)?;
                with_boxing(LoweredType::Concrete(concrete), *boxing)
            }
            Type::Generic { owner, name } => {
                LoweredType::Generic(self.placeholder(owner, *name, site)?)
            }
            Type::Array {
                element,
                length,
                boxing,
            } => {
                let element = self.lower_type(element, site)?;
                let array = LoweredType::Array {
                    element: Box::new(element),
                    length: *length,
                };
                with_boxing(array, *boxing)
            }
            Type::Tuple { elements, boxing } => {
                let args = self.lower_types(elements, site)?;
                with_boxing(LoweredType::Concrete(self.tuple_type(args)), *boxing)
            }
            Type::Function { params, ret } => {
                let params = self.lower_types(params, site)?;
                let ret = self.lower_type(ret, site)?;
                LoweredType::Concrete(self.function_type(params, ret, site)?).pointer()
            }
        })
    }

    pub(crate) fn lower_types(
        &mut self,
        tys: &[Type],
        site: Site,
    ) -> Result<Vec<LoweredType>, LowerError> {
        tys.iter().map(|ty| self.lower_type(ty, site)).collect()
    }

    /// Instantiation of a class or union, without the storage pointer.
    pub(crate) fn named_type(
        &mut self,
        decl: &DeclRef,
        args: &[Type],
        site: Site,
    ) -> Result<ConcreteType, LowerError> {
        let args = self.lower_types(args, site)?;
        match decl {
            DeclRef::Builtin(Builtin::Result) => Ok(self.result_type(args)),
            DeclRef::Path(path) => {
                let Some(ty) = self.index.type_by_path(path) else {
                    return Err(self.unknown_decl(decl, site));
                };
                let info = self.index.ty(ty);
                Ok(ConcreteType {
                    name: info.name,
                    def: info.id,
                    args,
                })
            }
            DeclRef::Builtin(Builtin::Printf) => Err(self.unknown_decl(decl, site)),
        }
    }

    pub(crate) fn placeholder(
        &self,
        owner: &DeclRef,
        name: Name,
        site: Site,
    ) -> Result<GenericPlaceholder, LowerError> {
        let owner = match owner {
            DeclRef::Path(path) => self.index.generic_owner(path),
            DeclRef::Builtin(Builtin::Result) => Some(self.result_def()),
            DeclRef::Builtin(Builtin::Printf) => None,
        };
        match owner {
            Some(owner) => Ok(GenericPlaceholder { owner, name }),
            None => Err(LowerError::UnboundGeneric {
                context: self.context(site),
                name: self.name(name).to_owned(),
            }),
        }
    }

    pub(crate) fn unknown_decl(&self, decl: &DeclRef, site: Site) -> LowerError {
        LowerError::UnknownDeclaration {
            context: self.context(site),
            name: self.index.display_ref(decl),
        }
    }
}

fn with_boxing(ty: LoweredType, boxing: Boxing) -> LoweredType {
    match boxing {
        Boxing::Boxed => ty.pointer(),
        Boxing::Unboxed => ty,
    }
}

/// Placeholders as type arguments, e.g. the `<T>` of `MyClass<T>` seen from
/// inside `MyClass`.
pub(crate) fn placeholder_args(params: &[GenericPlaceholder]) -> Vec<LoweredType> {
    params.iter().copied().map(LoweredType::Generic).collect()
}

/// First placeholder in `ty` that is not one of `params`.
pub(crate) fn first_unbound(
    ty: &LoweredType,
    params: &[GenericPlaceholder],
) -> Option<GenericPlaceholder> {
    match ty {
        LoweredType::Primitive(_) => None,
        LoweredType::Generic(placeholder) => {
            (!params.contains(placeholder)).then_some(*placeholder)
        }
        LoweredType::Concrete(concrete) => concrete
            .args
            .iter()
            .find_map(|arg| first_unbound(arg, params)),
        LoweredType::Pointer(inner) | LoweredType::Array { element: inner, .. } => {
            first_unbound(inner, params)
        }
        LoweredType::FunctionPointer { params: inputs, ret } => inputs
            .iter()
            .chain(std::iter::once(&**ret))
            .find_map(|arg| first_unbound(arg, params)),
    }
}

/// Replace the generic parameters declared by `owner` with `args`.
pub(crate) fn substitute(ty: &Type, owner: &DeclRef, params: &[Name], args: &[Type]) -> Type {
    match ty {
        Type::Generic { owner: o, name } if o == owner => params
            .iter()
            .position(|param| param == name)
            .and_then(|position| args.get(position))
            .cloned()
            .unwrap_or_else(|| ty.clone()),
        Type::Named { decl, args: inner, boxing } => Type::Named {
            decl: decl.clone(),
            args: inner
                .iter()
                .map(|arg| substitute(arg, owner, params, args))
                .collect(),
            boxing: *boxing,
        },
        Type::Array {
            element,
            length,
            boxing,
        } => Type::Array {
            element: Box::new(substitute(element, owner, params, args)),
            length: *length,
            boxing: *boxing,
        },
        Type::Tuple { elements, boxing } => Type::Tuple {
            elements: elements
                .iter()
                .map(|element| substitute(element, owner, params, args))
                .collect(),
            boxing: *boxing,
        },
        Type::Function { params: inputs, ret } => Type::Function {
            params: inputs
                .iter()
                .map(|input| substitute(input, owner, params, args))
                .collect(),
            ret: Box::new(substitute(ret, owner, params, args)),
        },
        Type::Int(_) | Type::Bool | Type::String | Type::Unit | Type::Generic { .. } => {
            ty.clone()
        }
    }
}
