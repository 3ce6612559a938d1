//! Built-in declarations of the `std` module.
//!
//! The language provides a handful of declarations that every module may
//! use without declaring them. They are synthesized into the lowered module
//! the first time lowering references them, in discovery order:
//!
//! - `result<TValue, TError>`: union with `Ok` and `Error` cases, plus the
//!   factories `result__Create__Ok` and `result__Create__Error`.
//! - ``Function`N``: function-object record for functions of `N - 1`
//!   parameters, a class with `FunctionReference` and `FunctionParameter`
//!   fields, plus the forwarding method ``Function`N__Call``.
//! - ``Tuple`N``: record with fields `Item0..`.
//!
//! The intrinsics `allocate<T>() -> *T` and `printf(string)` are referenced by
//! lowered code but never emitted; the backend supplies them.

use kelp_ir::Name;
use smallvec::smallvec;

use crate::context::{LowerCx, Site};
use crate::error::LowerError;
use crate::ir::{
    Callee, ConcreteType, DataType, DefId, Field, FunctionRef, GenericPlaceholder, Local,
    LoweredType, Method, MethodLocal, Operand, Place, Terminator, Variant,
};
use crate::layout::{build_factory, FactoryPlan};
use crate::lower::BodyBuilder;
use crate::types::placeholder_args;

/// Built-in declarations discovered so far.
#[derive(Default)]
pub(crate) struct Builtins {
    result: bool,
    tuples: Vec<usize>,
    functions: Vec<usize>,
    pub data_types: Vec<DataType>,
    pub methods: Vec<Method>,
}

impl LowerCx<'_> {
    pub(crate) fn result_def(&self) -> DefId {
        self.std_def(self.names.result)
    }

    /// `result<value, error>`, registering the union on first use.
    pub(crate) fn result_type(&mut self, args: Vec<LoweredType>) -> ConcreteType {
        self.ensure_result();
        ConcreteType {
            name: self.names.result,
            def: self.result_def(),
            args,
        }
    }

    /// Factory of the `result` case `case` (`Ok` or `Error`).
    pub(crate) fn result_factory(&mut self, case: Name, args: Vec<LoweredType>) -> FunctionRef {
        self.ensure_result();
        let name = self.intern(format!("result__Create__{}", self.name(case)));
        FunctionRef {
            name,
            def: self.std_def(name),
            type_args: args,
        }
    }

    fn ensure_result(&mut self) {
        if self.builtins.result {
            return;
        }
        self.builtins.result = true;

        let def = self.result_def();
        let type_params = vec![
            GenericPlaceholder {
                owner: def,
                name: self.interner.intern("TValue"),
            },
            GenericPlaceholder {
                owner: def,
                name: self.interner.intern("TError"),
            },
        ];
        let union = ConcreteType {
            name: self.names.result,
            def,
            args: placeholder_args(&type_params),
        };
        let item0 = self.item(0);
        let cases = [self.names.ok, self.names.error];

        let mut variants = Vec::with_capacity(cases.len());
        for (discriminant, (&case, param)) in cases.iter().zip(&type_params).enumerate() {
            let payload = Field {
                name: item0,
                ty: LoweredType::Generic(*param),
            };
            variants.push(Variant {
                name: case,
                fields: vec![self.discriminant_field(), payload.clone()],
            });

            let name = self.intern(format!("result__Create__{}", self.name(case)));
            let factory = build_factory(
                self,
                FactoryPlan {
                    id: self.std_def(name),
                    name,
                    type_params: type_params.clone(),
                    union: union.clone(),
                    case,
                    discriminant: discriminant as u64,
                    fields: vec![payload],
                },
            );
            self.builtins.methods.push(factory);
        }

        tracing::debug!("synthesized built-in `result`");
        self.builtins.data_types.push(DataType {
            id: def,
            name: self.names.result,
            type_params,
            variants,
            static_fields: Vec::new(),
        });
    }

    /// ``Tuple`N<args>``, registering the record on first use.
    pub(crate) fn tuple_type(&mut self, args: Vec<LoweredType>) -> ConcreteType {
        let arity = args.len();
        let name = self.intern(format!("Tuple`{arity}"));
        let def = self.std_def(name);
        if !self.builtins.tuples.contains(&arity) {
            self.builtins.tuples.push(arity);
            let type_params: Vec<GenericPlaceholder> = (0..arity)
                .map(|i| GenericPlaceholder {
                    owner: def,
                    name: self.intern(format!("T{i}")),
                })
                .collect();
            let fields = type_params
                .iter()
                .enumerate()
                .map(|(i, param)| Field {
                    name: self.item(i),
                    ty: LoweredType::Generic(*param),
                })
                .collect();
            tracing::debug!(arity, "synthesized built-in tuple record");
            self.builtins.data_types.push(DataType {
                id: def,
                name,
                type_params,
                variants: vec![Variant {
                    name: self.names.class_variant,
                    fields,
                }],
                static_fields: Vec::new(),
            });
        }
        ConcreteType { name, def, args }
    }

    /// ``Function`N<params.., ret>``, registering the record and its `Call`
    /// method on first use.
    pub(crate) fn function_type(
        &mut self,
        params: Vec<LoweredType>,
        ret: LoweredType,
        site: Site,
    ) -> Result<ConcreteType, LowerError> {
        let param_count = params.len();
        if param_count > self.config.max_function_arity {
            return Err(LowerError::ArityOverflow {
                context: self.context(site),
                params: param_count,
                max: self.config.max_function_arity,
            });
        }
        let arity = param_count + 1;
        let name = self.intern(format!("Function`{arity}"));
        let def = self.std_def(name);
        if !self.builtins.functions.contains(&arity) {
            self.builtins.functions.push(arity);
            self.synthesize_function_record(name, def, param_count);
        }
        let mut args = params;
        args.push(ret);
        Ok(ConcreteType { name, def, args })
    }

    /// The `Call` method of a function-object record.
    pub(crate) fn function_call_ref(&self, object: &ConcreteType) -> FunctionRef {
        let name = self.intern(format!("{}__Call", self.name(object.name)));
        FunctionRef {
            name,
            def: self.std_def(name),
            type_args: object.args.clone(),
        }
    }

    /// `allocate<ty>()`.
    pub(crate) fn allocate_ref(&self, ty: LoweredType) -> FunctionRef {
        FunctionRef {
            name: self.names.allocate,
            def: self.std_def(self.names.allocate),
            type_args: vec![ty],
        }
    }

    pub(crate) fn printf_ref(&self) -> FunctionRef {
        FunctionRef {
            name: self.names.printf,
            def: self.std_def(self.names.printf),
            type_args: Vec::new(),
        }
    }

    /// `_variantIdentifier: u16`.
    pub(crate) fn discriminant_field(&self) -> Field {
        Field {
            name: self.names.variant_id,
            ty: LoweredType::U16,
        }
    }

    fn synthesize_function_record(&mut self, name: Name, def: DefId, param_count: usize) {
        let mut type_params: Vec<GenericPlaceholder> = (0..param_count)
            .map(|i| GenericPlaceholder {
                owner: def,
                name: self.intern(format!("T{i}")),
            })
            .collect();
        type_params.push(GenericPlaceholder {
            owner: def,
            name: self.interner.intern("TResult"),
        });
        let mut inputs = placeholder_args(&type_params);
        let ret = inputs.pop().unwrap_or(LoweredType::UNIT);
        let variants = vec![Variant {
            name: self.names.class_variant,
            fields: vec![
                Field {
                    name: self.names.function_reference,
                    ty: LoweredType::FunctionPointer {
                        params: inputs.clone(),
                        ret: Box::new(ret.clone()),
                    },
                },
                Field {
                    name: self.names.function_parameter,
                    ty: LoweredType::UNIT.pointer(),
                },
            ],
        }];

        let object = ConcreteType {
            name,
            def,
            args: placeholder_args(&type_params),
        };
        let call = self.build_function_call(&object, type_params.clone(), inputs, ret);
        self.builtins.methods.push(call);

        tracing::debug!(arity = param_count + 1, "synthesized built-in function record");
        self.builtins.data_types.push(DataType {
            id: def,
            name,
            type_params,
            variants,
            static_fields: Vec::new(),
        });
    }

    /// `Call(this, args..)`: call the stored reference, prepending the
    /// stored parameter when it is not null.
    fn build_function_call(
        &self,
        object: &ConcreteType,
        type_params: Vec<GenericPlaceholder>,
        inputs: Vec<LoweredType>,
        ret: LoweredType,
    ) -> Method {
        let this = Place::local(Local::Param(0)).deref();
        let class_variant = self.names.class_variant;
        let reference = this
            .clone()
            .field(self.names.function_reference, class_variant)
            .copy();
        let parameter = this
            .field(self.names.function_parameter, class_variant)
            .copy();
        let forwarded: Vec<Operand> = (1..=inputs.len())
            .map(|i| Place::local(Local::param(i)).copy())
            .collect();

        let mut builder = BodyBuilder::new();
        let unbound_bb = builder.new_block();
        let bound_bb = builder.new_block();
        builder.terminate(Terminator::SwitchInt {
            operand: parameter.clone(),
            cases: smallvec![(0, unbound_bb)],
            otherwise: bound_bb,
        });

        builder.position_at(unbound_bb);
        builder.terminate(Terminator::MethodCall {
            function: Callee::Indirect(reference.clone()),
            args: forwarded.clone(),
            destination: Place::local(Local::ReturnValue),
            target: BodyBuilder::RETURN,
        });

        builder.position_at(bound_bb);
        builder.terminate(Terminator::MethodCall {
            function: Callee::Indirect(reference),
            args: std::iter::once(parameter).chain(forwarded).collect(),
            destination: Place::local(Local::ReturnValue),
            target: BodyBuilder::RETURN,
        });

        let mut params = vec![MethodLocal {
            local: Local::Param(0),
            user_name: Some(self.names.this),
            ty: LoweredType::Concrete(object.clone()).pointer(),
        }];
        params.extend(inputs.into_iter().enumerate().map(|(i, ty)| MethodLocal {
            local: Local::param(i + 1),
            user_name: None,
            ty,
        }));

        let name = self.function_call_ref(object).name;
        Method {
            id: self.std_def(name),
            name,
            type_params,
            params,
            body: builder.finish(ret),
        }
    }
}
