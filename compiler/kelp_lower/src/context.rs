//! Module-wide lowering state.
//!
//! [`LowerCx`] is threaded by `&mut` through the whole pass: it owns the
//! declaration index, the capture plan, the registry of synthesized built-in
//! declarations, and the diagnostics collected so far. There is no other
//! shared state.

use kelp_ir::{Name, Span, StringInterner};

use crate::builtins::Builtins;
use crate::closure::{CaptureAnalysis, CapturePlan};
use crate::error::DeclContext;
use crate::identity::DeclIndex;
use crate::ir::DefId;
use crate::LowerConfig;

/// Reserved names, interned once per module.
pub(crate) struct Names {
    pub std: Name,
    pub this: Name,
    pub closure: Name,
    pub class_variant: Name,
    pub variant_id: Name,
    pub function_reference: Name,
    pub function_parameter: Name,
    pub result: Name,
    pub ok: Name,
    pub error: Name,
    pub allocate: Name,
    pub printf: Name,
}

impl Names {
    fn new(interner: &StringInterner) -> Self {
        Names {
            std: interner.intern("std"),
            this: interner.intern("this"),
            closure: interner.intern("closure"),
            class_variant: interner.intern("_classVariant"),
            variant_id: interner.intern("_variantIdentifier"),
            function_reference: interner.intern("FunctionReference"),
            function_parameter: interner.intern("FunctionParameter"),
            result: interner.intern("result"),
            ok: interner.intern("Ok"),
            error: interner.intern("Error"),
            allocate: interner.intern("allocate"),
            printf: interner.intern("printf"),
        }
    }
}

/// Declaration and source position errors are attributed to.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Site {
    pub def: DefId,
    pub span: Span,
}

pub(crate) struct LowerCx<'a> {
    pub interner: &'a StringInterner,
    pub config: &'a LowerConfig,
    pub names: Names,
    pub index: DeclIndex<'a>,
    pub analysis: CaptureAnalysis<'a>,
    pub plan: CapturePlan,
    pub builtins: Builtins,
}

impl<'a> LowerCx<'a> {
    pub(crate) fn new(
        interner: &'a StringInterner,
        config: &'a LowerConfig,
        index: DeclIndex<'a>,
        analysis: CaptureAnalysis<'a>,
    ) -> Self {
        LowerCx {
            interner,
            config,
            names: Names::new(interner),
            index,
            analysis,
            plan: CapturePlan::default(),
            builtins: Builtins::default(),
        }
    }

    pub(crate) fn context(&self, site: Site) -> DeclContext {
        DeclContext {
            decl: self.index.display_def(site.def),
            span: site.span,
        }
    }

    pub(crate) fn name(&self, name: Name) -> &'a str {
        self.interner.lookup_static(name)
    }

    pub(crate) fn intern(&self, text: String) -> Name {
        self.interner.intern_owned(text)
    }

    /// `Item{n}`, the positional field name of tuples and tuple cases.
    pub(crate) fn item(&self, position: usize) -> Name {
        self.interner.intern_owned(format!("Item{position}"))
    }

    /// Identifier in the module being lowered.
    pub(crate) fn module_def(&self, path: Name) -> DefId {
        DefId::new(self.index.module.id, path)
    }

    /// Identifier in the built-in `std` module.
    pub(crate) fn std_def(&self, path: Name) -> DefId {
        DefId::new(self.names.std, path)
    }
}
