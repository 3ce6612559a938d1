//! Identity assignment.
//!
//! Walks every declaration of the checked module once, in a fixed order, and
//! gives each type, method, nested function, static field initializer and
//! generic parameter its qualified [`DefId`]. Everything later stages need to
//! know about a declaration's position (its enclosing function, its owning
//! type, its full generic parameter list) is recorded here.
//!
//! Functions, `_Main` and static initializers are all *scopes*: bodies that
//! lower to one CFG each. Scopes are numbered pre-order (a scope before its
//! nested functions), types in declaration order: unions, then classes.

use kelp_ir::ast::{
    Block, CheckedModule, ClassDecl, DeclPath, DeclRef, Expr, ExprArena, ExprId, FunctionDecl,
    StaticFieldDecl, UnionDecl,
};
use kelp_ir::visitor::{walk_expr, Visitor};
use kelp_ir::{Name, Span, StringInterner};
use rustc_hash::FxHashMap;

use crate::ir::{DefId, GenericPlaceholder};
use crate::LowerConfig;

/// Index of a scope in the [`DeclIndex`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ScopeId(u32);

impl ScopeId {
    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a class or union in the [`DeclIndex`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TypeId(u32);

impl TypeId {
    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) enum ScopeKind<'a> {
    /// Top-level statements of the module.
    Main(&'a Block),
    Function(&'a FunctionDecl),
    StaticInit(&'a StaticFieldDecl),
}

#[derive(Debug)]
pub(crate) struct ScopeInfo<'a> {
    pub id: DefId,
    /// Lowered method name, e.g. `MyClass__MyFn__InnerFn`.
    pub name: Name,
    pub kind: ScopeKind<'a>,
    /// Enclosing scope of a nested function.
    pub parent: Option<ScopeId>,
    /// Type whose method (or static field) this scope is, or is nested in.
    pub owner: Option<TypeId>,
    /// Instance method of a type: receives `this` as its first parameter.
    pub is_instance: bool,
    /// Own generic parameters, then every enclosing function's (innermost
    /// first), then the owner type's.
    pub type_params: Vec<GenericPlaceholder>,
    /// Directly nested functions, in source order.
    pub children: Vec<ScopeId>,
    pub span: Span,
}

impl<'a> ScopeInfo<'a> {
    pub(crate) fn function(&self) -> Option<&'a FunctionDecl> {
        match self.kind {
            ScopeKind::Function(decl) => Some(decl),
            ScopeKind::Main(_) | ScopeKind::StaticInit(_) => None,
        }
    }

    pub(crate) fn is_nested(&self) -> bool {
        self.parent.is_some()
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) enum TypeKind<'a> {
    Class(&'a ClassDecl),
    Union(&'a UnionDecl),
}

#[derive(Debug)]
pub(crate) struct TypeInfo<'a> {
    pub id: DefId,
    pub name: Name,
    pub kind: TypeKind<'a>,
    pub type_params: Vec<GenericPlaceholder>,
    /// Methods declared directly on the type.
    pub methods: Vec<ScopeId>,
    /// Static field initializers, in declaration order.
    pub statics: Vec<ScopeId>,
}

/// Every declaration of the module with its assigned identity.
pub(crate) struct DeclIndex<'a> {
    pub module: &'a CheckedModule,
    pub interner: &'a StringInterner,
    types: Vec<TypeInfo<'a>>,
    type_by_name: FxHashMap<Name, TypeId>,
    scopes: Vec<ScopeInfo<'a>>,
    scope_by_path: FxHashMap<DeclPath, ScopeId>,
    /// `_Main`, when the module has top-level statements.
    pub main: Option<ScopeId>,
    /// Module-level functions.
    pub functions: Vec<ScopeId>,
}

impl<'a> DeclIndex<'a> {
    pub(crate) fn build(
        module: &'a CheckedModule,
        interner: &'a StringInterner,
        config: &LowerConfig,
    ) -> Self {
        let mut index = DeclIndex {
            module,
            interner,
            types: Vec::with_capacity(module.unions.len() + module.classes.len()),
            type_by_name: FxHashMap::default(),
            scopes: Vec::new(),
            scope_by_path: FxHashMap::default(),
            main: None,
            functions: Vec::new(),
        };

        for union in &module.unions {
            index.add_type(union.name, &union.type_params, TypeKind::Union(union));
        }
        for class in &module.classes {
            index.add_type(class.name, &class.type_params, TypeKind::Class(class));
        }

        for (i, union) in module.unions.iter().enumerate() {
            let owner = TypeId(raw_id(i));
            index.add_methods(owner, union.name, &union.methods);
        }
        let union_count = module.unions.len();
        for (i, class) in module.classes.iter().enumerate() {
            let owner = TypeId(raw_id(union_count + i));
            index.add_methods(owner, class.name, &class.methods);
            for field in &class.static_fields {
                let name = index.join(&[class.name, field.name], "__");
                let path = index.join(&[class.name, field.name], ".");
                let scope = index.push_scope(ScopeInfo {
                    id: DefId::new(module.id, path),
                    name,
                    kind: ScopeKind::StaticInit(field),
                    parent: None,
                    owner: Some(owner),
                    is_instance: false,
                    type_params: index.types[owner.index()].type_params.clone(),
                    children: Vec::new(),
                    span: field.span,
                });
                index.types[owner.index()].statics.push(scope);
                // Nested functions inside an initializer expression are
                // addressed from the field's path.
                let decl_path = DeclPath::root(class.name).child(field.name);
                let nested = collect_nested(&module.arena, NestedRoot::Expr(field.init));
                index.add_children(scope, &decl_path, nested);
            }
        }

        if !module.main.is_empty() {
            let name = interner.intern(&config.entry_point);
            let main = index.push_scope(ScopeInfo {
                id: DefId::new(module.id, name),
                name,
                kind: ScopeKind::Main(&module.main),
                parent: None,
                owner: None,
                is_instance: false,
                type_params: Vec::new(),
                children: Vec::new(),
                span: Span::DUMMY,
            });
            index.main = Some(main);
            let nested = collect_nested(&module.arena, NestedRoot::Block(&module.main));
            for decl in nested {
                // Functions declared among top-level statements keep their
                // plain names and root paths.
                let path = DeclPath::root(decl.name);
                let child = index.add_function(decl, path, decl.name, Some(main), None, false);
                index.scopes[main.index()].children.push(child);
            }
        }

        for decl in &module.functions {
            let path = DeclPath::root(decl.name);
            let scope = index.add_function(decl, path, decl.name, None, None, false);
            index.functions.push(scope);
        }

        tracing::debug!(
            types = index.types.len(),
            scopes = index.scopes.len(),
            "assigned declaration identities"
        );
        index
    }

    fn add_type(&mut self, name: Name, type_params: &[Name], kind: TypeKind<'a>) {
        let id = DefId::new(self.module.id, name);
        let type_id = TypeId(raw_id(self.types.len()));
        self.type_by_name.insert(name, type_id);
        self.types.push(TypeInfo {
            id,
            name,
            kind,
            type_params: placeholders(id, type_params),
            methods: Vec::new(),
            statics: Vec::new(),
        });
    }

    fn add_methods(&mut self, owner: TypeId, type_name: Name, methods: &'a [FunctionDecl]) {
        for decl in methods {
            let name = self.join(&[type_name, decl.name], "__");
            let path = DeclPath::root(type_name).child(decl.name);
            let scope = self.add_function(decl, path, name, None, Some(owner), !decl.is_static);
            self.types[owner.index()].methods.push(scope);
        }
    }

    /// Register a function and, recursively, the functions nested in it.
    fn add_function(
        &mut self,
        decl: &'a FunctionDecl,
        path: DeclPath,
        name: Name,
        parent: Option<ScopeId>,
        owner: Option<TypeId>,
        is_instance: bool,
    ) -> ScopeId {
        let id = DefId::new(self.module.id, name);
        let mut type_params = placeholders(id, &decl.type_params);
        // Enclosing functions, innermost first; `_Main` and static
        // initializers declare none.
        let mut ancestor = parent;
        while let Some(scope) = ancestor {
            let info = &self.scopes[scope.index()];
            if let ScopeKind::Function(enclosing) = info.kind {
                type_params.extend(placeholders(info.id, &enclosing.type_params));
            }
            ancestor = info.parent;
        }
        if let Some(owner) = owner {
            type_params.extend(self.types[owner.index()].type_params.iter().copied());
        }

        let scope = self.push_scope(ScopeInfo {
            id,
            name,
            kind: ScopeKind::Function(decl),
            parent,
            owner,
            is_instance,
            type_params,
            children: Vec::new(),
            span: decl.span,
        });
        self.scope_by_path.insert(path.clone(), scope);

        let nested = collect_nested(&self.module.arena, NestedRoot::Block(&decl.body));
        self.add_children(scope, &path, nested);
        scope
    }

    fn add_children(
        &mut self,
        parent: ScopeId,
        parent_path: &DeclPath,
        nested: Vec<&'a FunctionDecl>,
    ) {
        let owner = self.scopes[parent.index()].owner;
        let parent_name = self.scopes[parent.index()].name;
        for decl in nested {
            let name = self.join(&[parent_name, decl.name], "__");
            let child = self.add_function(
                decl,
                parent_path.child(decl.name),
                name,
                Some(parent),
                owner,
                false,
            );
            self.scopes[parent.index()].children.push(child);
        }
    }

    fn push_scope(&mut self, info: ScopeInfo<'a>) -> ScopeId {
        let id = ScopeId(raw_id(self.scopes.len()));
        tracing::trace!(scope = id.0, name = self.interner.lookup(info.name), "scope");
        self.scopes.push(info);
        id
    }

    fn join(&self, parts: &[Name], separator: &str) -> Name {
        let text: Vec<&str> = parts.iter().map(|&part| self.interner.lookup(part)).collect();
        self.interner.intern_owned(text.join(separator))
    }

    // ── Queries ─────────────────────────────────────────────────

    pub(crate) fn scope(&self, id: ScopeId) -> &ScopeInfo<'a> {
        &self.scopes[id.index()]
    }

    pub(crate) fn scopes(&self) -> impl Iterator<Item = (ScopeId, &ScopeInfo<'a>)> {
        self.scopes
            .iter()
            .enumerate()
            .map(|(i, info)| (ScopeId(raw_id(i)), info))
    }

    pub(crate) fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub(crate) fn ty(&self, id: TypeId) -> &TypeInfo<'a> {
        &self.types[id.index()]
    }

    pub(crate) fn types(&self) -> impl Iterator<Item = (TypeId, &TypeInfo<'a>)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, info)| (TypeId(raw_id(i)), info))
    }

    /// Class or union named by a declaration path.
    pub(crate) fn type_by_path(&self, path: &DeclPath) -> Option<TypeId> {
        match path.segments() {
            [name] => self.type_by_name.get(name).copied(),
            _ => None,
        }
    }

    pub(crate) fn function_by_path(&self, path: &DeclPath) -> Option<ScopeId> {
        self.scope_by_path.get(path).copied()
    }

    /// Definition that declares the generic parameters of `owner`.
    pub(crate) fn generic_owner(&self, owner: &DeclPath) -> Option<DefId> {
        if let Some(ty) = self.type_by_path(owner) {
            return Some(self.types[ty.index()].id);
        }
        self.function_by_path(owner)
            .map(|scope| self.scopes[scope.index()].id)
    }

    /// Is `ancestor` a strict ancestor of `scope`?
    pub(crate) fn is_ancestor(&self, ancestor: ScopeId, scope: ScopeId) -> bool {
        let mut current = self.scopes[scope.index()].parent;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.scopes[id.index()].parent;
        }
        false
    }

    /// Strict ancestors of `scope`, outermost first.
    pub(crate) fn ancestors(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut chain = Vec::new();
        let mut current = self.scopes[scope.index()].parent;
        while let Some(id) = current {
            chain.push(id);
            current = self.scopes[id.index()].parent;
        }
        chain.reverse();
        chain
    }

    /// Scopes in emission order: nested functions before the function
    /// declaring them.
    pub(crate) fn post_order(&self, root: ScopeId) -> Vec<ScopeId> {
        fn visit(index: &DeclIndex<'_>, scope: ScopeId, out: &mut Vec<ScopeId>) {
            for &child in &index.scopes[scope.index()].children {
                visit(index, child, out);
            }
            out.push(scope);
        }
        let mut out = Vec::new();
        visit(self, root, &mut out);
        out
    }

    /// `module.path` rendering of a definition.
    pub(crate) fn display_def(&self, id: DefId) -> String {
        format!(
            "{}.{}",
            self.interner.lookup(id.module),
            self.interner.lookup(id.path)
        )
    }

    pub(crate) fn display_ref(&self, decl: &DeclRef) -> String {
        match decl {
            DeclRef::Path(path) => path
                .segments()
                .iter()
                .map(|&segment| self.interner.lookup(segment))
                .collect::<Vec<_>>()
                .join("."),
            DeclRef::Builtin(builtin) => format!("{builtin:?}"),
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "declaration counts never exceed u32"
)]
fn raw_id(index: usize) -> u32 {
    index as u32
}

fn placeholders(owner: DefId, names: &[Name]) -> Vec<GenericPlaceholder> {
    names
        .iter()
        .map(|&name| GenericPlaceholder { owner, name })
        .collect()
}

enum NestedRoot<'a> {
    Block(&'a Block),
    Expr(ExprId),
}

/// Functions declared directly in a body, in source order. Functions nested
/// inside those are not included.
fn collect_nested<'a>(arena: &'a ExprArena, root: NestedRoot<'a>) -> Vec<&'a FunctionDecl> {
    struct Collector<'a> {
        found: Vec<&'a FunctionDecl>,
    }

    impl<'a> Visitor<'a> for Collector<'a> {
        fn visit_expr(&mut self, _id: ExprId, expr: &'a Expr, arena: &'a ExprArena) {
            kelp_stack::ensure_sufficient_stack(|| walk_expr(self, expr, arena));
        }

        fn visit_function(&mut self, function: &'a FunctionDecl, _arena: &'a ExprArena) {
            self.found.push(function);
        }
    }

    let mut collector = Collector { found: Vec::new() };
    match root {
        NestedRoot::Block(block) => collector.visit_block(block, arena),
        NestedRoot::Expr(id) => collector.visit_expr_id(id, arena),
    }
    collector.found
}
