//! AST visitor.
//!
//! Generic read-only traversal of the checked AST. Override `visit_*`
//! methods to observe specific nodes; call the matching `walk_*` function to
//! continue into children.
//!
//! ```text
//! struct CountCalls {
//!     count: usize,
//! }
//!
//! impl<'ast> Visitor<'ast> for CountCalls {
//!     fn visit_expr(&mut self, id: ExprId, expr: &'ast Expr, arena: &'ast ExprArena) {
//!         if matches!(expr.kind, ExprKind::Call { .. }) {
//!             self.count += 1;
//!         }
//!         walk_expr(self, expr, arena);
//!     }
//! }
//! ```
//!
//! Nested function declarations are visited through
//! [`Visitor::visit_function`]; the default walks into their bodies.

use crate::ast::{
    Block, CaseFields, Expr, ExprArena, ExprId, ExprKind, FunctionDecl, Pattern, Stmt, VarDecl,
};

pub trait Visitor<'ast> {
    fn visit_expr(&mut self, id: ExprId, expr: &'ast Expr, arena: &'ast ExprArena) {
        let _ = id;
        walk_expr(self, expr, arena);
    }

    fn visit_expr_id(&mut self, id: ExprId, arena: &'ast ExprArena) {
        self.visit_expr(id, arena.get_expr(id), arena);
    }

    fn visit_block(&mut self, block: &'ast Block, arena: &'ast ExprArena) {
        walk_block(self, block, arena);
    }

    fn visit_var_decl(&mut self, decl: &'ast VarDecl, arena: &'ast ExprArena) {
        if let Some(init) = decl.init {
            self.visit_expr_id(init, arena);
        }
    }

    /// A nested function declaration.
    fn visit_function(&mut self, function: &'ast FunctionDecl, arena: &'ast ExprArena) {
        self.visit_block(&function.body, arena);
    }

    fn visit_pattern(&mut self, pattern: &'ast Pattern) {
        walk_pattern(self, pattern);
    }
}

pub fn walk_block<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    block: &'ast Block,
    arena: &'ast ExprArena,
) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Expr(id) => visitor.visit_expr_id(*id, arena),
            Stmt::Var(decl) => visitor.visit_var_decl(decl, arena),
            Stmt::Function(function) => visitor.visit_function(function, arena),
        }
    }
    if let Some(tail) = block.tail {
        visitor.visit_expr_id(tail, arena);
    }
}

/// Visit the children of `expr` in evaluation order.
pub fn walk_expr<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    expr: &'ast Expr,
    arena: &'ast ExprArena,
) {
    match &expr.kind {
        ExprKind::Int(_)
        | ExprKind::Bool(_)
        | ExprKind::String(_)
        | ExprKind::Unit
        | ExprKind::Variable(_)
        | ExprKind::Function(_)
        | ExprKind::StaticField { .. }
        | ExprKind::UnionCase { .. }
        | ExprKind::Break
        | ExprKind::Continue => {}
        ExprKind::MemberFunction { receiver, .. } => visitor.visit_expr_id(*receiver, arena),
        ExprKind::Field { object, .. } => visitor.visit_expr_id(*object, arena),
        ExprKind::Call { callee, args } => {
            visitor.visit_expr_id(*callee, arena);
            for arg in args {
                visitor.visit_expr_id(*arg, arena);
            }
        }
        ExprKind::New { fields, .. } | ExprKind::NewCase { fields, .. } => {
            for init in fields {
                visitor.visit_expr_id(init.value, arena);
            }
        }
        ExprKind::Tuple(items) | ExprKind::Array(items) => {
            for item in items {
                visitor.visit_expr_id(*item, arena);
            }
        }
        ExprKind::ArrayFill { value, .. } => visitor.visit_expr_id(*value, arena),
        ExprKind::Index { array, index } => {
            visitor.visit_expr_id(*array, arena);
            visitor.visit_expr_id(*index, arena);
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            visitor.visit_expr_id(*lhs, arena);
            visitor.visit_expr_id(*rhs, arena);
        }
        ExprKind::Unary { operand, .. } => visitor.visit_expr_id(*operand, arena),
        ExprKind::Assign { target, value } => {
            visitor.visit_expr_id(*target, arena);
            visitor.visit_expr_id(*value, arena);
        }
        ExprKind::Propagate(inner) => visitor.visit_expr_id(*inner, arena),
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr_id(*cond, arena);
            visitor.visit_expr_id(*then_branch, arena);
            if let Some(else_branch) = else_branch {
                visitor.visit_expr_id(*else_branch, arena);
            }
        }
        ExprKind::While { cond, body } => {
            visitor.visit_expr_id(*cond, arena);
            visitor.visit_expr_id(*body, arena);
        }
        ExprKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr_id(*value, arena);
            }
        }
        ExprKind::Block(block) => visitor.visit_block(block, arena),
        ExprKind::Match { scrutinee, arms } => {
            visitor.visit_expr_id(*scrutinee, arena);
            for arm in arms {
                visitor.visit_pattern(&arm.pattern);
                visitor.visit_expr_id(arm.body, arena);
            }
        }
        ExprKind::Matches { value, pattern } => {
            visitor.visit_expr_id(*value, arena);
            visitor.visit_pattern(pattern);
        }
    }
}

/// Visit sub-patterns depth-first, left to right.
pub fn walk_pattern<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, pattern: &'ast Pattern) {
    if let Pattern::Case { fields, .. } = pattern {
        match fields {
            CaseFields::None => {}
            CaseFields::Tuple(items) => {
                for item in items {
                    visitor.visit_pattern(item);
                }
            }
            CaseFields::Named(items) => {
                for (_, item) in items {
                    visitor.visit_pattern(item);
                }
            }
        }
    }
}
