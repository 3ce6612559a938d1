//! Pattern matching lowering: `match` and `matches`.
//!
//! Arms are compiled into a decision tree over rows. Each row is the list of
//! tests an arm still has to pass (a place and the pattern the value there
//! must match) plus the bindings collected on the way.
//!
//! At each step the first row's first test picks a place; rows are grouped
//! by the union case they expect there, in order of first appearance, and a
//! `SwitchInt` on the place's `_variantIdentifier` dispatches to one block
//! per group. Rows that do not test the place follow every group and the
//! default edge. When the first row has no tests left its bindings are
//! written and control jumps to its arm's block.
//!
//! Arm bodies are lowered once each, after the tree, and jump to a shared
//! join block.

use kelp_ir::ast::{Boxing, CaseFields, ExprId, MatchArm, Pattern, Type, VarId};
use kelp_ir::Name;
use smallvec::SmallVec;

use crate::context::Site;
use crate::error::LowerError;
use crate::ir::{BlockId, Operand, Place, Rvalue, Terminator};
use crate::layout::CaseLayout;

use super::expr::unbox;
use super::FnLowerer;

/// A value the row still has to inspect.
#[derive(Clone)]
struct Test<'p> {
    place: Place,
    boxing: Boxing,
    pattern: &'p Pattern,
}

#[derive(Clone)]
struct Binding<'p> {
    var: VarId,
    name: Name,
    ty: &'p Type,
    place: Place,
}

#[derive(Clone)]
struct Row<'p> {
    tests: Vec<Test<'p>>,
    bindings: Vec<Binding<'p>>,
    arm: usize,
}

impl<'p> Row<'p> {
    fn new(tests: Vec<Test<'p>>, arm: usize) -> Self {
        Row {
            tests,
            bindings: Vec::new(),
            arm,
        }
    }

    /// Turn tests that always succeed into bindings.
    fn strip_irrefutable(&mut self) {
        let bindings = &mut self.bindings;
        self.tests.retain(|test| match test.pattern {
            Pattern::Discard => false,
            Pattern::Binding { var, name, ty } => {
                bindings.push(Binding {
                    var: *var,
                    name: *name,
                    ty,
                    place: test.place.clone(),
                });
                false
            }
            Pattern::Case { .. } => true,
        });
    }

    fn test_at(&self, place: &Place) -> Option<usize> {
        self.tests.iter().position(|test| test.place == *place)
    }
}

fn case_name(pattern: &Pattern) -> Option<Name> {
    match pattern {
        Pattern::Case { case, .. } => Some(*case),
        Pattern::Discard | Pattern::Binding { .. } => None,
    }
}

impl FnLowerer<'_, '_> {
    pub(super) fn lower_match(
        &mut self,
        id: ExprId,
        scrutinee: ExprId,
        arms: &[MatchArm],
        dest: Option<Place>,
    ) -> Result<(), LowerError> {
        let site = self.site_of(id);
        if arms.is_empty() {
            return Err(self.non_exhaustive(scrutinee, site));
        }
        let boxing = self.cx.index.module.arena.get_expr(scrutinee).ty.boxing();
        let base = self.lower_base(scrutinee)?;
        let rows = arms
            .iter()
            .enumerate()
            .map(|(arm, case)| {
                let test = Test {
                    place: base.clone(),
                    boxing,
                    pattern: &case.pattern,
                };
                Row::new(vec![test], arm)
            })
            .collect();

        let mut arm_blocks = vec![None; arms.len()];
        self.compile_rows(rows, &mut arm_blocks, site)?;

        let join = self.builder.new_block();
        for (arm, block) in arms.iter().zip(arm_blocks) {
            // Arms shadowed by earlier ones are never reached.
            let Some(block) = block else {
                continue;
            };
            self.builder.position_at(block);
            match &dest {
                Some(dest) => self.lower_into(arm.body, dest.clone())?,
                None => self.lower_discard(arm.body)?,
            }
            self.builder.goto(join);
        }
        self.builder.position_at(join);
        Ok(())
    }

    /// `value matches pattern` into `dest` as `true`/`false`.
    pub(super) fn lower_matches(
        &mut self,
        value: ExprId,
        pattern: &Pattern,
        dest: Place,
    ) -> Result<(), LowerError> {
        let site = self.site_of(value);
        let boxing = self.cx.index.module.arena.get_expr(value).ty.boxing();
        let base = self.lower_base(value)?;
        let test = Test {
            place: base,
            boxing,
            pattern,
        };
        let rows = vec![Row::new(vec![test], 0), Row::new(Vec::new(), 1)];

        let mut arm_blocks = [None, None];
        self.compile_rows(rows, &mut arm_blocks, site)?;

        let join = self.builder.new_block();
        for (matched, block) in [true, false].into_iter().zip(arm_blocks) {
            let Some(block) = block else {
                continue;
            };
            self.builder.position_at(block);
            self.builder
                .assign(dest.clone(), Rvalue::Use(Operand::bool(matched)));
            self.builder.goto(join);
        }
        self.builder.position_at(join);
        Ok(())
    }

    fn compile_rows<'p>(
        &mut self,
        rows: Vec<Row<'p>>,
        arm_blocks: &mut [Option<BlockId>],
        site: Site,
    ) -> Result<(), LowerError> {
        kelp_stack::ensure_sufficient_stack(|| self.compile_rows_inner(rows, arm_blocks, site))
    }

    fn compile_rows_inner<'p>(
        &mut self,
        mut rows: Vec<Row<'p>>,
        arm_blocks: &mut [Option<BlockId>],
        site: Site,
    ) -> Result<(), LowerError> {
        for row in &mut rows {
            row.strip_irrefutable();
        }
        let Some(first) = rows.first() else {
            return Err(LowerError::NonExhaustiveMatch {
                context: self.cx.context(site),
                union: String::from("value"),
            });
        };

        let Some(head) = first.tests.first().cloned() else {
            return self.enter_arm(&rows[0], arm_blocks);
        };
        let Pattern::Case { union, .. } = head.pattern else {
            return self.enter_arm(&rows[0], arm_blocks);
        };
        let cases = self.cx.union_cases(union, site)?;
        let value = unbox(head.place.clone(), head.boxing);

        // Distinct cases tested at the head place, in order of appearance.
        let mut groups: SmallVec<[Name; 4]> = SmallVec::new();
        for row in &rows {
            if let Some(case) = row
                .test_at(&head.place)
                .and_then(|i| case_name(row.tests[i].pattern))
            {
                if !groups.contains(&case) {
                    groups.push(case);
                }
            }
        }

        let default_rows: Vec<Row<'p>> = rows
            .iter()
            .filter(|row| row.test_at(&head.place).is_none())
            .cloned()
            .collect();
        let exhaustive = cases.iter().all(|case| groups.contains(&case.name));
        if !exhaustive && default_rows.is_empty() {
            return Err(LowerError::NonExhaustiveMatch {
                context: self.cx.context(site),
                union: self.cx.index.display_ref(&union.decl),
            });
        }

        let group_blocks: SmallVec<[BlockId; 4]> =
            groups.iter().map(|_| self.builder.new_block()).collect();
        let default_block = (!exhaustive).then(|| self.builder.new_block());

        let mut switch_cases = SmallVec::new();
        let mut otherwise = default_block;
        for (i, (&case, &block)) in groups.iter().zip(&group_blocks).enumerate() {
            if exhaustive && i + 1 == groups.len() {
                otherwise = Some(block);
                break;
            }
            let discriminant = cases
                .iter()
                .find(|layout| layout.name == case)
                .map_or(0, |layout| layout.discriminant);
            switch_cases.push((discriminant, block));
        }
        let Some(otherwise) = otherwise else {
            return Err(LowerError::NonExhaustiveMatch {
                context: self.cx.context(site),
                union: self.cx.index.display_ref(&union.decl),
            });
        };
        if switch_cases.is_empty() {
            self.builder.goto(otherwise);
        } else {
            self.builder.terminate(Terminator::SwitchInt {
                operand: value
                    .clone()
                    .field(self.cx.names.variant_id, groups[0])
                    .copy(),
                cases: switch_cases,
                otherwise,
            });
        }

        for (&case, &block) in groups.iter().zip(&group_blocks) {
            let layout = cases.iter().find(|layout| layout.name == case);
            let mut specialized = Vec::with_capacity(rows.len());
            for row in &rows {
                let Some(i) = row.test_at(&head.place) else {
                    specialized.push(row.clone());
                    continue;
                };
                if case_name(row.tests[i].pattern) != Some(case) {
                    continue;
                }
                let mut row = row.clone();
                let test = row.tests.remove(i);
                let sub_tests = self.sub_tests(&value, case, test.pattern, layout, site)?;
                row.tests.splice(i..i, sub_tests);
                specialized.push(row);
            }
            self.builder.position_at(block);
            self.compile_rows(specialized, arm_blocks, site)?;
        }

        if let Some(block) = default_block {
            self.builder.position_at(block);
            self.compile_rows(default_rows, arm_blocks, site)?;
        }
        Ok(())
    }

    /// Tests for the sub-patterns of a case pattern, on the fields of the
    /// matched case.
    fn sub_tests<'p>(
        &self,
        value: &Place,
        case: Name,
        pattern: &'p Pattern,
        layout: Option<&CaseLayout>,
        site: Site,
    ) -> Result<Vec<Test<'p>>, LowerError> {
        let Pattern::Case { union, fields, .. } = pattern else {
            return Ok(Vec::new());
        };
        let field_boxing = |name: Name| {
            layout
                .and_then(|layout| layout.fields.iter().find(|(field, _)| *field == name))
                .map(|(_, ty)| ty.boxing())
        };
        let unknown = |name: Name| LowerError::UnknownMember {
            context: self.cx.context(site),
            owner: self.cx.index.display_ref(&union.decl),
            name: self.cx.name(name).to_owned(),
        };

        let named: Vec<(Name, &'p Pattern)> = match fields {
            CaseFields::None => Vec::new(),
            CaseFields::Tuple(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (self.cx.item(i), item))
                .collect(),
            CaseFields::Named(items) => items.iter().map(|(name, item)| (*name, item)).collect(),
        };
        named
            .into_iter()
            .map(|(name, item)| {
                let boxing = field_boxing(name).ok_or_else(|| unknown(name))?;
                Ok(Test {
                    place: value.clone().field(name, case),
                    boxing,
                    pattern: item,
                })
            })
            .collect()
    }

    /// Write the row's bindings and jump to its arm.
    fn enter_arm(
        &mut self,
        row: &Row<'_>,
        arm_blocks: &mut [Option<BlockId>],
    ) -> Result<(), LowerError> {
        for binding in &row.bindings {
            let slot = self.declare_var(binding.var, binding.name, binding.ty)?;
            self.builder
                .assign(slot, Rvalue::Use(binding.place.clone().copy()));
        }
        let block = match arm_blocks[row.arm] {
            Some(block) => block,
            None => {
                let block = self.builder.new_block();
                arm_blocks[row.arm] = Some(block);
                block
            }
        };
        self.builder.goto(block);
        Ok(())
    }

    fn non_exhaustive(&self, scrutinee: ExprId, site: Site) -> LowerError {
        let union = match &self.cx.index.module.arena.get_expr(scrutinee).ty {
            Type::Named { decl, .. } => self.cx.index.display_ref(decl),
            _ => String::from("value"),
        };
        LowerError::NonExhaustiveMatch {
            context: self.cx.context(site),
            union,
        }
    }
}
