//! The postponed-statement dependency graph.
//!
//! Symbols whose value hangs on other symbols, spaces awaiting a length,
//! and postponed statements all become nodes here. Every new fact (a symbol
//! defined, a space resolved) triggers a fixed-point pass that re-evaluates
//! pending nodes and commits the ones whose inputs arrived. Close-out runs
//! before END completes; anything still pending is reported through E033 —
//! no node is dropped silently.

use hlasm_lang_core::{Diagnostic, Id, Range};
use hlasm_parser::expr::MachExpr;

use super::ordinary::OrdinaryContext;
use super::section::SpaceId;
use super::symbol::SymbolValue;
use crate::diags;
use crate::expression::{collect_deps, evaluate, Deps, EvalContext};

/// Which attribute a self-referencing data definition re-substitutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAttr {
    Length,
    Scale,
}

/// One operand's contribution to a postponed data-definition chunk.
#[derive(Debug, Clone)]
pub struct DataLenItem {
    /// Duplication factor expression, when not constant.
    pub dupl: Option<MachExpr>,
    pub dupl_const: i32,
    /// Length expression, when not constant.
    pub len: Option<MachExpr>,
    pub len_const: u32,
    /// Nominal-item multiplicity.
    pub count: u32,
}

impl DataLenItem {
    fn length(
        &self,
        ord: &OrdinaryContext,
        ectx: &EvalContext,
        diags_out: &mut Vec<Diagnostic>,
    ) -> u32 {
        let dupl = match &self.dupl {
            Some(e) => evaluate(e, ord, ectx, diags_out).abs().unwrap_or(0),
            None => self.dupl_const,
        };
        let len = match &self.len {
            Some(e) => evaluate(e, ord, ectx, diags_out).abs().unwrap_or(0),
            None => self.len_const as i32,
        };
        (dupl.max(0) as u32)
            .saturating_mul(self.count)
            .saturating_mul(len.max(0) as u32)
    }
}

/// How a pending space computes its length once its inputs resolve.
#[derive(Debug, Clone)]
pub enum SpaceResolver {
    /// A data-definition chunk: the sum of its operands' lengths.
    DataChunk { items: Vec<DataLenItem> },
    /// ORG to an address that was not fully known at the statement.
    OrgTarget { expr: MachExpr, boundary: u32, offset: i32 },
}

/// What committing a node does.
#[derive(Debug, Clone)]
pub enum DepTarget {
    /// A symbol awaiting its value (EQU with dependencies).
    SymbolValue { name: Id, expr: MachExpr },
    /// A self-referencing length/scale attribute to re-substitute.
    SymbolAttr {
        name: Id,
        attr: PendingAttr,
        expr: MachExpr,
    },
    /// A space awaiting its length.
    SpaceLength {
        space: SpaceId,
        resolver: SpaceResolver,
    },
    /// A postponed statement kept only for close-out checking.
    Statement,
}

/// A dependency node.
#[derive(Debug, Clone)]
pub struct DepNode {
    pub target: DepTarget,
    pub ectx: EvalContext,
    pub range: Range,
    pub deps: Deps,
    pub done: bool,
}

/// Result of adding a value dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    Added,
    /// The new edge closes a cycle; the caller diagnoses E033.
    Cycle,
}

/// The dependency graph of one assembly.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<DepNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol-value dependency. Refuses edges that close a cycle.
    pub fn add_symbol_dependency(
        &mut self,
        name: Id,
        expr: MachExpr,
        ectx: EvalContext,
        range: Range,
        ord: &OrdinaryContext,
    ) -> AddResult {
        let deps = collect_deps(&expr, ord, &ectx);
        if self.reaches(&deps.symbols, name) {
            return AddResult::Cycle;
        }
        self.nodes.push(DepNode {
            target: DepTarget::SymbolValue { name, expr },
            ectx,
            range,
            deps,
            done: false,
        });
        AddResult::Added
    }

    /// Add a self-referencing attribute re-substitution.
    pub fn add_attr_dependency(
        &mut self,
        name: Id,
        attr: PendingAttr,
        expr: MachExpr,
        ectx: EvalContext,
        range: Range,
        ord: &OrdinaryContext,
    ) {
        let deps = collect_deps(&expr, ord, &ectx);
        self.nodes.push(DepNode {
            target: DepTarget::SymbolAttr { name, attr, expr },
            ectx,
            range,
            deps,
            done: false,
        });
    }

    /// Add a space-length dependency.
    pub fn add_space_dependency(
        &mut self,
        space: SpaceId,
        resolver: SpaceResolver,
        ectx: EvalContext,
        range: Range,
        ord: &OrdinaryContext,
    ) {
        let deps = self.resolver_deps(&resolver, ord, &ectx);
        self.nodes.push(DepNode {
            target: DepTarget::SpaceLength { space, resolver },
            ectx,
            range,
            deps,
            done: false,
        });
    }

    /// Record a postponed statement with the inputs it still needs.
    pub fn add_postponed_statement(
        &mut self,
        exprs: &[&MachExpr],
        ectx: EvalContext,
        range: Range,
        ord: &OrdinaryContext,
    ) {
        let mut deps = Deps::default();
        for e in exprs {
            deps.merge(collect_deps(e, ord, &ectx));
        }
        self.nodes.push(DepNode {
            target: DepTarget::Statement,
            ectx,
            range,
            deps,
            done: false,
        });
    }

    fn resolver_deps(
        &self,
        resolver: &SpaceResolver,
        ord: &OrdinaryContext,
        ectx: &EvalContext,
    ) -> Deps {
        let mut deps = Deps::default();
        match resolver {
            SpaceResolver::DataChunk { items } => {
                for item in items {
                    if let Some(e) = &item.dupl {
                        deps.merge(collect_deps(e, ord, ectx));
                    }
                    if let Some(e) = &item.len {
                        deps.merge(collect_deps(e, ord, ectx));
                    }
                }
            }
            SpaceResolver::OrgTarget { expr, .. } => {
                deps.merge(collect_deps(expr, ord, ectx));
            }
        }
        deps
    }

    /// Whether `from` (a set of undefined symbols) can reach `target`
    /// through pending value nodes.
    fn reaches(&self, from: &[Id], target: Id) -> bool {
        let mut stack: Vec<Id> = from.to_vec();
        let mut seen: Vec<Id> = Vec::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            for node in &self.nodes {
                if node.done {
                    continue;
                }
                if let DepTarget::SymbolValue { name, .. } = &node.target {
                    if *name == id {
                        stack.extend(node.deps.symbols.iter().copied());
                    }
                }
            }
        }
        false
    }

    /// Run the graph to a fixed point: recompute pending nodes' inputs and
    /// commit every node whose inputs arrived, cascading until nothing
    /// changes. Interleaves counter-layout passes so alignment spaces
    /// resolve as their prefixes clear.
    pub fn resolve(&mut self, ord: &mut OrdinaryContext, diags_out: &mut Vec<Diagnostic>) {
        loop {
            let mut progress = false;

            for i in 0..self.nodes.len() {
                if self.nodes[i].done {
                    continue;
                }
                let deps = self.recompute_deps(i, ord);
                self.nodes[i].deps = deps;
                if self.nodes[i].deps.is_empty() {
                    self.commit(i, ord, diags_out);
                    progress = true;
                }
            }

            if !ord.finish_layout_pass().is_empty() {
                progress = true;
            }

            if !progress {
                break;
            }
        }
    }

    fn recompute_deps(&self, i: usize, ord: &OrdinaryContext) -> Deps {
        let node = &self.nodes[i];
        match &node.target {
            DepTarget::SymbolValue { expr, .. } | DepTarget::SymbolAttr { expr, .. } => {
                collect_deps(expr, ord, &node.ectx)
            }
            DepTarget::SpaceLength { resolver, .. } => {
                let mut deps = self.resolver_deps(resolver, ord, &node.ectx);
                // An ORG space also waits for its own prefix.
                if let DepTarget::SpaceLength { space, .. } = &node.target {
                    for prev in &ord.space(*space).previous {
                        if ord.space(*prev).resolved_length.is_none()
                            && !deps.spaces.contains(prev)
                        {
                            deps.spaces.push(*prev);
                        }
                    }
                }
                deps
            }
            DepTarget::Statement => {
                let mut deps = node.deps.clone();
                deps.symbols.retain(|s| {
                    !ord.get_symbol(*s)
                        .map(|sym| sym.value.is_defined())
                        .unwrap_or(false)
                        && ord.get_symbol_reference(*s).is_none()
                });
                deps.spaces
                    .retain(|sp| ord.space(*sp).resolved_length.is_none());
                deps
            }
        }
    }

    fn commit(&mut self, i: usize, ord: &mut OrdinaryContext, diags_out: &mut Vec<Diagnostic>) {
        self.nodes[i].done = true;
        let node = self.nodes[i].clone();
        match node.target {
            DepTarget::SymbolValue { name, expr } => {
                let value = evaluate(&expr, ord, &node.ectx, diags_out);
                if let Some(sym) = ord.get_symbol_mut(name) {
                    if !sym.value.is_defined() {
                        sym.value = if value.is_defined() {
                            value
                        } else {
                            SymbolValue::Absolute(0)
                        };
                    }
                }
            }
            DepTarget::SymbolAttr { name, attr, expr } => {
                let value = evaluate(&expr, ord, &node.ectx, diags_out)
                    .abs()
                    .unwrap_or(0);
                if let Some(sym) = ord.get_symbol_mut(name) {
                    match attr {
                        PendingAttr::Length => sym.set_length(value.clamp(0, u16::MAX as i32) as u16),
                        PendingAttr::Scale => {
                            sym.set_scale(value.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
                        }
                    }
                }
            }
            DepTarget::SpaceLength { space, resolver } => {
                let length = match resolver {
                    SpaceResolver::DataChunk { items } => items
                        .iter()
                        .map(|item| item.length(ord, &node.ectx, diags_out))
                        .sum::<u32>(),
                    SpaceResolver::OrgTarget {
                        expr,
                        boundary,
                        offset,
                    } => {
                        let target = evaluate(&expr, ord, &node.ectx, diags_out);
                        let target_offset = match &target {
                            SymbolValue::Reloc(a) if !a.has_spaces() => a.offset,
                            SymbolValue::Absolute(v) => *v,
                            _ => 0,
                        };
                        let mut goal = target_offset + offset;
                        if boundary > 1 {
                            let rem = goal.rem_euclid(boundary as i32);
                            if rem != 0 {
                                goal += boundary as i32 - rem;
                            }
                        }
                        if goal < 0 {
                            diags_out.push(diags::e068(node.range));
                            goal = 0;
                        }
                        let sp = ord.space(space);
                        let prefix = sp.offset_before as i32
                            + sp.previous
                                .iter()
                                .map(|p| ord.space(*p).resolved_length.unwrap_or(0) as i32)
                                .sum::<i32>();
                        (goal - prefix).max(0) as u32
                    }
                };
                ord.resolve_space(space, length);
            }
            DepTarget::Statement => {}
        }
    }

    /// Final pass: everything still pending is a cycle or an undefined
    /// reference; each gets E033.
    pub fn close_out(&mut self, ord: &mut OrdinaryContext, diags_out: &mut Vec<Diagnostic>) {
        self.resolve(ord, diags_out);
        for i in 0..self.nodes.len() {
            if self.nodes[i].done {
                continue;
            }
            self.nodes[i].done = true;
            diags_out.push(diags::e033(self.nodes[i].range));
        }
    }

    /// Pending node count (diagnostic aid).
    pub fn pending(&self) -> usize {
        self.nodes.iter().filter(|n| !n.done).count()
    }
}
