//! Basic-block graph construction over lowered function bodies.
//!
//! Leaders are the first instruction, every jump target, and every
//! instruction following a jump or return. Blocks are the half-open runs
//! between leaders. Malformed input (an empty body, a jump to an unbound
//! label, a body that can run off the end) is a lowering bug and surfaces
//! as an [`InternalError`], never as a user diagnostic.

use std::collections::BTreeSet;
use std::ops::Range;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::diagnostics::InternalError;
use crate::ir::{FunctionIr, Inst};

/// Successor edge classification, ordered taken-first on conditional
/// blocks so rendering and tests see a stable layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Taken,
    Fallthrough,
    Unconditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub to: usize,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub id: usize,
    /// Instruction indexes `[start, end)` into the owning function.
    pub range: Range<usize>,
    pub successors: Vec<Edge>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cfg {
    pub function: String,
    pub blocks: Vec<BasicBlock>,
    pub entry: usize,
    /// Ids of non-entry blocks with no predecessors. Flagged, never dropped.
    pub unreachable: Vec<usize>,
}

impl Cfg {
    /// Structural re-check of an already built graph.
    pub fn validate(&self) -> Result<(), InternalError> {
        if self.entry != 0 || self.blocks.is_empty() {
            return Err(InternalError::new(format!(
                "graph for `{}` has no entry block",
                self.function
            )));
        }
        let mut expected_start = 0;
        for block in &self.blocks {
            if block.range.start != expected_start || block.range.is_empty() {
                return Err(InternalError::new(format!(
                    "block b{} of `{}` does not partition the body",
                    block.id, self.function
                )));
            }
            expected_start = block.range.end;
            for edge in &block.successors {
                if edge.to >= self.blocks.len() {
                    return Err(InternalError::new(format!(
                        "edge out of b{} targets missing block b{}",
                        block.id, edge.to
                    )));
                }
            }
            if block.successors.len() == 2
                && (block.successors[0].kind != EdgeKind::Taken
                    || block.successors[1].kind != EdgeKind::Fallthrough)
            {
                return Err(InternalError::new(format!(
                    "conditional block b{} is not ordered taken-first",
                    block.id
                )));
            }
        }
        Ok(())
    }
}

pub fn build(function: &FunctionIr) -> Result<Cfg, InternalError> {
    let len = function.instrs.len();
    if len == 0 {
        return Err(InternalError::new(format!(
            "function `{}` has an empty body",
            function.name
        )));
    }

    let mut leaders = BTreeSet::new();
    leaders.insert(0);
    for (index, inst) in function.instrs.iter().enumerate() {
        match inst {
            Inst::Jump { target } | Inst::JumpIf { target, .. } => {
                leaders.insert(target_index(function, *target)?);
                if index + 1 < len {
                    leaders.insert(index + 1);
                }
            }
            Inst::Return { .. } => {
                if index + 1 < len {
                    leaders.insert(index + 1);
                }
            }
            _ => {}
        }
    }

    let leaders: Vec<usize> = leaders.into_iter().collect();
    let mut block_at = FxHashMap::default();
    for (id, &leader) in leaders.iter().enumerate() {
        block_at.insert(leader, id);
    }
    let block_of = |index: usize| -> Result<usize, InternalError> {
        block_at.get(&index).copied().ok_or_else(|| {
            InternalError::new(format!(
                "instruction {index} of `{}` is not a block leader",
                function.name
            ))
        })
    };

    let mut blocks = Vec::with_capacity(leaders.len());
    for (id, &start) in leaders.iter().enumerate() {
        let end = leaders.get(id + 1).copied().unwrap_or(len);
        let successors = match &function.instrs[end - 1] {
            Inst::Jump { target } => {
                vec![Edge {
                    to: block_of(target_index(function, *target)?)?,
                    kind: EdgeKind::Unconditional,
                }]
            }
            Inst::JumpIf { target, .. } => {
                if end == len {
                    return Err(InternalError::new(format!(
                        "conditional jump ends `{}` with no fallthrough",
                        function.name
                    )));
                }
                vec![
                    Edge {
                        to: block_of(target_index(function, *target)?)?,
                        kind: EdgeKind::Taken,
                    },
                    Edge {
                        to: block_of(end)?,
                        kind: EdgeKind::Fallthrough,
                    },
                ]
            }
            Inst::Return { .. } => Vec::new(),
            _ => {
                if end == len {
                    return Err(InternalError::new(format!(
                        "function `{}` does not end with a return",
                        function.name
                    )));
                }
                vec![Edge {
                    to: block_of(end)?,
                    kind: EdgeKind::Fallthrough,
                }]
            }
        };
        blocks.push(BasicBlock {
            id,
            range: start..end,
            successors,
        });
    }

    let mut predecessors = vec![0usize; blocks.len()];
    for block in &blocks {
        for edge in &block.successors {
            predecessors[edge.to] += 1;
        }
    }
    let unreachable: Vec<usize> = blocks
        .iter()
        .filter(|block| block.id != 0 && predecessors[block.id] == 0)
        .map(|block| block.id)
        .collect();

    Ok(Cfg {
        function: function.name.clone(),
        blocks,
        entry: 0,
        unreachable,
    })
}

fn target_index(function: &FunctionIr, label: crate::ir::LabelId) -> Result<usize, InternalError> {
    let index = function.label_target(label).ok_or_else(|| {
        InternalError::new(format!(
            "jump to unbound label in `{}`",
            function.name
        ))
    })?;
    if index >= function.instrs.len() {
        return Err(InternalError::new(format!(
            "label target {index} out of range in `{}`",
            function.name
        )));
    }
    Ok(index)
}
