//! Lay out method code, widening jumps that do not fit in 16 bits
//!
//! Most jumps (`goto` and the `if*` family) have signed 16-bit relative offsets. Since the size of
//! an instruction affects the offsets of everything after it, the layout is computed iteratively:
//! start with every jump in its short form, compute offsets, then widen every jump whose offset
//! does not fit. Repeat until nothing changes.
//!
//! ### Termination
//!
//! Widening only ever makes instructions longer, so offsets only ever grow apart, so a jump that
//! was widened never needs to become short again. Since there are finitely many jumps, the
//! process stops.
//!
//! ### Rewriting
//!
//! `goto` becomes `goto_w`. Conditional jumps have no wide form, so the condition is inverted to
//! jump over an unconditional `goto_w`:
//!
//! ```text,ignore,no_run
//!     if* L2            ifnot* L1
//! L1: ...         =>    goto_w L2
//!     ...           L1: ...
//! L2: ...               ...
//!                   L2: ...
//! ```
//!
//! Note that `L1` becomes a jump target, so it needs a stack map frame even though it didn't need
//! one before. [`CodeLayout::widened`] reports where this happened.
//!
//! Since widening shifts code, `tableswitch`/`lookupswitch` padding is also recomputed every round.

use super::{BranchInstruction, SerializableInstruction, SynLabel};
use crate::jvm::class_file::Serialize;
use crate::jvm::Error;
use crate::util::Width;
use std::collections::HashMap;
use std::ops::RangeInclusive;

/// Range of relative jump offsets supported by `goto` and `if*` branch instructions
pub const SIGNED_16BIT_JUMP_RANGE: RangeInclusive<isize> =
    RangeInclusive::new(i16::MIN as isize, i16::MAX as isize);

/// Maximum size of the code array of one method
pub const MAX_CODE_LENGTH: usize = u16::MAX as usize;

/// Element of method code, ready to be laid out
#[derive(Clone, Debug)]
pub enum LayoutElement {
    Label(SynLabel),
    Instruction(SerializableInstruction),
    Branch(BranchInstruction<SynLabel>),
}

/// Result of laying out code
#[derive(Debug)]
pub struct CodeLayout {
    /// Code array
    pub code: Vec<u8>,

    /// Offset of every element (a label's offset is that of the next instruction)
    pub offsets: Vec<usize>,

    /// Offset of every label
    pub label_offsets: HashMap<SynLabel, usize>,

    /// Indices of conditional jumps that were rewritten to jump over a `goto_w`
    pub widened: Vec<usize>,
}

/// Lay out code elements into a code array
///
/// The `method` name is used only for error messages.
pub fn layout_code(elements: &[LayoutElement], method: &str) -> Result<CodeLayout, Error> {
    layout_code_with_range(elements, method, &SIGNED_16BIT_JUMP_RANGE)
}

/// Same as [`layout_code`], but with a configurable short jump range (for testing widening
/// without generating enormous methods)
pub fn layout_code_with_range(
    elements: &[LayoutElement],
    method: &str,
    short_jump_range: &RangeInclusive<isize>,
) -> Result<CodeLayout, Error> {
    let mut wide = vec![false; elements.len()];

    let (offsets, label_offsets) = loop {
        let (offsets, label_offsets) = compute_offsets(elements, &wide);
        let mut changed = false;
        for (idx, element) in elements.iter().enumerate() {
            let branch = match element {
                LayoutElement::Branch(branch) if !wide[idx] && branch.is_short_jump() => branch,
                _ => continue,
            };
            for target in branch.jump_targets() {
                let target_offset = *label_offsets
                    .get(target)
                    .ok_or_else(|| unplaced_label(method, idx, *target))?;
                let delta = target_offset as isize - offsets[idx] as isize;
                if !short_jump_range.contains(&delta) {
                    wide[idx] = true;
                    changed = true;
                }
            }
        }
        if !changed {
            break (offsets, label_offsets);
        }
    };

    let total = offsets.last().copied().unwrap_or(0);
    if total > MAX_CODE_LENGTH {
        return Err(Error::MethodCodeOverflow {
            method: method.to_owned(),
            size: total,
        });
    }

    let mut code: Vec<u8> = Vec::with_capacity(total);
    for (idx, element) in elements.iter().enumerate() {
        let offset = offsets[idx];
        debug_assert_eq!(code.len(), offset);
        match element {
            LayoutElement::Label(_) => (),
            LayoutElement::Instruction(insn) => insn.serialize(&mut code)?,
            LayoutElement::Branch(branch) => {
                let target = |lbl: &SynLabel| -> Result<i32, Error> {
                    let target = label_offsets
                        .get(lbl)
                        .ok_or_else(|| unplaced_label(method, idx, *lbl))?;
                    Ok((*target as isize - offset as isize) as i32)
                };
                encode_branch(branch, offset, wide[idx], &mut code, target)?;
            }
        }
    }

    let widened = elements
        .iter()
        .enumerate()
        .filter(|(idx, element)| {
            wide[*idx] && matches!(element, LayoutElement::Branch(branch) if branch.falls_through())
        })
        .map(|(idx, _)| idx)
        .collect();

    let mut offsets = offsets;
    offsets.truncate(elements.len());
    Ok(CodeLayout {
        code,
        offsets,
        label_offsets,
        widened,
    })
}

fn unplaced_label(method: &str, instruction: usize, label: SynLabel) -> Error {
    Error::VerifierError {
        method: method.to_owned(),
        instruction,
        kind: crate::jvm::VerifierErrorKind::UnplacedLabel(label),
    }
}

/// Offsets of every element, plus one extra entry for the end of the code
fn compute_offsets(
    elements: &[LayoutElement],
    wide: &[bool],
) -> (Vec<usize>, HashMap<SynLabel, usize>) {
    let mut offsets = Vec::with_capacity(elements.len() + 1);
    let mut label_offsets = HashMap::new();
    let mut offset = 0;
    for (idx, element) in elements.iter().enumerate() {
        offsets.push(offset);
        offset += match element {
            LayoutElement::Label(lbl) => {
                label_offsets.insert(*lbl, offset);
                0
            }
            LayoutElement::Instruction(insn) => insn.width(),
            LayoutElement::Branch(branch) => branch_width(branch, offset, wide[idx]),
        };
    }
    offsets.push(offset);
    (offsets, label_offsets)
}

/// Padding needed after a switch opcode at `offset` so the operands are 4-byte aligned
pub fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

fn branch_width<Lbl>(branch: &BranchInstruction<Lbl>, offset: usize, wide: bool) -> usize {
    match branch {
        BranchInstruction::Goto(_) if wide => 5,
        BranchInstruction::Goto(_) => 3,
        _ if branch.falls_through() && wide => 8,
        _ if branch.falls_through() => 3,
        BranchInstruction::TableSwitch { targets, .. } => {
            1 + switch_padding(offset) + 12 + 4 * targets.len()
        }
        BranchInstruction::LookupSwitch { targets, .. } => {
            1 + switch_padding(offset) + 8 + 8 * targets.len()
        }
        _ => 1,
    }
}

fn encode_branch(
    branch: &BranchInstruction<SynLabel>,
    offset: usize,
    wide: bool,
    code: &mut Vec<u8>,
    target: impl Fn(&SynLabel) -> Result<i32, Error>,
) -> Result<(), Error> {
    match branch {
        BranchInstruction::Goto(lbl) if wide => {
            0xc8u8.serialize(code)?;
            target(lbl)?.serialize(code)?;
        }
        BranchInstruction::TableSwitch {
            default,
            low,
            targets,
        } => {
            branch.opcode().serialize(code)?;
            code.extend(std::iter::repeat(0).take(switch_padding(offset)));
            target(default)?.serialize(code)?;
            low.serialize(code)?;
            let high = *low as i64 + targets.len() as i64 - 1;
            (high as i32).serialize(code)?;
            for lbl in targets {
                target(lbl)?.serialize(code)?;
            }
        }
        BranchInstruction::LookupSwitch { default, targets } => {
            branch.opcode().serialize(code)?;
            code.extend(std::iter::repeat(0).take(switch_padding(offset)));
            target(default)?.serialize(code)?;
            (targets.len() as i32).serialize(code)?;
            for (key, lbl) in targets {
                key.serialize(code)?;
                target(lbl)?.serialize(code)?;
            }
        }
        other => {
            let jump = other.jump_targets().first().map(|lbl| target(lbl)).transpose()?;
            match (jump, other.inverted_condition()) {
                (Some(delta), Some(inverted)) if wide => {
                    // `ifnot* +8; goto_w target`, where the `goto_w` is 3 bytes in
                    inverted.opcode().serialize(code)?;
                    8i16.serialize(code)?;
                    0xc8u8.serialize(code)?;
                    (delta - 3).serialize(code)?;
                }
                (Some(delta), _) => {
                    other.opcode().serialize(code)?;
                    (delta as i16).serialize(code)?;
                }
                (None, _) => other.opcode().serialize(code)?,
            }
        }
    }
    Ok(())
}
