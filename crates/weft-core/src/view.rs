//! Presentation projection over the document model.
//!
//! Derives a display-ready view from a message's block sequence without
//! mutating it: consecutive non-text blocks collapse into groups, text
//! blocks separate groups, and each group carries the derived flags the
//! renderer needs (live-section, trailing-text, auto-expansion).
//! Synchronous and recomputed on every document change.

use std::collections::HashMap;

use crate::core::model::ContentBlock;

/// One renderable unit: a single text block, or a contiguous run of
/// non-text blocks. Original block order is preserved.
#[derive(Debug, PartialEq)]
pub enum DisplayUnit<'a> {
    Text(&'a ContentBlock),
    Group(DisplayGroup<'a>),
}

/// A contiguous run of thinking/tool/error blocks.
#[derive(Debug, PartialEq)]
pub struct DisplayGroup<'a> {
    /// Position among groups (not among units); key for expansion state.
    pub group_index: usize,
    pub blocks: Vec<&'a ContentBlock>,
    /// True only for the last group in the sequence.
    pub is_latest_active_section: bool,
    /// True if any text unit follows this group.
    pub has_text_after: bool,
    /// Presentation policy: expand while this is the live tail of a
    /// streaming turn and nothing follows it. Overridable per group via
    /// [`ExpansionOverrides`].
    pub auto_expanded: bool,
}

/// Projects a block sequence into display units.
///
/// `streaming` is the turn-level flag: the turn is in its streaming phase
/// and at least one block is still incomplete (see
/// `Reducer::is_streaming`).
pub fn project(content: &[ContentBlock], streaming: bool) -> Vec<DisplayUnit<'_>> {
    let mut units = Vec::new();
    let mut run: Vec<&ContentBlock> = Vec::new();
    let mut group_count = 0usize;

    for block in content {
        if matches!(block, ContentBlock::Text { .. }) {
            if !run.is_empty() {
                units.push(DisplayUnit::Group(DisplayGroup {
                    group_index: group_count,
                    blocks: std::mem::take(&mut run),
                    is_latest_active_section: false,
                    has_text_after: false,
                    auto_expanded: false,
                }));
                group_count += 1;
            }
            units.push(DisplayUnit::Text(block));
        } else {
            run.push(block);
        }
    }
    if !run.is_empty() {
        units.push(DisplayUnit::Group(DisplayGroup {
            group_index: group_count,
            blocks: run,
            is_latest_active_section: false,
            has_text_after: false,
            auto_expanded: false,
        }));
    }

    annotate(&mut units, streaming);
    units
}

/// Fills in the derived flags once all unit positions are known.
fn annotate(units: &mut [DisplayUnit<'_>], streaming: bool) {
    let last_group_pos = units
        .iter()
        .rposition(|unit| matches!(unit, DisplayUnit::Group(_)));
    let text_positions: Vec<usize> = units
        .iter()
        .enumerate()
        .filter_map(|(pos, unit)| matches!(unit, DisplayUnit::Text(_)).then_some(pos))
        .collect();

    for (pos, unit) in units.iter_mut().enumerate() {
        if let DisplayUnit::Group(group) = unit {
            group.is_latest_active_section = Some(pos) == last_group_pos;
            group.has_text_after = text_positions.iter().any(|&text_pos| text_pos > pos);
            group.auto_expanded = group.is_latest_active_section
                && streaming
                && !group.has_text_after
                && group.blocks.iter().copied().any(has_visible_content);
        }
    }
}

/// Whether a block renders anything yet. A just-opened thinking block with
/// no text is invisible; a tool invocation shows its header immediately.
fn has_visible_content(block: &ContentBlock) -> bool {
    match block {
        ContentBlock::Thinking { thinking, .. } => !thinking.is_empty(),
        ContentBlock::ToolUse { .. } | ContentBlock::Error { .. } => true,
        ContentBlock::Text { text } => !text.is_empty(),
    }
}

/// Ephemeral per-render expansion toggles, keyed by group index.
///
/// An explicit user toggle wins over the auto policy for as long as the
/// caller keeps this state alive; it is never part of the document model.
#[derive(Debug, Default)]
pub struct ExpansionOverrides {
    by_group: HashMap<usize, bool>,
}

impl ExpansionOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the effective expansion of a group given its current auto
    /// policy value.
    pub fn toggle(&mut self, group_index: usize, auto_expanded: bool) {
        let effective = self.is_expanded(group_index, auto_expanded);
        self.by_group.insert(group_index, !effective);
    }

    /// Resolves the effective expansion: user override if exercised,
    /// otherwise the auto policy.
    pub fn is_expanded(&self, group_index: usize, auto_expanded: bool) -> bool {
        self.by_group
            .get(&group_index)
            .copied()
            .unwrap_or(auto_expanded)
    }

    pub fn clear(&mut self) {
        self.by_group.clear();
    }
}
