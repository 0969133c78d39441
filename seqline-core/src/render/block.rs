//! Block outlines, section headers and `else` splits

use crate::error::{Error, Result};
use crate::primitives::{Primitive, TextAnchor};
use crate::sequence::{Stage, StageTag};

use super::component::{dispatch_mismatch, Component, ComponentRegistry, RenderPrep};
use super::{text_lines, LayoutState, OpenBlock};

/// Width and height of a section header (mode tag plus label)
fn header_extent(state: &mut LayoutState<'_>, tag: &str, label: &str) -> (f64, f64, f64) {
    let block = &state.theme.block;
    let tag_padding = block.tag_padding;
    let tag_font = block.tag_label.clone();
    let label_font = block.label.clone();
    let label_pad = block.section_pad;

    let (tag_w, tag_h) = if tag.is_empty() {
        (0.0, 0.0)
    } else {
        let size = state.text_size(&tag_font, tag);
        (size.width + tag_padding.x * 2.0, size.height + tag_padding.y * 2.0)
    };
    let (label_w, label_h) = if label.is_empty() {
        (0.0, 0.0)
    } else {
        let size = state.text_size(&label_font, label);
        (size.width + label_pad * 2.0, size.height)
    };
    (tag_w, label_w, tag_h.max(label_h))
}

fn draw_header(
    state: &mut LayoutState<'_>,
    tag: &str,
    label: &str,
    x: f64,
    top_y: f64,
) -> Result<f64> {
    let (tag_w, _, height) = header_extent(state, tag, label);
    let block = &state.theme.block;
    let tag_padding = block.tag_padding;
    let tag_box_attrs = block.tag_box_attrs.clone();
    let tag_font = block.tag_label.clone();
    let tag_attrs = block.tag_attrs.clone();
    let label_font = block.label.clone();
    let label_attrs = block.label_attrs.clone();
    let section_pad = block.section_pad;

    if !tag.is_empty() {
        state.layers.content.push(Primitive::Rect {
            x,
            y: top_y,
            width: tag_w,
            height,
            attrs: tag_box_attrs,
        });
        state.layers.content.push(Primitive::Text {
            x: x + tag_padding.x,
            y: top_y + tag_padding.y,
            lines: text_lines(tag),
            font: tag_font,
            anchor: TextAnchor::Start,
            attrs: tag_attrs,
        });
    }
    if !label.is_empty() {
        state.layers.content.push(Primitive::Text {
            x: x + tag_w + section_pad,
            y: top_y + tag_padding.y,
            lines: text_lines(label),
            font: label_font,
            anchor: TextAnchor::Start,
            attrs: label_attrs,
        });
    }
    Ok(top_y + height + section_pad)
}

/// Handles `block begin`, `block split` and `block end`
pub(crate) struct Blocks;

impl Component for Blocks {
    fn prepare_measurements(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        match stage {
            Stage::BlockBegin { tag, label, .. } | Stage::BlockSplit { tag, label, .. } => {
                let tag_font = state.theme.block.tag_label.clone();
                let label_font = state.theme.block.label.clone();
                if !tag.is_empty() {
                    state.expect_text(&tag_font, tag);
                }
                if !label.is_empty() {
                    state.expect_text(&label_font, label);
                }
                Ok(())
            }
            Stage::BlockEnd { .. } => Ok(()),
            other => Err(dispatch_mismatch("block", other)),
        }
    }

    fn separation(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        match stage {
            Stage::BlockBegin {
                tag,
                label,
                left,
                right,
                ..
            } => {
                let margin = state.theme.block.margin;
                state.show_agent(left);
                state.show_agent(right);
                state.add_spacing(left, margin, 0.0);
                state.add_spacing(right, 0.0, margin);
                let (tag_w, label_w, _) = header_extent(state, tag, label);
                state.add_separation(left, right, tag_w + label_w)?;
                Ok(())
            }
            Stage::BlockSplit {
                tag,
                label,
                left,
                right,
                ..
            } => {
                let (tag_w, label_w, _) = header_extent(state, tag, label);
                state.add_separation(left, right, tag_w + label_w)?;
                Ok(())
            }
            Stage::BlockEnd { left, right } => {
                state.hide_agent(left);
                state.hide_agent(right);
                Ok(())
            }
            other => Err(dispatch_mismatch("block", other)),
        }
    }

    fn should_hide(&self, stage: &Stage) -> i32 {
        match stage.tag() {
            StageTag::BlockBegin => 1,
            StageTag::BlockEnd => -1,
            _ => 0,
        }
    }

    fn render_pre(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        _state: &mut LayoutState<'_>,
    ) -> Result<RenderPrep> {
        let (left, right) = match stage {
            Stage::BlockBegin { left, right, .. }
            | Stage::BlockSplit { left, right, .. }
            | Stage::BlockEnd { left, right } => (left, right),
            other => return Err(dispatch_mismatch("block", other)),
        };
        Ok(RenderPrep {
            agent_ids: vec![left.clone(), right.clone()],
            top_shift: 0.0,
            asynchronous_y: None,
        })
    }

    fn render(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
        primary_y: f64,
    ) -> Result<f64> {
        match stage {
            Stage::BlockBegin {
                tag,
                label,
                left,
                right,
                ln,
                ..
            } => {
                state.blocks.push(OpenBlock {
                    left: left.clone(),
                    right: right.clone(),
                    top_y: primary_y,
                });
                let x = state.x(left)?;
                let mut label = label.clone();
                if state.is_collapsed(*ln) {
                    let marker = &state.theme.block.collapsed_marker;
                    if label.is_empty() {
                        label = marker.clone();
                    } else {
                        label = format!("{label} {marker}");
                    }
                }
                draw_header(state, tag, &label, x, primary_y)
            }
            Stage::BlockSplit {
                tag,
                label,
                left,
                right,
                ..
            } => {
                let x0 = state.x(left)?;
                let x1 = state.x(right)?;
                let section_attrs = state.theme.block.section_attrs.clone();
                state.layers.blocks.push(Primitive::Line {
                    x1: x0,
                    y1: primary_y,
                    x2: x1,
                    y2: primary_y,
                    attrs: section_attrs,
                });
                draw_header(state, tag, label, x0, primary_y)
            }
            Stage::BlockEnd { .. } => {
                let frame = state
                    .blocks
                    .pop()
                    .ok_or_else(|| Error::internal("block stack underflow"))?;
                let x0 = state.x(&frame.left)?;
                let x1 = state.x(&frame.right)?;
                let bottom = primary_y + state.theme.block.bottom_pad;
                state.layers.blocks.push(Primitive::Rect {
                    x: x0,
                    y: frame.top_y,
                    width: x1 - x0,
                    height: bottom - frame.top_y,
                    attrs: state.theme.block.box_attrs.clone(),
                });
                Ok(bottom + state.theme.action_margin)
            }
            other => Err(dispatch_mismatch("block", other)),
        }
    }

    fn render_hidden(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
        top_y: f64,
    ) -> Result<f64> {
        match stage {
            Stage::BlockBegin { left, right, .. } => {
                state.blocks.push(OpenBlock {
                    left: left.clone(),
                    right: right.clone(),
                    top_y,
                });
                Ok(top_y)
            }
            Stage::BlockSplit { .. } => Ok(top_y),
            Stage::BlockEnd { .. } => {
                state
                    .blocks
                    .pop()
                    .ok_or_else(|| Error::internal("block stack underflow"))?;
                Ok(top_y)
            }
            other => Err(dispatch_mismatch("block", other)),
        }
    }
}
