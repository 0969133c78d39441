//! Note boxes: over, beside, or between lifelines

use crate::command::NotePosition;
use crate::error::Result;
use crate::primitives::{Primitive, Region, TextAnchor};
use crate::sequence::Stage;

use super::component::{dispatch_mismatch, Component, ComponentRegistry, RenderPrep};
use super::{text_lines, with_corner_radius, LayoutState};

/// Agents at the extreme indices of the note's agent list
fn outer_agents(state: &LayoutState<'_>, agents: &[String]) -> Result<(String, String)> {
    let Some(first) = agents.first() else {
        return Err(crate::error::Error::internal("note with no agents"));
    };
    let mut leftmost = first.clone();
    let mut rightmost = first.clone();
    let mut lo = state.info(&leftmost)?.index;
    let mut hi = lo;
    for id in &agents[1..] {
        let index = state.info(id)?.index;
        if index < lo {
            lo = index;
            leftmost = id.clone();
        }
        if index > hi {
            hi = index;
            rightmost = id.clone();
        }
    }
    Ok((leftmost, rightmost))
}

/// Handles `note` stages in every position
pub(crate) struct Notes;

impl Component for Notes {
    fn prepare_measurements(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        let Stage::Note { mode, label, .. } = stage else {
            return Err(dispatch_mismatch("note", stage));
        };
        let font = state.theme.note.get(*mode).label.clone();
        state.expect_text(&font, label);
        Ok(())
    }

    fn separation(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        let Stage::Note {
            position,
            mode,
            agents,
            label,
            ..
        } = stage
        else {
            return Err(dispatch_mismatch("note", stage));
        };
        let note = state.theme.note.get(*mode);
        let padding = note.padding;
        let margin = note.margin;
        let overhang = note.overhang;
        let font = note.label.clone();
        let width = state.text_size(&font, label).width + padding.x * 2.0;
        let (leftmost, rightmost) = outer_agents(state, agents)?;
        match position {
            NotePosition::Over => {
                if leftmost == rightmost {
                    state.add_spacing(&leftmost, width / 2.0, width / 2.0);
                } else {
                    state.add_spacing(&leftmost, overhang, 0.0);
                    state.add_spacing(&rightmost, 0.0, overhang);
                    state.add_separation(&leftmost, &rightmost, width - overhang * 2.0)?;
                }
            }
            NotePosition::Left => {
                state.add_spacing(&leftmost, width + margin, 0.0);
            }
            NotePosition::Right => {
                state.add_spacing(&rightmost, 0.0, width + margin);
            }
            NotePosition::Between => {
                state.add_separation(&leftmost, &rightmost, width + margin * 2.0)?;
            }
        }
        Ok(())
    }

    fn render_pre(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        _state: &mut LayoutState<'_>,
    ) -> Result<RenderPrep> {
        let Stage::Note { agents, .. } = stage else {
            return Err(dispatch_mismatch("note", stage));
        };
        Ok(RenderPrep {
            agent_ids: agents.clone(),
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
        let Stage::Note {
            position,
            mode,
            agents,
            label,
            ln,
        } = stage
        else {
            return Err(dispatch_mismatch("note", stage));
        };
        let note = state.theme.note.get(*mode);
        let padding = note.padding;
        let margin = note.margin;
        let overhang = note.overhang;
        let corner = note.corner_radius;
        let box_attrs = note.box_attrs.clone();
        let font = note.label.clone();
        let label_attrs = note.label_attrs.clone();

        let size = state.text_size(&font, label);
        let width = size.width + padding.x * 2.0;
        let height = size.height + padding.y * 2.0;
        let (leftmost, rightmost) = outer_agents(state, agents)?;
        let (x0, x1) = match position {
            NotePosition::Over => {
                if leftmost == rightmost {
                    let cx = state.x(&leftmost)?;
                    (cx - width / 2.0, cx + width / 2.0)
                } else {
                    let x0 = state.x(&leftmost)? - overhang;
                    let x1 = state.x(&rightmost)? + overhang;
                    (x0, x0 + (x1 - x0).max(width))
                }
            }
            NotePosition::Left => {
                let edge = state.x(&leftmost)? - margin;
                (edge - width, edge)
            }
            NotePosition::Right => {
                let edge = state.x(&rightmost)? + margin;
                (edge, edge + width)
            }
            NotePosition::Between => {
                let cx = (state.x(&leftmost)? + state.x(&rightmost)?) / 2.0;
                (cx - width / 2.0, cx + width / 2.0)
            }
        };
        state.layers.content.push(Primitive::Rect {
            x: x0,
            y: primary_y,
            width: x1 - x0,
            height,
            attrs: with_corner_radius(&box_attrs, corner),
        });
        state.layers.content.push(Primitive::Text {
            x: (x0 + x1) / 2.0,
            y: primary_y + padding.y,
            lines: text_lines(label),
            font,
            anchor: TextAnchor::Middle,
            attrs: label_attrs,
        });
        state.layers.regions.push(Region {
            x: x0,
            y: primary_y,
            width: x1 - x0,
            height,
            ln: *ln,
        });
        Ok(primary_y + height + state.theme.action_margin)
    }
}
