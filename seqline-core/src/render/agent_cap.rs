//! Lifeline caps (begin/end boxes, crosses, bars, fades) and activation
//! highlights

use crate::error::Result;
use crate::primitives::{Primitive, TextAnchor};
use crate::sequence::{CapMode, Stage};

use super::component::{dispatch_mismatch, Component, ComponentRegistry, RenderPrep};
use super::{text_lines, LayoutState};

/// Width and height one cap occupies for a given agent
fn cap_extent(state: &mut LayoutState<'_>, mode: CapMode, id: &str) -> (f64, f64) {
    let caps = &state.theme.agent_cap;
    match mode {
        CapMode::Box => {
            let padding = caps.boxed.padding;
            let font = caps.boxed.label.clone();
            let size = state.text_size(&font, id);
            (size.width + padding.x * 2.0, size.height + padding.y * 2.0)
        }
        CapMode::Cross => {
            let r = state.theme.agent_cap.cross.radius;
            (r * 2.0, r * 2.0)
        }
        CapMode::Bar => {
            let bar = &state.theme.agent_cap.bar;
            (bar.width, bar.height)
        }
        CapMode::Fade => {
            let fade = &state.theme.agent_cap.fade;
            (fade.width, fade.height)
        }
        CapMode::None => (0.0, 0.0),
    }
}

fn draw_cap(state: &mut LayoutState<'_>, mode: CapMode, id: &str, primary_y: f64) -> Result<f64> {
    let (width, height) = cap_extent(state, mode, id);
    let x = state.x(id)?;
    match mode {
        CapMode::Box => {
            let cap = &state.theme.agent_cap.boxed;
            let rect = Primitive::Rect {
                x: x - width / 2.0,
                y: primary_y - height / 2.0,
                width,
                height,
                attrs: cap.box_attrs.clone(),
            };
            let text = Primitive::Text {
                x,
                y: primary_y - height / 2.0 + cap.padding.y,
                lines: text_lines(id),
                font: cap.label.clone(),
                anchor: TextAnchor::Middle,
                attrs: cap.label_attrs.clone(),
            };
            state.layers.content.push(rect);
            state.layers.content.push(text);
        }
        CapMode::Cross => {
            let cross = &state.theme.agent_cap.cross;
            let r = cross.radius;
            let d = format!(
                "M {} {} L {} {} M {} {} L {} {}",
                x - r,
                primary_y - r,
                x + r,
                primary_y + r,
                x + r,
                primary_y - r,
                x - r,
                primary_y + r
            );
            state.layers.content.push(Primitive::Path {
                d,
                attrs: cross.attrs.clone(),
            });
        }
        CapMode::Bar => {
            let bar = &state.theme.agent_cap.bar;
            state.layers.content.push(Primitive::Rect {
                x: x - width / 2.0,
                y: primary_y - height / 2.0,
                width,
                height,
                attrs: bar.attrs.clone(),
            });
        }
        CapMode::Fade | CapMode::None => {}
    }
    Ok(height)
}

/// Handles `agent begin` and `agent end` stages
pub(crate) struct AgentCaps;

impl Component for AgentCaps {
    fn prepare_measurements(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        let (agents, mode) = match stage {
            Stage::AgentBegin { agents, mode } | Stage::AgentEnd { agents, mode } => {
                (agents, *mode)
            }
            other => return Err(dispatch_mismatch("agent cap", other)),
        };
        if mode == CapMode::Box {
            let font = state.theme.agent_cap.boxed.label.clone();
            for id in agents {
                state.expect_text(&font, id);
            }
        }
        Ok(())
    }

    fn separation(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        let (agents, mode, begin) = match stage {
            Stage::AgentBegin { agents, mode } => (agents, *mode, true),
            Stage::AgentEnd { agents, mode } => (agents, *mode, false),
            other => return Err(dispatch_mismatch("agent cap", other)),
        };
        for id in agents {
            let (width, _) = cap_extent(state, mode, id);
            state.add_spacing(id, width / 2.0, width / 2.0);
            if begin {
                state.show_agent(id);
            } else {
                state.hide_agent(id);
            }
        }
        Ok(())
    }

    fn render_pre(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<RenderPrep> {
        let (agents, mode) = match stage {
            Stage::AgentBegin { agents, mode } | Stage::AgentEnd { agents, mode } => {
                (agents, *mode)
            }
            other => return Err(dispatch_mismatch("agent cap", other)),
        };
        let mut shift = 0.0_f64;
        for id in agents {
            let (_, height) = cap_extent(state, mode, id);
            shift = shift.max(height / 2.0);
        }
        Ok(RenderPrep {
            agent_ids: agents.clone(),
            top_shift: shift,
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
        let mut bottom = primary_y;
        match stage {
            Stage::AgentBegin { agents, mode } => {
                for id in agents {
                    let height = draw_cap(state, *mode, id, primary_y)?;
                    state.open_lifeline(id, primary_y + height / 2.0)?;
                    bottom = bottom.max(primary_y + height / 2.0);
                }
            }
            Stage::AgentEnd { agents, mode } => {
                for id in agents {
                    let (_, height) = cap_extent(state, *mode, id);
                    state.close_lifeline(id, primary_y - height / 2.0)?;
                    draw_cap(state, *mode, id, primary_y)?;
                    bottom = bottom.max(primary_y + height / 2.0);
                }
            }
            other => return Err(dispatch_mismatch("agent cap", other)),
        }
        Ok(bottom + state.theme.action_margin)
    }

    fn render_hidden(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
        top_y: f64,
    ) -> Result<f64> {
        match stage {
            Stage::AgentBegin { agents, .. } => {
                for id in agents {
                    state.open_lifeline(id, top_y)?;
                }
            }
            Stage::AgentEnd { agents, .. } => {
                for id in agents {
                    state.close_lifeline(id, top_y)?;
                }
            }
            other => return Err(dispatch_mismatch("agent cap", other)),
        }
        Ok(top_y)
    }
}

/// Handles `agent highlight` stages: activation halo toggling
pub(crate) struct AgentHighlights;

impl Component for AgentHighlights {
    fn separation(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        let Stage::AgentHighlight {
            agents,
            highlighted,
        } = stage
        else {
            return Err(dispatch_mismatch("agent highlight", stage));
        };
        let rad = if *highlighted {
            state.theme.agent_line.active_radius
        } else {
            0.0
        };
        for id in agents {
            if *highlighted {
                state.add_spacing(id, rad, rad);
            }
            state.info_mut(id)?.current_rad = rad;
        }
        Ok(())
    }

    fn render_pre(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        _state: &mut LayoutState<'_>,
    ) -> Result<RenderPrep> {
        let Stage::AgentHighlight { agents, .. } = stage else {
            return Err(dispatch_mismatch("agent highlight", stage));
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
        let Stage::AgentHighlight {
            agents,
            highlighted,
        } = stage
        else {
            return Err(dispatch_mismatch("agent highlight", stage));
        };
        let rad = if *highlighted {
            state.theme.agent_line.active_radius
        } else {
            0.0
        };
        for id in agents {
            state.set_lifeline_rad(id, primary_y, rad)?;
        }
        Ok(primary_y)
    }

    fn render_hidden(
        &self,
        stage: &Stage,
        registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
        top_y: f64,
    ) -> Result<f64> {
        // bookkeeping only; nothing visible is drawn either way
        self.render(stage, registry, state, top_y)
    }
}
