//! Connection rendering: straight arrows, self-connection loopbacks and
//! delayed (in-flight) connections

use crate::command::{ArrowHead, ConnectOptions, LineType};
use crate::error::{Error, Result};
use crate::primitives::{Primitive, Region, TextAnchor};
use crate::sequence::Stage;
use crate::theme::Theme;

use super::component::{dispatch_mismatch, Component, ComponentRegistry, RenderPrep};
use super::{text_lines, DelayedOrigin, LayoutState};

fn head_width(theme: &Theme, head: ArrowHead) -> f64 {
    theme.connect.head(head).map_or(0.0, |a| a.width)
}

fn head_half_height(theme: &Theme, head: ArrowHead) -> f64 {
    theme.connect.head(head).map_or(0.0, |a| a.height / 2.0)
}

fn head_line_gap(theme: &Theme, head: ArrowHead) -> f64 {
    theme.connect.head(head).map_or(0.0, |a| a.line_gap)
}

/// Draw an arrowhead whose tip sits at `(x, y)`, pointing in `dir`
/// (+1 right, -1 left)
fn draw_head(state: &mut LayoutState<'_>, head: ArrowHead, x: f64, y: f64, dir: f64) {
    let Some(arrow) = state.theme.connect.head(head) else {
        return;
    };
    let attrs = arrow.attrs.clone();
    let w = arrow.width;
    let h = arrow.height;
    let d = match head {
        ArrowHead::Single => format!(
            "M {} {} L {} {} L {} {} Z",
            x,
            y,
            x - dir * w,
            y - h / 2.0,
            x - dir * w,
            y + h / 2.0
        ),
        ArrowHead::Double => format!(
            "M {} {} L {} {} L {} {} M {} {} L {} {} L {} {}",
            x - dir * w,
            y - h / 2.0,
            x,
            y,
            x - dir * w,
            y + h / 2.0,
            x - dir * w * 1.6,
            y - h / 2.0,
            x - dir * w * 0.6,
            y,
            x - dir * w * 1.6,
            y + h / 2.0
        ),
        ArrowHead::Cross => format!(
            "M {} {} L {} {} M {} {} L {} {}",
            x - dir * (w / 2.0) - w / 2.0,
            y - h / 2.0,
            x - dir * (w / 2.0) + w / 2.0,
            y + h / 2.0,
            x - dir * (w / 2.0) + w / 2.0,
            y - h / 2.0,
            x - dir * (w / 2.0) - w / 2.0,
            y + h / 2.0
        ),
        ArrowHead::None => return,
    };
    state.layers.content.push(Primitive::Path { d, attrs });
}

fn wave_path(x0: f64, x1: f64, y: f64, amplitude: f64, wavelength: f64) -> String {
    let dir = if x1 >= x0 { 1.0 } else { -1.0 };
    let mut d = format!("M {x0} {y}");
    let mut x = x0;
    let mut up = true;
    while (x1 - x) * dir > wavelength {
        let next = x + dir * wavelength;
        let cy = if up { y - amplitude } else { y + amplitude };
        d.push_str(&format!(" Q {} {} {} {}", (x + next) / 2.0, cy, next, y));
        up = !up;
        x = next;
    }
    d.push_str(&format!(" L {x1} {y}"));
    d
}

fn draw_line(state: &mut LayoutState<'_>, line: LineType, x0: f64, y0: f64, x1: f64, y1: f64) {
    let connect = &state.theme.connect;
    match line {
        LineType::Wave if y0 == y1 => {
            let d = wave_path(x0, x1, y0, connect.wave_amplitude, connect.wave_length);
            state.layers.content.push(Primitive::Path {
                d,
                attrs: connect.wave_attrs.clone(),
            });
        }
        _ => {
            state.layers.content.push(Primitive::Line {
                x1: x0,
                y1: y0,
                x2: x1,
                y2: y1,
                attrs: connect.line_attrs(line).clone(),
            });
        }
    }
}

/// Label width including its mask backdrop; zero for empty labels
fn label_extent(state: &mut LayoutState<'_>, label: &str) -> (f64, f64) {
    if label.is_empty() {
        return (0.0, 0.0);
    }
    let font = state.theme.connect.label.clone();
    let size = state.text_size(&font, label);
    let pad = state.theme.connect.mask_pad;
    (size.width + pad * 2.0, size.height)
}

/// Draw a masked label whose bottom-centre sits above `(x, y)`
fn draw_label(state: &mut LayoutState<'_>, label: &str, x: f64, bottom_y: f64, anchor: TextAnchor) {
    if label.is_empty() {
        return;
    }
    let (width, height) = label_extent(state, label);
    let connect = &state.theme.connect;
    let mask_pad = connect.mask_pad;
    let mask_x = match anchor {
        TextAnchor::Middle => x - width / 2.0,
        TextAnchor::Start => x - mask_pad,
        TextAnchor::End => x - width + mask_pad,
    };
    let mask = Primitive::Rect {
        x: mask_x,
        y: bottom_y - height - mask_pad,
        width,
        height: height + mask_pad * 2.0,
        attrs: connect.mask_attrs.clone(),
    };
    let text = Primitive::Text {
        x,
        y: bottom_y - height,
        lines: text_lines(label),
        font: connect.label.clone(),
        anchor,
        attrs: connect.label_attrs.clone(),
    };
    state.layers.masks.push(mask);
    state.layers.content.push(text);
}

/// Handles ordinary `connect` stages, including self-connections
pub(crate) struct Connects;

impl Component for Connects {
    fn prepare_measurements(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        let Stage::Connect { label, .. } = stage else {
            return Err(dispatch_mismatch("connect", stage));
        };
        if !label.is_empty() {
            let font = state.theme.connect.label.clone();
            state.expect_text(&font, label);
        }
        Ok(())
    }

    fn separation(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        let Stage::Connect {
            agents,
            label,
            options,
            ..
        } = stage
        else {
            return Err(dispatch_mismatch("connect", stage));
        };
        let (label_w, _) = label_extent(state, label);
        let theme = state.theme;
        let pad = theme.connect.label_pad;
        if agents[0] == agents[1] {
            let reach = theme.connect.loopback_radius
                + label_w
                + head_width(theme, options.left).max(head_width(theme, options.right))
                + pad;
            let rad = state.info(&agents[0])?.current_rad;
            state.add_spacing(&agents[0], 0.0, rad + reach);
        } else {
            let rad_a = state.info(&agents[0])?.current_rad;
            let rad_b = state.info(&agents[1])?.current_rad;
            let dist = label_w
                + head_width(theme, options.left)
                + head_width(theme, options.right)
                + rad_a
                + rad_b
                + pad * 2.0;
            state.add_separation(&agents[0], &agents[1], dist)?;
        }
        Ok(())
    }

    fn render_pre(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<RenderPrep> {
        let Stage::Connect {
            agents,
            label,
            options,
            ..
        } = stage
        else {
            return Err(dispatch_mismatch("connect", stage));
        };
        let (_, label_h) = label_extent(state, label);
        let theme = state.theme;
        let heads =
            head_half_height(theme, options.left).max(head_half_height(theme, options.right));
        let shift = heads.max(label_h + theme.connect.label_pad);
        let mut ids = vec![agents[0].clone()];
        if agents[1] != agents[0] {
            ids.push(agents[1].clone());
        }
        Ok(RenderPrep {
            agent_ids: ids,
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
        let Stage::Connect {
            agents,
            label,
            options,
            ln,
        } = stage
        else {
            return Err(dispatch_mismatch("connect", stage));
        };
        if agents[0] == agents[1] {
            render_self_connect(state, &agents[0], label, *options, primary_y, *ln)
        } else {
            render_plain_connect(state, agents, label, *options, primary_y, *ln)
        }
    }
}

fn render_plain_connect(
    state: &mut LayoutState<'_>,
    agents: &[String; 2],
    label: &str,
    options: ConnectOptions,
    primary_y: f64,
    ln: usize,
) -> Result<f64> {
    let theme = state.theme;
    let rad_a = state.info(&agents[0])?.current_rad;
    let rad_b = state.info(&agents[1])?.current_rad;
    let xa = state.x(&agents[0])?;
    let xb = state.x(&agents[1])?;
    let dir = if xb >= xa { 1.0 } else { -1.0 };
    let x0 = xa + dir * rad_a;
    let x1 = xb - dir * rad_b;

    draw_label(
        state,
        label,
        (x0 + x1) / 2.0,
        primary_y - theme.connect.label_pad,
        TextAnchor::Middle,
    );
    let gap0 = head_line_gap(theme, options.left);
    let gap1 = head_line_gap(theme, options.right);
    draw_line(
        state,
        options.line,
        x0 + dir * gap0,
        primary_y,
        x1 - dir * gap1,
        primary_y,
    );
    draw_head(state, options.left, x0, primary_y, -dir);
    draw_head(state, options.right, x1, primary_y, dir);

    let theme = state.theme;
    let half = head_half_height(theme, options.left).max(head_half_height(theme, options.right));
    let (_, label_h) = label_extent(state, label);
    state.layers.regions.push(Region {
        x: x0.min(x1),
        y: primary_y - label_h - state.theme.connect.label_pad,
        width: (x1 - x0).abs(),
        height: label_h + state.theme.connect.label_pad + half,
        ln,
    });
    Ok(primary_y + half + state.theme.action_margin)
}

fn render_self_connect(
    state: &mut LayoutState<'_>,
    agent: &str,
    label: &str,
    options: ConnectOptions,
    primary_y: f64,
    ln: usize,
) -> Result<f64> {
    let theme = state.theme;
    let rad = state.info(agent)?.current_rad;
    let x0 = state.x(agent)? + rad;
    let loop_r = theme.connect.loopback_radius;
    let (label_w, _) = label_extent(state, label);
    let turn_x = x0 + label_w.max(loop_r) + theme.connect.label_pad;
    let y1 = primary_y + loop_r * 2.0;

    draw_label(
        state,
        label,
        x0 + theme.connect.label_pad,
        primary_y - theme.connect.label_pad,
        TextAnchor::Start,
    );
    let gap0 = head_line_gap(theme, options.left);
    let gap1 = head_line_gap(theme, options.right);
    let d = format!(
        "M {} {} L {} {} A {} {} 0 0 1 {} {} L {} {}",
        x0 + gap0,
        primary_y,
        turn_x,
        primary_y,
        loop_r,
        loop_r,
        turn_x,
        y1,
        x0 + gap1,
        y1
    );
    state.layers.content.push(Primitive::Path {
        d,
        attrs: state.theme.connect.line_attrs(options.line).clone(),
    });
    draw_head(state, options.left, x0, primary_y, -1.0);
    draw_head(state, options.right, x0, y1, -1.0);

    let half = head_half_height(state.theme, options.right);
    let (_, label_h) = label_extent(state, label);
    state.layers.regions.push(Region {
        x: x0,
        y: primary_y - label_h - state.theme.connect.label_pad,
        width: turn_x + loop_r - x0,
        height: label_h + state.theme.connect.label_pad + (y1 - primary_y) + half,
        ln,
    });
    Ok(y1 + half + state.theme.action_margin)
}

/// First half of a delayed connection: remembers where the message left
pub(crate) struct DelayBegins;

impl Component for DelayBegins {
    fn separation(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        let Stage::ConnectDelayBegin { agent, .. } = stage else {
            return Err(dispatch_mismatch("connect delay begin", stage));
        };
        let pad = state.theme.connect.label_pad;
        state.add_spacing(agent, 0.0, pad);
        Ok(())
    }

    fn render_pre(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        _state: &mut LayoutState<'_>,
    ) -> Result<RenderPrep> {
        let Stage::ConnectDelayBegin { agent, .. } = stage else {
            return Err(dispatch_mismatch("connect delay begin", stage));
        };
        Ok(RenderPrep {
            agent_ids: vec![agent.clone()],
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
        let Stage::ConnectDelayBegin {
            agent,
            tag,
            options,
            ..
        } = stage
        else {
            return Err(dispatch_mismatch("connect delay begin", stage));
        };
        let rad = state.info(agent)?.current_rad;
        let x = state.x(agent)? + rad;
        state.delayed.insert(
            tag.clone(),
            DelayedOrigin {
                x,
                y: primary_y,
                options: *options,
            },
        );
        Ok(primary_y)
    }

    fn render_hidden(
        &self,
        stage: &Stage,
        registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
        top_y: f64,
    ) -> Result<f64> {
        // the end half may be visible, so the origin is recorded either way
        self.render(stage, registry, state, top_y)
    }
}

/// Second half of a delayed connection: draws the in-flight line from the
/// recorded origin to the arrival point
pub(crate) struct DelayEnds;

impl Component for DelayEnds {
    fn prepare_measurements(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        let Stage::ConnectDelayEnd { label, .. } = stage else {
            return Err(dispatch_mismatch("connect delay end", stage));
        };
        if !label.is_empty() {
            let font = state.theme.connect.label.clone();
            state.expect_text(&font, label);
        }
        Ok(())
    }

    fn separation(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        let Stage::ConnectDelayEnd {
            from,
            to,
            label,
            options,
            ..
        } = stage
        else {
            return Err(dispatch_mismatch("connect delay end", stage));
        };
        if from == to {
            return Ok(());
        }
        let (label_w, _) = label_extent(state, label);
        let theme = state.theme;
        let dist = label_w
            + head_width(theme, options.left)
            + head_width(theme, options.right)
            + theme.connect.label_pad * 2.0;
        state.add_separation(from, to, dist)?;
        Ok(())
    }

    fn render_pre(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<RenderPrep> {
        let Stage::ConnectDelayEnd {
            from,
            to,
            label,
            options,
            ..
        } = stage
        else {
            return Err(dispatch_mismatch("connect delay end", stage));
        };
        let (_, label_h) = label_extent(state, label);
        let theme = state.theme;
        let heads =
            head_half_height(theme, options.left).max(head_half_height(theme, options.right));
        let mut ids = vec![from.clone()];
        if to != from {
            ids.push(to.clone());
        }
        Ok(RenderPrep {
            agent_ids: ids,
            top_shift: heads.max(label_h + theme.connect.label_pad),
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
        let Stage::ConnectDelayEnd {
            to,
            tag,
            label,
            options,
            ln,
            ..
        } = stage
        else {
            return Err(dispatch_mismatch("connect delay end", stage));
        };
        let theme = state.theme;
        let origin = state
            .delayed
            .remove(tag)
            .ok_or_else(|| Error::internal(format!("no delayed origin for '{tag}'")))?;
        let rad = state.info(to)?.current_rad;
        let xt = state.x(to)?;
        let dir = if xt >= origin.x { 1.0 } else { -1.0 };
        let x1 = xt - dir * rad;

        draw_label(
            state,
            label,
            (origin.x + x1) / 2.0,
            (origin.y + primary_y) / 2.0 - theme.connect.label_pad,
            TextAnchor::Middle,
        );
        draw_line(state, options.line, origin.x, origin.y, x1, primary_y);
        draw_head(state, options.right, x1, primary_y, dir);

        let half = head_half_height(theme, options.right);
        state.layers.regions.push(Region {
            x: origin.x.min(x1),
            y: origin.y.min(primary_y),
            width: (x1 - origin.x).abs(),
            height: (primary_y - origin.y).abs() + half,
            ln: *ln,
        });
        Ok(primary_y + half + state.theme.action_margin)
    }
}
