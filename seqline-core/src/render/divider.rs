//! Full-width dividers

use crate::error::Result;
use crate::primitives::{Primitive, TextAnchor};
use crate::sequence::{Stage, LEFT_EDGE, RIGHT_EDGE};
use crate::theme::DividerGeom;

use super::component::{dispatch_mismatch, Component, ComponentRegistry, RenderPrep};
use super::{text_lines, LayoutState};

/// Handles `divider` stages via theme-supplied render callbacks
pub(crate) struct Dividers;

impl Component for Dividers {
    fn prepare_measurements(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        let Stage::Divider { mode, label, .. } = stage else {
            return Err(dispatch_mismatch("divider", stage));
        };
        if !label.is_empty() {
            let font = state.theme.divider(*mode).label.clone();
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
        let Stage::Divider { mode, label, .. } = stage else {
            return Err(dispatch_mismatch("divider", stage));
        };
        if label.is_empty() {
            return Ok(());
        }
        let divider = state.theme.divider(*mode);
        let padding = divider.padding;
        let font = divider.label.clone();
        let width = state.text_size(&font, label).width + padding.x * 2.0;
        state.add_separation(LEFT_EDGE, RIGHT_EDGE, width)?;
        Ok(())
    }

    fn render_pre(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<RenderPrep> {
        let Stage::Divider {
            mode,
            height,
            label,
            ..
        } = stage
        else {
            return Err(dispatch_mismatch("divider", stage));
        };
        let divider = state.theme.divider(*mode);
        let padding = divider.padding;
        let base_height = divider.height.max(*height);
        let font = divider.label.clone();
        let label_h = if label.is_empty() {
            0.0
        } else {
            state.text_size(&font, label).height
        };
        Ok(RenderPrep {
            agent_ids: vec![LEFT_EDGE.to_string(), RIGHT_EDGE.to_string()],
            top_shift: (base_height.max(label_h) + padding.y * 2.0) / 2.0,
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
        let Stage::Divider {
            mode,
            height,
            label,
            ..
        } = stage
        else {
            return Err(dispatch_mismatch("divider", stage));
        };
        let divider = state.theme.divider(*mode);
        let padding = divider.padding;
        let extend = divider.extend;
        let attrs = divider.attrs.clone();
        let render = divider.render;
        let font = divider.label.clone();
        let label_attrs = divider.label_attrs.clone();
        let mask_attrs = state.theme.connect.mask_attrs.clone();
        let base_height = divider.height.max(*height);

        let geom = DividerGeom {
            x0: state.min_x - extend,
            x1: state.max_x + extend,
            y: primary_y,
            height: base_height,
        };
        for prim in render(&geom, &attrs) {
            state.layers.content.push(prim);
        }
        let mut bottom = primary_y + base_height / 2.0;
        if !label.is_empty() {
            let size = state.text_size(&font, label);
            let mid = (geom.x0 + geom.x1) / 2.0;
            state.layers.masks.push(Primitive::Rect {
                x: mid - size.width / 2.0 - padding.x,
                y: primary_y - size.height / 2.0 - padding.y,
                width: size.width + padding.x * 2.0,
                height: size.height + padding.y * 2.0,
                attrs: mask_attrs,
            });
            state.layers.content.push(Primitive::Text {
                x: mid,
                y: primary_y - size.height / 2.0,
                lines: text_lines(label),
                font,
                anchor: TextAnchor::Middle,
                attrs: label_attrs,
            });
            bottom = bottom.max(primary_y + size.height / 2.0 + padding.y);
        }
        Ok(bottom + state.theme.action_margin)
    }
}
