//! Simultaneous stage groups: children share one baseline

use crate::error::Result;
use crate::sequence::Stage;

use super::component::{dispatch_mismatch, Component, ComponentRegistry, RenderPrep};
use super::LayoutState;

/// Handles `parallel` stages by fanning out to the children's components
pub(crate) struct Parallels;

fn children<'s>(stage: &'s Stage, component: &str) -> Result<&'s [Stage]> {
    match stage {
        Stage::Parallel { stages } => Ok(stages),
        other => Err(dispatch_mismatch(component, other)),
    }
}

impl Component for Parallels {
    fn prepare_measurements(
        &self,
        stage: &Stage,
        registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        for child in children(stage, "parallel")? {
            registry
                .get(child.tag())?
                .prepare_measurements(child, registry, state)?;
        }
        Ok(())
    }

    fn separation(
        &self,
        stage: &Stage,
        registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()> {
        for child in children(stage, "parallel")? {
            registry.get(child.tag())?.separation(child, registry, state)?;
        }
        Ok(())
    }

    fn should_hide(&self, _stage: &Stage) -> i32 {
        0
    }

    fn render_pre(
        &self,
        stage: &Stage,
        registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<RenderPrep> {
        let mut merged = RenderPrep::none();
        for child in children(stage, "parallel")? {
            let prep = registry.get(child.tag())?.render_pre(child, registry, state)?;
            merged.top_shift = merged.top_shift.max(prep.top_shift);
            for id in prep.agent_ids {
                if !merged.agent_ids.iter().any(|a| *a == id) {
                    merged.agent_ids.push(id);
                }
            }
            if merged.asynchronous_y.is_none() {
                merged.asynchronous_y = prep.asynchronous_y;
            }
        }
        Ok(merged)
    }

    fn render(
        &self,
        stage: &Stage,
        registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
        primary_y: f64,
    ) -> Result<f64> {
        let mut bottom = primary_y;
        for child in children(stage, "parallel")? {
            let y = registry
                .get(child.tag())?
                .render(child, registry, state, primary_y)?;
            bottom = bottom.max(y);
        }
        Ok(bottom)
    }

    fn render_hidden(
        &self,
        stage: &Stage,
        registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
        top_y: f64,
    ) -> Result<f64> {
        let mut bottom = top_y;
        for child in children(stage, "parallel")? {
            let y = registry
                .get(child.tag())?
                .render_hidden(child, registry, state, top_y)?;
            bottom = bottom.max(y);
        }
        Ok(bottom)
    }
}
