//! Vertical position marks and asynchronous cursor jumps

use crate::error::{Error, Result};
use crate::sequence::Stage;

use super::component::{dispatch_mismatch, Component, ComponentRegistry, RenderPrep};
use super::LayoutState;

/// Handles `mark` stages: records the cursor under a name
pub(crate) struct Marks;

impl Component for Marks {
    fn separation(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        _state: &mut LayoutState<'_>,
    ) -> Result<()> {
        match stage {
            Stage::Mark { .. } => Ok(()),
            other => Err(dispatch_mismatch("mark", other)),
        }
    }

    fn render_pre(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        _state: &mut LayoutState<'_>,
    ) -> Result<RenderPrep> {
        match stage {
            Stage::Mark { .. } => Ok(RenderPrep::none()),
            other => Err(dispatch_mismatch("mark", other)),
        }
    }

    fn render(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
        primary_y: f64,
    ) -> Result<f64> {
        let Stage::Mark { name } = stage else {
            return Err(dispatch_mismatch("mark", stage));
        };
        state.marks.insert(name.clone(), primary_y);
        Ok(primary_y)
    }

    fn render_hidden(
        &self,
        stage: &Stage,
        registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
        top_y: f64,
    ) -> Result<f64> {
        // marks stay addressable even inside collapsed regions
        self.render(stage, registry, state, top_y)
    }
}

/// Handles `async` stages: rewinds the cursor to a recorded mark
pub(crate) struct Asyncs;

impl Component for Asyncs {
    fn separation(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        _state: &mut LayoutState<'_>,
    ) -> Result<()> {
        match stage {
            Stage::Async { .. } => Ok(()),
            other => Err(dispatch_mismatch("async", other)),
        }
    }

    fn render_pre(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<RenderPrep> {
        let Stage::Async { target } = stage else {
            return Err(dispatch_mismatch("async", stage));
        };
        let y = state
            .marks
            .get(target)
            .copied()
            .ok_or_else(|| Error::internal(format!("unknown marker '{target}'")))?;
        Ok(RenderPrep {
            agent_ids: Vec::new(),
            top_shift: 0.0,
            asynchronous_y: Some(y),
        })
    }

    fn render(
        &self,
        stage: &Stage,
        _registry: &ComponentRegistry,
        _state: &mut LayoutState<'_>,
        primary_y: f64,
    ) -> Result<f64> {
        match stage {
            Stage::Async { .. } => Ok(primary_y),
            other => Err(dispatch_mismatch("async", other)),
        }
    }
}
