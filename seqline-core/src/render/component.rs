//! The per-stage-type component contract and the dispatch registry.
//!
//! Components are stateless strategy objects shared across renders; all
//! per-render state lives in the [`LayoutState`] threaded through every
//! call, so one registry can serve concurrent diagrams.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::sequence::{Stage, StageTag};

use super::LayoutState;

/// What a component reports before rendering a stage
#[derive(Debug, Clone, Default)]
pub struct RenderPrep {
    /// Agents whose vertical high-water marks gate this stage
    pub agent_ids: Vec<String>,
    /// How far the cursor must rise to fit the tallest element drawn above
    /// the stage's baseline
    pub top_shift: f64,
    /// Override the cursor entirely (marks/async jumps)
    pub asynchronous_y: Option<f64>,
}

impl RenderPrep {
    pub fn none() -> Self {
        RenderPrep::default()
    }
}

/// Strategy for one stage type
pub trait Component: Send + Sync {
    /// Pre-declare text that will be measured, so the sizing collaborator
    /// can batch its work
    fn prepare_measurements(
        &self,
        _stage: &Stage,
        _registry: &ComponentRegistry,
        _state: &mut LayoutState<'_>,
    ) -> Result<()> {
        Ok(())
    }

    fn separation_pre(
        &self,
        _stage: &Stage,
        _registry: &ComponentRegistry,
        _state: &mut LayoutState<'_>,
    ) -> Result<()> {
        Ok(())
    }

    /// Contribute horizontal constraints and maintain the visible working
    /// set
    fn separation(
        &self,
        stage: &Stage,
        registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<()>;

    /// Block-depth delta for collapse tracking: +1 opens a region, -1
    /// closes one
    fn should_hide(&self, _stage: &Stage) -> i32 {
        0
    }

    fn render_pre(
        &self,
        stage: &Stage,
        registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
    ) -> Result<RenderPrep>;

    /// Draw the stage with its baseline at `primary_y` and return the new
    /// cursor position
    fn render(
        &self,
        stage: &Stage,
        registry: &ComponentRegistry,
        state: &mut LayoutState<'_>,
        primary_y: f64,
    ) -> Result<f64>;

    /// Render the collapsed form: keep lifelines and bookkeeping alive but
    /// suppress content shapes. Defaults to a zero-height no-op.
    fn render_hidden(
        &self,
        _stage: &Stage,
        _registry: &ComponentRegistry,
        _state: &mut LayoutState<'_>,
        top_y: f64,
    ) -> Result<f64> {
        Ok(top_y)
    }
}

/// Explicit stage-type dispatch table.
///
/// Built once at startup and passed by reference into renderers, so tests
/// can substitute fakes without touching process-wide state.
pub struct ComponentRegistry {
    components: HashMap<StageTag, Box<dyn Component>>,
}

impl ComponentRegistry {
    pub fn empty() -> Self {
        ComponentRegistry {
            components: HashMap::new(),
        }
    }

    /// The full standard component set
    pub fn standard() -> Self {
        use super::{
            agent_cap::{AgentCaps, AgentHighlights},
            block::Blocks,
            connect::{Connects, DelayBegins, DelayEnds},
            divider::Dividers,
            marker::{Asyncs, Marks},
            note::Notes,
            parallel::Parallels,
        };
        let mut registry = ComponentRegistry::empty();
        registry.register(StageTag::AgentBegin, Box::new(AgentCaps));
        registry.register(StageTag::AgentEnd, Box::new(AgentCaps));
        registry.register(StageTag::AgentHighlight, Box::new(AgentHighlights));
        registry.register(StageTag::Connect, Box::new(Connects));
        registry.register(StageTag::ConnectDelayBegin, Box::new(DelayBegins));
        registry.register(StageTag::ConnectDelayEnd, Box::new(DelayEnds));
        registry.register(StageTag::Note, Box::new(Notes));
        registry.register(StageTag::BlockBegin, Box::new(Blocks));
        registry.register(StageTag::BlockSplit, Box::new(Blocks));
        registry.register(StageTag::BlockEnd, Box::new(Blocks));
        registry.register(StageTag::Mark, Box::new(Marks));
        registry.register(StageTag::Async, Box::new(Asyncs));
        registry.register(StageTag::Divider, Box::new(Dividers));
        registry.register(StageTag::Parallel, Box::new(Parallels));
        registry
    }

    pub fn register(&mut self, tag: StageTag, component: Box<dyn Component>) {
        self.components.insert(tag, component);
    }

    pub fn get(&self, tag: StageTag) -> Result<&dyn Component> {
        self.components
            .get(&tag)
            .map(Box::as_ref)
            .ok_or_else(|| Error::internal(format!("no component registered for {tag:?}")))
    }
}

/// Raised by a component handed a stage variant it does not handle
pub(crate) fn dispatch_mismatch(component: &str, stage: &Stage) -> Error {
    Error::internal(format!(
        "{component} component dispatched on {:?}",
        stage.tag()
    ))
}
