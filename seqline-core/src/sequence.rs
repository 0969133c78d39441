//! The validated diagram model passed from the generator to the renderer

use crate::command::{BlockKind, ConnectOptions, NoteMode, NotePosition};

/// Identifier of the synthetic left edge of the diagram
pub const LEFT_EDGE: &str = "[";
/// Identifier of the synthetic right edge of the diagram
pub const RIGHT_EDGE: &str = "]";

/// Style of the cap drawn where an agent's lifeline starts or stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapMode {
    None,
    Box,
    Cross,
    Bar,
    Fade,
}

impl CapMode {
    /// Resolve a user-supplied terminator/header style name
    pub fn from_name(name: &str) -> Option<CapMode> {
        match name {
            "none" => Some(CapMode::None),
            "box" => Some(CapMode::Box),
            "cross" => Some(CapMode::Cross),
            "bar" => Some(CapMode::Bar),
            "fade" => Some(CapMode::Fade),
            _ => None,
        }
    }
}

/// Style of a full-width divider
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DividerMode {
    Line,
    Delay,
    Tear,
}

impl DividerMode {
    pub fn from_name(name: &str) -> Option<DividerMode> {
        match name {
            "line" => Some(DividerMode::Line),
            "delay" => Some(DividerMode::Delay),
            "tear" => Some(DividerMode::Tear),
            _ => None,
        }
    }
}

/// A lifeline participating in the diagram.
///
/// Order in [`Sequence::agents`] is meaningful: it defines adjacency for
/// separation constraints and the left-to-right placement on screen.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Agent {
    pub id: String,
    /// Resolve this agent's position from the right during layout; set on
    /// the right-hand boundary agent of every block and group
    pub anchor_right: bool,
}

impl Agent {
    pub fn new(id: impl Into<String>) -> Self {
        Agent {
            id: id.into(),
            anchor_right: false,
        }
    }

    pub fn anchored(id: impl Into<String>) -> Self {
        Agent {
            id: id.into(),
            anchor_right: true,
        }
    }
}

/// Diagram-wide settings collected from meta commands
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SequenceMeta {
    pub title: String,
    /// Theme name resolved by the renderer; empty selects the default
    pub theme: String,
    /// Cap drawn when a lifeline ends without an explicit style
    pub terminators: CapMode,
    /// Cap drawn when a lifeline begins
    pub headers: CapMode,
}

impl Default for SequenceMeta {
    fn default() -> Self {
        SequenceMeta {
            title: String::new(),
            theme: String::new(),
            terminators: CapMode::None,
            headers: CapMode::Box,
        }
    }
}

/// Discriminant of [`Stage`], used for component dispatch and merge rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageTag {
    AgentBegin,
    AgentEnd,
    AgentHighlight,
    Connect,
    ConnectDelayBegin,
    ConnectDelayEnd,
    Note,
    BlockBegin,
    BlockSplit,
    BlockEnd,
    Mark,
    Async,
    Divider,
    Parallel,
}

/// One unit of validated diagram content.
///
/// Block content is spliced flat between matching `BlockBegin`/`BlockEnd`
/// stages; `Parallel` nests stages that render at the same vertical
/// position.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Stage {
    AgentBegin {
        agents: Vec<String>,
        mode: CapMode,
    },
    AgentEnd {
        agents: Vec<String>,
        mode: CapMode,
    },
    AgentHighlight {
        agents: Vec<String>,
        highlighted: bool,
    },
    Connect {
        agents: [String; 2],
        label: String,
        options: ConnectOptions,
        ln: usize,
    },
    ConnectDelayBegin {
        agent: String,
        tag: String,
        options: ConnectOptions,
        ln: usize,
    },
    ConnectDelayEnd {
        from: String,
        to: String,
        tag: String,
        label: String,
        options: ConnectOptions,
        ln: usize,
    },
    Note {
        position: NotePosition,
        mode: NoteMode,
        agents: Vec<String>,
        label: String,
        ln: usize,
    },
    BlockBegin {
        kind: BlockKind,
        tag: String,
        label: String,
        left: String,
        right: String,
        ln: usize,
    },
    BlockSplit {
        tag: String,
        label: String,
        left: String,
        right: String,
        ln: usize,
    },
    BlockEnd {
        left: String,
        right: String,
    },
    Mark {
        name: String,
    },
    Async {
        target: String,
    },
    Divider {
        mode: DividerMode,
        height: f64,
        label: String,
        ln: usize,
    },
    Parallel {
        stages: Vec<Stage>,
    },
}

impl Stage {
    pub fn tag(&self) -> StageTag {
        match self {
            Stage::AgentBegin { .. } => StageTag::AgentBegin,
            Stage::AgentEnd { .. } => StageTag::AgentEnd,
            Stage::AgentHighlight { .. } => StageTag::AgentHighlight,
            Stage::Connect { .. } => StageTag::Connect,
            Stage::ConnectDelayBegin { .. } => StageTag::ConnectDelayBegin,
            Stage::ConnectDelayEnd { .. } => StageTag::ConnectDelayEnd,
            Stage::Note { .. } => StageTag::Note,
            Stage::BlockBegin { .. } => StageTag::BlockBegin,
            Stage::BlockSplit { .. } => StageTag::BlockSplit,
            Stage::BlockEnd { .. } => StageTag::BlockEnd,
            Stage::Mark { .. } => StageTag::Mark,
            Stage::Async { .. } => StageTag::Async,
            Stage::Divider { .. } => StageTag::Divider,
            Stage::Parallel { .. } => StageTag::Parallel,
        }
    }

    /// Ids of every agent this stage touches, nested stages included
    pub fn touched_agents(&self) -> Vec<&str> {
        match self {
            Stage::AgentBegin { agents, .. }
            | Stage::AgentEnd { agents, .. }
            | Stage::AgentHighlight { agents, .. } => {
                agents.iter().map(String::as_str).collect()
            }
            Stage::Connect { agents, .. } => agents.iter().map(String::as_str).collect(),
            Stage::ConnectDelayBegin { agent, .. } => vec![agent.as_str()],
            Stage::ConnectDelayEnd { from, to, .. } => vec![from.as_str(), to.as_str()],
            Stage::Note { agents, .. } => agents.iter().map(String::as_str).collect(),
            Stage::BlockBegin { left, right, .. }
            | Stage::BlockSplit { left, right, .. }
            | Stage::BlockEnd { left, right } => vec![left.as_str(), right.as_str()],
            Stage::Mark { .. } | Stage::Async { .. } | Stage::Divider { .. } => Vec::new(),
            Stage::Parallel { stages } => {
                stages.iter().flat_map(Stage::touched_agents).collect()
            }
        }
    }
}

/// The fully resolved, validated diagram model.
///
/// Invariant: every agent id referenced by any stage appears in `agents`,
/// and the agent order starts with [`LEFT_EDGE`] and ends with
/// [`RIGHT_EDGE`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Sequence {
    pub meta: SequenceMeta,
    pub agents: Vec<Agent>,
    pub stages: Vec<Stage>,
}

impl Sequence {
    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }
}
