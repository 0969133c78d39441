//! Input contract: the ordered command list produced by an external parser.
//!
//! The generator assumes this list is syntactically well-formed and performs
//! only semantic validation. Every command carries the 1-based source line
//! it originated from, which is attached to any error raised while the
//! command is processed.

/// Visibility and highlight requests attached to a connection endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentFlags {
    /// `*` prefix: show the agent at the connection (box cap at the line)
    pub begin: bool,
    /// `!` prefix: hide the agent after the connection (cross cap)
    pub end: bool,
    /// `+` prefix: start highlighting before the connection
    pub start_highlight: bool,
    /// `-` prefix: stop highlighting after the connection
    pub stop_highlight: bool,
}

/// A reference to an agent as written in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRef {
    /// Canonical agent name
    pub name: String,
    /// Shorthand recorded by `define`; occurrences of the alias resolve to
    /// `name`
    pub alias: Option<String>,
    pub flags: AgentFlags,
}

impl AgentRef {
    pub fn new(name: impl Into<String>) -> Self {
        AgentRef {
            name: name.into(),
            alias: None,
            flags: AgentFlags::default(),
        }
    }

    pub fn with_alias(name: impl Into<String>, alias: impl Into<String>) -> Self {
        AgentRef {
            name: name.into(),
            alias: Some(alias.into()),
            flags: AgentFlags::default(),
        }
    }

    pub fn with_flags(name: impl Into<String>, flags: AgentFlags) -> Self {
        AgentRef {
            name: name.into(),
            alias: None,
            flags,
        }
    }
}

/// Stroke style of a connection line
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineType {
    Solid,
    Dash,
    Wave,
}

/// Arrowhead drawn at a connection endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrowHead {
    None,
    Single,
    Double,
    Cross,
}

/// Line and head styling for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ConnectOptions {
    pub line: LineType,
    pub left: ArrowHead,
    pub right: ArrowHead,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            line: LineType::Solid,
            left: ArrowHead::None,
            right: ArrowHead::Single,
        }
    }
}

/// Where a note sits relative to its agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotePosition {
    Over,
    Left,
    Right,
    Between,
}

/// Visual form of a note box
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteMode {
    /// Plain rectangular note
    Note,
    /// Rounded state box
    State,
}

/// Kind of nesting block
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// `if` / `else if` / `else` chain; the only kind that accepts splits
    If,
    /// Loop block
    Repeat,
    /// Agent group lowered to a block by the generator
    Group,
}

/// One parsed command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetTitle {
        label: String,
        ln: usize,
    },
    SetTheme {
        name: String,
        ln: usize,
    },
    /// Raw terminator style name; validated by the generator
    SetTerminators {
        mode: String,
        ln: usize,
    },
    /// Raw header style name; validated by the generator
    SetHeaders {
        mode: String,
        ln: usize,
    },
    /// Pre-declare agents and record aliases
    Define {
        agents: Vec<AgentRef>,
        ln: usize,
    },
    Begin {
        agents: Vec<AgentRef>,
        ln: usize,
    },
    /// Hide agents; a name owned by an open group ends that group instead
    End {
        agents: Vec<AgentRef>,
        ln: usize,
    },
    Connect {
        agents: [AgentRef; 2],
        label: String,
        options: ConnectOptions,
        ln: usize,
    },
    /// First half of a `...tag` delayed connection
    ConnectDelayBegin {
        agent: AgentRef,
        tag: String,
        options: ConnectOptions,
        ln: usize,
    },
    /// Second half of a `...tag` delayed connection
    ConnectDelayEnd {
        agent: AgentRef,
        tag: String,
        label: String,
        options: ConnectOptions,
        ln: usize,
    },
    Note {
        position: NotePosition,
        mode: NoteMode,
        agents: Vec<AgentRef>,
        label: String,
        ln: usize,
    },
    BlockBegin {
        kind: BlockKind,
        tag: String,
        label: String,
        ln: usize,
    },
    BlockSplit {
        tag: String,
        label: String,
        ln: usize,
    },
    BlockEnd {
        ln: usize,
    },
    /// Open a named group box around existing agents
    GroupBegin {
        name: String,
        agents: Vec<AgentRef>,
        label: String,
        ln: usize,
    },
    /// Record a named vertical position
    Mark {
        name: String,
        ln: usize,
    },
    /// Continue rendering from a previously marked position
    Async {
        target: String,
        ln: usize,
    },
    /// Full-width horizontal divider; raw mode name validated by the
    /// generator
    Divider {
        mode: String,
        height: f64,
        label: String,
        ln: usize,
    },
    /// Set the pattern applied to subsequent connection labels
    LabelPattern {
        pattern: String,
        ln: usize,
    },
}

impl Command {
    /// Source line the command originated from (1-based)
    pub fn ln(&self) -> usize {
        match self {
            Command::SetTitle { ln, .. }
            | Command::SetTheme { ln, .. }
            | Command::SetTerminators { ln, .. }
            | Command::SetHeaders { ln, .. }
            | Command::Define { ln, .. }
            | Command::Begin { ln, .. }
            | Command::End { ln, .. }
            | Command::Connect { ln, .. }
            | Command::ConnectDelayBegin { ln, .. }
            | Command::ConnectDelayEnd { ln, .. }
            | Command::Note { ln, .. }
            | Command::BlockBegin { ln, .. }
            | Command::BlockSplit { ln, .. }
            | Command::BlockEnd { ln }
            | Command::GroupBegin { ln, .. }
            | Command::Mark { ln, .. }
            | Command::Async { ln, .. }
            | Command::Divider { ln, .. }
            | Command::LabelPattern { ln, .. } => *ln,
        }
    }
}
