//! seqline-core: a sequence diagram generation and layout library.
//!
//! The crate turns an ordered list of parsed diagram commands into layered
//! vector drawing primitives in two stages: the [`Generator`] validates the
//! commands and produces a [`Sequence`] (agent order plus a merged stage
//! tree), and the [`Renderer`] resolves horizontal positions with a
//! two-phase constraint pass before emitting primitives through a
//! pluggable per-stage-type component registry.
//!
//! # Example
//!
//! ```
//! use seqline_core::{
//!     AgentRef, CharMetrics, Command, ComponentRegistry, ConnectOptions, Generator,
//!     Renderer, ThemeSet,
//! };
//!
//! let commands = vec![Command::Connect {
//!     agents: [AgentRef::new("Alice"), AgentRef::new("Bob")],
//!     label: "Hello".to_string(),
//!     options: ConnectOptions::default(),
//!     ln: 1,
//! }];
//! let sequence = Generator::new().generate(&commands).unwrap();
//!
//! let registry = ComponentRegistry::standard();
//! let themes = ThemeSet::standard();
//! let mut renderer = Renderer::new(&registry, &themes, Box::new(CharMetrics));
//! let rendering = renderer.render(&sequence).unwrap();
//! assert!(rendering.bounds.width > 0.0);
//! ```

pub mod command;
pub mod error;
pub mod generator;
pub mod pattern;
pub mod primitives;
pub mod render;
pub mod sequence;
pub mod text;
pub mod theme;

pub use command::{
    AgentFlags, AgentRef, ArrowHead, BlockKind, Command, ConnectOptions, LineType, NoteMode,
    NotePosition,
};
pub use error::{Error, Result};
pub use generator::Generator;
pub use pattern::LabelPattern;
pub use primitives::{Attrs, Bounds, Layers, Primitive, Region, Rendering};
pub use render::{Component, ComponentRegistry, RenderPrep, Renderer};
pub use sequence::{Agent, CapMode, DividerMode, Sequence, SequenceMeta, Stage, StageTag};
pub use text::{CharMetrics, FontStyle, MeasureCache, Size, TextMeasure};
pub use theme::{Theme, ThemeSet};
