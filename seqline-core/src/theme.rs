//! Theme definitions: every visual constant the renderer consumes.
//!
//! Themes are purely declarative where possible; the few shapes whose
//! geometry is genuinely theme-specific (dividers) are supplied as render
//! callbacks so the layout engine never hard-codes their drawing.

use crate::command::{ArrowHead, LineType, NoteMode};
use crate::error::{Error, Result};
use crate::primitives::{attrs, Attrs, Primitive};
use crate::sequence::DividerMode;
use crate::text::FontStyle;

/// Symmetric padding: `x` on each side, `y` above and below
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pad {
    pub x: f64,
    pub y: f64,
}

impl Pad {
    pub const fn new(x: f64, y: f64) -> Self {
        Pad { x, y }
    }
}

/// Boxed agent cap (header boxes, `*` creation caps)
#[derive(Debug, Clone)]
pub struct BoxCapTheme {
    pub padding: Pad,
    pub box_attrs: Attrs,
    pub label: FontStyle,
    pub label_attrs: Attrs,
}

/// `cross` terminator
#[derive(Debug, Clone)]
pub struct CrossCapTheme {
    pub radius: f64,
    pub attrs: Attrs,
}

/// `bar` cap
#[derive(Debug, Clone)]
pub struct BarCapTheme {
    pub width: f64,
    pub height: f64,
    pub attrs: Attrs,
}

/// `fade` cap; reserves space but draws nothing itself
#[derive(Debug, Clone)]
pub struct FadeCapTheme {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone)]
pub struct AgentCapTheme {
    pub boxed: BoxCapTheme,
    pub cross: CrossCapTheme,
    pub bar: BarCapTheme,
    pub fade: FadeCapTheme,
}

/// Geometry contract of one arrowhead style. `line_gap` is how far the
/// connection line stops short of the endpoint so the join looks flush for
/// the head's stroke style.
#[derive(Debug, Clone)]
pub struct ArrowTheme {
    pub width: f64,
    pub height: f64,
    pub line_gap: f64,
    pub attrs: Attrs,
}

#[derive(Debug, Clone)]
pub struct ConnectTheme {
    pub label: FontStyle,
    pub label_attrs: Attrs,
    /// Gap between the label baseline and the line
    pub label_pad: f64,
    /// Extra backdrop around masked labels
    pub mask_pad: f64,
    pub mask_attrs: Attrs,
    pub solid_attrs: Attrs,
    pub dash_attrs: Attrs,
    pub wave_attrs: Attrs,
    pub wave_amplitude: f64,
    pub wave_length: f64,
    pub single: ArrowTheme,
    pub double: ArrowTheme,
    pub cross: ArrowTheme,
    /// Horizontal extent reserved by a self-connection loop
    pub loopback_radius: f64,
}

impl ConnectTheme {
    pub fn head(&self, head: ArrowHead) -> Option<&ArrowTheme> {
        match head {
            ArrowHead::None => None,
            ArrowHead::Single => Some(&self.single),
            ArrowHead::Double => Some(&self.double),
            ArrowHead::Cross => Some(&self.cross),
        }
    }

    pub fn line_attrs(&self, line: LineType) -> &Attrs {
        match line {
            LineType::Solid => &self.solid_attrs,
            LineType::Dash => &self.dash_attrs,
            LineType::Wave => &self.wave_attrs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NoteTheme {
    pub padding: Pad,
    /// Gap between the note and the lifeline it sits beside
    pub margin: f64,
    /// How far a spanning note extends past its outer agents
    pub overhang: f64,
    pub corner_radius: f64,
    pub box_attrs: Attrs,
    pub label: FontStyle,
    pub label_attrs: Attrs,
}

#[derive(Debug, Clone)]
pub struct NoteThemes {
    pub note: NoteTheme,
    pub state: NoteTheme,
}

impl NoteThemes {
    pub fn get(&self, mode: NoteMode) -> &NoteTheme {
        match mode {
            NoteMode::Note => &self.note,
            NoteMode::State => &self.state,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockTheme {
    /// Clearance between a block outline and content outside it
    pub margin: f64,
    /// Space between the last content row and the outline's bottom edge
    pub bottom_pad: f64,
    /// Space between a section header and the section's first row
    pub section_pad: f64,
    pub box_attrs: Attrs,
    /// Separator drawn at each `else` split
    pub section_attrs: Attrs,
    pub tag_padding: Pad,
    pub tag_box_attrs: Attrs,
    pub tag_label: FontStyle,
    pub tag_attrs: Attrs,
    pub label: FontStyle,
    pub label_attrs: Attrs,
    /// Text appended to a collapsed block's header
    pub collapsed_marker: String,
}

/// Everything a divider render callback needs to know
#[derive(Debug, Clone, Copy)]
pub struct DividerGeom {
    pub x0: f64,
    pub x1: f64,
    /// Vertical centre of the divider
    pub y: f64,
    pub height: f64,
}

pub type DividerRender = fn(&DividerGeom, &Attrs) -> Vec<Primitive>;

#[derive(Debug, Clone)]
pub struct DividerTheme {
    pub padding: Pad,
    /// How far past the outermost lifelines the divider reaches
    pub extend: f64,
    pub height: f64,
    pub attrs: Attrs,
    pub label: FontStyle,
    pub label_attrs: Attrs,
    pub render: DividerRender,
}

#[derive(Debug, Clone)]
pub struct DividerThemes {
    pub line: DividerTheme,
    pub delay: DividerTheme,
    pub tear: DividerTheme,
}

#[derive(Debug, Clone)]
pub struct AgentLineTheme {
    pub attrs: Attrs,
    /// Half-width of the activation bar drawn while highlighted
    pub active_radius: f64,
    pub active_attrs: Attrs,
}

/// A complete visual configuration
#[derive(Debug, Clone)]
pub struct Theme {
    pub name: String,
    pub outer_margin: f64,
    /// Baseline horizontal clearance folded in between every pair of
    /// concurrently visible agents at every stage
    pub agent_margin: f64,
    /// Vertical clearance after each rendered stage
    pub action_margin: f64,
    pub title: FontStyle,
    pub title_attrs: Attrs,
    pub title_margin: f64,
    pub agent_line: AgentLineTheme,
    pub agent_cap: AgentCapTheme,
    pub connect: ConnectTheme,
    pub note: NoteThemes,
    pub block: BlockTheme,
    pub divider: DividerThemes,
}

impl Theme {
    pub fn divider(&self, mode: DividerMode) -> &DividerTheme {
        match mode {
            DividerMode::Line => &self.divider.line,
            DividerMode::Delay => &self.divider.delay,
            DividerMode::Tear => &self.divider.tear,
        }
    }

    /// Default clean look
    pub fn basic() -> Self {
        let label = FontStyle::new("sans-serif", 12.0);
        let small = FontStyle::new("sans-serif", 10.0);
        Theme {
            name: "basic".to_string(),
            outer_margin: 5.0,
            agent_margin: 10.0,
            action_margin: 10.0,
            title: FontStyle::bold("sans-serif", 20.0),
            title_attrs: attrs(&[("fill", "#000000")]),
            title_margin: 10.0,
            agent_line: AgentLineTheme {
                attrs: attrs(&[("stroke", "#000000"), ("stroke-width", "1")]),
                active_radius: 4.0,
                active_attrs: attrs(&[
                    ("fill", "#ffffff"),
                    ("stroke", "#000000"),
                    ("stroke-width", "1"),
                ]),
            },
            agent_cap: AgentCapTheme {
                boxed: BoxCapTheme {
                    padding: Pad::new(10.0, 5.0),
                    box_attrs: attrs(&[
                        ("fill", "#ffffff"),
                        ("stroke", "#000000"),
                        ("stroke-width", "1"),
                    ]),
                    label: label.clone(),
                    label_attrs: attrs(&[("fill", "#000000")]),
                },
                cross: CrossCapTheme {
                    radius: 8.0,
                    attrs: attrs(&[("stroke", "#000000"), ("stroke-width", "1")]),
                },
                bar: BarCapTheme {
                    width: 20.0,
                    height: 4.0,
                    attrs: attrs(&[("fill", "#000000")]),
                },
                fade: FadeCapTheme {
                    width: 5.0,
                    height: 6.0,
                },
            },
            connect: ConnectTheme {
                label: small.clone(),
                label_attrs: attrs(&[("fill", "#000000")]),
                label_pad: 4.0,
                mask_pad: 2.0,
                mask_attrs: attrs(&[("fill", "#ffffff")]),
                solid_attrs: attrs(&[("stroke", "#000000"), ("stroke-width", "1")]),
                dash_attrs: attrs(&[
                    ("stroke", "#000000"),
                    ("stroke-width", "1"),
                    ("stroke-dasharray", "4,2"),
                ]),
                wave_attrs: attrs(&[
                    ("stroke", "#000000"),
                    ("stroke-width", "1"),
                    ("fill", "none"),
                ]),
                wave_amplitude: 1.5,
                wave_length: 6.0,
                single: ArrowTheme {
                    width: 5.0,
                    height: 10.0,
                    line_gap: 0.0,
                    attrs: attrs(&[("fill", "#000000")]),
                },
                double: ArrowTheme {
                    width: 4.0,
                    height: 6.0,
                    line_gap: 2.0,
                    attrs: attrs(&[
                        ("fill", "none"),
                        ("stroke", "#000000"),
                        ("stroke-width", "1"),
                    ]),
                },
                cross: ArrowTheme {
                    width: 10.0,
                    height: 10.0,
                    line_gap: 5.0,
                    attrs: attrs(&[("stroke", "#000000"), ("stroke-width", "1")]),
                },
                loopback_radius: 6.0,
            },
            note: NoteThemes {
                note: NoteTheme {
                    padding: Pad::new(5.0, 3.0),
                    margin: 5.0,
                    overhang: 6.0,
                    corner_radius: 0.0,
                    box_attrs: attrs(&[
                        ("fill", "#ffffff"),
                        ("stroke", "#000000"),
                        ("stroke-width", "1"),
                    ]),
                    label: small.clone(),
                    label_attrs: attrs(&[("fill", "#000000")]),
                },
                state: NoteTheme {
                    padding: Pad::new(7.0, 5.0),
                    margin: 5.0,
                    overhang: 6.0,
                    corner_radius: 10.0,
                    box_attrs: attrs(&[
                        ("fill", "#ffffff"),
                        ("stroke", "#000000"),
                        ("stroke-width", "1"),
                    ]),
                    label: small.clone(),
                    label_attrs: attrs(&[("fill", "#000000")]),
                },
            },
            block: BlockTheme {
                margin: 10.0,
                bottom_pad: 5.0,
                section_pad: 3.0,
                box_attrs: attrs(&[
                    ("fill", "none"),
                    ("stroke", "#000000"),
                    ("stroke-width", "1.5"),
                ]),
                section_attrs: attrs(&[
                    ("stroke", "#000000"),
                    ("stroke-width", "1.5"),
                    ("stroke-dasharray", "4,2"),
                ]),
                tag_padding: Pad::new(10.0, 2.0),
                tag_box_attrs: attrs(&[("fill", "#ffffff")]),
                tag_label: FontStyle::bold("sans-serif", 9.0),
                tag_attrs: attrs(&[("fill", "#000000")]),
                label: small.clone(),
                label_attrs: attrs(&[("fill", "#000000")]),
                collapsed_marker: "...".to_string(),
            },
            divider: DividerThemes {
                line: DividerTheme {
                    padding: Pad::new(4.0, 6.0),
                    extend: 10.0,
                    height: 0.0,
                    attrs: attrs(&[("stroke", "#000000"), ("stroke-width", "1")]),
                    label: small.clone(),
                    label_attrs: attrs(&[("fill", "#000000")]),
                    render: render_line_divider,
                },
                delay: DividerTheme {
                    padding: Pad::new(4.0, 6.0),
                    extend: 10.0,
                    height: 6.0,
                    attrs: attrs(&[("stroke", "#000000"), ("stroke-width", "1")]),
                    label: small.clone(),
                    label_attrs: attrs(&[("fill", "#000000")]),
                    render: render_delay_divider,
                },
                tear: DividerTheme {
                    padding: Pad::new(4.0, 6.0),
                    extend: 10.0,
                    height: 6.0,
                    attrs: attrs(&[
                        ("stroke", "#000000"),
                        ("stroke-width", "1"),
                        ("fill", "none"),
                    ]),
                    label: small,
                    label_attrs: attrs(&[("fill", "#000000")]),
                    render: render_tear_divider,
                },
            },
        }
    }

    /// Fixed-width look for terminal-adjacent output
    pub fn monospace() -> Self {
        let mut theme = Theme::basic();
        theme.name = "monospace".to_string();
        let mono = |size: f64| FontStyle::new("monospace", size);
        theme.title = FontStyle::bold("monospace", 16.0);
        theme.agent_cap.boxed.label = mono(12.0);
        theme.connect.label = mono(10.0);
        theme.note.note.label = mono(10.0);
        theme.note.state.label = mono(10.0);
        theme.block.tag_label = FontStyle::bold("monospace", 9.0);
        theme.block.label = mono(10.0);
        theme.divider.line.label = mono(10.0);
        theme.divider.delay.label = mono(10.0);
        theme.divider.tear.label = mono(10.0);
        theme.agent_margin = 8.0;
        theme.action_margin = 8.0;
        theme
    }

    /// Heavy strokes and generous spacing
    pub fn chunky() -> Self {
        let mut theme = Theme::basic();
        theme.name = "chunky".to_string();
        let heavy = attrs(&[
            ("stroke", "#000000"),
            ("stroke-width", "3"),
            ("stroke-linecap", "round"),
        ]);
        theme.agent_line.attrs = heavy.clone();
        theme.connect.solid_attrs = heavy.clone();
        theme.connect.dash_attrs = attrs(&[
            ("stroke", "#000000"),
            ("stroke-width", "3"),
            ("stroke-dasharray", "10,4"),
        ]);
        theme.block.box_attrs = attrs(&[
            ("fill", "none"),
            ("stroke", "#000000"),
            ("stroke-width", "3"),
            ("rx", "5"),
        ]);
        theme.agent_cap.boxed.box_attrs = attrs(&[
            ("fill", "#ffffff"),
            ("stroke", "#000000"),
            ("stroke-width", "3"),
            ("rx", "4"),
        ]);
        theme.agent_cap.bar.height = 6.0;
        theme.agent_margin = 12.0;
        theme.action_margin = 12.0;
        theme
    }
}

fn render_line_divider(geom: &DividerGeom, line_attrs: &Attrs) -> Vec<Primitive> {
    vec![Primitive::Line {
        x1: geom.x0,
        y1: geom.y,
        x2: geom.x1,
        y2: geom.y,
        attrs: line_attrs.clone(),
    }]
}

fn render_delay_divider(geom: &DividerGeom, line_attrs: &Attrs) -> Vec<Primitive> {
    let half = geom.height / 2.0;
    vec![
        Primitive::Line {
            x1: geom.x0,
            y1: geom.y - half,
            x2: geom.x1,
            y2: geom.y - half,
            attrs: line_attrs.clone(),
        },
        Primitive::Line {
            x1: geom.x0,
            y1: geom.y + half,
            x2: geom.x1,
            y2: geom.y + half,
            attrs: line_attrs.clone(),
        },
    ]
}

fn render_tear_divider(geom: &DividerGeom, line_attrs: &Attrs) -> Vec<Primitive> {
    let half = geom.height / 2.0;
    let step = 12.0;
    let mut out = Vec::new();
    for offset in [-half, half] {
        let mut d = format!("M {} {}", geom.x0, geom.y + offset);
        let mut x = geom.x0;
        let mut up = true;
        while x < geom.x1 {
            x = (x + step).min(geom.x1);
            let dy = if up { -half } else { half };
            d.push_str(&format!(" L {} {}", x, geom.y + offset + dy));
            up = !up;
        }
        out.push(Primitive::Path {
            d,
            attrs: line_attrs.clone(),
        });
    }
    out
}

/// The set of themes a renderer can resolve by name
#[derive(Debug, Clone)]
pub struct ThemeSet {
    themes: Vec<Theme>,
}

impl ThemeSet {
    /// `basic`, `monospace` and `chunky`
    pub fn standard() -> Self {
        ThemeSet {
            themes: vec![Theme::basic(), Theme::monospace(), Theme::chunky()],
        }
    }

    pub fn register(&mut self, theme: Theme) {
        self.themes.push(theme);
    }

    pub fn names(&self) -> Vec<&str> {
        self.themes.iter().map(|t| t.name.as_str()).collect()
    }

    /// Resolve a theme by name; the empty name selects the first theme
    pub fn resolve(&self, name: &str) -> Result<&Theme> {
        if name.is_empty() {
            return self
                .themes
                .first()
                .ok_or_else(|| Error::internal("empty theme set"));
        }
        self.themes
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::UnknownTheme(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_by_name() {
        let themes = ThemeSet::standard();
        assert_eq!(themes.resolve("monospace").unwrap().name, "monospace");
        assert_eq!(themes.resolve("").unwrap().name, "basic");
    }

    #[test]
    fn test_unknown_theme_is_fatal() {
        let themes = ThemeSet::standard();
        let err = themes.resolve("neon").unwrap_err();
        assert_eq!(err, Error::UnknownTheme("neon".to_string()));
    }

    #[test]
    fn test_divider_callbacks_emit_primitives() {
        let theme = Theme::basic();
        let geom = DividerGeom {
            x0: 0.0,
            x1: 100.0,
            y: 20.0,
            height: 6.0,
        };
        let delay = theme.divider(DividerMode::Delay);
        assert_eq!((delay.render)(&geom, &delay.attrs).len(), 2);
        let tear = theme.divider(DividerMode::Tear);
        assert_eq!((tear.render)(&geom, &tear.attrs).len(), 2);
    }
}
