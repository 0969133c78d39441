//! End-to-end scenarios through the full generate-then-render pipeline

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use seqline_core::{
    AgentFlags, AgentRef, BlockKind, CapMode, CharMetrics, Command, ComponentRegistry,
    ConnectOptions, Generator, MeasureCache, Renderer, Sequence, Stage, StageTag, ThemeSet,
};

fn connect(a: &str, b: &str, label: &str, ln: usize) -> Command {
    Command::Connect {
        agents: [AgentRef::new(a), AgentRef::new(b)],
        label: label.to_string(),
        options: ConnectOptions::default(),
        ln,
    }
}

fn generate(commands: &[Command]) -> Sequence {
    Generator::new().generate(commands).unwrap()
}

fn flatten(stages: &[Stage]) -> Vec<Stage> {
    stages
        .iter()
        .flat_map(|s| match s {
            Stage::Parallel { stages } => stages.clone(),
            other => vec![other.clone()],
        })
        .collect()
}

#[test]
fn test_minimal_connection_scenario() {
    let seq = generate(&[connect("A", "B", "hi", 1)]);
    let ids: Vec<&str> = seq.agents.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["[", "A", "B", "]"]);
    // one merged parallel: implicit begins plus the connect
    match &seq.stages[0] {
        Stage::Parallel { stages } => {
            assert_eq!(
                stages[0],
                Stage::AgentBegin {
                    agents: vec!["A".to_string(), "B".to_string()],
                    mode: CapMode::Box,
                }
            );
            assert_eq!(stages[1].tag(), StageTag::Connect);
        }
        other => panic!("Expected Parallel, got {other:?}"),
    }

    // positions strictly increase left to right
    let registry = ComponentRegistry::standard();
    let themes = ThemeSet::standard();
    let mut renderer = Renderer::new(&registry, &themes, Box::new(CharMetrics));
    let rendering = renderer.render(&seq).unwrap();
    assert!(rendering.bounds.width > 0.0);
}

#[test]
fn test_if_else_chain_scenario() {
    let seq = generate(&[
        Command::Begin {
            agents: vec![AgentRef::new("A"), AgentRef::new("B")],
            ln: 1,
        },
        Command::BlockBegin {
            kind: BlockKind::If,
            tag: "if".to_string(),
            label: "hungry".to_string(),
            ln: 2,
        },
        connect("A", "B", "order", 3),
        Command::BlockSplit {
            tag: "else if".to_string(),
            label: "thirsty".to_string(),
            ln: 4,
        },
        connect("A", "B", "drink", 5),
        Command::BlockSplit {
            tag: "else".to_string(),
            label: String::new(),
            ln: 6,
        },
        connect("B", "A", "wait", 7),
        Command::BlockEnd { ln: 8 },
    ]);
    let headers: Vec<(StageTag, String)> = seq
        .stages
        .iter()
        .filter_map(|s| match s {
            Stage::BlockBegin { label, .. } => Some((StageTag::BlockBegin, label.clone())),
            Stage::BlockSplit { label, .. } => Some((StageTag::BlockSplit, label.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        headers,
        vec![
            (StageTag::BlockBegin, "hungry".to_string()),
            (StageTag::BlockSplit, "thirsty".to_string()),
            (StageTag::BlockSplit, String::new()),
        ]
    );
    // exactly one matching end at the same depth
    let begins = seq
        .stages
        .iter()
        .filter(|s| s.tag() == StageTag::BlockBegin)
        .count();
    let ends = seq
        .stages
        .iter()
        .filter(|s| s.tag() == StageTag::BlockEnd)
        .count();
    assert_eq!(begins, 1);
    assert_eq!(ends, 1);
}

#[test]
fn test_group_covering_scenario() {
    // C outside the group's span stays reachable
    let ok = Generator::new().generate(&[
        Command::Begin {
            agents: vec![AgentRef::new("A"), AgentRef::new("B"), AgentRef::new("C")],
            ln: 1,
        },
        Command::GroupBegin {
            name: "G".to_string(),
            agents: vec![AgentRef::new("A"), AgentRef::new("B")],
            label: "pair".to_string(),
            ln: 2,
        },
        connect("A", "C", "out", 3),
        Command::End {
            agents: vec![AgentRef::new("G")],
            ln: 4,
        },
    ]);
    assert!(ok.is_ok());

    // an agent between the group's outer members is hidden
    let err = Generator::new()
        .generate(&[
            Command::Begin {
                agents: vec![AgentRef::new("A"), AgentRef::new("B"), AgentRef::new("C")],
                ln: 1,
            },
            Command::GroupBegin {
                name: "G".to_string(),
                agents: vec![AgentRef::new("A"), AgentRef::new("C")],
                label: String::new(),
                ln: 2,
            },
            connect("B", "C", "in", 3),
        ])
        .unwrap_err();
    assert_eq!(err.to_string(), "B is hidden behind group at line 3");
}

#[test]
fn test_duplicate_alias_scenario() {
    let err = Generator::new()
        .generate(&[
            Command::Define {
                agents: vec![AgentRef::with_alias("Y", "X")],
                ln: 1,
            },
            Command::Define {
                agents: vec![AgentRef::with_alias("Z", "X")],
                ln: 2,
            },
        ])
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("Cannot alias X; it is already an alias"));
}

#[test]
fn test_collapse_toggle_scenario() {
    let commands = [
        Command::Begin {
            agents: vec![AgentRef::new("A"), AgentRef::new("B")],
            ln: 1,
        },
        Command::BlockBegin {
            kind: BlockKind::Repeat,
            tag: "repeat".to_string(),
            label: "forever".to_string(),
            ln: 2,
        },
        connect("A", "B", "tick", 3),
        connect("B", "A", "tock", 4),
        Command::BlockEnd { ln: 5 },
    ];
    let seq = generate(&commands);
    let registry = ComponentRegistry::standard();
    let themes = ThemeSet::standard();
    let mut renderer = Renderer::new(&registry, &themes, Box::new(CharMetrics));
    let expanded = renderer.render(&seq).unwrap();
    renderer.set_collapsed(2, true);
    let collapsed = renderer.render(&seq).unwrap();
    assert_eq!(collapsed.bounds.width, expanded.bounds.width);
    assert_eq!(collapsed.bounds.x, expanded.bounds.x);
    assert!(collapsed.bounds.height < expanded.bounds.height);
}

#[test]
fn test_double_render_is_identical() {
    let commands = [
        Command::SetTitle {
            label: "Checkout".to_string(),
            ln: 1,
        },
        Command::Begin {
            agents: vec![AgentRef::new("Client"), AgentRef::new("Server")],
            ln: 2,
        },
        connect("Client", "Server", "POST /cart", 3),
        Command::Note {
            position: seqline_core::NotePosition::Over,
            mode: seqline_core::NoteMode::Note,
            agents: vec![AgentRef::new("Server")],
            label: "validate".to_string(),
            ln: 4,
        },
        connect("Server", "Client", "201", 5),
    ];
    let seq_a = generate(&commands);
    let seq_b = generate(&commands);
    assert_eq!(seq_a, seq_b);

    let registry = ComponentRegistry::standard();
    let themes = ThemeSet::standard();
    let mut renderer = Renderer::new(
        &registry,
        &themes,
        Box::new(MeasureCache::new(CharMetrics)),
    );
    let first = renderer.render(&seq_a).unwrap();
    let second = renderer.render(&seq_b).unwrap();
    assert_eq!(first, second);
    let json_a = serde_json::to_string(&first).unwrap();
    let json_b = serde_json::to_string(&second).unwrap();
    assert_eq!(json_a, json_b);
}

#[test]
fn test_flag_expansion_renders_activation() {
    let mut create = AgentFlags::default();
    create.begin = true;
    let mut destroy = AgentFlags::default();
    destroy.end = true;
    destroy.stop_highlight = true;
    let mut activate = AgentFlags::default();
    activate.start_highlight = true;

    let seq = generate(&[
        Command::Begin {
            agents: vec![AgentRef::new("A")],
            ln: 1,
        },
        Command::Connect {
            agents: [AgentRef::new("A"), AgentRef::with_flags("B", create)],
            label: "spawn".to_string(),
            options: ConnectOptions::default(),
            ln: 2,
        },
        Command::Connect {
            agents: [AgentRef::new("A"), AgentRef::with_flags("B", activate)],
            label: "work".to_string(),
            options: ConnectOptions::default(),
            ln: 3,
        },
        Command::Connect {
            agents: [AgentRef::new("A"), AgentRef::with_flags("B", destroy)],
            label: "kill".to_string(),
            options: ConnectOptions::default(),
            ln: 4,
        },
    ]);
    let flat = flatten(&seq.stages);
    // the destroy connect carries a cross-mode end in its parallel group
    assert!(flat.iter().any(|s| matches!(
        s,
        Stage::AgentEnd { mode: CapMode::Cross, agents } if agents == &["B".to_string()]
    )));
    assert!(flat
        .iter()
        .any(|s| matches!(s, Stage::AgentHighlight { highlighted: true, .. })));
    assert!(flat
        .iter()
        .any(|s| matches!(s, Stage::AgentHighlight { highlighted: false, .. })));

    let registry = ComponentRegistry::standard();
    let themes = ThemeSet::standard();
    let mut renderer = Renderer::new(&registry, &themes, Box::new(CharMetrics));
    let rendering = renderer.render(&seq).unwrap();
    assert!(!rendering.layers.lifelines.is_empty());
}

#[test]
fn test_separation_monotonicity_across_themes() {
    let commands = [
        connect("A", "B", "a medium label", 1),
        connect("B", "C", "x", 2),
        connect("A", "C", "a rather longer label spanning two gaps", 3),
    ];
    for theme in ["basic", "monospace", "chunky"] {
        let mut cmds = vec![Command::SetTheme {
            name: theme.to_string(),
            ln: 1,
        }];
        cmds.extend(commands.iter().cloned());
        let seq = generate(&cmds);
        let registry = ComponentRegistry::standard();
        let themes = ThemeSet::standard();
        let mut renderer = Renderer::new(&registry, &themes, Box::new(CharMetrics));
        let rendering = renderer.render(&seq).unwrap();
        // lifelines appear in agent order with strictly increasing x
        let mut xs: HashMap<String, f64> = HashMap::new();
        for prim in &rendering.layers.lifelines {
            if let seqline_core::Primitive::Line { x1, .. } = prim {
                xs.entry(format!("{x1}")).or_insert(*x1);
            }
        }
        let mut positions: Vec<f64> = xs.values().copied().collect();
        positions.sort_by(f64::total_cmp);
        assert_eq!(positions.len(), 3, "expected three lifelines ({theme})");
        assert!(positions[0] < positions[1] && positions[1] < positions[2]);
    }
}

#[test]
fn test_self_connection_and_divider() {
    let seq = generate(&[
        connect("A", "A", "think", 1),
        Command::Divider {
            mode: "tear".to_string(),
            height: 8.0,
            label: "later".to_string(),
            ln: 2,
        },
        connect("A", "B", "act", 3),
    ]);
    let registry = ComponentRegistry::standard();
    let themes = ThemeSet::standard();
    let mut renderer = Renderer::new(&registry, &themes, Box::new(CharMetrics));
    let rendering = renderer.render(&seq).unwrap();
    // the divider's tear callback emits two paths, the self connection one
    let paths = rendering
        .layers
        .content
        .iter()
        .filter(|p| matches!(p, seqline_core::Primitive::Path { .. }))
        .count();
    assert!(paths >= 3);
}

#[test]
fn test_delayed_connection_draws_in_flight() {
    let seq = generate(&[
        Command::Begin {
            agents: vec![AgentRef::new("A"), AgentRef::new("B"), AgentRef::new("C")],
            ln: 1,
        },
        Command::ConnectDelayBegin {
            agent: AgentRef::new("A"),
            tag: "m".to_string(),
            options: ConnectOptions::default(),
            ln: 2,
        },
        connect("B", "C", "meanwhile", 3),
        Command::ConnectDelayEnd {
            agent: AgentRef::new("C"),
            tag: "m".to_string(),
            label: "finally arrives".to_string(),
            options: ConnectOptions::default(),
            ln: 4,
        },
    ]);
    let registry = ComponentRegistry::standard();
    let themes = ThemeSet::standard();
    let mut renderer = Renderer::new(&registry, &themes, Box::new(CharMetrics));
    let rendering = renderer.render(&seq).unwrap();
    // the in-flight line is diagonal: its endpoints sit at different heights
    let diagonal = rendering.layers.content.iter().any(|p| {
        matches!(p, seqline_core::Primitive::Line { y1, y2, .. } if (y1 - y2).abs() > 1.0)
    });
    assert!(diagonal);
}

#[test]
fn test_label_pattern_applies_across_blocks() {
    let seq = generate(&[
        Command::LabelPattern {
            pattern: "<inc 10,10>: <label>".to_string(),
            ln: 1,
        },
        connect("A", "B", "first", 2),
        Command::BlockBegin {
            kind: BlockKind::Repeat,
            tag: "repeat".to_string(),
            label: String::new(),
            ln: 3,
        },
        connect("B", "A", "second", 4),
        Command::BlockEnd { ln: 5 },
    ]);
    let labels: Vec<String> = flatten(&seq.stages)
        .into_iter()
        .filter_map(|s| match s {
            Stage::Connect { label, .. } => Some(label),
            _ => None,
        })
        .collect();
    assert_eq!(labels, vec!["10: first".to_string(), "20: second".to_string()]);
}
