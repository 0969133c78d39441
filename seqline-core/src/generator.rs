//! Sequence generator: turns a flat command list into a validated,
//! nesting-resolved [`Sequence`].
//!
//! The generator owns all semantic validation (agent lifecycle, aliasing,
//! block and group nesting, flag conflicts) and three structural rewrites:
//! label-pattern substitution, group-to-block lowering, and the stage-merge
//! optimisation that collapses adjacent compatible lifecycle stages.

use std::collections::{HashMap, HashSet};
use std::mem;

use tracing::debug;

use crate::command::{AgentRef, BlockKind, Command, ConnectOptions, NotePosition};
use crate::error::{Error, Result};
use crate::pattern::LabelPattern;
use crate::sequence::{
    Agent, CapMode, DividerMode, Sequence, SequenceMeta, Stage, StageTag, LEFT_EDGE, RIGHT_EDGE,
};

/// Runtime flags tracked for every agent while generating
#[derive(Debug, Clone, PartialEq)]
struct AgentState {
    visible: bool,
    /// Structural agent (diagram edge or block boundary); visibility can
    /// never be changed by user commands
    locked: bool,
    /// The name is owned by a group and cannot be used as a plain agent
    blocked: bool,
    highlighted: bool,
    /// Name of the group currently owning this agent
    group: Option<String>,
    /// Hidden behind an active group box; referencing it is an error
    covered: bool,
}

impl AgentState {
    const fn new() -> Self {
        AgentState {
            visible: false,
            locked: false,
            blocked: false,
            highlighted: false,
            group: None,
            covered: false,
        }
    }

    const fn locked_default() -> Self {
        AgentState {
            visible: false,
            locked: true,
            blocked: false,
            highlighted: false,
            group: None,
            covered: false,
        }
    }
}

static DEFAULT_STATE: AgentState = AgentState::new();
static LOCKED_STATE: AgentState = AgentState::locked_default();

/// One `if`/`else if`/`else` section of a nesting frame
#[derive(Debug)]
struct Section {
    header: Stage,
    stages: Vec<Stage>,
}

/// One open block or group
#[derive(Debug)]
struct NestFrame {
    kind: BlockKind,
    left: String,
    right: String,
    current: Section,
    done: Vec<Section>,
    /// Agents referenced by content so far; bounds the boundary insertion
    used: Vec<String>,
    has_content: bool,
    /// Set when this frame was lowered from a group
    group: Option<String>,
    ln: usize,
}

#[derive(Debug)]
struct GroupInfo {
    members: Vec<String>,
    covered: Vec<String>,
}

#[derive(Debug)]
struct DelayedRef {
    agent: String,
    ln: usize,
}

#[derive(Debug, Default)]
struct FlagSets {
    begin: Vec<String>,
    end: Vec<String>,
    start: Vec<String>,
    stop: Vec<String>,
}

/// Turns command lists into [`Sequence`]s. All state is reset at the start
/// of each [`Generator::generate`] call, so one instance can be reused.
#[derive(Debug, Default)]
pub struct Generator {
    agents: Vec<Agent>,
    states: HashMap<String, AgentState>,
    aliases: HashMap<String, String>,
    blocks: Vec<NestFrame>,
    root: Vec<Stage>,
    groups: HashMap<String, GroupInfo>,
    marks: HashSet<String>,
    delayed: HashMap<String, DelayedRef>,
    pattern: LabelPattern,
    meta: SequenceMeta,
    block_counter: usize,
}

impl Generator {
    pub fn new() -> Self {
        Generator::default()
    }

    /// Generate a validated sequence from a parsed command list
    pub fn generate(&mut self, commands: &[Command]) -> Result<Sequence> {
        self.reset();
        debug!(commands = commands.len(), "generating sequence");
        for command in commands {
            self.handle(command)?;
        }
        self.finalise()
    }

    fn reset(&mut self) {
        self.agents = vec![Agent::new(LEFT_EDGE), Agent::new(RIGHT_EDGE)];
        self.states.clear();
        self.aliases.clear();
        self.blocks.clear();
        self.root.clear();
        self.groups.clear();
        self.marks.clear();
        self.marks.insert(String::new());
        self.delayed.clear();
        self.pattern = LabelPattern::plain();
        self.meta = SequenceMeta::default();
        self.block_counter = 0;
    }

    fn handle(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::SetTitle { label, .. } => {
                self.meta.title = label.clone();
                Ok(())
            }
            Command::SetTheme { name, .. } => {
                self.meta.theme = name.clone();
                Ok(())
            }
            Command::SetTerminators { mode, ln } => {
                self.meta.terminators = CapMode::from_name(mode)
                    .ok_or_else(|| Error::at(format!("Unknown termination '{mode}'"), *ln))?;
                Ok(())
            }
            Command::SetHeaders { mode, ln } => {
                self.meta.headers = CapMode::from_name(mode)
                    .ok_or_else(|| Error::at(format!("Unknown header '{mode}'"), *ln))?;
                Ok(())
            }
            Command::Define { agents, ln } => self.handle_define(agents, *ln),
            Command::Begin { agents, ln } => self.handle_begin(agents, *ln),
            Command::End { agents, ln } => self.handle_end(agents, *ln),
            Command::Connect {
                agents,
                label,
                options,
                ln,
            } => self.handle_connect(agents, label, *options, *ln),
            Command::ConnectDelayBegin {
                agent,
                tag,
                options,
                ln,
            } => self.handle_connect_delay_begin(agent, tag, *options, *ln),
            Command::ConnectDelayEnd {
                agent,
                tag,
                label,
                options,
                ln,
            } => self.handle_connect_delay_end(agent, tag, label, *options, *ln),
            Command::Note {
                position,
                mode,
                agents,
                label,
                ln,
            } => self.handle_note(*position, *mode, agents, label, *ln),
            Command::BlockBegin {
                kind,
                tag,
                label,
                ln,
            } => self.handle_block_begin(*kind, tag, label, *ln),
            Command::BlockSplit { tag, label, ln } => self.handle_block_split(tag, label, *ln),
            Command::BlockEnd { ln } => self.handle_block_end(*ln),
            Command::GroupBegin {
                name,
                agents,
                label,
                ln,
            } => self.handle_group_begin(name, agents, label, *ln),
            Command::Mark { name, ln: _ } => {
                self.marks.insert(name.clone());
                self.add_stage(Stage::Mark { name: name.clone() });
                Ok(())
            }
            Command::Async { target, ln } => {
                if !self.marks.contains(target) {
                    return Err(Error::at(format!("Unknown marker '{target}'"), *ln));
                }
                self.add_stage(Stage::Async {
                    target: target.clone(),
                });
                Ok(())
            }
            Command::Divider {
                mode,
                height,
                label,
                ln,
            } => {
                let mode = DividerMode::from_name(mode)
                    .ok_or_else(|| Error::at(format!("Unknown divider type '{mode}'"), *ln))?;
                self.add_stage(Stage::Divider {
                    mode,
                    height: *height,
                    label: label.clone(),
                    ln: *ln,
                });
                Ok(())
            }
            Command::LabelPattern { pattern, .. } => {
                self.pattern = LabelPattern::parse(pattern);
                Ok(())
            }
        }
    }

    // --- agent bookkeeping ---------------------------------------------

    fn resolve(&self, name: &str) -> String {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    fn state(&self, id: &str) -> &AgentState {
        if let Some(state) = self.states.get(id) {
            return state;
        }
        if id == LEFT_EDGE || id == RIGHT_EDGE {
            &LOCKED_STATE
        } else {
            &DEFAULT_STATE
        }
    }

    fn state_mut(&mut self, id: &str) -> &mut AgentState {
        self.states
            .entry(id.to_string())
            .or_insert_with(AgentState::new)
    }

    fn order_index(&self, id: &str) -> Option<usize> {
        self.agents.iter().position(|a| a.id == id)
    }

    /// Register an agent in the global order on first reference
    fn add_agent(&mut self, id: &str) {
        if self.order_index(id).is_some() {
            return;
        }
        let end = self
            .order_index(RIGHT_EDGE)
            .unwrap_or(self.agents.len());
        self.agents.insert(end, Agent::new(id));
    }

    fn record_use(&mut self, id: &str) {
        for frame in &mut self.blocks {
            // group boxes bound to their members, not to connection targets
            if frame.group.is_some() {
                continue;
            }
            if !frame.used.iter().any(|u| u == id) {
                frame.used.push(id.to_string());
            }
        }
    }

    /// Nested boundary agents extend every enclosing frame, groups included
    fn record_boundary(&mut self, id: &str) {
        for frame in &mut self.blocks {
            if !frame.used.iter().any(|u| u == id) {
                frame.used.push(id.to_string());
            }
        }
    }

    fn add_stage(&mut self, stage: Stage) {
        let touched: Vec<String> = stage
            .touched_agents()
            .iter()
            .map(|s| s.to_string())
            .collect();
        for id in &touched {
            self.record_use(id);
        }
        for frame in &mut self.blocks {
            frame.has_content = true;
        }
        if let Some(frame) = self.blocks.last_mut() {
            frame.current.stages.push(stage);
        } else {
            self.root.push(stage);
        }
    }

    fn add_parallel(&mut self, mut stages: Vec<Stage>) {
        match stages.len() {
            0 => {}
            1 => self.add_stage(stages.remove(0)),
            _ => self.add_stage(Stage::Parallel { stages }),
        }
    }

    fn validate_refs(&self, ids: &[String], ln: usize) -> Result<()> {
        for id in ids {
            let state = self.state(id);
            if state.covered {
                return Err(Error::at(format!("{id} is hidden behind group"), ln));
            }
            if state.blocked {
                return Err(Error::at(
                    format!("Cannot use group '{id}' as an agent"),
                    ln,
                ));
            }
        }
        Ok(())
    }

    /// Apply a visibility transition, returning the stage describing it.
    ///
    /// Explicit (`checked`) transitions raise on locked or blocked agents;
    /// implicit ones silently drop them. Requesting a state an agent is
    /// already in is a no-op.
    fn set_agent_vis(
        &mut self,
        ids: &[String],
        visible: bool,
        mode: CapMode,
        checked: bool,
        ln: usize,
    ) -> Result<Option<Stage>> {
        let mut changed: Vec<String> = Vec::new();
        for id in ids {
            if changed.iter().any(|c| c == id) {
                continue;
            }
            let state = self.state(id);
            if state.locked || state.blocked {
                if checked {
                    let verb = if visible { "begin" } else { "end" };
                    return Err(Error::at(format!("Cannot {verb} agent '{id}'"), ln));
                }
                continue;
            }
            if state.visible == visible {
                continue;
            }
            changed.push(id.clone());
        }
        for id in &changed {
            let state = self.state_mut(id);
            state.visible = visible;
            if !visible {
                state.highlighted = false;
            }
        }
        if changed.is_empty() {
            return Ok(None);
        }
        let stage = if visible {
            Stage::AgentBegin {
                agents: changed,
                mode,
            }
        } else {
            Stage::AgentEnd {
                agents: changed,
                mode,
            }
        };
        Ok(Some(stage))
    }

    fn set_agent_highlight(&mut self, ids: &[String], highlighted: bool) -> Option<Stage> {
        let mut changed: Vec<String> = Vec::new();
        for id in ids {
            if changed.iter().any(|c| c == id) {
                continue;
            }
            let state = self.state(id);
            if state.locked || state.blocked || !state.visible {
                continue;
            }
            if state.highlighted == highlighted {
                continue;
            }
            changed.push(id.clone());
        }
        for id in &changed {
            self.state_mut(id).highlighted = highlighted;
        }
        if changed.is_empty() {
            None
        } else {
            Some(Stage::AgentHighlight {
                agents: changed,
                highlighted,
            })
        }
    }

    fn collect_flags(&self, refs: &[&AgentRef], ln: usize) -> Result<FlagSets> {
        let mut sets = FlagSets::default();
        for r in refs {
            let id = self.resolve(&r.name);
            let push = |list: &mut Vec<String>| {
                if !list.iter().any(|x| x == &id) {
                    list.push(id.clone());
                }
            };
            if r.flags.begin {
                push(&mut sets.begin);
            }
            if r.flags.end {
                push(&mut sets.end);
            }
            if r.flags.start_highlight {
                push(&mut sets.start);
            }
            if r.flags.stop_highlight {
                push(&mut sets.stop);
            }
        }
        if sets.begin.iter().any(|id| sets.end.contains(id)) {
            return Err(Error::at("Cannot set agent visibility multiple times", ln));
        }
        if sets.start.iter().any(|id| sets.stop.contains(id)) {
            return Err(Error::at(
                "Cannot set agent highlighting multiple times",
                ln,
            ));
        }
        Ok(sets)
    }

    // --- groups ---------------------------------------------------------

    fn group_boundaries(name: &str) -> (String, String) {
        (format!("{name}["), format!("{name}]"))
    }

    /// Replace a grouped connection endpoint with the group boundary facing
    /// the other endpoint
    fn group_endpoint(&self, id: &str, other: &str) -> String {
        let Some(group) = &self.state(id).group else {
            return id.to_string();
        };
        let Some(info) = self.groups.get(group) else {
            return id.to_string();
        };
        let (left, right) = Generator::group_boundaries(group);
        let min_member = info
            .members
            .iter()
            .filter_map(|m| self.order_index(m))
            .min();
        match (self.order_index(other), min_member) {
            (Some(other_idx), Some(min_idx)) if other_idx < min_idx => left,
            _ => right,
        }
    }

    fn expand_grouped_connection(&self, a: &str, b: &str) -> (String, String) {
        let group_a = self.state(a).group.clone();
        let group_b = self.state(b).group.clone();
        if let (Some(ga), Some(gb)) = (&group_a, &group_b) {
            if ga == gb {
                // a connection within one group spans the whole group box
                return Generator::group_boundaries(ga);
            }
        }
        (self.group_endpoint(a, b), self.group_endpoint(b, a))
    }

    fn expand_grouped_agents(&self, ids: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for id in ids {
            let expanded = match &self.state(id).group {
                Some(group) => {
                    let (left, right) = Generator::group_boundaries(group);
                    vec![left, right]
                }
                None => vec![id.clone()],
            };
            for e in expanded {
                if !out.iter().any(|x| x == &e) {
                    out.push(e);
                }
            }
        }
        out
    }

    // --- command handlers ----------------------------------------------

    fn handle_define(&mut self, refs: &[AgentRef], ln: usize) -> Result<()> {
        for r in refs {
            let canonical = self.resolve(&r.name);
            self.validate_refs(std::slice::from_ref(&canonical), ln)?;
            if let Some(alias) = &r.alias {
                if self.aliases.contains_key(alias) {
                    return Err(Error::at(
                        format!("Cannot alias {alias}; it is already an alias"),
                        ln,
                    ));
                }
                if self.states.contains_key(alias) || self.order_index(alias).is_some() {
                    return Err(Error::at(
                        format!("Cannot alias {alias}; it is already in use"),
                        ln,
                    ));
                }
                self.aliases.insert(alias.clone(), canonical.clone());
            }
            self.add_agent(&canonical);
            self.state_mut(&canonical);
        }
        Ok(())
    }

    fn handle_begin(&mut self, refs: &[AgentRef], ln: usize) -> Result<()> {
        let ids: Vec<String> = refs.iter().map(|r| self.resolve(&r.name)).collect();
        self.validate_refs(&ids, ln)?;
        for id in &ids {
            self.add_agent(id);
        }
        let mode = self.meta.headers;
        if let Some(stage) = self.set_agent_vis(&ids, true, mode, true, ln)? {
            self.add_stage(stage);
        }
        Ok(())
    }

    fn handle_end(&mut self, refs: &[AgentRef], ln: usize) -> Result<()> {
        let mut agent_ids: Vec<String> = Vec::new();
        for r in refs {
            let id = self.resolve(&r.name);
            if self.groups.contains_key(&id) {
                self.handle_group_end(&id, ln)?;
            } else {
                agent_ids.push(id);
            }
        }
        if agent_ids.is_empty() {
            return Ok(());
        }
        self.validate_refs(&agent_ids, ln)?;
        for id in &agent_ids {
            self.add_agent(id);
        }
        let mode = self.meta.terminators;
        if let Some(stage) = self.set_agent_vis(&agent_ids, false, mode, true, ln)? {
            self.add_stage(stage);
        }
        Ok(())
    }

    fn handle_connect(
        &mut self,
        refs: &[AgentRef; 2],
        label: &str,
        options: ConnectOptions,
        ln: usize,
    ) -> Result<()> {
        let a = self.resolve(&refs[0].name);
        let b = self.resolve(&refs[1].name);
        let ids = vec![a.clone(), b.clone()];
        self.validate_refs(&ids, ln)?;
        self.add_agent(&a);
        self.add_agent(&b);
        let flags = self.collect_flags(&[&refs[0], &refs[1]], ln)?;

        let mut stages: Vec<Stage> = Vec::new();
        let headers = self.meta.headers;
        if let Some(stage) = self.set_agent_vis(&ids, true, headers, false, ln)? {
            stages.push(stage);
        }
        if let Some(stage) = self.set_agent_highlight(&flags.start, true) {
            stages.push(stage);
        }
        let formatted = self.pattern.apply(label);
        let (from, to) = self.expand_grouped_connection(&a, &b);
        stages.push(Stage::Connect {
            agents: [from, to],
            label: formatted,
            options,
            ln,
        });
        if let Some(stage) = self.set_agent_highlight(&flags.stop, false) {
            stages.push(stage);
        }
        if let Some(stage) = self.set_agent_vis(&flags.end, false, CapMode::Cross, false, ln)? {
            stages.push(stage);
        }
        self.add_parallel(stages);
        Ok(())
    }

    fn handle_connect_delay_begin(
        &mut self,
        agent: &AgentRef,
        tag: &str,
        options: ConnectOptions,
        ln: usize,
    ) -> Result<()> {
        if self.delayed.contains_key(tag) {
            return Err(Error::at(
                format!("Duplicate delayed connection '{tag}'"),
                ln,
            ));
        }
        let id = self.resolve(&agent.name);
        self.validate_refs(std::slice::from_ref(&id), ln)?;
        self.add_agent(&id);
        let flags = self.collect_flags(&[agent], ln)?;

        let mut stages: Vec<Stage> = Vec::new();
        let headers = self.meta.headers;
        if let Some(stage) =
            self.set_agent_vis(std::slice::from_ref(&id), true, headers, false, ln)?
        {
            stages.push(stage);
        }
        if let Some(stage) = self.set_agent_highlight(&flags.start, true) {
            stages.push(stage);
        }
        stages.push(Stage::ConnectDelayBegin {
            agent: id.clone(),
            tag: tag.to_string(),
            options,
            ln,
        });
        self.delayed
            .insert(tag.to_string(), DelayedRef { agent: id, ln });
        self.add_parallel(stages);
        Ok(())
    }

    fn handle_connect_delay_end(
        &mut self,
        agent: &AgentRef,
        tag: &str,
        label: &str,
        options: ConnectOptions,
        ln: usize,
    ) -> Result<()> {
        let Some(origin) = self.delayed.remove(tag) else {
            return Err(Error::at(
                format!("Unknown delayed connection '{tag}'"),
                ln,
            ));
        };
        let id = self.resolve(&agent.name);
        self.validate_refs(std::slice::from_ref(&id), ln)?;
        self.add_agent(&id);
        let flags = self.collect_flags(&[agent], ln)?;

        let mut stages: Vec<Stage> = Vec::new();
        let headers = self.meta.headers;
        if let Some(stage) =
            self.set_agent_vis(std::slice::from_ref(&id), true, headers, false, ln)?
        {
            stages.push(stage);
        }
        if let Some(stage) = self.set_agent_highlight(&flags.start, true) {
            stages.push(stage);
        }
        let formatted = self.pattern.apply(label);
        stages.push(Stage::ConnectDelayEnd {
            from: origin.agent,
            to: id,
            tag: tag.to_string(),
            label: formatted,
            options,
            ln,
        });
        if let Some(stage) = self.set_agent_highlight(&flags.stop, false) {
            stages.push(stage);
        }
        if let Some(stage) = self.set_agent_vis(&flags.end, false, CapMode::Cross, false, ln)? {
            stages.push(stage);
        }
        self.add_parallel(stages);
        Ok(())
    }

    fn handle_note(
        &mut self,
        position: NotePosition,
        mode: crate::command::NoteMode,
        refs: &[AgentRef],
        label: &str,
        ln: usize,
    ) -> Result<()> {
        let mut ids: Vec<String> = Vec::new();
        for r in refs {
            let id = self.resolve(&r.name);
            if !ids.iter().any(|x| x == &id) {
                ids.push(id);
            }
        }
        self.validate_refs(&ids, ln)?;
        if position == NotePosition::Between && ids.len() < 2 {
            return Err(Error::at("Note between requires at least two agents", ln));
        }
        if ids.is_empty() {
            return Err(Error::at("Note requires an agent", ln));
        }
        for id in &ids {
            self.add_agent(id);
        }
        let mut stages: Vec<Stage> = Vec::new();
        let headers = self.meta.headers;
        if let Some(stage) = self.set_agent_vis(&ids, true, headers, false, ln)? {
            stages.push(stage);
        }
        let expanded = self.expand_grouped_agents(&ids);
        stages.push(Stage::Note {
            position,
            mode,
            agents: expanded,
            label: label.to_string(),
            ln,
        });
        self.add_parallel(stages);
        Ok(())
    }

    // --- nesting --------------------------------------------------------

    fn handle_block_begin(
        &mut self,
        kind: BlockKind,
        tag: &str,
        label: &str,
        ln: usize,
    ) -> Result<()> {
        self.block_counter += 1;
        let left = format!("__BLOCK{}[", self.block_counter);
        let right = format!("__BLOCK{}]", self.block_counter);
        self.state_mut(&left).locked = true;
        self.state_mut(&right).locked = true;
        let header = Stage::BlockBegin {
            kind,
            tag: tag.to_string(),
            label: label.to_string(),
            left: left.clone(),
            right: right.clone(),
            ln,
        };
        self.blocks.push(NestFrame {
            kind,
            left,
            right,
            current: Section {
                header,
                stages: Vec::new(),
            },
            done: Vec::new(),
            used: Vec::new(),
            has_content: false,
            group: None,
            ln,
        });
        Ok(())
    }

    fn handle_block_split(&mut self, tag: &str, label: &str, ln: usize) -> Result<()> {
        let Some(frame) = self.blocks.last_mut() else {
            return Err(Error::at("Invalid block nesting", ln));
        };
        if frame.kind != BlockKind::If {
            return Err(Error::at("Invalid split in this block", ln));
        }
        let header = Stage::BlockSplit {
            tag: tag.to_string(),
            label: label.to_string(),
            left: frame.left.clone(),
            right: frame.right.clone(),
            ln,
        };
        let next = Section {
            header,
            stages: Vec::new(),
        };
        let finished = mem::replace(&mut frame.current, next);
        frame.done.push(finished);
        Ok(())
    }

    fn handle_block_end(&mut self, ln: usize) -> Result<()> {
        let Some(frame) = self.blocks.pop() else {
            return Err(Error::at("Invalid block nesting", ln));
        };
        if let Some(name) = &frame.group {
            return Err(Error::at(
                format!("Expected 'end {name}' to close group"),
                ln,
            ));
        }
        self.finish_frame(frame, ln)
    }

    fn handle_group_begin(
        &mut self,
        name: &str,
        refs: &[AgentRef],
        label: &str,
        ln: usize,
    ) -> Result<()> {
        if self.states.contains_key(name)
            || self.order_index(name).is_some()
            || self.aliases.contains_key(name)
        {
            return Err(Error::at(format!("Duplicate agent name '{name}'"), ln));
        }
        let mut members: Vec<String> = Vec::new();
        for r in refs {
            let id = self.resolve(&r.name);
            if !members.iter().any(|m| m == &id) {
                members.push(id);
            }
        }
        self.validate_refs(&members, ln)?;
        if members.is_empty() {
            return Err(Error::at("Group must contain at least one agent", ln));
        }
        for m in &members {
            let state = self.state(m);
            if state.locked {
                return Err(Error::at(format!("Cannot group agent '{m}'"), ln));
            }
            if state.group.is_some() {
                return Err(Error::at(format!("'{m}' is already in a group"), ln));
            }
        }
        for m in &members {
            self.add_agent(m);
        }
        for m in &members {
            self.state_mut(m).group = Some(name.to_string());
        }

        // every agent strictly between the outermost members is covered
        // until the group closes
        let indices: Vec<usize> = members.iter().filter_map(|m| self.order_index(m)).collect();
        let mut covered: Vec<String> = Vec::new();
        if let (Some(&lo), Some(&hi)) = (indices.iter().min(), indices.iter().max()) {
            for idx in (lo + 1)..hi {
                let id = self.agents[idx].id.clone();
                if !members.iter().any(|m| m == &id) {
                    self.state_mut(&id).covered = true;
                    covered.push(id);
                }
            }
        }

        self.state_mut(name).blocked = true;
        let (left, right) = Generator::group_boundaries(name);
        self.state_mut(&left).locked = true;
        self.state_mut(&right).locked = true;
        let header = Stage::BlockBegin {
            kind: BlockKind::Group,
            tag: String::new(),
            label: label.to_string(),
            left: left.clone(),
            right: right.clone(),
            ln,
        };
        self.groups.insert(
            name.to_string(),
            GroupInfo {
                members: members.clone(),
                covered,
            },
        );
        self.blocks.push(NestFrame {
            kind: BlockKind::Group,
            left,
            right,
            current: Section {
                header,
                stages: Vec::new(),
            },
            done: Vec::new(),
            used: members,
            has_content: false,
            group: Some(name.to_string()),
            ln,
        });
        Ok(())
    }

    fn handle_group_end(&mut self, name: &str, ln: usize) -> Result<()> {
        let closes_top = self
            .blocks
            .last()
            .is_some_and(|f| f.group.as_deref() == Some(name));
        if !closes_top {
            return Err(Error::at(format!("Cannot end group '{name}' here"), ln));
        }
        let frame = self
            .blocks
            .pop()
            .ok_or_else(|| Error::internal("group frame missing"))?;
        if let Some(info) = self.groups.remove(name) {
            for m in &info.members {
                self.state_mut(m).group = None;
            }
            for c in &info.covered {
                self.state_mut(c).covered = false;
            }
        }
        self.finish_frame(frame, ln)
    }

    /// Close a nesting frame: optimise its sections, splice them into the
    /// parent, and insert the boundary agents into the global order bounded
    /// by the agents the frame actually used.
    fn finish_frame(&mut self, frame: NestFrame, ln: usize) -> Result<()> {
        if !frame.has_content {
            return Err(Error::at("Empty block", ln));
        }
        let NestFrame {
            left,
            right,
            current,
            mut done,
            used,
            ..
        } = frame;
        done.push(current);

        let mut spliced: Vec<Stage> = Vec::new();
        for mut section in done {
            optimise_stages(&mut section.stages);
            spliced.push(section.header);
            spliced.append(&mut section.stages);
        }
        spliced.push(Stage::BlockEnd {
            left: left.clone(),
            right: right.clone(),
        });

        for frame in &mut self.blocks {
            frame.has_content = true;
        }
        if let Some(parent) = self.blocks.last_mut() {
            parent.current.stages.append(&mut spliced);
        } else {
            self.root.append(&mut spliced);
        }

        self.add_bounds(&left, &right, &used);
        self.record_boundary(&left);
        self.record_boundary(&right);
        for id in &used {
            self.record_use(id);
        }
        Ok(())
    }

    fn add_bounds(&mut self, left: &str, right: &str, used: &[String]) {
        let end = self.order_index(RIGHT_EDGE).unwrap_or(self.agents.len());
        let indices: Vec<usize> = used.iter().filter_map(|id| self.order_index(id)).collect();
        let (mut lo, mut hi) = match (indices.iter().min(), indices.iter().max()) {
            (Some(&lo), Some(&hi)) => (lo, hi + 1),
            _ => (end, end),
        };
        lo = lo.max(1);
        hi = hi.clamp(lo, end);
        self.agents.insert(hi, Agent::anchored(right));
        self.agents.insert(lo, Agent::new(left));
    }

    // --- finalisation ---------------------------------------------------

    fn finalise(&mut self) -> Result<Sequence> {
        if let Some(frame) = self.blocks.last() {
            return Err(Error::at("Unterminated section", frame.ln));
        }
        if let Some((tag, delayed)) = self.delayed.iter().min_by_key(|(_, d)| d.ln) {
            return Err(Error::at(
                format!("Unterminated delayed connection '{tag}'"),
                delayed.ln,
            ));
        }
        let visible: Vec<String> = self
            .agents
            .iter()
            .filter(|a| {
                let state = self.state(&a.id);
                state.visible && !state.locked
            })
            .map(|a| a.id.clone())
            .collect();
        let mode = self.meta.terminators;
        if let Some(stage) = self.set_agent_vis(&visible, false, mode, false, 0)? {
            self.add_stage(stage);
        }
        optimise_stages(&mut self.root);
        debug!(
            agents = self.agents.len(),
            stages = self.root.len(),
            "sequence complete"
        );
        Ok(Sequence {
            meta: mem::take(&mut self.meta),
            agents: mem::take(&mut self.agents),
            stages: mem::take(&mut self.root),
        })
    }
}

// --- stage merging ------------------------------------------------------

#[derive(Debug, PartialEq)]
enum MergeKey {
    Begin(CapMode),
    End(CapMode),
    Highlight(bool),
}

fn merge_key(stage: &Stage) -> Option<MergeKey> {
    match stage {
        Stage::AgentBegin { mode, .. } => Some(MergeKey::Begin(*mode)),
        Stage::AgentEnd { mode, .. } => Some(MergeKey::End(*mode)),
        Stage::AgentHighlight { highlighted, .. } => Some(MergeKey::Highlight(*highlighted)),
        _ => None,
    }
}

/// Stage types allowed to sit between two merge candidates of the given
/// type without blocking the merge
fn merge_siblings(tag: StageTag) -> Option<&'static [StageTag]> {
    match tag {
        StageTag::AgentBegin | StageTag::AgentEnd => Some(&[StageTag::AgentHighlight]),
        StageTag::AgentHighlight => Some(&[StageTag::AgentBegin, StageTag::AgentEnd]),
        _ => None,
    }
}

fn merge_compatible(target: &Stage, other: &Stage) -> bool {
    match (merge_key(target), merge_key(other)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Union `other`'s agents into `target`, preserving first-seen order
fn merge_into(target: &mut Stage, other: &Stage) {
    let incoming: Vec<String> = other
        .touched_agents()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let agents = match target {
        Stage::AgentBegin { agents, .. }
        | Stage::AgentEnd { agents, .. }
        | Stage::AgentHighlight { agents, .. } => agents,
        _ => return,
    };
    for id in incoming {
        if !agents.iter().any(|a| a == &id) {
            agents.push(id);
        }
    }
}

/// Merge compatible stages within one parallel group
fn parallel_mergers(stages: &mut Vec<Stage>) {
    let mut i = 1;
    while i < stages.len() {
        let mut merged = false;
        for j in 0..i {
            if merge_compatible(&stages[j], &stages[i]) {
                let src = stages.remove(i);
                merge_into(&mut stages[j], &src);
                merged = true;
                break;
            }
        }
        if !merged {
            i += 1;
        }
    }
}

/// Types that may merge across this position: every type present must be
/// the candidate itself or one of its declared siblings
fn viable_mergers(stages: &[Stage]) -> HashSet<StageTag> {
    let tags: Vec<StageTag> = stages.iter().map(Stage::tag).collect();
    let mut out = HashSet::new();
    for &tag in &tags {
        let Some(siblings) = merge_siblings(tag) else {
            continue;
        };
        if tags.iter().all(|t| *t == tag || siblings.contains(t)) {
            out.insert(tag);
        }
    }
    out
}

/// Run the two merge passes over a closed frame's stage list
fn optimise_stages(stages: &mut Vec<Stage>) {
    let mut last: Option<(usize, HashSet<StageTag>)> = None;
    let mut i = 0;
    while i < stages.len() {
        let position = stages.remove(i);
        let mut subs = match position {
            Stage::Parallel { stages } => stages,
            single => vec![single],
        };
        parallel_mergers(&mut subs);
        let viable = viable_mergers(&subs);
        if let Some((last_idx, last_viable)) = &last {
            let li = *last_idx;
            subs.retain(|stage| {
                let tag = stage.tag();
                if !viable.contains(&tag) || !last_viable.contains(&tag) {
                    return true;
                }
                match &mut stages[li] {
                    Stage::Parallel { stages: prev } => {
                        for p in prev.iter_mut() {
                            if merge_compatible(p, stage) {
                                merge_into(p, stage);
                                return false;
                            }
                        }
                    }
                    prev => {
                        if merge_compatible(prev, stage) {
                            merge_into(prev, stage);
                            return false;
                        }
                    }
                }
                true
            });
        }
        if subs.is_empty() {
            continue;
        }
        let viable_after = viable_mergers(&subs);
        let rebuilt = if subs.len() == 1 {
            subs.remove(0)
        } else {
            Stage::Parallel { stages: subs }
        };
        stages.insert(i, rebuilt);
        last = Some((i, viable_after));
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{AgentFlags, NoteMode};
    use pretty_assertions::assert_eq;

    fn connect(a: &str, b: &str, ln: usize) -> Command {
        Command::Connect {
            agents: [AgentRef::new(a), AgentRef::new(b)],
            label: String::new(),
            options: ConnectOptions::default(),
            ln,
        }
    }

    fn generate(commands: &[Command]) -> Result<Sequence> {
        Generator::new().generate(commands)
    }

    fn agent_ids(seq: &Sequence) -> Vec<&str> {
        seq.agents.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn test_single_connection_becomes_merged_parallel() {
        let seq = generate(&[connect("A", "B", 1)]).unwrap();
        assert_eq!(agent_ids(&seq), vec!["[", "A", "B", "]"]);
        assert_eq!(seq.stages.len(), 2);
        match &seq.stages[0] {
            Stage::Parallel { stages } => {
                assert_eq!(stages.len(), 2);
                assert_eq!(
                    stages[0],
                    Stage::AgentBegin {
                        agents: vec!["A".to_string(), "B".to_string()],
                        mode: CapMode::Box,
                    }
                );
                assert!(matches!(&stages[1], Stage::Connect { .. }));
            }
            other => panic!("Expected Parallel, got {other:?}"),
        }
        assert_eq!(
            seq.stages[1],
            Stage::AgentEnd {
                agents: vec!["A".to_string(), "B".to_string()],
                mode: CapMode::None,
            }
        );
    }

    #[test]
    fn test_generation_is_idempotent() {
        let commands = [
            Command::Begin {
                agents: vec![AgentRef::new("A"), AgentRef::new("B")],
                ln: 1,
            },
            connect("A", "B", 2),
            connect("B", "A", 3),
        ];
        let mut generator = Generator::new();
        let first = generator.generate(&commands).unwrap();
        let second = generator.generate(&commands).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_consecutive_begins_merge_in_first_seen_order() {
        let seq = generate(&[
            Command::Begin {
                agents: vec![AgentRef::new("A")],
                ln: 1,
            },
            Command::Begin {
                agents: vec![AgentRef::new("B"), AgentRef::new("C")],
                ln: 2,
            },
        ])
        .unwrap();
        assert_eq!(
            seq.stages[0],
            Stage::AgentBegin {
                agents: vec!["A".to_string(), "B".to_string(), "C".to_string()],
                mode: CapMode::Box,
            }
        );
    }

    #[test]
    fn test_interleaved_stage_blocks_sequential_merge() {
        let seq = generate(&[
            Command::Begin {
                agents: vec![AgentRef::new("A"), AgentRef::new("B")],
                ln: 1,
            },
            connect("A", "B", 2),
            Command::Begin {
                agents: vec![AgentRef::new("C")],
                ln: 3,
            },
        ])
        .unwrap();
        // the connect position is not a sibling, so the begins stay apart
        let begins = seq
            .stages
            .iter()
            .flat_map(|s| match s {
                Stage::Parallel { stages } => stages.clone(),
                other => vec![other.clone()],
            })
            .filter(|s| s.tag() == StageTag::AgentBegin)
            .count();
        assert_eq!(begins, 2);
    }

    #[test]
    fn test_begin_of_visible_agent_is_noop() {
        let seq = generate(&[
            connect("A", "B", 1),
            Command::Begin {
                agents: vec![AgentRef::new("A")],
                ln: 2,
            },
        ])
        .unwrap();
        // no second begin stage for A
        assert_eq!(seq.stages.len(), 2);
    }

    #[test]
    fn test_realias_is_fatal() {
        let err = generate(&[
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
        assert_eq!(
            err.to_string(),
            "Cannot alias X; it is already an alias at line 2"
        );
    }

    #[test]
    fn test_alias_onto_used_name_is_fatal() {
        let err = generate(&[
            connect("B", "C", 1),
            Command::Define {
                agents: vec![AgentRef::with_alias("A", "B")],
                ln: 2,
            },
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot alias B; it is already in use at line 2"
        );
    }

    #[test]
    fn test_alias_resolves_in_connects() {
        let seq = generate(&[
            Command::Define {
                agents: vec![AgentRef::with_alias("Long Name", "L")],
                ln: 1,
            },
            connect("L", "B", 2),
        ])
        .unwrap();
        assert_eq!(agent_ids(&seq), vec!["[", "Long Name", "B", "]"]);
    }

    #[test]
    fn test_conflicting_visibility_flags() {
        let mut begin_end = AgentFlags::default();
        begin_end.begin = true;
        let mut end = AgentFlags::default();
        end.end = true;
        let err = generate(&[Command::Connect {
            agents: [
                AgentRef::with_flags("A", begin_end),
                AgentRef::with_flags("A", end),
            ],
            label: String::new(),
            options: ConnectOptions::default(),
            ln: 4,
        }])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot set agent visibility multiple times at line 4"
        );
    }

    #[test]
    fn test_highlight_flags_expand_around_connect() {
        let mut start = AgentFlags::default();
        start.start_highlight = true;
        let mut stop = AgentFlags::default();
        stop.stop_highlight = true;
        let seq = generate(&[
            Command::Begin {
                agents: vec![AgentRef::new("A"), AgentRef::new("B")],
                ln: 1,
            },
            Command::Connect {
                agents: [
                    AgentRef::with_flags("A", start),
                    AgentRef::with_flags("A", stop),
                ],
                label: String::new(),
                options: ConnectOptions::default(),
                ln: 2,
            },
        ]);
        let err = seq.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot set agent highlighting multiple times at line 2"
        );
    }

    #[test]
    fn test_empty_block_is_fatal() {
        let err = generate(&[
            Command::BlockBegin {
                kind: BlockKind::If,
                tag: "if".to_string(),
                label: "x".to_string(),
                ln: 1,
            },
            Command::BlockEnd { ln: 2 },
        ])
        .unwrap_err();
        assert_eq!(err.to_string(), "Empty block at line 2");
    }

    #[test]
    fn test_unterminated_section_is_fatal() {
        let err = generate(&[
            Command::BlockBegin {
                kind: BlockKind::Repeat,
                tag: "repeat".to_string(),
                label: String::new(),
                ln: 3,
            },
            connect("A", "B", 4),
        ])
        .unwrap_err();
        assert_eq!(err.to_string(), "Unterminated section at line 3");
    }

    #[test]
    fn test_block_end_without_begin_is_fatal() {
        let err = generate(&[Command::BlockEnd { ln: 9 }]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid block nesting at line 9");
    }

    #[test]
    fn test_if_else_sections_splice_into_one_list() {
        let seq = generate(&[
            Command::BlockBegin {
                kind: BlockKind::If,
                tag: "if".to_string(),
                label: "ready".to_string(),
                ln: 1,
            },
            connect("A", "B", 2),
            Command::BlockSplit {
                tag: "else if".to_string(),
                label: "retry".to_string(),
                ln: 3,
            },
            connect("A", "B", 4),
            Command::BlockSplit {
                tag: "else".to_string(),
                label: String::new(),
                ln: 5,
            },
            connect("B", "A", 6),
            Command::BlockEnd { ln: 7 },
        ])
        .unwrap();
        let tags: Vec<StageTag> = seq.stages.iter().map(Stage::tag).collect();
        assert_eq!(
            tags,
            vec![
                StageTag::BlockBegin,
                StageTag::Parallel,
                StageTag::BlockSplit,
                StageTag::Connect,
                StageTag::BlockSplit,
                StageTag::Connect,
                StageTag::BlockEnd,
                StageTag::AgentEnd,
            ]
        );
        match &seq.stages[0] {
            Stage::BlockBegin { label, left, right, .. } => {
                assert_eq!(label, "ready");
                assert_eq!(left, "__BLOCK1[");
                assert_eq!(right, "__BLOCK1]");
            }
            other => panic!("Expected BlockBegin, got {other:?}"),
        }
        // boundary agents hug the agents used inside the block
        assert_eq!(
            agent_ids(&seq),
            vec!["[", "__BLOCK1[", "A", "B", "__BLOCK1]", "]"]
        );
        assert!(seq.agent("__BLOCK1]").unwrap().anchor_right);
        assert!(!seq.agent("__BLOCK1[").unwrap().anchor_right);
    }

    #[test]
    fn test_split_outside_if_block_is_fatal() {
        let err = generate(&[
            Command::BlockBegin {
                kind: BlockKind::Repeat,
                tag: "repeat".to_string(),
                label: String::new(),
                ln: 1,
            },
            Command::BlockSplit {
                tag: "else".to_string(),
                label: String::new(),
                ln: 2,
            },
        ])
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid split in this block at line 2");
    }

    #[test]
    fn test_covered_agent_is_unreachable() {
        // B sits between the group members A and C, so it is covered
        let err = generate(&[
            Command::Begin {
                agents: vec![AgentRef::new("A"), AgentRef::new("B"), AgentRef::new("C")],
                ln: 1,
            },
            Command::GroupBegin {
                name: "G".to_string(),
                agents: vec![AgentRef::new("A"), AgentRef::new("C")],
                label: "grouped".to_string(),
                ln: 2,
            },
            connect("B", "A", 3),
        ])
        .unwrap_err();
        assert_eq!(err.to_string(), "B is hidden behind group at line 3");
    }

    #[test]
    fn test_agent_outside_group_bounds_is_reachable() {
        let seq = generate(&[
            Command::Begin {
                agents: vec![AgentRef::new("A"), AgentRef::new("B"), AgentRef::new("C")],
                ln: 1,
            },
            Command::GroupBegin {
                name: "G".to_string(),
                agents: vec![AgentRef::new("A"), AgentRef::new("B")],
                label: String::new(),
                ln: 2,
            },
            connect("A", "C", 3),
            Command::End {
                agents: vec![AgentRef::new("G")],
                ln: 4,
            },
        ])
        .unwrap();
        // the connection from the grouped agent leaves through the
        // boundary facing C
        let connect_stage = seq
            .stages
            .iter()
            .flat_map(|s| match s {
                Stage::Parallel { stages } => stages.clone(),
                other => vec![other.clone()],
            })
            .find(|s| s.tag() == StageTag::Connect)
            .unwrap();
        match connect_stage {
            Stage::Connect { agents, .. } => {
                assert_eq!(agents, ["G]".to_string(), "C".to_string()]);
            }
            other => panic!("Expected Connect, got {other:?}"),
        }
    }

    #[test]
    fn test_connection_within_group_spans_boundaries() {
        let seq = generate(&[
            Command::Begin {
                agents: vec![AgentRef::new("A"), AgentRef::new("B")],
                ln: 1,
            },
            Command::GroupBegin {
                name: "G".to_string(),
                agents: vec![AgentRef::new("A"), AgentRef::new("B")],
                label: String::new(),
                ln: 2,
            },
            connect("A", "B", 3),
            Command::End {
                agents: vec![AgentRef::new("G")],
                ln: 4,
            },
        ])
        .unwrap();
        let connect_stage = seq
            .stages
            .iter()
            .find(|s| s.tag() == StageTag::Connect)
            .unwrap();
        match connect_stage {
            Stage::Connect { agents, .. } => {
                assert_eq!(agents, &["G[".to_string(), "G]".to_string()]);
            }
            other => panic!("Expected Connect, got {other:?}"),
        }
    }

    #[test]
    fn test_group_member_cannot_join_second_group() {
        let err = generate(&[
            Command::Begin {
                agents: vec![AgentRef::new("A"), AgentRef::new("B")],
                ln: 1,
            },
            Command::GroupBegin {
                name: "G".to_string(),
                agents: vec![AgentRef::new("A")],
                label: String::new(),
                ln: 2,
            },
            Command::GroupBegin {
                name: "H".to_string(),
                agents: vec![AgentRef::new("A")],
                label: String::new(),
                ln: 3,
            },
        ])
        .unwrap_err();
        assert_eq!(err.to_string(), "'A' is already in a group at line 3");
    }

    #[test]
    fn test_label_pattern_numbers_connect_labels() {
        let seq = generate(&[
            Command::LabelPattern {
                pattern: "[<inc>] <label>".to_string(),
                ln: 1,
            },
            connect("A", "B", 2),
            connect("B", "A", 3),
        ])
        .unwrap();
        let labels: Vec<String> = seq
            .stages
            .iter()
            .flat_map(|s| match s {
                Stage::Parallel { stages } => stages.clone(),
                other => vec![other.clone()],
            })
            .filter_map(|s| match s {
                Stage::Connect { label, .. } => Some(label),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec!["[1] ".to_string(), "[2] ".to_string()]);
    }

    #[test]
    fn test_unknown_marker_is_fatal() {
        let err = generate(&[Command::Async {
            target: "never".to_string(),
            ln: 5,
        }])
        .unwrap_err();
        assert_eq!(err.to_string(), "Unknown marker 'never' at line 5");
    }

    #[test]
    fn test_mark_then_async_round_trip() {
        let seq = generate(&[
            connect("A", "B", 1),
            Command::Mark {
                name: "sync".to_string(),
                ln: 2,
            },
            connect("A", "B", 3),
            Command::Async {
                target: "sync".to_string(),
                ln: 4,
            },
            connect("B", "A", 5),
        ])
        .unwrap();
        let tags: Vec<StageTag> = seq.stages.iter().map(Stage::tag).collect();
        assert!(tags.contains(&StageTag::Mark));
        assert!(tags.contains(&StageTag::Async));
    }

    #[test]
    fn test_unknown_divider_type_is_fatal() {
        let err = generate(&[Command::Divider {
            mode: "zigzag".to_string(),
            height: 6.0,
            label: String::new(),
            ln: 2,
        }])
        .unwrap_err();
        assert_eq!(err.to_string(), "Unknown divider type 'zigzag' at line 2");
    }

    #[test]
    fn test_unknown_terminator_is_fatal() {
        let err = generate(&[Command::SetTerminators {
            mode: "squiggle".to_string(),
            ln: 1,
        }])
        .unwrap_err();
        assert_eq!(err.to_string(), "Unknown termination 'squiggle' at line 1");
    }

    #[test]
    fn test_delayed_connection_pairs_by_tag() {
        let seq = generate(&[
            Command::Begin {
                agents: vec![AgentRef::new("A"), AgentRef::new("B")],
                ln: 1,
            },
            Command::ConnectDelayBegin {
                agent: AgentRef::new("A"),
                tag: "x".to_string(),
                options: ConnectOptions::default(),
                ln: 2,
            },
            connect("B", "B", 3),
            Command::ConnectDelayEnd {
                agent: AgentRef::new("B"),
                tag: "x".to_string(),
                label: "late".to_string(),
                options: ConnectOptions::default(),
                ln: 4,
            },
        ])
        .unwrap();
        let end = seq
            .stages
            .iter()
            .find(|s| s.tag() == StageTag::ConnectDelayEnd)
            .unwrap();
        match end {
            Stage::ConnectDelayEnd { from, to, label, .. } => {
                assert_eq!(from, "A");
                assert_eq!(to, "B");
                assert_eq!(label, "late");
            }
            other => panic!("Expected ConnectDelayEnd, got {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_delayed_connection_is_fatal() {
        let err = generate(&[
            connect("A", "B", 1),
            Command::ConnectDelayBegin {
                agent: AgentRef::new("A"),
                tag: "x".to_string(),
                options: ConnectOptions::default(),
                ln: 2,
            },
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unterminated delayed connection 'x' at line 2"
        );
    }

    #[test]
    fn test_note_between_requires_two_agents() {
        let err = generate(&[Command::Note {
            position: NotePosition::Between,
            mode: NoteMode::Note,
            agents: vec![AgentRef::new("A")],
            label: "hm".to_string(),
            ln: 3,
        }])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Note between requires at least two agents at line 3"
        );
    }

    #[test]
    fn test_note_begins_its_agents() {
        let seq = generate(&[Command::Note {
            position: NotePosition::Over,
            mode: NoteMode::Note,
            agents: vec![AgentRef::new("A")],
            label: "thinking".to_string(),
            ln: 1,
        }])
        .unwrap();
        match &seq.stages[0] {
            Stage::Parallel { stages } => {
                assert_eq!(stages[0].tag(), StageTag::AgentBegin);
                assert_eq!(stages[1].tag(), StageTag::Note);
            }
            other => panic!("Expected Parallel, got {other:?}"),
        }
    }

    #[test]
    fn test_edge_agents_accept_connections() {
        let seq = generate(&[connect("[", "A", 1)]).unwrap();
        match &seq.stages[0] {
            Stage::Parallel { stages } => {
                // only A begins; the edge is locked
                assert_eq!(
                    stages[0],
                    Stage::AgentBegin {
                        agents: vec!["A".to_string()],
                        mode: CapMode::Box,
                    }
                );
            }
            other => panic!("Expected Parallel, got {other:?}"),
        }
    }
}
