//! Session reducer: folds hook events into the dashboard view model.
//!
//! The state is the whole tuple of running tools, bounded tool history,
//! agent list, to-do list, modified-files tally, session info and context
//! health. Events are
//! applied one at a time in receipt order through [`reduce`] /
//! [`SessionState::apply`]; nothing here does IO, and nothing here fails.
//! A record that cannot be correlated degrades to a default (synthesized
//! id, empty target, event timestamp as start) instead of being rejected.
//!
//! Sub-agent completion is matched FIFO: `SubagentStop` carries no
//! correlation id, so it completes the oldest agent still running. That is
//! exact for sequential sub-agents and mis-attributes stops when concurrent
//! agents finish out of spawn order.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::{CostEstimate, CostTracker};
use crate::estimator::{ContextEstimator, estimate};
use crate::health::ContextHealth;
use crate::types::{
    AgentEntry, AgentStatus, HookEventKind, HudEvent, ModifiedFile, SessionInfo, TodoItem,
    ToolEntry, ToolKind, ToolStatus, non_empty,
};

/// Tool history keeps at most this many entries.
pub const TOOL_HISTORY_CAP: usize = 30;

/// Agent list keeps at most this many entries.
pub const AGENT_CAP: usize = 11;

/// Number of tool names reported in [`SessionSnapshot::top_tools`].
pub const TOP_TOOLS: usize = 4;

const COMMAND_TARGET_CHARS: usize = 40;
const PATTERN_TARGET_CHARS: usize = 30;

/// Apply one event to `state`, returning the next state.
#[must_use]
pub fn reduce(mut state: SessionState, event: &HudEvent, now: DateTime<Utc>) -> SessionState {
    state.apply(event, now);
    state
}

/// Aggregate state for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    running: HashMap<String, ToolEntry>,
    tools: VecDeque<ToolEntry>,
    agents: VecDeque<AgentEntry>,
    todos: Vec<TodoItem>,
    /// Keyed by file path; sorted so snapshots are stable.
    modified: BTreeMap<String, ModifiedFile>,
    session: SessionInfo,
    context: ContextHealth,
    estimator: ContextEstimator,
    cost: CostTracker,
}

impl SessionState {
    pub fn new(initial_transcript_path: Option<&str>, now: DateTime<Utc>) -> Self {
        let estimator = ContextEstimator::new(now);
        Self {
            running: HashMap::new(),
            tools: VecDeque::with_capacity(TOOL_HISTORY_CAP),
            agents: VecDeque::with_capacity(AGENT_CAP),
            todos: Vec::new(),
            modified: BTreeMap::new(),
            session: SessionInfo::with_transcript_path(initial_transcript_path),
            context: estimator.health(),
            estimator,
            cost: CostTracker::new(),
        }
    }

    /// Apply one event in place.
    pub fn apply(&mut self, event: &HudEvent, now: DateTime<Utc>) {
        self.session.merge_presence(event);

        match &event.event {
            HookEventKind::PreToolUse => self.on_pre_tool_use(event, now),
            HookEventKind::PostToolUse => self.on_post_tool_use(event, now),
            HookEventKind::UserPromptSubmit => self.on_prompt_submit(event, now),
            HookEventKind::Stop => self.session.is_idle = true,
            HookEventKind::SubagentStop => self.on_subagent_stop(now),
            HookEventKind::Other(_) => {}
        }

        match event.tool_kind() {
            Some(ToolKind::TodoWrite) => self.on_todo_write(event),
            Some(ToolKind::Task) if event.event == HookEventKind::PreToolUse => {
                self.on_task_spawn(event, now);
            }
            Some(
                ToolKind::Task
                | ToolKind::Edit
                | ToolKind::Write
                | ToolKind::MultiEdit
                | ToolKind::Other,
            )
            | None => {}
        }
    }

    fn on_pre_tool_use(&mut self, event: &HudEvent, now: DateTime<Utc>) {
        let (Some(tool), Some(id)) = (event.tool_name(), event.invocation_id()) else {
            return;
        };

        let entry = ToolEntry {
            id: id.to_owned(),
            tool: tool.to_owned(),
            target: tool_target(event.input_payload()),
            status: ToolStatus::Running,
            ts: event.ts,
            started_at: now,
            ended_at: None,
            duration_ms: None,
        };

        self.running.insert(entry.id.clone(), entry.clone());
        push_bounded(&mut self.tools, entry, TOOL_HISTORY_CAP);
        self.session.is_idle = false;
    }

    fn on_post_tool_use(&mut self, event: &HudEvent, now: DateTime<Utc>) {
        let Some(tool) = event.tool_name() else {
            return;
        };

        let id = event
            .invocation_id()
            .map_or_else(|| event.synthesized_id(tool), str::to_owned);

        // No running entry means the Pre record was missed (e.g. the stream
        // reconnected mid-tool): start falls back to the event timestamp.
        let existing = self.running.remove(&id);
        let (started_at, target) = match existing {
            Some(entry) => (entry.started_at, entry.target),
            None => (event.timestamp(), String::new()),
        };

        let response = event.response_payload();
        let failed = response
            .and_then(serde_json::Value::as_object)
            .is_some_and(|obj| obj.contains_key("error"));
        let reported_ms = response
            .and_then(|r| r.get("duration_ms"))
            .and_then(serde_json::Value::as_f64)
            .filter(|ms| *ms > 0.0)
            .map(|ms| {
                #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let ms = ms.round() as u64;
                ms
            });
        let elapsed_ms = u64::try_from((now - started_at).num_milliseconds()).unwrap_or(0);

        let entry = ToolEntry {
            id,
            tool: tool.to_owned(),
            target,
            status: if failed {
                ToolStatus::Error
            } else {
                ToolStatus::Complete
            },
            ts: event.ts,
            started_at,
            ended_at: Some(now),
            duration_ms: Some(reported_ms.unwrap_or(elapsed_ms)),
        };

        match self.tools.iter_mut().find(|t| t.id == entry.id) {
            Some(slot) => *slot = entry,
            None => push_bounded(&mut self.tools, entry, TOOL_HISTORY_CAP),
        }

        if !failed {
            self.record_edit(event);
        }

        self.estimator.process(event, now);
        self.cost.process(event);
        self.context = self.estimator.health();
    }

    /// The prompt text joins the conversation, so it counts as message
    /// tokens in the live estimate as well as input for the cost.
    fn on_prompt_submit(&mut self, event: &HudEvent, now: DateTime<Utc>) {
        self.session.is_idle = false;
        self.cost.process(event);
        if let Some(prompt) = non_empty(event.prompt.as_deref()) {
            self.estimator.add_message_tokens(estimate(prompt), now);
            self.context = self.estimator.health();
        }
    }

    /// Tally line changes of a successful `Edit`, `Write` or `MultiEdit`
    /// against its `file_path`.
    fn record_edit(&mut self, event: &HudEvent) {
        let Some(input) = event.input_payload() else {
            return;
        };
        let (additions, deletions) = match event.tool_kind() {
            Some(ToolKind::Edit) => edit_lines(input),
            Some(ToolKind::Write) => (line_count(input, "content"), 0),
            Some(ToolKind::MultiEdit) => input
                .get("edits")
                .and_then(serde_json::Value::as_array)
                .map_or((0, 0), |edits| {
                    edits.iter().map(edit_lines).fold((0, 0), |(a, d), (ea, ed)| {
                        (a + ea, d + ed)
                    })
                }),
            _ => return,
        };
        let Some(path) = non_empty(input.get("file_path").and_then(serde_json::Value::as_str))
        else {
            return;
        };

        let file = self
            .modified
            .entry(path.to_owned())
            .or_insert_with(|| ModifiedFile {
                path: path.to_owned(),
                ..ModifiedFile::default()
            });
        file.additions += additions;
        file.deletions += deletions;
    }

    fn on_task_spawn(&mut self, event: &HudEvent, now: DateTime<Utc>) {
        let Some(input) = event.input_payload() else {
            return;
        };

        let subagent_type = input
            .get("subagent_type")
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty());
        let description = input
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        let id = event.invocation_id().map_or_else(
            || event.synthesized_id(subagent_type.unwrap_or("unknown")),
            str::to_owned,
        );

        let agent = AgentEntry {
            id,
            agent_type: subagent_type.unwrap_or("Task").to_owned(),
            description: description.to_owned(),
            status: AgentStatus::Running,
            started_at: now,
            ended_at: None,
        };
        push_bounded(&mut self.agents, agent, AGENT_CAP);
    }

    fn on_subagent_stop(&mut self, now: DateTime<Utc>) {
        if let Some(agent) = self
            .agents
            .iter_mut()
            .find(|a| a.status == AgentStatus::Running)
        {
            agent.status = AgentStatus::Complete;
            agent.ended_at = Some(now);
        }
    }

    /// `TodoWrite` always carries the full list, so it replaces rather than
    /// merges. A `todos` value that does not decode leaves the list as is.
    fn on_todo_write(&mut self, event: &HudEvent) {
        let Some(todos) = event.input_payload().and_then(|input| input.get("todos")) else {
            return;
        };
        if let Ok(items) = Vec::<TodoItem>::deserialize(todos) {
            self.todos = items;
        }
    }

    /// Replace context health with a transcript-derived value.
    pub fn apply_transcript_health(&mut self, health: ContextHealth, model: Option<&str>) {
        if let Some(model) = model {
            self.cost.set_model(model);
        }
        self.context = health;
    }

    pub fn tools(&self) -> impl ExactSizeIterator<Item = &ToolEntry> {
        self.tools.iter()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn agents(&self) -> impl ExactSizeIterator<Item = &AgentEntry> {
        self.agents.iter()
    }

    pub fn todos(&self) -> &[TodoItem] {
        &self.todos
    }

    pub fn modified_files(&self) -> impl ExactSizeIterator<Item = &ModifiedFile> {
        self.modified.values()
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn context(&self) -> &ContextHealth {
        &self.context
    }

    /// Owned read-only view for rendering.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            context: self.context.clone(),
            tools: self.tools.iter().cloned().collect(),
            running_tools: self.running.len(),
            agents: self.agents.iter().cloned().collect(),
            completed_agents: self
                .agents
                .iter()
                .filter(|a| a.status == AgentStatus::Complete)
                .count(),
            todos: self.todos.clone(),
            modified_files: self.modified.values().cloned().collect(),
            session: self.session.clone(),
            cost: self.cost.estimate(),
            top_tools: top_tools(self.tools.iter(), TOP_TOOLS),
        }
    }
}

/// Read-only copy of [`SessionState`] handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub context: ContextHealth,
    pub tools: Vec<ToolEntry>,
    pub running_tools: usize,
    pub agents: Vec<AgentEntry>,
    pub completed_agents: usize,
    pub todos: Vec<TodoItem>,
    /// Files touched by edit tools, sorted by path.
    pub modified_files: Vec<ModifiedFile>,
    pub session: SessionInfo,
    pub cost: CostEstimate,
    /// Most frequent tool names in the history, highest count first.
    pub top_tools: Vec<(String, usize)>,
}

/// Short display target from a tool input: file path, else the first 40
/// chars of a command, else the first 30 chars of a search pattern.
pub fn tool_target(input: Option<&serde_json::Value>) -> String {
    let Some(input) = input else {
        return String::new();
    };
    let field = |key: &str| {
        input
            .get(key)
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
    };

    if let Some(path) = field("file_path") {
        path.to_owned()
    } else if let Some(command) = field("command") {
        command.chars().take(COMMAND_TARGET_CHARS).collect()
    } else if let Some(pattern) = field("pattern") {
        pattern.chars().take(PATTERN_TARGET_CHARS).collect()
    } else {
        String::new()
    }
}

/// `(added, removed)` lines of one `{old_string, new_string}` edit.
fn edit_lines(edit: &serde_json::Value) -> (u64, u64) {
    (line_count(edit, "new_string"), line_count(edit, "old_string"))
}

/// Lines in the string field `key`; zero when absent or empty.
fn line_count(value: &serde_json::Value, key: &str) -> u64 {
    let lines = value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map_or(0, |text| text.lines().count());
    u64::try_from(lines).unwrap_or(u64::MAX)
}

fn push_bounded<T>(items: &mut VecDeque<T>, item: T, cap: usize) {
    while items.len() >= cap {
        items.pop_front();
    }
    items.push_back(item);
}

fn top_tools<'a>(tools: impl Iterator<Item = &'a ToolEntry>, limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tool in tools {
        *counts.entry(tool.tool.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(name, count)| (name.to_owned(), count))
        .collect();
    // Tie-break on name for determinism.
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}
