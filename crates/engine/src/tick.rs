// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The PM tick: one ordered pass over every orchestration concern.
//!
//! All scans are idempotent and bounded. A scan that fails is logged and
//! skipped; the tick always runs to the end. Ticks never overlap — the
//! daemon awaits one tick before scheduling the next.

use crate::board::StatusBoard;
use crate::budget::CostTracker;
use crate::escalation::{EscalationAction, Escalator, PM_SENDER};
use crate::overnight::OvernightStore;
use crate::paths::StateTree;
use crate::patterns::PatternLibrary;
use crate::registry::SessionRegistry;
use crate::review::ReviewStore;
use crate::telegram::{InboundCommand, TelegramProcessor};
use crate::EngineError;
use parking_lot::Mutex;
use pilot_adapters::{AgentSpawner, ProcessWorld, SpawnSpec, TaskTracker, TrackerTask};
use pilot_bus::fsio::atomic_write_json;
use pilot_bus::{AckLedger, AckOutcome, MessageBus};
use pilot_core::clock::Clock;
use pilot_core::cost::BudgetStatus;
use pilot_core::escalation::{EscalationEvent, EscalationLevel, EscalationState};
use pilot_core::id::{SessionId, TaskId};
use pilot_core::message::{BusMessage, MessageType, Priority};
use pilot_core::session::SessionRecord;
use pilot_core::telegram::TelegramIntent;
use pilot_core::time_fmt::format_elapsed_ms;
use pilot_policy::Policy;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Daemon options, mirroring the CLI flags.
#[derive(Debug, Clone)]
pub struct PmOptions {
    pub max_agents: u32,
    pub tick_interval_ms: u64,
    pub budget_per_agent_usd: Option<f64>,
    pub once: bool,
    pub dry_run: bool,
    /// Command used to launch agent children; absent means spawn intents
    /// are recorded without spawning.
    pub agent_command: Option<String>,
}

impl PmOptions {
    pub fn from_policy(policy: &Policy) -> Self {
        Self {
            max_agents: policy.orchestrator.max_agents,
            tick_interval_ms: policy.orchestrator.tick_interval_ms,
            budget_per_agent_usd: None,
            once: false,
            dry_run: false,
            agent_command: None,
        }
    }
}

/// One scan's outcome inside a tick.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub scan: &'static str,
    pub ok: bool,
    pub detail: String,
}

/// What one tick did, logged and surfaced through `daemon status`.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub scans: Vec<ScanOutcome>,
}

impl TickReport {
    fn push(&mut self, scan: &'static str, result: Result<String, EngineError>) {
        match result {
            Ok(detail) => self.scans.push(ScanOutcome {
                scan,
                ok: true,
                detail,
            }),
            Err(e) => {
                tracing::warn!(scan, error = %e, "scan failed");
                self.scans.push(ScanOutcome {
                    scan,
                    ok: false,
                    detail: e.to_string(),
                });
            }
        }
    }
}

/// Re-check hook for drift: returns a drift description for a session
/// working off-plan. Supplied by out-of-scope analyzers.
pub type DriftCheck = Box<dyn Fn(&SessionRecord) -> Option<String> + Send + Sync>;

/// Re-check hook for auto-de-escalation: true when the triggering
/// condition has cleared.
pub type ClearedCheck = Box<dyn Fn(&EscalationState) -> bool + Send + Sync>;

pub struct PmEngine<C: Clock, P: ProcessWorld> {
    clock: C,
    policy: Policy,
    options: PmOptions,
    tree: StateTree,
    bus: Arc<MessageBus<C>>,
    pub registry: SessionRegistry<C, P>,
    pub escalator: Escalator<C>,
    pub costs: CostTracker<C>,
    pub board: StatusBoard<C>,
    pub reviews: ReviewStore<C>,
    pub telegram: TelegramProcessor<C>,
    pub overnight: OvernightStore<C>,
    pub patterns: PatternLibrary<C>,
    pub acks: AckLedger,
    world: P,
    tracker: Arc<dyn TaskTracker>,
    spawner: AgentSpawner,
    drift_check: DriftCheck,
    cleared_check: ClearedCheck,
    tick_count: AtomicU64,
    /// Tasks the spawn scan would have started (dry-run / no command).
    spawn_intents: Mutex<Vec<TaskId>>,
}

impl<C: Clock, P: ProcessWorld> PmEngine<C, P> {
    pub fn new(
        repo_root: &Path,
        policy: Policy,
        options: PmOptions,
        clock: C,
        world: P,
        bus: Arc<MessageBus<C>>,
        tracker: Arc<dyn TaskTracker>,
    ) -> Self {
        let tree = StateTree::under_repo(repo_root);
        let registry = SessionRegistry::new(
            tree.clone(),
            Arc::clone(&bus),
            clock.clone(),
            world.clone(),
            policy.lease_ms(),
        );
        let escalator = Escalator::new(
            tree.clone(),
            Arc::clone(&bus),
            clock.clone(),
            policy.enforcement.clone(),
        );
        let costs = CostTracker::new(tree.clone(), clock.clone(), policy.budget.clone());
        let board = StatusBoard::new(tree.clone(), clock.clone());
        let reviews = ReviewStore::new(tree.clone(), clock.clone(), policy.approval.clone());
        let telegram = TelegramProcessor::new(tree.clone(), clock.clone());
        let overnight = OvernightStore::new(tree.clone(), clock.clone(), policy.overnight.clone());
        let patterns = PatternLibrary::new(tree.clone(), clock.clone());
        let acks = AckLedger::new(bus.paths().clone());

        Self {
            clock,
            policy,
            options,
            tree,
            bus,
            registry,
            escalator,
            costs,
            board,
            reviews,
            telegram,
            overnight,
            patterns,
            acks,
            world,
            tracker,
            spawner: AgentSpawner::new(),
            drift_check: Box::new(|_| None),
            cleared_check: Box::new(|_| false),
            tick_count: AtomicU64::new(0),
            spawn_intents: Mutex::new(Vec::new()),
        }
    }

    /// Install the drift analyzer hook.
    pub fn with_drift_check(mut self, check: DriftCheck) -> Self {
        self.drift_check = check;
        self
    }

    /// Install the de-escalation condition re-checker.
    pub fn with_cleared_check(mut self, check: ClearedCheck) -> Self {
        self.cleared_check = check;
        self
    }

    pub fn options(&self) -> &PmOptions {
        &self.options
    }

    pub fn state_tree(&self) -> &StateTree {
        &self.tree
    }

    pub fn bus(&self) -> &Arc<MessageBus<C>> {
        &self.bus
    }

    pub fn spawn_intents(&self) -> Vec<TaskId> {
        self.spawn_intents.lock().clone()
    }

    pub fn ticks_run(&self) -> u64 {
        self.tick_count.load(Ordering::SeqCst)
    }

    /// One full tick: the twelve scans in order, each isolated.
    pub async fn tick(&self) -> TickReport {
        let tick = self.tick_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut report = TickReport {
            tick,
            scans: Vec::new(),
        };

        report.push("session", self.session_scan());
        let ready = match self.task_scan().await {
            Ok(ready) => {
                report.push("task", Ok(format!("{} ready", ready.len())));
                ready
            }
            Err(e) => {
                report.push("task", Err(e));
                Vec::new()
            }
        };
        report.push("research", self.research_scan(&ready));
        report.push("spawn", self.spawn_scan(&ready));
        report.push("ack", self.ack_sweep());
        report.push("deescalation", self.deescalation_scan());
        report.push("budget", self.budget_scan());
        report.push("drift", self.drift_scan());
        report.push("cost", self.cost_publish());
        report.push("telegram", self.telegram_scan());
        report.push("overnight", self.overnight_scan());
        report.push("human_queue", self.human_queue_scan());

        tracing::info!(
            tick,
            failed = report.scans.iter().filter(|s| !s.ok).count(),
            "tick complete"
        );
        report
    }

    // ── 1. sessions ──────────────────────────────────────────────────────

    fn session_scan(&self) -> Result<String, EngineError> {
        let stale_ms = self.policy.orchestrator.stale_session_secs * 1000;
        let swept = self.registry.sweep_stale(stale_ms);
        for session_id in &swept {
            self.board.remove(session_id)?;
        }
        let reaped = self.spawner.reap(
            self.clock.epoch_ms(),
            self.policy.orchestrator.zombie_reap_secs * 1000,
        );
        Ok(format!("{} swept, {} reaped", swept.len(), reaped.len()))
    }

    // ── 2. tasks ─────────────────────────────────────────────────────────

    /// Query the tracker once. Duplicates are dropped; errors inside the
    /// adapter already degrade to an empty list.
    async fn task_scan(&self) -> Result<Vec<TrackerTask>, EngineError> {
        let mut seen = std::collections::HashSet::new();
        Ok(self
            .tracker
            .ready_tasks()
            .await
            .into_iter()
            .filter(|t| seen.insert(t.id.clone()))
            .collect())
    }

    // ── 3. research ──────────────────────────────────────────────────────

    fn research_scan(&self, ready: &[TrackerTask]) -> Result<String, EngineError> {
        let min = complexity_rank(&self.policy.orchestrator.research_min_complexity);
        let mut scheduled = 0;
        for task in ready {
            if complexity_rank(&task.complexity) < min {
                continue;
            }
            let path = self.tree.research_file(task.id.as_str());
            if path.exists() {
                continue;
            }
            atomic_write_json(
                &path,
                &serde_json::json!({
                    "task_id": task.id,
                    "status": "scheduled",
                    "scheduled_at": self.clock.now_iso(),
                }),
            )?;
            self.bus.send(
                BusMessage::new(MessageType::TaskDelegate, PM_SENDER)
                    .to_role("researcher")
                    .with_topic("research")
                    .with_payload(serde_json::json!({
                        "task_id": task.id,
                        "title": task.title,
                    })),
            )?;
            scheduled += 1;
        }
        Ok(format!("{scheduled} scheduled"))
    }

    // ── 4. spawns ────────────────────────────────────────────────────────

    fn spawn_scan(&self, ready: &[TrackerTask]) -> Result<String, EngineError> {
        if self.tree.paused_file().exists() {
            return Ok("paused".to_string());
        }
        let overnight_run = self.overnight.active_run();
        if let Some(run) = &overnight_run {
            if !self.overnight.may_spawn(run) {
                return Ok("overnight drain".to_string());
            }
        }

        let mut candidates: Vec<&TrackerTask> = ready
            .iter()
            .filter(|t| !self.registry.is_task_claimed(&t.id))
            .collect();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut spawned = 0;
        for task in candidates {
            if self.spawner.live_count() as u32 >= self.options.max_agents {
                break;
            }
            let pattern = self.patterns.find_pattern(&task.title);
            if self.options.dry_run || self.options.agent_command.is_none() {
                self.spawn_intents.lock().push(task.id.clone());
                tracing::info!(task_id = %task.id, dry_run = self.options.dry_run, "spawn intent recorded");
                continue;
            }

            let command = self.options.agent_command.clone().unwrap_or_default();
            let mut env = vec![
                ("PILOT_TASK_ID".to_string(), task.id.to_string()),
                (
                    "PILOT_CONTEXT_FILE".to_string(),
                    self.tree
                        .research_file(task.id.as_str())
                        .display()
                        .to_string(),
                ),
                (
                    "PILOT_TOKEN_BUDGET".to_string(),
                    self.agent_token_cap().to_string(),
                ),
            ];
            if let Some(pattern) = &pattern {
                env.push((
                    "PILOT_DECOMPOSITION".to_string(),
                    serde_json::to_string(&pattern.subtasks)?,
                ));
            }
            let spec = SpawnSpec {
                command,
                args: Vec::new(),
                env,
                cwd: self
                    .tree
                    .root()
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .to_path_buf(),
            };
            match self.spawner.spawn(&spec, self.clock.epoch_ms()) {
                Ok(_) => spawned += 1,
                Err(e) => tracing::warn!(task_id = %task.id, error = %e, "spawn failed"),
            }
        }
        Ok(format!("{spawned} spawned"))
    }

    // ── 5. ACKs ──────────────────────────────────────────────────────────

    fn ack_sweep(&self) -> Result<String, EngineError> {
        let outcomes = self.acks.sweep(&self.clock)?;
        let total = outcomes.len();
        for outcome in outcomes {
            match outcome {
                AckOutcome::Retry { ack } => {
                    if let Some(to) = &ack.to {
                        let _ = pilot_bus::nudge(self.bus.paths(), to);
                    }
                }
                AckOutcome::Escalate { ack, target } => {
                    self.bus.send(
                        BusMessage::new(MessageType::Request, PM_SENDER)
                            .to(&target)
                            .with_topic("ack.escalated")
                            .with_priority(Priority::Blocking)
                            .with_payload(serde_json::json!({
                                "message_id": ack.message_id,
                                "original_to": ack.to,
                            })),
                    )?;
                }
                AckOutcome::DeadLettered { letter } => {
                    tracing::warn!(message_id = %letter.message_id, "dead-lettered");
                }
            }
        }
        Ok(format!("{total} advanced"))
    }

    // ── 6. auto-de-escalation ────────────────────────────────────────────

    fn deescalation_scan(&self) -> Result<String, EngineError> {
        let resolved = self.escalator.auto_deescalate(&self.cleared_check)?;
        Ok(format!("{} resolved", resolved.len()))
    }

    // ── 7. budgets ───────────────────────────────────────────────────────

    /// Per-agent-day token cap: the dollar override when the daemon was
    /// started with one, else the policy block threshold.
    fn agent_token_cap(&self) -> u64 {
        match self.options.budget_per_agent_usd {
            Some(usd) => {
                (usd / self.policy.budget.cost_per_million_tokens * 1_000_000.0) as u64
            }
            None => self.policy.budget.per_agent_day.block_tokens,
        }
    }

    fn budget_scan(&self) -> Result<String, EngineError> {
        let now_ms = self.clock.epoch_ms();
        let today = self.clock.today();
        let usd_cap = self.options.budget_per_agent_usd.map(|_| self.agent_token_cap());
        let mut warnings = 0;
        let mut exceeded = 0;
        for session in self.registry.active_sessions() {
            let Some(claim) = session.live_claim(now_ms) else {
                continue;
            };
            let mut status = self.costs.check(&session.session_id, &claim.task_id);
            if let Some(cap) = usd_cap {
                let agent_today = self
                    .costs
                    .load_agent(&session.session_id)?
                    .map(|a| a.tokens_on(&today))
                    .unwrap_or(0);
                if agent_today >= cap {
                    status = status.combine(BudgetStatus::Exceeded {
                        scope: "per_agent_usd".to_string(),
                        tokens: agent_today,
                        limit: cap,
                    });
                }
            }
            match status {
                BudgetStatus::Ok => {}
                BudgetStatus::Warning { scope, tokens, limit } => {
                    warnings += 1;
                    self.bus.send(
                        BusMessage::new(MessageType::Notify, PM_SENDER)
                            .to(session.session_id.as_str())
                            .with_topic("budget.warning")
                            .with_payload(serde_json::json!({
                                "scope": scope,
                                "tokens": tokens,
                                "limit": limit,
                            })),
                    )?;
                }
                BudgetStatus::Exceeded { scope, tokens, limit } => {
                    exceeded += 1;
                    self.escalator.trigger(
                        EscalationEvent::BudgetExceeded,
                        &session.session_id,
                        Some(&claim.task_id),
                        &format!("{scope}: {tokens} tokens over {limit}"),
                    )?;
                }
            }
        }
        Ok(format!("{warnings} warnings, {exceeded} exceeded"))
    }

    // ── 8. drift ─────────────────────────────────────────────────────────

    fn drift_scan(&self) -> Result<String, EngineError> {
        let now_ms = self.clock.epoch_ms();
        let mut triggered = 0;
        for session in self.registry.active_sessions() {
            if let Some(detail) = (self.drift_check)(&session) {
                triggered += 1;
                let claim = session.live_claim(now_ms);
                let (_, action) = self.escalator.trigger(
                    EscalationEvent::Drift,
                    &session.session_id,
                    claim.as_ref().map(|c| &c.task_id),
                    &detail,
                )?;
                if let EscalationAction::ReassignRequested { .. } = action {
                    self.registry.release_task(&session.session_id)?;
                }
            }
        }
        Ok(format!("{triggered} drifting"))
    }

    // ── 9. cost channel ──────────────────────────────────────────────────

    fn cost_publish(&self) -> Result<String, EngineError> {
        let summary = self.costs.publish_summary()?;
        Ok(format!(
            "{} tokens today (${:.2})",
            summary.total_tokens_today, summary.total_cost_usd_today
        ))
    }

    // ── 10. telegram ─────────────────────────────────────────────────────

    fn telegram_scan(&self) -> Result<String, EngineError> {
        if !self.policy.telegram.enabled {
            return Ok("disabled".to_string());
        }
        let commands = self.telegram.poll()?;
        let handled = commands.len();
        for command in commands {
            if let Err(e) = self.dispatch_telegram(&command) {
                tracing::warn!(intent = ?command.intent, error = %e, "telegram dispatch failed");
            }
        }

        // Expired approvals advance their escalation and notify the chat
        for approval in self.telegram.expired_approvals()? {
            let advanced = self
                .escalator
                .all_states()
                .into_iter()
                .map(|(_, s)| s)
                .find(|s| {
                    !s.resolved
                        && s.session_id == approval.session_id
                        && s.task_id.as_ref() == Some(&approval.task_id)
                });
            if let Some(state) = advanced {
                self.escalator.trigger(
                    state.event_type,
                    &approval.session_id,
                    Some(&approval.task_id),
                    "approval timeout",
                )?;
            }
            self.telegram.reply(
                approval.chat_id,
                &format!("Approval timeout: {}. Auto-escalated.", approval.task_id),
            )?;
        }
        Ok(format!("{handled} commands"))
    }

    fn dispatch_telegram(&self, command: &InboundCommand) -> Result<(), EngineError> {
        let chat = command.message.chat_id;
        match command.intent {
            TelegramIntent::Status => {
                let sessions = self.registry.active_sessions();
                let mut lines = vec![format!("{} active agents", sessions.len())];
                for s in &sessions {
                    let task = s
                        .claimed_task
                        .as_ref()
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "idle".into());
                    lines.push(format!("{} [{}] {}", s.session_id, s.role, task));
                }
                self.telegram.reply(chat, &lines.join("\n"))
            }
            TelegramIntent::Ps => {
                let board = self.board.all();
                let mut lines = Vec::new();
                for status in board {
                    lines.push(format!(
                        "{} {} {}",
                        status.session_id,
                        status.task_id.map(|t| t.to_string()).unwrap_or_default(),
                        status.step.unwrap_or_default()
                    ));
                }
                let text = if lines.is_empty() {
                    "no agents on the board".to_string()
                } else {
                    lines.join("\n")
                };
                self.telegram.reply(chat, &text)
            }
            TelegramIntent::Budget => {
                let summary = self.costs.publish_summary()?;
                self.telegram.reply(
                    chat,
                    &format!(
                        "today: {} tokens (${:.2}) across {} agents",
                        summary.total_tokens_today,
                        summary.total_cost_usd_today,
                        summary.agents.len()
                    ),
                )
            }
            TelegramIntent::MorningReport => {
                let text = match self.overnight.active_run() {
                    Some(run) => format!(
                        "run {} active: {} done, {} failed, {} in flight",
                        run.run_id,
                        run.tasks_completed.len(),
                        run.tasks_failed.len(),
                        run.tasks_in_progress.len()
                    ),
                    None => "no active overnight run".to_string(),
                };
                self.telegram.reply(chat, &text)
            }
            TelegramIntent::Approve | TelegramIntent::ApproveEscalation => {
                let id = command.args.split_whitespace().next().unwrap_or_default();
                match self.telegram.resolve_approval(id)? {
                    Some(approval) => {
                        if command.intent == TelegramIntent::ApproveEscalation {
                            for (key, state) in self.escalator.all_states() {
                                if !state.resolved
                                    && state.session_id == approval.session_id
                                    && state.task_id.as_ref() == Some(&approval.task_id)
                                {
                                    self.escalator.resolve(&key, "human_approved")?;
                                }
                            }
                        }
                        self.telegram
                            .reply(chat, &format!("Approved: {}", approval.task_id))
                    }
                    None => self.telegram.reply(chat, &format!("Unknown approval: {id}")),
                }
            }
            TelegramIntent::Reject | TelegramIntent::RejectEscalation => {
                let id = command.args.split_whitespace().next().unwrap_or_default();
                match self.telegram.resolve_approval(id)? {
                    Some(approval) => self
                        .telegram
                        .reply(chat, &format!("Rejected: {}", approval.task_id)),
                    None => self.telegram.reply(chat, &format!("Unknown approval: {id}")),
                }
            }
            TelegramIntent::Idea => {
                self.telegram.reply(chat, "Noted. Added to the idea backlog.")
            }
            TelegramIntent::Pause => {
                atomic_write_json(&self.tree.paused_file(), &serde_json::json!({"paused": true}))?;
                self.telegram.reply(chat, "Paused: no new agents will spawn.")
            }
            TelegramIntent::Resume => {
                let _ = std::fs::remove_file(self.tree.paused_file());
                self.telegram.reply(chat, "Resumed.")
            }
            TelegramIntent::KillAgent => {
                let sid = SessionId::new(command.args.split_whitespace().next().unwrap_or_default());
                match self.registry.load(&sid)? {
                    Some(record) => {
                        if !self.spawner.kill(record.pid) {
                            self.world.terminate(record.pid);
                        }
                        self.registry.end_session(&sid, "killed_by_human")?;
                        self.board.remove(&sid)?;
                        self.telegram.reply(chat, &format!("Killed {sid}"))
                    }
                    None => self.telegram.reply(chat, &format!("Unknown session: {sid}")),
                }
            }
            TelegramIntent::Logs => {
                let text = std::fs::read_to_string(self.tree.daemon_log_file())
                    .map(|log| {
                        log.lines()
                            .rev()
                            .take(10)
                            .collect::<Vec<_>>()
                            .into_iter()
                            .rev()
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .unwrap_or_else(|_| "no log yet".to_string());
                self.telegram.reply(chat, &text)
            }
            TelegramIntent::Lockdown => {
                atomic_write_json(&self.tree.paused_file(), &serde_json::json!({"paused": true}))?;
                for session in self.registry.active_sessions() {
                    self.escalator.force_block(
                        &session.session_id,
                        "lockdown",
                        "Lockdown: all edits are blocked until resume.",
                    )?;
                }
                self.telegram.reply(chat, "Lockdown: spawns paused, edits blocked.")
            }
        }
    }

    // ── 11. overnight ────────────────────────────────────────────────────

    fn overnight_scan(&self) -> Result<String, EngineError> {
        let Some(mut run) = self.overnight.active_run() else {
            return Ok("no run".to_string());
        };

        if run.total_errors >= self.policy.overnight.global_error_budget && !run.drain_requested {
            self.overnight
                .request_drain(&mut run)
                .map_err(overnight_to_engine)?;
            tracing::warn!(run_id = %run.run_id, "global error budget exhausted, draining");
        }

        if run.drain_requested && self.overnight.drain_expired(&run) {
            self.overnight.complete(&mut run).map_err(overnight_to_engine)?;
            let summary = self.costs.publish_summary()?;
            let outstanding = self
                .escalator
                .human_queue()
                .iter()
                .filter(|e| !e.resolved)
                .count() as u64;
            self.overnight
                .morning_report(
                    &run,
                    summary.total_tokens_today,
                    summary.total_cost_usd_today,
                    Vec::new(),
                    outstanding,
                )
                .map_err(overnight_to_engine)?;
            let age = format_elapsed_ms(
                self.clock.epoch_ms().saturating_sub(
                    pilot_core::clock::parse_iso_ms(&run.started_at).unwrap_or(0),
                ),
            );
            return Ok(format!("run force-completed after drain ({age})"));
        }

        let eligible = self.overnight.eligible_tasks(&run);
        Ok(format!(
            "{} eligible, {} errors",
            eligible.len(),
            run.total_errors
        ))
    }

    // ── 12. human queue ──────────────────────────────────────────────────

    fn human_queue_scan(&self) -> Result<String, EngineError> {
        let mut appended = 0;
        for (_, state) in self.escalator.all_states() {
            if state.resolved || state.level != EscalationLevel::Human {
                continue;
            }
            if self.escalator.ensure_human_queued(&state)? {
                appended += 1;
            }
        }
        Ok(format!("{appended} queued"))
    }
}

fn overnight_to_engine(e: crate::overnight::OvernightError) -> EngineError {
    match e {
        crate::overnight::OvernightError::Engine(inner) => inner,
        other => EngineError::Io(std::io::Error::other(other.to_string())),
    }
}

fn complexity_rank(complexity: &str) -> u8 {
    match complexity.to_ascii_uppercase().as_str() {
        "S" => 1,
        "M" => 2,
        "L" => 3,
        "XL" => 4,
        _ => 0,
    }
}

#[cfg(test)]
#[path = "tick_tests.rs"]
mod tests;
