//! Sequential stage execution with partial-failure bookkeeping.

use super::{RunResult, StageHistory, StageRecord};
use crate::budget::BudgetTracker;
use crate::cancellation::CancellationToken;
use crate::circuit::BreakerRegistry;
use crate::config::EngineConfig;
use crate::errors::{ResearchflowError, Result};
use crate::events::{event_types, EventSink};
use crate::invoke::{AgentInvoker, StageInvoker};
use crate::observability::SpanTimer;
use crate::stages::{ResearchItem, StageInput, StageLogic};
use chrono::Utc;
use serde_json::json;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Runs a fixed sequence of stages against one query at a time.
///
/// A run never fails once started: budget and cancellation checks, skipped
/// stages and stage errors all end up in the [`RunResult`]'s stage history
/// and warnings, and whatever items survived are still ranked and returned.
pub struct PipelineOrchestrator {
    stages: Vec<Arc<dyn StageLogic>>,
    agent: Arc<dyn AgentInvoker>,
    registry: Arc<BreakerRegistry>,
    events: Arc<dyn EventSink>,
    config: EngineConfig,
}

/// How the stage loop ended.
enum StageFlow {
    Continue,
    Stop,
}

/// Mutable state of one run, owned by the orchestrator's loop.
struct RunState {
    run_id: Uuid,
    history: StageHistory,
    warnings: Vec<String>,
    previous: Vec<ResearchItem>,
    survivors: Vec<ResearchItem>,
}

impl PipelineOrchestrator {
    pub(crate) fn new(
        stages: Vec<Arc<dyn StageLogic>>,
        agent: Arc<dyn AgentInvoker>,
        registry: Arc<BreakerRegistry>,
        events: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            stages,
            agent,
            registry,
            events,
            config,
        }
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Returns the breaker registry shared by this orchestrator.
    #[must_use]
    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs every stage in order for `query` with a fresh cancellation token.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error only when `query` is blank; every later
    /// problem is reported inside the returned [`RunResult`].
    pub async fn run(&self, query: &str) -> Result<RunResult> {
        self.run_with_cancellation(query, Arc::new(CancellationToken::new()))
            .await
    }

    /// Runs every stage in order for `query`, observing `cancel`.
    ///
    /// The token is scoped to this run only; cancelling it never affects
    /// later runs of the same orchestrator.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error only when `query` is blank.
    pub async fn run_with_cancellation(&self, query: &str, cancel: Arc<CancellationToken>) -> Result<RunResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResearchflowError::validation("query must not be empty"));
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id, stages = self.stages.len());
        Ok(self.execute(run_id, query, cancel).instrument(span).await)
    }

    async fn execute(&self, run_id: Uuid, query: &str, cancel: Arc<CancellationToken>) -> RunResult {
        let timer = SpanTimer::start("pipeline");
        let budget = Arc::new(BudgetTracker::new());
        let invoker = StageInvoker::new(
            Arc::clone(&self.agent),
            Arc::clone(&self.registry),
            Arc::clone(&budget),
            cancel,
        )
        .with_policy(self.config.retry.clone())
        .with_concurrency(self.config.concurrency);

        info!(query, "Starting pipeline run");

        let mut state = RunState {
            run_id,
            history: StageHistory::new(),
            warnings: Vec::new(),
            previous: Vec::new(),
            survivors: Vec::new(),
        };

        for (index, stage) in self.stages.iter().enumerate() {
            let flow = self
                .run_stage(index, stage.as_ref(), query, &invoker, &budget, &mut state)
                .await;
            if matches!(flow, StageFlow::Stop) {
                break;
            }
        }

        let items = rank_items(state.survivors);
        let usage_totals = budget.totals();
        let cost_estimate = self.config.pricing.estimate_cost(&budget.records());

        let result = RunResult {
            run_id,
            query: query.to_string(),
            items,
            stage_history: state.history,
            planned_stages: self.stages.len(),
            usage_totals,
            cost_estimate,
            warnings: state.warnings,
            breaker_status: self.registry.get_status(),
            duration_ms: timer.finish(),
        };

        info!(
            complete = result.is_complete(),
            items = result.items.len(),
            total_units = result.usage_totals.total_units,
            warnings = result.warnings.len(),
            duration_ms = result.duration_ms,
            "Pipeline run finished"
        );
        self.events
            .emit(
                event_types::PIPELINE_COMPLETED,
                Some(json!({
                    "run_id": run_id.to_string(),
                    "complete": result.is_complete(),
                    "items": result.items.len(),
                    "total_units": result.usage_totals.total_units,
                    "warnings": result.warnings.len(),
                    "duration_ms": result.duration_ms,
                })),
            )
            .await;

        result
    }

    async fn run_stage(
        &self,
        index: usize,
        stage: &dyn StageLogic,
        query: &str,
        invoker: &StageInvoker,
        budget: &BudgetTracker,
        state: &mut RunState,
    ) -> StageFlow {
        let name = stage.name().to_string();
        let started_at = Utc::now();
        let timer = SpanTimer::start(name.as_str());

        if let Err(err) = self.preflight(invoker.cancellation(), budget) {
            let record = StageRecord::error(&name, started_at, timer.finish(), err.kind(), err.to_string());
            self.fail(state, record, &err).await;
            return StageFlow::Stop;
        }

        if index > 0 && stage.requires_input() && state.previous.is_empty() {
            let reason = format!("stage '{name}' skipped: previous stage produced no items");
            let record = StageRecord::partial(&name, started_at, timer.finish(), reason.as_str());
            self.stop_partial(state, record, reason).await;
            return StageFlow::Stop;
        }

        self.events
            .emit(
                event_types::STAGE_STARTED,
                Some(json!({
                    "run_id": state.run_id.to_string(),
                    "stage": name,
                    "index": index,
                    "input_items": state.previous.len(),
                })),
            )
            .await;
        info!(stage = %name, index, input_items = state.previous.len(), "Stage started");

        let input = StageInput {
            run_id: state.run_id,
            query: query.to_string(),
            stage_name: name.clone(),
            stage_index: index,
            items: std::mem::take(&mut state.previous),
        };

        match stage.run(input, invoker).await {
            Ok(output) => {
                state.warnings.extend(output.warnings);
                let item_count = output.items.len();

                if let Some(reason) = output.partial_reason {
                    // Degraded output only displaces earlier survivors when it has items.
                    if !output.items.is_empty() {
                        state.survivors = output.items;
                    }
                    let record = StageRecord::partial(&name, started_at, timer.finish(), reason.as_str())
                        .with_item_count(item_count);
                    self.stop_partial(state, record, format!("stage '{name}' stopped early: {reason}"))
                        .await;
                    return StageFlow::Stop;
                }

                state.survivors.clone_from(&output.items);
                state.previous = output.items;

                let duration_ms = timer.finish();
                info!(stage = %name, items = item_count, duration_ms, "Stage completed");
                self.events
                    .emit(
                        event_types::STAGE_COMPLETED,
                        Some(json!({
                            "run_id": state.run_id.to_string(),
                            "stage": name,
                            "items": item_count,
                            "duration_ms": duration_ms,
                        })),
                    )
                    .await;
                state
                    .history
                    .push(StageRecord::success(name, started_at, duration_ms, item_count));
                StageFlow::Continue
            }
            Err(err) => {
                let record = StageRecord::error(&name, started_at, timer.finish(), err.kind(), err.to_string());
                self.fail(state, record, &err).await;
                StageFlow::Stop
            }
        }
    }

    fn preflight(&self, cancel: &CancellationToken, budget: &BudgetTracker) -> Result<()> {
        if cancel.is_cancelled() {
            let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
            return Err(ResearchflowError::cancelled(reason));
        }
        budget.check_budget(self.config.budget_ceiling)
    }

    async fn stop_partial(&self, state: &mut RunState, record: StageRecord, warning: String) {
        warn!(stage = %record.name, reason = ?record.message, "Stage partial; skipping remaining stages");
        self.events
            .emit(
                event_types::STAGE_PARTIAL,
                Some(json!({
                    "run_id": state.run_id.to_string(),
                    "stage": record.name,
                    "reason": record.message,
                    "items": record.item_count,
                })),
            )
            .await;
        state.warnings.push(warning);
        state.history.push(record);
    }

    async fn fail(&self, state: &mut RunState, record: StageRecord, err: &ResearchflowError) {
        warn!(stage = %record.name, error = %err, kind = err.kind(), "Stage failed; aborting run");
        self.events
            .emit(
                event_types::STAGE_FAILED,
                Some(json!({
                    "run_id": state.run_id.to_string(),
                    "stage": record.name,
                    "error": err.to_info(),
                })),
            )
            .await;
        state.warnings.push(format!("stage '{}' failed: {err}", record.name));
        state.history.push(record);
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("stages", &self.stage_names())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Sorts by quality score descending; missing scores last, ties keep input order.
#[must_use]
pub fn rank_items(mut items: Vec<ResearchItem>) -> Vec<ResearchItem> {
    items.sort_by(|a, b| match (a.ranking_score(), b.ranking_score()) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    items
}
