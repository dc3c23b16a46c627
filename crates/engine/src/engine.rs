//! The workflow engine orchestrator: Plan → Execute → Finalize.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use cascade_core::{ExecutionId, NodeId, TriggerId, WorkflowId};
use cascade_execution::{ExecutionContext, ExecutionPhase, ExecutionPlan, ExecutionState};
use cascade_execution::{EventKind, ExecutionEvent};
use cascade_expression::{EvaluationContext, TemplateProcessor};
use cascade_resilience::{BreakerRegistry, RetryError, RetryPolicy};
use cascade_storage::EventStore;
use cascade_workflow::{
    DependencyGraph, NodeDefinition, NodeState, NodeType, TriggerDefinition, WorkflowDefinition,
};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::binder::VariableBinder;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::executor::ExecutorRegistry;
use crate::join::JoinEvaluator;
use crate::observer::ExecutionObserver;
use crate::scheduler::{self, NodeReadiness};
use crate::strategy::{StrategyDecision, StrategyState};
use crate::trigger::TriggerManager;

/// Final summary of one execution.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// The execution's ID (use with
    /// [`get_execution`](WorkflowEngine::get_execution) for full replay).
    pub execution_id: ExecutionId,
    /// The executed workflow.
    pub workflow_id: WorkflowId,
    /// Terminal phase.
    pub phase: ExecutionPhase,
    /// Final node states keyed by node name.
    pub node_states: HashMap<String, NodeState>,
    /// Final execution variables (completed node outputs by name).
    pub variables: Map<String, Value>,
    /// Error for failed or cancelled executions.
    pub error: Option<String>,
    /// Number of events emitted.
    pub event_count: u64,
    /// Wall-clock duration of the execution.
    pub duration: Duration,
}

/// How the execute phase ended.
enum RunVerdict {
    Completed,
    Aborted(String),
    Cancelled(String),
}

/// Per-execution bundle shared with node tasks.
struct RunShared {
    config: EngineConfig,
    executors: Arc<ExecutorRegistry>,
    breakers: Arc<BreakerRegistry>,
    joins: Arc<JoinEvaluator>,
    binder: VariableBinder,
    template: TemplateProcessor,
    observers: Vec<Arc<dyn ExecutionObserver>>,
    event_store: Arc<dyn EventStore>,
    ctx: ExecutionContext,
    graph: Arc<DependencyGraph>,
}

/// The workflow execution engine.
///
/// Owns the executor registry, the breaker registry, join state, and trigger
/// state; consumes an [`EventStore`] for durability. One engine instance
/// serves any number of concurrent executions, which proceed independently —
/// the per-wave semaphore is the only admission control inside a single
/// execution.
pub struct WorkflowEngine {
    config: EngineConfig,
    executors: Arc<ExecutorRegistry>,
    breakers: Arc<BreakerRegistry>,
    joins: Arc<JoinEvaluator>,
    triggers: Arc<TriggerManager>,
    event_store: Arc<dyn EventStore>,
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl WorkflowEngine {
    /// Create an engine. Executors register at construction; the engine
    /// never looks inside them.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        executors: ExecutorRegistry,
        event_store: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            config,
            executors: Arc::new(executors),
            breakers: Arc::new(BreakerRegistry::default()),
            joins: Arc::new(JoinEvaluator::new()),
            triggers: Arc::new(TriggerManager::new()),
            event_store,
            observers: Vec::new(),
        }
    }

    /// Attach an observer. Hooks are best-effort and must not block.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replace the breaker configuration used for new logical targets.
    /// Existing breakers keep their configuration.
    #[must_use]
    pub fn with_breaker_config(
        mut self,
        breaker_config: cascade_resilience::CircuitBreakerConfig,
    ) -> Self {
        self.breakers = Arc::new(BreakerRegistry::new(breaker_config));
        self
    }

    /// The trigger manager (exposed for embedders that gate externally).
    #[must_use]
    pub fn triggers(&self) -> &TriggerManager {
        &self.triggers
    }

    /// Copy-on-read circuit breaker statistics per logical target.
    #[must_use]
    pub fn breaker_stats(
        &self,
    ) -> HashMap<String, cascade_resilience::BreakerStats> {
        self.breakers.stats()
    }

    /// Execute a workflow to completion.
    pub async fn execute_workflow(
        &self,
        workflow: WorkflowDefinition,
        trigger: &TriggerDefinition,
        initial_variables: Map<String, Value>,
    ) -> Result<ExecutionReport, EngineError> {
        self.execute_with_cancellation(
            workflow,
            trigger,
            initial_variables,
            CancellationToken::new(),
        )
        .await
    }

    /// Execute a workflow with a caller-owned cancellation token.
    ///
    /// Pre-start failures (validation, cyclic graphs, trigger denial) return
    /// `Err` without emitting any event. Once `ExecutionStarted` is emitted,
    /// the outcome — completed, failed, or cancelled — is recorded in the
    /// event log and returned as an [`ExecutionReport`].
    #[instrument(skip_all, fields(workflow = %workflow.name))]
    pub async fn execute_with_cancellation(
        &self,
        workflow: WorkflowDefinition,
        trigger: &TriggerDefinition,
        initial_variables: Map<String, Value>,
        cancellation: CancellationToken,
    ) -> Result<ExecutionReport, EngineError> {
        let started = Instant::now();

        // ── Phase 1: Planning ───────────────────────────────────────
        workflow.validate_for_execution()?;
        let graph = Arc::new(workflow.build_graph()?);
        let plan = ExecutionPlan::from_graph(workflow.id, &graph)?;
        plan.validate(&graph)?;
        debug!(
            nodes = plan.total_nodes,
            waves = plan.depth,
            max_parallel = plan.max_parallel,
            "plan created"
        );

        // ── Phase 2: trigger gate ───────────────────────────────────
        self.triggers
            .activate(trigger, &initial_variables)
            .map_err(|e| EngineError::Validation(format!("trigger activation denied: {e}")))?;

        let ctx = ExecutionContext::new(Arc::new(workflow)).with_cancellation(cancellation);
        let execution_id = ctx.execution_id;
        let shared = Arc::new(RunShared {
            config: self.config.clone(),
            executors: Arc::clone(&self.executors),
            breakers: Arc::clone(&self.breakers),
            joins: Arc::clone(&self.joins),
            binder: VariableBinder::new(),
            template: TemplateProcessor::new(),
            observers: self.observers.clone(),
            event_store: Arc::clone(&self.event_store),
            ctx,
            graph,
        });

        let outcome = tokio::time::timeout(
            self.config.workflow_execution_timeout,
            run_execution(Arc::clone(&shared), &plan, trigger.id, initial_variables),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(fatal)) => {
                // Storage or aggregate failure: the engine cannot guarantee
                // durability, so the execution fails.
                warn!(error = %fatal, "execution failed fatally");
                let _ = shared.ctx.with_state(|s| {
                    if s.phase.is_terminal() {
                        Ok(())
                    } else {
                        s.record_failed(fatal.to_string()).map(|_| ())
                    }
                });
                let _ = flush(&shared).await;
            }
            Err(_elapsed) => {
                warn!("workflow execution timed out");
                shared.ctx.cancellation.cancel();
                let _ = shared
                    .ctx
                    .with_state(|s| s.record_failed("workflow execution timed out"));
                let _ = flush(&shared).await;
            }
        }

        self.triggers.complete_execution(trigger.id);
        self.joins.clear_execution(execution_id);

        Ok(build_report(&shared, started))
    }

    /// Reconstruct an execution's state by replaying its event log.
    pub async fn get_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<ExecutionState, EngineError> {
        let events = self.event_store.get_events(execution_id).await?;
        if events.is_empty() {
            return Err(EngineError::NotFound(format!("execution {execution_id}")));
        }
        Ok(ExecutionState::from_events(&events)?)
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("config", &self.config)
            .field("executors", &self.executors)
            .finish_non_exhaustive()
    }
}

// ── Execute phase ───────────────────────────────────────────────────

async fn run_execution(
    shared: Arc<RunShared>,
    plan: &ExecutionPlan,
    trigger_id: TriggerId,
    initial_variables: Map<String, Value>,
) -> Result<(), EngineError> {
    let workflow = Arc::clone(&shared.ctx.workflow);
    let execution_id = shared.ctx.execution_id;

    stamp_metadata(&shared, None);
    let event = shared.ctx.with_state(|s| {
        s.record_started(
            trigger_id,
            shared.graph.node_ids().to_vec(),
            initial_variables,
        )
    })?;
    notify(&shared, &event);
    flush(&shared).await?;
    info!(%execution_id, "execution started");

    // Register join synchronization points.
    for node in &workflow.nodes {
        if shared.graph.is_join_node(node.id) {
            shared.joins.register(
                execution_id,
                node.id,
                shared.graph.predecessors(node.id),
                node.join_strategy(),
                node.min_required(),
                node.merge_strategy(),
            );
        }
    }

    let mut strategy = StrategyState::new(
        shared.config.default_error_strategy,
        plan.total_nodes,
    );

    let dynamic = scheduler::requires_dynamic_scheduling(&workflow, &shared.graph);
    let verdict = if dynamic {
        run_dynamic(&shared, &mut strategy).await?
    } else {
        run_waves(&shared, plan, &mut strategy).await?
    };

    // ── Phase 3: Finalize ───────────────────────────────────────────
    let event = match verdict {
        RunVerdict::Cancelled(reason) => {
            shared.ctx.with_state(|s| s.record_cancelled(reason))?
        }
        RunVerdict::Aborted(reason) => {
            shared.ctx.with_state(|s| {
                s.begin_finalizing()?;
                s.record_failed(reason)
            })?
        }
        RunVerdict::Completed => match strategy.finalize() {
            Ok(()) => {
                info!(%execution_id, outcome = %strategy.summary(), "execution completed");
                shared.ctx.with_state(|s| {
                    s.begin_finalizing()?;
                    s.record_completed()
                })?
            }
            Err(reason) => shared.ctx.with_state(|s| {
                s.begin_finalizing()?;
                s.record_failed(reason)
            })?,
        },
    };
    notify(&shared, &event);
    flush(&shared).await?;
    Ok(())
}

/// Static scheduling: one wave at a time, every predecessor already settled.
async fn run_waves(
    shared: &Arc<RunShared>,
    plan: &ExecutionPlan,
    strategy: &mut StrategyState,
) -> Result<RunVerdict, EngineError> {
    for (wave_idx, wave) in plan.waves.iter().enumerate() {
        if shared.ctx.cancellation.is_cancelled() {
            return Ok(RunVerdict::Cancelled("cancellation requested".into()));
        }
        stamp_metadata(shared, Some(wave_idx));

        let ready = partition_ready(shared, wave, strategy)?;
        let results = run_batch(shared, ready).await?;
        let abort = settle(results, strategy);
        flush(shared).await?;

        match abort {
            Some(SettleOutcome::Cancelled) => {
                return Ok(RunVerdict::Cancelled("cancellation requested".into()));
            }
            Some(SettleOutcome::Abort(reason)) => return Ok(RunVerdict::Aborted(reason)),
            None => {}
        }
    }
    Ok(RunVerdict::Completed)
}

/// Dynamic scheduling: conditional routing or data-dependent joins make the
/// ready set a function of outputs, so it is recomputed round by round.
async fn run_dynamic(
    shared: &Arc<RunShared>,
    strategy: &mut StrategyState,
) -> Result<RunVerdict, EngineError> {
    let workflow = Arc::clone(&shared.ctx.workflow);
    let mut round = 0usize;
    loop {
        if shared.ctx.cancellation.is_cancelled() {
            return Ok(RunVerdict::Cancelled("cancellation requested".into()));
        }
        stamp_metadata(shared, Some(round));

        let pending: Vec<NodeId> = {
            let snapshot = shared.ctx.with_state(|s| s.clone());
            workflow
                .nodes
                .iter()
                .filter(|n| {
                    snapshot
                        .node_state(n.id)
                        .is_some_and(|ns| ns.state == NodeState::Pending)
                })
                .map(|n| n.id)
                .collect()
        };
        if pending.is_empty() {
            return Ok(RunVerdict::Completed);
        }

        let ready = partition_ready(shared, &pending, strategy)?;
        if ready.is_empty() {
            // No node became ready; if skips were recorded this round the
            // cascade continues. Otherwise the remaining nodes can never
            // run — settle them as skipped and finish.
            let still_pending: Vec<NodeId> = shared.ctx.with_state(|s| {
                pending
                    .iter()
                    .copied()
                    .filter(|&id| {
                        s.node_state(id).is_some_and(|ns| ns.state == NodeState::Pending)
                    })
                    .collect()
            });
            if still_pending.len() == pending.len() {
                for node_id in still_pending {
                    if let Some(node) = workflow.node(node_id) {
                        skip_node(shared, node, "unreachable", strategy)?;
                    }
                }
                flush(shared).await?;
                return Ok(RunVerdict::Completed);
            }
            flush(shared).await?;
            round += 1;
            continue;
        }

        let results = run_batch(shared, ready).await?;
        let abort = settle(results, strategy);
        flush(shared).await?;

        match abort {
            Some(SettleOutcome::Cancelled) => {
                return Ok(RunVerdict::Cancelled("cancellation requested".into()));
            }
            Some(SettleOutcome::Abort(reason)) => return Ok(RunVerdict::Aborted(reason)),
            None => {}
        }
        round += 1;
    }
}

/// Assess a candidate set: record skips, collect the runnable nodes.
fn partition_ready(
    shared: &Arc<RunShared>,
    candidates: &[NodeId],
    strategy: &mut StrategyState,
) -> Result<Vec<NodeId>, EngineError> {
    let workflow = &shared.ctx.workflow;
    let snapshot = shared.ctx.with_state(|s| s.clone());
    let mut ready = Vec::new();

    for &node_id in candidates {
        let node = workflow
            .node(node_id)
            .ok_or_else(|| EngineError::NotFound(format!("node {node_id}")))?;
        match scheduler::assess(node, &shared.graph, &snapshot) {
            Ok(NodeReadiness::Ready) => {
                if shared.graph.is_join_node(node_id)
                    && !shared.joins.try_fire(snapshot.execution_id, node_id)
                {
                    // Edges settled but no live branch output reached the
                    // join (all contributing branches failed).
                    skip_node(shared, node, "join has no completed branches", strategy)?;
                    continue;
                }
                ready.push(node_id);
            }
            Ok(NodeReadiness::Waiting) => {}
            Ok(NodeReadiness::Skip(reason)) => {
                skip_node(shared, node, &reason, strategy)?;
            }
            Err(err) => {
                // Gating itself failed (bad condition): the node fails.
                let event = shared.ctx.with_state(|s| {
                    s.record_node_failed(node.id, &node.name, err.to_string(), 0)
                })?;
                notify(shared, &event);
                mark_join_branches_inactive(shared, node.id);
                if let StrategyDecision::Abort(reason) =
                    strategy.on_node_failure(node.id, &err.to_string())
                {
                    return Err(EngineError::Validation(reason));
                }
            }
        }
    }
    Ok(ready)
}

fn skip_node(
    shared: &Arc<RunShared>,
    node: &NodeDefinition,
    reason: &str,
    strategy: &mut StrategyState,
) -> Result<(), EngineError> {
    debug!(node = %node.name, reason, "skipping node");
    let event = shared
        .ctx
        .with_state(|s| s.record_node_skipped(node.id, &node.name, reason))?;
    notify(shared, &event);
    strategy.on_node_skipped();
    mark_join_branches_inactive(shared, node.id);
    Ok(())
}

fn mark_join_branches_inactive(shared: &Arc<RunShared>, node_id: NodeId) {
    for succ in shared.graph.successors(node_id) {
        if shared.graph.is_join_node(succ) {
            shared
                .joins
                .mark_branch_inactive(shared.ctx.execution_id, succ, node_id);
        }
    }
}

enum SettleOutcome {
    Abort(String),
    Cancelled,
}

/// Feed batch results to the error strategy.
fn settle(
    results: Vec<(NodeId, Result<Map<String, Value>, EngineError>)>,
    strategy: &mut StrategyState,
) -> Option<SettleOutcome> {
    let mut abort = None;
    for (node_id, result) in results {
        match result {
            Ok(_) => strategy.on_node_success(),
            Err(EngineError::Cancelled) => return Some(SettleOutcome::Cancelled),
            Err(error) => {
                if let StrategyDecision::Abort(reason) =
                    strategy.on_node_failure(node_id, &error.to_string())
                {
                    abort.get_or_insert(reason);
                }
            }
        }
    }
    abort.map(SettleOutcome::Abort)
}

/// Run one batch of ready nodes concurrently, bounded by the semaphore.
async fn run_batch(
    shared: &Arc<RunShared>,
    ready: Vec<NodeId>,
) -> Result<Vec<(NodeId, Result<Map<String, Value>, EngineError>)>, EngineError> {
    if ready.is_empty() {
        return Ok(Vec::new());
    }
    let permits = if shared.config.enable_parallel {
        shared.config.max_parallel_nodes.max(1)
    } else {
        1
    };
    let semaphore = Arc::new(Semaphore::new(permits));

    let mut tasks: JoinSet<(NodeId, Result<Map<String, Value>, EngineError>)> = JoinSet::new();
    for node_id in ready {
        let shared = Arc::clone(shared);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let permit = semaphore.acquire_owned().await;
            if permit.is_err() {
                return (node_id, Err(EngineError::Cancelled));
            }
            let Some(node) = shared.ctx.workflow.node(node_id).cloned() else {
                return (
                    node_id,
                    Err(EngineError::NotFound(format!("node {node_id}"))),
                );
            };
            let result = run_node(&shared, &node).await;
            (node_id, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(entry) => results.push(entry),
            Err(join_err) => {
                return Err(EngineError::NodeExecution(format!(
                    "node task aborted: {join_err}"
                )));
            }
        }
    }
    Ok(results)
}

/// Drive one node through bind → template → execute under retry, breaker,
/// and timeout, recording its lifecycle events.
#[instrument(skip_all, fields(node = %node.name))]
async fn run_node(
    shared: &Arc<RunShared>,
    node: &NodeDefinition,
) -> Result<Map<String, Value>, EngineError> {
    let started = Instant::now();
    let execution_id = shared.ctx.execution_id;
    let policy = retry_policy_for(&shared.config, node);
    let max_attempts = policy.max_attempts;
    let started_emitted = Arc::new(AtomicBool::new(false));
    let last_attempt = Arc::new(AtomicU32::new(1));

    let attempt_policy = policy.clone();
    let result = policy
        .execute(&shared.ctx.cancellation, EngineError::is_retryable, |attempt| {
            let shared = Arc::clone(shared);
            let node = node.clone();
            let policy = attempt_policy.clone();
            let started_emitted = Arc::clone(&started_emitted);
            let last_attempt = Arc::clone(&last_attempt);
            async move {
                last_attempt.store(attempt, Ordering::SeqCst);
                shared
                    .ctx
                    .check_cancelled()
                    .map_err(|_| EngineError::Cancelled)?;

                if attempt > 1 {
                    let delay = policy.delay_for(attempt - 1);
                    let event = shared.ctx.with_state(|s| {
                        s.record_node_retrying(
                            node.id,
                            &node.name,
                            attempt,
                            delay.as_millis() as u64,
                        )
                    })?;
                    notify(&shared, &event);
                }

                run_attempt(&shared, &node, max_attempts, &started_emitted).await
            }
        })
        .await;

    match result {
        Ok(output) => {
            let filtered = filter_output(node, output);
            let duration_ms = started.elapsed().as_millis() as u64;
            let event = shared.ctx.with_state(|s| {
                s.record_node_completed(node.id, &node.name, filtered.clone(), Some(duration_ms))
            })?;
            notify(shared, &event);

            for succ in shared.graph.successors(node.id) {
                if shared.graph.is_join_node(succ) {
                    shared.joins.mark_branch_completed(
                        execution_id,
                        succ,
                        node.id,
                        filtered.clone(),
                    );
                }
            }
            Ok(filtered)
        }
        Err(retry_err) => {
            let (attempt, error) = match retry_err {
                RetryError::Exhausted { attempts, source } => (
                    attempts,
                    EngineError::NodeExecution(format!(
                        "max attempts exhausted after {attempts} attempts: {source}"
                    )),
                ),
                RetryError::Aborted(source) => {
                    (last_attempt.load(Ordering::SeqCst), source)
                }
                RetryError::Cancelled => (last_attempt.load(Ordering::SeqCst), EngineError::Cancelled),
            };

            if !matches!(error, EngineError::Cancelled) {
                let event = shared.ctx.with_state(|s| {
                    s.record_node_failed(node.id, &node.name, error.to_string(), attempt)
                })?;
                notify(shared, &event);
                mark_join_branches_inactive(shared, node.id);
            }
            Err(error)
        }
    }
}

/// One attempt: bind (fresh every time), merge join input, template the
/// config, emit `NodeStarted` once, then invoke the executor under the
/// breaker and the per-node timeout.
async fn run_attempt(
    shared: &Arc<RunShared>,
    node: &NodeDefinition,
    max_attempts: u32,
    started_emitted: &AtomicBool,
) -> Result<Map<String, Value>, EngineError> {
    let ctx = &shared.ctx;
    let snapshot = ctx.with_state(|s| s.clone());
    let mut inputs = shared
        .binder
        .bind(&ctx.workflow, &shared.graph, &snapshot, node)?;

    if shared.graph.is_join_node(node.id) {
        for (key, value) in shared.joins.join_input(ctx.execution_id, node.id) {
            inputs.variables.set(key, value)?;
        }
    }

    let exec_node = if shared.config.enable_templating {
        let mut env_map = inputs.global_context.to_map();
        env_map.extend(inputs.variables.to_map());
        let env = EvaluationContext::from_map(env_map);
        let processed = shared.template.process_map(
            &node.config,
            &env,
            shared.config.default_template_mode,
            None,
        )?;
        // The templated clone preserves identity, schema, and binding; only
        // the config the executor sees changes.
        node.clone().with_config(processed)
    } else {
        node.clone()
    };

    if !started_emitted.swap(true, Ordering::SeqCst) {
        let event = ctx.with_state(|s| {
            s.record_node_started(node.id, &node.name, max_attempts, inputs.variables.to_map())
        })?;
        notify(shared, &event);
    }

    let breaker = shared
        .config
        .enable_circuit_breaker
        .then(|| shared.breakers.get_or_create(&node.name));
    if let Some(breaker) = &breaker {
        breaker.acquire().map_err(EngineError::from)?;
    }

    let outcome = match shared.executors.get(node.node_type) {
        Some(executor) => {
            // Executors are expected to honor the token themselves; the
            // select is the engine's backstop so a deaf executor cannot
            // hold the execution past cancellation.
            tokio::select! {
                result = tokio::time::timeout(
                    shared.config.node_execution_timeout,
                    executor.execute(&ctx.cancellation, &exec_node, &inputs),
                ) => match result {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::Timeout {
                        timeout: shared.config.node_execution_timeout,
                    }),
                },
                () = ctx.cancellation.cancelled() => Err(EngineError::Cancelled),
            }
        }
        // Start/End markers pass their scoped variables through.
        None if matches!(node.node_type, NodeType::Start | NodeType::End) => {
            Ok(inputs.variables.to_map())
        }
        None => Err(EngineError::NotFound(format!(
            "no executor registered for node type {}",
            node.node_type
        ))),
    };

    if let Some(breaker) = &breaker {
        match &outcome {
            Ok(_) => breaker.record_success(),
            // Only service-health failures count; cancellation and
            // configuration errors say nothing about the target.
            Err(error) if error.is_retryable() => breaker.record_failure(),
            Err(_) => {}
        }
    }
    outcome
}

fn retry_policy_for(config: &EngineConfig, node: &NodeDefinition) -> RetryPolicy {
    if !(config.enable_retry && node.retry_enabled()) {
        return RetryPolicy::none();
    }
    let defaults = RetryPolicy::default();
    RetryPolicy {
        max_attempts: node
            .max_attempts_override()
            .unwrap_or(config.default_max_retries)
            .max(1),
        initial_delay: node
            .config
            .get("retry_initial_delay_ms")
            .and_then(Value::as_u64)
            .map_or(config.default_retry_delay, Duration::from_millis),
        max_delay: defaults.max_delay,
        multiplier: node
            .config
            .get("retry_multiplier")
            .and_then(Value::as_f64)
            .unwrap_or(defaults.multiplier),
        jitter: node
            .config
            .get("retry_jitter")
            .and_then(Value::as_bool)
            .unwrap_or(defaults.jitter),
        retryable_errors: node
            .config
            .get("retryable_errors")
            .and_then(Value::as_array)
            .map(|needles| {
                needles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Trim an executor's output to the declared output schema, if any.
fn filter_output(node: &NodeDefinition, output: Map<String, Value>) -> Map<String, Value> {
    match &node.io_schema {
        Some(schema) if schema.has_outputs() => output
            .into_iter()
            .filter(|(key, _)| schema.outputs.contains_key(key))
            .collect(),
        _ => output,
    }
}

fn stamp_metadata(shared: &Arc<RunShared>, wave: Option<usize>) {
    let mut metadata = Map::new();
    metadata.insert(
        "engine_version".into(),
        Value::String(env!("CARGO_PKG_VERSION").to_string()),
    );
    if let Some(wave) = wave {
        metadata.insert("wave".into(), Value::from(wave as u64));
    }
    shared.ctx.with_state(|s| s.set_event_metadata(metadata));
}

async fn flush(shared: &Arc<RunShared>) -> Result<(), EngineError> {
    let events = shared.ctx.with_state(ExecutionState::take_uncommitted);
    let Some(last) = events.last().map(|e| e.sequence) else {
        return Ok(());
    };
    shared.event_store.append_events(events).await?;
    shared.ctx.with_state(|s| s.mark_committed(last));
    Ok(())
}

/// Dispatch an event to every observer. Hooks are best-effort.
fn notify(shared: &RunShared, event: &ExecutionEvent) {
    let execution_id = event.execution_id;
    for observer in &shared.observers {
        match &event.kind {
            EventKind::ExecutionStarted { .. } => {
                observer.on_execution_started(execution_id, event.workflow_id);
            }
            EventKind::ExecutionCompleted { .. } => observer.on_execution_completed(execution_id),
            EventKind::ExecutionFailed { error } => {
                observer.on_execution_failed(execution_id, error);
            }
            EventKind::ExecutionCancelled { reason } => {
                observer.on_execution_cancelled(execution_id, reason);
            }
            EventKind::NodeStarted {
                node_id, node_name, ..
            } => observer.on_node_started(execution_id, *node_id, node_name),
            EventKind::NodeCompleted {
                node_id, node_name, ..
            } => observer.on_node_completed(execution_id, *node_id, node_name),
            EventKind::NodeFailed {
                node_id,
                node_name,
                error,
                ..
            } => observer.on_node_failed(execution_id, *node_id, node_name, error),
            EventKind::NodeRetrying {
                node_id,
                node_name,
                attempt,
                ..
            } => observer.on_node_retrying(execution_id, *node_id, node_name, *attempt),
            EventKind::NodeSkipped {
                node_id, node_name, ..
            } => observer.on_node_skipped(execution_id, *node_id, node_name),
        }
    }
}

fn build_report(shared: &Arc<RunShared>, started: Instant) -> ExecutionReport {
    shared.ctx.with_state(|s| ExecutionReport {
        execution_id: s.execution_id,
        workflow_id: s.workflow_id,
        phase: s.phase,
        node_states: shared
            .ctx
            .workflow
            .nodes
            .iter()
            .map(|n| {
                let state = s
                    .node_state(n.id)
                    .map_or(NodeState::Pending, |ns| ns.state);
                (n.name.clone(), state)
            })
            .collect(),
        variables: s.variables.to_map(),
        error: s.error.clone(),
        event_count: s.last_sequence(),
        duration: started.elapsed(),
    })
}
