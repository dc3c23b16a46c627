//! Trigger activation gating.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use cascade_core::TriggerId;
use cascade_expression::{EvaluationContext, evaluate_predicate};
use cascade_workflow::TriggerDefinition;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a trigger activation was denied.
#[derive(Debug, Clone, Error)]
pub enum ActivationDenied {
    /// The trigger is disabled.
    #[error("trigger is not active")]
    Inactive,

    /// The cooldown window has not elapsed.
    #[error("cooldown active for another {remaining:?}")]
    Cooldown {
        /// Time until the next activation is allowed.
        remaining: Duration,
    },

    /// The concurrent-execution cap is reached.
    #[error("concurrency limit reached ({active}/{max})")]
    ConcurrencyLimit {
        /// Executions currently running for this trigger.
        active: u64,
        /// The configured cap.
        max: u64,
    },

    /// The activation condition evaluated to false.
    #[error("activation condition evaluated to false")]
    ConditionFalse,

    /// The activation condition could not be evaluated.
    #[error("activation condition failed: {0}")]
    ConditionError(String),

    /// The input does not satisfy the trigger's input schema.
    #[error("input validation failed: {0}")]
    InputInvalid(String),
}

#[derive(Debug, Default)]
struct TriggerState {
    last_activation: Option<Instant>,
    active_executions: u64,
}

/// Gates trigger activation by cooldown, concurrency, condition, and input
/// schema. Per-trigger state lives behind one lock; `activate` is a single
/// atomic check-and-record.
#[derive(Debug, Default)]
pub struct TriggerManager {
    states: RwLock<HashMap<TriggerId, TriggerState>>,
}

impl TriggerManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `trigger` could activate with `input`, without
    /// recording anything.
    pub fn can_activate(
        &self,
        trigger: &TriggerDefinition,
        input: &Map<String, Value>,
    ) -> Result<(), ActivationDenied> {
        let states = self.states.read();
        Self::check(trigger, input, states.get(&trigger.id))
    }

    /// Atomically check and record an activation.
    pub fn activate(
        &self,
        trigger: &TriggerDefinition,
        input: &Map<String, Value>,
    ) -> Result<(), ActivationDenied> {
        let mut states = self.states.write();
        Self::check(trigger, input, states.get(&trigger.id))?;
        let state = states.entry(trigger.id).or_default();
        state.last_activation = Some(Instant::now());
        state.active_executions += 1;
        Ok(())
    }

    /// Release one activation slot after its execution finished.
    pub fn complete_execution(&self, trigger_id: TriggerId) {
        let mut states = self.states.write();
        if let Some(state) = states.get_mut(&trigger_id) {
            state.active_executions = state.active_executions.saturating_sub(1);
        }
    }

    /// Executions currently accounted to `trigger_id`.
    #[must_use]
    pub fn active_executions(&self, trigger_id: TriggerId) -> u64 {
        self.states
            .read()
            .get(&trigger_id)
            .map_or(0, |s| s.active_executions)
    }

    fn check(
        trigger: &TriggerDefinition,
        input: &Map<String, Value>,
        state: Option<&TriggerState>,
    ) -> Result<(), ActivationDenied> {
        if !trigger.is_active() {
            return Err(ActivationDenied::Inactive);
        }

        let cooldown = trigger.cooldown();
        if !cooldown.is_zero() {
            if let Some(last) = state.and_then(|s| s.last_activation) {
                let elapsed = last.elapsed();
                if elapsed < cooldown {
                    return Err(ActivationDenied::Cooldown {
                        remaining: cooldown - elapsed,
                    });
                }
            }
        }

        if let Some(max) = trigger.max_concurrent() {
            let active = state.map_or(0, |s| s.active_executions);
            if active >= max {
                return Err(ActivationDenied::ConcurrencyLimit { active, max });
            }
        }

        if let Some(condition) = trigger.condition() {
            let mut env = EvaluationContext::from_map(input.clone());
            env.set("input", Value::Object(input.clone()));
            match evaluate_predicate(condition, &env) {
                Ok(true) => {}
                Ok(false) => return Err(ActivationDenied::ConditionFalse),
                Err(err) => return Err(ActivationDenied::ConditionError(err.to_string())),
            }
        }

        if let Some(schema) = trigger.input_schema() {
            for (name, spec) in &schema {
                if spec.required && !input.contains_key(name) {
                    return Err(ActivationDenied::InputInvalid(format!(
                        "missing required input '{name}'"
                    )));
                }
            }
        }

        Ok(())
    }
}
