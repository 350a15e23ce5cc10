//! Automation rule execution
//!
//! Subscribes to the event bus for event-bound rules and runs an interval
//! ticker for scheduled ones. Every invocation is recorded as an
//! `AutomationRun`; a failure sets `last_error` on the rule but never
//! deactivates it. At most one run per rule is in flight at a time: an
//! event trigger arriving mid-run is coalesced into one queued re-run,
//! a scheduled overlap defers to the next tick.

use crate::automation::matcher;
use crate::automation::schedule::{self, ScheduleSpec};
use crate::bus::{Event, EventSubscriber};
use crate::modules::{ModuleContext, ModuleRegistry};
use async_trait::async_trait;
use chrono::Utc;
use opsdesk_common::config::AutomationConfig;
use opsdesk_common::types::{RuleId, RunStatus};
use opsdesk_common::Result;
use opsdesk_storage::models::AutomationRule;
use opsdesk_storage::repository::{AutomationRepository, NewRun, RulePatch};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

struct Flight {
    queued: Option<Value>,
}

/// Automation engine
pub struct AutomationEngine {
    rules: AutomationRepository,
    modules: Arc<ModuleRegistry>,
    config: AutomationConfig,
    in_flight: Mutex<HashMap<RuleId, Flight>>,
}

impl AutomationEngine {
    /// Create the engine
    pub fn new(
        rules: AutomationRepository,
        modules: Arc<ModuleRegistry>,
        config: AutomationConfig,
    ) -> Self {
        Self {
            rules,
            modules,
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn spec_for(rule: &AutomationRule) -> ScheduleSpec<'_> {
        ScheduleSpec {
            cadence: rule.cadence.as_deref(),
            cron_expression: rule.cron_expression.as_deref(),
            scheduled_time: rule.scheduled_time,
            run_once: rule.run_once,
        }
    }

    /// Recompute `next_run_at` for every active scheduled rule. Called at
    /// process start so timers survive restarts.
    pub async fn reload_schedules(&self) -> Result<()> {
        let rules = self.rules.list_active_scheduled().await?;
        info!(count = rules.len(), "Reloading automation schedules");

        for rule in rules {
            match schedule::next_run(&Self::spec_for(&rule), Utc::now()) {
                Ok(next) => {
                    let patch = RulePatch {
                        next_run_at: Some(next),
                        ..Default::default()
                    };
                    if let Err(e) = self.rules.update(rule.id, &patch).await {
                        error!(rule = %rule.id, "Failed to store next run: {}", e);
                    }
                }
                Err(e) => {
                    warn!(rule = %rule.id, name = %rule.name, "Unschedulable rule: {}", e);
                }
            }
        }

        Ok(())
    }

    /// Ticker loop firing due scheduled rules. Runs until aborted.
    pub async fn run_scheduler(self: Arc<Self>) {
        let mut ticker = interval(Duration::from_secs(self.config.tick_interval_secs.max(1)));
        info!(
            interval_secs = self.config.tick_interval_secs,
            "Automation scheduler started"
        );

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!("Automation tick failed: {}", e);
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let due = self.rules.list_due_scheduled(Utc::now()).await?;

        for rule in due {
            let context = json!({
                "rule_id": rule.id,
                "rule_name": rule.name,
                "scheduled": true,
            });
            self.execute(rule, context, false).await;
        }

        Ok(())
    }

    /// Run a rule, honouring the one-run-per-rule policy. `coalesce`
    /// queues the trigger behind an in-flight run (event-bound); without
    /// it an overlap is simply dropped, deferring to the next tick.
    async fn execute(&self, rule: AutomationRule, context: Value, coalesce: bool) {
        {
            let mut flights = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(flight) = flights.get_mut(&rule.id) {
                if coalesce {
                    debug!(rule = %rule.id, "Run in flight; trigger coalesced");
                    flight.queued = Some(context);
                } else {
                    debug!(rule = %rule.id, "Run in flight; deferring to next tick");
                }
                return;
            }
            flights.insert(rule.id, Flight { queued: None });
        }

        let mut current = context;
        loop {
            self.run_rule(&rule, current).await;

            let queued = {
                let mut flights = self
                    .in_flight
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                match flights.get_mut(&rule.id).and_then(|f| f.queued.take()) {
                    Some(next) => Some(next),
                    None => {
                        flights.remove(&rule.id);
                        None
                    }
                }
            };

            let Some(next) = queued else { break };

            // The rule may have been deactivated while we ran
            match self.rules.get(rule.id).await {
                Ok(Some(fresh)) if fresh.is_active() => current = next,
                _ => {
                    self.record_skipped(rule.id).await;
                    self.in_flight
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .remove(&rule.id);
                    break;
                }
            }
        }
    }

    /// A coalesced trigger found its rule deactivated; the drop still
    /// shows up in the run history.
    async fn record_skipped(&self, rule_id: RuleId) {
        let now = Utc::now();
        let run = NewRun {
            rule_id,
            status: RunStatus::Skipped.as_str().to_string(),
            started_at: now,
            finished_at: now,
            result_payload: None,
            error_message: Some("Rule deactivated; coalesced trigger skipped".to_string()),
        };

        if let Err(e) = self.rules.record_run(run, None, false).await {
            error!(rule = %rule_id, "Failed to record skipped run: {}", e);
        }
    }

    async fn run_rule(&self, rule: &AutomationRule, context: Value) {
        let started = Utc::now();
        let ctx = ModuleContext { trigger: context };

        debug!(rule = %rule.id, module = %rule.action_module, "Running automation rule");

        let outcome = self
            .modules
            .execute(&rule.action_module, &rule.action_payload, &ctx)
            .await;

        let finished = Utc::now();
        let elapsed_secs = (finished - started).num_seconds().max(0) as u64;

        let (status, result_payload, error_message) = match outcome {
            // The deadline is cooperative: a slow run completes but is
            // recorded as a failure.
            Ok(value) if elapsed_secs > self.config.soft_deadline_secs => (
                RunStatus::Failed,
                Some(value),
                Some(format!(
                    "Run exceeded the {}s soft deadline ({}s)",
                    self.config.soft_deadline_secs, elapsed_secs
                )),
            ),
            Ok(value) => (RunStatus::Succeeded, Some(value), None),
            Err(e) => (RunStatus::Failed, None, Some(e.to_string())),
        };

        let succeeded = status == RunStatus::Succeeded;
        if let Some(err) = &error_message {
            warn!(rule = %rule.id, name = %rule.name, "Automation run failed: {}", err);
        }

        let next_run_at = if rule.kind == "scheduled" {
            if rule.run_once {
                // A failed run-once rule keeps its slot and retries
                if succeeded { None } else { rule.next_run_at }
            } else {
                match schedule::next_run(&Self::spec_for(rule), finished) {
                    Ok(next) => next,
                    Err(e) => {
                        warn!(rule = %rule.id, "Cannot reschedule: {}", e);
                        None
                    }
                }
            }
        } else {
            None
        };

        let deactivate = rule.run_once && succeeded;

        let run = NewRun {
            rule_id: rule.id,
            status: status.as_str().to_string(),
            started_at: started,
            finished_at: finished,
            result_payload,
            error_message,
        };

        if let Err(e) = self.rules.record_run(run, next_run_at, deactivate).await {
            error!(rule = %rule.id, "Failed to record automation run: {}", e);
        }
    }
}

#[async_trait]
impl EventSubscriber for AutomationEngine {
    fn name(&self) -> &'static str {
        "automation"
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let event_type = event.event_type.as_str();
        let candidates = self.rules.list_event_rules(event_type).await?;

        for rule in candidates {
            if !matcher::rule_matches(&rule, event_type, &event.payload) {
                continue;
            }
            debug!(rule = %rule.id, event = event_type, "Rule matched event");
            self.execute(rule, event.payload.clone(), true).await;
        }

        Ok(())
    }
}
