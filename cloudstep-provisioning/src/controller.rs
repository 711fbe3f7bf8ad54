//! Generic provisioning controller
//!
//! One [`Controller`] drives any resource family through its phases. The
//! family-specific knowledge lives in a [`PhasePolicy`]; the controller only
//! sequences decode, supervise, observe, decide and encode for a single
//! invocation.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ControllerConfig;
use crate::context::{ContextCodec, Continuation, PhaseTag, Timing};
use crate::error::{ProvisionError, Result};
use crate::supervisor::{CleanupReport, OverrunCheck, TimeoutSupervisor};
use crate::types::{Operation, Outcome, RawContext};

/// Result of re-fetching remote state.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<R> {
    Found(R),
    /// The control plane answered 404
    Absent,
}

impl<R> Observation<R> {
    pub fn found(self) -> Option<R> {
        match self {
            Observation::Found(remote) => Some(remote),
            Observation::Absent => None,
        }
    }
}

/// What a policy decided after acting.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<P, I, M> {
    /// Wait for `phase` to be reached.
    Continue { phase: P, ids: I, message: String },
    /// The operation is done. Deletes complete without a model.
    Complete { model: Option<M>, message: String },
}

/// Timeout behaviour requested by a time-bounded operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutSettings {
    /// Raw duration string; `None` disables enforcement
    pub budget: Option<String>,
    pub delete_on_timeout: bool,
}

/// Family-specific phases, actions and predicates.
///
/// Each phase has one action (performed by [`PhasePolicy::begin`] or
/// [`PhasePolicy::advance`] when entering it) and one readiness predicate
/// ([`PhasePolicy::is_terminal_success`]).
#[async_trait]
pub trait PhasePolicy: Send + Sync {
    type Model: Clone + Send + Sync;
    type Phase: PhaseTag;
    /// Identifiers needed to re-locate the remote resource, stored in the context
    type Ids: Serialize + DeserializeOwned + Clone + Debug + Send + Sync;
    type Remote: Debug + Send + Sync;

    fn family(&self) -> &'static str;

    fn operation(&self) -> Operation;

    /// Human name used in messages, e.g. "stream processor"
    fn resource_label(&self) -> &'static str;

    /// Self-consistency checks. Must not call the gateway.
    fn validate(&self, model: &Self::Model) -> Result<()>;

    fn timeout_settings(&self, _model: &Self::Model) -> Option<TimeoutSettings> {
        None
    }

    /// Optional read of the current remote state before the first action.
    async fn inspect(&self, _model: &Self::Model) -> Result<Option<Observation<Self::Remote>>> {
        Ok(None)
    }

    /// Reject transitions the control plane cannot perform directly.
    fn validate_transition(&self, _current: Option<&Self::Remote>, _model: &Self::Model) -> Result<()> {
        Ok(())
    }

    /// Perform the opening action.
    async fn begin(
        &self,
        model: &Self::Model,
        current: Option<&Self::Remote>,
    ) -> Result<Transition<Self::Phase, Self::Ids, Self::Model>>;

    /// Re-fetch whatever `phase` polls.
    async fn observe(&self, phase: Self::Phase, ids: &Self::Ids) -> Result<Observation<Self::Remote>>;

    /// Phases that wait for the resource to disappear treat a 404 as reached.
    fn awaits_absence(&self, _phase: Self::Phase) -> bool {
        false
    }

    fn is_terminal_success(&self, phase: Self::Phase, remote: &Self::Remote) -> bool;

    /// `Some(reason)` when the remote state can no longer reach the phase.
    fn is_terminal_failure(&self, phase: Self::Phase, remote: &Self::Remote) -> Option<String>;

    /// Called once `phase` is reached: perform the next phase's action or
    /// complete. `remote` is `None` when an absence-awaiting phase saw a 404.
    async fn advance(
        &self,
        phase: Self::Phase,
        ids: Self::Ids,
        model: &Self::Model,
        remote: Option<&Self::Remote>,
    ) -> Result<Transition<Self::Phase, Self::Ids, Self::Model>>;

    /// Compensating delete after a timeout. Only invoked when
    /// [`PhasePolicy::timeout_settings`] asked for cleanup.
    async fn cleanup(&self, _ids: &Self::Ids) -> Result<()> {
        Ok(())
    }
}

pub struct Controller<P> {
    policy: P,
    supervisor: TimeoutSupervisor,
    config: ControllerConfig,
}

impl<P: PhasePolicy> Controller<P> {
    pub fn new(policy: P, config: ControllerConfig) -> Self {
        Self {
            supervisor: TimeoutSupervisor::new(config.fallback_timeout),
            policy,
            config,
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Perform one unit of work.
    pub async fn step(&self, context: &RawContext, model: &P::Model) -> Outcome<P::Model> {
        self.step_at(context, model, Utc::now()).await
    }

    /// [`Controller::step`] with an explicit clock.
    pub async fn step_at(
        &self,
        context: &RawContext,
        model: &P::Model,
        now: DateTime<Utc>,
    ) -> Outcome<P::Model> {
        match self.try_step(context, model, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    family = self.policy.family(),
                    operation = %self.policy.operation(),
                    category = ?e.category(),
                    "Step failed: {}",
                    e
                );
                Outcome::from_error(&e)
            }
        }
    }

    fn codec(&self) -> ContextCodec {
        ContextCodec::new(self.policy.family(), self.policy.operation())
    }

    async fn try_step(
        &self,
        context: &RawContext,
        model: &P::Model,
        now: DateTime<Utc>,
    ) -> Result<Outcome<P::Model>> {
        match self.codec().decode::<P::Phase, P::Ids>(context)? {
            None => self.first_step(model, now).await,
            Some(continuation) => self.resume(continuation, model, now).await,
        }
    }

    async fn first_step(&self, model: &P::Model, now: DateTime<Utc>) -> Result<Outcome<P::Model>> {
        let policy = &self.policy;
        policy.validate(model)?;

        let current = match policy.inspect(model).await? {
            None => None,
            Some(Observation::Found(remote)) => Some(remote),
            Some(Observation::Absent) if policy.operation() == Operation::Delete => {
                info!(family = policy.family(), "Resource already absent, nothing to delete");
                return Ok(Outcome::Success {
                    model: None,
                    message: format!("{} does not exist", policy.resource_label()),
                });
            }
            Some(Observation::Absent) => {
                return Err(ProvisionError::NotFound(format!(
                    "{} not found",
                    policy.resource_label()
                )));
            }
        };

        policy.validate_transition(current.as_ref(), model)?;

        let timing = policy.timeout_settings(model).map(|settings| Timing {
            started_at: now,
            timeout: settings.budget,
            delete_on_timeout: settings.delete_on_timeout,
        });

        match policy.begin(model, current.as_ref()).await? {
            Transition::Continue { phase, ids, message } => {
                let continuation = Continuation {
                    operation_id: Uuid::new_v4(),
                    phase,
                    ids,
                    timing,
                };
                info!(
                    family = policy.family(),
                    operation = %policy.operation(),
                    operation_id = %continuation.operation_id,
                    phase = phase.as_str(),
                    "{}",
                    message
                );
                self.in_progress(&continuation, message)
            }
            Transition::Complete { model, message } => Ok(Outcome::Success { model, message }),
        }
    }

    async fn resume(
        &self,
        continuation: Continuation<P::Phase, P::Ids>,
        model: &P::Model,
        now: DateTime<Utc>,
    ) -> Result<Outcome<P::Model>> {
        let policy = &self.policy;
        let phase = continuation.phase;

        if let Some(timing) = &continuation.timing {
            if let OverrunCheck::Overrun { elapsed, budget } = self.supervisor.check_overrun(timing, now) {
                warn!(
                    family = policy.family(),
                    operation_id = %continuation.operation_id,
                    phase = phase.as_str(),
                    elapsed_secs = elapsed.as_secs(),
                    budget_secs = budget.as_secs(),
                    "Operation timed out"
                );
                let report = self.cleanup(&continuation).await;
                return Err(ProvisionError::Timeout(self.supervisor.timeout_message(
                    policy.resource_label(),
                    policy.operation(),
                    &report,
                )));
            }
        }

        let remote = match policy.observe(phase, &continuation.ids).await? {
            Observation::Absent if policy.awaits_absence(phase) => None,
            Observation::Absent => {
                return Err(ProvisionError::NotFound(format!(
                    "{} not found while waiting in phase {}",
                    policy.resource_label(),
                    phase.as_str()
                )));
            }
            Observation::Found(remote) => {
                if !policy.is_terminal_success(phase, &remote) {
                    if let Some(reason) = policy.is_terminal_failure(phase, &remote) {
                        return Err(ProvisionError::RemoteFailure(reason));
                    }
                    debug!(
                        family = policy.family(),
                        operation_id = %continuation.operation_id,
                        phase = phase.as_str(),
                        "Phase not reached yet: {:?}",
                        remote
                    );
                    let message = format!(
                        "{} {} in progress ({})",
                        policy.resource_label(),
                        policy.operation().noun(),
                        phase.as_str()
                    );
                    return self.in_progress(&continuation, message);
                }
                Some(remote)
            }
        };

        let ids = continuation.ids.clone();
        match policy.advance(phase, ids, model, remote.as_ref()).await? {
            Transition::Continue { phase: next, ids, message } => {
                info!(
                    family = policy.family(),
                    operation_id = %continuation.operation_id,
                    from = phase.as_str(),
                    to = next.as_str(),
                    "{}",
                    message
                );
                let continuation = continuation.advance(next, ids);
                self.in_progress(&continuation, message)
            }
            Transition::Complete { model, message } => {
                info!(
                    family = policy.family(),
                    operation_id = %continuation.operation_id,
                    "{}",
                    message
                );
                Ok(Outcome::Success { model, message })
            }
        }
    }

    async fn cleanup(&self, continuation: &Continuation<P::Phase, P::Ids>) -> CleanupReport {
        let delete_on_timeout = continuation
            .timing
            .as_ref()
            .map_or(false, |timing| timing.delete_on_timeout);
        if !delete_on_timeout {
            return CleanupReport::NotAttempted;
        }
        match self.policy.cleanup(&continuation.ids).await {
            Ok(()) => CleanupReport::Deleted,
            Err(e) => {
                warn!(
                    family = self.policy.family(),
                    operation_id = %continuation.operation_id,
                    "Cleanup after timeout failed: {}",
                    e
                );
                CleanupReport::Failed(e.to_string())
            }
        }
    }

    fn in_progress(
        &self,
        continuation: &Continuation<P::Phase, P::Ids>,
        message: String,
    ) -> Result<Outcome<P::Model>> {
        Ok(Outcome::InProgress {
            context: self.codec().encode(continuation)?,
            delay: self.config.poll_delay,
            message,
        })
    }
}
