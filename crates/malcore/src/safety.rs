use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Per-execution ceilings on side effects
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionLimits {
    pub max_actions_per_execution: u32,
    pub max_external_writes: u32,
    pub max_contact_actions: u32,
    /// Upper bound for a single node run. `None` waits forever.
    ///
    /// The wait inside `delay` and a `send_email_campaign` with
    /// `delaySeconds` counts against this bound, so a wait longer than the
    /// timeout fails the execution with `NodeError::Timeout`.
    pub node_timeout_secs: Option<u64>,
}

impl ExecutionLimits {
    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_actions_per_execution: 50,
            max_external_writes: 25,
            max_contact_actions: 100,
            node_timeout_secs: None,
        }
    }
}

/// Which counters an action bumps when it succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectClass {
    /// Internal only: logging, notifications, waiting.
    None,
    ExternalWrite,
    /// An external write that changes a contact.
    ContactWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitKind {
    #[serde(rename = "maxActionsPerExecution")]
    MaxActionsPerExecution,
    #[serde(rename = "maxExternalWrites")]
    MaxExternalWrites,
    #[serde(rename = "maxContactActions")]
    MaxContactActions,
}

impl LimitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitKind::MaxActionsPerExecution => "maxActionsPerExecution",
            LimitKind::MaxExternalWrites => "maxExternalWrites",
            LimitKind::MaxContactActions => "maxContactActions",
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LimitKind::MaxActionsPerExecution => "Max actions per execution",
            LimitKind::MaxExternalWrites => "Max external writes",
            LimitKind::MaxContactActions => "Max contact actions",
        };
        f.write_str(text)
    }
}

/// A safety ceiling was hit before an action could run.
#[derive(Error, Debug, Clone)]
#[error("{limit} exceeded ({max})")]
pub struct LimitExceeded {
    pub limit: LimitKind,
    pub max: u32,
    pub metrics: SafetyMetrics,
}

/// Side-effect counters owned by exactly one execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyMetrics {
    pub actions_executed: u32,
    pub external_writes: u32,
    pub contact_actions_performed: u32,
}

impl SafetyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if any counter has already reached its ceiling.
    pub fn check(&self, limits: &ExecutionLimits) -> Result<(), LimitExceeded> {
        let checks = [
            (
                self.actions_executed,
                limits.max_actions_per_execution,
                LimitKind::MaxActionsPerExecution,
            ),
            (
                self.external_writes,
                limits.max_external_writes,
                LimitKind::MaxExternalWrites,
            ),
            (
                self.contact_actions_performed,
                limits.max_contact_actions,
                LimitKind::MaxContactActions,
            ),
        ];

        for (used, max, limit) in checks {
            if used >= max {
                return Err(LimitExceeded {
                    limit,
                    max,
                    metrics: *self,
                });
            }
        }
        Ok(())
    }

    /// Count one successful action of the given class.
    pub fn record(&mut self, effect: EffectClass) {
        match effect {
            EffectClass::None => {}
            EffectClass::ExternalWrite => self.external_writes += 1,
            EffectClass::ContactWrite => {
                self.external_writes += 1;
                self.contact_actions_performed += 1;
            }
        }
        self.actions_executed += 1;
    }
}
