//! Step Registry
//!
//! The fixed, ordered list of analysis steps. Each step maps to a remote
//! endpoint and a rule for building its request body. One step (AI insight)
//! consumes the result of another (performance) and refuses to build a
//! request until that prerequisite has succeeded.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{StepKind, StepState};
use crate::store::StepStore;

/// Raised when a dependent step's prerequisite did not succeed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("prerequisite not satisfied: {prerequisite} must succeed before {step}")]
pub struct DependencyUnmet {
    pub step: StepKind,
    pub prerequisite: StepKind,
}

/// Name of the field carrying the target host in a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetField {
    /// `{ "target": host }`
    Target,
    /// `{ "domain": host }`
    Domain,
}

impl TargetField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetField::Target => "target",
            TargetField::Domain => "domain",
        }
    }
}

/// Registry of analysis steps and their request rules.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    /// Administratively disabled steps, skipped regardless of user selection
    disabled: BTreeSet<StepKind>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the administrative skip list via builder pattern.
    pub fn with_disabled(mut self, disabled: impl IntoIterator<Item = StepKind>) -> Self {
        self.disabled = disabled.into_iter().collect();
        self
    }

    /// All registered steps in execution order.
    pub fn steps_in_order(&self) -> &'static [StepKind] {
        &StepKind::ALL
    }

    pub fn is_disabled(&self, kind: StepKind) -> bool {
        self.disabled.contains(&kind)
    }

    /// Remote endpoint path for a step.
    pub fn endpoint(&self, kind: StepKind) -> &'static str {
        match kind {
            StepKind::Performance => "/api/performance",
            StepKind::Uptime => "/api/uptime",
            StepKind::Certificate => "/api/ssl",
            StepKind::Dns => "/api/dns",
            StepKind::Sitemap => "/api/sitemap",
            StepKind::AiInsight => "/api/ai-analysis",
            StepKind::LinkCheck => "/api/links",
            StepKind::Typography => "/api/typography",
        }
    }

    /// Field the remote service expects the host in.
    pub fn target_field(&self, kind: StepKind) -> TargetField {
        match kind {
            StepKind::Certificate | StepKind::Dns => TargetField::Domain,
            _ => TargetField::Target,
        }
    }

    /// Step whose successful result must be embedded in this step's request.
    pub fn prerequisite(&self, kind: StepKind) -> Option<StepKind> {
        match kind {
            StepKind::AiInsight => Some(StepKind::Performance),
            _ => None,
        }
    }

    /// Registry order restricted to `selected`. `None` and an empty
    /// selection both mean every step.
    ///
    /// Input order and duplicates in `selected` are ignored.
    pub fn plan(&self, selected: Option<&[StepKind]>) -> Vec<StepKind> {
        match selected {
            Some(selected) if !selected.is_empty() => self
                .steps_in_order()
                .iter()
                .copied()
                .filter(|kind| selected.contains(kind))
                .collect(),
            _ => self.steps_in_order().to_vec(),
        }
    }

    /// Build the JSON request body for a step.
    ///
    /// `store` must reflect the latest state of the current run so the
    /// dependent step sees its prerequisite's freshly written result.
    pub fn build_request(
        &self,
        kind: StepKind,
        target: &str,
        store: &StepStore,
    ) -> Result<Value, DependencyUnmet> {
        let mut body = Map::new();
        body.insert(
            self.target_field(kind).as_str().to_string(),
            Value::String(target.to_string()),
        );

        if let Some(prerequisite) = self.prerequisite(kind) {
            let status = store.get(prerequisite);
            match (&status.state, &status.result) {
                (StepState::Success, Some(prior)) => {
                    body.insert("prompt".to_string(), Value::String(insight_prompt(target)));
                    body.insert("priorResult".to_string(), prior.clone());
                }
                _ => {
                    return Err(DependencyUnmet {
                        step: kind,
                        prerequisite,
                    })
                }
            }
        }

        Ok(Value::Object(body))
    }
}

fn insight_prompt(target: &str) -> String {
    format!(
        "Analyze the performance report for {} and list the most impactful improvements, \
         ordered by expected gain.",
        target
    )
}
