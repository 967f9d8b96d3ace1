// Typed request union, validated at the boundary before reaching the engine

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::classification::{non_blank, parse_observation_date, Classify};
use super::engine::{MoveWorkflow, SetObservationPriority, SetPrincipalInvestigator};
use super::errors::{WorkflowAxis, WorkflowError};
use super::priority::PriorityChange;
use super::state_machine::{parse_awl, WorkflowPolicy};
use super::types::{MarshallWorkflowLocation, TransientId};

/// One inbound triage request, as submitted by the web client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum TriageRequest {
    MoveWorkflow {
        transient_id: TransientId,
        #[serde(default)]
        mwl: Option<String>,
        #[serde(default)]
        awl: Option<String>,
        #[serde(default)]
        snoozed: bool,
    },
    SetPi {
        transient_id: TransientId,
        pi_name: String,
        pi_email: String,
    },
    SetPriority {
        transient_id: TransientId,
        observation_priority: String,
    },
    Classify {
        transient_id: TransientId,
        observation_date: String,
        source: String,
        spectral_type: String,
        #[serde(default)]
        sub_type: Option<String>,
        #[serde(default)]
        redshift: Option<String>,
        #[serde(default)]
        classification_wrt_max: Option<String>,
        #[serde(default)]
        phase: Option<String>,
        #[serde(default)]
        peculiar: bool,
    },
    /// Payload carried nothing this core acts on
    Noop { transient_id: TransientId },
}

/// Validated request, ready for the engine
#[derive(Debug, Clone, PartialEq)]
pub enum TriageCommand {
    MoveWorkflow(MoveWorkflow),
    SetPrincipalInvestigator(SetPrincipalInvestigator),
    SetObservationPriority(SetObservationPriority),
    Classify(Classify),
    Noop(TransientId),
}

impl TriageRequest {
    pub fn transient_id(&self) -> TransientId {
        match self {
            TriageRequest::MoveWorkflow { transient_id, .. }
            | TriageRequest::SetPi { transient_id, .. }
            | TriageRequest::SetPriority { transient_id, .. }
            | TriageRequest::Classify { transient_id, .. }
            | TriageRequest::Noop { transient_id } => *transient_id,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            TriageRequest::MoveWorkflow { .. } => "move_workflow",
            TriageRequest::SetPi { .. } => "set_pi",
            TriageRequest::SetPriority { .. } => "set_priority",
            TriageRequest::Classify { .. } => "classify",
            TriageRequest::Noop { .. } => "noop",
        }
    }

    /// Check every field and convert to a typed command
    pub fn validate(self, policy: &WorkflowPolicy) -> Result<TriageCommand, WorkflowError> {
        match self {
            TriageRequest::MoveWorkflow {
                transient_id,
                mwl,
                awl,
                snoozed,
            } => {
                let mwl = mwl
                    .map(|raw| {
                        MarshallWorkflowLocation::parse(&raw).ok_or(WorkflowError::InvalidTarget {
                            axis: WorkflowAxis::Marshall,
                            value: raw,
                        })
                    })
                    .transpose()?;
                let awl = awl.map(|raw| parse_awl(&raw, policy)).transpose()?;
                if mwl.is_none() && awl.is_none() {
                    return Err(WorkflowError::validation("no workflow location requested"));
                }
                Ok(TriageCommand::MoveWorkflow(MoveWorkflow {
                    transient_id,
                    mwl,
                    awl,
                    snooze: snoozed,
                }))
            }
            TriageRequest::SetPi {
                transient_id,
                pi_name,
                pi_email,
            } => {
                let pi_name = non_blank(Some(&pi_name))
                    .ok_or_else(|| WorkflowError::validation("piName must not be blank"))?;
                let pi_email = non_blank(Some(&pi_email))
                    .ok_or_else(|| WorkflowError::validation("piEmail must not be blank"))?;
                Ok(TriageCommand::SetPrincipalInvestigator(SetPrincipalInvestigator {
                    transient_id,
                    pi_name,
                    pi_email,
                }))
            }
            TriageRequest::SetPriority {
                transient_id,
                observation_priority,
            } => Ok(TriageCommand::SetObservationPriority(SetObservationPriority {
                transient_id,
                priority: PriorityChange::parse(&observation_priority)?,
            })),
            TriageRequest::Classify {
                transient_id,
                observation_date,
                source,
                spectral_type,
                sub_type,
                redshift,
                classification_wrt_max,
                phase,
                peculiar,
            } => {
                let source = non_blank(Some(&source))
                    .ok_or_else(|| WorkflowError::validation("classification source must not be blank"))?;
                let spectral_type = non_blank(Some(&spectral_type))
                    .ok_or_else(|| WorkflowError::validation("classification type must not be blank"))?;
                let redshift = non_blank(redshift.as_deref())
                    .map(|raw| {
                        raw.parse::<f64>()
                            .ok()
                            .filter(|z| z.is_finite())
                            .ok_or_else(|| WorkflowError::validation(format!("redshift `{raw}` is not a number")))
                    })
                    .transpose()?;
                Ok(TriageCommand::Classify(Classify {
                    transient_id,
                    observation_date: parse_observation_date(&observation_date)?,
                    source,
                    spectral_type,
                    sub_type: non_blank(sub_type.as_deref()),
                    redshift,
                    classification_wrt_max: non_blank(classification_wrt_max.as_deref()),
                    phase: non_blank(phase.as_deref()),
                    peculiar,
                }))
            }
            TriageRequest::Noop { transient_id } => Ok(TriageCommand::Noop(transient_id)),
        }
    }

    /// Interpret the flat key/value payload the marshall web client sends,
    /// with its dispatch precedence: a list move wins over a PI change, which
    /// wins over a priority change, which wins over a classification
    pub fn from_payload(transient_id: TransientId, payload: &Map<String, Value>) -> Result<Self, WorkflowError> {
        if payload.contains_key("mwl") || payload.contains_key("awl") {
            return Ok(TriageRequest::MoveWorkflow {
                transient_id,
                mwl: text(payload, "mwl"),
                awl: text(payload, "awl"),
                snoozed: payload.get("snoozed").is_some_and(|v| !is_false(v)),
            });
        }

        if let (Some(pi_name), Some(pi_email)) = (text(payload, "piName"), text(payload, "piEmail")) {
            return Ok(TriageRequest::SetPi {
                transient_id,
                pi_name,
                pi_email,
            });
        }

        if payload.contains_key("observationPriority") {
            return Ok(TriageRequest::SetPriority {
                transient_id,
                observation_priority: text(payload, "observationPriority").unwrap_or_default(),
            });
        }

        if payload.contains_key("clsType") {
            let required = |key: &str| {
                text(payload, key).ok_or_else(|| WorkflowError::validation(format!("`{key}` is required")))
            };
            return Ok(TriageRequest::Classify {
                transient_id,
                observation_date: required("clsObsdate")?,
                source: required("clsSource")?,
                spectral_type: required("clsType")?,
                sub_type: text(payload, "clsSnClassification"),
                redshift: text(payload, "clsRedshift"),
                classification_wrt_max: text(payload, "clsClassificationWRTMax"),
                phase: text(payload, "clsClassificationPhase"),
                peculiar: payload.get("clsPeculiar").is_some_and(|v| !is_false(v)),
            });
        }

        Ok(TriageRequest::Noop { transient_id })
    }
}

/// Scalar payload value as text; `null` counts as absent
fn text(payload: &Map<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        _ => None,
    }
}

fn is_false(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::Null => true,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "" | "false" | "0" | "off"),
        Value::Number(n) => n.as_i64() == Some(0),
        _ => false,
    }
}
