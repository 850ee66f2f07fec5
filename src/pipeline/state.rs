// src/pipeline/state.rs

use std::fmt;

use serde::Serialize;

use crate::models::Stage;

/// Progress of one pipeline run.
///
/// ```text
/// Init -> SchemaReady -> Staged -> Transformed -> Done
///   \________\______________\__________\-------> Failed
/// ```
///
/// There is no resume from `Failed`. A new run starts again at `Init`, and
/// the drop/create schema stage discards whatever the failed run left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    SchemaReady,
    Staged,
    Transformed,
    Done,
    Failed { stage: Stage, error: String },
}

impl PipelineState {
    /// The state reached when the pending stage succeeds.
    pub fn successor(&self) -> Option<PipelineState> {
        match self {
            PipelineState::Init => Some(PipelineState::SchemaReady),
            PipelineState::SchemaReady => Some(PipelineState::Staged),
            PipelineState::Staged => Some(PipelineState::Transformed),
            PipelineState::Transformed => Some(PipelineState::Done),
            PipelineState::Done | PipelineState::Failed { .. } => None,
        }
    }

    /// Stage that runs when leaving this state, if any.
    pub fn pending_stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Init => Some(Stage::Schema),
            PipelineState::SchemaReady => Some(Stage::Staging),
            PipelineState::Staged => Some(Stage::Transform),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed { .. })
    }

    pub(crate) fn advance(&mut self) {
        if let Some(next) = self.successor() {
            log::info!("Pipeline state: {} -> {}", self, next);
            *self = next;
        }
    }

    pub(crate) fn fail(&mut self, stage: Stage, error: impl fmt::Display) {
        if !self.is_terminal() {
            *self = PipelineState::Failed {
                stage,
                error: error.to_string(),
            };
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Init => f.write_str("INIT"),
            PipelineState::SchemaReady => f.write_str("SCHEMA_READY"),
            PipelineState::Staged => f.write_str("STAGED"),
            PipelineState::Transformed => f.write_str("TRANSFORMED"),
            PipelineState::Done => f.write_str("DONE"),
            PipelineState::Failed { stage, .. } => write!(f, "FAILED({stage})"),
        }
    }
}
