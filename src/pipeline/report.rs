// src/pipeline/report.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Table;
use crate::pipeline::PipelineState;

/// Completed versus planned statements for one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageProgress {
    pub completed: usize,
    pub total: usize,
}

impl StageProgress {
    pub fn planned(total: usize) -> Self {
        Self {
            completed: 0,
            total,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

/// What a run did, including how far it got before failing.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub state: PipelineState,
    pub schema: StageProgress,
    pub staging: StageProgress,
    pub transform: StageProgress,
    /// Rows each insert reported as written
    pub rows_inserted: BTreeMap<Table, u64>,
    /// `COUNT(*)` per table after its stage
    pub row_counts: BTreeMap<Table, i64>,
    /// Play events available in staging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_events: Option<i64>,
    /// Play events the fact join dropped for lack of a matching song
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unmatched_events: Option<i64>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            state: PipelineState::Init,
            schema: StageProgress::default(),
            staging: StageProgress::default(),
            transform: StageProgress::default(),
            rows_inserted: BTreeMap::new(),
            row_counts: BTreeMap::new(),
            play_events: None,
            unmatched_events: None,
        }
    }

    /// Log a one-line-per-stage summary.
    pub fn log_summary(&self) {
        log::info!(
            "Run {}: schema {}/{}, staging {}/{}, transform {}/{}",
            self.state,
            self.schema.completed,
            self.schema.total,
            self.staging.completed,
            self.staging.total,
            self.transform.completed,
            self.transform.total
        );
        for (table, count) in &self.row_counts {
            log::info!("    {}: {} rows", table, count);
        }
        if let (Some(plays), Some(unmatched)) = (self.play_events, self.unmatched_events) {
            log::info!("    play events: {} ({} without a matching song)", plays, unmatched);
        }
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
