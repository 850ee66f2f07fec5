// src/models/table.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Warehouse tables managed by the pipeline.
///
/// The declaration order is the order the schema manager drops and creates
/// them in: staging tables first, then the fact table, then the dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    StagingEvents,
    StagingSongs,
    Songplays,
    Users,
    Songs,
    Artists,
    Times,
}

impl Table {
    /// All tables in schema order.
    pub const ALL: [Table; 7] = [
        Table::StagingEvents,
        Table::StagingSongs,
        Table::Songplays,
        Table::Users,
        Table::Songs,
        Table::Artists,
        Table::Times,
    ];

    /// Staging tables, in load order.
    pub const STAGING: [Table; 2] = [Table::StagingEvents, Table::StagingSongs];

    /// Dimension tables populated directly from staging.
    pub const STAGED_DIMENSIONS: [Table; 3] = [Table::Users, Table::Songs, Table::Artists];

    /// SQL identifier of the table.
    pub fn name(&self) -> &'static str {
        match self {
            Table::StagingEvents => "staging_events",
            Table::StagingSongs => "staging_songs",
            Table::Songplays => "songplays",
            Table::Users => "users",
            Table::Songs => "songs",
            Table::Artists => "artists",
            Table::Times => "times",
        }
    }

    pub fn is_staging(&self) -> bool {
        matches!(self, Table::StagingEvents | Table::StagingSongs)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named pipeline stage, used for failure attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Provision,
    Schema,
    Staging,
    Transform,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Provision => "provision",
            Stage::Schema => "schema",
            Stage::Staging => "staging",
            Stage::Transform => "transform",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
