// src/models/options.rs

//! Behavioural switches carried in the `PIPELINE` config section.

use serde::{Deserialize, Serialize};

/// SQL flavour statements are rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Amazon Redshift: distribution/sort keys and S3 COPY.
    #[default]
    Redshift,
    /// Plain PostgreSQL, without distribution clauses or S3 COPY.
    Postgres,
}

/// How play events are matched to songs for the fact table.
///
/// Log events carry no song or artist IDs, only free text, so every
/// strategy is a text match against the song catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Exact match on song title and artist name.
    #[default]
    TitleArtist,
    /// Title, artist name and track length must all match.
    TitleArtistLength,
}

/// Which staging row wins when several share a dimension key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// One row per key, chosen by the engine. Non-deterministic.
    #[default]
    Arbitrary,
    /// Prefer the most recent row where the source has a freshness column.
    Latest,
}
