// src/sql/transform.rs

//! Staging-to-star-schema transforms and data-quality probes.

use crate::models::{DedupPolicy, MatchStrategy, Table};

/// Events that represent a song being played.
const PLAY_EVENT_FILTER: &str = "e.page = 'NextSong'";

impl MatchStrategy {
    /// Join predicate between `staging_events` aliased `events` and
    /// `staging_songs` aliased `songs`.
    ///
    /// Both strategies match free text exactly. Events whose text differs from
    /// the catalog (case, punctuation, featured artists) find no song and
    /// produce no fact row.
    pub fn join_condition(&self, events: &str, songs: &str) -> String {
        let base = format!(
            "{events}.song = {songs}.title AND {events}.artist = {songs}.artist_name"
        );
        match self {
            MatchStrategy::TitleArtist => base,
            MatchStrategy::TitleArtistLength => {
                format!("{base} AND {events}.length = {songs}.duration")
            }
        }
    }
}

/// Source-to-target mapping for a dimension populated from staging.
struct DimensionSpec {
    table: Table,
    source: Table,
    key: &'static str,
    /// `(target column, source expression)`
    columns: &'static [(&'static str, &'static str)],
    /// Column ordering rows by recency, if the source has one.
    freshness: Option<&'static str>,
}

const USERS: DimensionSpec = DimensionSpec {
    table: Table::Users,
    source: Table::StagingEvents,
    key: "user_id",
    columns: &[
        ("user_id", "user_id"),
        ("first_name", "first_name"),
        ("last_name", "last_name"),
        ("gender", "gender"),
        ("level", "level"),
    ],
    freshness: Some("ts"),
};

const SONGS: DimensionSpec = DimensionSpec {
    table: Table::Songs,
    source: Table::StagingSongs,
    key: "song_id",
    columns: &[
        ("song_id", "song_id"),
        ("title", "title"),
        ("artist_id", "artist_id"),
        ("year", "year"),
        ("duration", "duration"),
    ],
    freshness: None,
};

const ARTISTS: DimensionSpec = DimensionSpec {
    table: Table::Artists,
    source: Table::StagingSongs,
    key: "artist_id",
    columns: &[
        ("artist_id", "artist_id"),
        ("name", "artist_name"),
        ("location", "artist_location"),
        ("latitude", "artist_latitude"),
        ("longitude", "artist_longitude"),
    ],
    freshness: None,
};

impl DimensionSpec {
    fn render(&self, dedup: DedupPolicy) -> String {
        let targets = self
            .columns
            .iter()
            .map(|(target, _)| *target)
            .collect::<Vec<_>>()
            .join(", ");
        let projections = self
            .columns
            .iter()
            .map(|(target, source)| {
                if target == source {
                    target.to_string()
                } else {
                    format!("{source} AS {target}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let order = match (dedup, self.freshness) {
            (DedupPolicy::Latest, Some(column)) => format!(" ORDER BY {column} DESC NULLS LAST"),
            _ => String::new(),
        };

        format!(
            "INSERT INTO {table} ({targets})\n\
             SELECT DISTINCT {targets}\n\
             FROM (\n    \
                 SELECT {projections},\n           \
                        ROW_NUMBER() OVER (PARTITION BY {key}{order}) AS row_rank\n    \
                 FROM {source}\n    \
                 WHERE {key} IS NOT NULL\n\
             ) ranked\n\
             WHERE row_rank = 1;",
            table = self.table.name(),
            key = self.key,
            source = self.source.name(),
        )
    }
}

/// Fact insert: one row per distinct play event that matches a song.
pub fn songplays_insert(strategy: MatchStrategy) -> String {
    format!(
        "INSERT INTO songplays (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)\n\
         SELECT DISTINCT e.ts, e.user_id, e.level, s.song_id, s.artist_id, e.session_id, e.location, e.user_agent\n\
         FROM staging_events e\n\
         JOIN staging_songs s ON {join}\n\
         WHERE {PLAY_EVENT_FILTER};",
        join = strategy.join_condition("e", "s"),
    )
}

/// Dimension insert for users, songs or artists. Returns `None` for other tables.
pub fn dimension_insert(table: Table, dedup: DedupPolicy) -> Option<String> {
    let spec = match table {
        Table::Users => &USERS,
        Table::Songs => &SONGS,
        Table::Artists => &ARTISTS,
        _ => return None,
    };
    Some(spec.render(dedup))
}

/// Calendar decomposition of `songplays.start_time` (epoch milliseconds, UTC).
pub fn times_insert() -> String {
    "INSERT INTO times (start_time, hour, day, week, month, year, weekday)\n\
     SELECT DISTINCT start_time,\n       \
            EXTRACT(hour FROM event_time),\n       \
            EXTRACT(day FROM event_time),\n       \
            EXTRACT(week FROM event_time),\n       \
            EXTRACT(month FROM event_time),\n       \
            EXTRACT(year FROM event_time),\n       \
            EXTRACT(dow FROM event_time)\n\
     FROM (\n    \
         SELECT start_time, TIMESTAMP 'epoch' + (start_time / 1000) * INTERVAL '1 second' AS event_time\n    \
         FROM songplays\n    \
         WHERE start_time IS NOT NULL\n\
     ) decomposed;"
        .to_string()
}

pub fn count_query(table: Table) -> String {
    format!("SELECT COUNT(*) FROM {};", table.name())
}

/// Play events in staging, matched or not.
pub fn play_events_query() -> String {
    format!("SELECT COUNT(*) FROM staging_events e WHERE {PLAY_EVENT_FILTER};")
}

/// Play events the fact join drops because no song matches.
pub fn unmatched_events_query(strategy: MatchStrategy) -> String {
    format!(
        "SELECT COUNT(*) FROM staging_events e\n\
         WHERE {PLAY_EVENT_FILTER}\n  \
           AND NOT EXISTS (SELECT 1 FROM staging_songs s WHERE {join});",
        join = strategy.join_condition("e", "s"),
    )
}
