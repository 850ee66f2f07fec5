// src/sql/tables.rs

//! Table definitions and DDL rendering.

use crate::models::{Dialect, Table};

/// Warehouse column types.
///
/// COPY coerces raw JSON into these types permissively:
/// - `Text`/`Varchar`: any JSON scalar is accepted as text. Values wider than
///   the column are truncated (`TRUNCATECOLUMNS`), and empty or
///   whitespace-only strings load as NULL (`EMPTYASNULL`, `BLANKSASNULL`).
/// - Numeric types: a missing field or JSON `null` loads as NULL. A value that
///   does not parse as a number rejects the row, which counts against
///   `MAXERROR` instead of failing the batch when a budget is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Varchar(u16),
    Integer,
    BigInt,
    Real,
    Double,
    /// Auto-incrementing surrogate key.
    Identity,
}

impl ColumnType {
    fn render(&self, dialect: Dialect) -> String {
        match self {
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Varchar(width) => format!("VARCHAR({width})"),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Real => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Identity => match dialect {
                Dialect::Redshift => "INTEGER IDENTITY(0,1)".to_string(),
                Dialect::Postgres => "INTEGER GENERATED BY DEFAULT AS IDENTITY".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub not_null: bool,
    pub sort_key: bool,
    pub dist_key: bool,
}

impl ColumnDef {
    const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            not_null: false,
            sort_key: false,
            dist_key: false,
        }
    }

    const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    const fn sort_key(mut self) -> Self {
        self.sort_key = true;
        self
    }

    const fn dist_key(mut self) -> Self {
        self.dist_key = true;
        self
    }

    fn render(&self, dialect: Dialect) -> String {
        let mut out = format!("{} {}", self.name, self.ty.render(dialect));
        if self.not_null {
            out.push_str(" NOT NULL");
        }
        if dialect == Dialect::Redshift {
            if self.sort_key {
                out.push_str(" SORTKEY");
            }
            if self.dist_key {
                out.push_str(" DISTKEY");
            }
        }
        out
    }
}

/// Column layout and distribution of one table.
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub table: Table,
    pub columns: &'static [ColumnDef],
    /// Replicate the table to every node (small dimensions).
    pub diststyle_all: bool,
}

use ColumnType::*;

const STAGING_EVENTS: &[ColumnDef] = &[
    ColumnDef::new("artist", Text),
    ColumnDef::new("auth", Varchar(30)),
    ColumnDef::new("first_name", Text),
    ColumnDef::new("gender", Varchar(2)),
    ColumnDef::new("item_in_session", Integer),
    ColumnDef::new("last_name", Text),
    ColumnDef::new("length", Real),
    ColumnDef::new("level", Varchar(15)),
    ColumnDef::new("location", Text),
    ColumnDef::new("method", Varchar(8)),
    ColumnDef::new("page", Varchar(20)),
    ColumnDef::new("registration", Double),
    ColumnDef::new("session_id", Integer),
    ColumnDef::new("song", Text),
    ColumnDef::new("status", Integer),
    ColumnDef::new("ts", BigInt),
    ColumnDef::new("user_agent", Text),
    ColumnDef::new("user_id", Integer),
];

const STAGING_SONGS: &[ColumnDef] = &[
    ColumnDef::new("artist_id", Varchar(30)).not_null(),
    ColumnDef::new("artist_latitude", Double),
    ColumnDef::new("artist_location", Text),
    ColumnDef::new("artist_longitude", Double),
    ColumnDef::new("artist_name", Text),
    ColumnDef::new("duration", Real),
    ColumnDef::new("num_songs", Integer),
    ColumnDef::new("song_id", Text).not_null(),
    ColumnDef::new("title", Text),
    ColumnDef::new("year", Integer),
];

const SONGPLAYS: &[ColumnDef] = &[
    ColumnDef::new("songplay_id", Identity)
        .not_null()
        .sort_key()
        .dist_key(),
    ColumnDef::new("start_time", BigInt),
    ColumnDef::new("user_id", Integer),
    ColumnDef::new("level", Varchar(15)),
    ColumnDef::new("song_id", Text),
    ColumnDef::new("artist_id", Varchar(30)),
    ColumnDef::new("session_id", Integer),
    ColumnDef::new("location", Text),
    ColumnDef::new("user_agent", Text),
];

const USERS: &[ColumnDef] = &[
    ColumnDef::new("user_id", Integer).not_null().sort_key(),
    ColumnDef::new("first_name", Text),
    ColumnDef::new("last_name", Text),
    ColumnDef::new("gender", Varchar(2)),
    ColumnDef::new("level", Varchar(15)),
];

const SONGS: &[ColumnDef] = &[
    ColumnDef::new("song_id", Text).not_null().sort_key(),
    ColumnDef::new("title", Text),
    ColumnDef::new("artist_id", Varchar(30)),
    ColumnDef::new("year", Integer),
    ColumnDef::new("duration", Real),
];

const ARTISTS: &[ColumnDef] = &[
    ColumnDef::new("artist_id", Varchar(30)).not_null().sort_key(),
    ColumnDef::new("name", Text),
    ColumnDef::new("location", Text),
    ColumnDef::new("latitude", Double),
    ColumnDef::new("longitude", Double),
];

const TIMES: &[ColumnDef] = &[
    ColumnDef::new("start_time", BigInt).not_null().sort_key(),
    ColumnDef::new("hour", Integer).not_null(),
    ColumnDef::new("day", Integer).not_null(),
    ColumnDef::new("week", Integer).not_null(),
    ColumnDef::new("month", Integer).not_null(),
    ColumnDef::new("year", Integer).not_null(),
    ColumnDef::new("weekday", Integer).not_null(),
];

/// Layout of `table`.
pub fn definition(table: Table) -> TableDef {
    let (columns, diststyle_all) = match table {
        Table::StagingEvents => (STAGING_EVENTS, false),
        Table::StagingSongs => (STAGING_SONGS, false),
        Table::Songplays => (SONGPLAYS, false),
        Table::Users => (USERS, true),
        Table::Songs => (SONGS, true),
        Table::Artists => (ARTISTS, true),
        Table::Times => (TIMES, true),
    };
    TableDef {
        table,
        columns,
        diststyle_all,
    }
}

pub fn drop_statement(table: Table) -> String {
    format!("DROP TABLE IF EXISTS {};", table.name())
}

pub fn create_statement(table: Table, dialect: Dialect) -> String {
    let def = definition(table);
    let columns = def
        .columns
        .iter()
        .map(|c| format!("    {}", c.render(dialect)))
        .collect::<Vec<_>>()
        .join(",\n");

    let mut sql = format!("CREATE TABLE {} (\n{}\n)", table.name(), columns);
    if def.diststyle_all && dialect == Dialect::Redshift {
        sql.push_str("\nDISTSTYLE ALL");
    }
    sql.push(';');
    sql
}
