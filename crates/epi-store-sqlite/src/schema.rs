//! SQL schema for the metrics SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.
//!
//! Fact uniqueness is conditional on `force_write = 0`, expressed as partial
//! unique indexes. Nullable key columns are wrapped in `IFNULL` so that two
//! rows with a NULL `embargo` still collide.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- ── Dimensions ──────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS themes (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS sub_themes (
    id        INTEGER PRIMARY KEY,
    name      TEXT    NOT NULL,
    theme_id  INTEGER NOT NULL REFERENCES themes(id),
    UNIQUE (name, theme_id)
);

CREATE TABLE IF NOT EXISTS topics (
    id            INTEGER PRIMARY KEY,
    name          TEXT    NOT NULL,
    sub_theme_id  INTEGER NOT NULL REFERENCES sub_themes(id),
    UNIQUE (name, sub_theme_id)
);

CREATE TABLE IF NOT EXISTS metric_groups (
    id        INTEGER PRIMARY KEY,
    name      TEXT    NOT NULL,
    topic_id  INTEGER NOT NULL REFERENCES topics(id),
    UNIQUE (name, topic_id)
);

CREATE TABLE IF NOT EXISTS metrics (
    id               INTEGER PRIMARY KEY,
    name             TEXT    NOT NULL,
    topic_id         INTEGER NOT NULL REFERENCES topics(id),
    metric_group_id  INTEGER NOT NULL REFERENCES metric_groups(id),
    UNIQUE (name, topic_id, metric_group_id)
);

CREATE TABLE IF NOT EXISTS geography_types (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS geographies (
    id                 INTEGER PRIMARY KEY,
    name               TEXT    NOT NULL,
    geography_code     TEXT    CHECK (geography_code IS NULL OR length(geography_code) <= 9),
    geography_type_id  INTEGER NOT NULL REFERENCES geography_types(id),
    UNIQUE (name, geography_type_id)
);

CREATE TABLE IF NOT EXISTS ages (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS strata (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE
);

-- ── Facts (insert-only) ─────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS core_time_series (
    id                         INTEGER PRIMARY KEY,
    metric_id                  INTEGER NOT NULL REFERENCES metrics(id),
    geography_id               INTEGER NOT NULL REFERENCES geographies(id),
    stratum_id                 INTEGER NOT NULL REFERENCES strata(id),
    age_id                     INTEGER NOT NULL REFERENCES ages(id),
    sex                        TEXT    NOT NULL,   -- 'm' | 'f' | 'all'
    metric_frequency           TEXT    NOT NULL,   -- 'D' | 'W' | 'M' | 'Q' | 'Y'
    year                       INTEGER NOT NULL,
    month                      INTEGER,
    epiweek                    INTEGER NOT NULL,
    date                       TEXT    NOT NULL,   -- YYYY-MM-DD
    metric_value               REAL    NOT NULL,   -- rounded to 4 dp
    refresh_date               TEXT    NOT NULL,   -- RFC 3339, fixed width
    embargo                    TEXT,
    in_reporting_delay_period  INTEGER NOT NULL DEFAULT 0,
    is_public                  INTEGER NOT NULL DEFAULT 1,
    force_write                INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS core_time_series_unique ON core_time_series (
    metric_id, geography_id, stratum_id, age_id, sex, year, IFNULL(month, -1),
    epiweek, date, metric_value, in_reporting_delay_period, IFNULL(embargo, '')
) WHERE force_write = 0;

CREATE INDEX IF NOT EXISTS core_time_series_lookup_idx
    ON core_time_series (metric_id, geography_id, date);

CREATE TABLE IF NOT EXISTS core_headlines (
    id                INTEGER PRIMARY KEY,
    metric_id         INTEGER NOT NULL REFERENCES metrics(id),
    geography_id      INTEGER NOT NULL REFERENCES geographies(id),
    stratum_id        INTEGER NOT NULL REFERENCES strata(id),
    age_id            INTEGER NOT NULL REFERENCES ages(id),
    sex               TEXT    NOT NULL,
    refresh_date      TEXT    NOT NULL,
    embargo           TEXT,
    period_start      TEXT    NOT NULL,
    period_end        TEXT    NOT NULL,
    metric_value      REAL    NOT NULL,
    upper_confidence  REAL,
    lower_confidence  REAL,
    is_public         INTEGER NOT NULL DEFAULT 1,
    force_write       INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS core_headlines_unique ON core_headlines (
    metric_id, geography_id, stratum_id, age_id, sex, period_start, period_end,
    metric_value, IFNULL(embargo, '')
) WHERE force_write = 0;

CREATE INDEX IF NOT EXISTS core_headlines_lookup_idx
    ON core_headlines (metric_id, geography_id, refresh_date);

-- Flat projection of core_time_series served by the public API.
CREATE TABLE IF NOT EXISTS api_time_series (
    id                         INTEGER PRIMARY KEY,
    theme                      TEXT    NOT NULL,
    sub_theme                  TEXT    NOT NULL,
    topic                      TEXT    NOT NULL,
    metric                     TEXT    NOT NULL,
    metric_group               TEXT    NOT NULL,
    metric_frequency           TEXT    NOT NULL,
    geography_type             TEXT    NOT NULL,
    geography                  TEXT    NOT NULL,
    geography_code             TEXT,
    stratum                    TEXT    NOT NULL,
    age                        TEXT    NOT NULL,
    sex                        TEXT    NOT NULL,
    year                       INTEGER NOT NULL,
    month                      INTEGER,
    epiweek                    INTEGER NOT NULL,
    date                       TEXT    NOT NULL,
    metric_value               REAL    NOT NULL,
    refresh_date               TEXT    NOT NULL,
    embargo                    TEXT,
    in_reporting_delay_period  INTEGER NOT NULL DEFAULT 0,
    is_public                  INTEGER NOT NULL DEFAULT 1,
    force_write                INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS api_time_series_unique ON api_time_series (
    metric, topic, geography, geography_type, stratum, age, sex, year,
    IFNULL(month, -1), epiweek, date, metric_value, in_reporting_delay_period,
    IFNULL(embargo, '')
) WHERE force_write = 0;

CREATE INDEX IF NOT EXISTS api_time_series_lookup_idx
    ON api_time_series (theme, sub_theme, topic, geography_type, geography, metric, date);

-- ── Access control ──────────────────────────────────────────────────────

-- Dimension names, NULL meaning wildcard.
CREATE TABLE IF NOT EXISTS rbac_permissions (
    id              INTEGER PRIMARY KEY,
    name            TEXT NOT NULL UNIQUE,
    theme           TEXT NOT NULL,
    sub_theme       TEXT,
    topic           TEXT,
    metric          TEXT,
    geography_type  TEXT,
    geography       TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS rbac_permissions_unique ON rbac_permissions (
    theme, IFNULL(sub_theme, ''), IFNULL(topic, ''), IFNULL(metric, ''),
    IFNULL(geography_type, ''), IFNULL(geography, '')
);

CREATE TABLE IF NOT EXISTS rbac_groups (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS rbac_group_permissions (
    group_id       INTEGER NOT NULL REFERENCES rbac_groups(id),
    permission_id  INTEGER NOT NULL REFERENCES rbac_permissions(id),
    PRIMARY KEY (group_id, permission_id)
);

PRAGMA user_version = 1;
";
