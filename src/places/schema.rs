//! SQLite schema for the history store

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS moz_origins (
    id INTEGER PRIMARY KEY,
    prefix TEXT NOT NULL,
    host TEXT NOT NULL,
    frecency INTEGER NOT NULL DEFAULT -1,
    recalc_frecency INTEGER NOT NULL DEFAULT 1,
    UNIQUE (prefix, host)
);

CREATE TABLE IF NOT EXISTS moz_places (
    id INTEGER PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    title TEXT,
    origin_id INTEGER NOT NULL REFERENCES moz_origins(id),
    visit_count INTEGER NOT NULL DEFAULT 0,
    typed INTEGER NOT NULL DEFAULT 0,
    last_visit_date INTEGER,
    frecency INTEGER NOT NULL DEFAULT -1,
    recalc_frecency INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS moz_places_originidindex ON moz_places (origin_id);
CREATE INDEX IF NOT EXISTS moz_places_frecencyindex ON moz_places (frecency);
CREATE INDEX IF NOT EXISTS moz_places_recalcfrecencyindex
    ON moz_places (recalc_frecency) WHERE recalc_frecency = 1;

CREATE TABLE IF NOT EXISTS moz_historyvisits (
    id INTEGER PRIMARY KEY,
    place_id INTEGER NOT NULL REFERENCES moz_places(id) ON DELETE CASCADE,
    visit_date INTEGER NOT NULL,
    visit_type INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS moz_historyvisits_placedateindex
    ON moz_historyvisits (place_id, visit_date);

CREATE TABLE IF NOT EXISTS moz_bookmarks (
    id INTEGER PRIMARY KEY,
    fk INTEGER NOT NULL REFERENCES moz_places(id) ON DELETE CASCADE,
    title TEXT,
    date_added INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS moz_bookmarks_itemindex ON moz_bookmarks (fk);

CREATE TABLE IF NOT EXISTS moz_meta (
    key TEXT PRIMARY KEY,
    value NOT NULL
) WITHOUT ROWID;
"#;

/// Meta keys for origin frecency statistics
pub const META_ORIGIN_FRECENCY_COUNT: &str = "origin_frecency_count";
pub const META_ORIGIN_FRECENCY_SUM: &str = "origin_frecency_sum";
pub const META_ORIGIN_FRECENCY_SUM_OF_SQUARES: &str = "origin_frecency_sum_of_squares";
