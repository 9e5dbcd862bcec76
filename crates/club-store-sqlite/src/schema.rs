//! SQL schema for the 1% Club SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    uid             TEXT PRIMARY KEY,
    email           TEXT,
    display_name    TEXT,
    first_name      TEXT,
    last_name       TEXT,
    photo_url       TEXT,
    email_verified  INTEGER NOT NULL DEFAULT 0,
    use_case        TEXT,            -- 'Personal Growth' | 'Professional Growth' | 'Own Business Growth'
    goal            TEXT,            -- 'Sustainable growth' | 'Rapid growth'
    context         TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- One row per user per local calendar day.
CREATE TABLE IF NOT EXISTS crew_responses (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_uid        TEXT NOT NULL REFERENCES users(uid),
    request_context TEXT,
    request_goal    TEXT,
    response_data   TEXT NOT NULL,   -- opaque JSON
    created_at      TEXT NOT NULL,
    created_on      TEXT NOT NULL,   -- YYYY-MM-DD, local day of created_at
    updated_at      TEXT,            -- NULL until a same-day rewrite
    UNIQUE (user_uid, created_on)
);

CREATE TABLE IF NOT EXISTS journal_entries (
    id                         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_uid                   TEXT NOT NULL,
    entry_date                 TEXT NOT NULL,   -- YYYY-MM-DD
    content                    TEXT NOT NULL,
    word_count                 INTEGER NOT NULL DEFAULT 0,
    is_queued                  INTEGER NOT NULL DEFAULT 0,
    is_processed_for_solutions INTEGER NOT NULL DEFAULT 0,
    queued_at                  TEXT,
    created_at                 TEXT NOT NULL,
    updated_at                 TEXT NOT NULL,
    UNIQUE (user_uid, entry_date)
);

-- Solutions are never updated. Deleting an entry deletes its solutions.
CREATE TABLE IF NOT EXISTS solutions (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    user_uid         TEXT NOT NULL,
    entry_date       TEXT NOT NULL,
    journal_entry_id INTEGER NOT NULL REFERENCES journal_entries(id) ON DELETE CASCADE,
    solution         TEXT NOT NULL,   -- opaque JSON
    created_at       TEXT NOT NULL
);

-- No user foreign key: the 'default_template' row has no user.
CREATE TABLE IF NOT EXISTS journal_questions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_uid    TEXT NOT NULL,
    entry_date  TEXT NOT NULL,
    questions   TEXT NOT NULL,   -- JSON array of {id, question, options}
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (user_uid, entry_date)
);

CREATE INDEX IF NOT EXISTS journal_entries_date_idx      ON journal_entries(entry_date, is_processed_for_solutions);
CREATE INDEX IF NOT EXISTS journal_entries_queued_idx    ON journal_entries(is_queued, queued_at);
CREATE INDEX IF NOT EXISTS solutions_user_idx            ON solutions(user_uid, entry_date);
CREATE INDEX IF NOT EXISTS crew_responses_created_on_idx ON crew_responses(created_on);

PRAGMA user_version = 1;
";
