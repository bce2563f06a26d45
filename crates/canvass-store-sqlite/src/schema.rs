//! SQL schema for the Canvass SQLite databases.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Feedback store DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const STORE_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS divisions (
    division_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    semester    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS students (
    student_id    TEXT PRIMARY KEY,
    division_id   TEXT NOT NULL REFERENCES divisions(division_id),
    name          TEXT NOT NULL,
    email         TEXT NOT NULL,
    enrollment_no TEXT NOT NULL,
    is_deleted    INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS forms (
    form_id               TEXT PRIMARY KEY,
    title                 TEXT NOT NULL,
    division_id           TEXT NOT NULL REFERENCES divisions(division_id),
    subject_allocation_id TEXT NOT NULL,
    status                TEXT NOT NULL DEFAULT 'DRAFT',  -- 'DRAFT' | 'ACTIVE' | 'CLOSED'
    is_expired            INTEGER NOT NULL DEFAULT 0,
    start_date            TEXT,
    end_date              TEXT,
    created_at            TEXT NOT NULL,                  -- RFC 3339 UTC, fixed width
    is_deleted            INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS questions (
    question_id TEXT PRIMARY KEY,
    form_id     TEXT NOT NULL REFERENCES forms(form_id),
    position    INTEGER NOT NULL,
    text        TEXT NOT NULL,
    kind        TEXT NOT NULL,                            -- 'rating' | 'text'
    is_deleted  INTEGER NOT NULL DEFAULT 0
);

-- At most one override roster per form.
CREATE TABLE IF NOT EXISTS override_rosters (
    roster_id  TEXT PRIMARY KEY,
    form_id    TEXT NOT NULL UNIQUE REFERENCES forms(form_id),
    label      TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS override_members (
    member_id     TEXT PRIMARY KEY,
    roster_id     TEXT NOT NULL REFERENCES override_rosters(roster_id),
    name          TEXT NOT NULL,
    email         TEXT NOT NULL,
    enrollment_no TEXT NOT NULL,
    is_deleted    INTEGER NOT NULL DEFAULT 0
);

-- One credential per (form, recipient kind, recipient). Never deleted.
CREATE TABLE IF NOT EXISTS credentials (
    credential_id  TEXT PRIMARY KEY,
    form_id        TEXT NOT NULL REFERENCES forms(form_id),
    recipient_kind TEXT NOT NULL,                         -- 'student' | 'override'
    recipient_id   TEXT NOT NULL,
    token          TEXT NOT NULL UNIQUE,
    is_submitted   INTEGER NOT NULL DEFAULT 0,
    is_deleted     INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL,
    UNIQUE (form_id, recipient_kind, recipient_id)
);

CREATE TABLE IF NOT EXISTS dispatch_log (
    dispatch_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    form_id       TEXT NOT NULL REFERENCES forms(form_id),
    roster_kind   TEXT NOT NULL,
    recipients    INTEGER NOT NULL,
    enqueued      INTEGER NOT NULL,
    sent_directly INTEGER NOT NULL,
    skipped       INTEGER NOT NULL,
    failed        INTEGER NOT NULL,
    dispatched_at TEXT NOT NULL,
    is_deleted    INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS students_division_idx ON students(division_id);
CREATE INDEX IF NOT EXISTS questions_form_idx    ON questions(form_id);
CREATE INDEX IF NOT EXISTS members_roster_idx    ON override_members(roster_id);
CREATE INDEX IF NOT EXISTS forms_created_idx     ON forms(created_at);
CREATE INDEX IF NOT EXISTS dispatch_form_idx     ON dispatch_log(form_id);

PRAGMA user_version = 1;
";

/// Notification queue DDL.
pub const QUEUE_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS notification_jobs (
    job_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    payload         TEXT NOT NULL,                        -- {\"to\",\"subject\",\"html\"}
    state           TEXT NOT NULL DEFAULT 'pending',      -- 'pending' | 'active' | 'failed'
    attempts        INTEGER NOT NULL DEFAULT 0,
    max_attempts    INTEGER NOT NULL,
    last_error      TEXT,
    enqueued_at     TEXT NOT NULL,
    next_attempt_at TEXT NOT NULL,
    finished_at     TEXT
);

CREATE INDEX IF NOT EXISTS jobs_ready_idx ON notification_jobs(state, next_attempt_at, job_id);

PRAGMA user_version = 1;
";
