//! DDL applied once per connection on open.

/// Pragmas establishing the concurrency posture for the single actor connection.
pub const PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA busy_timeout = 30000;
    PRAGMA foreign_keys = ON;
    PRAGMA synchronous = NORMAL;
";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    job_id          TEXT PRIMARY KEY,
    description     TEXT NOT NULL,
    orchestrator_id TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'active',
    created_at      TEXT NOT NULL,
    completed_at    TEXT,
    metadata        TEXT
);

CREATE TABLE IF NOT EXISTS tasks (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    prompt          TEXT NOT NULL,
    working_dir     TEXT,
    context_files   TEXT NOT NULL DEFAULT '[]',
    expected_outputs TEXT NOT NULL DEFAULT '[]',
    metadata        TEXT,
    priority        INTEGER NOT NULL DEFAULT 0,
    status          TEXT NOT NULL DEFAULT 'pending',
    worker_id       TEXT,
    job_id          TEXT REFERENCES jobs(job_id),
    parent_task_id  INTEGER REFERENCES tasks(id),
    created_at      TEXT NOT NULL,
    claimed_at      TEXT,
    started_at      TEXT,
    completed_at    TEXT,
    result          TEXT,
    error           TEXT,
    last_error      TEXT,
    retry_count     INTEGER NOT NULL DEFAULT 0,
    max_retries     INTEGER NOT NULL DEFAULT 0,
    retry_policy    TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_job_id ON tasks(job_id);
CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_task_id);
CREATE INDEX IF NOT EXISTS idx_tasks_claim_order ON tasks(status, priority DESC, created_at ASC);

CREATE TABLE IF NOT EXISTS workers (
    worker_id       TEXT PRIMARY KEY,
    status          TEXT NOT NULL DEFAULT 'idle',
    current_task_id INTEGER REFERENCES tasks(id),
    started_at      TEXT NOT NULL,
    last_heartbeat  TEXT NOT NULL,
    stats           TEXT
);

CREATE TABLE IF NOT EXISTS task_dependencies (
    task_id         INTEGER NOT NULL REFERENCES tasks(id),
    depends_on_task_id INTEGER NOT NULL REFERENCES tasks(id),
    PRIMARY KEY (task_id, depends_on_task_id)
);

CREATE TABLE IF NOT EXISTS checkpoints (
    task_id         INTEGER PRIMARY KEY REFERENCES tasks(id),
    checkpoint_data TEXT NOT NULL DEFAULT '{}',
    files_created   TEXT NOT NULL DEFAULT '[]',
    files_modified  TEXT NOT NULL DEFAULT '[]',
    last_step       TEXT,
    completion_percentage INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_changes (
    change_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id         INTEGER NOT NULL REFERENCES tasks(id),
    operation       TEXT NOT NULL,
    file_path       TEXT NOT NULL,
    before_content  TEXT,
    after_content   TEXT,
    timestamp       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_changes_task ON task_changes(task_id, change_id);

-- job_id is nullable (NULL means a global, cross-job entry), so uniqueness can't
-- be a plain composite PRIMARY KEY: SQLite treats NULL as distinct from every other
-- value in a unique index, which would let repeated global upserts insert duplicate
-- rows instead of colliding. Index on COALESCE(job_id, '') so NULLs collapse together.
CREATE TABLE IF NOT EXISTS shared_context (
    job_id          TEXT,
    key             TEXT NOT NULL,
    value           TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_shared_context_scope
    ON shared_context(COALESCE(job_id, ''), key);

CREATE TABLE IF NOT EXISTS worker_logs (
    log_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    worker_id       TEXT NOT NULL,
    task_id         INTEGER REFERENCES tasks(id),
    timestamp       TEXT NOT NULL,
    message         TEXT NOT NULL,
    level           TEXT NOT NULL DEFAULT 'info'
);

CREATE INDEX IF NOT EXISTS idx_worker_logs_task ON worker_logs(task_id);
";
