//! Table definitions, applied idempotently on every open.
//!
//! Enum columns hold upper-case wire names, list and context columns hold
//! JSON text, timestamps are epoch milliseconds.

pub(crate) const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        slug TEXT UNIQUE NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        field TEXT NOT NULL DEFAULT '',
        visibility TEXT NOT NULL DEFAULT 'PUBLIC',
        status TEXT NOT NULL DEFAULT 'ACTIVE',
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS contributors (
        id TEXT PRIMARY KEY,
        display_name TEXT UNIQUE NOT NULL,
        provider TEXT NOT NULL,
        capabilities TEXT NOT NULL DEFAULT '[]',
        tasks_completed INTEGER NOT NULL DEFAULT 0,
        tokens_contributed INTEGER NOT NULL DEFAULT 0,
        joined_at INTEGER NOT NULL,
        last_active_at INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        parent_id TEXT,
        task_type TEXT NOT NULL,
        priority INTEGER NOT NULL,
        status TEXT NOT NULL,
        depends_on TEXT NOT NULL DEFAULT '[]',
        assigned_to TEXT,
        brief TEXT NOT NULL,
        context TEXT,
        context_markdown TEXT,
        result TEXT,
        saved_state TEXT,
        claimed_at INTEGER,
        lease_expires_at INTEGER,
        created_at INTEGER NOT NULL,
        completed_at INTEGER,
        FOREIGN KEY (project_id) REFERENCES projects(id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status, priority, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id)",
    "CREATE TABLE IF NOT EXISTS pending_findings (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        finding_id TEXT NOT NULL,
        title TEXT NOT NULL,
        confidence TEXT NOT NULL,
        source TEXT NOT NULL,
        implications TEXT NOT NULL DEFAULT '',
        submitted_by TEXT NOT NULL,
        submitted_by_task TEXT NOT NULL,
        attempt INTEGER NOT NULL DEFAULT 1,
        verify_task_ids TEXT NOT NULL DEFAULT '[]',
        status TEXT NOT NULL,
        rejection_context TEXT,
        submitted_at INTEGER NOT NULL,
        resolved_at INTEGER,
        UNIQUE(project_id, finding_id)
    )",
    "CREATE TABLE IF NOT EXISTS verification_votes (
        pending_finding_id TEXT NOT NULL,
        verifier TEXT NOT NULL,
        verdict TEXT NOT NULL,
        notes TEXT NOT NULL DEFAULT '',
        position INTEGER NOT NULL,
        voted_at INTEGER NOT NULL,
        PRIMARY KEY (pending_finding_id, verifier),
        FOREIGN KEY (pending_finding_id) REFERENCES pending_findings(id)
    )",
    "CREATE TABLE IF NOT EXISTS findings (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        finding_id TEXT NOT NULL,
        title TEXT NOT NULL,
        confidence TEXT NOT NULL,
        source TEXT NOT NULL,
        implications TEXT NOT NULL DEFAULT '',
        summary_l0 TEXT,
        summary_l1 TEXT,
        created_by_task TEXT NOT NULL,
        created_by TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE(project_id, finding_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_findings_project ON findings(project_id, created_at)",
    "CREATE TABLE IF NOT EXISTS dead_ends (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        dead_end_id TEXT NOT NULL,
        what TEXT NOT NULL,
        why_failed TEXT NOT NULL,
        iterations_spent INTEGER NOT NULL DEFAULT 0,
        lesson TEXT NOT NULL DEFAULT '',
        created_by_task TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE(project_id, dead_end_id)
    )",
    "CREATE TABLE IF NOT EXISTS hypotheses (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        hypothesis_id TEXT NOT NULL,
        statement TEXT NOT NULL,
        rationale TEXT NOT NULL DEFAULT '',
        test_plan TEXT NOT NULL,
        based_on TEXT NOT NULL DEFAULT '[]',
        status TEXT NOT NULL,
        test_task_id TEXT,
        result TEXT,
        created_by_task TEXT NOT NULL,
        created_by TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        resolved_at INTEGER,
        UNIQUE(project_id, hypothesis_id)
    )",
    "CREATE TABLE IF NOT EXISTS tickets (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        ticket_id TEXT NOT NULL,
        created_by_task TEXT NOT NULL,
        ticket_type TEXT NOT NULL,
        priority TEXT NOT NULL,
        question TEXT NOT NULL,
        context TEXT NOT NULL DEFAULT '',
        routing_tags TEXT NOT NULL DEFAULT '[]',
        status TEXT NOT NULL,
        result TEXT,
        claimed_by TEXT,
        created_at INTEGER NOT NULL,
        resolved_at INTEGER,
        UNIQUE(project_id, ticket_id)
    )",
    "CREATE TABLE IF NOT EXISTS notebook_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id TEXT NOT NULL,
        project_id TEXT NOT NULL,
        contributor_id TEXT,
        entry_type TEXT NOT NULL,
        content TEXT NOT NULL,
        recorded_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_notebook_task ON notebook_entries(task_id)",
    "CREATE TABLE IF NOT EXISTS id_sequences (
        project_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        last_value INTEGER NOT NULL,
        PRIMARY KEY (project_id, kind)
    )",
];
