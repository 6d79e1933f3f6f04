//! Database schema definitions
//!
//! Timestamps are INTEGER Unix milliseconds. Booleans are 0/1 integers.

/// SQL schema for the persistent store
pub const SCHEMA_SQL: &str = r#"
-- One row per profile URL
CREATE TABLE IF NOT EXISTS urls (
    url TEXT PRIMARY KEY,
    host TEXT NOT NULL,
    ip TEXT NOT NULL,
    node INTEGER,
    added INTEGER NOT NULL,
    requested INTEGER,
    fetched INTEGER,
    locked INTEGER,
    refresh INTEGER NOT NULL DEFAULT 0,
    completed INTEGER NOT NULL DEFAULT 0,
    disallowed INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_urls_eligible ON urls(disallowed, failed, completed, refresh);
CREATE INDEX IF NOT EXISTS idx_urls_locked ON urls(locked);
CREATE INDEX IF NOT EXISTS idx_urls_node ON urls(node);
CREATE INDEX IF NOT EXISTS idx_urls_host ON urls(host);
CREATE INDEX IF NOT EXISTS idx_urls_ip ON urls(ip);

-- Throttle record per host; an IP can only belong to one record
CREATE TABLE IF NOT EXISTS hosts (
    host TEXT PRIMARY KEY,
    ip TEXT NOT NULL UNIQUE,
    added INTEGER NOT NULL,
    fetched INTEGER NOT NULL,
    count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_hosts_fetched ON hosts(fetched);

-- Pending callbacks
CREATE TABLE IF NOT EXISTS webhooks (
    hook TEXT NOT NULL,
    url TEXT NOT NULL,
    added INTEGER NOT NULL,
    fired INTEGER,
    PRIMARY KEY (hook, url)
);

CREATE INDEX IF NOT EXISTS idx_webhooks_url ON webhooks(url);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
