//! SQLite graph store
//!
//! Nodes and edges live in two tables next to the persistent store. The
//! `UNIQUE(source, target, kind)` constraint keeps edge creation idempotent.

use crate::graph::traits::{GraphResult, GraphStore};
use crate::graph::{Edge, EdgeKind, GraphError, GraphNode, NodePatch};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

const GRAPH_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    unfetched INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    has_webhooks INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    target INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    UNIQUE(source, target, kind)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);
"#;

/// SQLite graph backend
pub struct SqliteGraph {
    conn: Connection,
}

impl SqliteGraph {
    /// Opens the graph tables in the database at `path`
    pub fn new(path: &Path) -> GraphResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;
        conn.execute_batch(GRAPH_SCHEMA)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory graph (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> GraphResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(GRAPH_SCHEMA)?;
        Ok(Self { conn })
    }

    fn edges_where(&self, column: &str, id: i64, kinds: &[EdgeKind]) -> GraphResult<Vec<Edge>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, source, target, kind FROM edges WHERE {} = ?1 ORDER BY id",
            column
        ))?;

        let rows = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut edges = Vec::with_capacity(rows.len());
        for (id, source, target, kind) in rows {
            let kind: EdgeKind = kind.parse()?;
            if kinds.contains(&kind) {
                edges.push(Edge {
                    id,
                    source,
                    target,
                    kind,
                });
            }
        }

        Ok(edges)
    }
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<GraphNode> {
    Ok(GraphNode {
        id: row.get(0)?,
        url: row.get(1)?,
        unfetched: row.get(2)?,
        failed: row.get(3)?,
        has_webhooks: row.get(4)?,
    })
}

impl GraphStore for SqliteGraph {
    fn create_node(&mut self, url: &str, unfetched: bool) -> GraphResult<GraphNode> {
        // A node left behind by a profile whose row was removed is reused.
        let node = self.conn.query_row(
            "INSERT INTO nodes (url, unfetched) VALUES (?1, ?2)
             ON CONFLICT(url) DO UPDATE SET url = excluded.url
             RETURNING id, url, unfetched, failed, has_webhooks",
            params![url, unfetched],
            node_from_row,
        )?;
        Ok(node)
    }

    fn get_node(&self, id: i64) -> GraphResult<Option<GraphNode>> {
        let node = self
            .conn
            .query_row(
                "SELECT id, url, unfetched, failed, has_webhooks FROM nodes WHERE id = ?1",
                params![id],
                node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    fn find_node_by_url(&self, url: &str) -> GraphResult<Option<GraphNode>> {
        let node = self
            .conn
            .query_row(
                "SELECT id, url, unfetched, failed, has_webhooks FROM nodes WHERE url = ?1",
                params![url],
                node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    fn update_node(&mut self, id: i64, patch: NodePatch) -> GraphResult<bool> {
        let node = self.get_node(id)?.ok_or(GraphError::NodeNotFound(id))?;

        let unfetched = patch.unfetched.unwrap_or(node.unfetched);
        let failed = patch.failed.unwrap_or(node.failed);
        let has_webhooks = patch.has_webhooks.unwrap_or(node.has_webhooks);

        if unfetched == node.unfetched
            && failed == node.failed
            && has_webhooks == node.has_webhooks
        {
            return Ok(false);
        }

        self.conn.execute(
            "UPDATE nodes SET unfetched = ?1, failed = ?2, has_webhooks = ?3 WHERE id = ?4",
            params![unfetched, failed, has_webhooks, id],
        )?;
        Ok(true)
    }

    fn delete_node(&mut self, id: i64) -> GraphResult<()> {
        self.conn.execute(
            "DELETE FROM edges WHERE source = ?1 OR target = ?1",
            params![id],
        )?;
        self.conn
            .execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn outgoing(&self, id: i64, kinds: &[EdgeKind]) -> GraphResult<Vec<Edge>> {
        self.edges_where("source", id, kinds)
    }

    fn incoming(&self, id: i64, kinds: &[EdgeKind]) -> GraphResult<Vec<Edge>> {
        self.edges_where("target", id, kinds)
    }

    fn create_edge(&mut self, source: i64, target: i64, kind: EdgeKind) -> GraphResult<bool> {
        let created = self.conn.execute(
            "INSERT OR IGNORE INTO edges (source, target, kind) VALUES (?1, ?2, ?3)",
            params![source, target, kind.as_str()],
        )?;
        Ok(created > 0)
    }

    fn delete_edge(&mut self, id: i64) -> GraphResult<()> {
        self.conn
            .execute("DELETE FROM edges WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn count_edges(&self) -> GraphResult<Vec<(EdgeKind, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM edges GROUP BY kind ORDER BY kind")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(kind, count)| Ok((kind.parse::<EdgeKind>()?, count as u64)))
            .collect::<GraphResult<Vec<_>>>()
    }
}
