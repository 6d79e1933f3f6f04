use crate::graph::{Edge, EdgeKind, GraphNode, NodePatch};
use thiserror::Error;

/// Errors that can occur during graph operations
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Graph node not found: {0}")]
    NodeNotFound(i64),

    #[error("Unknown edge kind: {0}")]
    UnknownEdgeKind(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Node and edge primitives of a graph store
pub trait GraphStore {
    /// Creates a node for `url`
    fn create_node(&mut self, url: &str, unfetched: bool) -> GraphResult<GraphNode>;

    fn get_node(&self, id: i64) -> GraphResult<Option<GraphNode>>;

    fn find_node_by_url(&self, url: &str) -> GraphResult<Option<GraphNode>>;

    /// Applies `patch`; returns false when nothing changed
    fn update_node(&mut self, id: i64, patch: NodePatch) -> GraphResult<bool>;

    /// Deletes a node together with every edge touching it
    fn delete_node(&mut self, id: i64) -> GraphResult<()>;

    /// Outgoing edges of `id` whose kind is in `kinds`
    fn outgoing(&self, id: i64, kinds: &[EdgeKind]) -> GraphResult<Vec<Edge>>;

    /// Incoming edges of `id` whose kind is in `kinds`
    fn incoming(&self, id: i64, kinds: &[EdgeKind]) -> GraphResult<Vec<Edge>>;

    /// Creates an edge unless the same (source, target, kind) exists;
    /// returns true when a new edge was created
    fn create_edge(&mut self, source: i64, target: i64, kind: EdgeKind) -> GraphResult<bool>;

    fn delete_edge(&mut self, id: i64) -> GraphResult<()>;

    /// Edge counts per kind, for statistics
    fn count_edges(&self) -> GraphResult<Vec<(EdgeKind, u64)>>;
}
