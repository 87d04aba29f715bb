use crate::db::{DbPool, OrmConn};

/// Shared handles for every request: the SeaORM connection drives entity
/// queries, the raw pool drives migrations and the audit trail.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
}

impl AppState {
    pub fn new(pool: DbPool, orm: OrmConn) -> Self {
        Self { pool, orm }
    }
}
