mod channels;
mod memberships;
mod messages;
mod servers;
mod settings;
mod users;

use sqlx::PgPool;

/// Thin wrapper around the connection pool. One method per operation, kept
/// in submodules by entity, so callers never write ad hoc SQL outside this
/// module.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Store { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
