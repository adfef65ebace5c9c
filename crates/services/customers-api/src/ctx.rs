use sqlx::PgPool;

use crate::github::GithubClient;

/// State shared by all handlers
#[derive(Clone)]
pub struct Ctx {
    pub pool: PgPool,
    pub github: GithubClient,
}
