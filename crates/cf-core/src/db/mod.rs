//! Database layer: pool management, schema, and repositories.

mod activity_repo;
mod alert_repo;
mod case_repo;
mod comment_repo;
mod error;
mod pagination;
mod pool;
mod schema;
mod seed;
mod similarity_repo;
mod status_repo;
mod task_repo;
mod user_repo;

pub use activity_repo::{create_activity_repository, ActivityEntry, ActivityRepository};
pub use alert_repo::{create_alert_repository, AlertFilter, AlertRepository, SortDirection};
pub use case_repo::{artifact_kind, create_case_repository, CaseArtifact, CaseRepository};
pub use comment_repo::{create_comment_repository, CommentRepository};
pub use error::DbError;
pub use pagination::{PaginatedResult, Pagination, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use pool::{
    create_pool, create_pool_with_options, escape_like_pattern, make_like_pattern, DbPool,
    PoolOptions,
};
pub use schema::run_migrations;
pub use seed::{seed_defaults, SYSTEM_USER_LOGIN};
pub use similarity_repo::{
    create_similarity_repository, RelatedAlert, SimilarityRepository,
};
pub use status_repo::{create_status_repository, StatusRepository};
pub use task_repo::{create_task_repository, TaskRepository, TaskUpdate};
pub use user_repo::{create_user_repository, UserRepository};
