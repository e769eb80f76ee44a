use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("job payload is not a valid task: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("job {0} not found")]
    UnknownJob(uuid::Uuid),
}
