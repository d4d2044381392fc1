use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("legacy bus ingress is not implemented: no legacy protocol is specified to decode")]
    Unimplemented,
}
