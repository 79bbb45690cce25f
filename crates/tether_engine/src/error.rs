use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to create script runtime: {0}")]
    Runtime(#[source] rquickjs::Error),

    #[error("failed to install host prelude: {0}")]
    Prelude(String),
}
