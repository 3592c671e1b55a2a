#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Provision(#[from] podnet::ProvisionError),

    #[error("host error: {0}")]
    Host(#[from] podnet::HostError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DaemonResult<T> = Result<T, DaemonError>;
