use thiserror::Error;

/// Closed error taxonomy for the ETL core.
///
/// Expected failure modes (a step that found no data, an entity skipped
/// because its upstream failed) travel as values inside `EtlResult`; this
/// enum covers the cases that abort a step.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("data source error: {0}")]
    DataSource(String),

    #[error("data quality violation: {0}")]
    DataQuality(String),

    #[error("load failed: {0}")]
    Load(String),

    #[error("upstream dependency failed: {0}")]
    DependencyFailure(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl EtlError {
    /// Whether the orchestrator should re-attempt the whole step.
    ///
    /// Quality breaches and configuration mistakes are deterministic, so a
    /// retry cannot help; connection and write failures can be transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EtlError::DataSource(_) | EtlError::Load(_) | EtlError::Database(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
