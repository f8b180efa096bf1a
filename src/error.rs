use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Payload malformado en '{channel}': se esperaban {expected} bytes, llegaron {actual}")]
    MalformedPayload {
        channel: String,
        expected: usize,
        actual: usize,
    },

    #[error("Entrada degenerada: {0}")]
    DegenerateInput(&'static str),

    #[error("Canal desconocido: {0}")]
    UnknownChannel(String),

    #[error("Configuración inválida: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
