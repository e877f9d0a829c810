use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("No encontrado: {0}")]
    NotFound(String),
    #[error("Entrada inválida: {0}")]
    InvalidInput(String),
    #[error("Tipo de archivo no soportado: {0}")]
    Unsupported(String),
    #[error("No se pudo decodificar: {0}")]
    Decode(String),
    #[error("Fuente no disponible: {0}")]
    SourceUnavailable(String),
    #[error("Error de inferencia: {0}")]
    Inference(String),
    #[error("Error de operación: {0}")]
    OperationFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
