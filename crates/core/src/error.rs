use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown transport: {0}")]
    UnknownTransport(String),

    #[error("Unknown run mode: {0}")]
    UnknownMode(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::UnknownTransport("sctp".to_string());
        assert!(error.to_string().contains("sctp"));
    }
}
