use omatrust_contracts::{ErrorBody, ErrorCode};

/// Typed failure of a witness pipeline stage. The HTTP status is derived
/// from `code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessError {
    pub code: ErrorCode,
    pub message: String,
}

impl WitnessError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerError, message)
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code,
            message: self.message.clone(),
            http_status: self.http_status(),
        }
    }
}

impl std::fmt::Display for WitnessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for WitnessError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_code_and_status() {
        let err = WitnessError::new(ErrorCode::AttestationRevoked, "attestation was revoked");
        let body = err.body();
        assert_eq!(body.code, ErrorCode::AttestationRevoked);
        assert_eq!(body.http_status, 409);
        assert_eq!(err.to_string(), "ATTESTATION_REVOKED: attestation was revoked");
    }
}
