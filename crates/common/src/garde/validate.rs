//! Garde validation utilities.

use crate::domain::DomainError;
use garde::{Report, Validate};

/// Convert garde validation report to DomainError
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(format_validation_errors(&report)))
}

/// Format validation errors from garde Report into a human-readable string
fn format_validation_errors(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| {
            if path.to_string().is_empty() {
                error.message().to_string()
            } else {
                format!("{}: {}", path, error.message())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use garde::Validate;

    #[derive(Validate)]
    struct RegisterDeviceRequest {
        #[garde(length(min = 1, max = 64))]
        hardware_id: String,
        #[garde(range(max = 20))]
        retry_limit: u32,
    }

    #[test]
    fn test_validate_success() {
        let request = RegisterDeviceRequest {
            hardware_id: "hw-001".to_string(),
            retry_limit: 3,
        };
        assert!(validate_struct(&request).is_ok());
    }

    #[test]
    fn test_validate_failure() {
        let request = RegisterDeviceRequest {
            hardware_id: "".to_string(),
            retry_limit: 3,
        };
        let result = validate_struct(&request);
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_validate_error_message_lists_every_field() {
        let request = RegisterDeviceRequest {
            hardware_id: "".to_string(),
            retry_limit: 99,
        };
        match validate_struct(&request) {
            Err(DomainError::ValidationError(msg)) => {
                assert!(msg.contains("hardware_id"));
                assert!(msg.contains("retry_limit"));
            }
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }
}
