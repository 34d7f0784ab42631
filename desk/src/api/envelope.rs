use crate::error::ApiError;
use serde::{Deserialize, Serialize};

/// `{ success, data, message }` wrapper returned by every backend endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Whether the backend accepted the request
    pub success: bool,
    /// Payload on success
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    /// Human-readable explanation, mostly on failure
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Successful envelope
    #[must_use]
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    /// Failed envelope
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Unwrap the payload
    ///
    /// # Errors
    ///
    /// - [`ApiError::Rejected`] when `success` is false
    /// - [`ApiError::Decode`] when `data` is missing
    pub fn into_result(self) -> Result<T, ApiError> {
        if !self.success {
            return Err(ApiError::Rejected(
                self.message.unwrap_or_else(|| "Request failed".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| ApiError::Decode("response has no data".to_string()))
    }

    /// Check `success` and discard the payload
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Rejected`] when `success` is false.
    pub fn into_unit(self) -> Result<(), ApiError> {
        if self.success {
            Ok(())
        } else {
            Err(ApiError::Rejected(
                self.message.unwrap_or_else(|| "Request failed".to_string()),
            ))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn success_yields_data() {
        let envelope: ApiEnvelope<u32> =
            serde_json::from_str(r#"{ "success": true, "data": 7 }"#).unwrap();
        assert_eq!(envelope.into_result(), Ok(7));
    }

    #[test]
    fn failure_carries_backend_message() {
        let envelope: ApiEnvelope<u32> = serde_json::from_str(
            r#"{ "success": false, "message": "Ticket already assigned" }"#,
        )
        .unwrap();
        assert_eq!(
            envelope.into_result(),
            Err(ApiError::Rejected("Ticket already assigned".to_string()))
        );
    }

    #[test]
    fn missing_data_is_a_decode_error() {
        let envelope: ApiEnvelope<u32> = serde_json::from_str(r#"{ "success": true }"#).unwrap();
        assert!(matches!(envelope.clone().into_result(), Err(ApiError::Decode(_))));
        assert_eq!(envelope.into_unit(), Ok(()));
    }
}
