use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Envelope every UI-facing operation resolves to.
///
/// Lower-layer failures are folded into `error` so nothing escapes the
/// command boundary as a fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> CommandResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    pub fn ok_with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Display) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.to_string()),
        }
    }

    /// Failure that still carries a payload (e.g. the state snapshot after a failed start).
    pub fn err_with_data(error: impl Display, data: T) -> Self {
        Self {
            success: false,
            message: None,
            data: Some(data),
            error: Some(error.to_string()),
        }
    }
}

impl CommandResponse<()> {
    pub fn done() -> Self {
        Self {
            success: true,
            message: None,
            data: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let ok = CommandResponse::ok_with_message("Service started", 42);
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "success": true, "message": "Service started", "data": 42 })
        );

        let err: CommandResponse<u32> = CommandResponse::err("Backend unreachable");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({ "success": false, "error": "Backend unreachable" })
        );

        assert_eq!(
            serde_json::to_value(CommandResponse::<()>::done()).unwrap(),
            json!({ "success": true })
        );
    }
}
