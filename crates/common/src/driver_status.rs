//! Result envelope printed for the storage orchestrator.
//!
//! Every driver command ends by writing exactly one compact JSON object to
//! stdout; the orchestrator only looks at `status` and `message`.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Success,
    Failure,
    #[serde(rename = "Not supported")]
    NotSupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverCapabilities {
    pub attach: bool,
    pub selinux_relabel: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverStatus {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<DriverCapabilities>,
}

impl DriverStatus {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: Some(message.into()),
            capabilities: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: Status::Failure,
            message: Some(message.into()),
            capabilities: None,
        }
    }

    pub fn unsupported(call: &str) -> Self {
        Self {
            status: Status::NotSupported,
            message: Some(format!("{} not supported", call)),
            capabilities: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: DriverCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Write the status as a single compact JSON document.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()
    }
}

impl std::fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_wire_format() {
        let status = DriverStatus::unsupported("expandvolume");
        assert_eq!(
            status.to_string(),
            r#"{"status":"Not supported","message":"expandvolume not supported"}"#
        );
    }

    #[test]
    fn test_init_capabilities() {
        let status = DriverStatus::success("No initialization required").with_capabilities(
            DriverCapabilities {
                attach: false,
                selinux_relabel: false,
            },
        );
        let json: serde_json::Value = serde_json::from_str(&status.to_string()).unwrap();
        assert_eq!(json["status"], "Success");
        assert_eq!(json["capabilities"]["attach"], false);
        assert_eq!(json["capabilities"]["selinuxRelabel"], false);
    }

    #[test]
    fn test_write_to_has_no_trailing_newline() {
        let mut buf = Vec::new();
        DriverStatus::failure("boom").write_to(&mut buf).unwrap();
        assert_eq!(buf, br#"{"status":"Failure","message":"boom"}"#);
    }
}
