//! Health status and the report-combining algebra.
//!
//! Every manager reports a [`HealthReport`]; the kernel folds them into one
//! report with [`HealthReport::combine`]. Only OK vs non-OK matters when
//! folding: any non-OK input turns the accumulated status into ERROR.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::Error;

/// Health status of one component.
///
/// Serialized uppercase; parsed case-insensitively both from strings and
/// from serialized input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Status {
    Ok,
    Error,
    Warning,
    Unknown,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Error => "ERROR",
            Status::Warning => "WARNING",
            Status::Unknown => "UNKNOWN",
        }
    }
}

impl TryFrom<String> for Status {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, <Status as TryFrom<String>>::Error> {
        value.parse()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OK" => Ok(Status::Ok),
            "ERROR" => Ok(Status::Error),
            "WARNING" => Ok(Status::Warning),
            "UNKNOWN" => Ok(Status::Unknown),
            _ => Err(Error::validation(format!(
                "invalid status '{}': expected one of OK, ERROR, WARNING, UNKNOWN",
                s
            ))),
        }
    }
}

/// Status plus free-form details for one named component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub manager_name: String,
    pub status: Status,
    pub details: Vec<String>,
}

impl HealthReport {
    pub fn new(manager_name: impl Into<String>, status: Status) -> Self {
        Self {
            manager_name: manager_name.into(),
            status,
            details: Vec::new(),
        }
    }

    pub fn ok(manager_name: impl Into<String>) -> Self {
        Self::new(manager_name, Status::Ok)
    }

    pub fn error(manager_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(manager_name, Status::Error).with_detail(detail)
    }

    /// Standard report for a manager whose health is just "started or not".
    pub fn running_or_not(manager_name: &str, running: bool) -> Self {
        if running {
            Self::ok(manager_name).with_detail(format!("{} is healthy", manager_name))
        } else {
            Self::error(manager_name, format!("{} is not running.", manager_name))
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    pub fn with_details<I, S>(mut self, details: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.details.extend(details.into_iter().map(Into::into));
        self
    }

    /// Fold `other` into this report.
    ///
    /// A non-OK `other` makes the result ERROR; details are appended in order.
    /// The receiver's own status is never upgraded, so an ERROR stays ERROR.
    pub fn combine(mut self, other: HealthReport) -> Self {
        if !other.status.is_ok() {
            self.status = Status::Error;
        }
        self.details.extend(other.details);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ok_combined_with_error_is_error() {
        let ok = HealthReport::ok("Kernel").with_details(["a", "b"]);
        let err = HealthReport::error("QueueManager", "c").with_detail("d");

        let combined = ok.combine(err);
        assert_eq!(combined.status, Status::Error);
        assert_eq!(combined.manager_name, "Kernel");
        assert_eq!(combined.details, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_all_ok_stays_ok() {
        let combined = (0..5).fold(HealthReport::ok("Kernel"), |acc, i| {
            acc.combine(HealthReport::ok(format!("m{}", i)).with_detail(format!("m{} ok", i)))
        });
        assert!(combined.is_ok());
        assert_eq!(combined.details.len(), 5);
    }

    #[test]
    fn test_warning_and_unknown_propagate_as_error() {
        let warn = HealthReport::ok("k").combine(HealthReport::new("w", Status::Warning));
        assert_eq!(warn.status, Status::Error);

        let unknown = HealthReport::ok("k").combine(HealthReport::new("u", Status::Unknown));
        assert_eq!(unknown.status, Status::Error);
    }

    #[test]
    fn test_error_is_not_upgraded_by_ok() {
        let report = HealthReport::error("k", "broken").combine(HealthReport::ok("m"));
        assert_eq!(report.status, Status::Error);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("ok".parse::<Status>().unwrap(), Status::Ok);
        assert_eq!("WARNING".parse::<Status>().unwrap(), Status::Warning);
        assert!("degraded".parse::<Status>().is_err());
    }

    #[test]
    fn test_status_deserializes_like_it_parses() {
        let lower: Status = serde_json::from_str("\"ok\"").unwrap();
        assert_eq!(lower, Status::Ok);
        let mixed: Status = serde_json::from_str("\"Warning\"").unwrap();
        assert_eq!(mixed, Status::Warning);

        let err = serde_json::from_str::<Status>("\"degraded\"").unwrap_err();
        assert!(err.to_string().contains("invalid status 'degraded'"));

        let report: HealthReport = serde_json::from_str(
            r#"{"manager_name": "A", "status": "error", "details": []}"#,
        )
        .unwrap();
        assert_eq!(report.status, Status::Error);
    }

    #[test]
    fn test_serialized_shape() {
        let report = HealthReport::running_or_not("MsgManager", true);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "manager_name": "MsgManager",
                "status": "OK",
                "details": ["MsgManager is healthy"],
            })
        );
    }
}
