pub mod process;

pub use process::*;

/// A declaration of one process to supervise.
///
/// This is also the shape of a registration request. Environment entries are
/// `KEY=VALUE` strings and replace the supervisor's own environment entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSpec {
    pub name: String,
    pub description: String,
    pub command: String,
    pub args: Vec<String>,
    pub environment: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    Stopped,
    Starting,
    Stopping,
    Failed,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stopped => "STOPPED",
            Self::Starting => "STARTING",
            Self::Stopping => "STOPPING",
            Self::Failed => "FAILED",
        })
    }
}

/// The observable state of a registered service; the registration response.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub description: String,
    pub command: String,
    pub args: Vec<String>,
    pub status: ServiceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_to_empty() -> anyhow::Result<()> {
        let spec: ServiceSpec = serde_json::from_str(r#"{"name": "web", "command": "nginx"}"#)?;

        assert_eq!(
            spec,
            ServiceSpec {
                name: "web".to_owned(),
                command: "nginx".to_owned(),
                ..Default::default()
            }
        );
        Ok(())
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result = serde_json::from_str::<ServiceSpec>(r#"{"name": "web", "restart": "always"}"#);

        assert!(result.is_err(), "expected an error, got {:?}", result);
    }

    #[test]
    fn test_statuses_are_written_in_upper_case() -> anyhow::Result<()> {
        let info = ServiceInfo {
            name: "web".to_owned(),
            description: "the web server".to_owned(),
            command: "nginx".to_owned(),
            args: vec!["-g".to_owned(), "daemon off;".to_owned()],
            status: ServiceStatus::Starting,
        };

        let serialized = serde_json::to_string(&info)?;

        assert_eq!(
            serialized,
            r#"{"name":"web","description":"the web server","command":"nginx","args":["-g","daemon off;"],"status":"STARTING"}"#
        );
        assert_eq!(ServiceStatus::Failed.to_string(), "FAILED");
        Ok(())
    }
}
