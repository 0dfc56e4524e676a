//! Loading service declarations from bootstrap documents.
//!
//! A bootstrap document has a `version` (only `"1"` is understood; a missing
//! version means `"1"`) and an ordered list of `services`. Several documents
//! can be loaded at once, in which case their services are concatenated in
//! the order the documents were given.

use std::fs;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::log;
use crate::manager::Manager;
use crate::services::{ServiceInfo, ServiceSpec};

pub const CURRENT_VERSION: &str = "1";

pub const DEFAULT_BOOTSTRAP_FILE: &str = "Paddockfile.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Yaml,
    Json,
    Toml,
    Ron,
}

impl Format {
    /// Picks a format from the file extension, falling back to YAML.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Self::Json,
            Some("toml") => Self::Toml,
            Some("ron") => Self::Ron,
            _ => Self::Yaml,
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Yaml => "YAML",
            Self::Json => "JSON",
            Self::Toml => "TOML",
            Self::Ron => "RON",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Bootstrap {
    #[serde(deserialize_with = "deserialize_version")]
    pub version: String,
    pub services: Vec<ServiceSpec>,
}

impl Bootstrap {
    pub fn parse(text: &str, format: Format) -> ConfigResult<Self> {
        let parse_error = |message: String| ConfigError::ParseError { format, message };
        let mut bootstrap: Self = match format {
            // an empty YAML stream is a valid, empty document
            Format::Yaml if text.trim().is_empty() => Self::default(),
            Format::Yaml => {
                serde_yaml::from_str(text).map_err(|error| parse_error(error.to_string()))?
            }
            Format::Json => {
                serde_json::from_str(text).map_err(|error| parse_error(error.to_string()))?
            }
            Format::Toml => toml::from_str(text).map_err(|error| parse_error(error.to_string()))?,
            Format::Ron => ron::from_str(text).map_err(|error| parse_error(error.to_string()))?,
        };

        if bootstrap.version.is_empty() {
            bootstrap.version = CURRENT_VERSION.to_owned();
        } else if bootstrap.version != CURRENT_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                version: bootstrap.version,
            });
        }
        Ok(bootstrap)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let text = fs::read_to_string(path).map_err(|error| ConfigError::ReadError {
            path: path.to_owned(),
            inner: error.into(),
        })?;
        let format = Format::from_path(path);
        let bootstrap = Self::parse(&text, format).map_err(|error| ConfigError::InvalidFile {
            path: path.to_owned(),
            inner: Box::new(error),
        })?;
        log::debug!(
            event = "LOAD",
            path,
            format,
            services = bootstrap.services.len()
        );
        Ok(bootstrap)
    }

    /// Loads and merges every file; the first failure aborts the whole load.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> ConfigResult<Self> {
        let bootstraps = paths
            .iter()
            .map(|path| Self::from_file(path.as_ref()))
            .collect::<ConfigResult<Vec<Self>>>()?;
        Ok(Self::merge(bootstraps))
    }

    /// Concatenates the services of every document, keeping the version of the
    /// first document that has one.
    pub fn merge(bootstraps: impl IntoIterator<Item = Self>) -> Self {
        let mut merged = Self::default();
        for bootstrap in bootstraps {
            if merged.version.is_empty() {
                merged.version = bootstrap.version;
            }
            merged.services.extend(bootstrap.services);
        }
        merged
    }

    /// Registers every service with the manager, in order.
    pub fn apply(self, manager: &Manager) -> Vec<ServiceInfo> {
        self.services
            .into_iter()
            .map(|spec| manager.create_service(spec))
            .collect()
    }
}

// Versions are strings, but `version: 1` is too natural to reject.
fn deserialize_version<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct VersionVisitor;

    impl<'de> serde::de::Visitor<'de> for VersionVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a version string or integer")
        }

        fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<Self::Value, E> {
            Ok(value.to_owned())
        }

        fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(value.to_string())
        }

        fn visit_i64<E: serde::de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(value.to_string())
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(String::new())
        }

        fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(VersionVisitor)
}

#[cfg(test)]
mod tests {
    use crate::services::ServiceStatus;

    use super::*;

    #[test]
    fn test_parsing_yaml() -> anyhow::Result<()> {
        let bootstrap = Bootstrap::parse(
            r#"
version: "1"
services:
  - name: web
    description: the web server
    command: /usr/sbin/nginx
    args: ["-g", "daemon off;"]
    environment:
      - PORT=8080
  - name: worker
    command: /usr/bin/worker
"#,
            Format::Yaml,
        )?;

        assert_eq!(
            bootstrap,
            Bootstrap {
                version: "1".to_owned(),
                services: vec![
                    ServiceSpec {
                        name: "web".to_owned(),
                        description: "the web server".to_owned(),
                        command: "/usr/sbin/nginx".to_owned(),
                        args: vec!["-g".to_owned(), "daemon off;".to_owned()],
                        environment: vec!["PORT=8080".to_owned()],
                    },
                    ServiceSpec {
                        name: "worker".to_owned(),
                        command: "/usr/bin/worker".to_owned(),
                        ..Default::default()
                    },
                ],
            }
        );
        Ok(())
    }

    #[test]
    fn test_a_missing_version_means_the_current_one() -> anyhow::Result<()> {
        let bootstrap = Bootstrap::parse("services: []", Format::Yaml)?;
        assert_eq!(bootstrap.version, CURRENT_VERSION);

        let bootstrap = Bootstrap::parse(r#"{"version": ""}"#, Format::Json)?;
        assert_eq!(bootstrap.version, CURRENT_VERSION);

        let bootstrap = Bootstrap::parse("", Format::Yaml)?;
        assert_eq!(
            bootstrap,
            Bootstrap {
                version: CURRENT_VERSION.to_owned(),
                services: vec![],
            }
        );
        Ok(())
    }

    #[test]
    fn test_numeric_versions_are_accepted() -> anyhow::Result<()> {
        assert_eq!(Bootstrap::parse("version: 1", Format::Yaml)?.version, "1");
        assert_eq!(Bootstrap::parse("version = 1", Format::Toml)?.version, "1");
        Ok(())
    }

    #[test]
    fn test_a_null_version_means_the_current_one() -> anyhow::Result<()> {
        assert_eq!(Bootstrap::parse("version: ~", Format::Yaml)?.version, "1");
        assert_eq!(Bootstrap::parse("version: null", Format::Yaml)?.version, "1");
        assert_eq!(Bootstrap::parse(r#"{"version": null}"#, Format::Json)?.version, "1");
        Ok(())
    }

    #[test]
    fn test_fractional_versions_are_rejected() {
        for text in ["version: 1.0", "version: 1e0"] {
            let result = Bootstrap::parse(text, Format::Yaml);
            assert!(
                matches!(result, Err(ConfigError::ParseError { .. })),
                "expected {:?} to be rejected, got {:?}",
                text,
                result
            );
        }
    }

    #[test]
    fn test_other_versions_are_rejected() {
        for (text, format) in [
            (r#"version: "2""#, Format::Yaml),
            ("version: 0", Format::Yaml),
            (r#"{"version": "v1"}"#, Format::Json),
        ] {
            let result = Bootstrap::parse(text, format);
            assert!(
                matches!(result, Err(ConfigError::UnsupportedVersion { .. })),
                "expected {:?} to be rejected, got {:?}",
                text,
                result
            );
        }
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        for (text, format) in [
            ("services: [", Format::Yaml),
            ("services:\n  - name: a\n    restart: always\n", Format::Yaml),
            ("{", Format::Json),
            ("services = 3", Format::Toml),
            ("(services: [(nme: \"a\")])", Format::Ron),
        ] {
            let result = Bootstrap::parse(text, format);
            assert!(
                matches!(result, Err(ConfigError::ParseError { format: f, .. }) if f == format),
                "expected {:?} to be malformed, got {:?}",
                text,
                result
            );
        }
    }

    #[test]
    fn test_every_format_describes_the_same_bootstrap() -> anyhow::Result<()> {
        let expected = Bootstrap {
            version: "1".to_owned(),
            services: vec![ServiceSpec {
                name: "a".to_owned(),
                command: "/bin/true".to_owned(),
                args: vec!["x".to_owned()],
                ..Default::default()
            }],
        };
        let documents = [
            (
                "paddock.yml",
                "version: \"1\"\nservices:\n  - {name: a, command: /bin/true, args: [x]}\n",
            ),
            (
                "paddock.json",
                r#"{"version": "1", "services": [{"name": "a", "command": "/bin/true", "args": ["x"]}]}"#,
            ),
            (
                "paddock.toml",
                "version = \"1\"\n[[services]]\nname = \"a\"\ncommand = \"/bin/true\"\nargs = [\"x\"]\n",
            ),
            (
                "paddock.ron",
                r#"(version: "1", services: [(name: "a", command: "/bin/true", args: ["x"])])"#,
            ),
        ];

        let directory = tempfile::tempdir()?;
        for (file_name, text) in documents {
            let path = directory.path().join(file_name);
            fs::write(&path, text)?;

            assert_eq!(Bootstrap::from_file(&path)?, expected, "in {}", file_name);
        }
        Ok(())
    }

    #[test]
    fn test_merging_concatenates_in_order() {
        let bootstrap = |version: &str, names: &[&str]| Bootstrap {
            version: version.to_owned(),
            services: names
                .iter()
                .map(|&name| ServiceSpec {
                    name: name.to_owned(),
                    ..Default::default()
                })
                .collect(),
        };

        let merged = Bootstrap::merge([
            bootstrap("", &["a", "b"]),
            bootstrap("1", &["c"]),
            bootstrap("2", &["d", "e"]),
        ]);

        assert_eq!(merged.version, "1");
        assert_eq!(
            merged
                .services
                .iter()
                .map(|service| service.name.as_str())
                .collect::<Vec<_>>(),
            vec!["a", "b", "c", "d", "e"]
        );
    }

    #[test]
    fn test_loading_several_files() -> anyhow::Result<()> {
        let directory = tempfile::tempdir()?;
        let first = directory.path().join("first.yaml");
        let second = directory.path().join("second.json");
        fs::write(&first, "services:\n  - name: a\n  - name: b\n")?;
        fs::write(&second, r#"{"services": [{"name": "c"}]}"#)?;

        let bootstrap = Bootstrap::load(&[&second, &first])?;

        assert_eq!(bootstrap.version, "1");
        assert_eq!(
            bootstrap
                .services
                .iter()
                .map(|service| service.name.as_str())
                .collect::<Vec<_>>(),
            vec!["c", "a", "b"]
        );
        Ok(())
    }

    #[test]
    fn test_loading_stops_at_the_first_bad_file() -> anyhow::Result<()> {
        let directory = tempfile::tempdir()?;
        let good = directory.path().join("good.yaml");
        let bad = directory.path().join("bad.yaml");
        let missing = directory.path().join("missing.yaml");
        fs::write(&good, "services:\n  - name: a\n")?;
        fs::write(&bad, "version: \"3\"\n")?;

        let result = Bootstrap::load(&[&good, &bad]);
        assert_eq!(
            result,
            Err(ConfigError::InvalidFile {
                path: bad.clone(),
                inner: Box::new(ConfigError::UnsupportedVersion {
                    version: "3".to_owned()
                }),
            })
        );

        let result = Bootstrap::load(&[&good, &missing]);
        assert!(
            matches!(
                &result,
                Err(ConfigError::ReadError { path, inner }) if path == &missing && inner.kind() == "NotFound"
            ),
            "unexpected result: {:?}",
            result
        );
        Ok(())
    }

    #[test]
    fn test_applying_registers_every_service_as_stopped() -> anyhow::Result<()> {
        let bootstrap = Bootstrap::parse(
            "services:\n  - {name: a, command: /bin/true}\n  - {name: b, command: /does/not/exist}\n",
            Format::Yaml,
        )?;
        let manager = Manager::new();

        let services = bootstrap.apply(&manager);

        assert_eq!(services, manager.services());
        assert_eq!(
            services
                .iter()
                .map(|service| (service.name.as_str(), service.status))
                .collect::<Vec<_>>(),
            vec![("a", ServiceStatus::Stopped), ("b", ServiceStatus::Stopped)]
        );
        Ok(())
    }

    #[test]
    fn test_formats_follow_the_extension() {
        assert_eq!(Format::from_path(Path::new("a.yaml")), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("a.YML")), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("a.json")), Format::Json);
        assert_eq!(Format::from_path(Path::new("a.toml")), Format::Toml);
        assert_eq!(Format::from_path(Path::new("a.ron")), Format::Ron);
        assert_eq!(Format::from_path(Path::new("Paddockfile")), Format::Yaml);
    }
}
