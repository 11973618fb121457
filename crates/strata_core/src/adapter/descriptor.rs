//! Connection-descriptor file parsing.
//!
//! # Responsibility
//! - Parse the XML descriptor an adapter is constructed from.
//! - Validate required nodes at construction time.
//!
//! # Invariants
//! - `driver`, `hostname`, `port`, `database`, `username` and `password` are
//!   required; a missing node is a configuration error, not a runtime one.
//! - `prefix`, when present, substitutes the `{prefix}` placeholder in
//!   container names as `<prefix>_`.

use super::{AdapterError, AdapterResult};
use std::path::Path;

/// Parsed connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub driver: String,
    pub hostname: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub prefix: Option<String>,
    pub charset: Option<String>,
}

impl ConnectionDescriptor {
    /// Reads and parses a descriptor file.
    pub fn from_path(path: impl AsRef<Path>) -> AdapterResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            AdapterError::Config(format!(
                "cannot read descriptor `{}`: {err}",
                path.display()
            ))
        })?;
        Self::from_xml(&text)
    }

    /// Parses descriptor XML content.
    pub fn from_xml(text: &str) -> AdapterResult<Self> {
        let doc = roxmltree::Document::parse(text)
            .map_err(|err| AdapterError::Config(format!("malformed descriptor XML: {err}")))?;
        let root = doc.root_element();

        let node = |name: &str| -> Option<String> {
            root.children()
                .find(|child| child.is_element() && child.tag_name().name() == name)
                .map(|child| child.text().unwrap_or_default().trim().to_string())
        };
        let required = |name: &str| -> AdapterResult<String> {
            match node(name) {
                Some(value) if !value.is_empty() => Ok(value),
                _ => Err(AdapterError::Config(format!(
                    "descriptor missing required node `{name}`"
                ))),
            }
        };

        let port_text = required("port")?;
        let port = port_text.parse().map_err(|_| {
            AdapterError::Config(format!("descriptor port `{port_text}` is not a valid port"))
        })?;

        Ok(Self {
            driver: required("driver")?,
            hostname: required("hostname")?,
            port,
            database: required("database")?,
            username: required("username")?,
            password: required("password")?,
            prefix: node("prefix").filter(|value| !value.is_empty()),
            charset: node("charset").filter(|value| !value.is_empty()),
        })
    }

    /// Resolves the `{prefix}` placeholder in a container name.
    pub fn prefixed_container(&self, container: &str) -> String {
        let prefix = self
            .prefix
            .as_ref()
            .map(|p| format!("{p}_"))
            .unwrap_or_default();
        container.replace("{prefix}", &prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionDescriptor;
    use crate::adapter::AdapterError;

    const DESCRIPTOR: &str = "<connection>
        <driver>sqlite</driver>
        <hostname>localhost</hostname>
        <port>0</port>
        <database>:memory:</database>
        <username>app</username>
        <password>secret</password>
        <prefix>app</prefix>
    </connection>";

    #[test]
    fn parses_full_descriptor() {
        let descriptor = ConnectionDescriptor::from_xml(DESCRIPTOR).unwrap();
        assert_eq!(descriptor.driver, "sqlite");
        assert_eq!(descriptor.database, ":memory:");
        assert_eq!(descriptor.prefix.as_deref(), Some("app"));
        assert_eq!(descriptor.charset, None);
    }

    #[test]
    fn missing_required_node_is_config_error() {
        let text = DESCRIPTOR.replace("<password>secret</password>", "");
        let err = ConnectionDescriptor::from_xml(&text).unwrap_err();
        match err {
            AdapterError::Config(message) => assert!(message.contains("password")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn prefix_placeholder_substitution() {
        let descriptor = ConnectionDescriptor::from_xml(DESCRIPTOR).unwrap();
        assert_eq!(descriptor.prefixed_container("{prefix}page"), "app_page");

        let no_prefix = ConnectionDescriptor::from_xml(
            &DESCRIPTOR.replace("<prefix>app</prefix>", ""),
        )
        .unwrap();
        assert_eq!(no_prefix.prefixed_container("{prefix}page"), "page");
    }
}
