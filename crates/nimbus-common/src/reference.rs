use std::fmt;

use crate::error::{NimbusError, Result};

/// Version selector in a resource reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Latest,
    Version(String),
}

impl Label {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("latest") {
            Label::Latest
        } else {
            Label::Version(raw.to_string())
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Latest => f.write_str("latest"),
            Label::Version(v) => f.write_str(v),
        }
    }
}

/// A reference to a remote resource as written in a descriptor.
///
/// Accepted forms: `name`, `namespace:name`, `namespace:name@label` and
/// `namespace:name:version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub namespace: Option<String>,
    pub name: String,
    pub label: Option<Label>,
}

impl ResourceRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (body, label) = match raw.split_once('@') {
            Some((body, label)) => {
                if label.is_empty() || label.contains(['@', ':']) {
                    return Err(invalid(raw, "bad label"));
                }
                (body, Some(Label::parse(label)))
            }
            None => (raw, None),
        };

        let parts: Vec<&str> = body.split(':').collect();
        let (namespace, name, version) = match parts.as_slice() {
            [name] => (None, *name, None),
            [ns, name] => (Some(*ns), *name, None),
            [ns, name, version] if label.is_none() => (Some(*ns), *name, Some(*version)),
            _ => return Err(invalid(raw, "expected namespace:name[@label|:version]")),
        };

        if name.is_empty() || namespace.is_some_and(str::is_empty) {
            return Err(invalid(raw, "empty segment"));
        }
        if version.is_some_and(str::is_empty) {
            return Err(invalid(raw, "empty version"));
        }

        Ok(Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
            label: label.or_else(|| version.map(|v| Label::Version(v.to_string()))),
        })
    }
}

fn invalid(raw: &str, why: &str) -> NimbusError {
    NimbusError::InvalidReference(format!("'{raw}': {why}"))
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.namespace {
            write!(f, "{ns}:")?;
        }
        f.write_str(&self.name)?;
        match &self.label {
            Some(Label::Latest) => f.write_str("@latest"),
            Some(Label::Version(v)) => write!(f, ":{v}"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_form() {
        let r = ResourceRef::parse("azureml:heart-classifier@latest").unwrap();
        assert_eq!(r.namespace.as_deref(), Some("azureml"));
        assert_eq!(r.name, "heart-classifier");
        assert_eq!(r.label, Some(Label::Latest));
    }

    #[test]
    fn test_version_forms() {
        let a = ResourceRef::parse("azureml:heart-classifier:3").unwrap();
        let b = ResourceRef::parse("azureml:heart-classifier@3").unwrap();
        assert_eq!(a.label, Some(Label::Version("3".into())));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "azureml:heart-classifier:3");
    }

    #[test]
    fn test_compute_form() {
        let r = ResourceRef::parse("azureml:batch-cluster").unwrap();
        assert_eq!(r.name, "batch-cluster");
        assert_eq!(r.label, None);
        assert_eq!(ResourceRef::parse("batch-cluster").unwrap().namespace, None);
    }

    #[test]
    fn test_rejects_malformed() {
        for raw in ["", "azureml:", ":x", "a:b:c@latest", "a:b:c:d", "a@", "a:b:"] {
            assert!(ResourceRef::parse(raw).is_err(), "accepted {raw:?}");
        }
    }
}
