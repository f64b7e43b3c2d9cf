//! Collections, partition paths and partition-key inference.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{document::string_field, Document, StoreError};

/// Where a collection reads its partition value from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartitionPath {
    /// The document's own `id`.
    Id,
    /// A dedicated top-level field.
    Field(String),
}

impl FromStr for PartitionPath {
    type Err = StoreError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let field = path.strip_prefix('/').ok_or_else(|| {
            StoreError::InvalidDocument(format!("partition path must start with '/': {path}"))
        })?;
        if field.is_empty()
            || !field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StoreError::InvalidDocument(format!(
                "unsupported partition path: {path}"
            )));
        }
        if field == "id" {
            Ok(Self::Id)
        } else {
            Ok(Self::Field(field.to_string()))
        }
    }
}

impl fmt::Display for PartitionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id => f.write_str("/id"),
            Self::Field(field) => write!(f, "/{field}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collection {
    name: String,
    partition: PartitionPath,
    id_prefix: String,
    fallback_key: Option<String>,
}

impl Collection {
    /// A collection partitioned by its own `id`.
    #[must_use]
    pub fn by_id(name: impl Into<String>) -> Self {
        Self::new(name, PartitionPath::Id)
    }

    #[must_use]
    pub fn new(name: impl Into<String>, partition: PartitionPath) -> Self {
        let name = name.into();
        Self {
            id_prefix: name.trim_end_matches('s').to_string(),
            name,
            partition,
            fallback_key: None,
        }
    }

    /// Prefix used for generated ids (`<prefix>:<uuid>`).
    #[must_use]
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Business key copied into the partition field when a document lacks it.
    #[must_use]
    pub fn with_fallback_key(mut self, field: impl Into<String>) -> Self {
        self.fallback_key = Some(field.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn partition(&self) -> &PartitionPath {
        &self.partition
    }

    #[must_use]
    pub fn fallback_key(&self) -> Option<&str> {
        self.fallback_key.as_deref()
    }

    /// Fill in `id` and the partition field when absent, returning the
    /// resolved `(id, partition)` pair. Existing values are never overwritten.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDocument` when the partition field is absent and no
    /// fallback business key can stand in for it.
    pub fn infer(&self, doc: &mut Document) -> Result<(String, String), StoreError> {
        let id = match string_field(doc, "id") {
            Some(id) => id.to_string(),
            None => {
                let id = format!("{}:{}", self.id_prefix, Uuid::new_v4());
                doc.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };

        let partition = match &self.partition {
            PartitionPath::Id => id.clone(),
            PartitionPath::Field(field) => match string_field(doc, field) {
                Some(value) => value.to_string(),
                None => {
                    let value = self
                        .fallback_key
                        .as_deref()
                        .and_then(|key| string_field(doc, key))
                        .map(str::to_string)
                        .ok_or_else(|| {
                            StoreError::InvalidDocument(format!(
                                "cannot infer partition '{field}' for '{}'",
                                self.name
                            ))
                        })?;
                    doc.insert(field.clone(), Value::String(value.clone()));
                    value
                }
            },
        };

        Ok((id, partition))
    }
}
