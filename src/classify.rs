//! Run metadata and the classifier capabilities
//!
//! Every run carries a `metadata.json` record. Two caller-supplied
//! classifiers map it to a setup name and a subplot index; returning `None`
//! from either one excludes the run from the comparison.
//!
//! Closures implement both traits:
//!
//! ```rust
//! use trueno_compare::classify::{RunMetadata, SetupClassifier};
//!
//! let by_method = |md: &RunMetadata| -> anyhow::Result<Option<String>> {
//!     Ok(md.get_str("algorithm").map(str::to_string))
//! };
//! let md = RunMetadata::from_json_str(r#"{"benchmark": "b", "algorithm": "RS"}"#)?;
//! assert_eq!(by_method.classify_setup(&md)?, Some("RS".to_string()));
//! # Ok::<(), anyhow::Error>(())
//! ```

use serde_json::{Map, Value};

/// Metadata record read once per run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunMetadata {
    fields: Map<String, Value>,
}

impl RunMetadata {
    /// Wrap an already parsed JSON object
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Parse metadata from JSON text; the top level must be an object
    ///
    /// # Errors
    /// Returns error on invalid JSON or a non-object top level
    pub fn from_json_str(text: &str) -> crate::Result<Self> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(crate::Error::Other(format!(
                "metadata must be a JSON object, got {other}"
            ))),
        }
    }

    /// Raw value for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String value for `key` (`None` if absent or not a string)
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Integer value for `key` (`None` if absent or not an integer)
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    /// Whether `key` is present
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Underlying JSON object
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Maps run metadata to a setup name (`None` excludes the run)
pub trait SetupClassifier {
    /// Classify one run
    ///
    /// # Errors
    /// Errors are propagated to the caller, annotated with the run path
    fn classify_setup(&self, metadata: &RunMetadata) -> anyhow::Result<Option<String>>;
}

/// Maps run metadata to a subplot index (`None` excludes the run)
pub trait SubplotClassifier {
    /// Classify one run
    ///
    /// # Errors
    /// Errors are propagated to the caller, annotated with the run path
    fn classify_subplot(&self, metadata: &RunMetadata) -> anyhow::Result<Option<usize>>;
}

impl<F> SetupClassifier for F
where
    F: Fn(&RunMetadata) -> anyhow::Result<Option<String>>,
{
    fn classify_setup(&self, metadata: &RunMetadata) -> anyhow::Result<Option<String>> {
        self(metadata)
    }
}

impl<F> SubplotClassifier for F
where
    F: Fn(&RunMetadata) -> anyhow::Result<Option<usize>>,
{
    fn classify_subplot(&self, metadata: &RunMetadata) -> anyhow::Result<Option<usize>> {
        self(metadata)
    }
}

/// Setup name taken from a string metadata field
///
/// Runs without the field are excluded. Runs where the field holds a
/// non-string value are an error.
#[derive(Debug, Clone)]
pub struct SetupFromKey {
    key: String,
}

/// Classify by the string value stored under `key`
#[must_use]
pub fn setup_from_key(key: impl Into<String>) -> SetupFromKey {
    SetupFromKey { key: key.into() }
}

impl SetupClassifier for SetupFromKey {
    fn classify_setup(&self, metadata: &RunMetadata) -> anyhow::Result<Option<String>> {
        match metadata.get(&self.key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => anyhow::bail!("metadata key {:?} is not a string: {other}", self.key),
        }
    }
}

/// Subplot index looked up from a metadata field among a list of values
///
/// The subplot index is the position of the field's value in `values`.
/// Runs whose value is not listed are excluded.
#[derive(Debug, Clone)]
pub struct SubplotFromKey {
    key: String,
    values: Vec<Value>,
}

/// Classify by position of `metadata[key]` in `values`
#[must_use]
pub fn subplot_from_key(key: impl Into<String>, values: Vec<Value>) -> SubplotFromKey {
    SubplotFromKey {
        key: key.into(),
        values,
    }
}

impl SubplotClassifier for SubplotFromKey {
    fn classify_subplot(&self, metadata: &RunMetadata) -> anyhow::Result<Option<usize>> {
        Ok(metadata
            .get(&self.key)
            .and_then(|v| self.values.iter().position(|x| x == v)))
    }
}
