//! # Specification Schemas
//!
//! Versioned JSON Schema documents used to validate API specifications,
//! such as the Swagger 2.0 document an API generates for itself.
//!
//! ## Lazy loading
//!
//! A [`LazySchema`] only knows its name until first used. The first
//! membership test, lookup or validation parses the document and compiles
//! its validator; every later access reuses that result. Loading happens
//! under a mutex, so concurrent first accesses load exactly once.
//!
//! ## Version dispatch
//!
//! A [`SchemaRegistry`] maps a version key found in the document (e.g.
//! `"swagger"`) and its value (e.g. `"2.0"`) to the schema to use.
//! Schemas are compiled with a retriever scoped to the schema itself, so
//! `$ref` resolution never leaves the process.

use crate::error::Result;
use crate::validation::{FieldError, ValidationErrors};
use jsonschema::{Draft, Retrieve, Uri, Validator};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the bundled Swagger 2.0 schema
pub const OAS_20: &str = "oas-2.0.json";

const OAS_20_DOCUMENT: &str = include_str!("../schemas/oas-2.0.json");

/// Schemas compiled into the binary
fn embedded(name: &str) -> Option<&'static str> {
    match name {
        OAS_20 => Some(OAS_20_DOCUMENT),
        _ => None,
    }
}

/// The specification type or version could not be resolved
#[derive(Error, Debug)]
pub enum SpecsError {
    /// The document carries none of the registered version keys
    #[error("Unable to find any JSON Schema type specification")]
    UnknownType,

    /// The version key is known but its value is not
    #[error("Unknown {key} version: {version}")]
    UnknownVersion {
        /// The version key, e.g. `swagger`
        key: String,
        /// The unsupported version found in the document
        version: String,
    },

    /// The schema document could not be read or parsed
    #[error("schema load error for '{schema_name}': {reason}")]
    SchemaLoad {
        /// Schema filename or identifier
        schema_name: String,
        /// Reason the schema could not be loaded
        reason: String,
    },

    /// The schema document is not a valid JSON Schema
    #[error("validator build error for schema '{schema_name}': {reason}")]
    ValidatorBuild {
        /// Schema filename or identifier
        schema_name: String,
        /// Reason the validator could not be built
        reason: String,
    },
}

/// A specification failed validation against its schema
///
/// Carries every violation found, in the order reported by the validator,
/// plus the document that was checked.
#[derive(Error, Debug)]
#[error("{message}:\n{errors}")]
pub struct SchemaValidationError {
    /// Summary message
    pub message: String,
    /// All violations
    pub errors: ValidationErrors,
    /// The rejected document
    pub document: Value,
}

/// Resolves remote `$ref`s without network access
///
/// Only the schema itself (under its `id`) is known; any other URI
/// resolves to the permissive empty schema.
struct ScopedRetriever {
    schemas_by_uri: HashMap<String, Value>,
}

impl Retrieve for ScopedRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> std::result::Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let uri_str = uri.as_str();
        let key = uri_str.trim_end_matches('#');
        Ok(self
            .schemas_by_uri
            .get(key)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({})))
    }
}

/// Where a lazy schema reads its document from
#[derive(Debug, Clone)]
enum SchemaSource {
    /// Bundled document if the name is known, otherwise a file path
    Named,
    /// Explicit file path
    File(PathBuf),
}

/// Parsed document and compiled validator
struct LoadedSchema {
    document: Arc<Value>,
    validator: Validator,
}

/// A schema document loaded on first use
pub struct LazySchema {
    name: String,
    source: SchemaSource,
    loaded: Mutex<Option<Arc<LoadedSchema>>>,
    loads: AtomicUsize,
}

impl fmt::Debug for LazySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySchema")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl LazySchema {
    /// A schema identified by `name`
    ///
    /// Bundled names (see [`OAS_20`]) are served from the binary; any other
    /// name is read as a file path.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_source(name.into(), SchemaSource::Named)
    }

    /// A schema read from `path`
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::with_source(path.display().to_string(), SchemaSource::File(path))
    }

    fn with_source(name: String, source: SchemaSource) -> Self {
        Self {
            name,
            source,
            loaded: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    /// The schema identifier
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the document has been loaded
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// How many times the document has been read and compiled
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }

    fn read_source(&self) -> std::result::Result<String, SpecsError> {
        let path = match &self.source {
            SchemaSource::Named => match embedded(&self.name) {
                Some(document) => return Ok(document.to_string()),
                None => PathBuf::from(&self.name),
            },
            SchemaSource::File(path) => path.clone(),
        };
        std::fs::read_to_string(&path).map_err(|e| SpecsError::SchemaLoad {
            schema_name: self.name.clone(),
            reason: format!("cannot read {}: {e}", path.display()),
        })
    }

    fn compile(&self) -> std::result::Result<LoadedSchema, SpecsError> {
        let text = self.read_source()?;
        let document: Value =
            serde_json::from_str(&text).map_err(|e| SpecsError::SchemaLoad {
                schema_name: self.name.clone(),
                reason: format!("invalid JSON: {e}"),
            })?;

        let mut schemas_by_uri = HashMap::new();
        if let Some(id) = document.get("id").and_then(Value::as_str) {
            schemas_by_uri.insert(id.trim_end_matches('#').to_string(), document.clone());
        }

        let mut options = jsonschema::options();
        options.with_draft(Draft::Draft4);
        options.with_retriever(ScopedRetriever { schemas_by_uri });
        let validator = options
            .build(&document)
            .map_err(|e| SpecsError::ValidatorBuild {
                schema_name: self.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(LoadedSchema {
            document: Arc::new(document),
            validator,
        })
    }

    fn load(&self) -> std::result::Result<Arc<LoadedSchema>, SpecsError> {
        let mut slot = self.loaded.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(loaded) = slot.as_ref() {
            return Ok(Arc::clone(loaded));
        }
        let loaded = Arc::new(self.compile()?);
        self.loads.fetch_add(1, Ordering::AcqRel);
        debug!(schema = %self.name, "Loaded JSON schema");
        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// The parsed schema document
    ///
    /// # Errors
    ///
    /// Returns `SpecsError` if the schema cannot be loaded.
    pub fn document(&self) -> std::result::Result<Arc<Value>, SpecsError> {
        Ok(Arc::clone(&self.load()?.document))
    }

    /// Whether the schema has a top-level `key`
    ///
    /// # Errors
    ///
    /// Returns `SpecsError` if the schema cannot be loaded.
    pub fn contains_key(&self, key: &str) -> std::result::Result<bool, SpecsError> {
        Ok(self.load()?.document.get(key).is_some())
    }

    /// The schema's top-level `key`
    ///
    /// # Errors
    ///
    /// Returns `SpecsError` if the schema cannot be loaded.
    pub fn get(&self, key: &str) -> std::result::Result<Option<Value>, SpecsError> {
        Ok(self.load()?.document.get(key).cloned())
    }

    /// Collect every violation of `instance` against this schema
    ///
    /// # Errors
    ///
    /// Returns `SpecsError` if the schema cannot be loaded.
    pub fn violations(&self, instance: &Value) -> std::result::Result<ValidationErrors, SpecsError> {
        let loaded = self.load()?;
        Ok(loaded
            .validator
            .iter_errors(instance)
            .map(|e| FieldError::from_schema_error("", &e))
            .collect())
    }
}

/// Version key → version → schema
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    specs: Vec<(String, Vec<(String, Arc<LazySchema>)>)>,
}

impl SchemaRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry of known API specification formats: Swagger 2.0
    #[must_use]
    pub fn specifications() -> Self {
        Self::new().with_schema("swagger", "2.0", LazySchema::new(OAS_20))
    }

    /// Register `schema` for documents whose `key` equals `version`
    #[must_use]
    pub fn with_schema(
        mut self,
        key: impl Into<String>,
        version: impl Into<String>,
        schema: LazySchema,
    ) -> Self {
        let key = key.into();
        let entry = (version.into(), Arc::new(schema));
        match self.specs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, versions)) => versions.push(entry),
            None => self.specs.push((key, vec![entry])),
        }
        self
    }

    /// The schema registered for `key` = `version`
    #[must_use]
    pub fn lookup(&self, key: &str, version: &str) -> Option<&Arc<LazySchema>> {
        self.specs
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, versions)| versions.iter().find(|(v, _)| v == version))
            .map(|(_, schema)| schema)
    }

    /// Validate a specification document against the schema its version
    /// key selects
    ///
    /// # Errors
    ///
    /// - `Error::Specs` when no version key is present, the version is
    ///   unknown, or the schema cannot be loaded.
    /// - `Error::SchemaValidation` carrying every violation otherwise.
    pub fn validate(&self, document: &Value) -> Result<bool> {
        for (key, versions) in &self.specs {
            let Some(found) = document.get(key.as_str()) else {
                continue;
            };
            let version = found
                .as_str()
                .map_or_else(|| found.to_string(), str::to_string);
            let schema = versions
                .iter()
                .find(|(v, _)| *v == version)
                .map(|(_, schema)| schema)
                .ok_or_else(|| SpecsError::UnknownVersion {
                    key: key.clone(),
                    version: version.clone(),
                })?;

            let errors = schema.violations(document)?;
            if errors.is_empty() {
                return Ok(true);
            }
            warn!(
                schema = %schema.name(),
                violations = errors.len(),
                "Specification failed schema validation"
            );
            return Err(SchemaValidationError {
                message: format!("Your specification is not a valid {key} {version} document"),
                errors,
                document: document.clone(),
            }
            .into());
        }
        Err(SpecsError::UnknownType.into())
    }
}
