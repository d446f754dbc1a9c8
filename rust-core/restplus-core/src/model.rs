//! # Models
//!
//! The validation capability handlers declare for their payloads, and the
//! JSON Schema backed implementation of it.
//!
//! Models reference each other with `{"$ref": "#/definitions/<Name>"}`.
//! The [`RefResolver`] holds every registered definition and embeds them
//! into the schema being compiled, so those references resolve locally.

use crate::validation::{FieldError, ValidationCode, ValidationErrors, ValidationResult};
use jsonschema::{Draft, ValidationOptions, Validator};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

/// Something a payload can be validated against
pub trait Model: Send + Sync {
    /// Name the model is registered under
    fn name(&self) -> &str;

    /// Check `instance` against this model
    ///
    /// # Errors
    ///
    /// Returns every violation found.
    fn validate(
        &self,
        instance: &Value,
        resolver: &RefResolver,
        format_checker: &FormatChecker,
    ) -> ValidationResult<()>;

    /// Check every element of a collection payload
    ///
    /// Errors are re-rooted below the element index (`1.task`).
    ///
    /// # Errors
    ///
    /// Returns every violation of every element.
    fn validate_each(
        &self,
        instances: &[Value],
        resolver: &RefResolver,
        format_checker: &FormatChecker,
    ) -> ValidationResult<()> {
        let mut errors = ValidationErrors::new();
        for (index, instance) in instances.iter().enumerate() {
            if let Err(item_errors) = self.validate(instance, resolver, format_checker) {
                let base = index.to_string();
                errors
                    .errors
                    .extend(item_errors.errors.into_iter().map(|e| e.under(&base)));
            }
        }
        errors.into_result()
    }
}

/// Shared handle to a model
pub type ModelRef = Arc<dyn Model>;

/// Payload a handler expects
#[derive(Clone)]
pub enum ExpectedPayload {
    /// A single object
    Object(ModelRef),
    /// A list of objects; a lone object is accepted as a list of one
    Collection(ModelRef),
}

impl ExpectedPayload {
    /// The model the payload is checked against
    #[must_use]
    pub fn model(&self) -> &ModelRef {
        match self {
            Self::Object(model) | Self::Collection(model) => model,
        }
    }

    /// Whether a list is expected
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }
}

impl fmt::Debug for ExpectedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(model) => f.debug_tuple("Object").field(&model.name()).finish(),
            Self::Collection(model) => f.debug_tuple("Collection").field(&model.name()).finish(),
        }
    }
}

/// Named model definitions used to resolve `#/definitions/...` references
#[derive(Debug, Clone, Default)]
pub struct RefResolver {
    definitions: Arc<Map<String, Value>>,
}

impl RefResolver {
    /// Create a resolver without definitions
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the schema of `name`, replacing an earlier one
    pub fn insert(&mut self, name: impl Into<String>, schema: Value) {
        Arc::make_mut(&mut self.definitions).insert(name.into(), schema);
    }

    /// Builder-style [`insert`](Self::insert)
    #[must_use]
    pub fn with_definition(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.insert(name, schema);
        self
    }

    /// Schema registered under `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.definitions.get(name)
    }

    /// Number of definitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// True when no definition is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// `schema` with every definition embedded under `definitions`
    ///
    /// Definitions already present in `schema` take precedence.
    #[must_use]
    pub fn embed(&self, schema: &Value) -> Value {
        let Value::Object(object) = schema else {
            return schema.clone();
        };
        if self.definitions.is_empty() {
            return schema.clone();
        }
        let mut object = object.clone();
        let mut definitions = (*self.definitions).clone();
        if let Some(Value::Object(local)) = object.remove("definitions") {
            definitions.extend(local);
        }
        object.insert("definitions".to_string(), Value::Object(definitions));
        Value::Object(object)
    }
}

/// Format predicate for custom `format` keywords
pub type FormatFn = fn(&str) -> bool;

/// Controls enforcement of the `format` keyword
#[derive(Debug, Clone)]
pub struct FormatChecker {
    enabled: bool,
    formats: Vec<(String, FormatFn)>,
}

impl Default for FormatChecker {
    fn default() -> Self {
        Self {
            enabled: true,
            formats: Vec::new(),
        }
    }
}

impl FormatChecker {
    /// A checker enforcing the standard formats
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A checker ignoring `format` entirely
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            formats: Vec::new(),
        }
    }

    /// Add a custom named format
    #[must_use]
    pub fn with_format(mut self, name: impl Into<String>, check: FormatFn) -> Self {
        self.formats.push((name.into(), check));
        self
    }

    /// Whether `format` is enforced
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Apply this checker to validator options
    pub fn configure(&self, options: &mut ValidationOptions) {
        options.should_validate_formats(self.enabled);
        for (name, check) in &self.formats {
            options.with_format(name.clone(), *check);
        }
    }
}

/// A model described by a JSON Schema object
#[derive(Debug, Clone)]
pub struct SchemaModel {
    name: String,
    schema: Value,
}

impl SchemaModel {
    /// Create a model named `name` from `schema`
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// The model's own schema
    #[must_use]
    pub const fn schema(&self) -> &Value {
        &self.schema
    }

    /// `{"$ref": "#/definitions/<name>"}` pointing at this model
    #[must_use]
    pub fn reference(&self) -> Value {
        json!({ "$ref": format!("#/definitions/{}", self.name) })
    }

    fn compile(
        &self,
        resolver: &RefResolver,
        format_checker: &FormatChecker,
    ) -> ValidationResult<Validator> {
        let schema = resolver.embed(&self.schema);
        let mut options = jsonschema::options();
        options.with_draft(Draft::Draft4);
        format_checker.configure(&mut options);

        options.build(&schema).map_err(|e| {
            let mut errors = ValidationErrors::new();
            errors.add(FieldError::new(
                "",
                format!("model {} has an invalid schema: {e}", self.name),
                ValidationCode::Custom,
            ));
            errors
        })
    }
}

impl Model for SchemaModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(
        &self,
        instance: &Value,
        resolver: &RefResolver,
        format_checker: &FormatChecker,
    ) -> ValidationResult<()> {
        self.compile(resolver, format_checker)?
            .iter_errors(instance)
            .map(|e| FieldError::from_schema_error("", &e))
            .collect::<ValidationErrors>()
            .into_result()
    }

    fn validate_each(
        &self,
        instances: &[Value],
        resolver: &RefResolver,
        format_checker: &FormatChecker,
    ) -> ValidationResult<()> {
        let validator = self.compile(resolver, format_checker)?;
        instances
            .iter()
            .enumerate()
            .flat_map(|(index, instance)| {
                let base = index.to_string();
                validator
                    .iter_errors(instance)
                    .map(move |e| FieldError::from_schema_error(&base, &e))
            })
            .collect::<ValidationErrors>()
            .into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn todo() -> SchemaModel {
        SchemaModel::new(
            "Todo",
            json!({
                "type": "object",
                "required": ["task"],
                "properties": {
                    "task": {"type": "string"},
                    "owner": {"$ref": "#/definitions/Person"}
                }
            }),
        )
    }

    fn resolver() -> RefResolver {
        RefResolver::new().with_definition(
            "Person",
            json!({
                "type": "object",
                "required": ["email"],
                "properties": {"email": {"type": "string", "format": "email"}}
            }),
        )
    }

    #[test]
    fn test_valid_instance() {
        let result = todo().validate(
            &json!({"task": "write", "owner": {"email": "a@example.com"}}),
            &resolver(),
            &FormatChecker::new(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let errors = todo()
            .validate(&json!({}), &resolver(), &FormatChecker::new())
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors[0].code, ValidationCode::Required);
    }

    #[test]
    fn test_reference_resolved_through_resolver() {
        let errors = todo()
            .validate(
                &json!({"task": "write", "owner": {}}),
                &resolver(),
                &FormatChecker::new(),
            )
            .unwrap_err();
        assert_eq!(errors.errors[0].field, "owner");
    }

    #[test]
    fn test_format_checker_toggle() {
        let instance = json!({"task": "write", "owner": {"email": "not an address"}});
        assert!(todo()
            .validate(&instance, &resolver(), &FormatChecker::new())
            .is_err());
        assert!(todo()
            .validate(&instance, &resolver(), &FormatChecker::disabled())
            .is_ok());
    }

    #[test]
    fn test_custom_format() {
        let model = SchemaModel::new("Code", json!({"type": "string", "format": "upper"}));
        let checker = FormatChecker::new().with_format("upper", |s| s.chars().all(char::is_uppercase));
        assert!(model.validate(&json!("ABC"), &RefResolver::new(), &checker).is_ok());
        assert!(model.validate(&json!("abc"), &RefResolver::new(), &checker).is_err());
    }

    #[test]
    fn test_validate_each_prefixes_element_index() {
        let items = [
            json!({"task": "write"}),
            json!({"task": 3}),
            json!({"owner": {}}),
        ];
        let errors = todo()
            .validate_each(&items, &resolver(), &FormatChecker::new())
            .unwrap_err();

        let mut fields: Vec<&str> = errors.errors.iter().map(|e| e.field.as_str()).collect();
        fields.sort_unstable();
        assert_eq!(fields, ["1.task", "2", "2.owner"]);
        assert!(todo()
            .validate_each(&[], &resolver(), &FormatChecker::new())
            .is_ok());
    }

    #[test]
    fn test_validate_each_reports_invalid_schema_once() {
        let model = SchemaModel::new("Broken", json!({"type": 12}));
        let errors = model
            .validate_each(&[json!(1), json!(2)], &RefResolver::new(), &FormatChecker::new())
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors.errors[0].message.contains("Broken"));
    }

    #[test]
    fn test_embed_keeps_local_definitions() {
        let schema = json!({"definitions": {"Person": {"type": "string"}}});
        let embedded = resolver().embed(&schema);
        assert_eq!(embedded["definitions"]["Person"], json!({"type": "string"}));
    }

    #[test]
    fn test_reference() {
        assert_eq!(todo().reference(), json!({"$ref": "#/definitions/Todo"}));
        let expected = ExpectedPayload::Collection(Arc::new(todo()));
        assert!(expected.is_collection());
        assert_eq!(expected.model().name(), "Todo");
    }
}
