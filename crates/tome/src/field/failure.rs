use serde_json::Value;
use std::{collections::BTreeMap, fmt};

///
/// ValidationFailure
///
/// Structured validation outcome for one field (or one model).
///
/// Leaf failures carry the offending value and a message. Composite failures
/// aggregate per-field failures (`fields`) and per-element failures
/// (`elements`). A failure is resolved when a fallback replaced the value or
/// the offending element was dropped.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationFailure {
    pub invalid_value: Option<Value>,
    pub fallback: Option<Value>,
    pub dropped: bool,
    pub message: Option<String>,
    pub fields: BTreeMap<String, Self>,
    pub elements: Vec<ElementFailure>,
    unresolved: bool,
}

///
/// ElementFailure
///

#[derive(Clone, Debug, PartialEq)]
pub struct ElementFailure {
    /// Array index, or child document id.
    pub id: String,
    pub name: Option<String>,
    pub failure: ValidationFailure,
}

impl ValidationFailure {
    /// Leaf failure for a value that could not be accepted.
    #[must_use]
    pub fn new(invalid_value: &Value, message: impl Into<String>) -> Self {
        Self {
            invalid_value: Some(invalid_value.clone()),
            message: Some(message.into()),
            unresolved: true,
            ..Self::default()
        }
    }

    /// Failure carrying only a message (joint rules).
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            unresolved: true,
            ..Self::default()
        }
    }

    /// Mark the failure resolved by substituting `fallback`.
    #[must_use]
    pub fn resolved_with(mut self, fallback: Value) -> Self {
        self.fallback = Some(fallback);
        self.unresolved = false;
        self.fields.clear();
        self.elements.clear();
        self
    }

    /// Mark the failure resolved by dropping the offending element.
    #[must_use]
    pub fn dropped(mut self) -> Self {
        self.dropped = true;
        self.unresolved = false;
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.unresolved && self.message.is_none() && self.fields.is_empty() && self.elements.is_empty()
    }

    /// True when this failure or any nested failure is unresolved.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.unresolved
            || self.fields.values().any(Self::is_unresolved)
            || self.elements.iter().any(|e| e.failure.is_unresolved())
    }

    /// Flatten leaf messages into `path -> messages`.
    #[must_use]
    pub fn issues(&self) -> BTreeMap<String, Vec<String>> {
        let mut issues = BTreeMap::new();
        self.collect_issues("", &mut issues);

        issues
    }

    fn collect_issues(&self, path: &str, issues: &mut BTreeMap<String, Vec<String>>) {
        let is_leaf = self.fields.is_empty() && self.elements.is_empty();
        if is_leaf {
            if let Some(message) = &self.message {
                let mut message = message.clone();
                if self.fallback.is_some() {
                    message.push_str(" (fallback applied)");
                } else if self.dropped {
                    message.push_str(" (dropped)");
                }
                issues.entry(path.to_string()).or_default().push(message);
            }
            return;
        }

        for (name, failure) in &self.fields {
            let child = if path.is_empty() {
                name.clone()
            } else {
                format!("{path}.{name}")
            };
            failure.collect_issues(&child, issues);
        }

        for element in &self.elements {
            let child = format!("{path}[{}]", element.id);
            element.failure.collect_issues(&child, issues);
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let issues = self.issues();
        let is_leaf = self.fields.is_empty() && self.elements.is_empty();

        match &self.message {
            Some(message) if !is_leaf => write!(f, "{message}")?,
            Some(message) if issues.is_empty() || issues.contains_key("") => {
                return write!(f, "{message}");
            }
            _ => write!(f, "validation failed")?,
        }

        for (path, messages) in issues {
            for message in messages {
                write!(f, "\n  {path}: {message}")?;
            }
        }

        Ok(())
    }
}
