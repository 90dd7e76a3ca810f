use crate::{
    Source,
    db::{Database, DatabaseOperation},
    document::{Document, DocumentError, ownership::User},
    model::UpdateOptions,
    patch::{deletion_key, get_property},
};
use serde_json::{Map, Value};

impl Document {
    // ======================================================================
    // Flags
    // ======================================================================

    /// Read `flags.<scope>.<key>`. The key may be dotted.
    pub fn get_flag(&self, scopes: &[String], scope: &str, key: &str) -> Result<Option<Value>, DocumentError> {
        check_scope(scopes, scope)?;

        Ok(self
            .source()
            .get("flags")
            .and_then(|flags| get_property(flags, &format!("{scope}.{key}")))
            .cloned())
    }

    /// Write a flag into source without persisting it.
    pub fn set_flag_source(
        &mut self,
        scopes: &[String],
        scope: &str,
        key: &str,
        value: Value,
    ) -> Result<Source, DocumentError> {
        check_scope(scopes, scope)?;
        self.require_flags()?;

        Ok(self.update_source(flag_change(scope, key, value), UpdateOptions::default())?)
    }

    /// Persist a flag through the update pipeline.
    pub async fn set_flag(
        &self,
        db: &Database,
        scope: &str,
        key: &str,
        value: Value,
        user: &User,
    ) -> Result<Option<Self>, DocumentError> {
        check_scope(&db.flag_scopes(), scope)?;
        self.require_flags()?;

        self.update(db, flag_change(scope, key, value), DatabaseOperation::default(), user)
            .await
    }

    /// Remove a flag through the update pipeline.
    pub async fn unset_flag(
        &self,
        db: &Database,
        scope: &str,
        key: &str,
        user: &User,
    ) -> Result<Option<Self>, DocumentError> {
        check_scope(&db.flag_scopes(), scope)?;
        self.require_flags()?;

        let path = match key.rsplit_once('.') {
            Some((head, leaf)) => format!("flags.{scope}.{head}.{}", deletion_key(leaf)),
            None => format!("flags.{scope}.{}", deletion_key(key)),
        };
        let mut changes = Map::new();
        changes.insert(path, Value::Null);

        self.update(db, Value::Object(changes), DatabaseOperation::default(), user)
            .await
    }

    fn require_flags(&self) -> Result<(), DocumentError> {
        if self.schema().has("flags") {
            Ok(())
        } else {
            Err(DocumentError::FlagsUnsupported {
                document_name: self.document_name(),
            })
        }
    }
}

fn check_scope(scopes: &[String], scope: &str) -> Result<(), DocumentError> {
    if scopes.iter().any(|s| s == scope) {
        Ok(())
    } else {
        Err(DocumentError::InvalidFlagScope(scope.to_string()))
    }
}

fn flag_change(scope: &str, key: &str, value: Value) -> Value {
    let mut changes = Map::new();
    changes.insert(format!("flags.{scope}.{key}"), value);

    Value::Object(changes)
}
