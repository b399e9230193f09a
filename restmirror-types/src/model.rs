use crate::{EntityId, Params, Record};
use serde_json::Value;

/// Capability interface for the values a collection stores.
///
/// The plain [`Record`] implements it and is the default model. Custom
/// models wrap a record and add derived state or behavior; they only need
/// to say how they are built from wire data, how their fields are read, and
/// how a partial update is merged into them.
///
/// Only `from_record`, `field`, `apply_mutation` and `to_record` are
/// required. The identity and matching helpers are derived from `field`.
pub trait Model: Clone + Send + Sync + 'static {
    /// Builds a model from a record received from the server or added locally.
    fn from_record(record: Record) -> Self;

    /// Reads a top-level field.
    fn field(&self, name: &str) -> Option<&Value>;

    /// Merges `patch` into this model in place. Fields absent from the patch
    /// are kept.
    fn apply_mutation(&mut self, patch: &Record);

    /// Serializes the model back to a record, e.g. for an update request.
    fn to_record(&self) -> Record;

    /// Returns the identity stored under `id_field`, if any.
    fn identity_value(&self, id_field: &str) -> Option<EntityId> {
        self.field(id_field).and_then(EntityId::from_value)
    }

    /// Returns whether every given field is present with an equal value.
    fn matches(&self, fields: &Params) -> bool {
        fields.iter().all(|(k, v)| self.field(k) == Some(v))
    }
}

impl Model for Record {
    fn from_record(record: Record) -> Self {
        record
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }

    fn apply_mutation(&mut self, patch: &Record) {
        for (k, v) in patch {
            self.insert(k.clone(), v.clone());
        }
    }

    fn to_record(&self) -> Record {
        self.clone()
    }
}
