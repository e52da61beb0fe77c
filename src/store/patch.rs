use crate::model::Record;

use serde_json::Value;

/// An explicit list of attribute assignments applied by a store update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributePatch {
    sets: Vec<(String, Value)>,
}

impl AttributePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an assignment. A later assignment to the same field replaces the
    /// earlier one.
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.sets.iter_mut().find(|(f, _)| f == field) {
            Some(existing) => existing.1 = value,
            None => self.sets.push((field.to_string(), value)),
        }
        self
    }

    /// Attributes of `new` whose value differs from `old`, excluding key
    /// attributes, in attribute-name order.
    pub fn diff(old: &Record, new: &Record, exclude: &[&str]) -> Self {
        let mut fields: Vec<&String> = new
            .keys()
            .filter(|k| !exclude.contains(&k.as_str()))
            .filter(|k| old.get(k.as_str()) != new.get(k.as_str()))
            .collect();
        fields.sort();

        fields
            .into_iter()
            .fold(Self::new(), |patch, field| patch.set(field, new[field].clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.sets.iter().map(|(f, _)| f.as_str())
    }

    pub fn apply(&self, record: &mut Record) {
        for (field, value) in &self.sets {
            record.insert(field.clone(), value.clone());
        }
    }
}

impl FromIterator<(String, Value)> for AttributePatch {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |patch, (field, value)| patch.set(&field, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_replaces_same_field() {
        let patch = AttributePatch::new().set("name", "a").set("line", 2).set("name", "b");
        let mut record = Record::new();
        patch.apply(&mut record);

        assert_eq!(patch.fields().collect::<Vec<_>>(), vec!["name", "line"]);
        assert_eq!(record["name"], json!("b"));
        assert_eq!(record["line"], json!(2));
    }

    #[test]
    fn test_diff_lists_changed_fields_only() {
        let old: Record = serde_json::from_value(json!({"id": "m1", "type": "MACHINE", "name": "a", "x": 1})).unwrap();
        let new: Record = serde_json::from_value(json!({"id": "m1", "type": "MACHINE", "name": "b", "x": 1, "y": 2})).unwrap();

        let patch = AttributePatch::diff(&old, &new, &["id", "type"]);
        assert_eq!(patch.fields().collect::<Vec<_>>(), vec!["name", "y"]);
    }
}
