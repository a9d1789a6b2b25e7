//! Fluent builder for `crustomize.yml` in tests
//!
//! ```rust,ignore
//! let manifest = ManifestBuilder::new("./base")
//!     .overlay("./overlays/dev.yml")
//!     .overlay_with("./overlays/tags.yml", "replace")
//!     .stack("app")
//!     .tag("Env", "dev")
//!     .value("name", json!("bucket1"))
//!     .build();
//! ```

use serde_json::{Map, Value, json};

/// Builder for test manifests
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    doc: Map<String, Value>,
}

impl ManifestBuilder {
    /// A manifest with `base` and empty `values`
    pub fn new(base: &str) -> Self {
        let mut doc = Map::new();
        doc.insert("base".to_string(), json!(base));
        doc.insert("values".to_string(), json!({}));
        Self {
            doc,
        }
    }

    fn push(mut self, key: &str, item: Value) -> Self {
        let entry = self.doc.entry(key).or_insert_with(|| json!([]));
        if let Some(items) = entry.as_array_mut() {
            items.push(item);
        }
        self
    }

    fn object(&mut self, key: &str) -> &mut Map<String, Value> {
        let entry = self.doc.entry(key).or_insert_with(|| json!({}));
        if !entry.is_object() {
            *entry = json!({});
        }
        entry.as_object_mut().expect("just made an object")
    }

    /// Add a bare overlay (arrays append)
    pub fn overlay(self, file: &str) -> Self {
        self.push("overlays", json!(file))
    }

    /// Add an overlay with an explicit array merge policy
    pub fn overlay_with(self, file: &str, array_merge: &str) -> Self {
        self.push("overlays", json!({"file": file, "arrayMerge": array_merge}))
    }

    /// Set the params document
    pub fn params(mut self, params: &str) -> Self {
        self.doc.insert("params".to_string(), json!(params));
        self
    }

    /// Set the engine
    pub fn render(mut self, engine: &str) -> Self {
        self.doc.insert("render".to_string(), json!(engine));
        self
    }

    /// Set the stack name
    pub fn stack(mut self, name: &str) -> Self {
        self.object("stack").insert("name".to_string(), json!(name));
        self
    }

    /// Add a stack tag
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        let stack = self.object("stack");
        let tags = stack.entry("tags").or_insert_with(|| json!({}));
        if let Some(tags) = tags.as_object_mut() {
            tags.insert(key.to_string(), json!(value));
        }
        self
    }

    /// Add a manifest variable
    pub fn var(mut self, key: &str, value: &str) -> Self {
        self.object("vars").insert(key.to_string(), json!(value));
        self
    }

    /// Add a template value
    pub fn value(mut self, key: &str, value: Value) -> Self {
        self.object("values").insert(key.to_string(), value);
        self
    }

    /// Add a JSON patch operation
    pub fn patch(self, op: Value) -> Self {
        self.push("patches", op)
    }

    /// Serialize to YAML
    pub fn build(self) -> String {
        serde_yaml::to_string(&Value::Object(self.doc)).expect("manifest serializes")
    }
}
