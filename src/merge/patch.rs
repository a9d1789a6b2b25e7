//! Ordered JSON Patch application against the merged document.

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::core::CrustomizeError;

/// One JSON Patch (RFC 6902) operation as written in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    /// `add`, `remove`, `replace`, `move`, `copy` or `test`
    pub op: String,
    /// JSON Pointer to the target location
    pub path: String,
    /// Operand for `add`, `replace` and `test`. `Some(Value::Null)` is an
    /// explicit `value: null`; `None` means the key was absent.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Source pointer for `move` and `copy`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl std::fmt::Display for PatchOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        f.write_str(&rendered)
    }
}

/// Apply `ops` to `doc` strictly in list order.
///
/// Operations are applied one at a time so the first failure can be reported by
/// index. On failure `doc` may hold the effects of the operations before it.
pub fn apply_patches(doc: &mut Value, ops: &[PatchOp]) -> Result<()> {
    for (index, op) in ops.iter().enumerate() {
        let fail = |reason: String| CrustomizeError::PatchError {
            index,
            operation: op.to_string(),
            reason,
        };

        let operation: json_patch::PatchOperation = serde_json::to_value(op)
            .and_then(serde_json::from_value)
            .map_err(|e| fail(format!("invalid operation: {e}")))?;

        json_patch::patch(doc, &[operation]).map_err(|e| fail(e.to_string()))?;
        tracing::debug!("Applied patch {}: {} {}", index, op.op, op.path);
    }
    Ok(())
}
