//! Deep merge of parsed documents.
//!
//! Objects merge key by key, recursively. Scalars from the source win. Arrays
//! follow an [`ArrayMerge`] policy: base documents always append, each overlay
//! picks its own policy in the manifest.
//!
//! ```rust,no_run
//! use crustomize::merge::{ArrayMerge, deep_merge};
//! use serde_json::json;
//!
//! let mut doc = json!({"a": [1, 2], "b": {"x": 1}});
//! deep_merge(&mut doc, json!({"a": [3, 4], "b": {"y": 2}}), ArrayMerge::Append);
//! assert_eq!(doc, json!({"a": [1, 2, 3, 4], "b": {"x": 1, "y": 2}}));
//! ```

pub mod patch;

pub use patch::{PatchOp, apply_patches};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How arrays combine when both sides of a merge hold one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayMerge {
    /// Destination elements followed by source elements
    #[default]
    Append,
    /// Source array replaces the destination array
    Replace,
}

impl std::fmt::Display for ArrayMerge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArrayMerge::Append => write!(f, "append"),
            ArrayMerge::Replace => write!(f, "replace"),
        }
    }
}

/// Merge `source` into `target` in place.
///
/// The policy applies to arrays at every depth, not only at the top level.
pub fn deep_merge(target: &mut Value, source: Value, arrays: ArrayMerge) {
    match (target, source) {
        (Value::Object(dst), Value::Object(src)) => {
            for (key, value) in src {
                match dst.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value, arrays),
                    None => {
                        dst.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(dst), Value::Array(src)) => match arrays {
            ArrayMerge::Append => dst.extend(src),
            ArrayMerge::Replace => *dst = src,
        },
        (target, source) => *target = source,
    }
}
