//! Handlebars adapter.

use anyhow::Result;
use handlebars::{
    Context, Handlebars, Helper, HelperDef, RenderContext as HbsRenderContext, RenderError,
    RenderErrorReason, ScopedJson, no_escape,
};
use serde_json::Value;

use super::{FailureSlot, NamedFunction, RenderContext};
use crate::core::CrustomizeError;

/// Exposes one [`NamedFunction`] as a handlebars helper. Returning a value from
/// `call_inner` lets helpers nest as subexpressions without stringifying.
struct TableHelper {
    function: NamedFunction,
    failure: FailureSlot,
}

impl HelperDef for TableHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut HbsRenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let args: Vec<Value> = h.params().iter().map(|p| p.value().clone()).collect();
        match self.function.call(&args) {
            Ok(value) => Ok(ScopedJson::Derived(value)),
            Err(e) => {
                let message = format!("{}: {e}", self.function.name);
                self.failure.record(e);
                Err(RenderErrorReason::Other(message).into())
            }
        }
    }
}

pub(super) fn render(raw: &str, context: &RenderContext) -> Result<String> {
    let mut registry = Handlebars::new();
    registry.register_escape_fn(no_escape);

    let failure = FailureSlot::default();
    for function in context.helpers.iter() {
        registry.register_helper(
            &function.name,
            Box::new(TableHelper {
                function: function.clone(),
                failure: failure.clone(),
            }),
        );
    }

    registry.render_template(raw, &context.data()).map_err(|e| {
        failure.take().unwrap_or_else(|| {
            CrustomizeError::TemplateRenderError {
                engine: "handlebars".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    })
}
