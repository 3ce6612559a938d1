//! Static field initializers.
//!
//! Each initializer is a scope of its own, lowered like a nullary method
//! that computes the field's value into `_returnValue`. The resulting body
//! is attached to the class's data type rather than emitted as a method.

use crate::context::LowerCx;
use crate::error::LowerError;
use crate::identity::{ScopeId, ScopeKind};
use crate::ir::StaticField;
use crate::lower::lower_scope;

pub(crate) fn lower_static(
    cx: &mut LowerCx<'_>,
    scope: ScopeId,
) -> Result<Option<StaticField>, LowerError> {
    let info = cx.index.scope(scope);
    let ScopeKind::StaticInit(field) = info.kind else {
        return Ok(None);
    };
    let id = info.id;

    let lowered = lower_scope(cx, scope)?;
    tracing::debug!(field = cx.name(field.name), "lowered static initializer");
    Ok(Some(StaticField {
        id,
        name: field.name,
        ty: lowered.body.return_type.clone(),
        body: lowered.body,
    }))
}
