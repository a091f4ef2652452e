//! Wire-path template resolution and the client-facing event envelope.

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use flowgate_core::UserId;

/// Resolve `{name}` placeholders in `template` via `lookup`.
///
/// A placeholder `lookup` cannot resolve is left in the output literally:
/// a malformed backend payload degrades one event name instead of killing
/// dispatch. In debug builds this is treated as a defect and asserts.
pub fn resolve_template(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            // Unbalanced brace: not a placeholder, keep the remainder.
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after_open[..close];
        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => {
                debug_assert!(false, "unresolved wire-path placeholder '{name}' in '{template}'");
                warn!(placeholder = name, template, "unresolved wire-path placeholder");
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after_open[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Resolve placeholders from the top-level fields of a message payload.
///
/// String fields substitute verbatim; numbers and booleans via their
/// display form. Nested values never parameterize a path.
#[must_use]
pub fn resolve_from_payload(template: &str, payload: &serde_json::Value) -> String {
    resolve_template(template, |name| match payload.get(name) {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Substitute the `{user_id}` placeholder of an identity-scoped template.
#[must_use]
pub fn resolve_for_user(template: &str, user_id: &UserId) -> String {
    resolve_template(template, |name| {
        (name == "user_id").then(|| user_id.as_str().to_owned())
    })
}

/// The envelope pushed to clients for every forwarded event.
///
/// `payload` is the backend lifecycle message, unmodified.
#[derive(Debug, Clone, Serialize)]
pub struct WireEvent {
    /// The resolved wire path.
    #[serde(rename = "type")]
    pub event: String,
    /// RFC 3339 emission time.
    pub timestamp: String,
    /// The unmodified backend message.
    pub payload: serde_json::Value,
}

impl WireEvent {
    /// Wrap a payload under a resolved wire path, stamped now.
    #[must_use]
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            timestamp: Utc::now().to_rfc3339(),
            payload,
        }
    }
}
