//! Template resolution using minijinja.
//!
//! Every string-typed config value may embed `{{dotted.path}}` tokens.
//! Rendering is single-pass: resolved output is never re-expanded, so user
//! data containing `{{` cannot inject further expansion.

use minijinja::{Environment, UndefinedBehavior, Value};
use serde_json::Map;

use crate::context::Context;

fn environment() -> Environment<'static> {
  let mut env = Environment::new();
  // Chainable: `{{a.b.c}}` with any missing segment renders as "".
  env.set_undefined_behavior(UndefinedBehavior::Chainable);
  env
}

/// Resolve `{{path}}` tokens in a template against the context.
///
/// Missing paths resolve to the empty string. A template minijinja cannot
/// parse is returned unchanged; templating is best-effort and never fails
/// the surrounding node.
pub fn resolve(template: &str, ctx: &Context) -> String {
  if !template.contains("{{") {
    return template.to_string();
  }
  let env = environment();
  match env.render_str(template, Value::from_serialize(ctx.root())) {
    Ok(rendered) => rendered,
    Err(_) => template.to_string(),
  }
}

/// Resolve every string leaf of an action config, recursing into nested
/// objects and arrays. Non-string leaves pass through untouched.
pub fn resolve_config(
  config: &Map<String, serde_json::Value>,
  ctx: &Context,
) -> Map<String, serde_json::Value> {
  config
    .iter()
    .map(|(k, v)| (k.clone(), resolve_value(v, ctx)))
    .collect()
}

fn resolve_value(value: &serde_json::Value, ctx: &Context) -> serde_json::Value {
  match value {
    serde_json::Value::String(s) => serde_json::Value::String(resolve(s, ctx)),
    serde_json::Value::Object(map) => serde_json::Value::Object(resolve_config(map, ctx)),
    serde_json::Value::Array(items) => {
      serde_json::Value::Array(items.iter().map(|v| resolve_value(v, ctx)).collect())
    }
    other => other.clone(),
  }
}
