// SPDX-License-Identifier: MIT
//! Command/output template rendering (§4.2), built on Handlebars — the same
//! templating crate this codebase already uses for its other templated text.

use handlebars::{Context, Handlebars, Helper, HelperResult, Output, RenderContext};
use serde_json::Value as JsonValue;

use crate::domain::errors::ToolError;
use crate::domain::policy::ParamEnv;
use crate::domain::tool::ParamValue;

/// A template parsed once, at handler-creation time. Syntax errors surface
/// there; only unknown-field and helper errors can occur at render time.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    key: String,
}

/// Wraps a single Handlebars registry shared by every tool's compiled
/// templates. Strict mode turns a bare `{{missing_field}}` reference into a
/// render error while leaving helper arguments and `{{#if}}` conditions
/// lenient, which is what lets the `default` helper do its job.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
    next_id: u64,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));
        handlebars.register_helper("trim", Box::new(trim_helper));
        handlebars.register_helper("quote", Box::new(quote_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        Self {
            handlebars,
            next_id: 0,
        }
    }

    /// Parse and register `template` under a fresh process-unique key.
    pub fn compile(&mut self, label: &str, template: &str) -> Result<CompiledTemplate, ToolError> {
        let key = format!("{label}#{}", self.next_id);
        self.next_id += 1;
        self.handlebars
            .register_template_string(&key, template)
            .map_err(|e| ToolError::Configuration(format!("invalid template `{label}`: {e}")))?;
        Ok(CompiledTemplate { key })
    }

    pub fn render(&self, compiled: &CompiledTemplate, params: &ParamEnv) -> Result<String, ToolError> {
        let context = build_context(params);
        self.handlebars
            .render(&compiled.key, &context)
            .map_err(|e| ToolError::TemplateRender(e.to_string()))
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn build_context(params: &ParamEnv) -> serde_json::Map<String, JsonValue> {
    let mut map = serde_json::Map::new();
    for (name, value) in params {
        let json = match value {
            ParamValue::String(s) => JsonValue::String(s.clone()),
            ParamValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ParamValue::Integer(i) => JsonValue::Number((*i).into()),
            ParamValue::Boolean(b) => JsonValue::Bool(*b),
        };
        map.insert(name.clone(), json);
    }
    map
}

fn param_as_str(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn helper_arg(h: &Helper, index: usize) -> JsonValue {
    h.param(index).map(|p| p.value().clone()).unwrap_or(JsonValue::Null)
}

fn upper_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&param_as_str(&helper_arg(h, 0)).to_uppercase())?;
    Ok(())
}

fn lower_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&param_as_str(&helper_arg(h, 0)).to_lowercase())?;
    Ok(())
}

fn trim_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(param_as_str(&helper_arg(h, 0)).trim())?;
    Ok(())
}

/// Single-quote a value for safe embedding in a POSIX shell command line.
fn quote_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let s = param_as_str(&helper_arg(h, 0));
    let escaped = s.replace('\'', r"'\''");
    out.write(&format!("'{escaped}'"))?;
    Ok(())
}

/// `{{default value fallback}}` — emits `value` unless it is null or empty.
fn default_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = helper_arg(h, 0);
    let fallback = helper_arg(h, 1);
    let use_fallback = matches!(value, JsonValue::Null)
        || matches!(&value, JsonValue::String(s) if s.is_empty());
    out.write(&param_as_str(if use_fallback { &fallback } else { &value }))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn params(pairs: &[(&str, ParamValue)]) -> ParamEnv {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<BTreeMap<_, _>>()
    }

    #[test]
    fn renders_plain_field_access() {
        let mut engine = TemplateEngine::new();
        let tpl = engine.compile("greeting", "echo {{name}}").unwrap();
        let env = params(&[("name", ParamValue::String("World".to_string()))]);
        assert_eq!(engine.render(&tpl, &env).unwrap(), "echo World");
    }

    #[test]
    fn missing_field_is_a_render_error() {
        let mut engine = TemplateEngine::new();
        let tpl = engine.compile("greeting", "echo {{name}}").unwrap();
        let env = ParamEnv::new();
        let err = engine.render(&tpl, &env).unwrap_err();
        assert!(matches!(err, ToolError::TemplateRender(_)));
    }

    #[test]
    fn illegal_syntax_is_a_compile_time_error() {
        let mut engine = TemplateEngine::new();
        let err = engine.compile("bad", "echo {{name").unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }

    #[test]
    fn conditional_block_tolerates_missing_optional_field() {
        let mut engine = TemplateEngine::new();
        let tpl = engine
            .compile("cond", "echo{{#if verbose}} --verbose{{/if}}")
            .unwrap();
        let env = ParamEnv::new();
        assert_eq!(engine.render(&tpl, &env).unwrap(), "echo");
    }

    #[test]
    fn quote_helper_escapes_embedded_single_quotes() {
        let mut engine = TemplateEngine::new();
        let tpl = engine.compile("quoted", "echo {{quote value}}").unwrap();
        let env = params(&[("value", ParamValue::String("it's a test".to_string()))]);
        assert_eq!(engine.render(&tpl, &env).unwrap(), r"echo 'it'\''s a test'");
    }

    #[test]
    fn default_helper_falls_back_on_missing_optional_param() {
        let mut engine = TemplateEngine::new();
        let tpl = engine
            .compile("default", "echo {{default label \"unlabeled\"}}")
            .unwrap();
        let env = ParamEnv::new();
        assert_eq!(engine.render(&tpl, &env).unwrap(), "echo unlabeled");
    }

    #[test]
    fn upper_lower_trim_helpers() {
        let mut engine = TemplateEngine::new();
        let tpl = engine
            .compile("case", "{{upper a}}-{{lower b}}-{{trim c}}")
            .unwrap();
        let env = params(&[
            ("a", ParamValue::String("shout".to_string())),
            ("b", ParamValue::String("QUIET".to_string())),
            ("c", ParamValue::String("  padded  ".to_string())),
        ]);
        assert_eq!(engine.render(&tpl, &env).unwrap(), "SHOUT-quiet-padded");
    }

    #[test]
    fn integer_and_number_params_render_without_trailing_fraction() {
        let mut engine = TemplateEngine::new();
        let tpl = engine.compile("nums", "{{a}} {{b}}").unwrap();
        let env = params(&[
            ("a", ParamValue::Integer(5)),
            ("b", ParamValue::Number(2.5)),
        ]);
        assert_eq!(engine.render(&tpl, &env).unwrap(), "5 2.5");
    }
}
