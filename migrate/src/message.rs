//! Placeholder substitution with eager argument validation.
//!
//! Any value handed to a string-rendering boundary — log messages, per-row
//! diagnostics — must be null, boolean, numeric, a string, or otherwise carry
//! a defined string conversion. Lists, maps, and raw byte values are rejected
//! eagerly with a distinguishable error rather than producing corrupted
//! output. The rule is general: it applies to every placeholder boundary in
//! the system, not only migration messages.

use std::collections::BTreeMap;

use crate::error::{ErrorKind, MigrateResult};
use crate::migrate_error;
use crate::types::Value;

/// Validates one placeholder argument and returns its rendering.
///
/// The error detail names the rejected kind so callers can distinguish an
/// array value from a map value from raw bytes.
pub fn validate_placeholder_value(name: &str, value: &Value) -> MigrateResult<String> {
    match value.to_display_string() {
        Some(rendered) => Ok(rendered),
        None => {
            let kind = match value {
                Value::List(_) => "array value",
                Value::Map(_) => "map value with no string conversion",
                _ => "raw byte value",
            };
            Err(migrate_error!(
                ErrorKind::InvalidArgument,
                "Placeholder argument cannot be rendered as a string",
                format!("{name}: {kind}")
            ))
        }
    }
}

/// Substitutes placeholder arguments into a template.
///
/// Argument keys are the literal placeholder tokens as they appear in the
/// template (`@name`, `%name`, `:name`). Every argument is validated before
/// any substitution happens, whether or not the template references it.
pub fn render_placeholders(
    template: &str,
    args: &BTreeMap<String, Value>,
) -> MigrateResult<String> {
    let mut rendered_args = Vec::with_capacity(args.len());
    for (name, value) in args {
        rendered_args.push((name.as_str(), validate_placeholder_value(name, value)?));
    }

    // Longest token first, so `@id_extra` is never clobbered by `@id`.
    rendered_args.sort_by_key(|(name, _)| std::cmp::Reverse(name.len()));

    let mut output = template.to_string();
    for (name, rendering) in &rendered_args {
        output = output.replace(name, rendering);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn scalars_render_for_every_sigil() {
        let rendered = render_placeholders(
            "link :h em %em gen @gen",
            &args(&[
                (":h", Value::from("string")),
                ("%em", Value::Int(123)),
                ("@gen", Value::Float(-5.4)),
            ]),
        )
        .unwrap();

        assert_eq!(rendered, "link string em 123 gen -5.4");
    }

    #[test]
    fn null_and_bool_convert() {
        let rendered = render_placeholders(
            "a'@a' b'@b'",
            &args(&[("@a", Value::Null), ("@b", Value::Bool(true))]),
        )
        .unwrap();

        assert_eq!(rendered, "a'' b'true'");
    }

    #[test]
    fn compound_values_are_rejected_eagerly() {
        for bad in [
            Value::List(vec![Value::Int(1)]),
            Value::Map(BTreeMap::new()),
            Value::Bytes(vec![0xff]),
        ] {
            let error =
                render_placeholders("unused template", &args(&[("@a", bad)])).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn rejection_detail_distinguishes_kinds() {
        let array_error =
            validate_placeholder_value("@a", &Value::List(vec![])).unwrap_err();
        assert!(array_error.detail().unwrap().contains("array value"));

        let map_error = validate_placeholder_value("@m", &Value::Map(BTreeMap::new())).unwrap_err();
        assert!(map_error.detail().unwrap().contains("no string conversion"));

        let bytes_error = validate_placeholder_value("@b", &Value::Bytes(vec![1])).unwrap_err();
        assert!(bytes_error.detail().unwrap().contains("raw byte value"));
    }

    #[test]
    fn one_bad_argument_fails_the_whole_render() {
        let error = render_placeholders(
            "@a @b @c",
            &args(&[
                ("@a", Value::Int(123)),
                ("@b", Value::List(vec![Value::Int(1)])),
                ("@c", Value::Bool(true)),
            ]),
        )
        .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn longer_tokens_substitute_first() {
        let rendered = render_placeholders(
            "@id and @id_tuple",
            &args(&[("@id", Value::Int(1)), ("@id_tuple", Value::from("(1, en)"))]),
        )
        .unwrap();

        assert_eq!(rendered, "1 and (1, en)");
    }
}
