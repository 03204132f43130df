//! JSON decoding with readable failure messages.

use crate::error::StoreError;

/// Decode `body`, and on failure report the serde path, the type mismatch,
/// and a snippet of the offending line.
pub fn parse_json_with_context<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, StoreError> {
    let jd = &mut serde_json::Deserializer::from_str(body);
    match serde_path_to_error::deserialize(jd) {
        Ok(value) => Ok(value),
        Err(err) => {
            let inner_err = err.inner();
            let (line, column) = (inner_err.line(), inner_err.column());
            let path = err.path().to_string();

            let msg = inner_err.to_string();
            let loc = format!(" at line {line} column {column}");
            let msg_without_loc = msg.strip_suffix(&loc).unwrap_or(&msg).to_string();

            let type_info = parse_type_mismatch(&msg_without_loc);
            let snippet = build_error_snippet(body, line, column, 20);

            let mut final_err = String::new();
            if !path.is_empty() && path != "." {
                final_err.push_str(&format!("at path '{path}': "));
            }
            final_err.push_str(&format!("{type_info} (line {line} col {column})\n{snippet}"));

            Err(StoreError::Decode(final_err))
        }
    }
}

/// Turn "invalid type: null, expected a string" into "expected a string, got null".
fn parse_type_mismatch(error_msg: &str) -> String {
    if let Some(invalid_start) = error_msg.find("invalid type: ") {
        let after_prefix = &error_msg[invalid_start + "invalid type: ".len()..];

        if let Some(comma_pos) = after_prefix.find(", expected ") {
            let actual_type = &after_prefix[..comma_pos];
            let expected_type = after_prefix[comma_pos + ", expected ".len()..].trim();
            return format!("expected {expected_type}, got {actual_type}");
        }
    }
    error_msg.to_string()
}

fn build_error_snippet(body: &str, line: usize, column: usize, context_len: usize) -> String {
    let target_line = body.lines().nth(line.saturating_sub(1)).unwrap_or("");
    if target_line.is_empty() {
        return "(empty line)".to_string();
    }

    // 1-based column; clamp to a char boundary so multi-byte names don't panic.
    let error_idx = floor_char_boundary(target_line, column.saturating_sub(1));
    let half_len = context_len / 2;
    let start = floor_char_boundary(target_line, error_idx.saturating_sub(half_len));
    let end = floor_char_boundary(target_line, (error_idx + half_len).min(target_line.len()));

    let slice = &target_line[start..end];
    let indicator = " ".repeat(target_line[start..error_idx].chars().count()) + "^";

    format!("...{slice}...\n   {indicator}")
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Tour {
        title: String,
        price: f64,
    }

    #[test]
    fn type_mismatch_is_reworded() {
        let msg = "invalid type: null, expected a string";
        assert_eq!(parse_type_mismatch(msg), "expected a string, got null");
        assert_eq!(parse_type_mismatch("missing field `x`"), "missing field `x`");
    }

    #[test]
    fn reports_path_of_bad_field() {
        let body = r#"{"title": "Salkantay Trek", "price": "cheap"}"#;
        let err = parse_json_with_context::<Tour>(body).unwrap_err();
        let StoreError::Decode(msg) = err else {
            panic!("expected decode error");
        };
        assert!(msg.starts_with("at path 'price': expected f64, got string \"cheap\""), "{msg}");
        assert!(msg.contains('^'));
    }

    #[test]
    fn snippet_handles_multibyte_text() {
        let body = r#"{"title": "Cañón del Colca — día completo", "price": null}"#;
        let err = parse_json_with_context::<Tour>(body).unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[test]
    fn decodes_valid_body() {
        let tour: Tour = parse_json_with_context(r#"{"title":"Lima food tour","price":45.5}"#).unwrap();
        assert_eq!(tour.title, "Lima food tour");
    }
}
