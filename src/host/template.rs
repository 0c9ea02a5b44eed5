//! Mustache-style `{{ name }}` parameter handling for stored query text.
//!
//! Only simple substitution is supported — no sections, no partials.
//! Collection and rendering are split so the caller can report missing
//! parameters before anything runs.

/// Distinct `{{ name }}` keys in order of first appearance.
pub fn collect_parameters(text: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                if !key.is_empty() && !keys.iter().any(|k| k == key) {
                    keys.push(key.to_string());
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    keys
}

/// Substitute every `{{ name }}` occurrence that has a value in `params`.
/// Placeholders without a value are left in place — the missing-parameter
/// check happens before render.
pub fn render(text: &str, params: &[(String, String)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                out.push_str(&rest[..start]);
                match params.iter().find(|(k, _)| k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_simple() {
        assert_eq!(
            collect_parameters("select * from t where a = {{a}} and b = {{ b }}"),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_collect_distinct_in_first_appearance_order() {
        assert_eq!(
            collect_parameters("{{x}} {{y}} {{x}}"),
            vec!["x".to_string(), "y".to_string()]
        );
    }

    #[test]
    fn test_collect_none() {
        assert!(collect_parameters("select 1").is_empty());
    }

    #[test]
    fn test_collect_ignores_unclosed() {
        assert_eq!(collect_parameters("a = {{a}} and {{oops"), vec!["a".to_string()]);
    }

    #[test]
    fn test_render_substitutes_all_occurrences() {
        let params = vec![("id".to_string(), "42".to_string())];
        assert_eq!(
            render("id = {{id}} or parent = {{ id }}", &params),
            "id = 42 or parent = 42"
        );
    }

    #[test]
    fn test_render_leaves_missing_in_place() {
        let params = vec![("a".to_string(), "1".to_string())];
        assert_eq!(render("{{a}} {{b}}", &params), "1 {{b}}");
    }

    #[test]
    fn test_render_plain_text_untouched() {
        assert_eq!(render("select 1", &[]), "select 1");
    }
}
