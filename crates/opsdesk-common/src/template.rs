//! Brace-substitution templates for notification messages
//!
//! Templates reference event payload fields with `{{path.to.field}}`.
//! Appending `UrlEncoded` to a path (`{{ticket.subject UrlEncoded}}` or
//! `{{ticket.subjectUrlEncoded}}`) substitutes the percent-encoded value,
//! for building links. Unresolved paths render as the empty string so a
//! sparse payload degrades the message instead of failing the event.

use serde_json::Value;

const URL_ENCODED_SUFFIX: &str = "UrlEncoded";

/// Render a template against an event payload.
pub fn render(template: &str, payload: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        match after.find("}}") {
            Some(end) => {
                let expr = after[..end].trim();
                out.push_str(&resolve(expr, payload));
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated braces pass through literally
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

fn resolve(expr: &str, payload: &Value) -> String {
    let (path, encode) = match expr.strip_suffix(URL_ENCODED_SUFFIX) {
        Some(stripped) => (stripped.trim_end_matches([' ', '.']), true),
        None => (expr, false),
    };

    let value = lookup(path, payload);
    let text = match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    if encode {
        urlencoding::encode(&text).into_owned()
    } else {
        text
    }
}

fn lookup<'a>(path: &str, payload: &'a Value) -> Option<&'a Value> {
    let mut current = payload;
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        current = current.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_render_simple_path() {
        let payload = json!({"ticket": {"subject": "Printer down", "id": 7}});
        assert_eq!(
            render("Ticket: {{ticket.subject}} (#{{ticket.id}})", &payload),
            "Ticket: Printer down (#7)"
        );
    }

    #[test]
    fn test_render_missing_path_is_empty() {
        let payload = json!({"ticket": {}});
        assert_eq!(render("[{{ticket.subject}}]", &payload), "[]");
        assert_eq!(render("[{{nothing.here}}]", &payload), "[]");
    }

    #[test]
    fn test_render_url_encoded() {
        let payload = json!({"ticket": {"subject": "a b&c"}});
        assert_eq!(
            render("q={{ticket.subject UrlEncoded}}", &payload),
            "q=a%20b%26c"
        );
        assert_eq!(
            render("q={{ticket.subjectUrlEncoded}}", &payload),
            "q=a%20b%26c"
        );
    }

    #[test]
    fn test_render_unterminated_braces() {
        let payload = json!({});
        assert_eq!(render("broken {{oops", &payload), "broken {{oops");
    }
}
