//! Reply body sanitizer seam
//!
//! Rich-text sanitisation proper is handled by a collaborating service;
//! this trait is the seam, and the default implementation is a
//! conservative tag stripper good enough to enforce the "non-empty after
//! sanitisation" rule.

/// Outcome of sanitising a reply body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    /// Visible text with markup removed and whitespace collapsed
    pub text: String,
    /// Whether the input carried embedded media (an empty-text reply with
    /// media is still acceptable)
    pub has_media: bool,
}

/// Sanitises user-authored rich text before persistence
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, input: &str) -> Sanitized;
}

/// Default sanitizer: drops tags and script/style content entirely,
/// decodes common entities, collapses whitespace.
pub struct TagStrippingSanitizer;

impl Sanitizer for TagStrippingSanitizer {
    fn sanitize(&self, input: &str) -> Sanitized {
        let lower = input.to_ascii_lowercase();
        let has_media =
            lower.contains("<img") || lower.contains("<video") || lower.contains("<audio");

        let stripped = strip_tags(input);
        let decoded = decode_entities(&stripped);
        let text = decoded.split_whitespace().collect::<Vec<_>>().join(" ");

        Sanitized { text, has_media }
    }
}

fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];

        // Script and style elements lose their content, not just the tags
        let lower = after.to_ascii_lowercase();
        let skip_to = if lower.starts_with("<script") {
            lower.find("</script>").map(|i| i + "</script>".len())
        } else if lower.starts_with("<style") {
            lower.find("</style>").map(|i| i + "</style>".len())
        } else {
            after.find('>').map(|i| i + 1)
        };

        match skip_to {
            Some(offset) => rest = &after[offset..],
            None => return out, // unterminated tag swallows the rest
        }
    }

    out.push_str(rest);
    out
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sanitize(input: &str) -> Sanitized {
        TagStrippingSanitizer.sanitize(input)
    }

    #[test]
    fn test_strips_tags() {
        assert_eq!(sanitize("<p>hello <b>world</b></p>").text, "hello world");
    }

    #[test]
    fn test_drops_script_content() {
        assert_eq!(sanitize("<script>alert('x')</script>ok").text, "ok");
        assert_eq!(sanitize("<style>p{}</style>").text, "");
    }

    #[test]
    fn test_decodes_entities() {
        assert_eq!(sanitize("a &amp; b &lt;c&gt;").text, "a & b <c>");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(sanitize("  a \n\n  b  ").text, "a b");
    }

    #[test]
    fn test_media_only_body() {
        let result = sanitize("<img src=\"scan.png\">");
        assert_eq!(result.text, "");
        assert!(result.has_media);
    }
}
