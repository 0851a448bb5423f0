//! Free-text sanitization: strip markup and scripts, allow-list characters.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Default maximum length of a sanitized string, in characters.
pub const DEFAULT_MAX_LENGTH: usize = 1000;

static SCRIPT_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>").unwrap()
});

static SCRIPT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*(script|style)[\s>/]").unwrap());

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^<>]*>").unwrap());

// `data:` only with a media type, so "Data: 01/02/2024" is left alone.
static SCHEME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:javascript|vbscript|livescript)\s*:|\bdata\s*:\s*[a-z]+/[a-z0-9.+-]+").unwrap()
});

static EVENT_HANDLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bon\w+\s*=").unwrap());

// Numeric character references, with or without the closing `;`.
static CHAR_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&#(?:x[0-9a-f]+|[0-9]+);?").unwrap());

static PATH_TRAVERSAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\./|\.\.\\").unwrap());

/// Punctuation that survives sanitization besides letters, digits and spaces.
const ALLOWED_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '-', '_', '/', '(', ')', '&', '\'', '%', '+', '@', '#', '$', '*', '!', '?',
    'º', 'ª', '°', '§',
];

/// Threat classes that [`inspect`] can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Threat {
    Script,
    EventHandler,
    Markup,
    ControlCharacters,
    PathTraversal,
}

impl Threat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Threat::Script => "script",
            Threat::EventHandler => "event_handler",
            Threat::Markup => "markup",
            Threat::ControlCharacters => "control_characters",
            Threat::PathTraversal => "path_traversal",
        }
    }
}

/// Report which threat classes appear in `value`. Order is fixed.
pub fn inspect(value: &str) -> Vec<Threat> {
    let mut threats = Vec::new();

    // A scheme split by a handler or by dropped characters still counts.
    let rejoined = keep_allowed(&EVENT_HANDLER_RE.replace_all(value, ""));
    if SCRIPT_TAG_RE.is_match(value) || SCHEME_RE.is_match(value) || SCHEME_RE.is_match(&rejoined) {
        threats.push(Threat::Script);
    }
    if EVENT_HANDLER_RE.is_match(value) {
        threats.push(Threat::EventHandler);
    }
    if TAG_RE.is_match(value) || CHAR_REF_RE.is_match(value) {
        threats.push(Threat::Markup);
    }
    if value.chars().any(is_stripped_control) {
        threats.push(Threat::ControlCharacters);
    }
    if PATH_TRAVERSAL_RE.is_match(value) {
        threats.push(Threat::PathTraversal);
    }

    threats
}

/// Sanitize with the default length limit.
pub fn sanitize_string(value: &str) -> String {
    sanitize_string_with(value, DEFAULT_MAX_LENGTH)
}

/// Textual clean-up of untrusted text. Never evaluates anything.
///
/// Idempotent: sanitizing the output again returns it unchanged.
pub fn sanitize_string_with(value: &str, max_len: usize) -> String {
    let no_controls: String = value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    let text = SCRIPT_BLOCK_RE.replace_all(&no_controls, " ");
    let text = TAG_RE.replace_all(&text, " ");
    let mut text = keep_allowed(&strip_active(&text));

    // Dropping characters can join the halves of a removed sequence back together.
    loop {
        let next = strip_active(&text);
        if next == text {
            break;
        }
        text = next;
    }

    text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_len)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Remove character references, script schemes and event handlers.
fn strip_active(text: &str) -> String {
    let text = CHAR_REF_RE.replace_all(text, "");
    let text = SCHEME_RE.replace_all(&text, "");
    EVENT_HANDLER_RE.replace_all(&text, "").into_owned()
}

fn keep_allowed(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || ALLOWED_PUNCTUATION.contains(c))
        .collect()
}

/// Control characters other than ordinary line breaks and tabs.
fn is_stripped_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\n' | '\r' | '\t')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_text_kept() {
        assert_eq!(
            sanitize_string("Comércio de Peças São João Ltda."),
            "Comércio de Peças São João Ltda."
        );
        assert_eq!(sanitize_string("CFOP 5.102 - Venda (50%)"), "CFOP 5.102 - Venda (50%)");
    }

    #[test]
    fn test_script_block_removed_with_content() {
        let clean = sanitize_string("Produto<script>alert('x')</script> A");
        assert_eq!(clean, "Produto A");
        assert!(!clean.contains("alert"));
    }

    #[test]
    fn test_tags_and_handlers_removed() {
        let clean = sanitize_string(r#"<img src=x onerror=alert(1)>Caneta <b>azul</b>"#);
        assert_eq!(clean, "Caneta azul");

        let clean = sanitize_string("texto onload=steal() fim");
        assert!(!clean.contains("onload"));
    }

    #[test]
    fn test_schemes_removed() {
        let clean = sanitize_string("javascript:alert(1)");
        assert!(!clean.to_lowercase().contains("javascript"));
        assert!(!sanitize_string("data:text/html;base64,PHNjcmlwdD4").contains("text/html"));
        assert_eq!(sanitize_string("Data: 01/02/2024"), "Data: 01/02/2024");
        assert!(inspect("Data: 01/02/2024").is_empty());
    }

    #[test]
    fn test_scheme_split_by_handler_not_rebuilt() {
        let input = "java`onx=script:alert(1)";
        let clean = sanitize_string(input);
        assert_eq!(clean, "alert(1)");
        assert!(inspect(input).contains(&Threat::Script));

        let clean = sanitize_string("jav\"ascr{ipt:go()");
        assert!(!clean.to_lowercase().contains("javascript"));
    }

    #[test]
    fn test_character_references_stripped() {
        assert_eq!(sanitize_string("&#106;avascript:alert(1)"), "avascript:alert(1)");
        assert_eq!(sanitize_string("&#x6A;avascript:x"), "avascript:x");
        assert_eq!(sanitize_string("&`#106;avascript:x"), "avascript:x");
        assert_eq!(inspect("&#106;avascript:x"), vec![Threat::Markup]);
        assert_eq!(sanitize_string("Peças & Cia #12"), "Peças & Cia #12");
    }

    proptest! {
        #[test]
        fn test_sanitize_is_idempotent(input in r#"[a-zA-Z0-9 :;&#`"=<>/.\-]{0,60}"#) {
            let once = sanitize_string(&input);
            prop_assert_eq!(sanitize_string(&once), once.clone());
            prop_assert!(!SCHEME_RE.is_match(&once));
        }
    }

    #[test]
    fn test_controls_and_whitespace() {
        assert_eq!(sanitize_string("  linha\u{0}um\n\tlinha   dois  "), "linha um linha dois");
        assert_eq!(sanitize_string("\u{1b}[31mred"), "31mred");
    }

    #[test]
    fn test_disallowed_characters_dropped() {
        assert_eq!(sanitize_string("a<b>c\"d`e{f}"), "a cdef");
    }

    #[test]
    fn test_truncation() {
        let long = "á".repeat(DEFAULT_MAX_LENGTH + 50);
        assert_eq!(sanitize_string(&long).chars().count(), DEFAULT_MAX_LENGTH);
        assert_eq!(sanitize_string_with("abc def", 4), "abc");
    }

    #[test]
    fn test_inspect() {
        assert!(inspect("Nota fiscal 123").is_empty());
        assert_eq!(inspect("<script>x</script>"), vec![Threat::Script, Threat::Markup]);
        assert_eq!(inspect("<a onclick=go()>"), vec![Threat::EventHandler, Threat::Markup]);
        assert_eq!(inspect("../../etc/passwd"), vec![Threat::PathTraversal]);
        assert_eq!(inspect("a\u{7}b"), vec![Threat::ControlCharacters]);
        assert!(inspect("linha\nlinha").is_empty());
    }
}
