use lazy_static::lazy_static;
use regex::Regex;

pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_TEXT_LEN: usize = 100;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$"
    )
    .unwrap();
    static ref ANGLE_RE: Regex = Regex::new(r"[<>]").unwrap();
    static ref SCRIPTY_RE: Regex =
        Regex::new(r"(?i)javascript:|vbscript:|data:|on\w+=").unwrap();
    static ref LOCAL_PART_RE: Regex = Regex::new(r#"[^\s@"'<>,;:]+@"#).unwrap();
}

/// Structural email check. Rejects script-looking payloads even when they would
/// otherwise fit the grammar.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.contains("..") {
        return false;
    }
    let lower = email.to_ascii_lowercase();
    if lower.contains("javascript:") || lower.contains("<script>") {
        return false;
    }
    EMAIL_RE.is_match(email)
}

/// Trims and lower-cases an address before validation.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Cleans a free-text field. Idempotent: removals repeat until nothing matches,
/// so stripping one pattern cannot leave a new one behind.
pub fn sanitize(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let without_angles = ANGLE_RE.replace_all(&current, "");
        let next = SCRIPTY_RE.replace_all(&without_angles, "").into_owned();
        if next == current {
            break;
        }
        current = next;
    }

    let truncated: String = current.trim().chars().take(MAX_TEXT_LEN).collect();
    truncated.trim_end().to_string()
}

/// Returns the domain part of an address, for logs and analytics.
pub fn email_domain(email: &str) -> &str {
    email.rsplit_once('@').map(|(_, d)| d).unwrap_or("unknown")
}

/// `***@domain` form used whenever an address reaches a log line.
pub fn redact_email(email: &str) -> String {
    format!("***@{}", email_domain(email))
}

/// Masks the local part of any address embedded in free text, such as a
/// provider error message that echoes the submitted email.
pub fn scrub_emails(text: &str) -> String {
    LOCAL_PART_RE.replace_all(text, "***@").into_owned()
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn accepts_grammar_conforming_addresses() {
        for email in [
            "new@user.com",
            "first.last@example.co.uk",
            "o'brien+tag@sub-domain.example.org",
            "x@localhost",
            "weird!#$%&*/=?^_`{|}~-@ex-ample.io",
            "a1@b2.c3",
        ] {
            assert!(is_valid_email(email), "{email} should be accepted");
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        let long = "a@b.com".repeat(40);
        for email in [
            "",
            "plainaddress",
            "@missing.com",
            "a@b..com",
            "a..b@c.com",
            "a@-bad.com",
            "a@bad-.com",
            "spaces in@x.com",
            "two@@x.com",
            long.as_str(),
        ] {
            assert!(!is_valid_email(email), "{email} should be rejected");
        }
    }

    #[test]
    fn rejects_script_payloads() {
        assert!(!is_valid_email("javascript:alert@x.com"));
        assert!(!is_valid_email("<script>@x.com"));
    }

    #[test]
    fn length_boundary_is_254() {
        let domain = format!("{}.{}.{}.com", "a".repeat(63), "b".repeat(63), "c".repeat(63));
        let local_254 = "l".repeat(MAX_EMAIL_LEN - 1 - domain.len());
        let ok = format!("{local_254}@{domain}");
        assert_eq!(ok.len(), 254);
        assert!(is_valid_email(&ok));

        let too_long = format!("l{ok}");
        assert!(!is_valid_email(&too_long));
    }

    #[test]
    fn sanitize_strips_markup_and_handlers() {
        assert_eq!(sanitize("  Springfield High  "), "Springfield High");
        assert_eq!(sanitize("<b>MIT</b>"), "bMIT/b");
        assert_eq!(sanitize("JavaScript:alert(1)"), "alert(1)");
        assert_eq!(sanitize("img onerror=boom"), "img boom");
        assert_eq!(sanitize("data:text/html,hi"), "text/html,hi");
        assert_eq!(sanitize("VBScript:run"), "run");
    }

    #[test]
    fn sanitize_handles_nested_patterns() {
        assert_eq!(sanitize("javajavascript:script:x"), "x");
        assert_eq!(sanitize("java<script:x"), "x");
        assert_eq!(sanitize("ononclick==1"), "=1");
    }

    #[test]
    fn sanitize_truncates_to_100_chars() {
        let out = sanitize(&"é".repeat(150));
        assert_eq!(out.chars().count(), MAX_TEXT_LEN);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let samples = [
            "",
            "   ",
            "plain",
            "  javascript: x ",
            "java<script:x",
            "<<>>",
            "on on=x onclick= y",
            "datadata::",
            "vbscrvbscript:ipt:",
            "oonnx==",
        ];
        let long = format!("{} {}", "a".repeat(99), "tail");
        let mut all: Vec<String> = samples.iter().map(|s| s.to_string()).collect();
        all.push(long);
        all.push(format!("{}javascript:{}", " ".repeat(5), "z".repeat(120)));

        for s in all {
            let once = sanitize(&s);
            assert_eq!(sanitize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn redaction_keeps_domain_only() {
        assert_eq!(redact_email("someone@example.com"), "***@example.com");
        assert_eq!(email_domain("broken"), "unknown");
        assert_eq!(
            scrub_emails("The email jane.doe@example.com is invalid"),
            "The email ***@example.com is invalid"
        );
    }
}
