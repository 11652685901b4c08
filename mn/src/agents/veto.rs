//! Automatic veto conditions
//!
//! Textual scans over a diff for violations that fail an attempt regardless
//! of its quality score: hardcoded secrets, infinite loops, unbounded
//! recursion, and likely SQL injection.

use regex::Regex;

struct SecretPattern {
    pattern: &'static str,
    label: &'static str,
}

const SECRET_PATTERNS: &[SecretPattern] = &[
    SecretPattern {
        pattern: r#"(?i)api_key\s*=\s*["'][^"']{20,}["']"#,
        label: "Hardcoded secret: api_key assignment",
    },
    SecretPattern {
        pattern: r#"(?i)secret\s*=\s*["'][^"']{10,}["']"#,
        label: "Hardcoded secret: secret assignment",
    },
    SecretPattern {
        pattern: r#"(?i)password\s*=\s*["'][^"']*["']"#,
        label: "Hardcoded secret: password assignment",
    },
    SecretPattern {
        pattern: r#"(?i)bearer\s+[a-z0-9]{20,}"#,
        label: "Hardcoded secret: bearer token",
    },
    SecretPattern {
        pattern: r#"\bsk-[A-Za-z0-9]{40,}"#,
        label: "Hardcoded secret: provider key (sk- prefix)",
    },
    SecretPattern {
        pattern: r#"\bghp_[A-Za-z0-9]{36}"#,
        label: "Hardcoded secret: provider key (ghp_ prefix)",
    },
];

/// Scan a diff for automatic veto violations.
///
/// Returns one human-readable string per violation; empty means the diff
/// may proceed to full verification.
pub fn check_veto_conditions(diff: &str) -> Vec<String> {
    let mut violations = Vec::new();

    for secret in SECRET_PATTERNS {
        let re = Regex::new(secret.pattern).expect("static veto pattern");
        if re.is_match(diff) {
            violations.push(secret.label.to_string());
        }
    }

    let infinite_loop = Regex::new(r"while\s*\(\s*true\s*\)|for\s*\(\s*;;\s*\)").expect("static veto pattern");
    if infinite_loop.is_match(diff) {
        violations.push("Infinite loop: while(true) or for(;;)".to_string());
    }

    violations.extend(find_unbounded_recursion(diff));

    if has_sql_injection(diff) {
        violations.push("Likely SQL injection: interpolated query string".to_string());
    }

    violations
}

/// A function that textually refers to itself without a visible return
fn find_unbounded_recursion(diff: &str) -> Vec<String> {
    let decl = Regex::new(r"(?:function|fn|def)\s+([A-Za-z_][A-Za-z0-9_]*)").expect("static veto pattern");

    let lines: Vec<&str> = diff.lines().collect();
    let mut violations = Vec::new();

    for (start, line) in lines.iter().enumerate() {
        let Some(captures) = decl.captures(line) else {
            continue;
        };
        let name = &captures[1];

        // Body = lines until the next declaration or end of diff
        let mut body = String::new();
        for body_line in lines.iter().skip(start + 1) {
            if decl.is_match(body_line) {
                break;
            }
            body.push_str(body_line);
            body.push('\n');
        }

        let calls_itself = body.contains(&format!("{}(", name));
        let has_return = body.contains("return");
        if calls_itself && !has_return {
            violations.push(format!("Unbounded recursion: {} calls itself without a return", name));
        }
    }

    violations
}

/// Interpolated string templates adjacent to query/execute tokens
fn has_sql_injection(diff: &str) -> bool {
    diff.lines()
        .any(|line| (line.contains("query") || line.contains("execute")) && line.contains("${"))
}
