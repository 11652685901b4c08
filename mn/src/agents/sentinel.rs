//! The Sentinel agent
//!
//! Adjudicates an Actor-produced diff. Read-only: the Sentinel never
//! touches the worktree; it sees the diff, the plan, the definition of
//! done, and the repo map, and returns a verdict.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::domain::{AuditLog, SentinelStats, SentinelVerdict, Task, Traceability};
use crate::llm::{ChatClient, ChatMessage, ChatRequest, Effort};
use crate::prompts::{SENTINEL_SYSTEM, SENTINEL_VERIFY_TEMPLATE, render};

use super::veto::check_veto_conditions;

/// Everything the Sentinel needs for one verification
pub struct SentinelContext<'a> {
    pub task: &'a Task,
    pub diff: &'a str,
    pub plan: &'a str,
    pub definition_of_done: &'a str,
    pub repo_map: &'a str,
    pub prior_verdicts: &'a [SentinelVerdict],
}

/// SHA-256 of the diff text, truncated to 16 hex chars
pub fn verification_hash(diff: &str) -> String {
    let digest = Sha256::digest(diff.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// The critic agent
pub struct Sentinel {
    client: Arc<dyn ChatClient>,
    model: String,
    effort: Effort,
    quality_threshold: u8,
    stats: Mutex<SentinelStats>,
}

impl Sentinel {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>, effort: Effort, quality_threshold: u8) -> Self {
        Self {
            client,
            model: model.into(),
            effort,
            quality_threshold,
            stats: Mutex::new(SentinelStats::default()),
        }
    }

    /// Running verification statistics
    pub fn stats(&self) -> SentinelStats {
        *self.stats.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Scan a diff for automatic veto violations
    pub fn check_veto(&self, diff: &str) -> Vec<String> {
        check_veto_conditions(diff)
    }

    /// Build the automatic veto verdict for a set of violations
    pub fn automatic_veto(&self, task_id: &str, diff: &str, violations: &[String]) -> SentinelVerdict {
        let mut verdict = SentinelVerdict::new(task_id);
        verdict.quality_score = 0;
        verdict.passed = false;
        verdict.thinking_effort = self.effort.to_string();
        verdict.audit_log.architectural_sins = violations.to_vec();
        verdict.correction_directive = Some(format!(
            "Automatic veto. Remove every violation before resubmitting:\n- {}",
            violations.join("\n- ")
        ));
        verdict.verification_hash = verification_hash(diff);

        self.record_score(0, true);
        verdict
    }

    /// Full verification of a diff.
    ///
    /// The mandatory veto pre-check runs first; if it fires, the automatic
    /// veto verdict is returned without consulting the model.
    pub async fn verify(&self, ctx: SentinelContext<'_>) -> SentinelVerdict {
        let violations = self.check_veto(ctx.diff);
        if !violations.is_empty() {
            info!(task_id = %ctx.task.id, count = violations.len(), "Automatic veto");
            return self.automatic_veto(&ctx.task.id, ctx.diff, &violations);
        }

        let prior_directives: String = ctx
            .prior_verdicts
            .iter()
            .filter_map(|v| v.correction_directive.as_deref())
            .map(|d| format!("- {}\n", d))
            .collect();

        let mut template_ctx = HashMap::new();
        template_ctx.insert("diff", ctx.diff.to_string());
        template_ctx.insert("plan", ctx.plan.to_string());
        template_ctx.insert("definition_of_done", ctx.definition_of_done.to_string());
        template_ctx.insert("repo_map", ctx.repo_map.to_string());
        template_ctx.insert("prior_directives", prior_directives);

        let user_prompt = match render(SENTINEL_VERIFY_TEMPLATE, &template_ctx) {
            Ok(p) => p,
            Err(e) => return self.parse_failure_verdict(&ctx, &format!("Template error: {}", e)),
        };

        let request = ChatRequest {
            model: Some(self.model.clone()),
            messages: vec![ChatMessage::system(SENTINEL_SYSTEM), ChatMessage::user(user_prompt)],
            effort: Some(self.effort),
            ..Default::default()
        };

        let response = match self.client.chat(request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(task_id = %ctx.task.id, error = %e, "Sentinel chat failed");
                return self.parse_failure_verdict(&ctx, &format!("Verification call failed: {}", e));
            }
        };

        let content = response.content.unwrap_or_default();
        match parse_verdict_json(&content) {
            Some(parsed) => self.finish_verdict(&ctx, parsed),
            None => self.parse_failure_verdict(&ctx, "Model output was not the expected verdict JSON"),
        }
    }

    fn finish_verdict(&self, ctx: &SentinelContext<'_>, parsed: ParsedVerdict) -> SentinelVerdict {
        let mut verdict = SentinelVerdict::new(&ctx.task.id);
        verdict.quality_score = parsed.quality_score;
        // The numeric contract is authoritative over the model's own claim
        verdict.passed = parsed.passed && parsed.quality_score >= self.quality_threshold;
        verdict.thinking_effort = self.effort.to_string();
        verdict.audit_log = parsed.audit_log;
        verdict.verification_hash = verification_hash(ctx.diff);

        if verdict.passed {
            verdict.correction_directive = None;
        } else {
            verdict.correction_directive = parsed
                .correction_directive
                .or_else(|| Some(generate_correction_directive(&verdict.audit_log)));
        }

        debug!(
            task_id = %ctx.task.id,
            score = verdict.quality_score,
            passed = verdict.passed,
            "Sentinel verdict"
        );
        self.record_score(verdict.quality_score, false);
        verdict
    }

    fn parse_failure_verdict(&self, ctx: &SentinelContext<'_>, reason: &str) -> SentinelVerdict {
        let mut verdict = SentinelVerdict::new(&ctx.task.id);
        verdict.quality_score = 0;
        verdict.passed = false;
        verdict.thinking_effort = self.effort.to_string();
        verdict.audit_log.architectural_sins = vec!["Parse error".to_string()];
        verdict.correction_directive = Some(format!(
            "The verification output could not be interpreted: {}. Resubmit the same change; \
             the next verification will re-audit it from scratch.",
            reason
        ));
        verdict.verification_hash = verification_hash(ctx.diff);

        self.record_score(0, false);
        verdict
    }

    fn record_score(&self, score: u8, veto: bool) {
        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        let previous_total = stats.average_quality_score * stats.verification_count as f64;
        stats.verification_count += 1;
        if veto {
            stats.veto_count += 1;
        }
        stats.average_quality_score = (previous_total + score as f64) / stats.verification_count as f64;
    }
}

struct ParsedVerdict {
    quality_score: u8,
    passed: bool,
    audit_log: AuditLog,
    correction_directive: Option<String>,
}

/// Parse the model's verdict JSON, tolerating markdown fences around it
fn parse_verdict_json(content: &str) -> Option<ParsedVerdict> {
    let trimmed = content.trim();
    let json_text = if let Some(start) = trimmed.find('{') {
        let end = trimmed.rfind('}')?;
        &trimmed[start..=end]
    } else {
        return None;
    };

    let value: serde_json::Value = serde_json::from_str(json_text).ok()?;
    let quality_score = value.get("quality_score")?.as_u64()?.min(100) as u8;
    let passed = value.get("passed")?.as_bool()?;

    let audit = value.get("audit_log").cloned().unwrap_or(serde_json::json!({}));
    let string_list = |v: &serde_json::Value, key: &str| -> Vec<String> {
        v.get(key)
            .and_then(|x| x.as_array())
            .map(|arr| arr.iter().filter_map(|s| s.as_str().map(String::from)).collect())
            .unwrap_or_default()
    };
    let traceability = audit.get("traceability").cloned().unwrap_or(serde_json::json!({}));

    let audit_log = AuditLog {
        traceability: Traceability {
            mapped: string_list(&traceability, "mapped"),
            missing: string_list(&traceability, "missing"),
            unplanned: string_list(&traceability, "unplanned"),
        },
        architectural_sins: string_list(&audit, "architectural_sins"),
        slop_patterns: string_list(&audit, "slop_patterns_detected"),
    };

    let correction_directive = value
        .get("correction_directive")
        .and_then(|v| v.as_str())
        .map(String::from);

    Some(ParsedVerdict {
        quality_score,
        passed,
        audit_log,
        correction_directive,
    })
}

/// Socratic correction-directive generator.
///
/// Turns an audit log into questions the Actor must answer with its next
/// attempt rather than a list of commands.
pub fn generate_correction_directive(audit: &AuditLog) -> String {
    let mut questions = Vec::new();

    for missing in &audit.traceability.missing {
        questions.push(format!("The plan requires \"{}\". Where is it implemented?", missing));
    }
    for unplanned in &audit.traceability.unplanned {
        questions.push(format!("\"{}\" maps to no requirement. Why is it in this change?", unplanned));
    }

    for sin in &audit.architectural_sins {
        let lower = sin.to_lowercase();
        if lower.contains("nesting") {
            questions.push("Could this be refactored with guard clauses to flatten the nesting?".to_string());
        } else if lower.contains("monolithic") {
            questions.push("What sub-functions could this monolithic function be split into?".to_string());
        } else if lower.contains("error") {
            questions.push("What is the recovery path when this operation fails?".to_string());
        }
    }

    for slop in &audit.slop_patterns {
        let lower = slop.to_lowercase();
        if lower.contains("todo") {
            questions.push("There are TODO markers left. Why is this not finished?".to_string());
        } else if lower.contains("print") || lower.contains("console") || lower.contains("debug") {
            questions.push("Debug prints remain. What does your pre-submission checklist look like?".to_string());
        } else if lower.contains("import") {
            questions.push("Unused imports remain. What tool would catch these automatically?".to_string());
        }
    }

    if questions.is_empty() {
        return "Review the change against the project's standards and resubmit.".to_string();
    }
    questions.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatResponse;
    use crate::llm::client::mock::MockChatClient;

    fn task() -> Task {
        Task::new("proj-1", "create README.md", 0)
    }

    fn sentinel_with(content: &str) -> Sentinel {
        let client = Arc::new(MockChatClient::from_responses(vec![ChatResponse {
            content: Some(content.to_string()),
            ..Default::default()
        }]));
        Sentinel::new(client, "auditor", Effort::Max, 85)
    }

    fn ctx<'a>(task: &'a Task, diff: &'a str) -> SentinelContext<'a> {
        SentinelContext {
            task,
            diff,
            plan: "add a README",
            definition_of_done: "README exists",
            repo_map: "README.md",
            prior_verdicts: &[],
        }
    }

    fn verdict_json(score: u8, passed: bool) -> String {
        format!(
            r#"{{"quality_score": {}, "passed": {}, "audit_log": {{"traceability": {{"mapped": ["README"], "missing": [], "unplanned": []}}, "architectural_sins": [], "slop_patterns_detected": []}}, "correction_directive": null}}"#,
            score, passed
        )
    }

    #[test]
    fn test_verification_hash_is_16_hex() {
        let hash = verification_hash("+ hello");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        // Deterministic
        assert_eq!(hash, verification_hash("+ hello"));
        assert_ne!(hash, verification_hash("+ goodbye"));
    }

    #[tokio::test]
    async fn test_verify_passing_verdict() {
        let sentinel = sentinel_with(&verdict_json(92, true));
        let task = task();

        let verdict = sentinel.verify(ctx(&task, "+ README.md: hello")).await;
        assert_eq!(verdict.quality_score, 92);
        assert!(verdict.passed);
        assert!(verdict.correction_directive.is_none());
        assert_eq!(verdict.verification_hash, verification_hash("+ README.md: hello"));
    }

    #[tokio::test]
    async fn test_score_boundary_at_threshold() {
        // 84 with threshold 85 fails even when the model claims a pass
        let sentinel = sentinel_with(&verdict_json(84, true));
        let task = task();
        let verdict = sentinel.verify(ctx(&task, "+ x")).await;
        assert!(!verdict.passed);
        assert!(verdict.correction_directive.is_some());

        // 85 passes
        let sentinel = sentinel_with(&verdict_json(85, true));
        let verdict = sentinel.verify(ctx(&task, "+ x")).await;
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn test_model_fail_claim_is_respected() {
        let sentinel = sentinel_with(&verdict_json(95, false));
        let task = task();
        let verdict = sentinel.verify(ctx(&task, "+ x")).await;
        assert!(!verdict.passed);
    }

    #[tokio::test]
    async fn test_veto_pre_check_skips_model() {
        let client = Arc::new(MockChatClient::from_responses(vec![]));
        let sentinel = Sentinel::new(client.clone(), "auditor", Effort::Max, 85);
        let task = task();

        let diff = r#"+ api_key = "AKIA0123456789ABCDEF""#;
        let verdict = sentinel.verify(ctx(&task, diff)).await;

        assert_eq!(verdict.quality_score, 0);
        assert!(!verdict.passed);
        assert!(!verdict.audit_log.architectural_sins.is_empty());
        assert!(verdict.correction_directive.unwrap().contains("Automatic veto"));
        // The model was never consulted
        assert_eq!(client.call_count(), 0);

        let stats = sentinel.stats();
        assert_eq!(stats.veto_count, 1);
        assert_eq!(stats.verification_count, 1);
    }

    #[tokio::test]
    async fn test_parse_failure_verdict() {
        let sentinel = sentinel_with("I could not decide, sorry!");
        let task = task();
        let verdict = sentinel.verify(ctx(&task, "+ x")).await;

        assert_eq!(verdict.quality_score, 0);
        assert!(!verdict.passed);
        assert_eq!(verdict.audit_log.architectural_sins, vec!["Parse error".to_string()]);
        assert!(verdict.correction_directive.is_some());
    }

    #[tokio::test]
    async fn test_verdict_json_with_markdown_fences() {
        let fenced = format!("```json\n{}\n```", verdict_json(90, true));
        let sentinel = sentinel_with(&fenced);
        let task = task();
        let verdict = sentinel.verify(ctx(&task, "+ x")).await;
        assert_eq!(verdict.quality_score, 90);
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn test_stats_running_average() {
        let client = Arc::new(MockChatClient::from_responses(vec![
            ChatResponse {
                content: Some(verdict_json(80, false)),
                ..Default::default()
            },
            ChatResponse {
                content: Some(verdict_json(90, true)),
                ..Default::default()
            },
        ]));
        let sentinel = Sentinel::new(client, "auditor", Effort::Max, 85);
        let task = task();

        sentinel.verify(ctx(&task, "+ a")).await;
        sentinel.verify(ctx(&task, "+ b")).await;

        let stats = sentinel.stats();
        assert_eq!(stats.verification_count, 2);
        assert_eq!(stats.veto_count, 0);
        assert!((stats.average_quality_score - 85.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_directive_generator_maps_findings() {
        let audit = AuditLog {
            traceability: Traceability {
                mapped: vec![],
                missing: vec!["error handling for the API call".to_string()],
                unplanned: vec!["a new config flag".to_string()],
            },
            architectural_sins: vec!["deep nesting in handler".to_string(), "monolithic function".to_string()],
            slop_patterns: vec!["TODO left in code".to_string(), "console prints".to_string()],
        };

        let directive = generate_correction_directive(&audit);
        assert!(directive.contains("Where is it implemented?"));
        assert!(directive.contains("maps to no requirement"));
        assert!(directive.contains("guard clauses"));
        assert!(directive.contains("sub-functions"));
        assert!(directive.contains("not finished"));
        assert!(directive.contains("pre-submission checklist"));
    }

    #[test]
    fn test_directive_generator_generic_fallback() {
        let directive = generate_correction_directive(&AuditLog::default());
        assert!(directive.contains("Review the change"));
    }
}
