//! Prompt templates for the Actor and Sentinel
//!
//! Templates are embedded as handlebars sources and rendered with a
//! per-call context map.

mod embedded;

pub use embedded::{ACTOR_SYSTEM, ACTOR_TASK_TEMPLATE, SENTINEL_SYSTEM, SENTINEL_VERIFY_TEMPLATE};

use std::collections::HashMap;

use handlebars::Handlebars;

/// Render a template with the given context.
///
/// Unknown placeholders render as empty strings rather than erroring; a
/// malformed template is the only failure mode.
pub fn render(template: &str, context: &HashMap<&str, String>) -> eyre::Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(false);
    handlebars.register_escape_fn(handlebars::no_escape);
    Ok(handlebars.render_template(template, context)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_context() {
        let mut ctx = HashMap::new();
        ctx.insert("task", "create README.md".to_string());
        let out = render("Task: {{task}}", &ctx).unwrap();
        assert_eq!(out, "Task: create README.md");
    }

    #[test]
    fn test_render_missing_key_is_empty() {
        let ctx = HashMap::new();
        let out = render("Before {{missing}} after", &ctx).unwrap();
        assert_eq!(out, "Before  after");
    }

    #[test]
    fn test_render_does_not_escape_code() {
        let mut ctx = HashMap::new();
        ctx.insert("diff", "+ if a < b && c > d {".to_string());
        let out = render("{{diff}}", &ctx).unwrap();
        assert_eq!(out, "+ if a < b && c > d {");
    }

    #[test]
    fn test_embedded_templates_render() {
        let mut ctx = HashMap::new();
        ctx.insert("task_description", "wire the API".to_string());
        ctx.insert("project_idea", "a todo app".to_string());
        ctx.insert("previous_attempts", String::new());
        assert!(render(ACTOR_TASK_TEMPLATE, &ctx).is_ok());

        let mut ctx = HashMap::new();
        ctx.insert("diff", "+ fn main() {}".to_string());
        ctx.insert("plan", "plan".to_string());
        ctx.insert("definition_of_done", "done".to_string());
        ctx.insert("repo_map", "src/main.rs".to_string());
        assert!(render(SENTINEL_VERIFY_TEMPLATE, &ctx).is_ok());
    }
}
