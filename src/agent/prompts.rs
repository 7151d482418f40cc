//! Planner and summarizer prompt templates
//!
//! Templates are plain strings with named placeholders. Placeholders are
//! filled in a single pass, so text substituted into a template (a summary
//! that happens to contain `{new_observation}`, say) is never expanded again.
//! Doubled braces are literal, so `picoCTF{{...}}` reaches the model as
//! `picoCTF{...}`.

use crate::ollama::ChatMessage;

pub const SUMMARIZED_HISTORY: &str = "summarized_history";
pub const NEW_OBSERVATION: &str = "new_observation";

/// A required placeholder is absent from a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPlaceholder {
    pub template: &'static str,
    pub placeholder: &'static str,
}

impl std::fmt::Display for MissingPlaceholder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} is missing the {{{}}} placeholder",
            self.template, self.placeholder
        )
    }
}

impl std::error::Error for MissingPlaceholder {}

/// Validated prompt templates for both model roles
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    planner_system: String,
    planner_user: String,
    summarizer_system: String,
    summarizer_user: String,
}

impl PromptTemplates {
    pub fn new(
        planner_system: impl Into<String>,
        planner_user: impl Into<String>,
        summarizer_system: impl Into<String>,
        summarizer_user: impl Into<String>,
    ) -> Result<Self, MissingPlaceholder> {
        let templates = Self {
            planner_system: planner_system.into(),
            planner_user: planner_user.into(),
            summarizer_system: summarizer_system.into(),
            summarizer_user: summarizer_user.into(),
        };

        require(&templates.planner_user, "planner.user_prompt", SUMMARIZED_HISTORY)?;
        require(&templates.summarizer_user, "summarizer.user_prompt", SUMMARIZED_HISTORY)?;
        require(&templates.summarizer_user, "summarizer.user_prompt", NEW_OBSERVATION)?;

        Ok(templates)
    }

    /// Planner messages: the filled user template followed by the challenge text
    pub fn planner_messages(&self, running_summary: &str, target_text: &str) -> Vec<ChatMessage> {
        let mut user = fill(&self.planner_user, &[(SUMMARIZED_HISTORY, running_summary)]);
        user.push_str(target_text);

        vec![
            ChatMessage::system(self.planner_system.as_str()),
            ChatMessage::user(user),
        ]
    }

    pub fn summarizer_messages(&self, running_summary: &str, observation: &str) -> Vec<ChatMessage> {
        let user = fill(
            &self.summarizer_user,
            &[
                (SUMMARIZED_HISTORY, running_summary),
                (NEW_OBSERVATION, observation),
            ],
        );

        vec![
            ChatMessage::system(self.summarizer_system.as_str()),
            ChatMessage::user(user),
        ]
    }
}

fn require(
    template: &str,
    template_name: &'static str,
    placeholder: &'static str,
) -> Result<(), MissingPlaceholder> {
    let present = segments(template)
        .iter()
        .any(|segment| *segment == Segment::Placeholder(placeholder));
    if present {
        Ok(())
    } else {
        Err(MissingPlaceholder {
            template: template_name,
            placeholder,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

/// Split a template into literal text and `{name}` placeholders
///
/// `{{` and `}}` are escapes for literal braces. Braces that don't enclose
/// a plain identifier are literal text.
fn segments(template: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        if pos > 0 {
            out.push(Segment::Text(&rest[..pos]));
        }
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push(Segment::Text(&tail[..1]));
            rest = &tail[2..];
            continue;
        }

        let name = tail
            .strip_prefix('{')
            .and_then(|after| after.find('}').map(|close| &after[..close]))
            .filter(|name| is_identifier(name));
        match name {
            Some(name) => {
                out.push(Segment::Placeholder(name));
                rest = &tail[name.len() + 2..];
            }
            None => {
                out.push(Segment::Text(&tail[..1]));
                rest = &tail[1..];
            }
        }
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest));
    }
    out
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Replace `{name}` placeholders in one left-to-right pass
///
/// Unknown placeholders are copied through untouched.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    for segment in segments(template) {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Placeholder(name) => match values.iter().find(|(key, _)| *key == name) {
                Some((_, value)) => out.push_str(value),
                None => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
            },
        }
    }
    out
}
