//! Prompt rendering for the supervisor and worker agents.
//!
//! Templates mark their sections with `<!-- section:KEY required|droppable -->`.
//! When the rendered prompt exceeds the byte budget, the conversation section
//! loses its oldest lines first; required sections are only cut as a last
//! resort.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::decision::vocabulary;
use crate::core::types::ConversationState;

const SUPERVISOR_TEMPLATE: &str = include_str!("prompts/supervisor.md");
const WORKER_TEMPLATE: &str = include_str!("prompts/worker.md");

const TRUNCATED_MARKER: &str = "[earlier conversation truncated]";
const SECTION_SEPARATOR: &str = "\n\n";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("section regex")
});

static ENGINE: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_template("supervisor", SUPERVISOR_TEMPLATE)
        .expect("supervisor template should be valid");
    env.add_template("worker", WORKER_TEMPLATE)
        .expect("worker template should be valid");
    env
});

/// One prior contribution as shown to an agent.
#[derive(Debug, Clone, Serialize)]
struct TranscriptEntry<'a> {
    index: usize,
    author: &'a str,
    content: &'a str,
}

fn transcript(state: &ConversationState) -> Vec<TranscriptEntry<'_>> {
    state
        .contributions()
        .iter()
        .enumerate()
        .skip(1)
        .map(|(index, c)| TranscriptEntry {
            index,
            author: &c.author,
            content: c.content.trim(),
        })
        .collect()
}

/// Builds agent prompts within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Render the routing prompt for the supervisor.
    pub fn supervisor(
        &self,
        state: &ConversationState,
        members: &[String],
        max_steps: u32,
    ) -> Result<String> {
        let rendered = ENGINE
            .get_template("supervisor")?
            .render(context! {
                members => members,
                options => vocabulary(members),
                step => state.step(),
                max_steps => max_steps,
                request => state.request().trim(),
                transcript => transcript(state),
            })
            .context("render supervisor prompt")?;
        Ok(self.fit(&rendered))
    }

    /// Render the prompt for one worker turn.
    pub fn worker(
        &self,
        name: &str,
        instructions: &str,
        state: &ConversationState,
    ) -> Result<String> {
        let rendered = ENGINE
            .get_template("worker")?
            .render(context! {
                name => name,
                instructions => instructions.trim(),
                request => state.request().trim(),
                transcript => transcript(state),
            })
            .context("render worker prompt")?;
        Ok(self.fit(&rendered))
    }

    fn fit(&self, rendered: &str) -> String {
        let mut sections = parse_sections(rendered);
        apply_budget(&mut sections, self.budget_bytes);
        render_sections(&sections)
    }
}

#[derive(Debug, Clone)]
struct Section {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<Section> {
    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(matches.len());

    for (i, caps) in matches.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(Section {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

/// Rendered length, including the blank line between non-empty sections.
fn total_len(sections: &[Section]) -> usize {
    let non_empty = sections.iter().filter(|s| !s.content.is_empty()).count();
    let separators = SECTION_SEPARATOR.len() * non_empty.saturating_sub(1);
    sections.iter().map(|s| s.content.len()).sum::<usize>() + separators
}

fn apply_budget(sections: &mut [Section], budget: usize) {
    let total = total_len(sections);
    if total <= budget {
        return;
    }

    // Keep the most recent conversation lines; they matter most for routing.
    if let Some(section) = sections.iter_mut().find(|s| !s.required) {
        let excess = total - budget;
        let before_len = section.content.len();
        let keep = before_len.saturating_sub(excess + TRUNCATED_MARKER.len() + 1);
        let mut start = before_len - keep;
        while !section.content.is_char_boundary(start) {
            start += 1;
        }
        // Drop whole lines only.
        if start > 0 && section.content.as_bytes()[start - 1] != b'\n' {
            start = section.content[start..]
                .find('\n')
                .map_or(before_len, |i| start + i + 1);
        }
        let tail = section.content[start..].to_string();
        section.content = if tail.is_empty() {
            String::new()
        } else {
            format!("{TRUNCATED_MARKER}\n{tail}")
        };
        debug!(
            section = section.key,
            before_len,
            after_len = section.content.len(),
            "truncated section for budget"
        );
    }

    let total = total_len(sections);
    if total > budget
        && let Some(last) = sections.iter_mut().rev().find(|s| s.required)
    {
        let other_len = total - last.content.len();
        let mut allowed = budget.saturating_sub(other_len);
        while !last.content.is_char_boundary(allowed.min(last.content.len())) {
            allowed -= 1;
        }
        last.content.truncate(allowed);
        debug!(section = last.key, "truncated required section for budget");
    }
}

fn render_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .filter(|s| !s.content.is_empty())
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}
