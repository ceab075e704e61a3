//! System prompt describing the active work item and its hierarchy.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::html::{strip_html, truncate_chars};
use crate::models::{field, WorkItem};

/// Returned instead of a context document when there is no current item.
pub const NO_CONTEXT_NOTICE: &str = "No work item context is available. Answer using the conversation alone.";

/// Longest parent description summary, in characters.
pub const PARENT_SUMMARY_LIMIT: usize = 200;

const PREAMBLE: &str = "You are an assistant embedded in a work tracking tool. \
Use the work item context below to ground your answers about scope, status, \
acceptance criteria and next steps. If the context does not cover a question, say so.";

/// Plain scalar fields listed for the current item, in output order.
const CURRENT_FIELDS: &[(&str, &str)] = &[
    ("Type", field::WORK_ITEM_TYPE),
    ("Title", field::TITLE),
    ("State", field::STATE),
    ("Reason", field::REASON),
    ("Assigned To", field::ASSIGNED_TO),
    ("Area Path", field::AREA_PATH),
    ("Iteration Path", field::ITERATION_PATH),
    ("Priority", field::PRIORITY),
    ("Story Points", field::STORY_POINTS),
    ("Effort", field::EFFORT),
    ("Original Estimate", field::ORIGINAL_ESTIMATE),
    ("Remaining Work", field::REMAINING_WORK),
    ("Completed Work", field::COMPLETED_WORK),
    ("Tags", field::TAGS),
];

/// Key fields listed per child.
const CHILD_FIELDS: &[(&str, &str)] = &[
    ("State", field::STATE),
    ("Assigned To", field::ASSIGNED_TO),
    ("Story Points", field::STORY_POINTS),
    ("Remaining Work", field::REMAINING_WORK),
];

/// Whether `prompt` is the degraded no-context notice.
pub fn is_no_context(prompt: &str) -> bool {
    prompt == NO_CONTEXT_NOTICE
}

/// Render the context document.
///
/// Pure and deterministic. Absent fields are skipped rather than printed
/// with empty values, rich-text fields are reduced to plain text, and a
/// missing `current` yields [`NO_CONTEXT_NOTICE`].
pub fn build_context_prompt(
    current: Option<&WorkItem>,
    parent: Option<&WorkItem>,
    children: &[WorkItem],
    language: &str,
) -> String {
    let Some(current) = current else {
        return NO_CONTEXT_NOTICE.to_string();
    };

    let mut out = String::new();
    out.push_str(PREAMBLE);
    out.push('\n');
    let language = language.trim();
    let language = if language.is_empty() { "English" } else { language };
    let _ = writeln!(out, "Always respond in {language}.");

    out.push_str("\n=== CURRENT WORK ITEM ===\n");
    let _ = writeln!(out, "ID: {}", current.id);
    for (label, name) in CURRENT_FIELDS {
        if let Some(value) = current.text(name) {
            let _ = writeln!(out, "{label}: {value}");
        }
    }
    push_rich_text(&mut out, "Description", current.description());
    push_rich_text(&mut out, "Acceptance Criteria", current.acceptance_criteria());

    if let Some(parent) = parent {
        out.push_str("\n=== PARENT WORK ITEM ===\n");
        let _ = writeln!(out, "ID: {}", parent.id);
        for (label, name) in &CURRENT_FIELDS[..3] {
            if let Some(value) = parent.text(name) {
                let _ = writeln!(out, "{label}: {value}");
            }
        }
        if let Some(summary) = parent
            .description()
            .map(|d| strip_html(&d))
            .filter(|d| !d.is_empty())
        {
            let summary = truncate_chars(&summary.replace('\n', " "), PARENT_SUMMARY_LIMIT);
            let _ = writeln!(out, "Description Summary: {summary}");
        }
    }

    if !children.is_empty() {
        let _ = writeln!(out, "\n=== CHILD WORK ITEMS ({}) ===", children.len());
        for (index, child) in children.iter().enumerate() {
            let kind = child.work_item_type().unwrap_or_else(|| "Work Item".to_string());
            let title = child.title().unwrap_or_else(|| "(untitled)".to_string());
            let _ = write!(out, "{}. [{kind} #{}] {title}", index + 1, child.id);
            for (label, name) in CHILD_FIELDS {
                if let Some(value) = child.text(name) {
                    let _ = write!(out, " | {label}: {value}");
                }
            }
            out.push('\n');
        }
    }

    out.push_str("\n=== RELATIONSHIP SUMMARY ===\n");
    match parent {
        Some(parent) => {
            let kind = parent.work_item_type().unwrap_or_else(|| "Work Item".to_string());
            let _ = writeln!(out, "Parent: {kind} #{}", parent.id);
        }
        None => out.push_str("Parent: none\n"),
    }
    let _ = writeln!(out, "Children: {}", children.len());
    if !children.is_empty() {
        let by_type = tally(children, |c| c.work_item_type());
        let by_state = tally(children, |c| c.state());
        let _ = writeln!(out, "Children by type: {by_type}");
        let _ = writeln!(out, "Children by state: {by_state}");
    }

    out
}

fn push_rich_text(out: &mut String, label: &str, value: Option<String>) {
    let Some(text) = value.map(|v| strip_html(&v)).filter(|v| !v.is_empty()) else {
        return;
    };
    let _ = writeln!(out, "{label}:\n{text}");
}

/// "Task: 2, Bug: 1" with keys sorted for stable output.
fn tally<F>(items: &[WorkItem], key: F) -> String
where
    F: Fn(&WorkItem) -> Option<String>,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for item in items {
        let name = key(item).unwrap_or_else(|| "Unknown".to_string());
        *counts.entry(name).or_default() += 1;
    }
    counts
        .iter()
        .map(|(name, count)| format!("{name}: {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkItemSource;
    use serde_json::Map;

    fn item(id: u64, kind: &str, title: &str, state: &str) -> WorkItem {
        WorkItem::from_fields(id, Map::new(), WorkItemSource::Rest)
            .with_field(field::WORK_ITEM_TYPE, kind)
            .with_field(field::TITLE, title)
            .with_field(field::STATE, state)
    }

    #[test]
    fn missing_current_returns_notice() {
        let parent = item(50, "Feature", "Payments", "Active");
        let children = vec![item(101, "Task", "Wire API", "New")];
        for prompt in [
            build_context_prompt(None, None, &[], "English"),
            build_context_prompt(None, Some(&parent), &children, "French"),
        ] {
            assert_eq!(prompt, NO_CONTEXT_NOTICE);
            assert!(is_no_context(&prompt));
        }
    }

    #[test]
    fn renders_full_hierarchy() {
        let current = item(100, "User Story", "Checkout", "Active")
            .with_field(field::DESCRIPTION, "<p>Pay with <b>cards</b></p>")
            .with_field(field::ACCEPTANCE_CRITERIA, "<ul><li>Visa works</li></ul>")
            .with_field(field::STORY_POINTS, 5);
        let parent = item(50, "Feature", "Payments", "Active")
            .with_field(field::DESCRIPTION, format!("<div>{}</div>", "x".repeat(300)));
        let children = vec![
            item(101, "Task", "Wire API", "New").with_field(field::REMAINING_WORK, 3),
            item(102, "Task", "Write tests", "Active"),
            item(103, "Bug", "Rounding", "Active"),
        ];

        let prompt = build_context_prompt(Some(&current), Some(&parent), &children, "Spanish");

        assert!(prompt.contains("Always respond in Spanish."));
        assert!(prompt.contains("=== CURRENT WORK ITEM ===\nID: 100\nType: User Story\nTitle: Checkout\nState: Active\nStory Points: 5\n"));
        assert!(prompt.contains("Description:\nPay with cards\n"));
        assert!(prompt.contains("Acceptance Criteria:\n- Visa works\n"));
        assert!(prompt.contains("=== PARENT WORK ITEM ===\nID: 50\nType: Feature\nTitle: Payments\nState: Active\n"));
        assert!(prompt.contains(&format!("Description Summary: {}...\n", "x".repeat(197))));
        assert!(prompt.contains("=== CHILD WORK ITEMS (3) ===\n1. [Task #101] Wire API | State: New | Remaining Work: 3\n"));
        assert!(prompt.contains("Parent: Feature #50\nChildren: 3\n"));
        assert!(prompt.contains("Children by type: Bug: 1, Task: 2\n"));
        assert!(prompt.contains("Children by state: Active: 2, New: 1\n"));
    }

    #[test]
    fn absent_fields_produce_no_labels() {
        let current = WorkItem::placeholder(7);
        let prompt = build_context_prompt(Some(&current), None, &[], "English");

        assert!(prompt.contains("ID: 7\nTitle: Work Item 7\n"));
        for label in ["Type:", "State:", "Assigned To:", "Description:", "Acceptance Criteria:"] {
            assert!(!prompt.contains(label), "unexpected {label}");
        }
        assert!(!prompt.contains("PARENT WORK ITEM"));
        assert!(!prompt.contains("CHILD WORK ITEMS"));
        assert!(prompt.contains("Parent: none\nChildren: 0\n"));
    }

    #[test]
    fn output_is_deterministic() {
        let current = item(1, "Bug", "Crash", "New");
        let children = vec![item(2, "Task", "Fix", "New"), item(3, "Task", "Test", "Done")];
        let a = build_context_prompt(Some(&current), None, &children, "English");
        let b = build_context_prompt(Some(&current), None, &children, "English");
        assert_eq!(a, b);
    }

    #[test]
    fn blank_language_defaults_to_english() {
        let current = item(1, "Bug", "Crash", "New");
        let prompt = build_context_prompt(Some(&current), None, &[], "  ");
        assert!(prompt.contains("Always respond in English."));
    }
}
