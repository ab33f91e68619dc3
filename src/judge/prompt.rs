//! Evaluator prompts.

use super::JudgeContext;

const MAX_INSTRUCTION_CHARS: usize = 500;

pub const SYSTEM_PROMPT: &str = "You are evaluating a single web element interaction by visual comparison.

You receive:
- Before: the webpage before the interaction
- After: the webpage after the agent's interaction
- Ground Truth: the expected webpage after a correct interaction
- The task instruction, the expected visual changes and the success criteria

Compare the after screenshot with the ground truth screenshot, verify each expected visual change occurred, and focus on the regions where changes should occur. Ignore incidental differences such as timestamps, ads or cursor position.

Respond with a JSON object:
{\"score\": <0-100 visual similarity and completion of expected changes>, \"success\": <true if score >= 90>, \"explanation\": \"<changes observed or missing, and why the interaction succeeded or failed>\"}";

/// Build the user prompt describing the task.
pub fn build_user_prompt(context: &JudgeContext) -> String {
    let mut prompt = format!("Task: {}\n", truncate(&context.instruction, MAX_INSTRUCTION_CHARS));

    if !context.interaction.is_empty() {
        prompt.push_str(&format!("Interaction: {}\n", context.interaction));
    }
    if !context.ground_truth_description.is_empty() {
        prompt.push_str(&format!("Expected outcome: {}\n", context.ground_truth_description));
    }

    push_list(&mut prompt, "Expected visual changes", &context.expected_changes);
    push_list(&mut prompt, "Success criteria", &context.success_criteria);

    prompt.push_str(
        "\nThe images follow in order: before interaction, after interaction, ground truth.",
    );
    prompt
}

fn push_list(prompt: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    prompt.push_str(&format!("\n{}:\n", title));
    for item in items {
        prompt.push_str(&format!("- {}\n", item));
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
