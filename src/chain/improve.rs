//! One-shot rewrite of the task description before the chain runs.

use tracing::{info, warn};

use crate::dialogue::{SessionFactory, SystemPrompts, extract_conclusion};
use crate::errors::DialogueError;

/// Session label of the rewrite conversation.
pub const SELF_IMPROVE_LABEL: &str = "SelfImprove";

const ASSISTANT_ROLE: &str = "Prompt Engineer";
const ASSISTANT_PROMPT: &str = "You are a professional prompt engineer that can improve user input prompts to make LLMs better understand them.";
const USER_ROLE: &str = "User";
const USER_PROMPT: &str = "You are a user that wants to use LLMs to build software.";

fn seed(task: &str) -> String {
    format!(
        "I will give you a short description of a software design requirement.\n\
         Please rewrite it into a detailed prompt that can make the LLM know how to make this \
         software better based on this prompt. The prompt should ensure LLMs build software \
         that can be run correctly, which is the most important part you need to consider.\n\
         Remember that the revised prompt should not contain more than 200 words.\n\
         Here is the short description: \"{}\".\n\
         If the revised prompt is revised_version_of_the_description, then you should return \
         a message in the format \"<INFO> revised_version_of_the_description\", do not return \
         messages in other formats.",
        task
    )
}

/// Ask a prompt-engineer role to rewrite `task`.
///
/// The revision is the text after the last `<INFO>` marker, lowercased and
/// trimmed. A reply without the marker is used whole.
pub async fn self_task_improve(
    sessions: &dyn SessionFactory,
    task: &str,
) -> Result<String, DialogueError> {
    let prompts = SystemPrompts {
        assistant_role_name: ASSISTANT_ROLE.to_string(),
        assistant_prompt: ASSISTANT_PROMPT.to_string(),
        user_role_name: USER_ROLE.to_string(),
        user_prompt: USER_PROMPT.to_string(),
    };

    let mut session = sessions.open(SELF_IMPROVE_LABEL);
    let message = session.init(&prompts, &seed(task)).await?;
    let (answer, _) = session.step(&message, true).await?;

    let revised = match extract_conclusion(&answer.content) {
        Some(revision) => revision.to_lowercase().trim().to_string(),
        None => {
            warn!("Self-improvement reply had no <INFO> marker, using it whole");
            answer.content.to_lowercase().trim().to_string()
        }
    };
    info!(original = %task, improved = %revised, "Task prompt self-improved");
    Ok(revised)
}
