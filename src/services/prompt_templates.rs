use serde_json::{json, Value as JsonValue};

use crate::models::oracle::OracleRequest;

/// Number of ideas requested per oracle call.
pub const SUGGESTIONS_PER_CALL: usize = 3;

/// System prompt for the suggestion oracle.
pub fn suggestion_system_prompt() -> &'static str {
    r#"You are Dayweave's day-planning companion. Given the user's mood, environment,
weather, interests and the parts of today that are already busy, propose short, concrete
activities that fit into the free time of the requested window. Always respond with valid
UTF-8 JSON. Do not wrap the response in markdown code blocks. The schema is:
{
  "task_suggestions": [
    {
      "task": string,
      "priority": "High" | "Medium" | "Low",
      "reason": string
    }
  ]
}
Rules:
- Return exactly 3 suggestions ordered from most to least relevant.
- "task" is an imperative phrase of at most eight words, e.g. "Take a 20 minute walk".
- Never propose anything listed in "avoidTitles", nor a close variation of it.
- When "retryHint" is present, the user turned down an earlier idea; propose something
  clearly different in kind, not a rewording.
- "calendarConflicts" are ISO-8601 ranges that are already taken; do not propose activities
  that only make sense during them.

Example response:
{
  "task_suggestions": [
    {"task": "Stretch for ten minutes", "priority": "High", "reason": "You mentioned feeling stiff after a long desk session."},
    {"task": "Call an old friend", "priority": "Medium", "reason": "A calm evening is a good moment to reconnect."},
    {"task": "Water the balcony plants", "priority": "Low", "reason": "Sunny weather dries the soil quickly."}
  ]
}
"#
}

/// Build the user payload for a suggestion request.
pub fn build_suggestion_payload(request: &OracleRequest) -> JsonValue {
    let context = serde_json::to_value(request).unwrap_or_else(|_| json!({}));
    json!({
        "operation": "suggestTasks",
        "context": context,
        "expectations": {
            "count": SUGGESTIONS_PER_CALL,
            "priorities": ["High", "Medium", "Low"]
        }
    })
}
