//! Prompt assembly for the guide persona.
use crate::knowledge::Place;
use crate::session::ChatMessage;

pub const SYSTEM_PROMPT: &str = r#"You are a friendly local guide for India. Respond conversationally, helpfully, and enthusiastically to tourist queries about places to eat, visit, shop, hotels, cuisines, prices, comparisons, or anything travel-related across any state or city in India.
Infer locations (city/state) from the user's message if not provided. Use the knowledge base context if relevant.
If not covered by the knowledge base, draw from your general knowledge of Indian destinations. Be accurate and suggest alternatives.

FORMATTING AND STYLE RULES:
- ALWAYS format ALL responses as simple bullet points using "- " (dash followed by space)
- NEVER write in paragraph form; break everything into bullet points
- NEVER use markdown formatting like **bold**, *italics*, or # headers
- NEVER use asterisks (*) or other markdown symbols
- Each bullet point should be on a new line starting with "- "
- Keep each bullet point short and easy to understand (1-2 sentences max per bullet)
- For sections like "Day 1:" or "Accommodation:", put the heading on its own line, then bullet points below
- Include all sections requested (accommodation, transportation, budget, etc.) but keep each section minimal
- Maintain context from conversation history
- Make the answer scannable at a glance, not dense."#;

const NO_MATCHES: &str =
    "No specific knowledge base matches found. Rely on general expertise.\n";

/// Knowledge-base section of the user turn.
#[must_use]
pub fn build_context(places: &[Place]) -> String {
    if places.is_empty() {
        return NO_MATCHES.to_string();
    }

    let mut context = String::from("Knowledge Base:\n");
    for place in places {
        context.push_str(&place.context_line());
        context.push('\n');
    }
    context
}

#[must_use]
pub fn build_user_message(message: &str, context: &str) -> String {
    format!("{message}\n\nUse this knowledge base context if relevant: {context}")
}

/// System prompt, then prior turns, then the new user turn.
#[must_use]
pub fn build_messages(history: &[ChatMessage], user_message: String) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(user_message));
    messages
}
