/// System prompt synthesis for outbound assistant calls.
use chrono::{DateTime, Utc};

pub const DEFAULT_PERSONA: &str = "You are a friendly, professional assistant calling on behalf of \
Auto Laundry. Confirm pickup and delivery times, answer questions about services and prices, \
and keep the conversation short and polite.";

/// Current timestamp, persona text, and the operator's context, in that order.
pub fn system_prompt(
    persona: &str,
    now: DateTime<Utc>,
    caller_name: Option<&str>,
    context: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Current date and time: {}.\n\n{}",
        now.format("%A, %B %-d, %Y %H:%M UTC"),
        persona.trim()
    );
    if let Some(name) = caller_name.map(str::trim).filter(|n| !n.is_empty()) {
        prompt.push_str(&format!("\n\nYou are speaking with {}.", name));
    }
    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str(&format!("\n\nCall context: {}", context));
    }
    prompt
}
