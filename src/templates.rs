//! Fixed prompts and canned replies.
//!
//! Canned replies skip the LLM entirely: the off-topic redirect, the chat
//! welcome and goodbye lines, and the try-again apology used when an
//! external call fails. Clarifying questions for an incomplete visa
//! question are canned too.

use visa_assist_core::countries::country_name;
use visa_assist_core::slots::SlotGap;

/// System prompt for the response generator.
pub const ASSISTANT_SYSTEM_PROMPT: &str = "\
You are James, a human travel agent at Rehman Travels. You're friendly, professional, \
and natural - just like a real person would be in a travel agency.

Keep responses short and conversational. Match the user's tone.

You have access to a visa requirements database. When visa facts are provided, base your \
answer on them and do not invent requirements they do not state.

For visa questions, you need the user's nationality and destination country. Use your \
natural language understanding - if someone says \"travelling to Dubai\", you understand \
Dubai is the destination. Only ask for what's missing.";

/// Header of the system message carrying retrieved facts.
pub const CONTEXT_HEADER: &str =
    "Visa facts retrieved from the visa_requirements_search tool:";

/// System prompt for the LLM intent classifier.
pub const INTENT_SYSTEM_PROMPT: &str = r#"You are an intent classifier for a travel agency chatbot. Classify the user's question into one of these categories:

1. visa: Questions about visa requirements, visa-free travel, visa on arrival, e-visa, visa applications, passport requirements, entry requirements
   Examples: "Do I need a visa for Dubai?", "Visa requirements for US citizens", "Can I travel visa-free to France?"

2. baggage: Questions about luggage, baggage rules, carry-on restrictions, checked baggage, baggage claims, weight limits, prohibited items
   Examples: "What's the baggage allowance?", "Can I bring liquids?", "Baggage rules for international flights"

3. general_travel: General travel questions about destinations, packages, hotels, flights, travel tips, travel planning, booking inquiries
   Examples: "Do you offer Dubai packages?", "What's the best time to visit?", "Flight booking", "Hotel recommendations"

4. off_topic: Questions completely unrelated to travel (weather, sports, news, random chat, etc.)
   Examples: "What's the weather?", "Tell me a joke", "How's your day?"

Respond with ONLY a JSON object:
{"intent": "visa|baggage|general_travel|off_topic", "confidence": "brief reason"}"#;

/// Reply for off-topic messages.
pub const OFF_TOPIC_REPLY: &str = "I'm here to help with travel - visas, baggage, flights, \
and trip planning. Is there anything travel-related I can help you with?";

/// Reply when a collaborator failed after retries.
pub const TRY_AGAIN_REPLY: &str =
    "Sorry, I'm having trouble looking that up right now. Please try again in a moment.";

/// Reply when no language model is configured.
pub const NO_MODEL_REPLY: &str =
    "I can't answer free-form questions right now because no language model is configured.";

pub const WELCOME: &str = "Hello, welcome to Rehman Travels. How can I help you today?";

pub const GOODBYE: &str = "Goodbye! Safe travels!";

/// The question asked when a visa lookup lacks a passport country or a
/// destination.
pub fn clarifying_question(gap: &SlotGap) -> String {
    let name = |code: &'static str| country_name(code).unwrap_or(code);
    match gap {
        SlotGap::Both => {
            "Happy to check that. Which passport do you hold, and where are you travelling to?"
                .to_string()
        }
        SlotGap::Origin => "Which country's passport will you be travelling on?".to_string(),
        SlotGap::Destination => "Which country are you planning to visit?".to_string(),
        SlotGap::Clarify(code) => format!(
            "Just to confirm: is {} your nationality or your destination?",
            name(code)
        ),
    }
}

/// Input lines that end an interactive chat.
pub fn is_exit_command(input: &str) -> bool {
    matches!(
        input.trim().to_ascii_lowercase().as_str(),
        "exit" | "quit" | "bye" | "goodbye"
    )
}

/// The human prompt sent to the LLM intent classifier.
pub fn intent_user_prompt(message: &str) -> String {
    format!("User question: {}\n\nClassify this question.", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command(" Quit "));
        assert!(!is_exit_command("exit visa"));
    }

    #[test]
    fn clarification_names_the_place() {
        assert_eq!(
            clarifying_question(&SlotGap::Clarify("ARE")),
            "Just to confirm: is United Arab Emirates your nationality or your destination?"
        );
        assert!(clarifying_question(&SlotGap::Origin).contains("passport"));
    }
}
