//! Per-thread trip slots: passport country and destination.
//!
//! Slots are not stored separately. [`TravelSlots::from_history`] replays the
//! human messages of a thread through [`TravelSlots::update`], so they are as
//! durable as the conversation log and survive restarts with it.
//!
//! A visa lookup needs both slots. [`TravelSlots::gap`] names what is still
//! missing so the caller can ask for it without a model call.

use serde::Serialize;

use crate::countries::country_name;
use crate::entities::extract;
use crate::models::{Message, Role};

/// Replies that settle a pending place as the passport country.
const ORIGIN_ANSWERS: &[&str] = &[
    "nationality",
    "citizen",
    "passport",
    "i am from",
    "i'm from",
    "my country",
    "origin",
    "from there",
];

/// Replies that settle a pending place as the destination.
const DESTINATION_ANSWERS: &[&str] = &[
    "destination",
    "going to",
    "travel to",
    "travelling to",
    "traveling to",
    "visit",
    "want to go",
    "there",
];

/// What is still missing before a visa lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "missing", content = "country")]
pub enum SlotGap {
    Both,
    /// Passport country; the destination is known.
    Origin,
    /// Destination; the passport country is known.
    Destination,
    /// A place was named without saying which slot it fills.
    Clarify(&'static str),
}

/// ISO-3 codes for the trip under discussion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TravelSlots {
    pub origin: Option<&'static str>,
    pub destination: Option<&'static str>,
    /// A lone place awaiting "nationality or destination?".
    pub pending: Option<&'static str>,
}

impl TravelSlots {
    /// Replay the human messages of a thread, oldest first.
    pub fn from_history(messages: &[Message]) -> Self {
        let mut slots = Self::default();
        for m in messages.iter().filter(|m| m.role == Role::Human) {
            slots.update(&m.content);
        }
        slots
    }

    /// Fold one human message into the slots.
    ///
    /// A lone, uncued place fills whichever slot is empty. With both empty it
    /// becomes `pending`; with both filled it replaces the destination, so
    /// "what about Japan?" keeps the passport country.
    pub fn update(&mut self, text: &str) {
        let found = extract(text);

        if let Some(code) = self.pending.take() {
            if found.origin.is_none() || found.destination.is_none() {
                let lower = text.to_lowercase();
                if ORIGIN_ANSWERS.iter().any(|a| lower.contains(a)) {
                    self.origin = Some(code);
                    return;
                }
                if DESTINATION_ANSWERS.iter().any(|a| lower.contains(a)) {
                    self.destination = Some(code);
                    return;
                }
            }
        }

        match (found.origin, found.destination, found.ambiguous) {
            (Some(o), Some(d), _) => {
                self.origin = Some(o);
                self.destination = Some(d);
            }
            (Some(o), None, _) => self.origin = Some(o),
            (None, Some(d), _) => self.destination = Some(d),
            (None, None, Some(place)) => match (self.origin, self.destination) {
                (None, None) => self.pending = Some(place),
                (None, Some(_)) => self.origin = Some(place),
                (Some(_), _) => self.destination = Some(place),
            },
            (None, None, None) => {}
        }
    }

    /// `None` once both slots are filled and nothing is pending.
    pub fn gap(&self) -> Option<SlotGap> {
        if let Some(place) = self.pending {
            return Some(SlotGap::Clarify(place));
        }
        match (self.origin, self.destination) {
            (Some(_), Some(_)) => None,
            (None, None) => Some(SlotGap::Both),
            (None, Some(_)) => Some(SlotGap::Origin),
            (Some(_), None) => Some(SlotGap::Destination),
        }
    }

    /// Both codes, when the trip is fully known.
    pub fn pair(&self) -> Option<(&'static str, &'static str)> {
        match (self.gap(), self.origin, self.destination) {
            (None, Some(o), Some(d)) => Some((o, d)),
            _ => None,
        }
    }

    /// Retrieval text: the trip phrased like a stored document, then the
    /// user's own words.
    pub fn search_text(&self, utterance: &str) -> String {
        let name = |code: &'static str| country_name(code).unwrap_or(code);
        match self.pair() {
            Some((o, d)) => format!(
                "Citizens of {} can travel to {}. {}",
                name(o),
                name(d),
                utterance.trim()
            ),
            None => utterance.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(lines: &[&str]) -> TravelSlots {
        let messages: Vec<Message> = lines.iter().map(|l| Message::human(*l)).collect();
        TravelSlots::from_history(&messages)
    }

    #[test]
    fn slots_accumulate_across_messages() {
        let slots = replay(&["I'm Pakistani", "I want to go to Singapore"]);
        assert_eq!(slots.pair(), Some(("PAK", "SGP")));
        assert_eq!(slots.gap(), None);
    }

    #[test]
    fn follow_up_keeps_the_passport_country() {
        let slots = replay(&["I'm American, do I need a visa for India?", "and to Japan?"]);
        assert_eq!(slots.pair(), Some(("USA", "JPN")));

        let slots = replay(&["From India to Thailand?", "What about Japan?"]);
        assert_eq!(slots.pair(), Some(("IND", "JPN")));
    }

    #[test]
    fn missing_slot_is_reported() {
        assert_eq!(replay(&[]).gap(), Some(SlotGap::Both));
        assert_eq!(
            replay(&["Do I need a visa for France?"]).gap(),
            Some(SlotGap::Origin)
        );
        assert_eq!(replay(&["I'm Canadian"]).gap(), Some(SlotGap::Destination));
    }

    #[test]
    fn lone_place_fills_the_empty_slot() {
        let slots = replay(&["Do I need a visa for France?", "India"]);
        assert_eq!(slots.pair(), Some(("IND", "FRA")));
    }

    #[test]
    fn lone_place_with_no_context_asks_which_it_is() {
        let slots = replay(&["Dubai?"]);
        assert_eq!(slots.gap(), Some(SlotGap::Clarify("ARE")));

        let as_origin = replay(&["Dubai?", "that's my nationality"]);
        assert_eq!(as_origin.origin, Some("ARE"));
        assert_eq!(as_origin.gap(), Some(SlotGap::Destination));

        let as_destination = replay(&["Dubai?", "it's where I want to go"]);
        assert_eq!(as_destination.destination, Some("ARE"));
        assert_eq!(as_destination.pending, None);
    }

    #[test]
    fn tool_and_assistant_messages_are_ignored() {
        let messages = vec![
            Message::human("I'm Indian"),
            Message::assistant("Where are you headed? Japan is lovely."),
            Message::tool("visa_requirements_search", "Citizens of Japan ..."),
        ];
        assert_eq!(TravelSlots::from_history(&messages).destination, None);
    }

    #[test]
    fn search_text_names_the_trip() {
        let slots = replay(&["I'm American, do I need a visa for India?"]);
        assert_eq!(
            slots.search_text(" Do I need a visa? "),
            "Citizens of United States can travel to India. Do I need a visa?"
        );
        assert_eq!(TravelSlots::default().search_text("visa"), "visa");
    }
}
