//! Intent routing for a conversation turn.
//!
//! Routing is a pure table from [`Intent`] to [`Route`]:
//!
//! | Intent | Route |
//! |--------|-------|
//! | `visa` | [`Route::RetrieveAndRespond`] |
//! | `baggage` | [`Route::Respond`] |
//! | `general_travel` | [`Route::Respond`] |
//! | `off_topic` | [`Route::Redirect`] (canned reply, no LLM call) |
//!
//! A turn moves through [`Stage`]s; [`next_stage`] is the transition function
//! the orchestrator drives until [`Stage::Done`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classified purpose of a user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Visa,
    Baggage,
    GeneralTravel,
    OffTopic,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::Visa,
        Intent::Baggage,
        Intent::GeneralTravel,
        Intent::OffTopic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Visa => "visa",
            Intent::Baggage => "baggage",
            Intent::GeneralTravel => "general_travel",
            Intent::OffTopic => "off_topic",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    /// Case-insensitive; accepts `-` or space in place of `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Intent::ALL
            .into_iter()
            .find(|i| i.as_str() == norm)
            .ok_or_else(|| format!("unknown intent: {:?}", s))
    }
}

/// Handler selected for an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Route {
    /// Search the visa store, then generate with the facts as context.
    RetrieveAndRespond,
    /// Generate without retrieval.
    Respond,
    /// Reply with the fixed off-topic redirect.
    Redirect,
}

/// The routing table.
pub fn route(intent: Intent) -> Route {
    match intent {
        Intent::Visa => Route::RetrieveAndRespond,
        Intent::Baggage | Intent::GeneralTravel => Route::Respond,
        Intent::OffTopic => Route::Redirect,
    }
}

/// Step of a turn after the human message is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Retrieve,
    Generate,
    Redirect,
    Done,
}

/// Transition function for a turn with classified `intent`.
pub fn next_stage(current: Stage, intent: Intent) -> Stage {
    match (current, route(intent)) {
        (Stage::Classify, Route::RetrieveAndRespond) => Stage::Retrieve,
        (Stage::Classify, Route::Respond) => Stage::Generate,
        (Stage::Classify, Route::Redirect) => Stage::Redirect,
        (Stage::Retrieve, _) => Stage::Generate,
        (Stage::Generate, _) | (Stage::Redirect, _) | (Stage::Done, _) => Stage::Done,
    }
}

/// Every stage a turn with `intent` visits, from classification to done.
pub fn stages(intent: Intent) -> Vec<Stage> {
    let mut path = vec![Stage::Classify];
    let mut current = Stage::Classify;
    while current != Stage::Done {
        current = next_stage(current, intent);
        path.push(current);
    }
    path
}
