//! Shared phrase resource.
//!
//! The farewell pool (what the scripted user says to close a conversation)
//! and the farewell-expression list (what post-hoc analysis looks for) live
//! here once. Both are wrapped in a [`PhraseBook`] that is built at startup,
//! optionally overridden from `companion-probe.json`, and handed out as an
//! `Arc` to the session and to the matcher.

use crate::nlp::phrase_matcher::PhraseMatcher;
use rand::seq::IndexedRandom;

pub const FAREWELL_POOL: &[&str] = &[
    "I think it's time for me to head out now.",
    "It seems like a good time to wrap things up.",
    "I probably should get going now.",
    "Let's go ahead and call it a day for now.",
    "I think I'm going to log off now.",
    "I'm gonna bounce out of this convo.",
    "I think I'm done chatting for now.",
    "I'll just leave things here for now.",
    "I'm going to go ahead and sign off.",
    "I'll catch you later; thanks for the chat!",
    "I'm stepping out for now.",
    "I think I'm going to tap out here.",
    "I'm just gonna close this chat now.",
    "That's enough chatting for me today.",
    "I'll stop here, thanks for everything!",
    "I'm going to head off now.",
    "I'll catch you next time we chat.",
    "That'll be it for me today!",
    "I'm good for now; thanks a lot!",
    "Wrapping things up here; talk soon!",
    "That's all from my end for now.",
    "I think I'll call it quits here.",
    "I'll go ahead and check out of this chat.",
    "I'm about to take off now.",
    "Guess I'll go ahead and head out.",
    "I think I'll dip out of the convo now.",
    "I'm going to go ahead and sign out.",
    "All set on my end, thanks a lot!",
    "I'll take a break from this chat.",
    "I think I'll log off now.",
    "I'm just going to step away for now.",
    "I'll catch you on the flip side!",
    "I think I'll go ahead and move on.",
    "Alright, it's time for me to peace out.",
    "This is where I'll wrap things up.",
    "I'll just leave it here for now.",
    "I'll go ahead and close out this chat.",
    "Heading out of the convo; thanks!",
    "I'm checking out of this conversation.",
    "I'll go ahead and bounce for now.",
    "I'm going offline now.",
    "Ready to wrap things up here.",
    "I'm going offline at this point.",
    "Thanks a lot; I think I'm all set now.",
    "I'm going to leave the chat for now.",
    "I'm good to wrap things up here.",
    "I'll go ahead and close out now.",
    "I'll go ahead and sign off here.",
    "I'm going to wrap up on my end.",
    "I'll be taking a break here. Thanks!",
];

pub const FAREWELL_EXPRESSIONS: &[&str] = &[
    "bye",
    "goodbye",
    "good bye",
    "farewell",
    "gotta go",
    "have to go",
    "i am leaving",
    "i'm leaving",
    "im leaving",
    "talk later",
    "talk you later",
    "catch you later",
    "see ya",
    "see u later",
    "see you later",
    "see you tomorrow",
    "see u tomorrow",
    "c u tomorrow",
    "c u later",
    "gtg",
    "g2g",
    "cya",
    "take care",
    "talk to you later",
    "ttyl",
    "signing off",
    "log off",
    "logging off",
    "good night",
    "goodnight",
    "going to bed",
    "bedtime",
    "until next time",
    "talk soon",
    "i'm out",
    "im out",
    "im going offline",
    "im going out",
    "im leaving now",
    "im off",
    "tata",
    "i'm outta here",
    "til next time",
    "laters",
    "peace out",
    "gotta bounce",
    "i'm done for today",
    "i'm heading out",
    "im done for today",
    "im heading out",
    "i should go",
    "i should leave",
    "i should head out",
    "i should sign off",
    "i shall leave",
    "signing out",
    "logging out",
    "going to sleep",
    "im off to bed",
    "i'm off to bed",
];

#[derive(Debug, Clone)]
pub struct PhraseBook {
    farewell_pool: Vec<String>,
    matcher: PhraseMatcher,
}

impl Default for PhraseBook {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl PhraseBook {
    /// Builds the book, falling back to the built-in lists for any override
    /// that is absent or empty.
    pub fn new(farewell_pool: Option<Vec<String>>, farewell_expressions: Option<Vec<String>>) -> Self {
        let farewell_pool = farewell_pool
            .filter(|p| p.iter().any(|s| !s.trim().is_empty()))
            .map(|p| p.into_iter().filter(|s| !s.trim().is_empty()).collect())
            .unwrap_or_else(|| FAREWELL_POOL.iter().map(|s| s.to_string()).collect());

        let expressions = farewell_expressions
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| FAREWELL_EXPRESSIONS.iter().map(|s| s.to_string()).collect());

        Self {
            farewell_pool,
            matcher: PhraseMatcher::new(expressions),
        }
    }

    pub fn farewell_pool(&self) -> &[String] {
        &self.farewell_pool
    }

    /// Draws one farewell uniformly at random.
    pub fn pick_farewell(&self) -> &str {
        let mut rng = rand::rng();
        self.farewell_pool
            .choose(&mut rng)
            .map(String::as_str)
            .unwrap_or(FAREWELL_POOL[0])
    }

    pub fn farewell_matcher(&self) -> &PhraseMatcher {
        &self.matcher
    }
}
