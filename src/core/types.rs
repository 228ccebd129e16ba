use serde::{Deserialize, Serialize};

use super::error::SessionError;

/// Number of user/character round pairs in one conversation.
pub const ROUNDS: usize = 4;

/// Pre-farewell messages a transcript needs before it can be persisted.
pub const MIN_EXCHANGED_MESSAGES: usize = ROUNDS * 2;

/// Column layout of the output file.
pub const RECORD_HEADER: [&str; 11] = [
    "Conversation_Number",
    "User_Message_1",
    "Character_Response_1",
    "User_Message_2",
    "Character_Response_2",
    "User_Message_3",
    "Character_Response_3",
    "User_Message_4",
    "Character_Response_4",
    "Farewell_Message",
    "Character_Farewell_Response",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Character,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn character(text: impl Into<String>) -> Self {
        Self {
            role: Role::Character,
            text: text.into(),
        }
    }
}

/// One conversation attempt: the alternating exchange followed by the farewell
/// and the (optional) reply to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub messages: Vec<Message>,
    pub farewell: Option<String>,
    pub farewell_reply: Option<String>,
    /// Display name of the character the session talked to, when the page exposed one.
    #[serde(default)]
    pub character: Option<String>,
}

impl Transcript {
    pub fn push_exchange(&mut self, user: impl Into<String>, character: impl Into<String>) {
        self.messages.push(Message::user(user));
        self.messages.push(Message::character(character));
    }

    /// Text of every message the scripted user sent, farewell included.
    pub fn human_messages(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.text.as_str())
            .chain(self.farewell.as_deref())
            .collect()
    }

    /// Checks the transcript is long enough, strictly alternating (user first)
    /// and closed by a farewell.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.messages.len() < MIN_EXCHANGED_MESSAGES {
            return Err(SessionError::ValidationFailed {
                reason: format!(
                    "{} pre-farewell messages, need {}",
                    self.messages.len(),
                    MIN_EXCHANGED_MESSAGES
                ),
            });
        }
        for (i, m) in self.messages.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Character };
            if m.role != expected {
                return Err(SessionError::ValidationFailed {
                    reason: format!("message {} has role {:?}, expected {:?}", i + 1, m.role, expected),
                });
            }
        }
        if self.farewell.as_deref().is_none_or(|f| f.trim().is_empty()) {
            return Err(SessionError::ValidationFailed {
                reason: "missing farewell message".to_string(),
            });
        }
        Ok(())
    }
}

/// A persisted row: `[index, user_1, char_1, ..., user_4, char_4, farewell, farewell_reply]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub index: usize,
    pub exchanges: Vec<String>,
    pub farewell: String,
    pub farewell_reply: String,
}

impl OutputRecord {
    /// Flattens a validated transcript. Only the first [`ROUNDS`] pairs fit the layout.
    pub fn from_transcript(index: usize, transcript: &Transcript) -> Result<Self, SessionError> {
        transcript.validate()?;
        Ok(Self {
            index,
            exchanges: transcript
                .messages
                .iter()
                .take(MIN_EXCHANGED_MESSAGES)
                .map(|m| m.text.clone())
                .collect(),
            farewell: transcript.farewell.clone().unwrap_or_default(),
            farewell_reply: transcript.farewell_reply.clone().unwrap_or_default(),
        })
    }

    pub fn to_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(RECORD_HEADER.len());
        row.push(self.index.to_string());
        row.extend(self.exchanges.iter().cloned());
        row.push(self.farewell.clone());
        row.push(self.farewell_reply.clone());
        row
    }
}

/// Browser identity owned by exactly one pool worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    /// Chromium user-data dir holding this identity's logged-in session.
    #[serde(default)]
    pub profile_dir: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub starting_cursor: usize,
    pub final_cursor: usize,
    pub attempts: usize,
    pub written: usize,
    pub aborted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub expected: usize,
    pub written: usize,
    pub failed_slots: Vec<String>,
    pub timed_out: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(pairs: usize) -> Transcript {
        let mut t = Transcript::default();
        for i in 0..pairs {
            t.push_exchange(format!("u{}", i + 1), format!("c{}", i + 1));
        }
        t.farewell = Some("I'm going offline now.".into());
        t.farewell_reply = Some("See you!".into());
        t
    }

    #[test]
    fn record_has_eleven_columns() {
        let record = OutputRecord::from_transcript(3, &transcript(4)).unwrap();
        let row = record.to_row();
        assert_eq!(row.len(), RECORD_HEADER.len());
        assert_eq!(row[0], "3");
        assert_eq!(row[1], "u1");
        assert_eq!(row[8], "c4");
        assert_eq!(row[9], "I'm going offline now.");
        assert_eq!(row[10], "See you!");
    }

    #[test]
    fn short_transcript_is_rejected() {
        let err = OutputRecord::from_transcript(1, &transcript(3)).unwrap_err();
        assert!(matches!(err, SessionError::ValidationFailed { .. }));
    }

    #[test]
    fn missing_farewell_reply_is_an_empty_cell() {
        let mut t = transcript(4);
        t.farewell_reply = None;
        let row = OutputRecord::from_transcript(1, &t).unwrap().to_row();
        assert_eq!(row[10], "");
    }

    #[test]
    fn missing_farewell_is_rejected() {
        let mut t = transcript(4);
        t.farewell = None;
        assert!(t.validate().is_err());
    }

    #[test]
    fn out_of_order_roles_are_rejected() {
        let mut t = transcript(4);
        t.messages.swap(0, 1);
        assert!(t.validate().is_err());
    }

    #[test]
    fn human_messages_include_farewell() {
        let t = transcript(4);
        let human = t.human_messages();
        assert_eq!(human.len(), 5);
        assert_eq!(human[4], "I'm going offline now.");
    }
}
