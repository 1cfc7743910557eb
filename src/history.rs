use serde::{Deserialize, Serialize};

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System    => "system",
            Role::User      => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One role-tagged message. Portable across providers: adapters re-serialize
/// turns into their native shape on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role:    Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self { Self::new(Role::System, content) }
    pub fn user(content: impl Into<String>) -> Self { Self::new(Role::User, content) }
    pub fn assistant(content: impl Into<String>) -> Self { Self::new(Role::Assistant, content) }
}

/// Ordered turn log of one agent.
///
/// After an optional leading system turn, turns come in user/assistant
/// pairs. The only mutator is [`History::push_exchange`], which appends a
/// whole pair, so an unanswered user turn can never be left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Rebuilds a history from stored turns, checking the alternation invariant.
    pub fn from_turns(turns: Vec<Turn>) -> Result<Self, AgentError> {
        let body = match turns.first() {
            Some(t) if t.role == Role::System => &turns[1..],
            _ => &turns[..],
        };

        if body.len() % 2 != 0 {
            return Err(AgentError::Configuration(format!(
                "History has {} turns after the system turn; expected user/assistant pairs",
                body.len()
            )));
        }

        for (i, pair) in body.chunks(2).enumerate() {
            if pair[0].role != Role::User || pair[1].role != Role::Assistant {
                return Err(AgentError::Configuration(format!(
                    "History pair {} is {}/{}, expected user/assistant",
                    i, pair[0].role, pair[1].role
                )));
            }
        }

        Ok(Self { turns })
    }

    /// Drops the leading system turn, if there is one.
    pub fn without_system(mut self) -> Self {
        if self.turns.first().is_some_and(|t| t.role == Role::System) {
            self.turns.remove(0);
        }
        self
    }

    /// Appends one completed exchange.
    pub fn push_exchange(&mut self, input: impl Into<String>, reply: impl Into<String>) {
        self.turns.push(Turn::user(input));
        self.turns.push(Turn::assistant(reply));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of completed user/assistant exchanges.
    pub fn exchanges(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::Assistant).count()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
