use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One message in the session transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only transcript for one interactive session. Turns are never
/// mutated, deleted, or compacted; the log dies with the session.
#[derive(Debug)]
pub struct Conversation {
    session_id: Uuid,
    turns: Vec<Turn>,
}

impl Conversation {
    #[inline]
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            turns: Vec::new(),
        }
    }

    #[inline]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[inline]
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    #[inline]
    pub fn all(&self) -> &[Turn] {
        &self.turns
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl Default for Conversation {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
