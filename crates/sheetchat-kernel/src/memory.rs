use std::collections::{HashMap, VecDeque};

use sheetchat_contracts::ConversationTurn;

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    max_turns: usize,
    sessions: HashMap<String, VecDeque<ConversationTurn>>,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns: max_turns.max(1),
            sessions: HashMap::new(),
        }
    }

    pub fn history(&self, session_id: &str) -> Vec<ConversationTurn> {
        self.sessions
            .get(session_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record(&mut self, session_id: &str, turn: ConversationTurn) {
        let turns = self.sessions.entry(session_id.to_string()).or_default();
        turns.push_back(turn);
        while turns.len() > self.max_turns {
            turns.pop_front();
        }
    }
}
