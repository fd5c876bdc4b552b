use std::collections::VecDeque;

use crate::registry::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Text,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingEntry {
    pub connection: ConnectionId,
    pub name: String,
    pub kind: QueueKind,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(WaitingEntry),
    Queued,
}

/// Two strict FIFO waiting lists, one per chat kind.
///
/// Callers hold exclusive access for the whole of `request_match`, so the
/// pop-or-append step cannot hand one waiter to two arrivals.
#[derive(Default)]
pub struct Matchmaker {
    text_waiting: VecDeque<WaitingEntry>,
    video_waiting: VecDeque<WaitingEntry>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut VecDeque<WaitingEntry> {
        match kind {
            QueueKind::Text => &mut self.text_waiting,
            QueueKind::Video => &mut self.video_waiting,
        }
    }

    fn queue(&self, kind: QueueKind) -> &VecDeque<WaitingEntry> {
        match kind {
            QueueKind::Text => &self.text_waiting,
            QueueKind::Video => &self.video_waiting,
        }
    }

    pub fn request_match(
        &mut self,
        kind: QueueKind,
        connection: ConnectionId,
        name: &str,
    ) -> MatchOutcome {
        // A stale entry for the caller must never be popped as its own partner.
        self.remove_if_waiting(connection);

        let queue = self.queue_mut(kind);
        match queue.pop_front() {
            Some(partner) => MatchOutcome::Matched(partner),
            None => {
                queue.push_back(WaitingEntry {
                    connection,
                    name: name.to_string(),
                    kind,
                });
                MatchOutcome::Queued
            }
        }
    }

    /// Drops any entry for `connection` from both queues. Returns whether one was found.
    pub fn remove_if_waiting(&mut self, connection: ConnectionId) -> bool {
        let before = self.text_waiting.len() + self.video_waiting.len();
        self.text_waiting.retain(|entry| entry.connection != connection);
        self.video_waiting.retain(|entry| entry.connection != connection);
        before != self.text_waiting.len() + self.video_waiting.len()
    }

    pub fn waiting_kind(&self, connection: ConnectionId) -> Option<QueueKind> {
        [QueueKind::Text, QueueKind::Video]
            .into_iter()
            .find(|kind| self.queue(*kind).iter().any(|entry| entry.connection == connection))
    }

    pub fn waiting(&self, kind: QueueKind) -> usize {
        self.queue(kind).len()
    }
}
