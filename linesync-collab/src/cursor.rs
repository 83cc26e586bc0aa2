//! Per-client cursor table and cursor rebase rules.
//!
//! Every structural edit is described once here, as a rebase over all
//! cursors other than the acting one. The engine positions the acting
//! client's cursor itself.

use std::collections::HashMap;

use crate::document::{Document, Position};
use crate::protocol::ClientId;

/// Mapping from client identity to caret position.
#[derive(Debug, Default, Clone)]
pub struct CursorTable {
    cursors: HashMap<ClientId, Position>,
}

impl CursorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client at the document origin. Re-registering keeps the
    /// existing position.
    pub fn insert(&mut self, client: ClientId) -> Position {
        *self.cursors.entry(client).or_insert_with(Position::origin)
    }

    pub fn remove(&mut self, client: &ClientId) -> Option<Position> {
        self.cursors.remove(client)
    }

    pub fn get(&self, client: &ClientId) -> Option<Position> {
        self.cursors.get(client).copied()
    }

    pub fn contains(&self, client: &ClientId) -> bool {
        self.cursors.contains_key(client)
    }

    /// Set a known client's cursor. Unknown clients are ignored.
    pub fn set(&mut self, client: &ClientId, pos: Position) {
        if let Some(slot) = self.cursors.get_mut(client) {
            *slot = pos;
        }
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClientId, &Position)> {
        self.cursors.iter()
    }

    /// Whether every cursor addresses a valid position in `doc`.
    pub fn all_within(&self, doc: &Document) -> bool {
        self.cursors.values().all(|pos| doc.contains(*pos))
    }

    fn others_mut<'a>(
        &'a mut self,
        actor: &'a ClientId,
    ) -> impl Iterator<Item = &'a mut Position> + 'a {
        self.cursors
            .iter_mut()
            .filter(move |(id, _)| *id != actor)
            .map(|(_, pos)| pos)
    }

    /// A char was inserted at `at`.
    pub fn rebase_insert(&mut self, actor: &ClientId, at: Position) {
        for pos in self.others_mut(actor) {
            if pos.line == at.line && pos.column >= at.column {
                pos.column += 1;
            }
        }
    }

    /// Line `at.line` was split at `at.column`.
    pub fn rebase_split(&mut self, actor: &ClientId, at: Position) {
        for pos in self.others_mut(actor) {
            if pos.line > at.line {
                pos.line += 1;
            } else if pos.line == at.line && pos.column >= at.column {
                pos.line += 1;
                pos.column -= at.column;
            }
        }
    }

    /// The char at `at` (the one before the actor's caret) was removed.
    pub fn rebase_remove(&mut self, actor: &ClientId, at: Position) {
        for pos in self.others_mut(actor) {
            if pos.line == at.line && pos.column > at.column {
                pos.column -= 1;
            }
        }
    }

    /// Line `line` was appended to the line above, whose visible length was
    /// `joint` before the merge.
    pub fn rebase_merge(&mut self, actor: &ClientId, line: usize, joint: usize) {
        for pos in self.others_mut(actor) {
            if pos.line == line {
                pos.line -= 1;
                pos.column += joint;
            } else if pos.line > line {
                pos.line -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(positions: &[(usize, usize)]) -> (CursorTable, Vec<ClientId>) {
        let mut t = CursorTable::new();
        let ids: Vec<ClientId> = positions.iter().map(|_| ClientId::new()).collect();
        for (id, (line, column)) in ids.iter().zip(positions) {
            t.insert(*id);
            t.set(id, Position::new(*line, *column));
        }
        (t, ids)
    }

    #[test]
    fn test_insert_registers_at_origin() {
        let mut t = CursorTable::new();
        let id = ClientId::new();
        assert_eq!(t.insert(id), Position::origin());
        t.set(&id, Position::new(2, 3));
        assert_eq!(t.insert(id), Position::new(2, 3));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_set_unknown_is_ignored() {
        let mut t = CursorTable::new();
        t.set(&ClientId::new(), Position::new(4, 4));
        assert!(t.is_empty());
    }

    #[test]
    fn test_rebase_insert() {
        let (mut t, ids) = table(&[(1, 3), (1, 5), (1, 2), (2, 7)]);
        t.rebase_insert(&ids[0], Position::new(1, 3));
        assert_eq!(t.get(&ids[0]), Some(Position::new(1, 3)));
        assert_eq!(t.get(&ids[1]), Some(Position::new(1, 6)));
        assert_eq!(t.get(&ids[2]), Some(Position::new(1, 2)));
        assert_eq!(t.get(&ids[3]), Some(Position::new(2, 7)));
    }

    #[test]
    fn test_rebase_insert_same_column_shifts() {
        let (mut t, ids) = table(&[(1, 3), (1, 3)]);
        t.rebase_insert(&ids[0], Position::new(1, 3));
        assert_eq!(t.get(&ids[1]), Some(Position::new(1, 4)));
    }

    #[test]
    fn test_rebase_split() {
        let (mut t, ids) = table(&[(1, 5), (1, 8), (1, 3), (2, 3)]);
        t.rebase_split(&ids[0], Position::new(1, 5));
        assert_eq!(t.get(&ids[1]), Some(Position::new(2, 3)));
        assert_eq!(t.get(&ids[2]), Some(Position::new(1, 3)));
        assert_eq!(t.get(&ids[3]), Some(Position::new(3, 3)));
    }

    #[test]
    fn test_rebase_remove() {
        let (mut t, ids) = table(&[(1, 5), (1, 4), (1, 7), (1, 2)]);
        t.rebase_remove(&ids[0], Position::new(1, 4));
        assert_eq!(t.get(&ids[1]), Some(Position::new(1, 4)));
        assert_eq!(t.get(&ids[2]), Some(Position::new(1, 6)));
        assert_eq!(t.get(&ids[3]), Some(Position::new(1, 2)));
    }

    #[test]
    fn test_rebase_merge() {
        let (mut t, ids) = table(&[(2, 0), (2, 3), (3, 5), (1, 2)]);
        t.rebase_merge(&ids[0], 2, 5);
        assert_eq!(t.get(&ids[1]), Some(Position::new(1, 8)));
        assert_eq!(t.get(&ids[2]), Some(Position::new(2, 5)));
        assert_eq!(t.get(&ids[3]), Some(Position::new(1, 2)));
    }
}
