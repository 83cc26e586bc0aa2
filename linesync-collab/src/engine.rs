//! The document engine: single consumer of the operation queue.
//!
//! ```text
//! Receiver A ──┐
//! Receiver B ──┼──► OperationQueue ──► DocumentEngine ──► ClientRegistry
//! Receiver C ──┘      (FIFO)            │   (one task)       │
//!                                       │                    ├─► outbox A
//!                                       ├── Document         ├─► outbox B
//!                                       └── CursorTable      └─► outbox C
//! ```
//!
//! The engine owns the document, the cursor table and the client registry
//! outright; nothing else holds a reference to them. Commands are applied one
//! at a time in dequeue order, so no locking is needed.
//!
//! Address policy, applied to every operation before dispatch: operations
//! from a client with no cursor are discarded, every other address is
//! clamped to the nearest valid position in the current document.

use std::collections::HashMap;

use crate::broadcast::{BroadcastStats, ClientRegistry, Outbox};
use crate::cursor::CursorTable;
use crate::document::{Document, Position};
use crate::protocol::{encode_ack, encode_welcome, ClientId, Direction, Edit, Operation};
use crate::queue::{Command, QueueReceiver};

/// What applying one operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Document content changed and the version was bumped.
    Mutated { version: u64 },
    /// Only the acting client's cursor may have moved.
    CursorOnly,
    /// The operation was valid but had no effect (backspace at the origin).
    Unchanged,
    /// The operation was dropped without touching any state.
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    UnknownClient,
}

/// Point-in-time copy of the engine's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub version: u64,
    pub lines: Vec<String>,
    pub cursors: HashMap<ClientId, Position>,
    pub broadcast: BroadcastStats,
}

/// Sole owner and mutator of the shared document.
#[derive(Debug, Default)]
pub struct DocumentEngine {
    doc: Document,
    cursors: CursorTable,
    registry: ClientRegistry,
}

impl DocumentEngine {
    pub fn new(doc: Document) -> Self {
        Self {
            doc,
            cursors: CursorTable::new(),
            registry: ClientRegistry::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn cursors(&self) -> &CursorTable {
        &self.cursors
    }

    pub fn cursor(&self, client: &ClientId) -> Option<Position> {
        self.cursors.get(client)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: self.doc.version(),
            lines: self.doc.lines().to_vec(),
            cursors: self.cursors.iter().map(|(id, pos)| (*id, *pos)).collect(),
            broadcast: self.registry.stats(),
        }
    }

    /// Register a client at the origin and greet it with its id and the
    /// current state.
    pub fn join(&mut self, client: ClientId, outbox: Outbox) {
        let cursor = self.cursors.insert(client);
        self.registry.register(client, outbox);
        self.registry.send_to(&client, encode_welcome(client).into());
        self.registry.publish_to(&client, &self.doc, cursor);
        log::info!("Client {client} joined ({} connected)", self.registry.len());
    }

    /// Forget a client's cursor and outbox.
    pub fn leave(&mut self, client: &ClientId) {
        self.cursors.remove(client);
        if self.registry.remove(client) {
            log::info!("Client {client} left ({} connected)", self.registry.len());
        }
    }

    /// Add a cursor for `client` without an outbox. Its operations are
    /// applied but nothing is sent to it.
    pub fn add_silent_client(&mut self, client: ClientId) -> Position {
        self.cursors.insert(client)
    }

    /// Apply one operation and publish the result.
    ///
    /// If the operation carries a `seq`, the actor's reply is followed by an
    /// `ACK:` for it in the same outbox.
    pub fn process(&mut self, op: &Operation) -> Outcome {
        let outcome = self.apply(op);
        match outcome {
            Outcome::Mutated { .. } => {
                self.registry.publish(&self.doc, &self.cursors);
            }
            Outcome::CursorOnly | Outcome::Unchanged => {
                if let Some(cursor) = self.cursors.get(&op.client) {
                    self.registry.publish_to(&op.client, &self.doc, cursor);
                }
            }
            Outcome::Discarded(reason) => {
                log::warn!("Discarded {:?} from {}: {reason:?}", op.edit, op.client);
                return outcome;
            }
        }
        if let Some(seq) = op.seq {
            self.registry.send_to(&op.client, encode_ack(seq).into());
        }
        outcome
    }

    /// Apply one operation to the document and cursor table only.
    pub fn apply(&mut self, op: &Operation) -> Outcome {
        if !self.cursors.contains(&op.client) {
            return Outcome::Discarded(DiscardReason::UnknownClient);
        }
        if op.version < self.doc.version() {
            log::debug!(
                "Applying {:?} from {} against v{} (client saw v{})",
                op.edit,
                op.client,
                self.doc.version(),
                op.version
            );
        }

        let at = self.doc.clamp(op.line, op.column);
        let actor = &op.client;

        match op.edit {
            Edit::InsertChar(c) => self.insert_char(actor, at, c),
            Edit::InsertSpace => self.insert_char(actor, at, ' '),
            Edit::InsertReturn => self.insert_return(actor, at),
            Edit::Backspace => self.backspace(actor, at),
            Edit::CursorMove(dir) => self.move_cursor(actor, at, dir),
        }
    }

    fn insert_char(&mut self, actor: &ClientId, at: Position, c: char) -> Outcome {
        self.doc.insert_char(at, c);
        self.cursors.rebase_insert(actor, at);
        self.cursors.set(actor, Position::new(at.line, at.column + 1));
        self.mutated()
    }

    fn insert_return(&mut self, actor: &ClientId, at: Position) -> Outcome {
        self.doc.split_line(at);
        self.cursors.rebase_split(actor, at);
        self.cursors.set(actor, Position::new(at.line + 1, 0));
        self.mutated()
    }

    fn backspace(&mut self, actor: &ClientId, at: Position) -> Outcome {
        if at.column > 0 {
            let removed = Position::new(at.line, at.column - 1);
            self.doc.remove_char(removed);
            self.cursors.rebase_remove(actor, removed);
            self.cursors.set(actor, removed);
            return self.mutated();
        }
        if at.line == 1 {
            self.cursors.set(actor, at);
            return Outcome::Unchanged;
        }
        let joint = self.doc.merge_with_previous(at.line);
        self.cursors.rebase_merge(actor, at.line, joint);
        self.cursors.set(actor, Position::new(at.line - 1, joint));
        self.mutated()
    }

    fn move_cursor(&mut self, actor: &ClientId, at: Position, dir: Direction) -> Outcome {
        let target = match dir {
            Direction::Left => Position::new(at.line, at.column.saturating_sub(1)),
            Direction::Right => {
                Position::new(at.line, (at.column + 1).min(self.doc.line_len(at.line)))
            }
            Direction::Up if at.line > 1 => self.vertical(at.line - 1, at.column),
            Direction::Down if at.line < self.doc.line_count() => {
                self.vertical(at.line + 1, at.column)
            }
            Direction::Up | Direction::Down => at,
        };
        self.cursors.set(actor, target);
        Outcome::CursorOnly
    }

    fn vertical(&self, line: usize, column: usize) -> Position {
        Position::new(line, column.min(self.doc.line_len(line)))
    }

    fn mutated(&mut self) -> Outcome {
        Outcome::Mutated {
            version: self.doc.bump_version(),
        }
    }

    /// Consume commands until shutdown or until every producer is gone.
    ///
    /// Returns the final state.
    pub async fn run(mut self, mut queue: QueueReceiver) -> Snapshot {
        log::info!("Document engine started at v{}", self.doc.version());
        while let Some(command) = queue.recv().await {
            match command {
                Command::Join { client, outbox } => self.join(client, outbox),
                Command::Apply(op) => {
                    let outcome = self.process(&op);
                    log::debug!("{:?} from {} -> {outcome:?}", op.edit, op.client);
                }
                Command::Leave(client) => self.leave(&client),
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                Command::Shutdown(reply) => {
                    let snapshot = self.snapshot();
                    log::info!("Document engine stopping at v{}", snapshot.version);
                    let _ = reply.send(snapshot.clone());
                    return snapshot;
                }
            }
        }
        log::info!("Operation queue closed, document engine stopping");
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::outbox;
    use crate::protocol::{ServerMessage, END_OF_MESSAGE};
    use crate::queue::operation_queue;
    use proptest::prelude::*;

    fn engine(lines: &[&str]) -> DocumentEngine {
        DocumentEngine::new(Document::from_lines(
            lines.iter().map(|l| l.to_string()).collect(),
        ))
    }

    fn client_at(engine: &mut DocumentEngine, line: usize, column: usize) -> ClientId {
        let id = ClientId::new();
        engine.add_silent_client(id);
        engine.cursors.set(&id, Position::new(line, column));
        id
    }

    fn op(client: ClientId, edit: Edit, line: usize, column: usize) -> Operation {
        Operation::new(client, edit, Position::new(line, column), 0)
    }

    #[test]
    fn test_insert_char_at_start() {
        let mut e = engine(&["hello"]);
        let a = client_at(&mut e, 1, 0);

        let outcome = e.apply(&op(a, Edit::InsertChar('X'), 1, 0));

        assert_eq!(outcome, Outcome::Mutated { version: 1 });
        assert_eq!(e.document().lines(), &["Xhello"]);
        assert_eq!(e.cursor(&a), Some(Position::new(1, 1)));
    }

    #[test]
    fn test_insert_char_shifts_others_on_line() {
        let mut e = engine(&["hello world", "second"]);
        let a = client_at(&mut e, 1, 3);
        let after = client_at(&mut e, 1, 5);
        let before = client_at(&mut e, 1, 2);
        let below = client_at(&mut e, 2, 3);

        e.apply(&op(a, Edit::InsertChar('X'), 1, 3));

        assert_eq!(e.document().lines()[0], "helXlo world");
        assert_eq!(e.cursor(&a), Some(Position::new(1, 4)));
        assert_eq!(e.cursor(&after), Some(Position::new(1, 6)));
        assert_eq!(e.cursor(&before), Some(Position::new(1, 2)));
        assert_eq!(e.cursor(&below), Some(Position::new(2, 3)));
    }

    #[test]
    fn test_space_inserts_blank() {
        let mut e = engine(&["hello"]);
        let a = client_at(&mut e, 1, 5);
        e.apply(&op(a, Edit::InsertSpace, 1, 5));
        assert_eq!(e.document().lines(), &["hello "]);
        assert_eq!(e.cursor(&a), Some(Position::new(1, 6)));
    }

    #[test]
    fn test_return_splits_and_rebases() {
        let mut e = engine(&["hello world"]);
        let a = client_at(&mut e, 1, 5);
        let b = client_at(&mut e, 1, 8);

        e.apply(&op(a, Edit::InsertReturn, 1, 5));

        assert_eq!(e.document().lines(), &["hello\n", " world"]);
        assert_eq!(e.cursor(&a), Some(Position::new(2, 0)));
        assert_eq!(e.cursor(&b), Some(Position::new(2, 3)));
    }

    #[test]
    fn test_return_moves_lines_below_down() {
        let mut e = engine(&["hello world\n", "line two"]);
        let a = client_at(&mut e, 1, 5);
        let below = client_at(&mut e, 2, 3);
        let before = client_at(&mut e, 1, 3);

        e.apply(&op(a, Edit::InsertReturn, 1, 5));

        assert_eq!(e.document().lines(), &["hello\n", " world\n", "line two"]);
        assert_eq!(e.cursor(&below), Some(Position::new(3, 3)));
        assert_eq!(e.cursor(&before), Some(Position::new(1, 3)));
    }

    #[test]
    fn test_return_at_end_of_line() {
        let mut e = engine(&["hello"]);
        let a = client_at(&mut e, 1, 5);
        e.apply(&op(a, Edit::InsertReturn, 1, 5));
        assert_eq!(e.document().lines(), &["hello\n", ""]);
        assert_eq!(e.cursor(&a), Some(Position::new(2, 0)));
    }

    #[test]
    fn test_backspace_removes_previous_char() {
        let mut e = engine(&["hello"]);
        let a = client_at(&mut e, 1, 5);
        let b = client_at(&mut e, 1, 5);
        let c = client_at(&mut e, 1, 2);

        let outcome = e.apply(&op(a, Edit::Backspace, 1, 5));

        assert_eq!(outcome, Outcome::Mutated { version: 1 });
        assert_eq!(e.document().lines(), &["hell"]);
        assert_eq!(e.cursor(&a), Some(Position::new(1, 4)));
        assert_eq!(e.cursor(&b), Some(Position::new(1, 4)));
        assert_eq!(e.cursor(&c), Some(Position::new(1, 2)));
    }

    #[test]
    fn test_backspace_merges_lines() {
        let mut e = engine(&["hello\n", "world"]);
        let a = client_at(&mut e, 2, 0);

        e.apply(&op(a, Edit::Backspace, 2, 0));

        assert_eq!(e.document().lines(), &["helloworld"]);
        assert_eq!(e.cursor(&a), Some(Position::new(1, 5)));
    }

    #[test]
    fn test_backspace_merge_rebases_others() {
        let mut e = engine(&["hello\n", "world\n", "line three"]);
        let a = client_at(&mut e, 2, 0);
        let same = client_at(&mut e, 2, 3);
        let below = client_at(&mut e, 3, 5);
        let above = client_at(&mut e, 1, 2);

        e.apply(&op(a, Edit::Backspace, 2, 0));

        assert_eq!(e.document().lines(), &["helloworld\n", "line three"]);
        assert_eq!(e.cursor(&a), Some(Position::new(1, 5)));
        // old length of "hello\n" (6) + 3 - 1
        assert_eq!(e.cursor(&same), Some(Position::new(1, 8)));
        assert_eq!(e.cursor(&below), Some(Position::new(2, 5)));
        assert_eq!(e.cursor(&above), Some(Position::new(1, 2)));
    }

    #[test]
    fn test_backspace_at_origin_is_noop() {
        let mut e = engine(&["hello"]);
        let a = client_at(&mut e, 1, 0);

        assert_eq!(e.apply(&op(a, Edit::Backspace, 1, 0)), Outcome::Unchanged);
        assert_eq!(e.document().lines(), &["hello"]);
        assert_eq!(e.document().version(), 0);
    }

    #[test]
    fn test_cursor_moves() {
        let mut e = engine(&["hello\n", "world"]);
        let a = client_at(&mut e, 1, 0);

        assert_eq!(e.apply(&op(a, Edit::CursorMove(Direction::Right), 1, 3)), Outcome::CursorOnly);
        assert_eq!(e.cursor(&a), Some(Position::new(1, 4)));

        e.apply(&op(a, Edit::CursorMove(Direction::Left), 1, 5));
        assert_eq!(e.cursor(&a), Some(Position::new(1, 4)));

        e.apply(&op(a, Edit::CursorMove(Direction::Down), 1, 3));
        assert_eq!(e.cursor(&a), Some(Position::new(2, 3)));

        e.apply(&op(a, Edit::CursorMove(Direction::Up), 2, 3));
        assert_eq!(e.cursor(&a), Some(Position::new(1, 3)));

        assert_eq!(e.document().version(), 0);
    }

    #[test]
    fn test_cursor_boundaries_are_noops() {
        let mut e = engine(&["hello\n", "world"]);
        let a = client_at(&mut e, 1, 0);

        e.apply(&op(a, Edit::CursorMove(Direction::Left), 1, 0));
        assert_eq!(e.cursor(&a), Some(Position::new(1, 0)));

        e.apply(&op(a, Edit::CursorMove(Direction::Right), 1, 5));
        assert_eq!(e.cursor(&a), Some(Position::new(1, 5)));

        e.apply(&op(a, Edit::CursorMove(Direction::Up), 1, 3));
        assert_eq!(e.cursor(&a), Some(Position::new(1, 3)));

        e.apply(&op(a, Edit::CursorMove(Direction::Down), 2, 3));
        assert_eq!(e.cursor(&a), Some(Position::new(2, 3)));
    }

    #[test]
    fn test_vertical_move_clamps_column() {
        let mut e = engine(&["a long line\n", "ab"]);
        let a = client_at(&mut e, 1, 0);
        e.apply(&op(a, Edit::CursorMove(Direction::Down), 1, 9));
        assert_eq!(e.cursor(&a), Some(Position::new(2, 2)));
    }

    #[test]
    fn test_out_of_bounds_address_is_clamped() {
        let mut e = engine(&["abc"]);
        let a = client_at(&mut e, 1, 0);

        e.apply(&Operation {
            client: a,
            edit: Edit::InsertChar('!'),
            line: 7,
            column: 99,
            version: 0,
            seq: None,
        });

        assert_eq!(e.document().lines(), &["abc!"]);
        assert_eq!(e.cursor(&a), Some(Position::new(1, 4)));
    }

    #[test]
    fn test_unknown_client_is_discarded() {
        let mut e = engine(&["abc"]);
        let stranger = ClientId::new();

        let outcome = e.apply(&op(stranger, Edit::InsertChar('x'), 1, 0));

        assert_eq!(outcome, Outcome::Discarded(DiscardReason::UnknownClient));
        assert_eq!(e.document().lines(), &["abc"]);
        assert_eq!(e.document().version(), 0);
    }

    #[test]
    fn test_typing_sequence() {
        let mut e = engine(&[""]);
        let a = client_at(&mut e, 1, 0);

        for (i, c) in "hello".chars().enumerate() {
            e.apply(&op(a, Edit::InsertChar(c), 1, i));
        }
        e.apply(&op(a, Edit::InsertSpace, 1, 5));
        for (i, c) in "world".chars().enumerate() {
            e.apply(&op(a, Edit::InsertChar(c), 1, 6 + i));
        }

        assert_eq!(e.document().lines(), &["hello world"]);
        assert_eq!(e.document().version(), 11);
        assert_eq!(e.cursor(&a), Some(Position::new(1, 11)));
    }

    #[test]
    fn test_process_publishes_to_everyone_on_mutation() {
        let mut e = engine(&["hello"]);
        let a = ClientId::new();
        let b = ClientId::new();
        let (tx_a, mut rx_a) = outbox();
        let (tx_b, mut rx_b) = outbox();
        e.join(a, tx_a);
        e.join(b, tx_b);
        // welcome + initial state
        for rx in [&mut rx_a, &mut rx_b] {
            assert!(rx.try_recv().unwrap().starts_with("ID: "));
            assert!(rx.try_recv().unwrap().starts_with("VERSION: 0"));
        }

        e.process(&op(a, Edit::InsertChar('X'), 1, 0));
        let to_b = rx_b.try_recv().unwrap();
        match ServerMessage::parse(to_b.trim_end_matches(END_OF_MESSAGE)).unwrap() {
            ServerMessage::State(state) => {
                assert_eq!(state.version, 1);
                assert_eq!(state.lines, vec!["Xhello".to_string()]);
                // b was at the origin, the insert happened at its column
                assert_eq!(state.cursor, Position::new(1, 1));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx_a.try_recv().unwrap().starts_with("VERSION: 1"));

        e.process(&op(a, Edit::CursorMove(Direction::Right), 1, 1));
        assert!(rx_a.try_recv().unwrap().starts_with("VERSION: 1\u{1D}CURSOR: 1.2"));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_ack_follows_own_reply_only() {
        let mut e = engine(&["hello"]);
        let a = ClientId::new();
        let b = ClientId::new();
        let (tx_a, mut rx_a) = outbox();
        let (tx_b, mut rx_b) = outbox();
        e.join(a, tx_a);
        e.join(b, tx_b);
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        e.process(&op(a, Edit::InsertChar('X'), 1, 0).with_seq(7));
        assert!(rx_a.try_recv().unwrap().starts_with("VERSION: 1"));
        assert_eq!(&*rx_a.try_recv().unwrap(), "ACK: 7\u{1E}");
        assert!(rx_b.try_recv().unwrap().starts_with("VERSION: 1"));
        assert!(rx_b.try_recv().is_err());

        e.process(&op(a, Edit::CursorMove(Direction::Left), 1, 1).with_seq(8));
        assert!(rx_a.try_recv().unwrap().starts_with("VERSION: 1\u{1D}CURSOR: 1.0"));
        assert_eq!(&*rx_a.try_recv().unwrap(), "ACK: 8\u{1E}");

        // no ack without a seq, and none for a discarded operation
        e.process(&op(a, Edit::Backspace, 1, 0));
        assert!(rx_a.try_recv().unwrap().starts_with("VERSION: 1"));
        assert!(rx_a.try_recv().is_err());
        e.process(&op(ClientId::new(), Edit::InsertChar('y'), 1, 0).with_seq(9));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_applies_in_queue_order() {
        let (queue, rx) = operation_queue();
        let engine = tokio::spawn(DocumentEngine::new(Document::from_lines(vec![
            "hello".to_string(),
        ]))
        .run(rx));

        let a = ClientId::new();
        let b = ClientId::new();
        let (tx_a, _rx_a) = outbox();
        let (tx_b, _rx_b) = outbox();
        queue.join(a, tx_a).unwrap();
        queue.join(b, tx_b).unwrap();

        // A inserts, then B moves right from the column A just wrote to.
        queue.apply(op(a, Edit::InsertChar('X'), 1, 0)).unwrap();
        queue.apply(op(b, Edit::CursorMove(Direction::Right), 1, 5)).unwrap();
        queue.leave(a).unwrap();

        let snapshot = queue.shutdown().await.unwrap();
        assert_eq!(snapshot.lines, vec!["Xhello".to_string()]);
        assert_eq!(snapshot.version, 1);
        // the insert ran first, so B's requested column 5 now has room to move to 6
        assert_eq!(snapshot.cursors.get(&b), Some(&Position::new(1, 6)));
        assert!(!snapshot.cursors.contains_key(&a));

        assert_eq!(engine.await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_leave_after_queued_operations() {
        let (queue, rx) = operation_queue();
        tokio::spawn(DocumentEngine::default().run(rx));

        let a = ClientId::new();
        let (tx, _rx) = outbox();
        queue.join(a, tx).unwrap();
        queue.apply(op(a, Edit::InsertChar('q'), 1, 0)).unwrap();
        queue.leave(a).unwrap();
        queue.apply(op(a, Edit::InsertChar('z'), 1, 1)).unwrap();

        let snapshot = queue.snapshot().await.unwrap();
        assert_eq!(snapshot.lines, vec!["q".to_string()]);
        assert_eq!(snapshot.version, 1);
        assert!(snapshot.cursors.is_empty());
    }

    #[derive(Debug, Clone)]
    struct Step {
        actor: usize,
        edit: Edit,
        line: i64,
        column: i64,
    }

    fn edit_strategy() -> impl Strategy<Value = Edit> {
        prop_oneof![
            prop::char::range('a', 'z').prop_map(Edit::InsertChar),
            Just(Edit::InsertSpace),
            Just(Edit::InsertReturn),
            Just(Edit::Backspace),
            Just(Edit::CursorMove(Direction::Left)),
            Just(Edit::CursorMove(Direction::Right)),
            Just(Edit::CursorMove(Direction::Up)),
            Just(Edit::CursorMove(Direction::Down)),
        ]
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        (0..3usize, edit_strategy(), -2..12i64, -2..20i64).prop_map(
            |(actor, edit, line, column)| Step {
                actor,
                edit,
                line,
                column,
            },
        )
    }

    proptest! {
        #[test]
        fn prop_cursors_stay_in_bounds(steps in prop::collection::vec(step_strategy(), 0..64)) {
            let mut e = engine(&["hello world\n", "second line\n", "x"]);
            let clients: Vec<ClientId> = (0..3).map(|_| {
                let id = ClientId::new();
                e.add_silent_client(id);
                id
            }).collect();

            for step in steps {
                let text_before = e.document().text();
                let version_before = e.document().version();
                let outcome = e.apply(&Operation {
                    client: clients[step.actor],
                    edit: step.edit,
                    line: step.line,
                    column: step.column,
                    version: 0,
                    seq: None,
                });

                prop_assert!(e.cursors().all_within(e.document()));
                prop_assert!(e.document().line_count() >= 1);
                match outcome {
                    Outcome::Mutated { version } => {
                        prop_assert_eq!(version, version_before + 1);
                        prop_assert_eq!(e.document().version(), version_before + 1);
                    }
                    _ => {
                        prop_assert_eq!(e.document().version(), version_before);
                        prop_assert_eq!(e.document().text(), text_before);
                    }
                }
            }
        }

        #[test]
        fn prop_mutations_preserve_text_length_arithmetic(
            steps in prop::collection::vec(step_strategy(), 0..64)
        ) {
            let mut e = engine(&["abc\n", "def"]);
            let clients: Vec<ClientId> = (0..3).map(|_| {
                let id = ClientId::new();
                e.add_silent_client(id);
                id
            }).collect();

            for step in steps {
                let before = e.document().text().chars().count() as i64;
                let outcome = e.apply(&Operation {
                    client: clients[step.actor],
                    edit: step.edit,
                    line: step.line,
                    column: step.column,
                    version: 0,
                    seq: None,
                });
                let after = e.document().text().chars().count() as i64;
                let expected = match (step.edit, outcome) {
                    (_, Outcome::Unchanged) | (Edit::CursorMove(_), _) => 0,
                    (Edit::Backspace, _) => -1,
                    _ => 1,
                };
                prop_assert_eq!(after - before, expected);
            }
        }
    }
}
