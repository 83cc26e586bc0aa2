//! Line-mode terminal client for a shared document.
//!
//! Each line read from stdin is typed one character at a time. A line that
//! is exactly one of the commands below presses a key instead:
//!
//! ```text
//! :left :right :up :down   move the caret
//! :bs                      backspace
//! :ret                     return
//! :quit                    disconnect
//! ```

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use linesync_collab::client::{SyncClient, SyncEvent};
use linesync_collab::protocol::{Direction, DocumentState, Edit};
use tokio::io::{AsyncBufReadExt, BufReader};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "linesync-client")]
#[command(about = "Edit a shared line document from the terminal")]
struct Args {
    /// Server host
    host: String,

    /// Server port
    port: u16,
}

enum Input {
    Key(Edit),
    Text(String),
    Quit,
}

fn parse_input(line: &str) -> Input {
    match line {
        ":left" => Input::Key(Edit::CursorMove(Direction::Left)),
        ":right" => Input::Key(Edit::CursorMove(Direction::Right)),
        ":up" => Input::Key(Edit::CursorMove(Direction::Up)),
        ":down" => Input::Key(Edit::CursorMove(Direction::Down)),
        ":bs" => Input::Key(Edit::Backspace),
        ":ret" => Input::Key(Edit::InsertReturn),
        ":quit" => Input::Quit,
        text => Input::Text(text.to_string()),
    }
}

fn edit_for(c: char) -> Edit {
    if c == ' ' {
        Edit::InsertSpace
    } else {
        Edit::InsertChar(c)
    }
}

/// Render a state with a `|` at the caret.
fn render(state: &DocumentState) -> String {
    let mut out = format!("--- version {} caret {} ---\n", state.version, state.cursor);
    for (i, line) in state.lines.iter().enumerate() {
        let visible = line.strip_suffix('\n').unwrap_or(line);
        if i + 1 == state.cursor.line {
            let split = visible
                .char_indices()
                .nth(state.cursor.column)
                .map_or(visible.len(), |(at, _)| at);
            out.push_str(&visible[..split]);
            out.push('|');
            out.push_str(&visible[split..]);
        } else {
            out.push_str(visible);
        }
        out.push('\n');
    }
    out
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let mut client = SyncClient::connect(addr.as_str())
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    println!("Connected as {}", client.client_id());

    if let Some(mut events) = client.take_event_rx() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    SyncEvent::State(state) => print!("{}", render(&state)),
                    SyncEvent::Disconnected => {
                        println!("Disconnected from server");
                        std::process::exit(0);
                    }
                }
            }
        });
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        let edits: Vec<Edit> = match parse_input(&line) {
            Input::Quit => break,
            Input::Key(edit) => vec![edit],
            Input::Text(text) => text.chars().map(edit_for).collect(),
        };
        // One at a time, so each edit lands at the caret the previous one left.
        for edit in edits {
            client.apply(edit, REPLY_TIMEOUT).await?;
        }
    }

    client.disconnect();
    Ok(())
}
