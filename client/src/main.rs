use std::io as stdio;

use tokio::select;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};

use tracing::{error, info, Level};
use tracing_subscriber::fmt;

use client::client::{Client, ClientHandle};
use client::input_handler::InputHandler;
use client::types::{ChatEvent, ClientConfig, Color, DEFAULT_PORT};

const GREETINGS: &str = "$ Welcome to chat! \n$ Lines go to everyone; '@name hello' goes to one user, \\quit leaves\n$ Please input chat name: ";
const LINES_MAX_LEN: usize = 256;

#[tokio::main]
async fn main() -> stdio::Result<()> {
    fmt()
        .compact() // use abbreviated log format
        .with_max_level(Level::INFO)
        .init();

    let host = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1".to_owned());
    let name = match std::env::args().nth(2) {
        Some(name) => name,
        None => InputHandler::read_sync_name(GREETINGS)?,
    };

    let config = ClientConfig { host, port: DEFAULT_PORT, name };
    info!("Client starting, connecting to server {:?}", config.addr());

    let connected = match Client::connect(config).await {
        Ok(connected) => connected,
        Err(e) => {
            error!("{}", e);
            return Ok(());
        }
    };

    let (handle, lines_tx, mut events_rx) = connected.run();

    let mut stdin = FramedRead::new(
        tokio::io::stdin(),
        LinesCodec::new_with_max_length(LINES_MAX_LEN),
    );

    // names the roster showed last time; reprint only on change
    let mut last_roster: Vec<String> = vec![];

    loop {
        select! {
            event = events_rx.recv() => {
                match event {
                    Some(ChatEvent::Message { name, color, text, private }) => {
                        let marker = if private { " [pm]" } else { "" };
                        println!("{}{}: {}", paint(&name, color), marker, text);
                    }
                    Some(ChatEvent::Notice(text)) => println!(">>> {}", text),
                    Some(ChatEvent::Roster(entries)) => {
                        let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
                        if names != last_roster {
                            let painted: Vec<String> = entries
                                .iter()
                                .map(|e| paint(&e.name, e.color))
                                .collect();
                            println!(">>> online: {}", painted.join(" "));
                            last_roster = names;
                        }
                    }
                    Some(ChatEvent::Disconnected) => {
                        println!(">>> disconnected");
                        break;
                    }
                    None => break,
                }
            }
            line = stdin.next() => {
                match line {
                    Some(Ok(line)) if line == "\\quit" => {
                        info!("Session terminated by user...");
                        handle.disconnect();
                    }
                    Some(Ok(line)) if !line.is_empty() => {
                        if lines_tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => (), // swallow empty lines
                    _ => {
                        info!("stdin closed");
                        drain_until_disconnected(&handle, &mut events_rx).await;
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

// stdin is gone, so stop composing and wait out the teardown
async fn drain_until_disconnected(
    handle: &ClientHandle,
    events_rx: &mut tokio::sync::mpsc::Receiver<ChatEvent>,
) {
    handle.disconnect();
    while let Some(event) = events_rx.recv().await {
        if event == ChatEvent::Disconnected {
            println!(">>> disconnected");
            break;
        }
    }
}

// 24-bit ansi foreground in the sender's roster color
fn paint(name: &str, color: Color) -> String {
    format!("\x1b[38;2;{};{};{}m{}\x1b[0m", color.r, color.g, color.b, name)
}
