use std::io as stdio;
use std::io::{stdout, Write};

use protocol::Request;

pub struct InputHandler;

impl InputHandler {
    /// Classify one composed line: a leading `@name` token routes it
    /// privately, anything else goes to the whole lobby. The sender id
    /// may still be the unassigned sentinel early in a session; the
    /// server stamps the real id on relay either way.
    pub fn parse_input(line: &str, self_id: u32) -> Request {
        if let Some(rest) = line.strip_prefix('@') {
            // a bare '@name' sends an empty note rather than nothing
            let (target, text) = match rest.split_once(' ') {
                Some((target, text)) => (target, text),
                None => (rest, ""),
            };
            return Request::Private {
                target: target.to_owned(),
                text: text.to_owned(),
            };
        }

        Request::Broadcast {
            sender_id: self_id,
            text: line.to_owned(),
        }
    }

    // blocking prompt used before the client tasks exist
    pub fn read_sync_name(prompt: &str) -> stdio::Result<String> {
        let mut buf = String::new();

        print!("{} ", prompt);
        stdout().flush()?; // stdout is line buffered, flush the prompt out
        stdio::stdin().read_line(&mut buf)?;

        Ok(buf.trim_end().to_owned())
    }
}
