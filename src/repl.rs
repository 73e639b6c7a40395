//! Line-oriented chat loop for the terminal.
//!
//! Works against the in-process [`ChatService`] or a remote server through
//! [`ApiClient`]; both keep one session for the whole run.
use std::io::{BufRead, Write};

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::chat::{ChatRequest, ChatResponse, ChatService};
use crate::client::ApiClient;
use crate::format;

/// Starter prompts offered before the first message.
pub const SUGGESTIONS: &[(&str, &str)] = &[
    ("Food", "What are the must-try street foods in Mumbai?"),
    ("Sights", "Which historical places should I visit in Jaipur?"),
    ("Shopping", "Where can I shop for handicrafts in Delhi?"),
    ("Itinerary", "Plan a 3-day trip to Goa on a budget"),
];

/// Something that can answer one chat turn.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// On failure returns the text to show in place of a reply.
    async fn send(&self, request: ChatRequest) -> Result<ChatResponse, String>;
}

#[async_trait]
impl ChatBackend for ChatService {
    async fn send(&self, request: ChatRequest) -> Result<ChatResponse, String> {
        self.chat(request).await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn send(&self, request: ChatRequest) -> Result<ChatResponse, String> {
        self.send_message(&request).await.map_err(|e| e.user_message())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Quit,
    Skip,
    Message(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Skip;
    }
    if line.eq_ignore_ascii_case("exit") {
        return Input::Quit;
    }
    if let Ok(n) = line.parse::<usize>() {
        if let Some((_, prompt)) = n.checked_sub(1).and_then(|i| SUGGESTIONS.get(i)) {
            return Input::Message((*prompt).to_string());
        }
    }
    Input::Message(line.to_string())
}

fn print_banner<W: Write>(out: &mut W) -> std::io::Result<()> {
    writeln!(out, "Local guide chat. Type \"exit\" to quit.")?;
    writeln!(out, "Try one of these (type the number):")?;
    for (i, (label, prompt)) in SUGGESTIONS.iter().enumerate() {
        writeln!(out, "  {}. {label}: {prompt}", i + 1)?;
    }
    writeln!(out)
}

fn print_response<W: Write>(out: &mut W, resp: &ChatResponse) -> std::io::Result<()> {
    let lines = format::format_reply(&resp.response);
    if lines.is_empty() {
        writeln!(out, "{}", resp.response.trim())?;
    } else {
        write!(out, "{}", format::render_plain(&lines))?;
    }
    if !resp.sources.is_empty() {
        let names: Vec<&str> = resp.sources.iter().map(|p| p.name.as_str()).collect();
        writeln!(out, "Sources: {}", names.join(", "))?;
    }
    writeln!(out)
}

/// Run the chat loop until `exit` or end of input.
pub async fn run<B, R, W>(backend: &B, input: R, mut out: W) -> Result<()>
where
    B: ChatBackend + ?Sized,
    R: BufRead,
    W: Write,
{
    print_banner(&mut out)?;
    let mut session_id: Option<String> = None;

    for line in input.lines() {
        let message = match parse_input(&line?) {
            Input::Quit => break,
            Input::Skip => continue,
            Input::Message(m) => m,
        };

        let mut request = ChatRequest::new(message);
        request.session_id = session_id.clone();

        match backend.send(request).await {
            Ok(resp) => {
                debug!(session = %resp.session_id, "reply received");
                session_id = Some(resp.session_id.clone());
                print_response(&mut out, &resp)?;
            }
            Err(msg) => {
                writeln!(out, "{msg}\n")?;
            }
        }
        out.flush()?;
    }

    writeln!(out, "Goodbye!")?;
    Ok(())
}
