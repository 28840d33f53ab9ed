use std::io::IsTerminal;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framelink_message::{to_frame, Message, SessionId};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One line of command output.
#[derive(Debug, Default, Serialize)]
pub struct EventRecord {
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_id: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: String,
}

impl EventRecord {
    pub fn new(event: &'static str) -> Self {
        Self {
            event,
            timestamp: now_unix_seconds(),
            ..Self::default()
        }
    }

    pub fn listening(addr: SocketAddr) -> Self {
        Self {
            addr: Some(addr.to_string()),
            ..Self::new("listening")
        }
    }

    pub fn connected(session: Option<SessionId>, addr: SocketAddr) -> Self {
        Self {
            session: session.map(|id| id.0),
            addr: Some(addr.to_string()),
            ..Self::new("connected")
        }
    }

    pub fn disconnected(session: Option<SessionId>) -> Self {
        Self {
            session: session.map(|id| id.0),
            ..Self::new("disconnected")
        }
    }

    pub fn error(session: Option<SessionId>, code: i32, description: &str) -> Self {
        Self {
            session: session.map(|id| id.0),
            detail: Some(format!("[{code}] {description}")),
            ..Self::new("error")
        }
    }

    pub fn message(session: Option<SessionId>, message: &dyn Message) -> Self {
        let payload = match to_frame(message) {
            Ok(frame) => payload_preview(frame.payload.as_ref()),
            Err(err) => format!("<unencodable: {err}>"),
        };
        Self {
            session: session.map(|id| id.0),
            type_id: Some(message.kind().as_str()),
            payload: Some(payload),
            ..Self::new("message")
        }
    }
}

pub fn print_event(record: &EventRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "SESSION", "ADDR", "TYPE", "PAYLOAD"])
                .add_row(vec![
                    record.event.to_string(),
                    or_dash(record.session.map(|id| id.to_string())),
                    or_dash(record.addr.clone()),
                    or_dash(record.type_id.map(str::to_string)),
                    or_dash(record.payload.clone().or_else(|| record.detail.clone())),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let mut line = record.event.to_string();
            if let Some(session) = record.session {
                line.push_str(&format!(" session={session}"));
            }
            if let Some(addr) = &record.addr {
                line.push_str(&format!(" addr={addr}"));
            }
            if let Some(type_id) = record.type_id {
                line.push_str(&format!(" type={type_id}"));
            }
            if let Some(payload) = &record.payload {
                line.push_str(&format!(" payload={payload}"));
            }
            if let Some(detail) = &record.detail {
                line.push_str(&format!(" detail={detail}"));
            }
            println!("{line}");
        }
    }
}

fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
