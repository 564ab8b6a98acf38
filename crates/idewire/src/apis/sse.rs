use std::fmt;

/// A single Server-Sent Event: what the upstream sends us, and what we
/// render back to streaming clients.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: Option<String>,
}

pub const DONE_SENTINEL: &str = "[DONE]";

impl SseEvent {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: Some(data.into()),
        }
    }

    /// An unnamed `data:` frame
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: Some(data.into()),
        }
    }

    /// The terminal `data: [DONE]` frame
    pub fn done() -> Self {
        Self::data(DONE_SENTINEL)
    }

    /// The event name, or `message` when the frame carried none.
    pub fn event_name(&self) -> &str {
        match self.event.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => "message",
        }
    }
}

impl fmt::Display for SseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(event) = &self.event {
            writeln!(f, "event: {}", event)?;
        }
        if let Some(data) = &self.data {
            // multi-line payloads need one data field per line
            for line in data.split('\n') {
                writeln!(f, "data: {}", line)?;
            }
        }
        writeln!(f)
    }
}

impl From<SseEvent> for Vec<u8> {
    fn from(event: SseEvent) -> Self {
        event.to_string().into_bytes()
    }
}
