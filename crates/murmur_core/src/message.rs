//! Engine Events
//!
//! Events flow from the engine (including the real-time callbacks) to the
//! control surface over a bounded channel. Real-time senders use `try_send`
//! and drop the event if the channel is full.

use serde::{Deserialize, Serialize};

/// Events sent from the audio engine to the control thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Engine started successfully
    Started {
        input_device: String,
        output_device: String,
    },

    /// Engine stopped
    Stopped,

    /// Error occurred
    Error { message: String },

    /// Playback needed a block that wasn't ready; silence was played instead
    BufferUnderrun,

    /// Capture produced a block the processing thread had no room for
    InputOverflow,

    /// The host audio engine reported a stream error
    StreamFault { message: String },

    /// The processing thread exited its loop
    ProcessingFinished { blocks: u64 },
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::StreamFault {
            message: "device unplugged".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("StreamFault"));

        let deserialized: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[test]
    fn test_unit_variant_serialization() {
        let json = serde_json::to_string(&Event::BufferUnderrun).unwrap();
        assert_eq!(json, r#"{"type":"BufferUnderrun"}"#);
    }

    #[test]
    fn test_error_event() {
        let event = Event::error("Test error message");
        if let Event::Error { message } = event {
            assert_eq!(message, "Test error message");
        } else {
            panic!("Should be Error variant");
        }
    }
}
