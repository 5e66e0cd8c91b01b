//! Device transport contract
//!
//! The core never touches the wire directly: everything going to a device
//! is an [`OutboundFrame`] handed to a [`DeviceTransport`]. Sending is an
//! enqueue, not a round trip — delivery happens on the session's writer
//! task, and device replies arrive through the session reader out of band.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Protocol frame sent to a device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Echo of recognized text, sent before dispatch for turn-taking feedback
    Stt {
        /// Recognized utterance
        text: String,
    },
    /// Assistant text to be synthesized and played by the device pipeline
    Tts {
        /// Text to speak
        text: String,
    },
    /// Structured IoT command batch
    Iot {
        /// Commands executed by the device firmware
        commands: Vec<Value>,
    },
    /// Wake word acknowledgement
    WakeWord {
        /// The wake word that was matched
        wake_word: String,
    },
    /// MCP payload tunneled to the device
    Mcp {
        /// JSON-RPC message
        payload: Value,
    },
    /// Session close notice
    Goodbye,
}

/// Transport handle owned by a session
pub trait DeviceTransport: Send + Sync {
    /// Enqueue a frame for delivery to the device
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is gone and nothing can be queued.
    fn send(&self, frame: OutboundFrame) -> Result<()>;
}

/// Channel-backed transport
///
/// The WebSocket writer task (or a test) drains the receiving end.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl ChannelTransport {
    /// Create a transport and the receiver its frames are drained from
    #[must_use]
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl DeviceTransport for ChannelTransport {
    fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| Error::Transport("device connection closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iot_frame_wire_shape() {
        let frame = OutboundFrame::Iot {
            commands: vec![serde_json::json!({ "action": "query_cup_temperature" })],
        };
        let json = serde_json::to_value(&frame).unwrap();

        assert_eq!(json["type"], "iot");
        assert_eq!(json["commands"][0]["action"], "query_cup_temperature");
    }

    #[test]
    fn test_wake_word_frame_wire_shape() {
        let frame = OutboundFrame::WakeWord {
            wake_word: "hey lark".to_string(),
        };
        let json = serde_json::to_value(&frame).unwrap();

        assert_eq!(json["type"], "wake_word");
        assert_eq!(json["wake_word"], "hey lark");
    }

    #[test]
    fn test_channel_transport_delivers_in_order() {
        let (transport, mut rx) = ChannelTransport::channel();
        transport
            .send(OutboundFrame::Stt { text: "one".to_string() })
            .unwrap();
        transport
            .send(OutboundFrame::Tts { text: "two".to_string() })
            .unwrap();

        assert!(matches!(rx.try_recv().unwrap(), OutboundFrame::Stt { .. }));
        assert!(matches!(rx.try_recv().unwrap(), OutboundFrame::Tts { .. }));
    }

    #[test]
    fn test_send_after_close_errors() {
        let (transport, rx) = ChannelTransport::channel();
        drop(rx);

        assert!(transport.send(OutboundFrame::Goodbye).is_err());
    }
}
