//! Frame decoding
//!
//! Every inbound frame is turned into a `serde_json::Value` before routing.
//! Text frames are JSON. Binary frames only appear when the spot stream runs
//! in protobuf mode; decoding those is plugged in by the caller, who must
//! produce an object carrying a `channel` field.

use mexc_types::{MexcError, MexcResult};
use serde_json::Value;

use crate::transport::Frame;

/// Longest raw payload kept in an `InvalidJson` error
const RAW_PREVIEW: usize = 256;

/// Turns a raw frame into a JSON value
pub trait FrameDecoder: Send + Sync {
    /// Decode one frame
    fn decode(&self, frame: &Frame) -> MexcResult<Value>;
}

impl<F> FrameDecoder for F
where
    F: Fn(&Frame) -> MexcResult<Value> + Send + Sync,
{
    fn decode(&self, frame: &Frame) -> MexcResult<Value> {
        self(frame)
    }
}

/// Default decoder: JSON text, and JSON carried in binary frames
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl FrameDecoder for JsonDecoder {
    fn decode(&self, frame: &Frame) -> MexcResult<Value> {
        match frame {
            Frame::Text(text) => serde_json::from_str(text).map_err(|e| MexcError::InvalidJson {
                message: e.to_string(),
                raw: Some(preview(text)),
            }),
            Frame::Binary(data) => serde_json::from_slice(data).map_err(|e| {
                MexcError::Decode(format!(
                    "binary frame of {} bytes is not JSON ({}); configure a protobuf decoder",
                    data.len(),
                    e
                ))
            }),
        }
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(RAW_PREVIEW) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
