//! Hub → client notification protocol.
//!
//! On the wire every message is a JSON object
//! `{"type": string, "data"?: any, "params"?: object}`. In Rust the payload is
//! the [`ServerMessage`] tagged union with one variant per `type`;
//! [`WireMessage`] is the untyped envelope both transports carry.

use crate::error::model_error::ModelError;
use crate::{BuildMessage, ErrorLocation, OverlayPolicy, ReconnectPolicy};

use std::panic::Location;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TYPE_INVALID: &str = "invalid";
pub const TYPE_HASH: &str = "hash";
pub const TYPE_OK: &str = "ok";
pub const TYPE_STILL_OK: &str = "still-ok";
pub const TYPE_WARNINGS: &str = "warnings";
pub const TYPE_ERRORS: &str = "errors";
pub const TYPE_STATIC_CHANGED: &str = "static-changed";
pub const TYPE_HOT: &str = "hot";
pub const TYPE_LIVE_RELOAD: &str = "liveReload";
pub const TYPE_RECONNECT: &str = "reconnect";
pub const TYPE_OVERLAY: &str = "overlay";

/// Typed notification sent from the hub to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// The compiler noticed a change and started rebuilding.
    Invalid,
    /// Content hash of the build that just settled.
    Hash(String),
    /// Build settled without diagnostics.
    Ok,
    /// Rebuild produced the same hash as before; nothing to do.
    StillOk,
    Warnings {
        warnings: Vec<BuildMessage>,
        /// Set when errors accompany the warnings.
        prevent_reloading: bool,
    },
    Errors(Vec<BuildMessage>),
    /// A static asset changed outside the compile cycle.
    StaticChanged(String),
    Hot(bool),
    LiveReload(bool),
    Reconnect(ReconnectPolicy),
    Overlay(OverlayPolicy),
}

/// Parameters attached to a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageParams {
    #[serde(default)]
    pub prevent_reloading: bool,
}

/// Untyped wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<MessageParams>,
}

impl ServerMessage {
    /// The wire `type` string for this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Invalid => TYPE_INVALID,
            ServerMessage::Hash(_) => TYPE_HASH,
            ServerMessage::Ok => TYPE_OK,
            ServerMessage::StillOk => TYPE_STILL_OK,
            ServerMessage::Warnings { .. } => TYPE_WARNINGS,
            ServerMessage::Errors(_) => TYPE_ERRORS,
            ServerMessage::StaticChanged(_) => TYPE_STATIC_CHANGED,
            ServerMessage::Hot(_) => TYPE_HOT,
            ServerMessage::LiveReload(_) => TYPE_LIVE_RELOAD,
            ServerMessage::Reconnect(_) => TYPE_RECONNECT,
            ServerMessage::Overlay(_) => TYPE_OVERLAY,
        }
    }

    #[track_caller]
    pub fn to_wire(&self) -> Result<WireMessage, ModelError> {
        let (data, params) = match self {
            ServerMessage::Invalid | ServerMessage::Ok | ServerMessage::StillOk => (None, None),
            ServerMessage::Hash(hash) => (Some(Value::String(hash.clone())), None),
            ServerMessage::Warnings {
                warnings,
                prevent_reloading,
            } => {
                let params = prevent_reloading.then_some(MessageParams {
                    prevent_reloading: true,
                });
                (Some(to_value(warnings)?), params)
            }
            ServerMessage::Errors(errors) => (Some(to_value(errors)?), None),
            ServerMessage::StaticChanged(path) => (Some(Value::String(path.clone())), None),
            ServerMessage::Hot(enabled) | ServerMessage::LiveReload(enabled) => {
                (Some(Value::Bool(*enabled)), None)
            }
            ServerMessage::Reconnect(policy) => (Some(to_value(policy)?), None),
            ServerMessage::Overlay(policy) => (Some(to_value(policy)?), None),
        };

        Ok(WireMessage {
            kind: self.kind().to_string(),
            data,
            params,
        })
    }

    /// Serialize to the JSON text sent over a transport.
    #[track_caller]
    pub fn to_json(&self) -> Result<String, ModelError> {
        let wire = self.to_wire()?;
        serde_json::to_string(&wire).map_err(|e| ModelError::Serialization {
            message: format!("Failed to serialize {} message: {e}", self.kind()),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// Parse JSON text received from a transport.
    #[track_caller]
    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let wire: WireMessage = serde_json::from_str(text).map_err(|e| ModelError::Decode {
            message: format!("Malformed message: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;
        ServerMessage::try_from(wire)
    }
}

impl TryFrom<WireMessage> for ServerMessage {
    type Error = ModelError;

    #[track_caller]
    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let WireMessage { kind, data, params } = wire;

        let message = match kind.as_str() {
            TYPE_INVALID => ServerMessage::Invalid,
            TYPE_OK => ServerMessage::Ok,
            TYPE_STILL_OK => ServerMessage::StillOk,
            TYPE_HASH => ServerMessage::Hash(required(&kind, data)?),
            TYPE_WARNINGS => ServerMessage::Warnings {
                warnings: required(&kind, data)?,
                prevent_reloading: params.is_some_and(|p| p.prevent_reloading),
            },
            TYPE_ERRORS => ServerMessage::Errors(required(&kind, data)?),
            TYPE_STATIC_CHANGED => ServerMessage::StaticChanged(required(&kind, data)?),
            TYPE_HOT => ServerMessage::Hot(required(&kind, data)?),
            TYPE_LIVE_RELOAD => ServerMessage::LiveReload(required(&kind, data)?),
            TYPE_RECONNECT => ServerMessage::Reconnect(required(&kind, data)?),
            TYPE_OVERLAY => ServerMessage::Overlay(required(&kind, data)?),
            other => {
                return Err(ModelError::Decode {
                    message: format!("Unknown message type: {other}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        Ok(message)
    }
}

#[track_caller]
fn to_value<T: Serialize>(value: &T) -> Result<Value, ModelError> {
    serde_json::to_value(value).map_err(|e| ModelError::Serialization {
        message: format!("Failed to serialize message data: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })
}

#[track_caller]
fn required<T: DeserializeOwned>(kind: &str, data: Option<Value>) -> Result<T, ModelError> {
    let data = data.ok_or_else(|| ModelError::Decode {
        message: format!("Message '{kind}' requires data"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    serde_json::from_value(data).map_err(|e| ModelError::Decode {
        message: format!("Invalid data for '{kind}' message: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })
}
