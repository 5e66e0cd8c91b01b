//! Built-in plugin functions
//!
//! Registered into the [`FunctionRegistry`] at handler initialization.
//! Each calling convention has at least one representative here;
//! `play_music` is registered lazily when the intent model first asks
//! for it.

use chrono::Local;
use serde_json::json;

use crate::tools::registry::{FunctionRegistry, PluginFunction};
use crate::tools::types::{
    ActionResponse, CallConvention, ToolDefinition, ToolType,
};
use crate::transport::OutboundFrame;

/// Name of the lazily-registered playback built-in
pub const PLAY_MUSIC: &str = "play_music";

/// Register the default built-in functions
pub fn register_defaults(registry: &FunctionRegistry) {
    registry.register(get_server_time());
    registry.register(change_role());
    registry.register(get_temperature());
}

/// Clock query; plain convention, no session needed
#[must_use]
pub fn get_server_time() -> PluginFunction {
    let definition = ToolDefinition::new(
        "get_server_time",
        "Report the current date and time.",
        ToolType::ServerPlugin,
    );
    PluginFunction::plain(definition, |_args| {
        let now = Local::now().format("%A, %B %e %Y, %H:%M");
        let text = format!("It is {now}.");
        Ok(ActionResponse::respond(text.clone()).with_content(text))
    })
}

/// Rewrites the assistant's standing instructions for this session
#[must_use]
pub fn change_role() -> PluginFunction {
    let definition = ToolDefinition::new(
        "change_role",
        "Change the assistant's role or personality for this conversation.",
        ToolType::ServerPlugin,
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "role_prompt": {
                "type": "string",
                "description": "New standing instructions for the assistant",
            }
        },
        "required": ["role_prompt"],
    }));

    PluginFunction::with_session(definition, CallConvention::ChangeSysPrompt, |session, args| {
        let Some(prompt) = args.get("role_prompt").and_then(|v| v.as_str()) else {
            return Ok(ActionResponse::error("role_prompt is required"));
        };
        session.with_dialogue(|d| d.augment_system(prompt));
        let text = "Role updated for this conversation.";
        Ok(ActionResponse::respond(text).with_content(text))
    })
}

/// Queries the device's temperature sensor
///
/// The device answers out of band, so the conventional result is a
/// `REQLLM` placeholder acknowledging that the query was sent.
#[must_use]
pub fn get_temperature() -> PluginFunction {
    let definition = ToolDefinition::new(
        "get_temperature",
        "Read the current temperature from the device sensor.",
        ToolType::ServerPlugin,
    );

    PluginFunction::with_session(definition, CallConvention::IotCtl, |session, _args| {
        session.transport().send(OutboundFrame::Iot {
            commands: vec![json!({ "action": "query_temperature" })],
        })?;
        tracing::info!(session_id = %session.id(), "temperature query sent to device");
        Ok(ActionResponse::req_llm("Checking the temperature for you now."))
    })
}

/// Starts playback on the device; registered on demand
///
/// Playback feedback is audio, not speech, so the result carries no
/// follow-up action.
#[must_use]
pub fn play_music() -> PluginFunction {
    let definition = ToolDefinition::new(
        PLAY_MUSIC,
        "Play a song on the device.",
        ToolType::ServerPlugin,
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "song_name": {
                "type": "string",
                "description": "Song to play; omit for a random pick",
            }
        },
        "required": [],
    }));

    PluginFunction::with_session(definition, CallConvention::SystemCtl, |session, args| {
        let song = args
            .get("song_name")
            .and_then(|v| v.as_str())
            .unwrap_or("something you might like");
        session.transport().send(OutboundFrame::Iot {
            commands: vec![json!({ "action": "play_music", "song": song })],
        })?;
        Ok(ActionResponse {
            response: Some(format!("Playing {song}.")),
            ..ActionResponse::new(crate::tools::types::Action::None)
        })
    })
}
