//! Unified tool dispatch integration tests
//!
//! Exercises the manager and handler through a wired session: unknown
//! names, batch combination, argument decoding, and dynamic device tool
//! registration.

use lark_edge::tools::registry::PluginFunction;
use lark_edge::{
    Action, ActionResponse, FunctionCallItem, FunctionCallPayload, IotDescriptor, OutboundFrame,
    ToolDefinition, ToolType,
};
use serde_json::{Value, json};

mod common;
use common::{harness, next_frame};

fn single(name: &str, arguments: Option<Value>) -> FunctionCallPayload {
    FunctionCallPayload::Single(FunctionCallItem {
        name: name.to_string(),
        id: Some("call_test".to_string()),
        arguments,
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_tool_returns_not_found() {
    let h = harness(None).await;

    let resp = h
        .handler
        .handle_llm_function_call(&h.session, single("no_such_tool", None))
        .await;

    assert_eq!(resp.action, Action::NotFound);
    assert!(resp.result.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn builtins_are_registered_after_init() {
    let h = harness(None).await;

    assert!(h.handler.finished_init());
    assert!(h.handler.has_tool("get_server_time"));
    assert!(h.handler.has_tool("get_temperature"));
    assert!(h.handler.has_tool("change_role"));

    let stats = h.handler.get_tool_statistics();
    assert_eq!(stats.get(&ToolType::ServerPlugin), Some(&3));
}

#[tokio::test(flavor = "multi_thread")]
async fn iot_registration_makes_tools_resolvable() {
    let mut h = harness(None).await;

    h.handler.register_iot_tools(vec![
        IotDescriptor {
            name: "set_lamp".to_string(),
            description: "Switch the lamp".to_string(),
            parameters: None,
        },
        IotDescriptor {
            name: "set_fan_speed".to_string(),
            description: "Adjust the fan".to_string(),
            parameters: None,
        },
    ]);

    assert!(h.handler.has_tool("set_lamp"));
    assert!(h.handler.has_tool("set_fan_speed"));

    let resp = h
        .handler
        .handle_llm_function_call(
            &h.session,
            single("set_lamp", Some(json!({ "state": "on" }))),
        )
        .await;
    assert_eq!(resp.action, Action::ReqLlm);

    match next_frame(&mut h.frames).await {
        OutboundFrame::Iot { commands } => {
            assert_eq!(commands[0]["action"], "set_lamp");
            assert_eq!(commands[0]["state"], "on");
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn string_and_object_arguments_are_equivalent() {
    let h = harness(None).await;
    h.handler.registry().register(PluginFunction::plain(
        ToolDefinition::new("echo_args", "Echo arguments", ToolType::ServerPlugin),
        |args| Ok(ActionResponse::respond(serde_json::to_string(args)?)),
    ));
    h.handler.refresh_tools();

    let as_object = h
        .handler
        .handle_llm_function_call(
            &h.session,
            single("echo_args", Some(json!({ "level": 3, "state": "on" }))),
        )
        .await;
    let as_string = h
        .handler
        .handle_llm_function_call(
            &h.session,
            single(
                "echo_args",
                Some(Value::String(json!({ "level": 3, "state": "on" }).to_string())),
            ),
        )
        .await;

    assert_eq!(as_object.response, as_string.response);
}

#[tokio::test(flavor = "multi_thread")]
async fn undecodable_arguments_become_error_response() {
    let h = harness(None).await;

    let resp = h
        .handler
        .handle_llm_function_call(
            &h.session,
            single(
                "get_server_time",
                Some(Value::String("this is { not json".to_string())),
            ),
        )
        .await;

    assert_eq!(resp.action, Action::Error);
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_results_combine_in_call_order() {
    let h = harness(None).await;
    for (name, fragment) in [("first_tool", "one"), ("second_tool", "two")] {
        let fragment = fragment.to_string();
        h.handler.registry().register(PluginFunction::plain(
            ToolDefinition::new(name, "Batch fragment", ToolType::ServerPlugin),
            move |_args| Ok(ActionResponse::respond(fragment.clone()).with_content(fragment.clone())),
        ));
    }
    h.handler.refresh_tools();

    let resp = h
        .handler
        .handle_llm_function_call(
            &h.session,
            FunctionCallPayload::Batch {
                function_calls: vec![
                    FunctionCallItem {
                        name: "first_tool".to_string(),
                        id: None,
                        arguments: None,
                    },
                    FunctionCallItem {
                        name: "second_tool".to_string(),
                        id: None,
                        arguments: None,
                    },
                ],
            },
        )
        .await;

    assert_eq!(resp.action, Action::Response);
    assert_eq!(resp.result.as_deref(), Some("one; two"));
    assert_eq!(resp.response.as_deref(), Some("one; two"));
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_fails_fast_on_first_error() {
    let h = harness(None).await;
    h.handler.registry().register(PluginFunction::plain(
        ToolDefinition::new("boom", "Always fails", ToolType::ServerPlugin),
        |_args| Err(lark_edge::Error::Tool("boom went wrong".to_string())),
    ));
    h.handler.refresh_tools();

    let resp = h
        .handler
        .handle_llm_function_call(
            &h.session,
            FunctionCallPayload::Batch {
                function_calls: vec![
                    FunctionCallItem {
                        name: "boom".to_string(),
                        id: None,
                        arguments: None,
                    },
                    FunctionCallItem {
                        name: "get_server_time".to_string(),
                        id: None,
                        arguments: None,
                    },
                ],
            },
        )
        .await;

    assert_eq!(resp.action, Action::Error);
    assert!(resp.response.unwrap().contains("boom went wrong"));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_batch_is_none() {
    let h = harness(None).await;

    let resp = h
        .handler
        .handle_llm_function_call(
            &h.session,
            FunctionCallPayload::Batch {
                function_calls: Vec::new(),
            },
        )
        .await;

    assert_eq!(resp.action, Action::None);
}

#[tokio::test(flavor = "multi_thread")]
async fn function_descriptions_cover_every_tool() {
    let h = harness(None).await;

    let descriptions = h.handler.get_functions();
    let names: Vec<&str> = descriptions
        .iter()
        .filter_map(|d| d["function"]["name"].as_str())
        .collect();

    for name in h.handler.current_support_functions() {
        assert!(names.contains(&name.as_str()), "missing schema for {name}");
    }
}

#[test]
fn handler_initializes_under_a_plain_runtime() {
    let h = tokio_test::block_on(harness(None));
    assert!(h.handler.finished_init());
}

#[tokio::test(flavor = "multi_thread")]
async fn cleanup_is_best_effort() {
    let h = harness(None).await;
    h.handler.cleanup().await;
    // A second cleanup must not panic or error out
    h.handler.cleanup().await;
}
