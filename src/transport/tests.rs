use serde_json::{Value, json};

use super::frame::{ClientFrame, ServerFrame};

#[test]
fn client_frames_carry_type_tags_on_the_wire() {
    let frame = ClientFrame::Subscribe {
        id: "sub-1".to_string(),
        destination: "/topic/rooms/room_42".to_string(),
    };
    let value = serde_json::to_value(&frame).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "subscribe",
            "id": "sub-1",
            "destination": "/topic/rooms/room_42"
        })
    );

    let frame = ClientFrame::Connect {
        incoming_heartbeat_ms: 10_000,
        outgoing_heartbeat_ms: 10_000,
    };
    let value = serde_json::to_value(&frame).unwrap();
    assert_eq!(value["type"], "connect");
    assert_eq!(value["incoming_heartbeat_ms"], 10_000);
}

#[test]
fn send_frames_round_trip_arbitrary_json_bodies() {
    let body = json!({
        "user": "ada",
        "position_secs": 93.5,
        "tags": ["intro", "skip"]
    });
    let frame = ClientFrame::Send {
        destination: "/app/rooms/room_42/sync".to_string(),
        body: body.to_string(),
        timestamp: 1_700_000_000_000,
    };

    let text = serde_json::to_string(&frame).unwrap();
    let parsed: ClientFrame = serde_json::from_str(&text).unwrap();
    match parsed {
        ClientFrame::Send {
            body: raw,
            destination,
            timestamp,
        } => {
            assert_eq!(destination, "/app/rooms/room_42/sync");
            assert_eq!(timestamp, 1_700_000_000_000);
            let restored: Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(restored, body);
        }
        other => panic!("Expected a send frame, got {other:?}"),
    }
}

#[test]
fn server_frames_deserialize_from_wire_shape() {
    let text = r#"{
        "type": "message",
        "subscription": "sub-9",
        "destination": "/topic/rooms/lobby",
        "body": "{\"kind\":\"join\",\"user\":\"ada\"}",
        "timestamp": 12
    }"#;
    let frame: ServerFrame = serde_json::from_str(text).unwrap();
    match frame {
        ServerFrame::Message {
            subscription,
            destination,
            body,
            timestamp,
        } => {
            assert_eq!(subscription, "sub-9");
            assert_eq!(destination, "/topic/rooms/lobby");
            assert_eq!(timestamp, 12);
            let payload: Value = serde_json::from_str(&body).unwrap();
            assert_eq!(payload["kind"], "join");
        }
        other => panic!("Expected a message frame, got {other:?}"),
    }

    let frame: ServerFrame = serde_json::from_str(r#"{"type":"connected"}"#).unwrap();
    assert_eq!(frame, ServerFrame::Connected {});

    let frame: ServerFrame =
        serde_json::from_str(r#"{"type":"error","message":"room does not exist"}"#).unwrap();
    assert_eq!(
        frame,
        ServerFrame::Error {
            message: "room does not exist".to_string()
        }
    );
}

#[test]
fn unknown_frame_types_are_rejected() {
    assert!(serde_json::from_str::<ServerFrame>(r#"{"type":"upgrade"}"#).is_err());
    assert!(serde_json::from_str::<ClientFrame>(r#"{"destination":"/topic/x"}"#).is_err());
}
