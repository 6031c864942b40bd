// Verify the wire format clients depend on never drifts.

use natter_core::{ConnId, Message};
use natter_protocol::frames::{EventFrame, InboundFrame, ResFrame};
use natter_protocol::hello::{ClientPolicy, Hello, ServerInfo};
use natter_protocol::methods;

#[test]
fn req_frame_round_trip() {
    let json = r#"{"type":"req","id":"abc-123","method":"subscribe","params":{"channel":"chat"}}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    assert_eq!(frame.frame_type, "req");

    let req = frame.as_req().unwrap();
    assert_eq!(req.method, methods::SUBSCRIBE);
    assert_eq!(req.id, "abc-123");
    assert_eq!(req.params.unwrap()["channel"], "chat");
}

#[test]
fn res_ok_serialization() {
    let res = ResFrame::ok("req-1", serde_json::json!({"pong": true}));
    let json = serde_json::to_string(&res).unwrap();

    assert!(json.contains(r#""type":"res""#));
    assert!(json.contains(r#""ok":true"#));
    assert!(json.contains(r#""pong":true"#));
    // error field must be absent on success
    assert!(!json.contains(r#""error""#));
}

#[test]
fn res_err_serialization() {
    let res = ResFrame::err("req-2", "UNKNOWN_CHANNEL", "no such channel: lobby");
    let json = serde_json::to_string(&res).unwrap();

    assert!(json.contains(r#""ok":false"#));
    assert!(json.contains(r#""UNKNOWN_CHANNEL""#));
    // payload must be absent on error
    assert!(!json.contains(r#""payload""#));
}

#[test]
fn message_event_wire_shape() {
    let msg = Message {
        id: 7,
        author: "alice".into(),
        body: "hi".into(),
        created_at: 1_700_000_000_000,
    };
    let ev = EventFrame::new(methods::EVENT_MESSAGE, &msg)
        .with_channel("chat")
        .with_seq(42);
    let json = serde_json::to_string(&ev).unwrap();

    assert!(json.contains(r#""type":"event""#));
    assert!(json.contains(r#""event":"message""#));
    assert!(json.contains(r#""channel":"chat""#));
    assert!(json.contains(r#""seq":42"#));

    // payload is exactly {id, author, body, created_at}
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    let payload = v["payload"].as_object().unwrap();
    assert_eq!(payload.len(), 4);
    assert_eq!(payload["id"], 7);
    assert_eq!(payload["author"], "alice");
    assert_eq!(payload["body"], "hi");
    assert_eq!(payload["created_at"], 1_700_000_000_000_i64);
}

#[test]
fn gap_event_wire_shape() {
    let ev = EventFrame::new(methods::EVENT_GAP, serde_json::json!({"missed": 6}))
        .with_channel("chat");
    let json = serde_json::to_string(&ev).unwrap();

    assert!(json.contains(r#""event":"subscription.gap""#));
    assert!(json.contains(r#""channel":"chat""#));
    assert!(json.contains(r#""missed":6"#));
}

#[test]
fn hello_wire_shape() {
    let hello = Hello {
        protocol: 1,
        conn_id: ConnId::from("11111111-2222-3333-4444-555555555555"),
        server: ServerInfo {
            name: "natter".into(),
            version: "0.1.0".into(),
        },
        channels: vec!["chat".into()],
        policy: ClientPolicy {
            heartbeat_interval_secs: 30,
            max_payload_bytes: 65536,
        },
    };
    let ev = EventFrame::new(methods::EVENT_HELLO, &hello);
    let json = serde_json::to_string(&ev).unwrap();

    assert!(json.contains(r#""event":"hello""#));
    // connection-level event: no channel, no seq
    assert!(!json.contains(r#""channel""#));
    assert!(!json.contains(r#""seq""#));

    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(v["payload"]["protocol"], 1);
    // ConnId serializes as a bare string
    assert_eq!(
        v["payload"]["conn_id"],
        "11111111-2222-3333-4444-555555555555"
    );
    assert_eq!(v["payload"]["channels"][0], "chat");
    assert_eq!(v["payload"]["policy"]["heartbeat_interval_secs"], 30);
    assert_eq!(v["payload"]["policy"]["max_payload_bytes"], 65536);
}

#[test]
fn inbound_frame_rejects_non_req() {
    let json = r#"{"type":"event","event":"message","payload":{}}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    assert!(frame.as_req().is_none(), "event frame must not parse as req");
}

#[test]
fn req_without_params_parses() {
    let json = r#"{"type":"req","id":"p1","method":"ping"}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    let req = frame.as_req().unwrap();
    assert_eq!(req.method, methods::PING);
    assert!(req.params.is_none());
}
