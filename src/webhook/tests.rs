use super::*;

fn notification(value: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA_ID",
            "changes": [{"field": "messages", "value": value}]
        }]
    }))
    .unwrap()
}

fn metadata() -> serde_json::Value {
    serde_json::json!({
        "display_phone_number": "15550001111",
        "phone_number_id": "1029384756"
    })
}

#[test]
fn test_parse_text_message() {
    let body = notification(serde_json::json!({
        "messaging_product": "whatsapp",
        "metadata": metadata(),
        "contacts": [{"profile": {"name": "Ann"}, "wa_id": "5551234"}],
        "messages": [{
            "from": "5551234",
            "id": "wamid.AAA",
            "timestamp": "1700000000",
            "type": "text",
            "text": {"body": "hi"}
        }]
    }));
    let events = parse_events(&body);
    assert_eq!(events.len(), 1);
    let InboundEvent::Text(msg) = &events[0] else {
        panic!("expected text event, got {:?}", events[0]);
    };
    assert_eq!(msg.external_id, "wamid.AAA");
    assert_eq!(msg.sender, "5551234");
    assert_eq!(msg.content, "hi");
    assert_eq!(msg.kind, MessageKind::Text);
    assert_eq!(msg.timestamp.unwrap().timestamp(), 1_700_000_000);
    assert_eq!(msg.destination.phone_number_id.as_deref(), Some("1029384756"));
    assert_eq!(
        msg.destination.route().display_phone_number,
        Some("15550001111")
    );
}

#[test]
fn test_parse_image_uses_placeholder() {
    let body = notification(serde_json::json!({
        "metadata": metadata(),
        "messages": [{
            "from": "5551234",
            "id": "wamid.IMG",
            "timestamp": "1700000001",
            "type": "image",
            "image": {"id": "media-1", "mime_type": "image/jpeg"}
        }]
    }));
    let events = parse_events(&body);
    let InboundEvent::Media(msg) = &events[0] else {
        panic!("expected media event");
    };
    assert_eq!(msg.kind, MessageKind::Image);
    assert_eq!(msg.content, "[UNSUPPORTED CONTENT TYPE: IMAGE]");
}

#[test]
fn test_parse_unknown_type_maps_to_unknown_kind() {
    let body = notification(serde_json::json!({
        "messages": [{"from": "1", "id": "wamid.S", "type": "sticker"}]
    }));
    let events = parse_events(&body);
    let msg = events[0].message().unwrap();
    assert!(matches!(events[0], InboundEvent::Media(_)));
    assert_eq!(msg.kind, MessageKind::Unknown);
    assert_eq!(msg.content, "[UNSUPPORTED CONTENT TYPE: STICKER]");
    assert!(msg.timestamp.is_none());
}

#[test]
fn test_parse_voice_is_audio() {
    let body = notification(serde_json::json!({
        "messages": [{"from": "1", "id": "wamid.V", "type": "voice", "timestamp": "1700000000"}]
    }));
    let events = parse_events(&body);
    assert_eq!(events[0].message().unwrap().kind, MessageKind::Audio);
}

#[test]
fn test_text_without_body_is_empty_content() {
    let body = notification(serde_json::json!({
        "messages": [{"from": "1", "id": "wamid.T", "type": "text"}]
    }));
    let events = parse_events(&body);
    let InboundEvent::Text(msg) = &events[0] else {
        panic!("expected text event");
    };
    assert_eq!(msg.content, "");
}

#[test]
fn test_numeric_and_invalid_timestamps() {
    let body = notification(serde_json::json!({
        "messages": [
            {"from": "1", "id": "a", "type": "text", "timestamp": 1700000000},
            {"from": "1", "id": "b", "type": "text", "timestamp": "not-a-number"},
            {"from": "1", "id": "c", "type": "text", "timestamp": "-5"}
        ]
    }));
    let events = parse_events(&body);
    assert_eq!(events.len(), 3);
    assert_eq!(
        events[0].message().unwrap().timestamp.unwrap().timestamp(),
        1_700_000_000
    );
    assert!(events[1].message().unwrap().timestamp.is_none());
    assert!(events[2].message().unwrap().timestamp.is_none());
}

#[test]
fn test_status_update() {
    let body = notification(serde_json::json!({
        "metadata": metadata(),
        "statuses": [{"id": "wamid.OUT", "status": "delivered", "recipient_id": "5551234"}]
    }));
    let events = parse_events(&body);
    assert_eq!(
        events,
        vec![InboundEvent::StatusUpdate {
            external_id: "wamid.OUT".into(),
            status: "delivered".into()
        }]
    );
    assert!(events[0].message().is_none());
}

#[test]
fn test_batched_messages_across_entries() {
    let body = serde_json::to_vec(&serde_json::json!({
        "entry": [
            {"changes": [{"value": {
                "metadata": {"phone_number_id": "111"},
                "messages": [
                    {"from": "1", "id": "m1", "type": "text", "text": {"body": "one"}},
                    {"from": "2", "id": "m2", "type": "text", "text": {"body": "two"}}
                ]
            }}]},
            {"changes": [{"value": {
                "metadata": {"phone_number_id": "222"},
                "messages": [{"from": "3", "id": "m3", "type": "document"}]
            }}]}
        ]
    }))
    .unwrap();
    let events = parse_events(&body);
    assert_eq!(events.len(), 3);
    assert_eq!(
        events[2].message().unwrap().destination.phone_number_id.as_deref(),
        Some("222")
    );
    assert_eq!(events[1].message().unwrap().content, "two");
}

#[test]
fn test_message_missing_id_or_sender_is_malformed() {
    let body = notification(serde_json::json!({
        "messages": [
            {"from": "1", "type": "text", "text": {"body": "no id"}},
            {"id": "wamid.X", "type": "text", "text": {"body": "no sender"}}
        ]
    }));
    let events = parse_events(&body);
    assert_eq!(events.len(), 2);
    assert!(
        events
            .iter()
            .all(|e| matches!(e, InboundEvent::Malformed { .. }))
    );
    let InboundEvent::Malformed { external_id, .. } = &events[1] else {
        unreachable!();
    };
    assert_eq!(external_id.as_deref(), Some("wamid.X"));
}

#[test]
fn test_odd_entry_does_not_sink_batch() {
    let body = notification(serde_json::json!({
        "metadata": metadata(),
        "messages": [
            {"from": "5551234", "id": "wamid.GOOD", "type": "text", "text": {"body": "ok"}},
            {"from": "5551234", "id": "wamid.ODD", "type": "text", "text": "not-an-object"},
            {"from": 5_551_234, "id": "wamid.NUM", "type": "text"}
        ],
        "statuses": [{"id": 7, "status": "read"}]
    }));
    let events = parse_events(&body);
    assert_eq!(events.len(), 4);
    assert_eq!(events[0].message().unwrap().external_id, "wamid.GOOD");
    let InboundEvent::Malformed {
        external_id,
        reason,
        entry,
    } = &events[1]
    else {
        panic!("expected malformed entry, got {:?}", events[1]);
    };
    assert_eq!(external_id.as_deref(), Some("wamid.ODD"));
    assert!(reason.contains("invalid message entry"));
    assert!(entry.contains("not-an-object"));
    assert!(matches!(events[2], InboundEvent::Malformed { .. }));
    assert!(matches!(events[3], InboundEvent::Unrecognized { .. }));
}

#[test]
fn test_invalid_json_is_single_unrecognized() {
    let events = parse_events(b"not json at all");
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], InboundEvent::Unrecognized { .. }));
}

#[test]
fn test_empty_notification_is_unrecognized() {
    let bodies: [&[u8]; 3] = [
        b"{}",
        br#"{"entry": []}"#,
        br#"{"entry": [{"changes": [{}]}]}"#,
    ];
    for body in bodies {
        let events = parse_events(body);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], InboundEvent::Unrecognized { .. }));
    }
}
