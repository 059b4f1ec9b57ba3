//! Event bus integration tests.
//!
//! Covers fan-out to several subscribers, the built-in filters and
//! behaviour when receivers are dropped.

use dpbridge_core::{AttributeValue, BridgeEvent, EventBus};
use std::time::Duration;
use tokio::time::timeout;

fn attribute_update(device_id: &str, value: i64) -> BridgeEvent {
    BridgeEvent::AttributeUpdated {
        device_id: device_id.to_string(),
        endpoint: 1,
        cluster: "thermostat".to_string(),
        attribute_id: 0x0012,
        attribute: "occupied_heating_setpoint".to_string(),
        value: AttributeValue::Integer(value),
        timestamp: 0,
    }
}

fn press(device_id: &str, name: &str, code: i64) -> BridgeEvent {
    BridgeEvent::DeviceEvent {
        device_id: device_id.to_string(),
        endpoint: 2,
        name: name.to_string(),
        code,
        args: serde_json::json!({ "value": code }),
        timestamp: 0,
    }
}

#[tokio::test]
async fn test_multiple_subscribers_receive_same_event() {
    let bus = EventBus::new();
    let mut rx1 = bus.subscribe();
    let mut rx2 = bus.subscribe();

    bus.publish(attribute_update("trv", 2500));

    let (e1, m1) = rx1.recv().await.unwrap();
    let (e2, m2) = rx2.recv().await.unwrap();
    assert_eq!(e1, e2);
    assert_eq!(m1.event_id, m2.event_id);
}

#[tokio::test]
async fn test_device_event_filter_skips_attribute_updates() {
    let bus = EventBus::new();
    let mut rx = bus.filter().device_events();

    bus.publish(attribute_update("switch", 1));
    bus.publish(press("switch", "double", 2));

    let (event, _) = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        BridgeEvent::DeviceEvent { name, code, .. } => {
            assert_eq!(name, "double");
            assert_eq!(code, 2);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_attribute_filter_and_custom_filter() {
    let bus = EventBus::new();
    let mut updates = bus.filter().attribute_updates();
    let mut big = bus.filter().custom(|event| {
        matches!(
            event,
            BridgeEvent::AttributeUpdated { value: AttributeValue::Integer(v), .. } if *v > 1000
        )
    });

    bus.publish(press("switch", "single", 1));
    bus.publish(attribute_update("trv", 500));
    bus.publish(attribute_update("trv", 2500));

    assert!(updates.try_recv().is_some());
    assert!(updates.try_recv().is_some());
    assert!(updates.try_recv().is_none());

    let (event, _) = big.try_recv().unwrap();
    assert_eq!(event, attribute_update("trv", 2500));
    assert!(big.try_recv().is_none());
}

#[tokio::test]
async fn test_recv_returns_none_when_bus_dropped() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    drop(bus);

    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_command_filter_sees_only_outbound_outcomes() {
    let bus = EventBus::new();
    let mut commands = bus.filter().command_events();

    bus.publish(attribute_update("trv", 2500));
    bus.publish(BridgeEvent::CommandSent {
        device_id: "trv".to_string(),
        endpoint: 1,
        sequence: 7,
        timestamp: 0,
    });
    bus.publish(press("switch", "hold", 4));
    bus.publish(BridgeEvent::CommandFailed {
        device_id: "trv".to_string(),
        endpoint: 1,
        reason: "No acknowledgement within 5s".to_string(),
        timestamp: 0,
    });

    let (sent, _) = commands.try_recv().unwrap();
    assert!(matches!(sent, BridgeEvent::CommandSent { sequence: 7, .. }));
    let (failed, _) = commands.try_recv().unwrap();
    assert_eq!(failed.type_name(), "CommandFailed");
    assert!(commands.try_recv().is_none());
}
