mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakeBackend;
use powerctl_client::{ClientConfig, DeviceClient, DeviceConfig};
use powerctl_core::model::CommandOutcome;
use powerctl_core::FailureKind;

fn device(backend: &FakeBackend) -> DeviceClient {
    let config = ClientConfig {
        device: Some(DeviceConfig {
            endpoint: "device".into(),
            source: "powerctl".into(),
        }),
        ..backend.config()
    };
    DeviceClient::new(&config).unwrap()
}

fn reply(backend: &FakeBackend, content_type: &str, body: &str) {
    *backend.state.device_reply.lock().unwrap() = (content_type.into(), body.into());
}

#[tokio::test]
async fn requires_a_device_section() {
    let backend = FakeBackend::spawn().await;
    assert!(DeviceClient::new(&backend.config()).is_err());
}

#[tokio::test]
async fn endpoint_resolves_against_base_url() {
    let backend = FakeBackend::spawn().await;
    let client = device(&backend);
    assert_eq!(client.endpoint_url(), format!("{}/device", backend.base_url()));
}

#[tokio::test]
async fn status_reads_whichever_field_is_present() {
    let backend = FakeBackend::spawn().await;
    let client = device(&backend);

    assert!(client.status().await.unwrap());

    reply(&backend, "application/json", r#"{"status":"off"}"#);
    assert!(!client.status().await.unwrap());

    reply(&backend, "application/json", r#"{"isOn":true}"#);
    assert!(client.status().await.unwrap());

    reply(&backend, "application/json; charset=utf-8", r#"{"online":false}"#);
    assert!(!client.status().await.unwrap());

    assert_eq!(backend.state.hits("device_status"), 4);
}

#[tokio::test]
async fn non_json_status_is_malformed() {
    let backend = FakeBackend::spawn().await;
    let client = device(&backend);
    reply(&backend, "text/html", "<html>router login</html>");

    let err = client.status().await.unwrap_err();
    assert_eq!(err.kind, FailureKind::MalformedResponse);
    assert_eq!(backend.state.hits("device_status"), 1);
}

#[tokio::test]
async fn turn_on_sends_command_and_accepts_plain_text() {
    let backend = FakeBackend::spawn().await;
    let client = device(&backend);

    let outcome = client.turn_on().await.unwrap();
    let CommandOutcome::Acknowledged(ack) = outcome else {
        panic!("expected an acknowledgement, got {outcome:?}");
    };
    assert!(ack.success);
    assert_eq!(ack.message, "PC is turning on");

    let commands = backend.state.device_commands.lock().unwrap().clone();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0]["action"], "turn_on");
    assert_eq!(commands[0]["source"], "powerctl");
    assert!(commands[0]["timestamp"].as_i64().unwrap() > 0);
    assert!(!client.is_busy());
}

#[tokio::test]
async fn second_press_while_in_flight_is_dropped() {
    let backend = FakeBackend::spawn().await;
    *backend.state.start_delay.lock().unwrap() = Duration::from_millis(300);
    let client = Arc::new(device(&backend));

    let first = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.turn_on().await }
    });
    for _ in 0..200 {
        if client.is_busy() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(client.is_busy());

    assert_eq!(client.turn_on().await.unwrap(), CommandOutcome::AlreadyInFlight);
    assert!(matches!(
        first.await.unwrap().unwrap(),
        CommandOutcome::Acknowledged(_)
    ));
    assert_eq!(backend.state.hits("device_command"), 1);
    assert!(!client.is_busy());
}
