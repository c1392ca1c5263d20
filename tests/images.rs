use std::time::Duration;

use heurist::{Client, ClientOptions, Error, types::ImageGenerationParams};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> Client {
    Client::new(
        ClientOptions::new()
            .api_key("test-api-key")
            .base_url(server.uri()),
    )
    .unwrap()
}

#[tokio::test]
async fn generate_sends_defaults_and_returns_url() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/submit_job"))
        .and(header("authorization", "Bearer test-api-key"))
        .and(body_partial_json(json!({
            "model_id": "FLUX.1-dev",
            "model_type": "SD",
            "model_input": {
                "SD": {
                    "prompt": "A serene landscape",
                    "num_iterations": 20,
                    "guidance_scale": 7.5,
                    "width": 512,
                    "height": 512
                }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("\"https://cdn.heurist.xyz/a.png\""))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server)
        .images()
        .generate(ImageGenerationParams::new("FLUX.1-dev", "A serene landscape"))
        .await
        .unwrap();

    assert_eq!(result.url, "https://cdn.heurist.xyz/a.png");
    assert_eq!(result.metadata["model"], "FLUX.1-dev");
    assert_eq!(result.metadata["prompt"], "A serene landscape");
    assert_eq!(result.metadata["num_iterations"], 20);
    assert!(!result.metadata.contains_key("seed"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = requests[0].body_json().unwrap();
    assert!(body["model_input"]["SD"].get("neg_prompt").is_none());
}

#[tokio::test]
async fn non_success_status_is_an_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/submit_job"))
        .respond_with(ResponseTemplate::new(503).set_body_string("no miners available"))
        .expect(1)
        .mount(&server)
        .await;

    let error = client(&server)
        .images()
        .generate(ImageGenerationParams::new("FLUX.1-dev", "A stormy ocean"))
        .await
        .unwrap_err();

    match error {
        Error::Api { status, body } => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(body, "no miners available");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_success_body_is_a_format_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/submit_job"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let error = client(&server)
        .images()
        .generate(ImageGenerationParams::new("FLUX.1-dev", "A cozy cabin"))
        .await
        .unwrap_err();

    assert!(matches!(error, Error::ResponseFormat(_)));
}

#[tokio::test]
async fn invalid_params_never_reach_the_network() {
    let server = MockServer::start().await;
    let images = client(&server).images();

    let error = images
        .generate(ImageGenerationParams::new("FLUX.1-dev", "A garden").num_iterations(80))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        Error::Validation {
            field: "num_iterations",
            ..
        }
    ));

    let error = images
        .generate(ImageGenerationParams::new("FLUX.1-dev", ""))
        .await
        .unwrap_err();
    assert!(matches!(error, Error::Validation { field: "prompt", .. }));

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let client = Client::new(
        ClientOptions::new()
            .api_key("test-api-key")
            .base_url("http://127.0.0.1:1"),
    )
    .unwrap();

    let error = client
        .images()
        .generate(ImageGenerationParams::new("FLUX.1-dev", "A lake"))
        .await
        .unwrap_err();

    assert!(matches!(error, Error::Transport(_)));
}

#[tokio::test]
async fn slow_response_hits_configured_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/submit_job"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("\"https://cdn.heurist.xyz/late.png\"")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = Client::new(
        ClientOptions::new()
            .api_key("test-api-key")
            .base_url(server.uri())
            .timeout(Duration::from_millis(50)),
    )
    .unwrap();

    let error = client
        .images()
        .generate(ImageGenerationParams::new("FLUX.1-dev", "A slow sunrise"))
        .await
        .unwrap_err();

    match error {
        Error::Transport(e) => assert!(e.is_timeout()),
        other => panic!("expected transport timeout, got {other:?}"),
    }
}

#[test]
fn missing_api_key_fails_construction() {
    let error = Client::new(ClientOptions::new().base_url("http://localhost"))
        .err()
        .unwrap();
    assert!(matches!(error, Error::Configuration(_)));
}
