use bytes::Bytes;
use reqwest::Method;
use toolhost_broker::Broker;

#[tokio::test]
async fn list_tools_aggregates_and_tags_each_entry() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/tools")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"name": "calc"}]"#)
        .create_async()
        .await;

    let broker = Broker::new();
    broker.register("child-a", &server.url(), "alpha", vec!["calc".to_string()]);

    let tools = broker.list_tools().await;
    mock.assert_async().await;

    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "calc");
    assert_eq!(tools[0]["server_id"], "child-a");
    assert_eq!(tools[0]["server_name"], "alpha");
}

#[tokio::test]
async fn proxy_forwards_method_body_and_streams_response_back() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/tools/calc/add")
        .match_header("x-broker-request", "true")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"sum": 3}"#)
        .create_async()
        .await;

    let broker = Broker::new();
    broker.register("child-a", &server.url(), "alpha", vec!["calc".to_string()]);

    let response = broker
        .proxy("calc", Method::POST, "/v1/tools/calc/add", None, vec![], Bytes::from_static(b"{}"), "127.0.0.1")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, Bytes::from_static(br#"{"sum": 3}"#));
}

#[tokio::test]
async fn proxy_fails_with_no_healthy_owner_when_tool_is_unclaimed() {
    let broker = Broker::new();
    let err = broker
        .proxy("ghost", Method::POST, "/v1/tools/ghost/run", None, vec![], Bytes::new(), "127.0.0.1")
        .await
        .unwrap_err();
    assert!(matches!(err, toolhost_broker::BrokerError::NoHealthyOwner { .. }));
}
