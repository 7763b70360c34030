//! An unreachable broker triggers the rotation pass: the POST reports the
//! recipient inactive and the endpoint is rehomed to a live broker with the
//! channel-name suffix preserved.

mod common;

#[tokio::test]
async fn unreachable_broker_rehomes_endpoint() {
    let stack = common::start_stack().await;
    let uid = common::random_uid();
    let channel = common::random_uid();
    // Port 1 refuses connections immediately.
    let unreachable = format!("redis://127.0.0.1:1/{channel}");
    common::insert_endpoint(
        &stack.pool,
        &uid,
        Some("VERKEY"),
        None,
        Some(&unreachable),
        None,
    )
    .await;

    let response = reqwest::Client::new()
        .post(common::endpoint_url(stack.http_addr, &uid))
        .header("Content-Type", "application/ssi-agent-wire")
        .body(common::WIRED_CONTENT.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 410);

    let endpoint = mediator::repo::endpoints::load_endpoint(&stack.pool, &uid)
        .await
        .unwrap()
        .expect("endpoint row should survive rotation");
    let stored = endpoint.pub_sub_address.expect("address must stay bound");
    assert_ne!(stored, unreachable);
    assert_eq!(stored, format!("redis://{}/{}", stack.redis_host, channel));
}
