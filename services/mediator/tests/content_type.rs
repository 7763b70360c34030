//! An unsupported content type is rejected up front with no side effects.

mod common;

#[tokio::test]
async fn unsupported_content_type_is_rejected() {
    let stack = common::start_stack().await;
    let uid = common::random_uid();
    let address = format!("redis://{}/{}", stack.redis_host, common::random_uid());
    common::insert_endpoint(&stack.pool, &uid, Some("VERKEY"), None, Some(&address), None).await;

    let response = reqwest::Client::new()
        .post(common::endpoint_url(stack.http_addr, &uid))
        .header("Content-Type", "application/invalid-type")
        .body(common::WIRED_CONTENT.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 415);

    // The stored binding is untouched.
    let endpoint = mediator::repo::endpoints::load_endpoint(&stack.pool, &uid)
        .await
        .unwrap()
        .expect("endpoint row should still exist");
    assert_eq!(endpoint.pub_sub_address.as_deref(), Some(address.as_str()));
}

#[tokio::test]
async fn unknown_endpoint_is_not_found() {
    let stack = common::start_stack().await;
    let response = reqwest::Client::new()
        .post(common::endpoint_url(stack.http_addr, "no-such-endpoint"))
        .header("Content-Type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
