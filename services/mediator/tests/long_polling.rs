//! Long-polling delivery: each inbound envelope is emitted as one SSE event.

mod common;

use std::time::Duration;

#[tokio::test]
async fn long_polling_emits_one_event_per_envelope() {
    let stack = common::start_stack().await;
    let uid = common::random_uid();
    let address = format!("redis://{}/{}", stack.redis_host, common::random_uid());
    common::insert_endpoint(&stack.pool, &uid, Some("VERKEY"), None, Some(&address), None).await;

    // Attach the SSE listener first so it does not miss events.
    let sse_url = format!("http://{}/polling?endpoint={}", stack.http_addr, uid);
    let mut sse_response = reqwest::Client::new().get(&sse_url).send().await.unwrap();
    assert_eq!(sse_response.status(), 200);
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let client = reqwest::Client::new();
    for _ in 0..2 {
        let response = client
            .post(common::endpoint_url(stack.http_addr, &uid))
            .header("Content-Type", "application/ssi-agent-wire")
            .body(common::WIRED_CONTENT.to_vec())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 202);
    }

    // Read SSE chunks until both message events show up.
    let mut collected = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_secs(2), sse_response.chunk()).await {
            Ok(Ok(Some(chunk))) => {
                collected.push_str(&String::from_utf8_lossy(&chunk));
                if collected.matches("event: message").count() >= 2 {
                    break;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(e)) => panic!("sse read error: {e}"),
            Err(_) => {}
        }
    }
    assert_eq!(
        collected.matches("event: message").count(),
        2,
        "expected two delivered events, got: {collected}"
    );
}
