//! Persistence-layer contracts: partial upserts keep stored values, lookups
//! work by DID and verkey, endpoint rows join their agent's FCM device id.

mod common;

use serde_json::json;

use mediator::repo::{agents, endpoints};

#[tokio::test]
async fn agent_ops() {
    let stack = common::start_stack().await;
    let did = common::random_uid();

    agents::ensure_agent_exists(&stack.pool, &did, "VERKEY1", None, None)
        .await
        .unwrap();
    let agent = agents::load_agent(&stack.pool, &did)
        .await
        .unwrap()
        .expect("agent should be stored");
    assert!(!agent.id.is_empty());
    assert_eq!(agent.did.as_deref(), Some(did.as_str()));
    assert_eq!(agent.verkey.as_deref(), Some("VERKEY1"));
    assert_eq!(agent.metadata, None);

    // Unknown agent resolves to nothing.
    assert!(agents::load_agent(&stack.pool, "invalid-did")
        .await
        .unwrap()
        .is_none());

    // Verkey updates follow the caller.
    agents::ensure_agent_exists(&stack.pool, &did, "VERKEY2", None, None)
        .await
        .unwrap();
    let agent = agents::load_agent(&stack.pool, &did).await.unwrap().unwrap();
    assert_eq!(agent.verkey.as_deref(), Some("VERKEY2"));

    // Metadata is set once and survives later upserts that omit it.
    let metadata = json!({"key1": "value1", "key2": 111});
    agents::ensure_agent_exists(&stack.pool, &did, "VERKEY2", Some(&metadata), None)
        .await
        .unwrap();
    agents::ensure_agent_exists(&stack.pool, &did, "VERKEY2", None, None)
        .await
        .unwrap();
    let agent = agents::load_agent(&stack.pool, &did).await.unwrap().unwrap();
    assert_eq!(agent.metadata, Some(metadata));

    // FCM device id attaches the same way.
    agents::ensure_agent_exists(&stack.pool, &did, "VERKEY2", None, Some("fcm-device-1"))
        .await
        .unwrap();
    let agent = agents::load_agent(&stack.pool, &did).await.unwrap().unwrap();
    assert_eq!(agent.fcm_device_id.as_deref(), Some("fcm-device-1"));

    // Lookup via verkey finds the same row.
    let via_verkey = agents::load_agent_via_verkey(&stack.pool, "VERKEY2")
        .await
        .unwrap()
        .expect("agent should resolve via verkey");
    assert_eq!(via_verkey.id, agent.id);
}

#[tokio::test]
async fn endpoint_ops() {
    let stack = common::start_stack().await;
    let uid = common::random_uid();
    let address = format!("redis://{}/{}", stack.redis_host, common::random_uid());

    endpoints::ensure_endpoint_exists(&stack.pool, &uid, None, None, Some(&address), None)
        .await
        .unwrap();
    let endpoint = endpoints::load_endpoint(&stack.pool, &uid)
        .await
        .unwrap()
        .expect("endpoint should be stored");
    assert_eq!(endpoint.uid, uid);
    assert_eq!(endpoint.agent_id, None);
    assert_eq!(endpoint.pub_sub_address.as_deref(), Some(address.as_str()));

    // Attaching an agent later keeps the stored pub/sub binding.
    let agent_id = common::random_uid();
    endpoints::ensure_endpoint_exists(&stack.pool, &uid, None, Some(&agent_id), None, None)
        .await
        .unwrap();
    let endpoint = endpoints::load_endpoint(&stack.pool, &uid).await.unwrap().unwrap();
    assert_eq!(endpoint.agent_id.as_deref(), Some(agent_id.as_str()));
    assert_eq!(endpoint.pub_sub_address.as_deref(), Some(address.as_str()));

    // An FCM device id given with the agent id surfaces through the join.
    endpoints::ensure_endpoint_exists(
        &stack.pool,
        &uid,
        None,
        Some(&agent_id),
        None,
        Some("device-42"),
    )
    .await
    .unwrap();
    let endpoint = endpoints::load_endpoint(&stack.pool, &uid).await.unwrap().unwrap();
    assert_eq!(endpoint.fcm_device_id.as_deref(), Some("device-42"));

    // Routing keys come back in insertion order.
    endpoints::add_routing_key(&stack.pool, &uid, "KEY-A").await.unwrap();
    endpoints::add_routing_key(&stack.pool, &uid, "KEY-B").await.unwrap();
    let keys = endpoints::list_routing_keys(&stack.pool, &uid).await.unwrap();
    assert_eq!(keys, vec!["KEY-A", "KEY-B"]);
}
