//! Key/value resources and data sources against the fake agent.

mod common;

use common::{config, TestConsul};
use consul_provider::provider;
use provider_core::ErrorKind;
use serde_json::json;
use std::collections::BTreeMap;

fn kv(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[tokio::test]
async fn key_prefix_refuses_an_occupied_prefix() {
    let t = TestConsul::start().await;
    let p = provider();
    t.fake.store().put_key("app/x", "old");
    let desired = config(json!({"path_prefix": "app/", "subkeys": {"y": "1", "z": "2"}}));

    let err = p
        .create(&t.ctx, "consul_key_prefix", desired.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(t.fake.store().key_values("app/"), kv(&[("app/x", "old")]));

    t.fake.store().kv.remove("app/x");
    let state = p.create(&t.ctx, "consul_key_prefix", desired).await.unwrap();
    assert_eq!(state.id, "app/");
    assert_eq!(state.attributes["subkeys"], json!({"y": "1", "z": "2"}));
    assert_eq!(
        t.fake.store().key_values("app/"),
        kv(&[("app/y", "1"), ("app/z", "2")])
    );
}

#[tokio::test]
async fn key_prefix_update_prunes_dropped_subkeys() {
    let t = TestConsul::start().await;
    let p = provider();
    let state = p
        .create(
            &t.ctx,
            "consul_key_prefix",
            config(json!({"path_prefix": "app/", "subkeys": {"y": "1", "z": "2"}})),
        )
        .await
        .unwrap();

    let desired = config(json!({"path_prefix": "app/", "subkeys": {"y": "1", "w": "3"}}));
    let plan = p.plan("consul_key_prefix", Some(&state), &desired).unwrap();
    assert!(!plan.is_noop());

    let state = p.update(&t.ctx, "consul_key_prefix", state, desired.clone()).await.unwrap();
    assert_eq!(
        t.fake.store().key_values("app/"),
        kv(&[("app/w", "3"), ("app/y", "1")])
    );
    assert!(p.plan("consul_key_prefix", Some(&state), &desired).unwrap().is_noop());

    p.delete(&t.ctx, "consul_key_prefix", state).await.unwrap();
    assert!(t.fake.store().key_values("app/").is_empty());
}

#[tokio::test]
async fn key_prefix_reports_keys_added_out_of_band() {
    let t = TestConsul::start().await;
    let p = provider();
    let desired = config(json!({"path_prefix": "app/", "subkeys": {"y": "1"}}));
    let state = p.create(&t.ctx, "consul_key_prefix", desired.clone()).await.unwrap();

    t.fake.store().put_key("app/intruder", "x");
    let observed = p.read(&t.ctx, "consul_key_prefix", state).await.unwrap().unwrap();
    assert_eq!(observed.attributes["subkeys"], json!({"intruder": "x", "y": "1"}));

    let plan = p.plan("consul_key_prefix", Some(&observed), &desired).unwrap();
    assert!(!plan.is_noop());
    let outcome = p
        .reconcile(&t.ctx, "consul_key_prefix", Some(observed), desired)
        .await
        .unwrap();
    assert!(!outcome.plan.is_noop());
    // the prior state listed the intruder, so the update removes it
    assert_eq!(t.fake.store().key_values("app/"), kv(&[("app/y", "1")]));
}

#[tokio::test]
async fn keys_resource_writes_reads_and_deletes() {
    let t = TestConsul::start().await;
    let p = provider();
    t.fake.store().put_key("shared/existing", "there");
    let desired = config(json!({
        "key": [
            {"path": "svc/port", "value": "8080", "delete": true},
            {"name": "missing", "path": "svc/unset", "default": "fallback"},
            {"name": "existing", "path": "shared/existing"}
        ]
    }));

    let state = p.create(&t.ctx, "consul_keys", desired.clone()).await.unwrap();
    assert_eq!(state.id, "consul");
    assert_eq!(state.attributes["datacenter"], json!("dc1"));
    assert_eq!(
        state.attributes["var"],
        json!({"existing": "there", "missing": "fallback"})
    );
    assert_eq!(t.fake.store().key_values("svc/"), kv(&[("svc/port", "8080")]));
    assert!(p.plan("consul_keys", Some(&state), &desired).unwrap().is_noop());

    // drift on a managed key shows up in the plan
    t.fake.store().put_key("svc/port", "9090");
    let observed = p.read(&t.ctx, "consul_keys", state).await.unwrap().unwrap();
    assert!(!p.plan("consul_keys", Some(&observed), &desired).unwrap().is_noop());

    p.delete(&t.ctx, "consul_keys", observed).await.unwrap();
    assert!(t.fake.store().key_values("svc/").is_empty());
    assert_eq!(
        t.fake.store().key_values("shared/"),
        kv(&[("shared/existing", "there")])
    );
}

#[tokio::test]
async fn keys_cas_mismatch_is_a_conflict() {
    let t = TestConsul::start().await;
    let p = provider();
    t.fake.store().put_key("svc/port", "8080");
    let err = p
        .create(
            &t.ctx,
            "consul_keys",
            config(json!({"key": [{"path": "svc/port", "value": "9090", "cas": 99999}]})),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(t.fake.store().key_values("svc/"), kv(&[("svc/port", "8080")]));
}

#[tokio::test]
async fn keys_data_source_defaults_and_missing_keys() {
    let t = TestConsul::start().await;
    let p = provider();
    t.fake.store().put_key("cfg/a", "1");

    let found = p
        .read_data_source(
            &t.ctx,
            "consul_keys",
            config(json!({"key": [
                {"name": "a", "path": "cfg/a"},
                {"name": "b", "path": "cfg/b", "default": "2"}
            ]})),
        )
        .await
        .unwrap();
    assert_eq!(found.attributes["var"], json!({"a": "1", "b": "2"}));

    let err = p
        .read_data_source(
            &t.ctx,
            "consul_keys",
            config(json!({
                "error_on_missing_keys": true,
                "key": [{"name": "c", "path": "cfg/c"}]
            })),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn key_prefix_data_source_lists_relative_paths() {
    let t = TestConsul::start().await;
    let p = provider();
    t.fake.store().put_key("cfg/a", "1");
    t.fake.store().put_key("cfg/nested/b", "2");

    let found = p
        .read_data_source(
            &t.ctx,
            "consul_key_prefix",
            config(json!({
                "path_prefix": "cfg/",
                "subkey": [
                    {"name": "b", "path": "nested/b"},
                    {"name": "z", "path": "z", "default": "none"}
                ]
            })),
        )
        .await
        .unwrap();
    assert_eq!(found.id, "cfg/");
    assert_eq!(found.attributes["subkeys"], json!({"a": "1", "nested/b": "2"}));
    assert_eq!(found.attributes["var"], json!({"b": "2", "z": "none"}));
}
