//! End-to-end engine flows: fact ingestion, policy binding, and driving
//! bound models to completion through agent events.

use anvil_engine::binder::PolicyBinder;
use anvil_engine::broker::{AgentBroker, BrokerRegistry, BrokerResult};
use anvil_engine::config::EngineConfig;
use anvil_engine::error::EngineError;
use anvil_engine::machine::ModelStateMachine;
use anvil_engine::policy::{PolicyRule, RuleSet};
use anvil_engine::store::MemoryStore;
use anvil_engine::tag::{FactMap, TagMatcher};
use anvil_engine::template::{ModelTemplate, TemplateSet, Transition};
use anvil_engine::types::{BrokerKind, Comparator, HookKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("anvil_engine=debug")
        .with_test_writer()
        .try_init();
}

struct AlwaysOkBroker;

#[async_trait]
impl AgentBroker for AlwaysOkBroker {
    async fn mk_call(&self, _node_id: Uuid, _model_id: Uuid) -> BrokerResult {
        Ok(())
    }

    async fn boot_call(&self, _node_id: Uuid, _model_id: Uuid) -> BrokerResult {
        Ok(())
    }
}

fn facts(pairs: &[(&str, &str)]) -> FactMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn ubuntu_template() -> ModelTemplate {
    ModelTemplate::new("ubuntu", "init", "os_complete")
        .with_broker(BrokerKind::Agent)
        .with_transition("init", "start", Transition::to("booting"))
        .with_transition(
            "booting",
            "complete",
            Transition::to("os_complete").with_hook(HookKind::BootCall),
        )
}

fn deploy_rules() -> RuleSet {
    RuleSet::new(vec![
        PolicyRule::new(1, "big-linux", "linux_deploy", "ubuntu")
            .with_matcher(TagMatcher::new("os", Comparator::Equal, "linux"))
            .with_matcher(TagMatcher::new("memory_mb", Comparator::GreaterThan, "4096")),
        PolicyRule::new(2, "any-linux", "linux_deploy", "ubuntu")
            .with_matcher(TagMatcher::new("os", Comparator::Equal, "linux")),
    ])
}

fn engine() -> (PolicyBinder, ModelStateMachine) {
    init_tracing();
    let templates = Arc::new(TemplateSet::new(vec![ubuntu_template()]));
    let store = Arc::new(MemoryStore::new());
    let binder = PolicyBinder::new(deploy_rules(), templates.clone(), store.clone()).unwrap();
    let machine = ModelStateMachine::new(
        templates,
        BrokerRegistry::new().with_broker(BrokerKind::Agent, Arc::new(AlwaysOkBroker)),
        store,
        &EngineConfig::new(Duration::from_secs(5)),
    )
    .unwrap();
    (binder, machine)
}

#[tokio::test]
async fn discover_bind_and_provision_to_completion() {
    let (binder, machine) = engine();
    let node = Uuid::new_v4();

    binder
        .checkin(node, facts(&[("os", "linux"), ("memory_mb", "8192")]))
        .await
        .unwrap();
    let bound = binder
        .bind(node, facts(&[("os", "linux"), ("memory_mb", "8192")]))
        .await
        .unwrap();

    binder.advance(&machine, node, "start").await.unwrap();
    binder.advance(&machine, node, "complete").await.unwrap();

    let model = bound.model.lock().await;
    assert_eq!(model.current_state, "os_complete");
    assert_eq!(model.log.len(), 2);
    assert!(model.log.entries()[1].timestamp >= model.log.entries()[0].timestamp);
    drop(model);

    // The node record observed each state the model reached.
    let record = binder.node(node).await.unwrap();
    assert_eq!(record.last_state.as_deref(), Some("os_complete"));

    // Terminal state: further events are rejected and the log stays put.
    let err = machine.advance_bound(&bound, "start").await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyComplete { .. }));
    assert_eq!(bound.model.lock().await.log.len(), 2);
}

#[tokio::test]
async fn ordering_tie_break_prefers_lowest_line_number() {
    init_tracing();
    let rules = deploy_rules();
    let big_linux = rules.rules_in_order()[0].id;
    let templates = Arc::new(TemplateSet::new(vec![ubuntu_template()]));
    let binder = PolicyBinder::new(rules, templates, Arc::new(MemoryStore::new())).unwrap();

    // Both rules match; the rule at order 1 must govern.
    let bound = binder
        .bind(Uuid::new_v4(), facts(&[("os", "linux"), ("memory_mb", "16384")]))
        .await
        .unwrap();
    assert_eq!(bound.policy_id, big_linux);
}

#[tokio::test]
async fn independent_nodes_provision_in_parallel() {
    let (binder, machine) = engine();
    let binder = Arc::new(binder);
    let machine = Arc::new(machine);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let binder = binder.clone();
        let machine = machine.clone();
        handles.push(tokio::spawn(async move {
            let node = Uuid::new_v4();
            let bound = binder.bind(node, facts(&[("os", "linux")])).await?;
            machine.advance_bound(&bound, "start").await?;
            machine.advance_bound(&bound, "complete").await?;
            Ok::<String, EngineError>(bound.current_state().await)
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "os_complete");
    }
}

#[tokio::test]
async fn reloaded_rule_set_reproduces_binding_decision() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("policies.yaml");
    let rules = deploy_rules();
    rules.save(&path).unwrap();
    let reloaded = RuleSet::load(&path).unwrap();

    let templates = Arc::new(TemplateSet::new(vec![ubuntu_template()]));
    let store = Arc::new(MemoryStore::new());
    let binder_a =
        PolicyBinder::new(rules, templates.clone(), store.clone()).unwrap();
    let binder_b = PolicyBinder::new(reloaded, templates, store).unwrap();

    let f = facts(&[("os", "linux"), ("memory_mb", "2048")]);
    let a = binder_a.bind(Uuid::new_v4(), f.clone()).await.unwrap();
    let b = binder_b.bind(Uuid::new_v4(), f).await.unwrap();
    // Same rule governs the same facts after a round trip through disk.
    assert_eq!(a.policy_id, b.policy_id);
}
