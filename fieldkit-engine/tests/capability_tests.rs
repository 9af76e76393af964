//! Integration tests for capability bootstrap
//!
//! Tests cover built-in composition, dependency waits, dropped capabilities
//! and idempotent attachment.

mod helpers;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use fieldkit_common::events::EngineEvent;
use fieldkit_common::{Error, Result};
use fieldkit_engine::capability::address::LOCALITY;
use fieldkit_engine::capability::{
    names, AddressCheckCapability, AutocompleteCapability, Capability, CapabilityLoader,
    CapabilityRegistry,
};
use fieldkit_engine::field::FieldSpec;
use fieldkit_engine::remote::PredictionKind;
use fieldkit_engine::{Orchestrator, Record};
use helpers::{address_record, page, test_config, FakeRemote, ScriptedPresenter};

/// Always fails to attach
struct Broken;

#[async_trait]
impl Capability for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn attach(&self, _record: &Arc<Record>, _loader: &CapabilityLoader) -> Result<()> {
        Err(Error::Internal("boom".to_string()))
    }
}

struct NeedsBroken;

#[async_trait]
impl Capability for NeedsBroken {
    fn name(&self) -> &str {
        "needs_broken"
    }

    fn depends_on(&self) -> &[&'static str] {
        &["broken"]
    }

    async fn attach(&self, _record: &Arc<Record>, _loader: &CapabilityLoader) -> Result<()> {
        Ok(())
    }
}

/// Takes a while, then registers `slow_field`
struct Slow;

#[async_trait]
impl Capability for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    async fn attach(&self, record: &Arc<Record>, _loader: &CapabilityLoader) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        record.register_field(FieldSpec::new("slow_field"));
        Ok(())
    }
}

/// Requires the field registered by `Slow`
struct AfterSlow;

#[async_trait]
impl Capability for AfterSlow {
    fn name(&self) -> &str {
        "after_slow"
    }

    fn depends_on(&self) -> &[&'static str] {
        &["slow"]
    }

    async fn attach(&self, record: &Arc<Record>, _loader: &CapabilityLoader) -> Result<()> {
        if !record.has_field("slow_field") {
            return Err(Error::UnknownField("slow_field".to_string()));
        }
        Ok(())
    }
}

fn custom_page() -> Orchestrator {
    let mut registry = CapabilityRegistry::with_builtins();
    registry.register(Arc::new(Broken));
    registry.register(Arc::new(NeedsBroken));
    registry.register(Arc::new(Slow));
    registry.register(Arc::new(AfterSlow));
    Orchestrator::with_registry(
        test_config(),
        FakeRemote::new(),
        ScriptedPresenter::new(vec![]),
        registry,
    )
}

#[tokio::test]
async fn test_builtin_address_composition() {
    let orchestrator = page(FakeRemote::new(), ScriptedPresenter::new(vec![]));
    let record = address_record(&orchestrator, 0).await;

    assert!(record.is_active());
    assert_eq!(record.loaded_capabilities().len(), 6);
    assert!(record.has_capability(names::ADDRESS_CHECK));
    assert!(AddressCheckCapability::checker(&record).is_some());
    assert!(AutocompleteCapability::pipeline(&record, PredictionKind::Locality).is_some());
    assert!(record.chunk(LOCALITY).is_some());
}

#[tokio::test]
async fn test_unknown_capability_is_dropped() {
    let orchestrator = page(FakeRemote::new(), ScriptedPresenter::new(vec![]));
    let mut events = orchestrator.context().events.subscribe();

    let (record, report) = orchestrator
        .create_record("address", &[names::ADDRESS, "teleport"], 0)
        .await;

    assert_eq!(report.attached, vec![names::ADDRESS.to_string()]);
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].0, "teleport");
    assert!(!record.has_capability("teleport"));

    let mut saw_drop = false;
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::CapabilityDropped { capability, .. } = event {
            assert_eq!(capability, "teleport");
            saw_drop = true;
        }
    }
    assert!(saw_drop);
}

#[tokio::test(start_paused = true)]
async fn test_dependents_of_failed_capability_time_out() {
    let orchestrator = custom_page();

    let (record, report) = orchestrator
        .create_record("custom", &["needs_broken", "broken"], 0)
        .await;

    let dropped: Vec<&str> = report.dropped.iter().map(|(name, _)| name.as_str()).collect();
    assert!(dropped.contains(&"broken"));
    assert!(dropped.contains(&"needs_broken"));
    let reason = &report.dropped.iter().find(|(name, _)| name == "needs_broken").unwrap().1;
    assert!(reason.contains("broken"), "reason: {}", reason);
    assert!(record.loaded_capabilities().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dependent_waits_for_slow_dependency() {
    let orchestrator = custom_page();

    let (record, report) = orchestrator
        .create_record("custom", &["after_slow", "slow"], 0)
        .await;

    assert!(report.is_complete(), "dropped: {:?}", report.dropped);
    assert!(record.has_capability("after_slow"));
    assert!(record.has_field("slow_field"));
}

#[tokio::test]
async fn test_reattach_is_noop() {
    let orchestrator = page(FakeRemote::new(), ScriptedPresenter::new(vec![]));
    let record = address_record(&orchestrator, 0).await;
    record.set_field(LOCALITY, "Berlin").await;

    let report = orchestrator
        .loader()
        .attach(&record, &[names::ADDRESS.to_string()])
        .await;

    assert!(report.attached.is_empty());
    assert!(report.is_complete());
    assert_eq!(record.get_text(LOCALITY), "Berlin");
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_resolves_on_attach() {
    let orchestrator = custom_page();
    let record = Record::new(Arc::clone(orchestrator.context()), "custom", Vec::new(), 0);
    let loader = orchestrator.loader().clone();

    let waiter = {
        let record = Arc::clone(&record);
        let loader = loader.clone();
        tokio::spawn(async move {
            loader
                .wait_for(&record, &["slow"], Duration::from_secs(5))
                .await
        })
    };

    loader.attach(&record, &["slow".to_string()]).await;
    assert!(waiter.await.unwrap().is_ok());
    assert!(loader.has_capability(&record, "slow"));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_times_out() {
    let orchestrator = custom_page();
    let record = Record::new(Arc::clone(orchestrator.context()), "custom", Vec::new(), 0);

    let result = orchestrator
        .loader()
        .wait_for(&record, &["slow"], Duration::from_millis(50))
        .await;
    assert!(matches!(result, Err(Error::Timeout(_))));
}
