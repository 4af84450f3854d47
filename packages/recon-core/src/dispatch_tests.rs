//! End-to-end dispatch tests: seed, modules, queue, outputs.

use std::sync::Arc;

use crate::error::{EmitError, ModuleError};
use crate::event::{Event, EventType};
use crate::output::OutputDispatcher;
use crate::queue::EventQueue;
use crate::registry::ModuleRegistry;
use crate::testing::{dns_seed, RecordingOutput, StaticModule};

#[tokio::test]
async fn test_single_hop_reaches_outputs() {
    let (queue, mut receiver) = EventQueue::new();
    let mut registry = ModuleRegistry::new(queue);
    registry
        .register(Arc::new(
            StaticModule::new("static").emitting(["www.example.com", "example.com"]),
        ))
        .unwrap();
    registry.setup_all().await;

    let recorder = Arc::new(RecordingOutput::new("recorder"));
    let outputs = OutputDispatcher::new().with_output(recorder.clone());

    let seed = dns_seed("example.com");
    outputs.dispatch(seed.clone()).await;
    assert_eq!(registry.dispatch(seed.clone()).await.unwrap(), 1);

    for event in receiver.drain() {
        outputs.dispatch(event).await;
    }
    outputs.finish().await;

    // The module's "example.com" repeats its source and is never emitted
    assert_eq!(recorder.values(), vec!["example.com", "www.example.com"]);
    let discovered = &recorder.events()[1];
    assert_eq!(discovered.source().unwrap().id, seed.id());
    assert_eq!(discovered.scope_distance(), 1);
    assert!(recorder.is_finished());
}

#[tokio::test]
async fn test_internal_events_reach_modules_not_outputs() {
    let (queue, _receiver) = EventQueue::new();
    let watcher = Arc::new(StaticModule::new("watcher"));
    let mut registry = ModuleRegistry::new(queue);
    registry.register(watcher.clone()).unwrap();

    let recorder = Arc::new(RecordingOutput::new("recorder"));
    let outputs = OutputDispatcher::new().with_output(recorder.clone());

    let source = Event::seed("example.com", EventType::DNS_NAME);
    let internal = Arc::new(
        Event::child("internal.example.com", EventType::DNS_NAME, &source, "other").internal(),
    );

    registry.dispatch(internal.clone()).await.unwrap();
    outputs.dispatch(internal).await;

    assert_eq!(watcher.handled(), 1);
    assert!(recorder.values().is_empty());
}

#[tokio::test]
async fn test_contract_violation_aborts_dispatch() {
    let (queue, mut receiver) = EventQueue::new();
    let mut registry = ModuleRegistry::new(queue);
    registry
        .register(Arc::new(
            StaticModule::new("broken")
                .emitting(["https://example.com/"])
                .emitting_as(EventType::new("URL")),
        ))
        .unwrap();
    registry
        .register(Arc::new(StaticModule::new("fine").emitting(["www.example.com"])))
        .unwrap();

    let err = registry.dispatch(dns_seed("example.com")).await.unwrap_err();

    assert!(matches!(
        err,
        ModuleError::Emit(EmitError::UndeclaredEventType { ref module, .. }) if module == "broken"
    ));
    // The well-behaved module still ran
    assert_eq!(receiver.drain().len(), 1);
}

#[tokio::test]
async fn test_failing_module_does_not_stop_others() {
    let (queue, mut receiver) = EventQueue::new();
    let mut registry = ModuleRegistry::new(queue);
    registry
        .register(Arc::new(StaticModule::new("failing").failing()))
        .unwrap();
    registry
        .register(Arc::new(StaticModule::new("fine").emitting(["www.example.com"])))
        .unwrap();

    assert_eq!(registry.dispatch(dns_seed("example.com")).await.unwrap(), 1);
    assert_eq!(receiver.drain().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatch_to_one_module() {
    let (queue, mut receiver) = EventQueue::new();
    let module = Arc::new(StaticModule::new("static").emitting(["found.example.net"]));
    let registry = {
        let mut registry = ModuleRegistry::new(queue);
        registry.register(module.clone()).unwrap();
        Arc::new(registry)
    };

    let mut handles = Vec::new();
    for i in 0..8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry
                .dispatch(dns_seed(&format!("host{i}.example.com")))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 1);
    }

    assert_eq!(module.handled(), 8);
    assert_eq!(receiver.drain().len(), 8);
}
