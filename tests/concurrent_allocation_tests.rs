/// Concurrent allocation tests
///
/// Many tasks allocating from the same counter table at once.
/// Run with: cargo test --test concurrent_allocation_tests

use serialfield::{FieldDescriptor, InstanceDescriptor, SerialConfig, SerialFields};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Barrier;

async fn attached_hooks(bundles: &[&str]) -> Arc<SerialFields> {
    let (backend, hooks) = serialfield::in_memory(SerialConfig::default()).unwrap();
    for bundle in bundles {
        backend.fields.attach("article", bundle, "ticket_no", "serial").await;
        hooks
            .field_instance_created(
                &FieldDescriptor::new("ticket_no", "serial"),
                &InstanceDescriptor::new("article", *bundle, "ticket_no"),
            )
            .await
            .unwrap();
    }
    Arc::new(hooks)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_allocations_are_distinct() {
    let hooks = attached_hooks(&["news"]).await;
    let num_tasks = 16;
    let per_task = 50;
    let barrier = Arc::new(Barrier::new(num_tasks));

    let mut handles = vec![];
    for _ in 0..num_tasks {
        let hooks = Arc::clone(&hooks);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut values = Vec::with_capacity(per_task);
            for _ in 0..per_task {
                values.push(hooks.generate("article", "news", "ticket_no").await.unwrap());
            }
            values
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let values = handle.await.unwrap();
        // Each task observes its own values in increasing order.
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        for value in values {
            assert!(value > 0);
            assert!(seen.insert(value), "value {} handed out twice", value);
        }
    }
    assert_eq!(seen.len(), num_tasks * per_task);
    assert_eq!(hooks.stats().failures, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_concurrent_callers() {
    let hooks = attached_hooks(&["news"]).await;
    let barrier = Arc::new(Barrier::new(3));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let hooks = Arc::clone(&hooks);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                hooks.generate("article", "news", "ticket_no").await.unwrap()
            })
        })
        .collect();

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap());
    }
    values.sort();
    assert_eq!(values, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fields_sequence_independently() {
    let hooks = attached_hooks(&["news", "blog"]).await;

    let mut handles = vec![];
    for bundle in ["news", "blog"] {
        let hooks = Arc::clone(&hooks);
        handles.push(tokio::spawn(async move {
            let mut last = 0;
            for _ in 0..25 {
                last = hooks.generate("article", bundle, "ticket_no").await.unwrap();
            }
            last
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 25);
    }
}
