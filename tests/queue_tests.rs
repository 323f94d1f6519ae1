//! Correlation queue behavior across memory and spill tiers.

use std::sync::Arc;

use colbridge::{Decimal, HybridRowQueue, Row, TaskContext, Value};
use proptest::prelude::*;
use tempfile::TempDir;

fn row(i: i64) -> Row {
    Row::new(vec![Value::Int64(i), Value::String(format!("payload-{i}"))])
}

#[test]
fn test_mixed_value_types_survive_spill() {
    let temp = TempDir::new().unwrap();
    // A budget this small forces every record straight to disk.
    let ctx = Arc::new(TaskContext::new(1, 8, temp.path()));
    let mut queue = HybridRowQueue::new(Arc::clone(&ctx));

    let rows = vec![
        Row::new(vec![Value::Null, Value::Bool(true)]),
        Row::new(vec![
            Value::Decimal(Decimal::new(-98765, 12, 3)),
            Value::Float64(2.5),
        ]),
        Row::new(vec![
            Value::Binary(vec![0, 255, 7]),
            Value::List(vec![Value::Int64(1), Value::Null]),
        ]),
        Row::new(vec![Value::Struct(vec![
            Value::String(String::new()),
            Value::Int32(-1),
        ])]),
    ];
    for r in &rows {
        queue.add(r).unwrap();
    }
    assert!(queue.has_spilled());
    for r in &rows {
        assert_eq!(&queue.remove().unwrap(), r);
    }
    queue.close().unwrap();
    assert_eq!(ctx.memory().used(), 0);
}

#[test]
fn test_budget_is_never_exceeded() {
    let temp = TempDir::new().unwrap();
    let budget = 1024;
    let ctx = Arc::new(TaskContext::new(2, budget, temp.path()));
    let mut queue = HybridRowQueue::with_page_size(Arc::clone(&ctx), 256);
    for i in 0..300 {
        queue.add(&row(i)).unwrap();
        assert!(ctx.memory().used() <= budget);
    }
    for i in 0..300 {
        assert_eq!(queue.remove().unwrap(), row(i));
        assert!(ctx.memory().used() <= budget);
    }
    queue.close().unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Any interleaving of adds and removes, under any budget, drains in
    /// insertion order and leaves no spill file behind.
    #[test]
    fn prop_fifo_under_arbitrary_interleaving(
        budget in prop_oneof![Just(0usize), 32usize..4096],
        page_size in 32usize..512,
        ops in proptest::collection::vec(0u8..4, 1..200),
    ) {
        let temp = TempDir::new().unwrap();
        let ctx = Arc::new(TaskContext::new(3, budget, temp.path()));
        let mut queue = HybridRowQueue::with_page_size(Arc::clone(&ctx), page_size);

        let mut next_add = 0i64;
        let mut next_remove = 0i64;
        for op in ops {
            // Bias toward adds so the queue actually grows.
            if op < 3 {
                queue.add(&row(next_add)).unwrap();
                next_add += 1;
            } else if next_remove < next_add {
                prop_assert_eq!(queue.remove().unwrap(), row(next_remove));
                next_remove += 1;
            }
        }
        while next_remove < next_add {
            prop_assert_eq!(queue.remove().unwrap(), row(next_remove));
            next_remove += 1;
        }

        prop_assert!(queue.is_empty());
        queue.close().unwrap();
        prop_assert_eq!(ctx.memory().used(), 0);
        prop_assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
