// tests/allocator_props.rs

use std::collections::HashMap;

use proptest::prelude::*;
use swarmstate::resources::DevicePool;

#[derive(Debug, Clone)]
enum Op {
    Allocate { count: usize, owner: u64 },
    Free { owner: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..5usize, 0..6u64).prop_map(|(count, owner)| Op::Allocate { count, owner }),
        (0..6u64).prop_map(|owner| Op::Free { owner }),
    ]
}

proptest! {
    #[test]
    fn units_are_never_double_booked(
        total in 0..8usize,
        ops in proptest::collection::vec(op_strategy(), 1..40),
    ) {
        let mut pool = DevicePool::new();
        pool.init(total);
        let mut held: HashMap<u64, usize> = HashMap::new();

        for op in ops {
            match op {
                Op::Allocate { count, owner } => {
                    let free_before = pool.free_count();
                    let snapshot = pool.to_string();
                    match pool.allocate(count, owner) {
                        Ok(()) => {
                            prop_assert!(count <= free_before);
                            *held.entry(owner).or_insert(0) += count;
                        }
                        Err(e) => {
                            prop_assert!(e.is_fatal());
                            prop_assert!(count > free_before);
                            // All-or-nothing: a refused request changes nothing.
                            prop_assert_eq!(pool.to_string(), snapshot);
                        }
                    }
                }
                Op::Free { owner } => {
                    let released = pool.free(owner);
                    prop_assert_eq!(released, held.remove(&owner).unwrap_or(0));
                }
            }

            let in_use: usize = held.values().sum();
            prop_assert_eq!(in_use + pool.free_count(), total);
            for (&owner, &count) in &held {
                prop_assert_eq!(pool.held_by(owner).len(), count);
            }
        }
    }

    #[test]
    fn allocation_takes_lowest_free_units(total in 1..8usize, first in 0..8usize) {
        let first = first.min(total);
        let mut pool = DevicePool::new();
        pool.init(total);
        pool.allocate(first, 1).unwrap();
        prop_assert_eq!(pool.held_by(1), (0..first).collect::<Vec<_>>());

        let rest = total - first;
        pool.allocate(rest, 2).unwrap();
        prop_assert_eq!(pool.held_by(2), (first..total).collect::<Vec<_>>());
        prop_assert_eq!(pool.free_count(), 0);
    }
}
