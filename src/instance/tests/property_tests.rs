//! Property tests for port allocation across many created instances.

use super::support::{harness, id};
use crate::instance::services::CreateInstanceRequest;
use proptest::prelude::*;
use std::collections::BTreeSet;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn ports_of_created_instances_are_disjoint(
        ids in proptest::collection::btree_set(1_i64..=4_553, 1..24)
    ) {
        let context = harness();
        for raw in &ids {
            context
                .service
                .create(CreateInstanceRequest::new().with_instance_id(*raw))
                .expect("creation succeeds");
        }

        let records = context.service.list().expect("list succeeds");
        let mut seen = BTreeSet::new();
        for record in &records {
            for (_, port) in record.ports().iter() {
                prop_assert!(seen.insert(port), "port {port} allocated twice");
            }
        }
        prop_assert_eq!(records.len(), ids.len());
        prop_assert_eq!(seen.len(), ids.len() * 6);
    }

    #[test]
    fn smallest_free_id_is_assigned(
        taken in proptest::collection::btree_set(1_i64..=12, 0..10)
    ) {
        let context = harness();
        for raw in &taken {
            context
                .service
                .create(CreateInstanceRequest::new().with_instance_id(*raw))
                .expect("creation succeeds");
        }

        let record = context
            .service
            .create(CreateInstanceRequest::new())
            .expect("creation succeeds");

        let expected = (1_i64..).find(|candidate| !taken.contains(candidate)).unwrap_or(1);
        prop_assert_eq!(record.instance_id(), id(expected));
    }
}
