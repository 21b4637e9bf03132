// Property-based tests for key normalization, filter masks, and match marking.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::HashSet;

use proptest::prelude::*;
use waybill_core::{Table, Value};
use waybill_recon::config::ReconcileOptions;
use waybill_recon::filter::{filter_mask, Condition, Operator};
use waybill_recon::{mark, normalize_key, normalize_system_key, reconcile};

const SENTINEL: &str = "无效单号";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Tracking numbers drawn from a small pool so collisions are common.
fn arb_key() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => r"110500[0-9]",
        1 => Just("0".to_string()),
        1 => Just("".to_string()),
        1 => r" 110500[0-9] ",
    ]
}

fn arb_cell() -> impl Strategy<Value = Value> {
    prop_oneof![
        2 => (0i64..50).prop_map(Value::from),
        2 => prop_oneof![Just("已完成"), Just("已关闭"), Just("10"), Just("x")].prop_map(Value::text),
        1 => Just(Value::Empty),
    ]
}

fn key_table(keys: &[String]) -> Table {
    let rows = keys
        .iter()
        .enumerate()
        .map(|(i, k)| vec![Value::from(k.as_str()), Value::Number(i as f64)])
        .collect();
    Table::from_rows(vec!["快递单号".into(), "行".into()], rows).unwrap()
}

fn arb_condition() -> impl Strategy<Value = Condition> {
    prop_oneof![
        arb_cell().prop_map(Condition::Equals),
        prop::collection::vec(arb_cell(), 0..3).prop_map(Condition::NotIn),
        arb_cell().prop_map(|v| Condition::Compare(Operator::Gt, v)),
        arb_cell().prop_map(|v| Condition::Compare(Operator::Ne, v)),
    ]
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn normalization_ignores_surrounding_whitespace(s in r"[0-9A-Z]{0,12}", pad in r"[ \t]{0,3}") {
        let padded = Value::from(format!("{pad}{s}{pad}"));
        let plain = Value::from(s.as_str());
        prop_assert_eq!(normalize_key(&padded), normalize_key(&plain));
        prop_assert_eq!(
            normalize_system_key(&padded, SENTINEL),
            normalize_system_key(&plain, SENTINEL)
        );
    }

    #[test]
    fn mask_is_conjunction_of_single_masks(
        cells in prop::collection::vec((arb_cell(), arb_cell()), 0..20),
        c1 in arb_condition(),
        c2 in arb_condition(),
    ) {
        let rows = cells.into_iter().map(|(a, b)| vec![a, b]).collect();
        let table = Table::from_rows(vec!["a".into(), "b".into()], rows).unwrap();

        let both = filter_mask(&table, &[("a".into(), c1.clone()), ("b".into(), c2.clone())]).unwrap();
        let only_a = filter_mask(&table, &[("a".into(), c1)]).unwrap();
        let only_b = filter_mask(&table, &[("b".into(), c2)]).unwrap();

        let expected: Vec<bool> = only_a.iter().zip(&only_b).map(|(x, y)| *x && *y).collect();
        prop_assert_eq!(both, expected);
    }

    #[test]
    fn matched_and_system_only_partition_system_keys(
        sys in prop::collection::vec(arb_key(), 0..25),
        car in prop::collection::vec(arb_key(), 0..25),
    ) {
        let marking = mark(&key_table(&sys), &key_table(&car), "快递单号", SENTINEL).unwrap();

        let system_keys: HashSet<String> = sys.iter().map(|k| normalize_system_key(&Value::from(k.as_str()), SENTINEL)).collect();
        let carrier_keys: HashSet<String> = car.iter().map(|k| normalize_key(&Value::from(k.as_str()))).collect();

        let matched: HashSet<String> = marking
            .matched_all
            .column_values("快递单号")
            .unwrap()
            .into_iter()
            .map(|v| normalize_system_key(v, SENTINEL))
            .collect();
        let system_only: HashSet<String> = system_keys.difference(&carrier_keys).cloned().collect();

        prop_assert!(matched.is_disjoint(&system_only));
        let union: HashSet<String> = matched.union(&system_only).cloned().collect();
        prop_assert_eq!(union, system_keys);

        // The sentinel never matches because carrier keys are not remapped
        prop_assert!(!matched.contains(SENTINEL) || carrier_keys.contains(SENTINEL));
        prop_assert_eq!(marking.system_rows.len(), marking.matched_all.len());
    }

    #[test]
    fn reconcile_is_deterministic_and_source_ordered(
        sys in prop::collection::vec(arb_key(), 0..25),
        car in prop::collection::vec(arb_key(), 0..25),
    ) {
        let options = ReconcileOptions::new(vec!["快递单号".into(), "行".into()]);
        let first = reconcile(&key_table(&sys), &key_table(&car), &options).unwrap();
        let second = reconcile(&key_table(&sys), &key_table(&car), &options).unwrap();
        prop_assert_eq!(&first, &second);

        let mut sorted = first.marking.system_rows.clone();
        sorted.sort_unstable();
        prop_assert_eq!(&sorted, &first.marking.system_rows);

        if let Some(matched) = first.matched_table() {
            prop_assert_eq!(matched.columns().len(), 3);
            prop_assert_eq!(&matched.columns()[0], "序号");
        }
    }
}
