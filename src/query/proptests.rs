//! Property-based tests for the matcher and key extraction
//!
//! These pin down the absence semantics: `$exists` sees a present `null`,
//! `$ne` is true on absence, ordering operators are false on absence.

use super::*;
use crate::index::extract_key;
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z]{0,6}".prop_map(Value::String),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_scalar().prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,3}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn arb_document() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-e]", arb_value(), 0..5).prop_map(|m| m.into_iter().collect())
}

fn query(value: Value) -> Query {
    Query::from_value(&value).unwrap()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn exists_true_iff_key_present(doc in arb_document()) {
        let present = doc.contains_key("a");
        let doc = Value::Object(doc);
        prop_assert_eq!(query(json!({"a": {"$exists": true}})).matches(&doc), present);
        prop_assert_eq!(query(json!({"a": {"$exists": false}})).matches(&doc), !present);
    }

    #[test]
    fn ne_is_true_when_absent(mut doc in arb_document(), operand in arb_value()) {
        doc.remove("a");
        let doc = Value::Object(doc);
        let q = query(json!({"a": {"$ne": operand}}));
        prop_assert!(q.matches(&doc));
    }

    #[test]
    fn ordering_is_false_when_absent(mut doc in arb_document(), operand in arb_scalar()) {
        doc.remove("a");
        let doc = Value::Object(doc);
        for op in ["$gt", "$gte", "$lt", "$lte"] {
            let q = query(json!({"a": {op: operand.clone()}}));
            prop_assert!(!q.matches(&doc));
        }
    }

    #[test]
    fn not_complements_direct_match(doc in arb_document(), search in arb_scalar()) {
        let doc = Value::Object(doc);
        let direct = query(json!({"b": search.clone()})).matches(&doc);
        let negated = query(json!({"b": {"$not": search}})).matches(&doc);
        prop_assert_eq!(direct, !negated);
    }

    #[test]
    fn or_of_one_is_identity(doc in arb_document(), search in arb_scalar()) {
        let doc = Value::Object(doc);
        let single = query(json!({"c": search.clone()})).matches(&doc);
        let wrapped = query(json!({"$or": [{"c": search}]})).matches(&doc);
        prop_assert_eq!(single, wrapped);
    }

    #[test]
    fn compiled_query_reserialises_to_equivalent(doc in arb_document(), search in arb_scalar()) {
        let doc = Value::Object(doc);
        let original = query(json!({"a": {"$in": [search.clone()]}, "b": {"$ne": search}}));
        let reparsed = query(original.to_value());
        prop_assert_eq!(original.matches(&doc), reparsed.matches(&doc));
    }

    #[test]
    fn extract_key_ignores_field_order(doc in arb_document(), mut paths in prop::collection::vec("[a-e](\\.[a-e])?", 0..5)) {
        let doc = Value::Object(doc);
        let forward = extract_key(&doc, &paths[..]);
        paths.reverse();
        prop_assert_eq!(forward, extract_key(&doc, &paths[..]));
    }
}
