//! Property-based round trips over the JSON-representable plist types.
//!
//! A random tree is written as an XML and as a binary plist, decoded again and
//! encoded to JSON. Floats in the JSON properties are dyadic fractions so that
//! every decimal rendering parses back to the identical `f64`.

mod common;

use common::{BinaryWriter, XmlWriter};
use plist2json::{JsonPolicy, JsonWriter, Plist};
use proptest::prelude::*;
use serde_json::Value;

fn arb_key() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z_][a-zA-Z0-9_.-]{0,12}",
        Just(String::new()),
        Just("with space".to_string()),
        Just("<&>".to_string()),
    ]
}

fn arb_float(dyadic: bool) -> BoxedStrategy<f64> {
    if dyadic {
        (-1_000_000i32..1_000_000)
            .prop_map(|n| f64::from(n) / 64.0)
            .boxed()
    } else {
        any::<f64>()
            .prop_filter("finite", |f| f.is_finite())
            .boxed()
    }
}

fn arb_plist(dyadic: bool) -> impl Strategy<Value = Plist> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(Plist::Boolean),
        any::<i64>().prop_map(|v| Plist::Integer(v.into())),
        any::<u64>().prop_map(|v| Plist::Integer(v.into())),
        arb_float(dyadic).prop_map(Plist::Float),
        "\\PC{0,24}".prop_map(Plist::String),
        Just(Plist::String(" padded\u{00e9} ".to_string())),
    ];
    leaf.prop_recursive(4, 48, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Plist::Array),
            prop::collection::vec((arb_key(), inner), 0..8)
                .prop_map(|entries| Plist::Dictionary(entries.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn xml_encoding_decodes_to_the_same_tree(value in arb_plist(false)) {
        let decoded = Plist::parse(value.to_xml().as_bytes()).unwrap();
        prop_assert_eq!(decoded, value);
    }

    #[test]
    fn binary_encoding_decodes_to_the_same_tree(value in arb_plist(false)) {
        let decoded = Plist::parse(&BinaryWriter::write(&value)).unwrap();
        prop_assert_eq!(decoded, value);
    }

    #[test]
    fn json_parses_back_to_the_tree(value in arb_plist(true)) {
        let expected = value.to_json_value(JsonPolicy::Convert).unwrap();
        for data in [value.to_xml().into_bytes(), BinaryWriter::write(&value)] {
            let json = Plist::parse(&data)
                .unwrap()
                .to_json_string(JsonPolicy::Convert)
                .unwrap();
            prop_assert!(!json.contains('\n'));
            let parsed: Value = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(&parsed, &expected);
        }
    }

    #[test]
    fn encoding_twice_is_byte_identical(value in arb_plist(false)) {
        let first = value.to_json_string(JsonPolicy::Convert).unwrap();
        let second = value.to_json_string(JsonPolicy::Convert).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn representable_trees_never_hit_the_reject_policy(value in arb_plist(false)) {
        prop_assert!(value.to_json_string(JsonPolicy::Reject).is_ok());
    }
}
