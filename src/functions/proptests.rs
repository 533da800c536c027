//! Property-based tests for descriptors and the registry
//!
//! - Provider projection round-trips name, description and parameters
//! - The most recent registration for a name wins
//! - Arguments are applied in object-key insertion order

use super::descriptor::FunctionDescriptor;
use super::registry::{positional_arguments, FunctionRegistry, InvokeOutcome, ToolError};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

// ============================================================================
// Strategies
// ============================================================================

fn arb_name() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{2,20}"
}

/// Parameter schema with 0..5 string properties
fn arb_parameters() -> impl Strategy<Value = Value> {
    proptest::collection::vec(("[a-z_]{1,10}", "[a-zA-Z0-9 ]{1,30}"), 0..5).prop_map(|props| {
        let mut properties = Map::new();
        for (key, description) in props {
            properties.insert(key, json!({"type": "string", "description": description}));
        }
        json!({"type": "object", "properties": properties})
    })
}

fn arb_descriptor() -> impl Strategy<Value = FunctionDescriptor> {
    (
        arb_name(),
        "[a-zA-Z0-9 .,]{1,60}",
        arb_parameters(),
        proptest::option::of(any::<bool>()),
    )
        .prop_map(|(name, description, parameters, strict)| {
            let descriptor = FunctionDescriptor::new(name, description).with_parameters(parameters);
            match strict {
                Some(strict) => descriptor.with_strict(strict),
                None => descriptor,
            }
        })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_provider_projection_round_trips(descriptor in arb_descriptor()) {
        prop_assert!(descriptor.validate().is_ok());
        let tool = descriptor.to_provider_tool();
        prop_assert_eq!(&tool.kind, "function");
        let recovered = FunctionDescriptor::from_provider_tool(&tool);
        prop_assert_eq!(recovered, descriptor);
    }

    #[test]
    fn prop_wire_form_round_trips(descriptor in arb_descriptor()) {
        let parsed = FunctionDescriptor::from_value(&descriptor.to_value()).unwrap();
        prop_assert_eq!(parsed, descriptor);
    }

    #[test]
    fn prop_last_registration_wins(
        names in proptest::collection::vec(prop_oneof![Just("alpha"), Just("beta"), Just("gamma")], 1..12)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let mut registry = FunctionRegistry::new();
        for (i, name) in names.iter().enumerate() {
            registry
                .register(FunctionDescriptor::new(*name, format!("v{i}")), move |_| async move {
                    Ok::<Value, ToolError>(json!(i))
                })
                .unwrap();
        }

        for name in ["alpha", "beta", "gamma"] {
            let last = names.iter().rposition(|n| *n == name);
            let outcome = rt.block_on(registry.invoke(name, &json!({})));
            match last {
                Some(i) => prop_assert_eq!(outcome, InvokeOutcome::Completed(json!(i))),
                None => prop_assert_eq!(outcome, InvokeOutcome::NotFound),
            }
        }

        let mut distinct = names.clone();
        distinct.sort_unstable();
        distinct.dedup();
        prop_assert_eq!(registry.len(), distinct.len());
    }

    #[test]
    fn prop_positional_follows_insertion_order(
        entries in proptest::collection::vec(("[a-z]{1,8}", -1000i64..1000), 0..8)
    ) {
        let mut map = Map::new();
        for (key, value) in &entries {
            map.insert(key.clone(), json!(value));
        }
        let expected: Vec<Value> = map.values().cloned().collect();

        // Round-trip through text keeps key order
        let text = Value::Object(map).to_string();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(positional_arguments(&parsed), expected);
    }
}
