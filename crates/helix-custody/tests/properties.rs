//! Property tests over generated identities and ledgers.

use helix_custody::core::{
    ledger_from_json, ledger_to_json, verify_identity, verify_ledger, HashRef, IntegrityFailure,
    RecordId, Timestamp,
};
use helix_custody_testkit::generators::{content_hash, ledger_from_params, AgentParams};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Replace the character at `index` (mod length) with one that differs.
fn flip_char(text: &str, index: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return "x".to_string();
    }
    let at = index % chars.len();
    chars
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i != at {
                *c
            } else if *c == 'x' {
                'y'
            } else {
                'x'
            }
        })
        .collect()
}

/// Edit one hashed field of a serialized entry in place.
fn edit_field(entry: &mut Value, field: &str, at: usize) {
    if field != "details" {
        let text = entry[field].as_str().unwrap_or_default().to_string();
        entry[field] = json!(flip_char(&text, at));
        return;
    }

    let details = entry["details"].as_object_mut().unwrap();
    let keys: Vec<String> = details.keys().cloned().collect();
    if keys.is_empty() {
        details.insert("added".into(), Value::Null);
    } else {
        let key = &keys[at % keys.len()];
        let value = details.remove(key).unwrap();
        details.insert(flip_char(key, at), value);
    }
}

proptest! {
    #[test]
    fn prop_generated_agents_verify(params: AgentParams) {
        let (identity, entries) = ledger_from_params(&params);
        prop_assert!(verify_identity(&identity).is_valid());

        let report = verify_ledger(&entries, &identity.merkle_root);
        prop_assert!(report.is_valid());
        prop_assert!(report.tethered());
    }

    #[test]
    fn prop_ledger_survives_json(params: AgentParams) {
        let (identity, entries) = ledger_from_params(&params);
        let reparsed = ledger_from_json(&ledger_to_json(&entries).unwrap()).unwrap();

        prop_assert_eq!(&reparsed, &entries);
        prop_assert!(verify_ledger(&reparsed, &identity.merkle_root).is_valid());
    }

    #[test]
    fn prop_hashed_field_tamper_detected(params: AgentParams, at in any::<usize>()) {
        let (mut identity, _) = ledger_from_params(&params);
        identity.agent_name = flip_char(&identity.agent_name, at);

        let report = verify_identity(&identity);
        prop_assert!(report
            .failures
            .iter()
            .any(|f| matches!(f, IntegrityFailure::ContentTampered { .. })),
            "expected ContentTampered failure");
    }

    #[test]
    fn prop_derived_field_tamper_is_identifier_only(params: AgentParams, at in 4usize..20) {
        let (mut identity, _) = ledger_from_params(&params);
        identity.id = RecordId::from(flip_char(identity.id.as_str(), at));

        let report = verify_identity(&identity);
        prop_assert!(matches!(
            report.failures.as_slice(),
            [IntegrityFailure::IdentifierMismatch { .. }]
        ), "expected exactly one IdentifierMismatch failure");
    }

    #[test]
    fn prop_timestamp_tamper_flags_one_entry(params: AgentParams, pick in any::<prop::sample::Index>()) {
        let (identity, mut entries) = ledger_from_params(&params);
        let k = pick.index(entries.len());
        entries[k].timestamp = Timestamp::from_text(flip_char(entries[k].timestamp.as_str(), 2));

        let report = verify_ledger(&entries, &identity.merkle_root);
        prop_assert_eq!(report.failing_indices(), vec![k]);
    }

    #[test]
    fn prop_previous_tamper_flags_one_entry(
        params: AgentParams,
        pick in any::<prop::sample::Index>(),
        forged in content_hash(),
    ) {
        let (identity, mut entries) = ledger_from_params(&params);
        let k = pick.index(entries.len());
        let forged = HashRef::from(forged);
        prop_assume!(entries[k].previous_hash.as_ref() != Some(&forged));
        entries[k].previous_hash = Some(forged);

        let report = verify_ledger(&entries, &identity.merkle_root);
        prop_assert_eq!(report.failing_indices(), vec![k]);
    }

    #[test]
    fn prop_serialized_field_edit_detected(
        params: AgentParams,
        pick in any::<prop::sample::Index>(),
        field in prop::sample::select(vec![
            "dbc_root", "version", "type", "timestamp", "event_type", "details",
        ]),
        at in any::<usize>(),
    ) {
        let (identity, entries) = ledger_from_params(&params);
        let k = pick.index(entries.len());

        let mut document: Value = serde_json::from_str(&ledger_to_json(&entries).unwrap()).unwrap();
        edit_field(&mut document[k], field, at);
        let edited = ledger_from_json(&document.to_string()).unwrap();

        let report = verify_ledger(&edited, &identity.merkle_root);
        prop_assert_eq!(report.failing_indices(), vec![k]);
        prop_assert!(report.entries[k]
            .failures
            .iter()
            .any(|f| matches!(f, IntegrityFailure::ContentTampered { .. })),
            "expected ContentTampered failure");
    }

    #[test]
    fn prop_reference_case_flip_detected(
        params: AgentParams,
        pick in any::<prop::sample::Index>(),
    ) {
        let (identity, entries) = ledger_from_params(&params);
        let k = pick.index(entries.len());
        let root = identity.merkle_root.to_hex();
        prop_assume!(root != root.to_uppercase());

        let mut document: Value = serde_json::from_str(&ledger_to_json(&entries).unwrap()).unwrap();
        document[k]["dbc_root"] = json!(root.to_uppercase());
        let edited = ledger_from_json(&document.to_string()).unwrap();

        let report = verify_ledger(&edited, &identity.merkle_root);
        prop_assert_eq!(report.failing_indices(), vec![k]);
        prop_assert!(!report.tethered());
    }
}
