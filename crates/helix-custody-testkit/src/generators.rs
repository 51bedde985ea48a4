//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use helix_custody_core::{
    CapabilityGrant, ContentHash, EntryBuilder, Event, IdentityBuilder, IdentityRecord,
    LedgerEntry, SchemaVersion, StateChange, Timestamp,
};

/// Generate a random ContentHash.
pub fn content_hash() -> impl Strategy<Value = ContentHash> {
    any::<[u8; 32]>().prop_map(ContentHash::from_bytes)
}

/// Generate a schema version this build can encode.
pub fn schema_version() -> impl Strategy<Value = SchemaVersion> {
    prop_oneof![Just(SchemaVersion::V0_3), Just(SchemaVersion::V0_4)]
}

/// Generate a microsecond-precision UTC timestamp.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    (2020u32..=2035, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60, 0u32..1_000_000)
        .prop_map(|(y, mo, d, h, mi, s, us)| {
            Timestamp::from_text(format!(
                "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}Z",
                y, mo, d, h, mi, s, us
            ))
        })
}

/// Free text, including non-ASCII and characters that need escaping.
pub fn text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9_ -]{1,24}",
        "[a-z]{1,8}[\"\\\\\n\t][a-z]{0,8}",
        "\\PC{1,16}",
    ]
}

/// A non-empty identifier.
pub fn name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_-]{0,23}"
}

/// Generate a JSON value with integer numbers only.
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        text().prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(text(), inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Generate an event details object.
pub fn details() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(name(), json_value(), 0..6).prop_map(|m| m.into_iter().collect())
}

/// Generate an event of any kind.
pub fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (name(), name()).prop_map(|(from, to)| Event::StateChange(StateChange::new(from, to))),
        (name(), name(), text(), timestamp()).prop_map(|(from, to, reason, at)| {
            Event::StateChange(StateChange::new(from, to).with_reason(reason, at))
        }),
        (name(), name()).prop_map(|(capability, level)| {
            Event::CapabilityGrant(CapabilityGrant { capability, level })
        }),
        ("[A-Z][A-Z_]{2,20}", details())
            .prop_map(|(event_type, details)| Event::custom(event_type, details)),
    ]
}

/// Parameters for generating an identity and its ledger.
#[derive(Debug, Clone)]
pub struct AgentParams {
    pub custodian_id: String,
    pub agent_name: String,
    pub version: SchemaVersion,
    pub created_at: Timestamp,
    pub events: Vec<(Event, Timestamp)>,
}

impl Arbitrary for AgentParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            name(),
            text().prop_filter("non-blank", |s| !s.trim().is_empty()),
            schema_version(),
            timestamp(),
            prop::collection::vec((event(), timestamp()), 1..8),
        )
            .prop_map(|(custodian_id, agent_name, version, created_at, events)| AgentParams {
                custodian_id,
                agent_name,
                version,
                created_at,
                events,
            })
            .boxed()
    }
}

/// Build the identity and ledger described by `params`.
pub fn ledger_from_params(params: &AgentParams) -> (IdentityRecord, Vec<LedgerEntry>) {
    let identity = IdentityBuilder::new(params.custodian_id.clone(), params.agent_name.clone())
        .version(params.version.clone())
        .timestamp(params.created_at.clone())
        .build()
        .expect("generated identity inputs are valid");

    let mut entries: Vec<LedgerEntry> = Vec::with_capacity(params.events.len());
    for (event, at) in &params.events {
        let entry = EntryBuilder::new(identity.merkle_root, event.clone())
            .previous(entries.last().map(|e| e.entry_hash.clone()))
            .version(params.version.clone())
            .timestamp(at.clone())
            .build()
            .expect("generated events are encodable");
        entries.push(entry);
    }

    (identity, entries)
}

/// Render an object with its keys written in reverse sorted order.
pub fn reversed_object_text(map: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys.reverse();
    let fields: Vec<String> = keys
        .into_iter()
        .map(|k| format!("{}:{}", Value::String(k.clone()), map[k]))
        .collect();
    format!("{{{}}}", fields.join(","))
}
