use serde::{Deserialize, Serialize};

/// An event emitted by a committed chain-native transaction, as reported by
/// `query tx`. Attributes keep their emission order.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct TxEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

/// First attribute value matching event type + attribute key, scanning events
/// in order. This is how `code_id`, `_contract_address` and `pool_id` are
/// pulled out of receipts.
#[must_use]
pub fn event_attribute<'a>(events: &'a [TxEvent], kind: &str, key: &str) -> Option<&'a str> {
    events
        .iter()
        .filter(|event| event.kind == kind)
        .flat_map(|event| &event.attributes)
        .find(|attribute| attribute.key == key)
        .map(|attribute| attribute.value.as_str())
}
