use serde::Serialize;
use serde_json::Value;

/// Anything a chronicler can archive.
///
/// Records are turned into JSON once, at submission; the chronicler keeps the
/// serialized text and never holds on to the record itself.
pub trait Record {
    fn to_json(&self) -> serde_json::Result<Value>;
}

impl<T: Serialize + ?Sized> Record for T {
    fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

pub(crate) fn serialize_record<R: Record + ?Sized>(record: &R) -> serde_json::Result<String> {
    let value = record.to_json()?;
    serde_json::to_string(&value)
}
