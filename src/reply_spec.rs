/*!
 * @file reply_spec.rs
 * @brief The reply-spec grammar test authors write replies in
 */

/// A document the server will send back to the client. Accepts the several
/// shorthands test authors actually write:
///
/// - a full [`bson::Document`]
/// - an integer, treated as the `ok` field (`5.into()` -> `{ok: 5}`)
/// - a bare field name, treated as `{name: 1}`
#[derive(Debug, Clone)]
pub struct ReplySpec(pub bson::Document);

impl ReplySpec {
    pub fn new() -> Self {
        Self(bson::Document::new())
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<bson::Bson>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn ok() -> Self {
        Self::new().field("ok", 1)
    }

    pub fn into_document(self) -> bson::Document {
        self.0
    }
}

impl Default for ReplySpec {
    fn default() -> Self {
        Self::new()
    }
}

impl From<bson::Document> for ReplySpec {
    fn from(doc: bson::Document) -> Self {
        Self(doc)
    }
}

impl From<i32> for ReplySpec {
    fn from(ok_value: i32) -> Self {
        Self::new().field("ok", ok_value)
    }
}

impl From<&str> for ReplySpec {
    fn from(field_name: &str) -> Self {
        Self::new().field(field_name, 1)
    }
}
