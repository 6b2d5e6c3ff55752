/*!
 * @file pattern.rs
 * @brief Request/reply pattern matching
 */

use crate::request::Request;
use indexmap::IndexMap;

/// The broad family of opcodes a pattern can restrict to. `Command` is a
/// convenience that accepts either a `.$cmd` legacy query or an OP_MSG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Query,
    Insert,
    Update,
    Delete,
    GetMore,
    KillCursors,
    Msg,
    Command,
}

/// A value bound in a pattern document. `Absent` asserts the key is missing
/// from the corresponding request document entirely.
#[derive(Debug, Clone)]
pub enum PatternValue {
    Value(bson::Bson),
    Absent,
    Doc(PatternDoc),
    Array(Vec<PatternValue>),
}

impl From<bson::Bson> for PatternValue {
    fn from(value: bson::Bson) -> Self {
        PatternValue::Value(value)
    }
}

impl From<i32> for PatternValue {
    fn from(value: i32) -> Self {
        PatternValue::Value(bson::Bson::Int32(value))
    }
}

impl From<&str> for PatternValue {
    fn from(value: &str) -> Self {
        PatternValue::Value(bson::Bson::String(value.to_string()))
    }
}

/// A subset-match pattern over a single BSON document. Unordered by default;
/// [`PatternDoc::ordered`] additionally requires matching keys to appear in
/// the same relative order as in the request document.
#[derive(Debug, Clone, Default)]
pub struct PatternDoc {
    entries: IndexMap<String, PatternValue>,
    ordered: bool,
    case_insensitive: bool,
}

impl PatternDoc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<PatternValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn absent(mut self, key: impl Into<String>) -> Self {
        self.entries.insert(key.into(), PatternValue::Absent);
        self
    }

    pub fn ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    /// Matches this pattern's keys against the request document's keys
    /// ignoring ASCII case. Needed for the legacy `isMaster`/`ismaster`
    /// handshake command, whose casing differs across driver versions.
    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    fn lookup<'a>(&self, request_doc: &'a bson::Document, key: &str) -> Option<&'a bson::Bson> {
        if self.case_insensitive {
            request_doc
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        } else {
            request_doc.get(key)
        }
    }

    pub fn matches(&self, request_doc: &bson::Document) -> bool {
        let request_keys: Vec<&String> = request_doc.keys().collect();

        for (key, pattern_value) in &self.entries {
            match pattern_value {
                PatternValue::Absent => {
                    if self.lookup(request_doc, key).is_some() {
                        return false;
                    }
                }
                other => {
                    let Some(request_value) = self.lookup(request_doc, key) else {
                        return false;
                    };
                    if !value_matches(other, request_value) {
                        return false;
                    }
                }
            }
        }

        if self.ordered {
            let mut last_index: Option<usize> = None;
            for key in self.entries.keys() {
                let idx = if self.case_insensitive {
                    request_keys.iter().position(|k| k.eq_ignore_ascii_case(key))
                } else {
                    request_keys.iter().position(|k| *k == key)
                };
                let Some(idx) = idx else {
                    continue;
                };
                if let Some(last) = last_index {
                    if idx < last {
                        return false;
                    }
                }
                last_index = Some(idx);
            }
        }

        true
    }
}

impl From<bson::Document> for PatternDoc {
    fn from(doc: bson::Document) -> Self {
        let mut entries = IndexMap::new();
        for (k, v) in doc {
            entries.insert(k, PatternValue::Value(v));
        }
        Self {
            entries,
            ordered: false,
            case_insensitive: false,
        }
    }
}

fn value_matches(pattern: &PatternValue, request: &bson::Bson) -> bool {
    match pattern {
        PatternValue::Absent => false, // handled by caller before reaching here
        PatternValue::Value(expected) => canonical_eq(expected, request),
        PatternValue::Doc(sub) => match request {
            bson::Bson::Document(doc) => sub.matches(doc),
            _ => false,
        },
        PatternValue::Array(items) => match request {
            bson::Bson::Array(arr) => {
                items.len() == arr.len()
                    && items.iter().zip(arr.iter()).all(|(p, r)| value_matches(p, r))
            }
            _ => false,
        },
    }
}

/// Compares two BSON values by their canonical meaning rather than by host
/// representation, so values produced by different BSON libraries (or by the
/// same library's different numeric widths) still compare equal. Datetimes
/// are truncated to millisecond resolution before comparison.
pub fn canonical_eq(a: &bson::Bson, b: &bson::Bson) -> bool {
    match (a, b) {
        (bson::Bson::DateTime(x), bson::Bson::DateTime(y)) => {
            x.timestamp_millis() == y.timestamp_millis()
        }
        (bson::Bson::Document(x), bson::Bson::Document(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map(|yv| canonical_eq(v, yv)).unwrap_or(false))
        }
        (bson::Bson::Array(x), bson::Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(xv, yv)| canonical_eq(xv, yv))
        }
        (bson::Bson::Int32(x), bson::Bson::Int64(y)) => i64::from(*x) == *y,
        (bson::Bson::Int64(x), bson::Bson::Int32(y)) => *x == i64::from(*y),
        (bson::Bson::Int32(x), bson::Bson::Double(y)) => f64::from(*x) == *y,
        (bson::Bson::Double(x), bson::Bson::Int32(y)) => *x == f64::from(*y),
        _ => a == b,
    }
}

/// A request/reply matcher: opcode class, flags, namespace, opcode-specific
/// scalars, and an ordered list of per-document subset patterns.
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    op_class: Option<OpClass>,
    flag_mask: Option<i32>,
    namespace: Option<String>,
    num_to_return: Option<i32>,
    cursor_id: Option<i64>,
    cursor_ids: Option<Vec<i64>>,
    documents: Vec<PatternDoc>,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the common "a command named `name`, with value 1" shorthand.
    pub fn command(name: impl Into<String>) -> Self {
        Self::new()
            .op_class(OpClass::Command)
            .document(PatternDoc::new().field(name, 1))
    }

    /// Same as [`Pattern::command`], but the command name is matched
    /// case-insensitively — for the legacy `isMaster`/`ismaster` handshake,
    /// whose casing differs across driver versions.
    pub fn command_ci(name: impl Into<String>) -> Self {
        Self::new()
            .op_class(OpClass::Command)
            .document(PatternDoc::new().field(name, 1).case_insensitive())
    }

    pub fn op_class(mut self, class: OpClass) -> Self {
        self.op_class = Some(class);
        self
    }

    pub fn flag_mask(mut self, mask: i32) -> Self {
        self.flag_mask = Some(mask);
        self
    }

    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    pub fn num_to_return(mut self, n: i32) -> Self {
        self.num_to_return = Some(n);
        self
    }

    pub fn cursor_id(mut self, id: i64) -> Self {
        self.cursor_id = Some(id);
        self
    }

    pub fn cursor_ids(mut self, ids: Vec<i64>) -> Self {
        self.cursor_ids = Some(ids);
        self
    }

    pub fn document(mut self, doc: PatternDoc) -> Self {
        self.documents.push(doc);
        self
    }

    pub fn matches(&self, request: &Request) -> bool {
        if let Some(class) = self.op_class {
            if !class_matches(class, request) {
                return false;
            }
        }

        if let Some(mask) = self.flag_mask {
            if request.flags & mask != mask {
                return false;
            }
        }

        if let Some(ns) = &self.namespace {
            if request.namespace.as_deref() != Some(ns.as_str()) {
                return false;
            }
        }

        if let Some(n) = self.num_to_return {
            if request.num_to_return != Some(n) {
                return false;
            }
        }

        if let Some(id) = self.cursor_id {
            if request.cursor_id != Some(id) {
                return false;
            }
        }

        if let Some(ids) = &self.cursor_ids {
            if request.cursor_ids.as_ref() != Some(ids) {
                return false;
            }
        }

        if !self.documents.is_empty() {
            if self.documents.len() != request.documents.len() {
                return false;
            }
            for (pattern_doc, request_doc) in self.documents.iter().zip(request.documents.iter()) {
                if !pattern_doc.matches(request_doc) {
                    return false;
                }
            }
        }

        true
    }
}

fn class_matches(class: OpClass, request: &Request) -> bool {
    use crate::wire::header::OpCode;
    match class {
        OpClass::Query => request.op_code == OpCode::Query,
        OpClass::Insert => request.op_code == OpCode::Insert,
        OpClass::Update => request.op_code == OpCode::Update,
        OpClass::Delete => request.op_code == OpCode::Delete,
        OpClass::GetMore => request.op_code == OpCode::GetMore,
        OpClass::KillCursors => request.op_code == OpCode::KillCursors,
        OpClass::Msg => request.op_code == OpCode::Msg,
        OpClass::Command => {
            request.op_code == OpCode::Msg
                || (request.op_code == OpCode::Query
                    && request.namespace.as_deref().is_some_and(|ns| ns.ends_with(".$cmd")))
        }
    }
}

impl From<&str> for Pattern {
    fn from(command_name: &str) -> Self {
        Pattern::command(command_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::wire::header::OpCode;

    fn msg_request(doc: bson::Document) -> Request {
        Request::for_test(OpCode::Msg, 0, Some("db".to_string()), vec![doc])
    }

    #[test]
    fn reflexive_match_on_its_own_request() {
        let request = msg_request(bson::doc! { "insert": "coll", "documents": [{"_id": 1}] });
        let pattern = Pattern::new()
            .op_class(OpClass::Msg)
            .document(PatternDoc::from(request.documents[0].clone()));
        assert!(pattern.matches(&request));
    }

    #[test]
    fn subset_of_fields_matches() {
        let request = msg_request(bson::doc! { "insert": "coll", "ordered": true });
        let pattern = Pattern::new()
            .op_class(OpClass::Msg)
            .document(PatternDoc::new().field("insert", "coll"));
        assert!(pattern.matches(&request));
    }

    #[test]
    fn extra_bound_key_not_present_fails() {
        let request = msg_request(bson::doc! { "insert": "coll" });
        let pattern = Pattern::new()
            .op_class(OpClass::Msg)
            .document(PatternDoc::new().field("insert", "coll").field("ordered", true));
        assert!(!pattern.matches(&request));
    }

    #[test]
    fn absent_sentinel_requires_missing_key() {
        let request = bson::doc! { "insert": "coll" };
        let present = bson::doc! { "insert": "coll", "ordered": true };

        let pattern = PatternDoc::new().field("insert", "coll").absent("ordered");
        assert!(pattern.matches(&request));
        assert!(!pattern.matches(&present));
    }

    #[test]
    fn ordered_pattern_requires_key_order() {
        let request = bson::doc! { "a": 1, "b": 2, "c": 3 };
        let ordered_ok = PatternDoc::new().field("a", 1).field("c", 3).ordered();
        let ordered_bad = PatternDoc::new().field("c", 3).field("a", 1).ordered();

        assert!(ordered_ok.matches(&request));
        assert!(!ordered_bad.matches(&request));
    }

    #[test]
    fn datetimes_compare_at_millisecond_resolution() {
        let millis = 1_700_000_000_123i64;
        let a = bson::Bson::DateTime(bson::DateTime::from_millis(millis));
        let b = bson::Bson::DateTime(bson::DateTime::from_millis(millis));
        assert!(canonical_eq(&a, &b));
    }

    #[test]
    fn command_shorthand_matches_commands() {
        let request = msg_request(bson::doc! { "ismaster": 1 });
        let pattern = Pattern::from("ismaster");
        assert!(pattern.matches(&request));
    }

    #[test]
    fn command_ci_matches_the_legacy_ismaster_casing() {
        let request = msg_request(bson::doc! { "isMaster": 1 });
        let pattern = Pattern::command_ci("ismaster");
        assert!(pattern.matches(&request));
    }
}
