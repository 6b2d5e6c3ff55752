/*!
 * @file autoresponder.rs
 * @brief Ordered (pattern, handler) chain consulted before a request reaches the inbox
 */

use crate::pattern::Pattern;
use crate::reply_spec::ReplySpec;
use crate::request::Request;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What an autoresponder entry does with a matching request: answer with a
/// fixed document, or run a callback that may itself decline (`None`),
/// letting the walk continue to the next entry.
pub enum ReplyAction {
    Static(ReplySpec),
    Handler(Arc<dyn Fn(&Request) -> Option<ReplySpec> + Send + Sync>),
}

impl From<ReplySpec> for ReplyAction {
    fn from(spec: ReplySpec) -> Self {
        ReplyAction::Static(spec)
    }
}

impl From<bson::Document> for ReplyAction {
    fn from(doc: bson::Document) -> Self {
        ReplyAction::Static(ReplySpec::from(doc))
    }
}

impl<F> From<F> for ReplyAction
where
    F: Fn(&Request) -> Option<ReplySpec> + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        ReplyAction::Handler(Arc::new(f))
    }
}

/// Opaque handle returned at registration, usable to remove the entry later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponderHandle(u64);

struct Entry {
    id: u64,
    pattern: Pattern,
    action: ReplyAction,
}

#[derive(Default)]
pub struct AutoresponderChain {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl AutoresponderChain {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new autoresponder, taking precedence over every entry
    /// already registered via `autoresponds`.
    pub fn autoresponds(&self, pattern: Pattern, action: impl Into<ReplyAction>) -> ResponderHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().push(Entry {
            id,
            pattern,
            action: action.into(),
        });
        ResponderHandle(id)
    }

    /// Registers a last-resort handler: consulted only after every other
    /// autoresponder has declined to answer a request.
    pub fn append_responder(
        &self,
        pattern: Pattern,
        action: impl Into<ReplyAction>,
    ) -> ResponderHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().insert(
            0,
            Entry {
                id,
                pattern,
                action: action.into(),
            },
        );
        ResponderHandle(id)
    }

    pub fn remove(&self, handle: ResponderHandle) {
        self.entries.lock().retain(|e| e.id != handle.0);
    }

    /// Walks the chain most-recently-added-first, returning the first
    /// matching, non-declining reply.
    pub fn try_respond(&self, request: &Request) -> Option<ReplySpec> {
        let entries = self.entries.lock();
        for entry in entries.iter().rev() {
            if !entry.pattern.matches(request) {
                continue;
            }
            match &entry.action {
                ReplyAction::Static(spec) => return Some(ReplySpec(spec.0.clone())),
                ReplyAction::Handler(f) => {
                    if let Some(spec) = f(request) {
                        return Some(spec);
                    }
                }
            }
        }
        None
    }
}
