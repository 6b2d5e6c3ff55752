/*!
 * @file request.rs
 * @brief The decoded, test-facing view of one inbound wire message
 */

use crate::connection::ConnectionHandle;
use crate::error::{MockError, Result};
use crate::reply_spec::ReplySpec;
use crate::wire::decode::DecodedBody;
use crate::wire::header::{Header, OpCode};
use crate::wire::legacy::unwrap_query;
use crate::wire::op_msg::OpMsg;
use crate::wire::reply::{OpReply, ResponseFlags};
use crate::wire::util::next_request_id;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One decoded request, produced by a connection worker and either consumed
/// by an autoresponder or handed to the test thread via the inbox.
pub struct Request {
    pub request_id: i32,
    pub op_code: OpCode,
    pub flags: i32,
    pub namespace: Option<String>,
    pub documents: Vec<bson::Document>,
    pub num_to_skip: Option<i32>,
    pub num_to_return: Option<i32>,
    pub cursor_id: Option<i64>,
    pub cursor_ids: Option<Vec<i64>>,
    connection: Arc<ConnectionHandle>,
    replied: Arc<AtomicBool>,
}

impl Request {
    pub(crate) fn new(request_id: i32, body: DecodedBody, connection: Arc<ConnectionHandle>) -> Self {
        let mut request = Self {
            request_id,
            op_code: OpCode::Query,
            flags: 0,
            namespace: None,
            documents: Vec::new(),
            num_to_skip: None,
            num_to_return: None,
            cursor_id: None,
            cursor_ids: None,
            connection,
            replied: Arc::new(AtomicBool::new(false)),
        };

        match body {
            DecodedBody::Query(q) => {
                request.op_code = OpCode::Query;
                request.flags = q.flags;
                request.namespace = Some(q.namespace);
                request.num_to_skip = Some(q.num_to_skip);
                request.num_to_return = Some(q.num_to_return);
                let unwrapped = unwrap_query(&q.query);
                request.documents.push(unwrapped);
                if let Some(selector) = q.fields_selector {
                    request.documents.push(selector);
                }
            }
            DecodedBody::Insert(i) => {
                request.op_code = OpCode::Insert;
                request.flags = i.flags;
                request.namespace = Some(i.namespace);
                request.documents = i.documents;
            }
            DecodedBody::Update(u) => {
                request.op_code = OpCode::Update;
                request.flags = u.flags;
                request.namespace = Some(u.namespace);
                request.documents = vec![u.selector, u.update];
            }
            DecodedBody::Delete(d) => {
                request.op_code = OpCode::Delete;
                request.flags = d.flags;
                request.namespace = Some(d.namespace);
                request.documents = vec![d.selector];
            }
            DecodedBody::GetMore(g) => {
                request.op_code = OpCode::GetMore;
                request.namespace = Some(g.namespace);
                request.num_to_return = Some(g.num_to_return);
                request.cursor_id = Some(g.cursor_id);
            }
            DecodedBody::KillCursors(k) => {
                request.op_code = OpCode::KillCursors;
                request.cursor_ids = Some(k.cursor_ids);
            }
            DecodedBody::Msg(msg) => {
                request.op_code = OpCode::Msg;
                request.flags = msg.flags.bits() as i32;
                let merged = msg.merged_document();
                if let Some(bson::Bson::String(db)) = merged.get("$db") {
                    request.namespace = Some(db.clone());
                }
                request.documents.push(merged);
            }
        }

        request
    }

    pub fn connection_id(&self) -> u64 {
        self.connection.id
    }

    pub fn peer_addr(&self) -> &str {
        &self.connection.peer_addr
    }

    /// Replies to this request with `spec`. Fails if this request has
    /// already been replied to, or if the client has since disconnected.
    pub async fn reply(&self, spec: impl Into<ReplySpec>) -> Result<()> {
        if self.replied.swap(true, Ordering::SeqCst) {
            return Err(MockError::DoubleReply(self.request_id));
        }
        let doc = spec.into().into_document();
        let (header, body) = self.encode_reply(doc)?;
        self.connection.send(&header, &body).await
    }

    /// Replies with a command-error document: `{ok: 0, code, errmsg, ...extras}`.
    pub async fn command_err(
        &self,
        code: i32,
        errmsg: impl Into<String>,
        extras: Option<bson::Document>,
    ) -> Result<()> {
        let mut doc = bson::doc! {
            "ok": 0,
            "code": code,
            "errmsg": errmsg.into(),
        };
        if let Some(extras) = extras {
            for (k, v) in extras {
                doc.insert(k, v);
            }
        }
        self.reply(ReplySpec::from(doc)).await
    }

    /// Legacy OP_QUERY failure reply: sets the `QUERY_FAILURE` response flag.
    /// Only meaningful when this request's opcode is a legacy `OP_QUERY`.
    pub async fn fail(&self, errmsg: impl Into<String>) -> Result<()> {
        if self.replied.swap(true, Ordering::SeqCst) {
            return Err(MockError::DoubleReply(self.request_id));
        }
        let doc = bson::doc! { "$err": errmsg.into(), "ok": 0 };
        let reply = OpReply {
            response_flags: ResponseFlags::QUERY_FAILURE,
            cursor_id: 0,
            starting_from: 0,
            documents: vec![doc],
        };
        let body = reply.encode_body()?;
        let header = Header {
            length: crate::wire::header::HEADER_LENGTH + body.len() as i32,
            request_id: next_request_id(),
            response_to: self.request_id,
            op_code: OpCode::Reply,
        };
        self.connection.send(&header, &body).await
    }

    /// The legacy `getLastError` convenience: replies `{ok: 1}`.
    pub async fn replies_to_gle(&self) -> Result<()> {
        self.reply(ReplySpec::ok()).await
    }

    /// Closes the originating socket without sending a reply.
    pub async fn hangup(&self) {
        self.replied.store(true, Ordering::SeqCst);
        self.connection.hangup().await;
    }

    fn encode_reply(&self, doc: bson::Document) -> Result<(Header, Vec<u8>)> {
        let body = match self.op_code {
            OpCode::Msg => OpMsg::encode_reply_body(&doc)?,
            _ => OpReply::single(doc).encode_body()?,
        };
        let op_code = match self.op_code {
            OpCode::Msg => OpCode::Msg,
            _ => OpCode::Reply,
        };
        let header = Header {
            length: crate::wire::header::HEADER_LENGTH + body.len() as i32,
            request_id: next_request_id(),
            response_to: self.request_id,
            op_code,
        };
        Ok((header, body))
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        op_code: OpCode,
        flags: i32,
        namespace: Option<String>,
        documents: Vec<bson::Document>,
    ) -> Self {
        Self {
            request_id: 1,
            op_code,
            flags,
            namespace,
            documents,
            num_to_skip: None,
            num_to_return: None,
            cursor_id: None,
            cursor_ids: None,
            connection: ConnectionHandle::dead_for_test(),
            replied: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("request_id", &self.request_id)
            .field("op_code", &self.op_code)
            .field("namespace", &self.namespace)
            .field("documents", &self.documents)
            .finish()
    }
}
