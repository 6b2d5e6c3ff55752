/*!
 * @file wire/reply.rs
 * @brief OP_REPLY body encoding (legacy opcode replies)
 */

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResponseFlags: i32 {
        const CURSOR_NOT_FOUND = 1;
        const QUERY_FAILURE = 1 << 1;
        const SHARD_CONFIG_STALE = 1 << 2;
        const AWAIT_CAPABLE = 1 << 3;
    }
}

/// The body of a legacy OP_REPLY message.
#[derive(Debug, Clone)]
pub struct OpReply {
    pub response_flags: ResponseFlags,
    pub cursor_id: i64,
    pub starting_from: i32,
    pub documents: Vec<bson::Document>,
}

impl OpReply {
    pub fn single(doc: bson::Document) -> Self {
        Self {
            response_flags: ResponseFlags::empty(),
            cursor_id: 0,
            starting_from: 0,
            documents: vec![doc],
        }
    }

    pub fn encode_body(&self) -> crate::error::Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.response_flags.bits().to_le_bytes());
        buf.extend_from_slice(&self.cursor_id.to_le_bytes());
        buf.extend_from_slice(&self.starting_from.to_le_bytes());
        buf.extend_from_slice(&(self.documents.len() as i32).to_le_bytes());
        for doc in &self.documents {
            doc.to_writer(&mut buf)?;
        }
        Ok(buf)
    }
}
