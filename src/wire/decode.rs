/*!
 * @file wire/decode.rs
 * @brief Opcode dispatch: turns a raw message body into a typed payload
 */

use crate::error::Result;
use crate::wire::header::OpCode;
use crate::wire::legacy::{
    decode_delete, decode_get_more, decode_insert, decode_kill_cursors, decode_query,
    decode_update, OpDelete, OpGetMore, OpInsert, OpKillCursors, OpQuery, OpUpdate,
};
use crate::wire::op_msg::OpMsg;

#[derive(Debug, Clone)]
pub enum DecodedBody {
    Query(OpQuery),
    Insert(OpInsert),
    Update(OpUpdate),
    Delete(OpDelete),
    GetMore(OpGetMore),
    KillCursors(OpKillCursors),
    Msg(OpMsg),
}

pub fn decode_body(op_code: OpCode, body: &[u8]) -> Result<DecodedBody> {
    match op_code {
        OpCode::Query => Ok(DecodedBody::Query(decode_query(body)?)),
        OpCode::Insert => Ok(DecodedBody::Insert(decode_insert(body)?)),
        OpCode::Update => Ok(DecodedBody::Update(decode_update(body)?)),
        OpCode::Delete => Ok(DecodedBody::Delete(decode_delete(body)?)),
        OpCode::GetMore => Ok(DecodedBody::GetMore(decode_get_more(body)?)),
        OpCode::KillCursors => Ok(DecodedBody::KillCursors(decode_kill_cursors(body)?)),
        OpCode::Msg => Ok(DecodedBody::Msg(OpMsg::decode(body)?)),
        OpCode::Reply => Err(crate::error::MockError::Decode(
            "server does not accept OP_REPLY from clients".to_string(),
        )),
    }
}
