/*!
 * @file wire/legacy.rs
 * @brief Decoders for the legacy (pre-OP_MSG) opcodes
 */

use crate::error::Result;
use crate::wire::util::{read_cstring, read_document};
use std::io::Cursor;

#[derive(Debug, Clone)]
pub struct OpQuery {
    pub flags: i32,
    pub namespace: String,
    pub num_to_skip: i32,
    pub num_to_return: i32,
    pub query: bson::Document,
    pub fields_selector: Option<bson::Document>,
}

#[derive(Debug, Clone)]
pub struct OpInsert {
    pub flags: i32,
    pub namespace: String,
    pub documents: Vec<bson::Document>,
}

#[derive(Debug, Clone)]
pub struct OpUpdate {
    pub namespace: String,
    pub flags: i32,
    pub selector: bson::Document,
    pub update: bson::Document,
}

#[derive(Debug, Clone)]
pub struct OpDelete {
    pub namespace: String,
    pub flags: i32,
    pub selector: bson::Document,
}

#[derive(Debug, Clone)]
pub struct OpGetMore {
    pub namespace: String,
    pub num_to_return: i32,
    pub cursor_id: i64,
}

#[derive(Debug, Clone)]
pub struct OpKillCursors {
    pub cursor_ids: Vec<i64>,
}

pub fn decode_query(body: &[u8]) -> Result<OpQuery> {
    let mut cursor = Cursor::new(body);
    let flags = read_i32(&mut cursor)?;
    let namespace = read_cstring(&mut cursor)?;
    let num_to_skip = read_i32(&mut cursor)?;
    let num_to_return = read_i32(&mut cursor)?;
    let query = read_document(&mut cursor)?;
    let fields_selector = if (cursor.position() as usize) < body.len() {
        Some(read_document(&mut cursor)?)
    } else {
        None
    };
    Ok(OpQuery {
        flags,
        namespace,
        num_to_skip,
        num_to_return,
        query,
        fields_selector,
    })
}

/// Unwraps a legacy `$query`-wrapped command document, if present.
pub fn unwrap_query(query: &bson::Document) -> bson::Document {
    if let Some(bson::Bson::Document(inner)) = query.get("$query") {
        inner.clone()
    } else {
        query.clone()
    }
}

pub fn decode_insert(body: &[u8]) -> Result<OpInsert> {
    let mut cursor = Cursor::new(body);
    let flags = read_i32(&mut cursor)?;
    let namespace = read_cstring(&mut cursor)?;
    let mut documents = Vec::new();
    while (cursor.position() as usize) < body.len() {
        documents.push(read_document(&mut cursor)?);
    }
    Ok(OpInsert {
        flags,
        namespace,
        documents,
    })
}

pub fn decode_update(body: &[u8]) -> Result<OpUpdate> {
    let mut cursor = Cursor::new(body);
    let _reserved = read_i32(&mut cursor)?;
    let namespace = read_cstring(&mut cursor)?;
    let flags = read_i32(&mut cursor)?;
    let selector = read_document(&mut cursor)?;
    let update = read_document(&mut cursor)?;
    Ok(OpUpdate {
        namespace,
        flags,
        selector,
        update,
    })
}

pub fn decode_delete(body: &[u8]) -> Result<OpDelete> {
    let mut cursor = Cursor::new(body);
    let _reserved = read_i32(&mut cursor)?;
    let namespace = read_cstring(&mut cursor)?;
    let flags = read_i32(&mut cursor)?;
    let selector = read_document(&mut cursor)?;
    Ok(OpDelete {
        namespace,
        flags,
        selector,
    })
}

pub fn decode_get_more(body: &[u8]) -> Result<OpGetMore> {
    let mut cursor = Cursor::new(body);
    let _reserved = read_i32(&mut cursor)?;
    let namespace = read_cstring(&mut cursor)?;
    let num_to_return = read_i32(&mut cursor)?;
    let cursor_id = read_i64(&mut cursor)?;
    Ok(OpGetMore {
        namespace,
        num_to_return,
        cursor_id,
    })
}

pub fn decode_kill_cursors(body: &[u8]) -> Result<OpKillCursors> {
    let mut cursor = Cursor::new(body);
    let _reserved = read_i32(&mut cursor)?;
    let n = read_i32(&mut cursor)? as usize;
    let mut cursor_ids = Vec::with_capacity(n);
    for _ in 0..n {
        cursor_ids.push(read_i64(&mut cursor)?);
    }
    Ok(OpKillCursors { cursor_ids })
}

fn read_i32(cursor: &mut Cursor<&[u8]>) -> Result<i32> {
    use crate::error::MockError;
    let pos = cursor.position() as usize;
    let buf = cursor.get_ref();
    if pos + 4 > buf.len() {
        return Err(MockError::Decode("unexpected end of message body".to_string()));
    }
    let bytes: [u8; 4] = buf[pos..pos + 4].try_into().unwrap();
    cursor.set_position(pos as u64 + 4);
    Ok(i32::from_le_bytes(bytes))
}

fn read_i64(cursor: &mut Cursor<&[u8]>) -> Result<i64> {
    use crate::error::MockError;
    let pos = cursor.position() as usize;
    let buf = cursor.get_ref();
    if pos + 8 > buf.len() {
        return Err(MockError::Decode("unexpected end of message body".to_string()));
    }
    let bytes: [u8; 8] = buf[pos..pos + 8].try_into().unwrap();
    cursor.set_position(pos as u64 + 8);
    Ok(i64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cstring(s: &str) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        v.push(0);
        v
    }

    #[test]
    fn decodes_insert_with_two_documents() {
        let mut body = Vec::new();
        body.extend_from_slice(&0i32.to_le_bytes()); // flags
        body.extend_from_slice(&cstring("db.coll"));
        bson::doc! { "_id": 1 }.to_writer(&mut body).unwrap();
        bson::doc! { "_id": 2 }.to_writer(&mut body).unwrap();

        let insert = decode_insert(&body).unwrap();
        assert_eq!(insert.namespace, "db.coll");
        assert_eq!(insert.documents.len(), 2);
        assert_eq!(insert.documents[0].get_i32("_id").unwrap(), 1);
    }

    #[test]
    fn decodes_get_more() {
        let mut body = Vec::new();
        body.extend_from_slice(&0i32.to_le_bytes()); // reserved
        body.extend_from_slice(&cstring("db.coll"));
        body.extend_from_slice(&100i32.to_le_bytes());
        body.extend_from_slice(&42i64.to_le_bytes());

        let get_more = decode_get_more(&body).unwrap();
        assert_eq!(get_more.namespace, "db.coll");
        assert_eq!(get_more.num_to_return, 100);
        assert_eq!(get_more.cursor_id, 42);
    }

    #[test]
    fn unwraps_dollar_query_wrapper() {
        let wrapped = bson::doc! { "$query": { "a": 1 } };
        assert_eq!(unwrap_query(&wrapped), bson::doc! { "a": 1 });

        let plain = bson::doc! { "a": 1 };
        assert_eq!(unwrap_query(&plain), plain);
    }
}
