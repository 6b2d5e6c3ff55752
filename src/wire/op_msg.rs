/*!
 * @file wire/op_msg.rs
 * @brief OP_MSG section framing (the modern wire opcode)
 */

use crate::error::{MockError, Result};
use crate::wire::util::{read_cstring, read_document};
use bitflags::bitflags;
use std::io::Cursor;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MessageFlags: u32 {
        const CHECKSUM_PRESENT = 1;
        const MORE_TO_COME = 1 << 1;
        const EXHAUST_ALLOWED = 1 << 16;
    }
}

#[derive(Debug, Clone)]
pub enum MessageSection {
    Document(bson::Document),
    Sequence {
        identifier: String,
        documents: Vec<bson::Document>,
    },
}

#[derive(Debug, Clone)]
pub struct OpMsg {
    pub flags: MessageFlags,
    pub sections: Vec<MessageSection>,
}

impl OpMsg {
    /// Parses every section out of a full OP_MSG body (flags already stripped
    /// by the caller is not the case here; `body` is the entire message body
    /// following the header, including the flag bits).
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(body);
        let flags_bits = read_u32(&mut cursor)?;
        let flags = MessageFlags::from_bits_truncate(flags_bits);

        let checksum_len = if flags.contains(MessageFlags::CHECKSUM_PRESENT) {
            4
        } else {
            0
        };
        let payload_end = body.len() - checksum_len;

        let mut sections = Vec::new();
        while (cursor.position() as usize) < payload_end {
            let kind = read_u8(&mut cursor)?;
            match kind {
                0 => {
                    let doc = read_document(&mut cursor)?;
                    sections.push(MessageSection::Document(doc));
                }
                1 => {
                    // `size` covers itself, the identifier, and the documents
                    // that follow, counted from right after the kind byte.
                    let section_start = cursor.position() as usize;
                    let size = read_i32(&mut cursor)? as usize;
                    let section_end = section_start + size;
                    let identifier = read_cstring(&mut cursor)?;
                    let mut documents = Vec::new();
                    while (cursor.position() as usize) < section_end {
                        documents.push(read_document(&mut cursor)?);
                    }
                    sections.push(MessageSection::Sequence {
                        identifier,
                        documents,
                    });
                }
                other => {
                    return Err(MockError::Decode(format!(
                        "unknown OP_MSG section kind {other}"
                    )))
                }
            }
        }

        Ok(Self { flags, sections })
    }

    /// Merges every section into a single document per the server's own
    /// convention: the kind-0 body document, with each kind-1 sequence
    /// inserted as an array field under its identifier. A kind-1 sequence
    /// whose identifier collides with a kind-0 key shadows it.
    pub fn merged_document(&self) -> bson::Document {
        let mut merged = bson::Document::new();
        for section in &self.sections {
            match section {
                MessageSection::Document(doc) => {
                    for (k, v) in doc {
                        merged.insert(k.clone(), v.clone());
                    }
                }
                MessageSection::Sequence { .. } => {}
            }
        }
        for section in &self.sections {
            if let MessageSection::Sequence {
                identifier,
                documents,
            } = section
            {
                let arr: bson::Bson =
                    bson::Bson::Array(documents.iter().map(|d| bson::Bson::Document(d.clone())).collect());
                merged.insert(identifier.clone(), arr);
            }
        }
        merged
    }

    /// Encodes a reply body (flags=0, single kind-0 section) into a byte buffer.
    pub fn encode_reply_body(doc: &bson::Document) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.push(0);
        doc.to_writer(&mut buf)?;
        Ok(buf)
    }
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8> {
    let pos = cursor.position() as usize;
    let buf = cursor.get_ref();
    if pos >= buf.len() {
        return Err(MockError::Decode("unexpected end of OP_MSG body".to_string()));
    }
    cursor.set_position(pos as u64 + 1);
    Ok(buf[pos])
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    let pos = cursor.position() as usize;
    let buf = cursor.get_ref();
    if pos + 4 > buf.len() {
        return Err(MockError::Decode("unexpected end of OP_MSG body".to_string()));
    }
    let bytes: [u8; 4] = buf[pos..pos + 4].try_into().unwrap();
    cursor.set_position(pos as u64 + 4);
    Ok(u32::from_le_bytes(bytes))
}

fn read_i32(cursor: &mut Cursor<&[u8]>) -> Result<i32> {
    read_u32(cursor).map(|v| v as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_body(body_doc: &bson::Document, sequence: Option<(&str, Vec<bson::Document>)>) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_le_bytes()); // flags

        buf.push(0); // kind 0
        body_doc.to_writer(&mut buf).unwrap();

        if let Some((identifier, docs)) = sequence {
            buf.push(1); // kind 1
            let size_pos = buf.len();
            buf.extend_from_slice(&0i32.to_le_bytes()); // placeholder size
            let section_start = buf.len();
            buf.extend_from_slice(identifier.as_bytes());
            buf.push(0);
            for doc in &docs {
                doc.to_writer(&mut buf).unwrap();
            }
            let size = (buf.len() - section_start + 4) as i32;
            buf[size_pos..size_pos + 4].copy_from_slice(&size.to_le_bytes());
        }

        buf
    }

    #[test]
    fn decodes_kind0_and_kind1_sections() {
        let body_doc = bson::doc! { "insert": "coll", "$db": "testdb" };
        let docs = vec![bson::doc! { "_id": 1 }, bson::doc! { "_id": 2 }];
        let body = build_body(&body_doc, Some(("documents", docs.clone())));

        let msg = OpMsg::decode(&body).unwrap();
        assert_eq!(msg.sections.len(), 2);

        let merged = msg.merged_document();
        assert_eq!(merged.get_str("insert").unwrap(), "coll");
        let bson::Bson::Array(arr) = merged.get("documents").unwrap() else {
            panic!("expected array")
        };
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn kind1_sequence_shadows_kind0_key_of_the_same_name() {
        let body_doc = bson::doc! { "documents": "this should be shadowed" };
        let docs = vec![bson::doc! { "_id": 1 }];
        let body = build_body(&body_doc, Some(("documents", docs)));

        let msg = OpMsg::decode(&body).unwrap();
        let merged = msg.merged_document();
        assert!(matches!(merged.get("documents"), Some(bson::Bson::Array(_))));
    }
}
