/*!
 * @file wire/header.rs
 * @brief The 16-byte message header shared by every wire-protocol message
 */

use crate::error::{MockError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size in bytes of the fixed message header.
pub const HEADER_LENGTH: i32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Reply,
    Update,
    Insert,
    Query,
    GetMore,
    Delete,
    KillCursors,
    Msg,
}

impl OpCode {
    fn from_i32(value: i32) -> Result<Self> {
        match value {
            1 => Ok(OpCode::Reply),
            2001 => Ok(OpCode::Update),
            2002 => Ok(OpCode::Insert),
            2004 => Ok(OpCode::Query),
            2005 => Ok(OpCode::GetMore),
            2006 => Ok(OpCode::Delete),
            2007 => Ok(OpCode::KillCursors),
            2013 => Ok(OpCode::Msg),
            other => Err(MockError::Decode(format!("unknown opcode {other}"))),
        }
    }

    fn to_i32(self) -> i32 {
        match self {
            OpCode::Reply => 1,
            OpCode::Update => 2001,
            OpCode::Insert => 2002,
            OpCode::Query => 2004,
            OpCode::GetMore => 2005,
            OpCode::Delete => 2006,
            OpCode::KillCursors => 2007,
            OpCode::Msg => 2013,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: OpCode,
}

impl Header {
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let length = reader.read_i32_le().await?;
        if length < HEADER_LENGTH {
            return Err(MockError::Decode(format!(
                "message length {length} is shorter than the header"
            )));
        }
        let request_id = reader.read_i32_le().await?;
        let response_to = reader.read_i32_le().await?;
        let op_code = OpCode::from_i32(reader.read_i32_le().await?)?;

        Ok(Self {
            length,
            request_id,
            response_to,
            op_code,
        })
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32_le(self.length).await?;
        writer.write_i32_le(self.request_id).await?;
        writer.write_i32_le(self.response_to).await?;
        writer.write_i32_le(self.op_code.to_i32()).await?;
        Ok(())
    }
}
