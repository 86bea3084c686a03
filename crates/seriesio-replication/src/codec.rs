//! Wire codec for log entries
//!
//! Frame layout:
//!
//! ```text
//! +------+----------+----------+----------+----------+------+
//! | Type | PrevIdx  | PrevTerm | CurrIdx  | CurrTerm | Body |
//! | 1B   | 8B be    | 8B be    | 8B be    | 8B be    | var  |
//! +------+----------+----------+----------+----------+------+
//! ```
//!
//! All multi-byte integers are big-endian. Strings are u32-length-prefixed
//! UTF-8. The dispatch byte selects the body decoder; an unrecognized byte
//! fails with [`Error::UnknownLogType`].

use crate::entry::{EntryBody, LogEntry};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use seriesio_common::{Error, Node, Result};

const TYPE_PHYSICAL_PLAN: u8 = 0;
const TYPE_ADD_NODE: u8 = 1;
const TYPE_REMOVE_NODE: u8 = 2;
const TYPE_CLOSE_FILE: u8 = 3;
const TYPE_EMPTY_CONTENT: u8 = 4;

/// Encode an entry into its wire frame.
#[must_use]
pub fn encode(entry: &LogEntry) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u8(dispatch_byte(&entry.body));
    buf.put_i64(entry.prev_index);
    buf.put_i64(entry.prev_term);
    buf.put_i64(entry.curr_index);
    buf.put_i64(entry.curr_term);
    match &entry.body {
        EntryBody::PhysicalPlan(payload) => {
            buf.put_u32(payload.len() as u32);
            buf.put_slice(payload);
        }
        EntryBody::AddNode(node) | EntryBody::RemoveNode(node) => put_node(&mut buf, node),
        EntryBody::CloseFile {
            storage_group,
            partition_id,
            is_seq,
        } => {
            put_string(&mut buf, storage_group);
            buf.put_i64(*partition_id);
            buf.put_u8(u8::from(*is_seq));
        }
        EntryBody::EmptyContent => {}
    }
    buf.freeze()
}

/// Decode an entry from its wire frame.
pub fn decode(mut buf: &[u8]) -> Result<LogEntry> {
    let entry_type = take_u8(&mut buf)?;
    let prev_index = take_i64(&mut buf)?;
    let prev_term = take_i64(&mut buf)?;
    let curr_index = take_i64(&mut buf)?;
    let curr_term = take_i64(&mut buf)?;
    let body = match entry_type {
        TYPE_PHYSICAL_PLAN => {
            let len = take_u32(&mut buf)? as usize;
            if buf.remaining() < len {
                return Err(Error::MalformedLog("plan payload truncated".to_string()));
            }
            EntryBody::PhysicalPlan(buf.copy_to_bytes(len).to_vec())
        }
        TYPE_ADD_NODE => EntryBody::AddNode(take_node(&mut buf)?),
        TYPE_REMOVE_NODE => EntryBody::RemoveNode(take_node(&mut buf)?),
        TYPE_CLOSE_FILE => EntryBody::CloseFile {
            storage_group: take_string(&mut buf)?,
            partition_id: take_i64(&mut buf)?,
            is_seq: take_u8(&mut buf)? != 0,
        },
        TYPE_EMPTY_CONTENT => EntryBody::EmptyContent,
        other => return Err(Error::UnknownLogType(other)),
    };
    Ok(LogEntry::new(prev_index, prev_term, curr_index, curr_term, body))
}

const fn dispatch_byte(body: &EntryBody) -> u8 {
    match body {
        EntryBody::PhysicalPlan(_) => TYPE_PHYSICAL_PLAN,
        EntryBody::AddNode(_) => TYPE_ADD_NODE,
        EntryBody::RemoveNode(_) => TYPE_REMOVE_NODE,
        EntryBody::CloseFile { .. } => TYPE_CLOSE_FILE,
        EntryBody::EmptyContent => TYPE_EMPTY_CONTENT,
    }
}

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn put_node(buf: &mut BytesMut, node: &Node) {
    put_string(buf, &node.host);
    buf.put_u16(node.meta_port);
    buf.put_i32(node.node_id);
    buf.put_u16(node.data_port);
}

fn take_u8(buf: &mut &[u8]) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(Error::MalformedLog("unexpected end of frame".to_string()));
    }
    Ok(buf.get_u8())
}

fn take_u16(buf: &mut &[u8]) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(Error::MalformedLog("unexpected end of frame".to_string()));
    }
    Ok(buf.get_u16())
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(Error::MalformedLog("unexpected end of frame".to_string()));
    }
    Ok(buf.get_u32())
}

fn take_i32(buf: &mut &[u8]) -> Result<i32> {
    if buf.remaining() < 4 {
        return Err(Error::MalformedLog("unexpected end of frame".to_string()));
    }
    Ok(buf.get_i32())
}

fn take_i64(buf: &mut &[u8]) -> Result<i64> {
    if buf.remaining() < 8 {
        return Err(Error::MalformedLog("unexpected end of frame".to_string()));
    }
    Ok(buf.get_i64())
}

fn take_string(buf: &mut &[u8]) -> Result<String> {
    let len = take_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(Error::MalformedLog("string truncated".to_string()));
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::MalformedLog("string is not valid UTF-8".to_string()))
}

fn take_node(buf: &mut &[u8]) -> Result<Node> {
    let host = take_string(buf)?;
    let meta_port = take_u16(buf)?;
    let node_id = take_i32(buf)?;
    let data_port = take_u16(buf)?;
    Ok(Node::new(host, meta_port, node_id, data_port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(body: EntryBody) {
        let entry = LogEntry::new(1, 1, 2, 2, body);
        let decoded = decode(&encode(&entry)).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn test_physical_plan_round_trip() {
        round_trip(EntryBody::PhysicalPlan(vec![1, 2, 3, 4, 5]));
        round_trip(EntryBody::PhysicalPlan(Vec::new()));
    }

    #[test]
    fn test_add_node_round_trip() {
        round_trip(EntryBody::AddNode(Node::new("seriesio.example.com", 1234, 1, 4321)));
    }

    #[test]
    fn test_remove_node_round_trip() {
        round_trip(EntryBody::RemoveNode(Node::new("127.0.0.1", 9003, 0, 40010)));
    }

    #[test]
    fn test_close_file_round_trip() {
        let entry = LogEntry::new(
            1,
            1,
            2,
            2,
            EntryBody::CloseFile {
                storage_group: "root.sg1".to_string(),
                partition_id: 0,
                is_seq: true,
            },
        );
        let decoded = decode(&encode(&entry)).unwrap();
        assert_eq!(entry, decoded);
        match decoded.body {
            EntryBody::CloseFile {
                storage_group,
                is_seq,
                ..
            } => {
                assert_eq!(storage_group, "root.sg1");
                assert!(is_seq);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn test_empty_content_round_trip() {
        round_trip(EntryBody::EmptyContent);
    }

    #[test]
    fn test_unknown_dispatch_byte() {
        let mut frame = encode(&LogEntry::new(1, 1, 2, 2, EntryBody::EmptyContent)).to_vec();
        frame[0] = 0x7f;
        assert!(matches!(decode(&frame), Err(Error::UnknownLogType(0x7f))));
    }

    #[test]
    fn test_truncated_frame() {
        let frame = encode(&LogEntry::new(
            1,
            1,
            2,
            2,
            EntryBody::AddNode(Node::new("h", 1, 2, 3)),
        ));
        assert!(matches!(
            decode(&frame[..frame.len() - 2]),
            Err(Error::MalformedLog(_))
        ));
    }
}
