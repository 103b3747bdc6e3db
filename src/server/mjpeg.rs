//! multipart/x-mixed-replace framing

use bytes::{BufMut, Bytes, BytesMut};

/// `Content-Type` of the stream response
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

/// Wrap one JPEG as a stream part:
/// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`
pub fn encode_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + PART_TRAILER.len());
    part.put_slice(PART_HEADER);
    part.put_slice(jpeg);
    part.put_slice(PART_TRAILER);
    part.freeze()
}

/// Strip the framing off a single part, `None` if it is malformed
pub fn decode_part(part: &[u8]) -> Option<&[u8]> {
    part.strip_prefix(PART_HEADER)?.strip_suffix(PART_TRAILER)
}
