/// Framing between fjsort and the external sorter.
///
/// A framed line is `<key><FRAME_BYTE><record>`. The sorter is told to use
/// FRAME_BYTE as its field separator, so the key is the first field and the
/// whole record rides along untouched. Decoding splits at the first
/// FRAME_BYTE, which is why neither the key nor the record may contain it.
use memchr::memchr;

/// Separator between the sort key and the original record.
pub const FRAME_BYTE: u8 = 0x02;

/// Append the framed form of (`key`, `record`) to `buf`.
///
/// The framed line always ends with a newline, even when `record` is the last
/// line of input and has none.
#[inline]
pub fn encode(buf: &mut Vec<u8>, key: &[u8], record: &[u8]) {
    buf.reserve(key.len() + record.len() + 2);
    buf.extend_from_slice(key);
    buf.push(FRAME_BYTE);
    buf.extend_from_slice(record);
    if record.last() != Some(&b'\n') {
        buf.push(b'\n');
    }
}

/// Recover the original record from a framed line.
///
/// Returns everything after the first FRAME_BYTE, trailing newline included,
/// or None when the line carries no frame byte.
#[inline]
pub fn decode(line: &[u8]) -> Option<&[u8]> {
    memchr(FRAME_BYTE, line).map(|pos| &line[pos + 1..])
}

#[inline]
pub fn contains_frame_byte(bytes: &[u8]) -> bool {
    memchr(FRAME_BYTE, bytes).is_some()
}
