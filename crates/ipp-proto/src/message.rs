//! IPP message model and binary encode/decode.
//!
//! A message is a header (version, code, request-id) plus an attribute
//! multimap keyed by (group, name, value-tag). Groups encode in ascending
//! tag order; within a group attributes keep insertion order, which is how
//! the mandatory charset/natural-language pair stays first in responses.

use std::collections::BTreeMap;

use tracing::trace;

use crate::tags::{self, is_delimiter};
use crate::{IPP_VERSION, IppError, Result};

/// One attribute: a value tag, a name, and one or more raw value payloads.
///
/// Additional values of a 1setOf share the first value's name and tag and
/// are carried here as extra entries in `values`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Value tag describing the payload type.
    pub tag: u8,
    /// Attribute name (never empty in the model; continuation entries on
    /// the wire resolve to the preceding name during decode).
    pub name: String,
    /// Ordered raw value payloads, at least one.
    pub values: Vec<Vec<u8>>,
}

/// A decoded or under-construction IPP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IppMessage {
    /// Protocol version (major, minor).
    pub version: (u8, u8),
    /// Operation-id on requests, status-code on responses.
    pub code: u16,
    /// Request identifier, echoed on responses.
    pub request_id: u32,
    groups: BTreeMap<u8, Vec<Attribute>>,
}

impl IppMessage {
    /// Create an empty request with the given operation code.
    pub fn request(operation: u16, request_id: u32) -> Self {
        Self {
            version: IPP_VERSION,
            code: operation,
            request_id,
            groups: BTreeMap::new(),
        }
    }

    /// Create an empty response with the given status code.
    ///
    /// Responses always carry version 1.1 regardless of what the request
    /// claimed.
    pub fn response(status: u16, request_id: u32) -> Self {
        Self {
            version: IPP_VERSION,
            code: status,
            request_id,
            groups: BTreeMap::new(),
        }
    }

    // -- Decode --

    /// Decode a message from the front of `buf`.
    ///
    /// Returns the message and the number of bytes consumed (through the
    /// end-of-attributes tag); anything after that is the caller's problem
    /// — for Print-Job it is the document payload.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let mut r = Reader { buf, pos: 0 };

        let major = r.u8()?;
        let minor = r.u8()?;
        let code = r.u16()?;
        let request_id = r.u32()?;
        trace!(major, minor, code, request_id, "decoding IPP message");

        let mut groups: BTreeMap<u8, Vec<Attribute>> = BTreeMap::new();
        let mut current_group: Option<u8> = None;
        let mut last_name: Option<String> = None;

        loop {
            let tag = r.u8().map_err(|_| IppError::MissingEndOfAttributes)?;

            if is_delimiter(tag) {
                if tag == tags::TAG_END_OF_ATTRIBUTES {
                    break;
                }
                current_group = Some(tag);
                last_name = None;
                groups.entry(tag).or_default();
                continue;
            }

            let group = current_group.ok_or(IppError::AttributeOutsideGroup)?;

            let name_len = r.u16()? as usize;
            let name = if name_len == 0 {
                last_name.clone().ok_or(IppError::MissingContinuationName)?
            } else {
                String::from_utf8_lossy(r.bytes(name_len)?).into_owned()
            };

            let value_len = r.u16()? as usize;
            let value = r.bytes(value_len)?.to_vec();

            let attrs = groups.entry(group).or_default();
            match attrs.iter_mut().rev().find(|a| a.name == name && a.tag == tag) {
                Some(attr) => attr.values.push(value),
                None => attrs.push(Attribute {
                    tag,
                    name: name.clone(),
                    values: vec![value],
                }),
            }
            last_name = Some(name);
        }

        Ok((
            Self {
                version: (major, minor),
                code,
                request_id,
                groups,
            },
            r.pos,
        ))
    }

    // -- Encode --

    /// Encode the message, group tags ascending, end-of-attributes last.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.push(self.version.0);
        buf.push(self.version.1);
        buf.extend_from_slice(&self.code.to_be_bytes());
        buf.extend_from_slice(&self.request_id.to_be_bytes());

        for (&group, attrs) in &self.groups {
            if attrs.is_empty() {
                continue;
            }
            buf.push(group);
            for attr in attrs {
                for (i, value) in attr.values.iter().enumerate() {
                    buf.push(attr.tag);
                    if i == 0 {
                        let name = attr.name.as_bytes();
                        buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
                        buf.extend_from_slice(name);
                    } else {
                        // Additional value of a 1setOf: zero-length name.
                        buf.extend_from_slice(&0u16.to_be_bytes());
                    }
                    buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
                    buf.extend_from_slice(value);
                }
            }
        }

        buf.push(tags::TAG_END_OF_ATTRIBUTES);
        buf
    }

    // -- Attribute access --

    /// Attributes of one group, in insertion order.
    pub fn group(&self, group: u8) -> &[Attribute] {
        self.groups.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Find an attribute by group and name.
    pub fn attribute(&self, group: u8, name: &str) -> Option<&Attribute> {
        self.group(group).iter().find(|a| a.name == name)
    }

    /// First value of an attribute as a UTF-8 string.
    pub fn string(&self, group: u8, name: &str) -> Option<String> {
        self.attribute(group, name)
            .and_then(|a| a.values.first())
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// First value of an attribute as a big-endian i32.
    pub fn integer(&self, group: u8, name: &str) -> Option<i32> {
        self.attribute(group, name)
            .and_then(|a| a.values.first())
            .and_then(|v| <[u8; 4]>::try_from(v.as_slice()).ok())
            .map(i32::from_be_bytes)
    }

    // -- Attribute builders (chainable, presswerk-style) --

    /// Append a raw attribute value under (group, name, tag), merging into
    /// an existing attribute with the same key.
    pub fn push_value(&mut self, group: u8, tag: u8, name: &str, value: Vec<u8>) -> &mut Self {
        let attrs = self.groups.entry(group).or_default();
        match attrs.iter_mut().rev().find(|a| a.name == name && a.tag == tag) {
            Some(attr) => attr.values.push(value),
            None => attrs.push(Attribute {
                tag,
                name: name.to_string(),
                values: vec![value],
            }),
        }
        self
    }

    /// textWithoutLanguage attribute.
    pub fn text(&mut self, group: u8, name: &str, value: &str) -> &mut Self {
        self.push_value(group, tags::VALUE_TAG_TEXT, name, value.as_bytes().to_vec())
    }

    /// nameWithoutLanguage attribute.
    pub fn name(&mut self, group: u8, name: &str, value: &str) -> &mut Self {
        self.push_value(group, tags::VALUE_TAG_NAME, name, value.as_bytes().to_vec())
    }

    /// keyword attribute (multiple calls with the same name build a 1setOf).
    pub fn keyword(&mut self, group: u8, name: &str, value: &str) -> &mut Self {
        self.push_value(group, tags::VALUE_TAG_KEYWORD, name, value.as_bytes().to_vec())
    }

    /// uri attribute.
    pub fn uri(&mut self, group: u8, name: &str, value: &str) -> &mut Self {
        self.push_value(group, tags::VALUE_TAG_URI, name, value.as_bytes().to_vec())
    }

    /// charset attribute.
    pub fn charset(&mut self, group: u8, name: &str, value: &str) -> &mut Self {
        self.push_value(group, tags::VALUE_TAG_CHARSET, name, value.as_bytes().to_vec())
    }

    /// naturalLanguage attribute.
    pub fn natural_language(&mut self, group: u8, name: &str, value: &str) -> &mut Self {
        self.push_value(
            group,
            tags::VALUE_TAG_NATURAL_LANGUAGE,
            name,
            value.as_bytes().to_vec(),
        )
    }

    /// mimeMediaType attribute.
    pub fn mime_type(&mut self, group: u8, name: &str, value: &str) -> &mut Self {
        self.push_value(
            group,
            tags::VALUE_TAG_MIME_MEDIA_TYPE,
            name,
            value.as_bytes().to_vec(),
        )
    }

    /// integer attribute.
    pub fn integer_attr(&mut self, group: u8, name: &str, value: i32) -> &mut Self {
        self.push_value(group, tags::VALUE_TAG_INTEGER, name, value.to_be_bytes().to_vec())
    }

    /// enum attribute (multiple calls with the same name build a 1setOf).
    pub fn enum_attr(&mut self, group: u8, name: &str, value: i32) -> &mut Self {
        self.push_value(group, tags::VALUE_TAG_ENUM, name, value.to_be_bytes().to_vec())
    }

    /// boolean attribute.
    pub fn boolean(&mut self, group: u8, name: &str, value: bool) -> &mut Self {
        self.push_value(
            group,
            tags::VALUE_TAG_BOOLEAN,
            name,
            vec![if value { 0x01 } else { 0x00 }],
        )
    }
}

/// Bounds-checked big-endian cursor over the input buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Result<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or(IppError::UnexpectedEof(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&e| e <= self.buf.len())
            .ok_or(IppError::UnexpectedEof(self.buf.len()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::*;

    /// Hand-assemble a request the way a client would put it on the wire.
    fn wire_request(operation: u16, request_id: u32, body: &[u8]) -> Vec<u8> {
        let mut buf = vec![1, 1];
        buf.extend_from_slice(&operation.to_be_bytes());
        buf.extend_from_slice(&request_id.to_be_bytes());
        buf.extend_from_slice(body);
        buf
    }

    fn wire_attr(buf: &mut Vec<u8>, tag: u8, name: &str, value: &[u8]) {
        buf.push(tag);
        buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
        buf.extend_from_slice(value);
    }

    fn minimal_operation_group() -> Vec<u8> {
        let mut body = vec![TAG_OPERATION_ATTRIBUTES];
        wire_attr(&mut body, VALUE_TAG_CHARSET, "attributes-charset", b"utf-8");
        wire_attr(
            &mut body,
            VALUE_TAG_NATURAL_LANGUAGE,
            "attributes-natural-language",
            b"en",
        );
        body
    }

    #[test]
    fn decode_minimal_request() {
        let mut body = minimal_operation_group();
        body.push(TAG_END_OF_ATTRIBUTES);
        let data = wire_request(0x000B, 42, &body);

        let (msg, used) = IppMessage::decode(&data).expect("decode");
        assert_eq!(msg.version, (1, 1));
        assert_eq!(msg.code, 0x000B);
        assert_eq!(msg.request_id, 42);
        assert_eq!(used, data.len());
        assert_eq!(
            msg.string(TAG_OPERATION_ATTRIBUTES, "attributes-charset").as_deref(),
            Some("utf-8")
        );
    }

    #[test]
    fn decode_reports_trailing_document_offset() {
        let mut body = minimal_operation_group();
        body.push(TAG_END_OF_ATTRIBUTES);
        let mut data = wire_request(0x0002, 7, &body);
        let ipp_len = data.len();
        data.extend_from_slice(b"%PDF-1.4 pretend document");

        let (_, used) = IppMessage::decode(&data).expect("decode");
        assert_eq!(used, ipp_len);
        assert_eq!(&data[used..], b"%PDF-1.4 pretend document");
    }

    #[test]
    fn name_continuation_merges_values() {
        let mut body = minimal_operation_group();
        body.push(TAG_PRINTER_ATTRIBUTES);
        wire_attr(&mut body, VALUE_TAG_KEYWORD, "media-supported", b"roll_57mm");
        wire_attr(&mut body, VALUE_TAG_KEYWORD, "", b"roll_58mm");
        body.push(TAG_END_OF_ATTRIBUTES);
        let data = wire_request(0x000B, 1, &body);

        let (msg, _) = IppMessage::decode(&data).expect("decode");
        let attr = msg
            .attribute(TAG_PRINTER_ATTRIBUTES, "media-supported")
            .expect("attribute");
        assert_eq!(attr.values.len(), 2);
        assert_eq!(attr.values[0], b"roll_57mm");
        assert_eq!(attr.values[1], b"roll_58mm");
    }

    #[test]
    fn continuation_without_preceding_name_fails() {
        let mut body = vec![TAG_OPERATION_ATTRIBUTES];
        wire_attr(&mut body, VALUE_TAG_KEYWORD, "", b"orphan");
        body.push(TAG_END_OF_ATTRIBUTES);
        let data = wire_request(0x000B, 1, &body);

        assert!(matches!(
            IppMessage::decode(&data),
            Err(IppError::MissingContinuationName)
        ));
    }

    #[test]
    fn attribute_before_group_fails() {
        let mut body = Vec::new();
        wire_attr(&mut body, VALUE_TAG_CHARSET, "attributes-charset", b"utf-8");
        body.push(TAG_END_OF_ATTRIBUTES);
        let data = wire_request(0x000B, 1, &body);

        assert!(matches!(
            IppMessage::decode(&data),
            Err(IppError::AttributeOutsideGroup)
        ));
    }

    #[test]
    fn missing_end_of_attributes_fails() {
        let body = minimal_operation_group();
        let data = wire_request(0x000B, 1, &body);

        assert!(matches!(
            IppMessage::decode(&data),
            Err(IppError::MissingEndOfAttributes)
        ));
    }

    #[test]
    fn truncated_value_fails() {
        let mut body = vec![TAG_OPERATION_ATTRIBUTES, VALUE_TAG_KEYWORD];
        body.extend_from_slice(&5u16.to_be_bytes());
        body.extend_from_slice(b"media");
        body.extend_from_slice(&100u16.to_be_bytes());
        body.extend_from_slice(b"short");
        let data = wire_request(0x000B, 1, &body);

        assert!(matches!(
            IppMessage::decode(&data),
            Err(IppError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn round_trip_preserves_multimap() {
        let mut msg = IppMessage::response(STATUS_OK, 99);
        msg.charset(TAG_OPERATION_ATTRIBUTES, "attributes-charset", "utf-8")
            .natural_language(TAG_OPERATION_ATTRIBUTES, "attributes-natural-language", "en");
        msg.keyword(TAG_PRINTER_ATTRIBUTES, "printer-state-reasons", "none")
            .enum_attr(TAG_PRINTER_ATTRIBUTES, "operations-supported", 0x0002)
            .enum_attr(TAG_PRINTER_ATTRIBUTES, "operations-supported", 0x000B)
            .boolean(TAG_PRINTER_ATTRIBUTES, "printer-is-accepting-jobs", true)
            .integer_attr(TAG_PRINTER_ATTRIBUTES, "queued-job-count", 0);
        msg.enum_attr(TAG_JOB_ATTRIBUTES, "job-state", 3);

        let encoded = msg.encode();
        let (decoded, used) = IppMessage::decode(&encoded).expect("decode");
        assert_eq!(used, encoded.len());
        assert_eq!(decoded, msg);

        // And a second round trip is byte-stable.
        assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn encode_orders_groups_ascending_and_once() {
        let mut msg = IppMessage::response(STATUS_OK, 1);
        // Inserted out of order on purpose.
        msg.enum_attr(TAG_PRINTER_ATTRIBUTES, "printer-state", 3);
        msg.enum_attr(TAG_JOB_ATTRIBUTES, "job-state", 9);
        msg.charset(TAG_OPERATION_ATTRIBUTES, "attributes-charset", "utf-8");

        let encoded = msg.encode();

        // Structural scan: delimiter bytes appear in ascending order, once each.
        let mut seen = Vec::new();
        let mut pos = 8;
        while pos < encoded.len() {
            let tag = encoded[pos];
            if is_delimiter(tag) {
                if tag == TAG_END_OF_ATTRIBUTES {
                    break;
                }
                seen.push(tag);
                pos += 1;
                continue;
            }
            pos += 1;
            let name_len = u16::from_be_bytes([encoded[pos], encoded[pos + 1]]) as usize;
            pos += 2 + name_len;
            let value_len = u16::from_be_bytes([encoded[pos], encoded[pos + 1]]) as usize;
            pos += 2 + value_len;
        }
        assert_eq!(
            seen,
            vec![TAG_OPERATION_ATTRIBUTES, TAG_JOB_ATTRIBUTES, TAG_PRINTER_ATTRIBUTES]
        );
    }

    #[test]
    fn multi_value_encodes_zero_length_continuation_name() {
        let mut msg = IppMessage::response(STATUS_OK, 5);
        msg.keyword(TAG_PRINTER_ATTRIBUTES, "media-supported", "roll_57mm")
            .keyword(TAG_PRINTER_ATTRIBUTES, "media-supported", "roll_58mm");

        let encoded = msg.encode();
        // Skip header + group tag + first attribute, then check the second
        // entry's name length is zero.
        let mut pos = 8 + 1; // header + printer group tag
        assert_eq!(encoded[pos], VALUE_TAG_KEYWORD);
        pos += 1;
        let name_len = u16::from_be_bytes([encoded[pos], encoded[pos + 1]]) as usize;
        assert_eq!(name_len, "media-supported".len());
        pos += 2 + name_len;
        let value_len = u16::from_be_bytes([encoded[pos], encoded[pos + 1]]) as usize;
        pos += 2 + value_len;

        assert_eq!(encoded[pos], VALUE_TAG_KEYWORD);
        pos += 1;
        let cont_name_len = u16::from_be_bytes([encoded[pos], encoded[pos + 1]]);
        assert_eq!(cont_name_len, 0);
    }

    #[test]
    fn unknown_value_tags_pass_through() {
        let mut body = minimal_operation_group();
        wire_attr(&mut body, 0x7F, "vendor-blob", &[0xde, 0xad, 0xbe, 0xef]);
        body.push(TAG_END_OF_ATTRIBUTES);
        let data = wire_request(0x000B, 3, &body);

        let (msg, _) = IppMessage::decode(&data).expect("decode");
        let attr = msg
            .attribute(TAG_OPERATION_ATTRIBUTES, "vendor-blob")
            .expect("attribute");
        assert_eq!(attr.tag, 0x7F);
        assert_eq!(attr.values[0], vec![0xde, 0xad, 0xbe, 0xef]);

        let (again, _) = IppMessage::decode(&msg.encode()).expect("re-decode");
        assert_eq!(again, msg);
    }

    #[test]
    fn integer_getter_reads_big_endian() {
        let mut msg = IppMessage::request(0x0008, 2);
        msg.charset(TAG_OPERATION_ATTRIBUTES, "attributes-charset", "utf-8")
            .integer_attr(TAG_OPERATION_ATTRIBUTES, "job-id", 0x1234);
        let (decoded, _) = IppMessage::decode(&msg.encode()).expect("decode");
        assert_eq!(decoded.integer(TAG_OPERATION_ATTRIBUTES, "job-id"), Some(0x1234));
    }
}
