// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tm-codec
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod chunk;
pub mod compress;
pub mod router;

use indexmap::IndexMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;
use tm_core::{Envelope, Header, JoinAttribute, MonitorData, ServiceRef, Token};

/// `status` value always written to an outbound `joinAttribute`.
const ACTIVE_STATUS: &str = "active";

/// Errors arising from envelope encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The XML could not be parsed, or a required field was absent.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The embedded JSON token body failed to parse.
    #[error("invalid token JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying XML writer/reader failure.
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Underlying I/O failure while writing the envelope.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Attribute name used for a normal (non-join) token arrival.
pub const DEFAULT_ATTRIBUTE_NAME: &str = "token";

/// Build the `token_branch{N}` attribute name for a join-bound fork child.
#[must_use]
pub fn branch_attribute_name(branch: u32) -> String {
    format!("token_branch{branch}")
}

/// Inputs needed to build an outbound envelope, mirroring the wire groups.
pub struct EnvelopeFields<'a> {
    /// Destination service name.
    pub service_name: &'a str,
    /// Destination operation.
    pub operation: &'a str,
    /// Scheduler sequence id.
    pub sequence_id: u64,
    /// Deployed rule-base version.
    pub rule_base_version: &'a str,
    /// Attribute name: `token` or `token_branch{N}`.
    pub attribute_name: String,
    /// The token body to embed.
    pub token: &'a Token,
    /// `joinId` header, set for join-bound children.
    pub join_id: Option<u64>,
    /// Whether the scheduler should order by `sequence_id`.
    pub priortise_sid: bool,
    /// Monitor data to attach, if monitoring is enabled.
    pub monitor_data: Option<MonitorData>,
}

/// Build the UTF-8 XML string of an outbound envelope: the exact nested
/// `<payload><header>...</header><service>...</service>
/// <joinAttribute>...</joinAttribute><monitorData>...</monitorData></payload>`
/// document, preceded by the `<?xml version="1.0" encoding="UTF-8"?>`
/// declaration.
///
/// Input strings unsafe for XML (`< > & " '`) are escaped by the writer.
/// The embedded JSON body is escaped as XML text. No pretty-printing is
/// performed; the only whitespace is the structural newlines between
/// groups.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the token cannot be serialized, or
/// [`CodecError::Xml`] if writing fails.
pub fn build_envelope(fields: EnvelopeFields<'_>) -> Result<String, CodecError> {
    let token_json = serde_json::to_string(fields.token)?;

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Text(BytesText::new("\n")))?;
    writer.write_event(Event::Start(BytesStart::new("payload")))?;
    writer.write_event(Event::Text(BytesText::new("\n")))?;

    write_group(&mut writer, "header", |w| {
        write_leaf(w, "sequenceId", &fields.sequence_id.to_string())?;
        write_leaf(w, "ruleBaseVersion", fields.rule_base_version)?;
        write_leaf(w, "priortiseSID", &fields.priortise_sid.to_string())?;
        write_leaf(
            w,
            "monitorIncomingEvents",
            &fields.monitor_data.is_some().to_string(),
        )?;
        if let Some(join_id) = fields.join_id {
            write_leaf(w, "joinID", &join_id.to_string())?;
        }
        Ok(())
    })?;

    write_group(&mut writer, "service", |w| {
        write_leaf(w, "serviceName", fields.service_name)?;
        write_leaf(w, "operation", fields.operation)?;
        Ok(())
    })?;

    write_group(&mut writer, "joinAttribute", |w| {
        write_leaf(w, "attributeName", &fields.attribute_name)?;
        write_leaf(w, "attributeValue", &token_json)?;
        write_leaf(w, "notAfter", &fields.token.not_after.to_string())?;
        write_leaf(w, "status", ACTIVE_STATUS)?;
        Ok(())
    })?;

    if let Some(monitor) = &fields.monitor_data {
        write_group(&mut writer, "monitorData", |w| {
            if let Some(v) = monitor.process_start_time {
                write_leaf(w, "processStartTime", &v.to_string())?;
            }
            if let Some(v) = monitor.process_elapsed_time {
                write_leaf(w, "processElapsedTime", &v.to_string())?;
            }
            if let Some(v) = monitor.event_generator_timestamp {
                write_leaf(w, "eventGeneratorTimestamp", &v.to_string())?;
            }
            if let Some(v) = &monitor.source_event_generator {
                write_leaf(w, "sourceEventGenerator", v)?;
            }
            Ok(())
        })?;
    }

    writer.write_event(Event::End(BytesEnd::new("payload")))?;
    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_group(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    tag: &str,
    body: impl FnOnce(&mut Writer<Cursor<Vec<u8>>>) -> Result<(), quick_xml::Error>,
) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new("\n")))?;
    body(writer)?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new("\n")))?;
    Ok(())
}

fn write_leaf(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    tag: &str,
    value: &str,
) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new("\n")))?;
    Ok(())
}

/// Parse a wire-format envelope into its header groups and decoded [`Token`].
///
/// Fails with [`CodecError::MalformedEnvelope`] if any required field is
/// absent, and with [`CodecError::Json`] if the embedded token body does
/// not parse.
///
/// # Errors
///
/// See variant docs on [`CodecError`].
pub fn parse_envelope(xml: &str) -> Result<Envelope, CodecError> {
    let mut leaves = IndexMap::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut tag_stack: Vec<String> = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => {
                tag_stack.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Event::End(_) => {
                tag_stack.pop();
            }
            Event::Text(t) => {
                if let Some(leaf) = tag_stack.last() {
                    let text = t.unescape()?.into_owned();
                    if !text.trim().is_empty() {
                        leaves.insert(leaf.clone(), text);
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    let require = |key: &str| -> Result<&String, CodecError> {
        leaves
            .get(key)
            .ok_or_else(|| CodecError::MalformedEnvelope(format!("missing field: {key}")))
    };

    let sequence_id: u64 = require("sequenceId")?
        .parse()
        .map_err(|_| CodecError::MalformedEnvelope("sequenceId not numeric".into()))?;
    let rule_base_version = require("ruleBaseVersion")?.clone();
    let priortise_sid = leaves.get("priortiseSID").map(|v| v == "true").unwrap_or(false);
    let monitor_incoming_events = leaves
        .get("monitorIncomingEvents")
        .map(|v| v == "true")
        .unwrap_or(false);
    let join_id = leaves.get("joinID").and_then(|v| v.parse::<u64>().ok());

    let service_name = require("serviceName")?.clone();
    let operation = require("operation")?.clone();

    let attribute_name = require("attributeName")?.clone();
    let attribute_value = require("attributeValue")?.clone();
    let not_after: i64 = require("notAfter")?
        .parse()
        .map_err(|_| CodecError::MalformedEnvelope("notAfter not numeric".into()))?;
    let status = require("status")?.clone();

    let token = parse_token_body(&attribute_value)?;

    let monitor_data = MonitorData {
        process_start_time: leaves.get("processStartTime").and_then(|v| v.parse().ok()),
        process_elapsed_time: leaves.get("processElapsedTime").and_then(|v| v.parse().ok()),
        event_generator_timestamp: leaves
            .get("eventGeneratorTimestamp")
            .and_then(|v| v.parse().ok()),
        source_event_generator: leaves.get("sourceEventGenerator").cloned(),
    };

    Ok(Envelope {
        header: Header {
            sequence_id,
            rule_base_version,
            priortise_sid,
            monitor_incoming_events,
            join_id,
        },
        service: ServiceRef {
            name: service_name,
            operation,
        },
        join_attribute: JoinAttribute {
            attribute_name,
            attribute_value,
            not_after,
            status,
        },
        monitor_data,
        token,
    })
}

/// Wrapper shape an upstream place may use: `{ "P_X": { ...token fields... } }`.
#[derive(Debug, Deserialize)]
struct WrappedTokenBody {
    #[serde(flatten)]
    inner: IndexMap<String, serde_json::Value>,
}

/// Parse the JSON token body, transparently unwrapping a single-key place
/// wrapper (`{ "P_X": {...} }`) when present.
///
/// Detection: exactly one top-level key whose value is an object containing
/// at least one of `tokenId`, `version`, `workflow_start_time`, `status`.
/// After unwrapping, the inner `data` sub-object is flattened into the
/// token's data map; `workflow_start_time` present at either level is
/// preserved at the top.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the body is neither a valid bare token
/// nor a valid wrapped token.
pub fn parse_token_body(raw: &str) -> Result<Token, CodecError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;

    let body = if let serde_json::Value::Object(map) = &value {
        if map.len() == 1 {
            let (_, inner) = map.iter().next().unwrap();
            if is_token_shaped(inner) {
                inner.clone()
            } else {
                value.clone()
            }
        } else {
            value.clone()
        }
    } else {
        value.clone()
    };

    Ok(serde_json::from_value(body)?)
}

fn is_token_shaped(value: &serde_json::Value) -> bool {
    let serde_json::Value::Object(map) = value else {
        return false;
    };
    ["tokenId", "version", "workflow_start_time", "status", "token_id"]
        .iter()
        .any(|k| map.contains_key(*k))
}

/// Build the outbound response JSON `{ placeId: { ...flat fields..., data: {...} } }`
/// after a business handler returns. The wrapping key is always the
/// producing place's id (never the successor's); `workflow_start_time` is
/// hoisted to the inner object's top level.
#[must_use]
pub fn build_response(
    producing_place: &str,
    token: &Token,
    handler_result: serde_json::Value,
    routing_path: Option<&str>,
) -> serde_json::Value {
    let mut inner = serde_json::Map::new();
    inner.insert("tokenId".into(), serde_json::json!(token.token_id));
    inner.insert("version".into(), serde_json::json!(token.version));
    inner.insert("notAfter".into(), serde_json::json!(token.not_after));
    inner.insert("currentPlace".into(), serde_json::json!(token.current_place));
    inner.insert(
        "workflow_start_time".into(),
        serde_json::json!(token.workflow_start_time),
    );

    let mut data = serde_json::Map::new();
    for (k, v) in &token.data {
        data.insert(k.clone(), serde_json::json!(v));
    }
    if let serde_json::Value::Object(extra) = &handler_result {
        for (k, v) in extra {
            data.insert(k.clone(), v.clone());
        }
    }
    inner.insert("data".into(), serde_json::Value::Object(data));

    if let Some(path) = routing_path {
        inner.insert(
            "routing_decision".into(),
            serde_json::json!({ "routing_path": path }),
        );
    }

    let mut outer = serde_json::Map::new();
    outer.insert(producing_place.to_string(), serde_json::Value::Object(inner));
    serde_json::Value::Object(outer)
}
