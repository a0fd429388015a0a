// SPDX-License-Identifier: MIT OR Apache-2.0
//! The event-generator CLI surface: build tokens and fire them at a running
//! place over UDP, without a full rule-base deployment.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use indexmap::IndexMap;

use tm_codec::builder::{fork_children, TokenBuilder};
use tm_codec::{branch_attribute_name, build_envelope, EnvelopeFields, DEFAULT_ATTRIBUTE_NAME};
use tm_core::validate::validate_token;
use tm_core::{MonitorData, Token, MAX_BRANCH};

/// `token-gen` arguments, mirroring the event-generator CLI surface.
///
/// Long flags use clap's `--name` convention rather than the collaborator's
/// original single-dash syntax; see `DESIGN.md` for why.
#[derive(Parser, Debug)]
#[command(name = "token-gen", about = "Fire synthetic tokens at a running place without a full rule-base deployment")]
pub struct Args {
    /// Rule-base version partition, `v[0-9]{3}`.
    #[arg(long)]
    pub version: String,
    /// Workflow/process name, recorded into the token's business data.
    #[arg(long)]
    pub process: String,
    /// Destination place (service name).
    #[arg(long)]
    pub place: String,
    /// Operation to invoke at the destination place.
    #[arg(long, default_value = "process")]
    pub operation: String,
    /// Number of root tokens to generate.
    #[arg(long, default_value_t = 1)]
    pub tokens: u32,
    /// Token lifetime in milliseconds from now. Omit for no expiry.
    #[arg(long)]
    pub expire: Option<i64>,
    /// Business data fields, `k=v,k2=v2`.
    #[arg(long)]
    pub data: Option<String>,
    /// Starting header sequence id (and the token id multiplier base).
    #[arg(long, default_value_t = 1)]
    pub sequenceid: u64,
    /// Originating event generator identifier, recorded in monitor data.
    #[arg(long)]
    pub generator: Option<String>,
    /// Accepted for CLI-surface parity; this binary has no rule-base
    /// deployment to consult, so resolution is always skipped.
    #[arg(long, default_value_t = false)]
    pub skipdeploy: bool,
    /// Stay running after sending, instead of exiting immediately.
    #[arg(long, default_value_t = false)]
    pub noexit: bool,
    /// Send `N` fork children (branch-tagged) instead of one root token per
    /// requested token, for exercising a join place directly.
    #[arg(long)]
    pub forkcount: Option<u32>,
    /// Comma-separated parent token ids; each generated token is sent
    /// tagged with the corresponding `joinId`, cycling if shorter than
    /// `tokens`.
    #[arg(long)]
    pub joinargs: Option<String>,
    /// Free-form variant tag, recorded into the token's business data.
    #[arg(long)]
    pub variant: Option<String>,
    /// `host:port` of the running place to send to.
    #[arg(long)]
    pub target: SocketAddr,
}

/// Everything wrong with a set of [`Args`] that should abort before any
/// network I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
    /// A data field was not `k=v` shaped.
    #[error("malformed data field: {0}")]
    MalformedDataField(String),
    /// A joinargs entry did not parse as a token id.
    #[error("malformed joinargs entry: {0}")]
    MalformedJoinArg(String),
    /// `forkcount` exceeds the branch encoding space.
    #[error("forkcount {requested} exceeds [1..{MAX_BRANCH}]")]
    ForkCountOutOfRange {
        /// The requested fan-out.
        requested: u32,
    },
    /// The constructed token itself failed validation.
    #[error("generated token failed validation: {0:?}")]
    Token(Vec<tm_core::validate::ValidationError>),
}

fn parse_data(raw: &str) -> Result<IndexMap<String, String>, ValidationFailure> {
    let mut data = IndexMap::new();
    for pair in raw.split(',').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').ok_or_else(|| ValidationFailure::MalformedDataField(pair.to_string()))?;
        data.insert(k.to_string(), v.to_string());
    }
    Ok(data)
}

fn parse_joinargs(raw: &str) -> Result<Vec<u64>, ValidationFailure> {
    raw.split(',')
        .filter(|p| !p.is_empty())
        .map(|p| p.trim().parse::<u64>().map_err(|_| ValidationFailure::MalformedJoinArg(p.to_string())))
        .collect()
}

/// One token built and ready to send, plus the wire metadata it needs.
pub struct Plan {
    /// The envelope XML for each outbound datagram.
    pub envelopes: Vec<String>,
}

/// Build the plan of envelopes `args` describes, without sending anything.
///
/// # Errors
///
/// Returns [`ValidationFailure`] if `data`/`joinargs` don't parse, if
/// `forkcount` is out of range, or if a built token fails
/// [`validate_token`].
pub fn build_plan(args: &Args, now_ms: i64) -> Result<Plan, ValidationFailure> {
    if let Some(forkcount) = args.forkcount {
        if forkcount == 0 || forkcount > MAX_BRANCH {
            return Err(ValidationFailure::ForkCountOutOfRange { requested: forkcount });
        }
    }

    let mut data = match &args.data {
        Some(raw) => parse_data(raw)?,
        None => IndexMap::new(),
    };
    data.insert("process".to_string(), args.process.clone());
    if let Some(variant) = &args.variant {
        data.insert("variant".to_string(), variant.clone());
    }

    let join_ids = match &args.joinargs {
        Some(raw) => parse_joinargs(raw)?,
        None => Vec::new(),
    };

    let not_after = args.expire.map_or(i64::MAX, |ms| now_ms + ms);
    let monitor_data = args.generator.as_ref().map(|generator| MonitorData {
        process_start_time: None,
        process_elapsed_time: None,
        event_generator_timestamp: Some(now_ms),
        source_event_generator: Some(generator.clone()),
    });

    let mut envelopes = Vec::new();
    for i in 0..args.tokens {
        let token_id = (args.sequenceid + u64::from(i)) * 100;
        let token = TokenBuilder::new(token_id, args.place.clone())
            .version(args.version.clone())
            .not_after(not_after)
            .workflow_start_time(now_ms)
            .build()
            .map(|mut t| {
                t.data = data.clone();
                t
            })
            .expect("version/not_after/workflow_start_time are all set above");
        validate_token(&token).map_err(ValidationFailure::Token)?;

        let sequence_id = args.sequenceid + u64::from(i);
        let join_id = join_ids.get(i as usize % join_ids.len().max(1)).copied();

        match args.forkcount {
            None => {
                envelopes.push(build_one(&token, args, sequence_id, DEFAULT_ATTRIBUTE_NAME.to_string(), join_id, monitor_data.clone())?);
            }
            Some(n) => {
                let children = fork_children(&token, n, &args.place).map_err(|e| ValidationFailure::Token(vec![tm_core::validate::ValidationError::InconsistentLineage { reason: e.to_string() }]))?;
                for child in &children {
                    let attribute_name = branch_attribute_name(child.branch_number);
                    envelopes.push(build_one(child, args, sequence_id, attribute_name, join_id, monitor_data.clone())?);
                }
            }
        }
    }

    Ok(Plan { envelopes })
}

fn build_one(
    token: &Token,
    args: &Args,
    sequence_id: u64,
    attribute_name: String,
    join_id: Option<u64>,
    monitor_data: Option<MonitorData>,
) -> Result<String, ValidationFailure> {
    build_envelope(EnvelopeFields {
        service_name: &args.place,
        operation: &args.operation,
        sequence_id,
        rule_base_version: &args.version,
        attribute_name,
        token,
        join_id,
        priortise_sid: false,
        monitor_data,
    })
    .map_err(|e| ValidationFailure::Token(vec![tm_core::validate::ValidationError::InconsistentLineage { reason: e.to_string() }]))
}

/// Send every envelope in `plan` to `target` over a fresh ephemeral socket.
///
/// # Errors
///
/// Propagates the first I/O failure encountered.
pub async fn send_plan(plan: &Plan, target: SocketAddr) -> std::io::Result<()> {
    let socket = Arc::new(tokio::net::UdpSocket::bind("0.0.0.0:0").await?);
    let sender = tm_net::Sender::new(socket);
    for (i, envelope) in plan.envelopes.iter().enumerate() {
        sender
            .send(envelope, &format!("token-gen-{i}"), target)
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?;
    }
    Ok(())
}
