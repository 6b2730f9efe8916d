// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded shared-region message queue between cooperating processes.
//!
//! The wire layout is a sequence of length-prefixed records in one fixed
//! byte region guarded by a mutex: `kind: u32 | payload_size: u32 |
//! payload` with a UTF-8 JSON payload. Producers append under the lock and
//! wait out a full region; consumers copy the whole region out under the
//! lock and decode outside it, so producers can continue immediately.
//!
//! The region/mutex pair here is in-process (`Arc<Mutex<..>>` plus a named
//! registry); a platform layer can substitute real shared memory and a
//! named OS mutex without touching the codec or the queue discipline.

use crate::error::{Result, SemindexError};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Byte size of the record header (`kind` + `payload_size`).
const HEADER_SIZE: usize = 8;

/// How long a producer sleeps before re-checking a full region.
const FULL_REGION_BACKOFF: Duration = Duration::from_millis(16);

/// Record kinds on the wire. Zero is reserved: it is what a reader would
/// see at the free boundary, never a valid message.
const KIND_INVALID: u32 = 0;
const KIND_IS_ALIVE: u32 = 1;
const KIND_IMPORT_INDEX: u32 = 2;
const KIND_CREATE_INDEX: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcMessage {
    /// Heartbeat between the language server and the indexer host.
    IsAlive,
    /// Import an existing on-disk artifact.
    ImportIndex { path: String },
    /// Parse and index a file with the given compiler arguments.
    CreateIndex { path: String, args: Vec<String> },
}

#[derive(Serialize, Deserialize)]
struct ImportIndexPayload {
    path: String,
}

#[derive(Serialize, Deserialize)]
struct CreateIndexPayload {
    path: String,
    args: Vec<String>,
}

impl IpcMessage {
    fn kind(&self) -> u32 {
        match self {
            IpcMessage::IsAlive => KIND_IS_ALIVE,
            IpcMessage::ImportIndex { .. } => KIND_IMPORT_INDEX,
            IpcMessage::CreateIndex { .. } => KIND_CREATE_INDEX,
        }
    }

    fn payload(&self) -> Result<Vec<u8>> {
        Ok(match self {
            IpcMessage::IsAlive => Vec::new(),
            IpcMessage::ImportIndex { path } => serde_json::to_vec(&ImportIndexPayload {
                path: path.clone(),
            })?,
            IpcMessage::CreateIndex { path, args } => serde_json::to_vec(&CreateIndexPayload {
                path: path.clone(),
                args: args.clone(),
            })?,
        })
    }

    fn decode(kind: u32, payload: &[u8]) -> Result<IpcMessage> {
        match kind {
            KIND_IS_ALIVE => Ok(IpcMessage::IsAlive),
            KIND_IMPORT_INDEX => {
                let payload: ImportIndexPayload = serde_json::from_slice(payload)?;
                Ok(IpcMessage::ImportIndex { path: payload.path })
            }
            KIND_CREATE_INDEX => {
                let payload: CreateIndexPayload = serde_json::from_slice(payload)?;
                Ok(IpcMessage::CreateIndex {
                    path: payload.path,
                    args: payload.args,
                })
            }
            other => Err(SemindexError::Protocol(format!(
                "unknown ipc message kind {}",
                other
            ))),
        }
    }
}

/// The bytes the cooperating sides share.
struct Region {
    data: Vec<u8>,
    bytes_used: usize,
}

impl Region {
    fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            bytes_used: 0,
        }
    }
}

/// Queues are discovered by name, like their OS-level counterparts.
static NAMED_REGIONS: Lazy<Mutex<HashMap<String, Arc<Mutex<Region>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub struct IpcMessageQueue {
    region: Arc<Mutex<Region>>,
    capacity: usize,
}

impl IpcMessageQueue {
    /// Open (or create) the queue named `name`. All openers of one name
    /// share the same region.
    pub fn open(name: &str, capacity: usize) -> Self {
        let region = NAMED_REGIONS
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Region::new(capacity))))
            .clone();
        Self { region, capacity }
    }

    /// A private queue, for tests and single-process use.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            region: Arc::new(Mutex::new(Region::new(capacity))),
            capacity,
        }
    }

    /// Append one message, blocking in 16 ms steps while the region is
    /// full. A message that can never fit is a caller bug, not a runtime
    /// condition.
    pub fn push(&self, message: &IpcMessage) -> Result<()> {
        let payload = message.payload()?;
        let record_size = HEADER_SIZE + payload.len();
        assert!(
            record_size <= self.capacity,
            "ipc payload of {} bytes can never fit the {} byte region; increase the region size",
            payload.len(),
            self.capacity
        );

        let mut logged_full = false;
        loop {
            {
                let mut region = self.region.lock().unwrap();
                if region.bytes_used + record_size <= self.capacity {
                    let offset = region.bytes_used;
                    region.data[offset..offset + 4].copy_from_slice(&message.kind().to_le_bytes());
                    region.data[offset + 4..offset + 8]
                        .copy_from_slice(&(payload.len() as u32).to_le_bytes());
                    region.data[offset + 8..offset + 8 + payload.len()].copy_from_slice(&payload);
                    region.bytes_used += record_size;
                    return Ok(());
                }
            }

            if !logged_full {
                tracing::info!("ipc region full, waiting for a drain");
                logged_full = true;
            }
            std::thread::sleep(FULL_REGION_BACKOFF);
        }
    }

    /// Take every pending message. The region is copied out and reset
    /// under the lock; decoding happens outside it so producers can post
    /// again as soon as possible.
    pub fn drain(&self) -> Result<Vec<IpcMessage>> {
        let local: Vec<u8> = {
            let mut region = self.region.lock().unwrap();
            let used = region.bytes_used;
            region.bytes_used = 0;
            region.data[..used].to_vec()
        };

        let mut messages = Vec::new();
        let mut offset = 0;
        while offset < local.len() {
            if offset + HEADER_SIZE > local.len() {
                return Err(SemindexError::Protocol(
                    "truncated ipc record header".to_string(),
                ));
            }
            let kind = u32::from_le_bytes(local[offset..offset + 4].try_into().unwrap());
            let payload_size =
                u32::from_le_bytes(local[offset + 4..offset + 8].try_into().unwrap()) as usize;
            if kind == KIND_INVALID {
                return Err(SemindexError::Protocol(
                    "invalid ipc message kind 0".to_string(),
                ));
            }
            let payload_start = offset + HEADER_SIZE;
            let payload_end = payload_start + payload_size;
            if payload_end > local.len() {
                return Err(SemindexError::Protocol(format!(
                    "ipc payload of {} bytes overruns the drained region",
                    payload_size
                )));
            }
            messages.push(IpcMessage::decode(kind, &local[payload_start..payload_end])?);
            offset = payload_end;
        }
        Ok(messages)
    }
}
