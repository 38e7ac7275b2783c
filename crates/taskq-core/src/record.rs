// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed view over a task's persisted key/value payload.
//!
//! The payload is a heterogeneous keyed record with a small set of
//! conventional lifecycle keys; we model it as a [`serde_yaml::Mapping`]
//! — a tagged-value tree of scalars, sequences and maps — and layer typed
//! accessors for the
//! lifecycle fields on top, so callers never hand-roll a YAML key lookup.
//! Every value set through these accessors survives an encode→decode round
//! trip through `serde_yaml` unchanged.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde_yaml::{Mapping, Value};

use crate::error::TaskqError;

/// A single task's persisted fields, as an ordered keyed mapping.
///
/// Unrecognized keys set by the producer (arbitrary payload data) survive
/// untouched across every mutator in this type: mutators only ever insert
/// or overwrite the specific lifecycle key they document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskRecord {
    fields: Mapping,
}

/// The `progress` submap: `{percentage, status, updated_at}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub percentage: u8,
    pub status: Option<String>,
    pub updated_at: DateTime<Utc>,
}

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

impl TaskRecord {
    /// An empty record (used by producers building a fresh payload).
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a decoded YAML value. Fails if the top level isn't a mapping.
    pub fn from_value(value: Value) -> Result<Self, TaskqError> {
        match value {
            Value::Mapping(fields) => Ok(Self { fields }),
            other => Err(TaskqError::Serde(serde_yaml::Error::custom(format!(
                "expected a mapping at the task root, got {other:?}"
            )))),
        }
    }

    /// Decode a record from its YAML-encoded bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, TaskqError> {
        let value: Value = serde_yaml::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Encode the record to YAML bytes.
    pub fn encode(&self) -> Result<Vec<u8>, TaskqError> {
        Ok(serde_yaml::to_string(&Value::Mapping(self.fields.clone()))?.into_bytes())
    }

    /// Borrow the underlying mapping (for merging caller-provided payload
    /// data when a task is first created).
    pub fn fields(&self) -> &Mapping {
        &self.fields
    }

    /// Mutably borrow the underlying mapping.
    pub fn fields_mut(&mut self) -> &mut Mapping {
        &mut self.fields
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(key(name))
    }

    fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(key(name), value);
    }

    fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    fn get_datetime(&self, name: &str) -> Option<DateTime<Utc>> {
        self.get_str(name)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn set_datetime(&mut self, name: &str, dt: DateTime<Utc>) {
        self.set(name, Value::String(dt.to_rfc3339()));
    }

    // -- created_at / created_by -------------------------------------------

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.get_datetime("created_at")
    }

    pub fn set_created_at(&mut self, dt: DateTime<Utc>) {
        self.set_datetime("created_at", dt);
    }

    pub fn created_by(&self) -> Option<i64> {
        self.get_i64("created_by")
    }

    pub fn set_created_by(&mut self, pid: i64) {
        self.set("created_by", Value::from(pid));
    }

    // -- priority / retries --------------------------------------------------

    /// Producer-set priority, falling back to `default` when absent or
    /// unparseable.
    pub fn priority(&self, default: i64) -> i64 {
        self.get_i64("priority").unwrap_or(default)
    }

    pub fn retries(&self) -> u32 {
        self.get_i64("retries").unwrap_or(0).max(0) as u32
    }

    pub fn set_retries(&mut self, retries: u32) {
        self.set("retries", Value::from(retries as u64));
    }

    /// Increment retries and return the new count. Monotonic by construction.
    pub fn increment_retries(&mut self) -> u32 {
        let next = self.retries() + 1;
        self.set_retries(next);
        next
    }

    // -- ownership: session_id / process_id / host / started_at -------------

    pub fn session_id(&self) -> Option<&str> {
        self.get_str("session_id")
    }

    pub fn set_session_id(&mut self, id: &str) {
        self.set("session_id", Value::String(id.to_string()));
    }

    pub fn process_id(&self) -> Option<i64> {
        self.get_i64("process_id")
    }

    pub fn set_process_id(&mut self, pid: i64) {
        self.set("process_id", Value::from(pid));
    }

    pub fn host(&self) -> Option<&str> {
        self.get_str("host")
    }

    pub fn set_host(&mut self, host: &str) {
        self.set("host", Value::String(host.to_string()));
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.get_datetime("started_at")
    }

    /// `true` if `started_at` is present but fails to parse as RFC 3339 —
    /// distinct from "absent", since recovery treats malformed and missing
    /// timestamps the same way but the distinction matters for logging.
    pub fn started_at_malformed(&self) -> bool {
        self.get_str("started_at").is_some() && self.get_datetime("started_at").is_none()
    }

    /// Returns `true` when every ownership field required of an in-progress
    /// task (invariant I2) decodes successfully.
    pub fn has_owner_fields(&self) -> bool {
        self.session_id().is_some()
            && self.process_id().is_some()
            && self.host().is_some()
            && self.started_at().is_some()
    }

    pub fn is_owned_by(&self, process_id: i64, session_id: &str) -> bool {
        self.process_id() == Some(process_id) && self.session_id() == Some(session_id)
    }

    /// Stamp the ownership fields recorded by the worker claiming this task.
    pub fn mark_started(&mut self, process_id: i64, host: &str, session_id: &str, now: DateTime<Utc>) {
        self.set_datetime("started_at", now);
        self.set_process_id(process_id);
        self.set_host(host);
        self.set_session_id(session_id);
    }

    // -- progress -------------------------------------------------------------

    pub fn progress(&self) -> Option<Progress> {
        let submap = match self.get("progress")? {
            Value::Mapping(m) => m,
            _ => return None,
        };
        let percentage = submap
            .get(key("percentage"))
            .and_then(Value::as_u64)
            .map(|p| p.min(100) as u8)
            .unwrap_or(0);
        let status = submap
            .get(key("status"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let updated_at = submap
            .get(key("updated_at"))
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap_or_else(Utc::now));
        Some(Progress {
            percentage,
            status,
            updated_at,
        })
    }

    /// Merge a progress update in place, clamping `percentage` to [0, 100].
    /// Accepts a signed value so a producer's out-of-range input (negative
    /// or over 100) is representable and gets clamped rather than rejected
    /// at the type level.
    pub fn set_progress(&mut self, percentage: Option<i32>, status: Option<&str>, now: DateTime<Utc>) {
        let mut submap = match self.get("progress") {
            Some(Value::Mapping(m)) => m.clone(),
            _ => Mapping::new(),
        };
        if let Some(pct) = percentage {
            submap.insert(key("percentage"), Value::from(pct.clamp(0, 100) as u64));
        }
        if let Some(status) = status {
            submap.insert(key("status"), Value::String(status.to_string()));
        }
        submap.insert(key("updated_at"), Value::String(now.to_rfc3339()));
        self.set("progress", Value::Mapping(submap));
    }

    // -- terminal fields --------------------------------------------------------

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.get_datetime("completed_at")
    }

    pub fn success(&self) -> Option<bool> {
        self.get("success").and_then(Value::as_bool)
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.get("duration_seconds").and_then(Value::as_f64)
    }

    /// Stamp the terminal record: `completed_at`, `success`, `results`,
    /// `error`, and `duration_seconds = completed_at - started_at` clamped
    /// to be non-negative (a clock skew or missing `started_at` must never
    /// produce a negative duration).
    pub fn mark_completed(
        &mut self,
        success: bool,
        results: Option<Value>,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) {
        self.set_datetime("completed_at", now);
        self.set("success", Value::from(success));
        if let Some(results) = results {
            self.set("results", results);
        }
        if let Some(error) = error {
            self.set("error", Value::String(error.to_string()));
        }
        let duration = self
            .started_at()
            .map(|started| (now - started).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
            .max(0.0);
        self.set("duration_seconds", Value::from(duration));
    }

    // -- recovery trace fields --------------------------------------------------

    pub fn failure_reason(&self) -> Option<&str> {
        self.get_str("failure_reason")
    }

    pub fn recovered_by(&self) -> Option<i64> {
        self.get_i64("recovered_by")
    }

    /// Apply the recovery engine's abandonment trace: bump `retries`,
    /// stamp `last_failed`/`failure_reason`/`recovered_by`.
    pub fn mark_stale(&mut self, reason: &str, recovered_by_pid: i64, now: DateTime<Utc>) {
        self.increment_retries();
        self.set_datetime("last_failed", now);
        self.set("failure_reason", Value::String(reason.to_string()));
        self.set("recovered_by", Value::from(recovered_by_pid));
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
