//! Jobs topic and message-body construction and matching.
//!
//! ```text
//! start-next request   : $protocol/things/<D>/jobs/start-next
//! start-next accepted  : $protocol/things/<D>/jobs/start-next/accepted
//! status update        : $protocol/things/<D>/jobs/<J>/update
//! status update result : $protocol/things/<D>/jobs/<J>/update/<accepted|rejected>
//!
//! start-next body      : {"clientToken":"<token>"}
//! status update body   : {"status":"<STATUS>","expectedVersion":"<version>"}
//! ```
//!
//! Builders write into a caller-supplied buffer and return the number of
//! bytes written.  `None` means nothing was written: an input was empty or
//! malformed, or the buffer is too small for the whole result.  Partial
//! output is never produced, so a `None` must never be published.
//!
//! Matchers rebuild the topic expected for this device and compare it with
//! the inbound topic, lengths first and then bytes.

use crate::config::TOPIC_BUFFER_SIZE;
use crate::identity::DeviceIdentity;

use super::status::{JobStatus, JobUpdateStatus};

/// Common prefix of every device-scoped topic.
pub const TOPIC_PREFIX: &str = "$protocol/things/";

const JOBS: &str = "/jobs/";
const START_NEXT: &str = "start-next";
const UPDATE: &str = "/update";

// ── Input hygiene ─────────────────────────────────────────────

/// A topic segment must be non-empty and must not contain a level
/// separator, a wildcard or NUL.
pub fn is_topic_segment_safe(segment: &str) -> bool {
    !segment.is_empty()
        && !segment
            .bytes()
            .any(|b| matches!(b, b'/' | b'+' | b'#' | 0))
}

/// A value spliced between JSON quotes must be non-empty and must not
/// need escaping.
pub fn is_json_string_safe(value: &str) -> bool {
    !value.is_empty()
        && !value
            .bytes()
            .any(|b| b == b'"' || b == b'\\' || b < 0x20)
}

/// Copy `parts` back to back into `buf`, or write nothing if they do not fit.
fn write_parts(buf: &mut [u8], parts: &[&str]) -> Option<usize> {
    let total: usize = parts.iter().map(|p| p.len()).sum();
    if total > buf.len() {
        return None;
    }
    let mut pos = 0;
    for part in parts {
        buf[pos..pos + part.len()].copy_from_slice(part.as_bytes());
        pos += part.len();
    }
    Some(total)
}

// ── Builders ──────────────────────────────────────────────────

/// `$protocol/things/<D>/jobs/start-next`
pub fn build_start_next_topic(device_id: &str, buf: &mut [u8]) -> Option<usize> {
    if !is_topic_segment_safe(device_id) {
        return None;
    }
    write_parts(buf, &[TOPIC_PREFIX, device_id, JOBS, START_NEXT])
}

/// `$protocol/things/<D>/jobs/start-next/accepted`, the subscription for
/// job assignments.
pub fn build_start_next_accepted_topic(device_id: &str, buf: &mut [u8]) -> Option<usize> {
    if !is_topic_segment_safe(device_id) {
        return None;
    }
    write_parts(
        buf,
        &[TOPIC_PREFIX, device_id, JOBS, START_NEXT, "/", JobUpdateStatus::Accepted.as_str()],
    )
}

/// `{"clientToken":"<token>"}`
pub fn build_start_next_message(client_token: &str, buf: &mut [u8]) -> Option<usize> {
    if !is_json_string_safe(client_token) {
        return None;
    }
    write_parts(buf, &["{\"clientToken\":\"", client_token, "\"}"])
}

/// `$protocol/things/<D>/jobs/<J>/update`
pub fn build_update_topic(device_id: &str, job_id: &str, buf: &mut [u8]) -> Option<usize> {
    if !is_topic_segment_safe(device_id) || !is_topic_segment_safe(job_id) {
        return None;
    }
    write_parts(buf, &[TOPIC_PREFIX, device_id, JOBS, job_id, UPDATE])
}

/// `$protocol/things/<D>/jobs/<J>/update/<accepted|rejected>`
pub fn build_update_result_topic(
    device_id: &str,
    job_id: &str,
    status: JobUpdateStatus,
    buf: &mut [u8],
) -> Option<usize> {
    if !is_topic_segment_safe(device_id) || !is_topic_segment_safe(job_id) {
        return None;
    }
    write_parts(
        buf,
        &[TOPIC_PREFIX, device_id, JOBS, job_id, UPDATE, "/", status.as_str()],
    )
}

/// `$protocol/things/<D>/jobs/+/update/<accepted|rejected>`, the
/// subscription filter for update results of any job.
pub fn build_update_result_filter(
    device_id: &str,
    status: JobUpdateStatus,
    buf: &mut [u8],
) -> Option<usize> {
    if !is_topic_segment_safe(device_id) {
        return None;
    }
    write_parts(
        buf,
        &[TOPIC_PREFIX, device_id, JOBS, "+", UPDATE, "/", status.as_str()],
    )
}

/// `{"status":"<STATUS>","expectedVersion":"<version>"}`
pub fn build_update_message(
    status: JobStatus,
    expected_version: &str,
    buf: &mut [u8],
) -> Option<usize> {
    if !is_json_string_safe(expected_version) {
        return None;
    }
    write_parts(
        buf,
        &[
            "{\"status\":\"",
            status.as_str(),
            "\",\"expectedVersion\":\"",
            expected_version,
            "\"}",
        ],
    )
}

/// View the first `len` bytes of a builder's output as a topic string.
pub fn as_topic(buf: &[u8], len: usize) -> Option<&str> {
    buf.get(..len).and_then(|b| core::str::from_utf8(b).ok())
}

// ── Matchers ──────────────────────────────────────────────────

fn same_topic(expected: &[u8], topic: &str) -> bool {
    expected.len() == topic.len() && expected == topic.as_bytes()
}

/// Does `topic` carry a start-next reply accepted for this device?
pub fn is_start_next_accepted(identity: &DeviceIdentity, topic: &str) -> bool {
    if topic.is_empty() {
        return false;
    }
    let mut expected = [0u8; TOPIC_BUFFER_SIZE];
    match build_start_next_accepted_topic(identity.as_str(), &mut expected) {
        Some(len) => same_topic(&expected[..len], topic),
        None => false,
    }
}

/// Does `topic` carry the `expected` update result for `job_id` on this
/// device?
pub fn is_job_update_status(
    identity: &DeviceIdentity,
    topic: &str,
    job_id: &str,
    expected: JobUpdateStatus,
) -> bool {
    if topic.is_empty() || job_id.is_empty() {
        return false;
    }
    let mut expected_topic = [0u8; TOPIC_BUFFER_SIZE];
    match build_update_result_topic(identity.as_str(), job_id, expected, &mut expected_topic) {
        Some(len) => same_topic(&expected_topic[..len], topic),
        None => false,
    }
}
