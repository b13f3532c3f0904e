//! Field extraction from start-next replies and OTA job documents.
//!
//! A start-next reply looks like
//!
//! ```text
//! {"clientToken":"…","execution":{"jobId":"…","versionNumber":1,
//!   "jobDocument":{"afr_ota":{"streamname":"…",
//!     "files":[{"fileid":0,"filesize":1234,"filepath":"…"}]}}}}
//! ```
//!
//! A reply without `execution` means the device has no pending job.

use core::fmt;

use crate::app::ports::JsonExtractor;
use crate::config::{MAX_IMAGE_REF_LEN, MAX_JOB_ID_LEN, MAX_VERSION_LEN};

use super::topics::{is_json_string_safe, is_topic_segment_safe};
use super::{JobId, JobVersion};

const EXECUTION_PATH: &str = "execution";
const CLIENT_TOKEN_PATH: &str = "clientToken";

pub const JOB_ID_PATH: &str = "execution.jobId";
pub const JOB_DOCUMENT_PATH: &str = "execution.jobDocument";
pub const VERSION_NUMBER_PATH: &str = "execution.versionNumber";

const STREAM_NAME_PATH: &str = "afr_ota.streamname";
const FILE_ID_PATH: &str = "afr_ota.files.0.fileid";
const FILE_SIZE_PATH: &str = "afr_ota.files.0.filesize";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentError {
    /// No `execution.jobId`, or the message is not JSON.
    MissingJobId,
    /// The job id is too long or contains topic metacharacters.
    InvalidJobId,
    /// No `execution.jobDocument`.
    MissingDocument,
    /// A required OTA field is absent or has the wrong type.
    MissingField(&'static str),
    /// `filesize` is zero or larger than the reassembly buffer.
    FileSize,
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingJobId => write!(f, "no job id in message"),
            Self::InvalidJobId => write!(f, "job id unusable in a topic"),
            Self::MissingDocument => write!(f, "no job document in message"),
            Self::MissingField(path) => write!(f, "job document lacks {path}"),
            Self::FileSize => write!(f, "file size out of range"),
        }
    }
}

/// File transfer fields of an OTA job document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDocumentFields {
    pub file_id: u8,
    pub file_size: u32,
    /// Stream the file is served from.
    pub image_ref: heapless::String<MAX_IMAGE_REF_LEN>,
}

/// A start-next reply that echoes the client token but carries no
/// execution: nothing is queued for this device.
pub fn is_empty_reply<J: JsonExtractor>(extractor: &J, message: &str) -> bool {
    extractor.extract(message, EXECUTION_PATH).is_none()
        && extractor.extract(message, CLIENT_TOKEN_PATH).is_some()
}

pub fn get_job_id<J: JsonExtractor>(extractor: &J, message: &str) -> Result<JobId, DocumentError> {
    let raw = extractor
        .extract(message, JOB_ID_PATH)
        .ok_or(DocumentError::MissingJobId)?;
    if raw.len() > MAX_JOB_ID_LEN || !is_topic_segment_safe(&raw) {
        return Err(DocumentError::InvalidJobId);
    }
    let mut id = JobId::new();
    id.push_str(&raw).map_err(|()| DocumentError::InvalidJobId)?;
    Ok(id)
}

pub fn get_job_document<J: JsonExtractor>(
    extractor: &J,
    message: &str,
) -> Result<String, DocumentError> {
    extractor
        .extract(message, JOB_DOCUMENT_PATH)
        .ok_or(DocumentError::MissingDocument)
}

/// `execution.versionNumber` if present and usable as an expected version.
pub fn get_version_number<J: JsonExtractor>(extractor: &J, message: &str) -> Option<JobVersion> {
    let raw = extractor.extract(message, VERSION_NUMBER_PATH)?;
    if raw.len() > MAX_VERSION_LEN || !is_json_string_safe(&raw) {
        return None;
    }
    let mut version = JobVersion::new();
    version.push_str(&raw).ok()?;
    Some(version)
}

/// Pull the transfer fields out of a job document.  `max_file_size` is
/// the capacity of the reassembly buffer.
pub fn parse_job_document<J: JsonExtractor>(
    extractor: &J,
    document: &str,
    max_file_size: usize,
) -> Result<JobDocumentFields, DocumentError> {
    let stream = extractor
        .extract(document, STREAM_NAME_PATH)
        .filter(|s| s.len() <= MAX_IMAGE_REF_LEN && is_topic_segment_safe(s))
        .ok_or(DocumentError::MissingField(STREAM_NAME_PATH))?;
    let file_id = extractor
        .extract(document, FILE_ID_PATH)
        .and_then(|s| s.parse::<u8>().ok())
        .ok_or(DocumentError::MissingField(FILE_ID_PATH))?;
    let file_size = extractor
        .extract(document, FILE_SIZE_PATH)
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or(DocumentError::MissingField(FILE_SIZE_PATH))?;

    if file_size == 0 || file_size as usize > max_file_size {
        return Err(DocumentError::FileSize);
    }

    let mut image_ref = heapless::String::new();
    image_ref
        .push_str(&stream)
        .map_err(|()| DocumentError::MissingField(STREAM_NAME_PATH))?;

    Ok(JobDocumentFields {
        file_id,
        file_size,
        image_ref,
    })
}
