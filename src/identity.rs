//! Device identity (thing name).
//!
//! Every jobs topic is scoped by the device identity.  It is validated once
//! at construction and then only read, so components receive it by
//! reference instead of reaching for a global.

use core::fmt;

use crate::config::MAX_THING_NAME_LEN;
use crate::error::IdentityError;
use crate::jobs::topics::is_topic_segment_safe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    name: heapless::String<MAX_THING_NAME_LEN>,
}

impl DeviceIdentity {
    pub fn new(name: &str) -> Result<Self, IdentityError> {
        if name.is_empty() {
            return Err(IdentityError::Empty);
        }
        if name.len() > MAX_THING_NAME_LEN {
            return Err(IdentityError::TooLong);
        }
        if !is_topic_segment_safe(name) {
            return Err(IdentityError::InvalidCharacter);
        }
        let mut stored = heapless::String::new();
        stored
            .push_str(name)
            .map_err(|()| IdentityError::TooLong)?;
        Ok(Self { name: stored })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
