use crate::challenge::{validate_key_authorization, ChallengeRecord};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize, Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq)]
pub(super) struct ChallengeRequest {
    pub domain: String,
    pub token: String,
    pub key_auth: String,
}

impl ChallengeRequest {
    pub fn validate(&self) -> Result<(), Error> {
        validate_key_authorization(&self.token, &self.key_auth)
    }
}

#[derive(Serialize, Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq)]
pub(super) struct ChallengeResult {
    pub fqdn: String,
    pub value: String,
}

impl From<ChallengeRecord> for ChallengeResult {
    fn from(record: ChallengeRecord) -> Self {
        ChallengeResult {
            fqdn: record.fqdn,
            value: record.value,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, Default, Eq, PartialEq)]
pub(super) struct TimeoutResult {
    pub timeout: u64,
    pub interval: u64,
}

impl From<(Duration, Duration)> for TimeoutResult {
    fn from((timeout, interval): (Duration, Duration)) -> Self {
        TimeoutResult {
            timeout: timeout.as_secs(),
            interval: interval.as_secs(),
        }
    }
}
