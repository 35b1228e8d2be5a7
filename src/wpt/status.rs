use std::fmt;

/// Classification of a `testStatus.php` status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    /// 100
    Started,
    /// 101
    Waiting,
    /// 200
    Complete,
    /// 400 and 401
    NotFound,
    /// 402
    Cancelled,
    Unexpected(i64),
}

impl TestStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            100 => Self::Started,
            101 => Self::Waiting,
            200 => Self::Complete,
            400 | 401 => Self::NotFound,
            402 => Self::Cancelled,
            other => Self::Unexpected(other),
        }
    }

    /// The test is still queued or executing on the agent.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Started | Self::Waiting)
    }

    /// Message attached to the test once it left the pending set.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Started | Self::Waiting | Self::Complete => None,
            Self::NotFound => Some("not found".to_string()),
            Self::Cancelled => Some("cancelled".to_string()),
            Self::Unexpected(code) => Some(format!("failed with unexpected status {}", code)),
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Waiting => write!(f, "waiting"),
            Self::Complete => write!(f, "complete"),
            Self::NotFound => write!(f, "not found"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Unexpected(code) => write!(f, "unexpected ({})", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_classification() {
        assert_eq!(TestStatus::from_code(100), TestStatus::Started);
        assert_eq!(TestStatus::from_code(101), TestStatus::Waiting);
        assert_eq!(TestStatus::from_code(200), TestStatus::Complete);
        assert_eq!(TestStatus::from_code(400), TestStatus::NotFound);
        assert_eq!(TestStatus::from_code(401), TestStatus::NotFound);
        assert_eq!(TestStatus::from_code(402), TestStatus::Cancelled);
        assert_eq!(TestStatus::from_code(503), TestStatus::Unexpected(503));

        assert!(TestStatus::from_code(100).is_pending());
        assert!(TestStatus::from_code(101).is_pending());
        for code in [200, 400, 401, 402, 503] {
            assert!(!TestStatus::from_code(code).is_pending(), "{}", code);
        }
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(TestStatus::Complete.message(), None);
        assert_eq!(TestStatus::NotFound.message().unwrap(), "not found");
        assert_eq!(TestStatus::Cancelled.message().unwrap(), "cancelled");
        assert_eq!(
            TestStatus::Unexpected(503).message().unwrap(),
            "failed with unexpected status 503"
        );
    }
}
