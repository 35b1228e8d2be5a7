use serde::Serialize;

/// State of a stored job.
///
/// There is no "completed" state: a finished (or failed) job is purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// waiting for its build to become available
    Waiting,
    /// build available, waiting for the device pool
    Pending,
    /// currently driven by the scheduler
    Running,
}

impl JobStatus {
    pub fn from_u8(value: u8) -> Result<Self, String> {
        match value {
            0 => Ok(Self::Waiting),
            1 => Ok(Self::Pending),
            2 => Ok(Self::Running),
            v => Err(format!("'{:}' cannot be converted to a JobStatus", v)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match *self {
            Self::Waiting => 0,
            Self::Pending => 1,
            Self::Running => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::Running => "running",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::JobStatus;

    #[test]
    fn test_status_code_conversion() {
        for status in [JobStatus::Waiting, JobStatus::Pending, JobStatus::Running] {
            assert_eq!(JobStatus::from_u8(status.as_u8()), Ok(status));
        }
        assert!(JobStatus::from_u8(3).is_err());
    }
}
