//! Process exit statuses.

use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Unexpected,
    InvalidArguments,
    ConfigUnreadable,
    ConfigInvalid,
    OperationFailed,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Unexpected => 1,
            ExitStatus::InvalidArguments => 11,
            ExitStatus::ConfigUnreadable => 12,
            ExitStatus::ConfigInvalid => 13,
            ExitStatus::OperationFailed => 20,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}
