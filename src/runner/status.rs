//! Step and lifecycle status codes
//!
//! `StepStatus` is the fine-grained outcome of the last executed step and is
//! stored as a single character. `LifecycleStatus` is the coarse
//! administrative classification used by sweeps and the read model.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::TaskStep;

/// Outcome code of the last executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StepStatus {
    InitOk,
    PreProcessingOk,
    TransferOk,
    PostProcessingOk,
    CompleteOk,
    ConnectionImpossible,
    BadAuthent,
    ExternalOp,
    TransferError,
    Md5Error,
    Disconnection,
    FinalOp,
    Unimplemented,
    Shutdown,
    RemoteError,
    Internal,
    StoppedTransfer,
    CanceledTransfer,
    Warning,
    #[default]
    Unknown,
    Running,
    FileNotFound,
    CommandNotFound,
    QueryAlreadyFinished,
}

impl StepStatus {
    /// Single-character storage code
    pub fn code(&self) -> char {
        match self {
            StepStatus::InitOk => 'i',
            StepStatus::PreProcessingOk => 'B',
            StepStatus::TransferOk => 'X',
            StepStatus::PostProcessingOk => 'P',
            StepStatus::CompleteOk => 'O',
            StepStatus::ConnectionImpossible => 'C',
            StepStatus::BadAuthent => 'A',
            StepStatus::ExternalOp => 'E',
            StepStatus::TransferError => 'T',
            StepStatus::Md5Error => 'M',
            StepStatus::Disconnection => 'D',
            StepStatus::FinalOp => 'F',
            StepStatus::Unimplemented => 'U',
            StepStatus::Shutdown => 'S',
            StepStatus::RemoteError => 'R',
            StepStatus::Internal => 'I',
            StepStatus::StoppedTransfer => 'H',
            StepStatus::CanceledTransfer => 'Q',
            StepStatus::Warning => 'W',
            StepStatus::Unknown => '-',
            StepStatus::Running => 'z',
            StepStatus::FileNotFound => 'f',
            StepStatus::CommandNotFound => 'c',
            StepStatus::QueryAlreadyFinished => 'd',
        }
    }

    /// Decode a storage code. Unrecognized codes decode to `Unknown`.
    pub fn from_code(code: char) -> Self {
        match code {
            'i' => StepStatus::InitOk,
            'B' => StepStatus::PreProcessingOk,
            'X' => StepStatus::TransferOk,
            'P' => StepStatus::PostProcessingOk,
            'O' => StepStatus::CompleteOk,
            'C' => StepStatus::ConnectionImpossible,
            'A' => StepStatus::BadAuthent,
            'E' => StepStatus::ExternalOp,
            'T' => StepStatus::TransferError,
            'M' => StepStatus::Md5Error,
            'D' => StepStatus::Disconnection,
            'F' => StepStatus::FinalOp,
            'U' => StepStatus::Unimplemented,
            'S' => StepStatus::Shutdown,
            'R' => StepStatus::RemoteError,
            'I' => StepStatus::Internal,
            'H' => StepStatus::StoppedTransfer,
            'Q' => StepStatus::CanceledTransfer,
            'W' => StepStatus::Warning,
            'z' => StepStatus::Running,
            'f' => StepStatus::FileNotFound,
            'c' => StepStatus::CommandNotFound,
            'd' => StepStatus::QueryAlreadyFinished,
            _ => StepStatus::Unknown,
        }
    }

    /// Decode from a stored string, using its first character
    pub fn from_code_str(code: &str) -> Self {
        code.chars()
            .next()
            .map(StepStatus::from_code)
            .unwrap_or(StepStatus::Unknown)
    }

    /// Codes produced by an operator or peer stopping the transfer
    #[inline]
    pub fn is_interruption(&self) -> bool {
        matches!(
            self,
            StepStatus::StoppedTransfer | StepStatus::CanceledTransfer | StepStatus::Shutdown
        )
    }

    /// Codes that only report progress and never describe a failure
    #[inline]
    pub fn is_progress(&self) -> bool {
        matches!(
            self,
            StepStatus::InitOk
                | StepStatus::PreProcessingOk
                | StepStatus::TransferOk
                | StepStatus::PostProcessingOk
                | StepStatus::Running
        )
    }

    pub fn message(&self) -> &'static str {
        match self {
            StepStatus::InitOk => "Initialization step",
            StepStatus::PreProcessingOk => "Pre-processing step",
            StepStatus::TransferOk => "Transfer step",
            StepStatus::PostProcessingOk => "Post-processing step",
            StepStatus::CompleteOk => "Operation completed",
            StepStatus::ConnectionImpossible => "Connection impossible",
            StepStatus::BadAuthent => "Bad authentication",
            StepStatus::ExternalOp => "External operation in error",
            StepStatus::TransferError => "Bad transfer",
            StepStatus::Md5Error => "MD5 during transfer in error",
            StepStatus::Disconnection => "Disconnection before end",
            StepStatus::FinalOp => "Final operation on the result file in error",
            StepStatus::Unimplemented => "Function not implemented",
            StepStatus::Shutdown => "Shutdown order",
            StepStatus::RemoteError => "Error due to remote",
            StepStatus::Internal => "Internal error",
            StepStatus::StoppedTransfer => "Stopped transfer",
            StepStatus::CanceledTransfer => "Canceled transfer",
            StepStatus::Warning => "Warning during pre or post execution",
            StepStatus::Unknown => "Unknown type of error",
            StepStatus::Running => "Current step in running",
            StepStatus::FileNotFound => "File not found",
            StepStatus::CommandNotFound => "Command not found",
            StepStatus::QueryAlreadyFinished => "Restart query for a finished transfer",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.message(), self.code())
    }
}

impl From<StepStatus> for String {
    fn from(status: StepStatus) -> Self {
        status.code().to_string()
    }
}

impl TryFrom<String> for StepStatus {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(StepStatus::from_code_str(&value))
    }
}

/// Administrative classification of a transfer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i16)]
pub enum LifecycleStatus {
    #[default]
    Unknown = 0,
    NotUpdated = 1,
    Interrupted = 2,
    ToSubmit = 3,
    InError = 4,
    Running = 5,
    Done = 6,
}

impl LifecycleStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(LifecycleStatus::Unknown),
            1 => Some(LifecycleStatus::NotUpdated),
            2 => Some(LifecycleStatus::Interrupted),
            3 => Some(LifecycleStatus::ToSubmit),
            4 => Some(LifecycleStatus::InError),
            5 => Some(LifecycleStatus::Running),
            6 => Some(LifecycleStatus::Done),
            _ => None,
        }
    }

    /// Re-derive the lifecycle of a record read back from a runner file,
    /// which does not carry it.
    pub fn derive(phase: TaskStep, step_status: StepStatus) -> Self {
        match phase {
            TaskStep::AllDone => LifecycleStatus::Done,
            TaskStep::ErrorTask if step_status.is_interruption() => LifecycleStatus::Interrupted,
            TaskStep::ErrorTask if step_status != StepStatus::Running => LifecycleStatus::InError,
            _ => LifecycleStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Unknown => "UNKNOWN",
            LifecycleStatus::NotUpdated => "NOTUPDATED",
            LifecycleStatus::Interrupted => "INTERRUPTED",
            LifecycleStatus::ToSubmit => "TOSUBMIT",
            LifecycleStatus::InError => "INERROR",
            LifecycleStatus::Running => "RUNNING",
            LifecycleStatus::Done => "DONE",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_codes_are_unique() {
        let all = [
            StepStatus::InitOk,
            StepStatus::PreProcessingOk,
            StepStatus::TransferOk,
            StepStatus::PostProcessingOk,
            StepStatus::CompleteOk,
            StepStatus::ConnectionImpossible,
            StepStatus::BadAuthent,
            StepStatus::ExternalOp,
            StepStatus::TransferError,
            StepStatus::Md5Error,
            StepStatus::Disconnection,
            StepStatus::FinalOp,
            StepStatus::Unimplemented,
            StepStatus::Shutdown,
            StepStatus::RemoteError,
            StepStatus::Internal,
            StepStatus::StoppedTransfer,
            StepStatus::CanceledTransfer,
            StepStatus::Warning,
            StepStatus::Unknown,
            StepStatus::Running,
            StepStatus::FileNotFound,
            StepStatus::CommandNotFound,
            StepStatus::QueryAlreadyFinished,
        ];
        let mut codes: Vec<char> = all.iter().map(|s| s.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
        for status in all {
            assert_eq!(StepStatus::from_code(status.code()), status);
        }
    }

    #[test]
    fn test_unknown_code_decodes_to_unknown() {
        assert_eq!(StepStatus::from_code('#'), StepStatus::Unknown);
        assert_eq!(StepStatus::from_code_str(""), StepStatus::Unknown);
        assert_eq!(StepStatus::from_code_str("Qx"), StepStatus::CanceledTransfer);
    }

    #[test]
    fn test_interruption_codes() {
        assert!(StepStatus::StoppedTransfer.is_interruption());
        assert!(StepStatus::CanceledTransfer.is_interruption());
        assert!(StepStatus::Shutdown.is_interruption());
        assert!(!StepStatus::ExternalOp.is_interruption());
    }

    #[test]
    fn test_lifecycle_derivation() {
        assert_eq!(
            LifecycleStatus::derive(TaskStep::AllDone, StepStatus::CompleteOk),
            LifecycleStatus::Done
        );
        assert_eq!(
            LifecycleStatus::derive(TaskStep::ErrorTask, StepStatus::ExternalOp),
            LifecycleStatus::InError
        );
        assert_eq!(
            LifecycleStatus::derive(TaskStep::ErrorTask, StepStatus::Shutdown),
            LifecycleStatus::Interrupted
        );
        assert_eq!(
            LifecycleStatus::derive(TaskStep::ErrorTask, StepStatus::Running),
            LifecycleStatus::Unknown
        );
        assert_eq!(
            LifecycleStatus::derive(TaskStep::TransferTask, StepStatus::Running),
            LifecycleStatus::Unknown
        );
    }

    #[test]
    fn test_lifecycle_id_lookup() {
        assert_eq!(LifecycleStatus::from_id(6), Some(LifecycleStatus::Done));
        assert_eq!(LifecycleStatus::from_id(7), None);
        assert_eq!(LifecycleStatus::ToSubmit.to_string(), "TOSUBMIT");
    }
}
