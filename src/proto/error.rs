use std::convert::TryFrom;

/// The service's status codes, as carried in replies and transaction entries.
///
/// Codes between `SystemError` and `ApiError` are server-side failures; codes below `ApiError`
/// are failures of the request itself. The two range markers are never reported.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub(crate) enum ZkError {
    /// Success. In a failed transaction, marks an operation that was rolled back.
    Ok = 0,

    SystemError = -1,
    /// Marks operations of a failed transaction that were never attempted.
    RuntimeInconsistency = -2,
    DataInconsistency = -3,
    /// The transport gave up on the request.
    ConnectionLoss = -4,
    MarshallingError = -5,
    Unimplemented = -6,
    OperationTimeout = -7,
    BadArguments = -8,

    ApiError = -100,
    NoNode = -101,
    NoAuth = -102,
    BadVersion = -103,
    NoChildrenForEphemerals = -108,
    NodeExists = -110,
    NotEmpty = -111,
    SessionExpired = -112,
    InvalidCallback = -113,
    InvalidAcl = -114,
    AuthFailed = -115,
    /// Local only: the session was closed while the request was outstanding.
    Closing = -116,
    SessionMoved = -118,
    /// A write reached a read-only server.
    NotReadOnly = -119,
    EphemeralOnLocalSession = -120,
    NoWatcher = -121,
}

impl TryFrom<i32> for ZkError {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        let known = [
            ZkError::Ok,
            ZkError::SystemError,
            ZkError::RuntimeInconsistency,
            ZkError::DataInconsistency,
            ZkError::ConnectionLoss,
            ZkError::MarshallingError,
            ZkError::Unimplemented,
            ZkError::OperationTimeout,
            ZkError::BadArguments,
            ZkError::ApiError,
            ZkError::NoNode,
            ZkError::NoAuth,
            ZkError::BadVersion,
            ZkError::NoChildrenForEphemerals,
            ZkError::NodeExists,
            ZkError::NotEmpty,
            ZkError::SessionExpired,
            ZkError::InvalidCallback,
            ZkError::InvalidAcl,
            ZkError::AuthFailed,
            ZkError::Closing,
            ZkError::SessionMoved,
            ZkError::NotReadOnly,
            ZkError::EphemeralOnLocalSession,
            ZkError::NoWatcher,
        ];
        known
            .iter()
            .copied()
            .find(|e| *e as i32 == code)
            .ok_or(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in -125..=0 {
            if let Ok(e) = ZkError::try_from(code) {
                assert_eq!(e as i32, code);
            }
        }
        assert_eq!(ZkError::try_from(-116), Ok(ZkError::Closing));
        assert_eq!(ZkError::try_from(-117), Err(-117));
        assert_eq!(ZkError::try_from(1), Err(1));
    }
}
