//! GATT handle types and status codes

/// Identifies an active link. Recycled after disconnect.
pub type ConnHandle = u16;

/// Identifies an attribute value slot in the GATT table
pub type AttrHandle = u16;

/// Connection handle meaning "no link"
pub const CONN_HANDLE_INVALID: ConnHandle = 0xFFFF;

/// Attribute handle that never refers to an attribute
pub const ATTR_HANDLE_INVALID: AttrHandle = 0x0000;

/// GATT status returned to the peer in an authorize reply
///
/// ATT protocol errors live at `0x0100 + att_error`. The application range
/// starts at [`GattStatus::ATTERR_APP_BEGIN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattStatus(pub u16);

impl GattStatus {
    pub const SUCCESS: Self = Self(0x0000);
    pub const UNKNOWN: Self = Self(0x0001);
    pub const ATTERR_INVALID_HANDLE: Self = Self(0x0101);
    pub const ATTERR_WRITE_NOT_PERMITTED: Self = Self(0x0103);
    pub const ATTERR_INVALID_OFFSET: Self = Self(0x0107);
    pub const ATTERR_INSUF_AUTHORIZATION: Self = Self(0x0108);
    pub const ATTERR_PREPARE_QUEUE_FULL: Self = Self(0x0109);
    pub const ATTERR_INVALID_ATT_VAL_LENGTH: Self = Self(0x010D);
    pub const ATTERR_APP_BEGIN: Self = Self(0x0180);

    /// Rejection used for prepare writes on attributes the queued writes
    /// module was not told to own
    pub const QWR_REJECT_REQUEST: Self = Self::ATTERR_APP_BEGIN;

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

/// Execute write request flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecWriteFlag {
    /// Commit all prepared values
    Flush,
    /// Discard all prepared values
    Cancel,
}
