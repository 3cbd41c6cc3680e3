//! ProDOS 8 MLI call numbers and error codes.

pub struct Call;
#[rustfmt::skip]
impl Call {
    pub const ALLOC_INTERRUPT: u8   = 0x40;
    pub const DEALLOC_INTERRUPT: u8 = 0x41;
    pub const READ_BLOCK: u8        = 0x80;
    pub const WRITE_BLOCK: u8       = 0x81;
    pub const GET_TIME: u8          = 0x82;
    pub const CREATE: u8            = 0xC0;
    pub const DESTROY: u8           = 0xC1;
    pub const RENAME: u8            = 0xC2;
    pub const SET_FILE_INFO: u8     = 0xC3;
    pub const GET_FILE_INFO: u8     = 0xC4;
    pub const ON_LINE: u8           = 0xC5;
    pub const SET_PREFIX: u8        = 0xC6;
    pub const GET_PREFIX: u8        = 0xC7;
    pub const OPEN: u8              = 0xC8;
    pub const NEWLINE: u8           = 0xC9;
    pub const READ: u8              = 0xCA;
    pub const WRITE: u8             = 0xCB;
    pub const CLOSE: u8             = 0xCC;
    pub const FLUSH: u8             = 0xCD;
    pub const SET_MARK: u8          = 0xCE;
    pub const GET_MARK: u8          = 0xCF;
    pub const SET_EOF: u8           = 0xD0;
    pub const GET_EOF: u8           = 0xD1;
    pub const SET_BUF: u8           = 0xD2;
    pub const GET_BUF: u8           = 0xD3;
}

pub struct ErrorCode;
#[rustfmt::skip]
impl ErrorCode {
    pub const NO_ERROR: u8            = 0x00;
    pub const BAD_CALL_NUMBER: u8     = 0x01;
    pub const BAD_PARAM_COUNT: u8     = 0x04;
    pub const INT_TABLE_FULL: u8      = 0x25;
    pub const IO_ERROR: u8            = 0x27;
    pub const NO_DEVICE: u8           = 0x28;
    pub const INVALID_PATH: u8        = 0x40;
    pub const FCB_FULL: u8            = 0x42;
    pub const BAD_REF_NUM: u8         = 0x43;
    pub const PATH_NOT_FOUND: u8      = 0x44;
    pub const FILE_NOT_FOUND: u8      = 0x46;
    pub const DUPLICATE_PATH: u8      = 0x47;
    pub const VOLUME_FULL: u8         = 0x48;
    pub const UNSUPPORTED_STORAGE: u8 = 0x4B;
    pub const END_OF_FILE: u8         = 0x4C;
    pub const ACCESS_DENIED: u8       = 0x4E;
    pub const INVALID_PARAMETER: u8   = 0x53;
    pub const OUT_OF_RANGE: u8        = 0xAD;
}

/// Documented parameter count for each implemented call, `None` for calls
/// outside the roster.
#[rustfmt::skip]
pub fn param_count(call: u8) -> Option<u8> {
    match call {
        Call::ALLOC_INTERRUPT   => Some(2),
        Call::DEALLOC_INTERRUPT => Some(1),
        Call::READ_BLOCK        => Some(3),
        Call::WRITE_BLOCK       => Some(3),
        Call::GET_TIME          => Some(0),
        Call::CREATE            => Some(7),
        Call::DESTROY           => Some(1),
        Call::RENAME            => Some(2),
        Call::SET_FILE_INFO     => Some(7),
        Call::GET_FILE_INFO     => Some(10),
        Call::ON_LINE           => Some(2),
        Call::SET_PREFIX        => Some(1),
        Call::GET_PREFIX        => Some(1),
        Call::OPEN              => Some(3),
        Call::NEWLINE           => Some(3),
        Call::READ              => Some(4),
        Call::WRITE             => Some(4),
        Call::CLOSE             => Some(1),
        Call::FLUSH             => Some(1),
        Call::SET_MARK          => Some(2),
        Call::GET_MARK          => Some(2),
        Call::SET_EOF           => Some(2),
        Call::GET_EOF           => Some(2),
        Call::SET_BUF           => Some(2),
        Call::GET_BUF           => Some(2),
        _ => None,
    }
}

#[rustfmt::skip]
pub fn call_name(call: u8) -> Option<&'static str> {
    match call {
        Call::ALLOC_INTERRUPT   => Some("ALLOC_INTERRUPT"),
        Call::DEALLOC_INTERRUPT => Some("DEALLOC_INTERRUPT"),
        Call::READ_BLOCK        => Some("READ_BLOCK"),
        Call::WRITE_BLOCK       => Some("WRITE_BLOCK"),
        Call::GET_TIME          => Some("GET_TIME"),
        Call::CREATE            => Some("CREATE"),
        Call::DESTROY           => Some("DESTROY"),
        Call::RENAME            => Some("RENAME"),
        Call::SET_FILE_INFO     => Some("SET_FILE_INFO"),
        Call::GET_FILE_INFO     => Some("GET_FILE_INFO"),
        Call::ON_LINE           => Some("ON_LINE"),
        Call::SET_PREFIX        => Some("SET_PREFIX"),
        Call::GET_PREFIX        => Some("GET_PREFIX"),
        Call::OPEN              => Some("OPEN"),
        Call::NEWLINE           => Some("NEWLINE"),
        Call::READ              => Some("READ"),
        Call::WRITE             => Some("WRITE"),
        Call::CLOSE             => Some("CLOSE"),
        Call::FLUSH             => Some("FLUSH"),
        Call::SET_MARK          => Some("SET_MARK"),
        Call::GET_MARK          => Some("GET_MARK"),
        Call::SET_EOF           => Some("SET_EOF"),
        Call::GET_EOF           => Some("GET_EOF"),
        Call::SET_BUF           => Some("SET_BUF"),
        Call::GET_BUF           => Some("GET_BUF"),
        _ => None,
    }
}

/// True for calls whose first parameter is a pathname pointer; the MLI
/// debug log echoes that pathname.
pub fn call_takes_pathname(call: u8) -> bool {
    matches!(
        call,
        Call::CREATE
            | Call::DESTROY
            | Call::RENAME
            | Call::SET_FILE_INFO
            | Call::GET_FILE_INFO
            | Call::SET_PREFIX
            | Call::OPEN
    )
}

#[rustfmt::skip]
pub fn error_name(code: u8) -> &'static str {
    match code {
        ErrorCode::NO_ERROR            => "NO_ERROR",
        ErrorCode::BAD_CALL_NUMBER     => "BAD_CALL_NUMBER",
        ErrorCode::BAD_PARAM_COUNT     => "BAD_PARAM_COUNT",
        ErrorCode::INT_TABLE_FULL      => "INT_TABLE_FULL",
        ErrorCode::IO_ERROR            => "IO_ERROR",
        ErrorCode::NO_DEVICE           => "NO_DEVICE",
        ErrorCode::INVALID_PATH        => "INVALID_PATH",
        ErrorCode::FCB_FULL            => "FCB_FULL",
        ErrorCode::BAD_REF_NUM         => "BAD_REF_NUM",
        ErrorCode::PATH_NOT_FOUND      => "PATH_NOT_FOUND",
        ErrorCode::FILE_NOT_FOUND      => "FILE_NOT_FOUND",
        ErrorCode::DUPLICATE_PATH      => "DUPLICATE_PATH",
        ErrorCode::VOLUME_FULL         => "VOLUME_FULL",
        ErrorCode::UNSUPPORTED_STORAGE => "UNSUPPORTED_STORAGE",
        ErrorCode::END_OF_FILE         => "END_OF_FILE",
        ErrorCode::ACCESS_DENIED       => "ACCESS_DENIED",
        ErrorCode::INVALID_PARAMETER   => "INVALID_PARAMETER",
        ErrorCode::OUT_OF_RANGE        => "OUT_OF_RANGE",
        _ => "UNKNOWN",
    }
}
