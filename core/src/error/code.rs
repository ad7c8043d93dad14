/// Numeric error codes shared by task results, renderers and the CLI exit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    ParseError = 2,
    ValidationError = 3,
    TaskNotFound = 10,
    DependencyError = 11,
    CircularDependency = 12,
    ModelError = 20,
    Cancelled = 31,
    ToolError = 50,
    StoreError = 60,
    Panicked = 70,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}
