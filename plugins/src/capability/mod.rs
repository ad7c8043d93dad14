pub mod builtin;

pub use builtin::{
    builtin_capabilities, EchoCapability, ReadFileCapability, ShellCapability,
    WriteFileCapability,
};
