#[cfg(feature = "native-backend")]
pub mod native;
pub mod tools;

#[cfg(feature = "native-backend")]
pub use native::NativeBackend;
pub use tools::ToolsBackend;
