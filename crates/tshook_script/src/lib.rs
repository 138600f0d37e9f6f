//! tshook Scripting
//!
//! Runs compiled TypeScript on QuickJS.
//!
//! ## Architecture
//!
//! - **Module host:** CommonJS `require` with per-extension handlers
//! - **Sandbox:** every module body runs in a fresh realm seeded from the host globals
//! - **Hook:** compiles `.ts` sources on first load and whenever the output is stale

pub mod error;
pub mod hook;
pub mod module;
pub mod runtime;
pub mod sandbox;

pub use error::ScriptError;
pub use hook::{LoadInterceptor, LoadStats};
pub use module::{ExtensionHandler, JsonHandler, ModuleBinding, ModuleHost, ScriptHandler};
pub use runtime::ScriptRuntime;

pub use rquickjs;
