//! Child-side loader hook, at its interface boundary.
//!
//! The hook itself registers with the host runtime's module loader and is
//! not part of this crate; what lives here is everything the supervisor
//! hands the child so the hook can find its way back:
//!
//! - the registration arguments prepended to the child argv
//! - the environment variable names the hook reads
//! - the comma-joined extension list
//!
//! At boot the hook connects a [`crate::bridge::SyncBridge`] to
//! `SOCKET_PATH` and intercepts loads of files matching `EXTENSIONS`.

/// Environment variable carrying the parent's IPC endpoint path.
pub const SOCKET_PATH_ENV: &str = "SOCKET_PATH";

/// Environment variable carrying the comma-joined source extension list.
pub const EXTENSIONS_ENV: &str = "EXTENSIONS";

/// Override for the hook module id passed to the runtime.
const HOOK_ENV: &str = "TSRUN_HOOK";

/// Module id the runtime resolves to the registration shim.
const DEFAULT_HOOK: &str = "tsrun/register";

/// Default runtime program the supervisor launches.
pub const DEFAULT_RUNTIME: &str = "node";

/// Arguments that register the loader hook, prepended to the user argv.
pub fn hook_args() -> Vec<String> {
    let hook = std::env::var(HOOK_ENV).unwrap_or_else(|_| DEFAULT_HOOK.to_string());
    vec!["--require".to_string(), hook]
}

/// Value of `EXTENSIONS` for the given recognized extensions.
pub fn extensions_value(extensions: &[String]) -> String {
    extensions.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_args_default() {
        // Not set in the test environment
        if std::env::var(HOOK_ENV).is_err() {
            assert_eq!(hook_args(), vec!["--require", "tsrun/register"]);
        }
    }

    #[test]
    fn test_extensions_value_comma_joined() {
        let exts = vec![".ts".to_string(), ".tsx".to_string(), ".js".to_string()];
        assert_eq!(extensions_value(&exts), ".ts,.tsx,.js");
    }
}
