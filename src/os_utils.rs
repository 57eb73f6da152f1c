//! Utilities pertaining to os-level settings
//!

/// Attempt to increase open file limit to the system's hard limit on *nix-like systems
///
/// The merge keeps one file open for every spilled sort chunk, so a higher limit allows more
/// chunks. This is an optional increase so continue through all failure cases without error.
///
/// Returns the soft limit after any change, if it could be read
///
pub fn attempt_max_open_file_limit() -> Option<u64> {
    use rlimit::Resource;

    let (soft, hard) = Resource::NOFILE.get().ok()?;

    if soft < hard && rlimit::setrlimit(Resource::NOFILE, hard, hard).is_ok() {
        return Some(hard);
    }
    Some(soft)
}
