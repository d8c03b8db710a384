//! Process exit codes.
//!
//! Supervisors treat authentication failures specially (credentials need a
//! human, retrying is pointless), so they get their own exit code.

use crate::remote::RemoteError;
use crate::story::StoryError;

/// Credentials or session rejected somewhere in the pipeline.
pub const EXIT_AUTH_FAILURE: u8 = 9;
/// Any other failure.
pub const EXIT_UNEXPECTED: u8 = 99;

/// Map a failure to the process exit code, looking through `anyhow`
/// context layers for an authentication error from either service.
pub fn exit_code(error: &anyhow::Error) -> u8 {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<StoryError>() {
            if e.is_authentication() {
                return EXIT_AUTH_FAILURE;
            }
        }
        if let Some(e) = cause.downcast_ref::<RemoteError>() {
            if e.is_authentication() {
                return EXIT_AUTH_FAILURE;
            }
        }
    }
    EXIT_UNEXPECTED
}
