//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3-9     | store            | Store file codes                         |
//! | 10-19   | grid             | Operation notices raised by the grid     |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use fleetgrid_engine::events::{
    TITLE_CLIPBOARD, TITLE_CREATE_FAILED, TITLE_DATE_VALIDATION, TITLE_DELETE_FAILED, TITLE_UPDATE_FAILED,
};

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, cell outside the grid, wrong record kind.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Store (3-9)
// =============================================================================

/// Store file could not be read or written.
pub const EXIT_STORE_IO: u8 = 3;

/// Store file is not valid JSON or holds another record kind.
pub const EXIT_STORE_PARSE: u8 = 4;

// =============================================================================
// Grid (10-19)
// =============================================================================

/// An edit was rejected before reaching the store (exit before entry).
pub const EXIT_REJECTED: u8 = 10;

/// The store refused a create, update or delete; the grid rolled back.
pub const EXIT_STORE_FAILED: u8 = 11;

/// Clipboard text could not be read or written.
pub const EXIT_CLIPBOARD: u8 = 12;

/// Map a grid notice title to its exit code.
pub fn notice_exit_code(title: &str) -> u8 {
    match title {
        TITLE_DATE_VALIDATION => EXIT_REJECTED,
        TITLE_CREATE_FAILED | TITLE_UPDATE_FAILED | TITLE_DELETE_FAILED => EXIT_STORE_FAILED,
        TITLE_CLIPBOARD => EXIT_CLIPBOARD,
        _ => EXIT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_codes_are_distinct_from_universal() {
        for title in [TITLE_DATE_VALIDATION, TITLE_UPDATE_FAILED, TITLE_CLIPBOARD] {
            let code = notice_exit_code(title);
            assert!(code >= 10 && code < 20, "{title} -> {code}");
        }
        assert_eq!(notice_exit_code("something else"), EXIT_ERROR);
    }
}
