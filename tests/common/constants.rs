//! Shared constants for end-to-end tests
//!
//! When the seeded lineup changes, update only this file and `fixtures`.

// ============================================================================
// Collection
// ============================================================================

pub const COLLECTION: &str = "lineup";

// ============================================================================
// Reviewers
// ============================================================================

pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";

// ============================================================================
// Seeded acts
// ============================================================================

/// Friday, rock + indie
pub const EXAMPLE_BAND: &str = "Example Band";

/// Saturday, folk
pub const OTHER_ACT: &str = "Other Act";

/// Sunday, electronic + rock
pub const LATE_SHOW: &str = "late show";

/// Thursday, folk
pub const WARMUP_SET: &str = "Warmup Set";

/// Number of acts in the seeded lineup
pub const SEEDED_ACTS: usize = 4;
