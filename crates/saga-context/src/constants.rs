//! Context budgeting constants.

// =============================================================================
// Token Estimation
// =============================================================================

/// Approximate bytes per token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Appended to any text cut short to fit its budget.
pub const TRUNCATION_MARKER: &str = " [...]";

// =============================================================================
// Budget defaults
// =============================================================================

/// Tokens held back from the immediate-context allotment.
pub const DEFAULT_SAFETY_BUFFER_TOKENS: usize = 200;

/// Absolute floor reserved for older history.
pub const DEFAULT_MIN_HISTORY_FLOOR_TOKENS: usize = 1_000;

/// Proportional floor reserved for older history.
pub const DEFAULT_HISTORY_FLOOR_RATIO: f64 = 0.3;

/// Smallest remainder worth spending on a truncated history segment.
pub const DEFAULT_MIN_PARTIAL_TOKENS: usize = 100;

// =============================================================================
// Rendering scaffold
// =============================================================================

/// Header of the scene section.
pub const SCENE_HEADER: &str = "## Current Scene\n";

/// Header of the older-history section.
pub const HISTORY_HEADER: &str = "## Story So Far\n";

/// Header of the previous-segment section.
pub const RECENT_SEGMENT_HEADER: &str = "## Previous Segment\n";

/// Header of the player-action section.
pub const RECENT_ACTION_HEADER: &str = "## Player Action\n";

/// Written after every section body.
pub const SECTION_SEPARATOR: &str = "\n\n";

/// Prefix of the action line following a history segment.
pub const ACTION_PREFIX: &str = "\n> ";

/// Written between history entries.
pub const ENTRY_SEPARATOR: &str = "\n\n";

/// Token cost of all headers and section separators.
pub const SCAFFOLD_TOKENS: usize = (SCENE_HEADER.len()
    + HISTORY_HEADER.len()
    + RECENT_SEGMENT_HEADER.len()
    + RECENT_ACTION_HEADER.len()
    + 4 * SECTION_SEPARATOR.len())
.div_ceil(CHARS_PER_TOKEN);

/// Per-entry formatting overhead inside the history section.
pub const ENTRY_OVERHEAD_TOKENS: usize =
    (ACTION_PREFIX.len() + ENTRY_SEPARATOR.len()).div_ceil(CHARS_PER_TOKEN);
