// ── Storage keys ─────────────────────────────────────────────────

/// Single record holding both mappings (combined layout).
pub const STATE_KEY: &str = "slotbook_state";
/// Booked slots per date (legacy layout).
pub const LEGACY_BOOKINGS_KEY: &str = "psychologist_bookings";
/// Client records keyed by `<date>_<slot>` (legacy layout).
pub const LEGACY_CLIENTS_KEY: &str = "client_bookings";

// ── Form field limits ────────────────────────────────────────────

// In characters, not bytes.

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_PHONE_LEN: usize = 40;
/// RFC 5321 path limit.
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_SESSION_TYPE_LEN: usize = 100;
pub const MAX_MESSAGE_LEN: usize = 4000;

// ── Storage ──────────────────────────────────────────────────────

/// Browser local storage quota is usually about 5 MB per origin.
pub const DEFAULT_STORAGE_QUOTA_BYTES: usize = 5 * 1024 * 1024;
pub const MAX_STORAGE_KEY_LEN: usize = 128;

// ── Timing ───────────────────────────────────────────────────────

/// How long a status message stays visible.
pub const STATUS_DISMISS_MS: u64 = 5_000;

/// Text sent when the client leaves the message field empty.
pub const EMPTY_MESSAGE_PLACEHOLDER: &str = "Not specified";
