pub mod codec;
pub mod messages;

/// Maximum allowed DAP message payload size (in bytes).
///
/// Caps the incoming `Content-Length` header so a broken or hostile adapter
/// cannot make the client allocate an arbitrarily large body buffer. Full
/// trace logs of long-running programs are the largest payloads we expect.
pub const MAX_DAP_MESSAGE_BYTES: usize = 64 * 1024 * 1024; // 64 MiB

/// Maximum allowed size of a single DAP header line (in bytes).
pub const MAX_DAP_HEADER_LINE_BYTES: usize = 8 * 1024; // 8 KiB
