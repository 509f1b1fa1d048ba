//! Shared constants for things
//!

/// Upper bound on the number of themes in one selection.
pub const MAX_SELECTED_THEMES: usize = 6;

/// Shown on a failed theme when the generation error carried no message.
pub const UNKNOWN_GENERATION_ERROR: &str = "Lỗi không xác định";

/// Default Gemini endpoint root.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default image-capable Gemini model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image-preview";

/// Session key holding the per-browser controller key.
pub const SESSION_KEY: &str = "session_key";

/// Session key holding the visit number assigned when the session started.
pub const SESSION_VISIT_NUMBER: &str = "visit_number";

/// Length of generated session keys and preview ids
pub const TOKEN_LENGTH: usize = 32;

/// Inactivity window (in seconds) before a browser session expires.
pub const SESSION_INACTIVITY_SECONDS: i64 = 60 * 60;

/// Shown when an upload can't be decoded as an image.
pub const INVALID_UPLOAD_MESSAGE: &str = "Không đọc được ảnh, vui lòng chọn tệp khác.";

/// Shown when an upload decodes but isn't JPEG or PNG.
pub const UNSUPPORTED_UPLOAD_MESSAGE: &str = "Chỉ hỗ trợ ảnh JPEG hoặc PNG.";

#[cfg(test)]
/// Theme id used throughout tests
pub const TEST_THEME_ID: &str = "trending-3d-model-2025";
