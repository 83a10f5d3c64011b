//! Shared UI icons and emojis.
//!
//! Each icon carries a plain-text fallback for terminals without emoji
//! support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");

// Feedback indicators
pub static FEEDBACK: Emoji<'_, '_> = Emoji("📝 ", "[FB]");
pub static INBOX: Emoji<'_, '_> = Emoji("📥 ", ">");

// Session indicators
pub static PROGRESS: Emoji<'_, '_> = Emoji("📊 ", "[PROG]");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
pub static BULB: Emoji<'_, '_> = Emoji("💡 ", "-");
