use rand::seq::SliceRandom;
use rand::Rng;

use super::types::Persona;

/// Characters kept from a terse persona's reply before the ellipsis.
pub const TERSE_MAX_CHARS: usize = 20;
/// Anything longer than this after truncation is replaced outright.
pub const TERSE_HARD_LIMIT: usize = 25;
pub const ELLIPSIS: char = '…';

pub const TERSE_STOCK_PHRASES: &[&str] = &["……", "嗯。", "走。", "小心。", "跟紧我。"];

/// Emoji, pictographs and the joiners/selectors that glue them together.
fn is_pictographic(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF
            | 0x2600..=0x27BF
            | 0x2300..=0x23FF
            | 0x2B00..=0x2BFF
            | 0xE0020..=0xE007F
            | 0x200D
            | 0x20E3
            | 0xFE0E
            | 0xFE0F
            | 0x3030
            | 0x303D
            | 0x3297
            | 0x3299
    )
}

pub fn strip_pictographs(text: &str) -> String {
    text.chars().filter(|c| !is_pictographic(*c)).collect()
}

fn clamp_terse<R: Rng>(reply: &str, rng: &mut R) -> String {
    let stripped = strip_pictographs(reply);
    let stripped = stripped.trim();

    let clamped = if stripped.chars().count() > TERSE_MAX_CHARS {
        let head: String = stripped.chars().take(TERSE_MAX_CHARS).collect();
        format!("{}{}", head.trim_end(), ELLIPSIS)
    } else {
        stripped.to_string()
    };

    if clamped.is_empty() || clamped.chars().count() > TERSE_HARD_LIMIT {
        return TERSE_STOCK_PHRASES
            .choose(rng)
            .map(|s| s.to_string())
            .unwrap_or_default();
    }

    clamped
}

/// Apply the persona's hard reply constraints. Non-terse personas only get
/// surrounding whitespace trimmed.
pub fn enforce_with_rng<R: Rng>(reply: &str, persona: &Persona, rng: &mut R) -> String {
    let trimmed = reply.trim();
    if !persona.terse {
        return trimmed.to_string();
    }
    clamp_terse(trimmed, rng).trim().to_string()
}

pub fn enforce(reply: &str, persona: &Persona) -> String {
    enforce_with_rng(reply, persona, &mut rand::thread_rng())
}
