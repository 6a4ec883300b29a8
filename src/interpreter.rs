// Narration interpreter: spots dice-roll requests and health directives in
// free text returned by the model.

use lazy_static::lazy_static;
use regex::Regex;

use crate::session::PlayerData;

/// Phrases that mean the narrator is waiting on a dice roll.
pub const ROLL_KEYWORDS: [&str; 5] = ["REQUEST-ROLL", "D20", "ROLL RESULT", "DC", "ROLL"];

/// Reason shown when the text asks for a roll without naming one.
pub const DEFAULT_ROLL_REASON: &str = "Roll a d20";

lazy_static! {
    static ref HP_SET: Regex = Regex::new(r"(?i)HP:\s*(\d+)").unwrap();
    static ref HP_OUT_OF_100: Regex = Regex::new(r"(\d+)/100").unwrap();
    static ref DAMAGE: Regex = Regex::new(r"(?i)(\d+)\s*POINTS?\s*OF\s*DMG").unwrap();
    static ref ROLL_REASON: Regex = Regex::new(r"(?im)REQUEST-ROLL\s*:\s*(.+?)\s*$").unwrap();
}

/// A health instruction found in narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HpDirective {
    /// `HP: n`
    Set(u32),
    /// `n/100`
    SetOutOf100(u32),
    /// `n POINTS OF DMG`
    Damage(u32),
}

/// The result of applying one directive to a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HpChange {
    pub directive: HpDirective,
    pub before: i32,
    pub after: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interpretation {
    pub roll_requested: bool,
    pub roll_reason: Option<String>,
    /// In scan order: every `HP:` match, then every `/100` match, then every
    /// damage match.
    pub hp_directives: Vec<HpDirective>,
}

impl Interpretation {
    pub fn changes_hp(&self) -> bool {
        !self.hp_directives.is_empty()
    }
}

/// Whether the text asks the player to roll. Case-insensitive substring match.
pub fn requires_roll(text: &str) -> bool {
    let upper = text.to_uppercase();
    ROLL_KEYWORDS.iter().any(|kw| upper.contains(kw))
}

fn captures(re: &Regex, text: &str) -> Vec<u32> {
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        // Digit runs too long for u32 saturate; they are clamped to max_hp anyway
        .map(|m| m.as_str().parse::<u32>().unwrap_or(u32::MAX))
        .collect()
}

/// Collect health directives in pattern-then-occurrence order.
pub fn hp_directives(text: &str) -> Vec<HpDirective> {
    let mut directives: Vec<HpDirective> = captures(&HP_SET, text)
        .into_iter()
        .map(HpDirective::Set)
        .collect();
    directives.extend(captures(&HP_OUT_OF_100, text).into_iter().map(HpDirective::SetOutOf100));
    directives.extend(captures(&DAMAGE, text).into_iter().map(HpDirective::Damage));
    directives
}

pub fn interpret(text: &str) -> Interpretation {
    let roll_requested = requires_roll(text);
    let roll_reason = if roll_requested {
        let reason = ROLL_REASON
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_ROLL_REASON.to_string());
        Some(reason)
    } else {
        None
    };

    Interpretation {
        roll_requested,
        roll_reason,
        hp_directives: hp_directives(text),
    }
}

/// Apply directives in order, clamping after each one.
pub fn apply_hp(player: &mut PlayerData, directives: &[HpDirective]) -> Vec<HpChange> {
    directives
        .iter()
        .map(|&directive| {
            let before = player.hp;
            let target = match directive {
                HpDirective::Set(n) | HpDirective::SetOutOf100(n) => i64::from(n),
                HpDirective::Damage(n) => i64::from(before) - i64::from(n),
            };
            let after = player.set_hp(target);
            HpChange {
                directive,
                before,
                after,
            }
        })
        .collect()
}
