//! Modifier flag definitions and the Command/Option swap rule
//!
//! Bit values mirror the macOS CGEventFlags masks so a platform backend can
//! convert with a plain `bits()` copy.

use std::fmt;
use std::ops::{BitOr, BitXor};

/// Modifier flag masks, identical to the CGEventFlags device-independent bits
pub mod masks {
    /// Caps lock
    pub const ALPHA_SHIFT: u64 = 0x0001_0000;
    /// Shift key modifier flag
    pub const SHIFT: u64 = 0x0002_0000;
    /// Control key modifier flag
    pub const CONTROL: u64 = 0x0004_0000;
    /// Option/Alt key modifier flag
    pub const OPTION: u64 = 0x0008_0000;
    /// Command key modifier flag
    pub const COMMAND: u64 = 0x0010_0000;
    /// Key originates from the numeric pad
    pub const NUMERIC_PAD: u64 = 0x0020_0000;
    /// Help key modifier flag
    pub const HELP: u64 = 0x0040_0000;
    /// Function (fn) key modifier flag
    pub const SECONDARY_FN: u64 = 0x0080_0000;
}

/// Set of modifier bits carried by a keyboard event
///
/// Unknown bits (device-dependent left/right masks, for instance) are
/// preserved untouched through every operation.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModifierFlags(u64);

impl ModifierFlags {
    pub const NONE: Self = Self(0);
    pub const SHIFT: Self = Self(masks::SHIFT);
    pub const CONTROL: Self = Self(masks::CONTROL);
    pub const OPTION: Self = Self(masks::OPTION);
    pub const COMMAND: Self = Self(masks::COMMAND);
    pub const NUMERIC_PAD: Self = Self(masks::NUMERIC_PAD);
    pub const HELP: Self = Self(masks::HELP);
    pub const FUNCTION: Self = Self(masks::SECONDARY_FN);

    /// Both bits toggled by the swap
    pub const COMMAND_OPTION: Self = Self(masks::COMMAND | masks::OPTION);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// True if every bit of `other` is set in `self`
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set in `self`
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ModifierFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitXor for ModifierFlags {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl fmt::Display for ModifierFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ModifierFlags, &str); 7] = [
            (ModifierFlags::SHIFT, "shift"),
            (ModifierFlags::CONTROL, "control"),
            (ModifierFlags::OPTION, "option"),
            (ModifierFlags::COMMAND, "command"),
            (ModifierFlags::FUNCTION, "fn"),
            (ModifierFlags::NUMERIC_PAD, "numpad"),
            (ModifierFlags::HELP, "help"),
        ];

        let parts: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();

        if parts.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", parts.join("+"))
        }
    }
}

impl fmt::Debug for ModifierFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModifierFlags({self} {:#x})", self.0)
    }
}

/// Computes the flags to apply to a key-down event.
///
/// Returns `None` when neither Command nor Option is held. Otherwise both
/// bits are toggled, so a lone Command becomes Option and vice versa. When
/// both are held the toggle clears both.
pub fn swap_command_option(flags: ModifierFlags) -> Option<ModifierFlags> {
    if !flags.intersects(ModifierFlags::COMMAND_OPTION) {
        return None;
    }
    Some(flags ^ ModifierFlags::COMMAND_OPTION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_becomes_option() {
        let input = ModifierFlags::COMMAND | ModifierFlags::SHIFT;
        assert_eq!(
            swap_command_option(input),
            Some(ModifierFlags::OPTION | ModifierFlags::SHIFT)
        );
    }

    #[test]
    fn test_option_becomes_command() {
        assert_eq!(
            swap_command_option(ModifierFlags::OPTION),
            Some(ModifierFlags::COMMAND)
        );
    }

    #[test]
    fn test_neither_is_untouched() {
        let input = ModifierFlags::SHIFT | ModifierFlags::CONTROL;
        assert_eq!(swap_command_option(input), None);
    }

    #[test]
    fn test_both_pressed_clears_both() {
        let input = ModifierFlags::COMMAND | ModifierFlags::OPTION | ModifierFlags::SHIFT;
        assert_eq!(swap_command_option(input), Some(ModifierFlags::SHIFT));
    }

    #[test]
    fn test_other_bits_survive() {
        // 0x8 is NX_DEVICELCMDKEYMASK, a device-dependent bit
        let input = ModifierFlags::from_bits(masks::COMMAND | masks::SECONDARY_FN | 0x8);
        let output = swap_command_option(input).unwrap();
        assert_eq!(output.bits(), masks::OPTION | masks::SECONDARY_FN | 0x8);
    }

    #[test]
    fn test_display() {
        assert_eq!(ModifierFlags::NONE.to_string(), "none");
        assert_eq!(
            (ModifierFlags::SHIFT | ModifierFlags::COMMAND).to_string(),
            "shift+command"
        );
    }
}
