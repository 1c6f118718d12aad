//! Grid value classification and colors.

use serde::{Deserialize, Serialize};

/// An opaque 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Builds a color from `0xRRGGBB`.
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as u8,
            g: ((hex >> 8) & 0xFF) as u8,
            b: (hex & 0xFF) as u8,
        }
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, u8::MAX]
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

pub const WHITE: Rgb = Rgb::new(255, 255, 255);
pub const WALL_GRAY: Rgb = Rgb::new(207, 207, 207);
pub const HAZE: Rgb = Rgb::new(245, 245, 245);
pub const NEUTRAL_GRAY: Rgb = Rgb::new(147, 145, 146);

/// Color given to room values that have no predefined hue.
pub const DEFAULT_ROOM: Rgb = Rgb::from_hex(0x939192);

const ROOM_HUES: [(u8, u32); 13] = [
    (0x01, 0xFA6930),
    (0x05, 0xF9CC29),
    (0x09, 0x46A68B),
    (0x0D, 0x1F8BFA),
    (0x11, 0xF5787C),
    (0x15, 0xA6E66E),
    (0x19, 0x48F5C7),
    (0x1D, 0x7AF5FA),
    (0x21, 0xF19CA1),
    (0x25, 0x75DE1F),
    (0x29, 0x62E5EF),
    (0x2D, 0x9D85F5),
    (0x31, 0xF4C29D),
];

/// Which color rule a grid value falls under.
///
/// Rules are checked in declaration order; the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    /// `0`
    Background,
    /// `0xFD`
    Wall,
    /// Residue 2, 6, 10 or 14 mod 16, or `0xFE`
    Haze,
    /// Any other residue outside the room classes
    Neutral,
    /// Residue 1, 5, 9 or 13 mod 16
    Room,
}

impl ValueClass {
    pub fn of(value: u8) -> Self {
        let residue = value % 16;
        if value == 0 {
            Self::Background
        } else if value == 0xFD {
            Self::Wall
        } else if matches!(residue, 2 | 6 | 10 | 14) || value == 0xFE {
            Self::Haze
        } else if !matches!(residue, 1 | 5 | 9 | 13) {
            Self::Neutral
        } else {
            Self::Room
        }
    }
}

/// Per-map `value -> color` table with a single default.
#[derive(Debug, Clone)]
pub struct Palette {
    rooms: [Option<Rgb>; 256],
    default: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self::predefined()
    }
}

impl Palette {
    /// The table with only the predefined room hues.
    pub fn predefined() -> Self {
        let mut rooms = [None; 256];
        for (value, hex) in ROOM_HUES {
            rooms[value as usize] = Some(Rgb::from_hex(hex));
        }
        Self {
            rooms,
            default: DEFAULT_ROOM,
        }
    }

    /// Predefined hues plus the default for every other room value in `grid`.
    pub fn seeded_from(grid: &[u8]) -> Self {
        let mut palette = Self::predefined();
        let mut seen = [false; 256];
        for &value in grid {
            if value == 0 || seen[value as usize] {
                continue;
            }
            seen[value as usize] = true;
            if ValueClass::of(value) == ValueClass::Room && palette.rooms[value as usize].is_none()
            {
                palette.rooms[value as usize] = Some(palette.default);
            }
        }
        palette
    }

    /// Overrides the hue of one room value.
    pub fn set(&mut self, value: u8, color: Rgb) {
        self.rooms[value as usize] = Some(color);
    }

    /// Room values with an explicit entry.
    pub fn entries(&self) -> impl Iterator<Item = (u8, Rgb)> + '_ {
        self.rooms
            .iter()
            .enumerate()
            .filter_map(|(value, color)| color.map(|c| (value as u8, c)))
    }

    pub fn color_of(&self, value: u8) -> Rgb {
        match ValueClass::of(value) {
            ValueClass::Background => WHITE,
            ValueClass::Wall => WALL_GRAY,
            ValueClass::Haze => HAZE,
            ValueClass::Neutral => NEUTRAL_GRAY,
            ValueClass::Room => self.rooms[value as usize].unwrap_or(self.default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_rules() {
        let palette = Palette::predefined();
        assert_eq!(palette.color_of(0), WHITE);
        assert_eq!(palette.color_of(0xFD), Rgb::new(207, 207, 207));
        assert_eq!(palette.color_of(0xFE), HAZE);
        assert_eq!(palette.color_of(0x02), HAZE);
        assert_eq!(palette.color_of(0x1E), HAZE);
        assert_eq!(palette.color_of(0x03), NEUTRAL_GRAY);
        assert_eq!(palette.color_of(0xFC), NEUTRAL_GRAY);
    }

    #[test]
    fn test_rule_order() {
        // 0xFD sits in a room residue class but the wall rule comes first.
        assert_eq!(0xFD % 16, 13);
        assert_eq!(ValueClass::of(0xFD), ValueClass::Wall);
        // 0xFE is residue 14 anyway, 0xFF residue 15 falls to neutral.
        assert_eq!(ValueClass::of(0xFF), ValueClass::Neutral);
    }

    #[test]
    fn test_room_table() {
        let palette = Palette::predefined();
        assert_eq!(palette.color_of(0x11), Rgb::from_hex(0xF5787C));
        assert_eq!(palette.color_of(0x01), Rgb::new(0xFA, 0x69, 0x30));
        // Unseen room value falls back to the default gray.
        assert_eq!(palette.color_of(0x35), DEFAULT_ROOM);
    }

    #[test]
    fn test_seeding_is_per_map() {
        let seeded = Palette::seeded_from(&[0, 0x35, 0x35, 0x03, 0xFD]);
        let entries: Vec<u8> = seeded.entries().map(|(v, _)| v).collect();
        assert!(entries.contains(&0x35));
        assert!(!entries.contains(&0x03));
        assert!(!entries.contains(&0xFD));

        let other = Palette::predefined();
        assert_eq!(other.entries().count(), 13);
    }

    #[test]
    fn test_override_and_display() {
        let mut palette = Palette::seeded_from(&[0x39]);
        palette.set(0x39, Rgb::from_hex(0x123456));
        assert_eq!(palette.color_of(0x39).to_string(), "#123456");
        assert_eq!(DEFAULT_ROOM, NEUTRAL_GRAY);
    }
}
