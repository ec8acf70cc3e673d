//! Real-time input encoding
//!
//! The input characteristic takes a 4-byte bitfield. Every controller
//! button owns one bit; bit `n` lives in byte `n / 8` at position `n % 8`
//! (least significant bit first). An all-zero buffer means nothing is
//! pressed.

use std::str::FromStr;
use thiserror::Error;

/// Size of the encoded input state in bytes
pub const INPUT_STATE_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    North,
    East,
    South,
    West,
    Select,
    Start,
    Home,
    Touchpad,
    L1,
    L2,
    L3,
    R1,
    R2,
    R3,
}

impl Button {
    pub const ALL: [Button; 18] = [
        Self::North,
        Self::East,
        Self::South,
        Self::West,
        Self::L1,
        Self::L2,
        Self::L3,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::Select,
        Self::Start,
        Self::Home,
        Self::Touchpad,
        Self::Up,
        Self::Down,
        Self::Right,
        Self::Left,
    ];

    /// Bit offset of this button inside the input bitfield
    pub fn offset(self) -> u8 {
        match self {
            Self::North => 0,
            Self::East => 1,
            Self::South => 2,
            Self::West => 3,
            Self::L1 => 4,
            Self::L2 => 5,
            Self::L3 => 6,
            Self::R1 => 7,
            Self::R2 => 8,
            Self::R3 => 9,
            Self::Select => 10,
            Self::Start => 11,
            Self::Home => 12,
            Self::Touchpad => 13,
            Self::Up => 14,
            Self::Down => 15,
            Self::Right => 16,
            Self::Left => 17,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unexpected button name {0}")]
pub struct UnknownButton(pub String);

impl FromStr for Button {
    type Err = UnknownButton;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "up" => Self::Up,
            "down" => Self::Down,
            "left" => Self::Left,
            "right" => Self::Right,
            "north" => Self::North,
            "east" => Self::East,
            "south" => Self::South,
            "west" => Self::West,
            "select" => Self::Select,
            "start" => Self::Start,
            "home" => Self::Home,
            "tp" | "touchpad" => Self::Touchpad,
            "l1" => Self::L1,
            "l2" => Self::L2,
            "l3" => Self::L3,
            "r1" => Self::R1,
            "r2" => Self::R2,
            "r3" => Self::R3,
            other => return Err(UnknownButton(other.to_string())),
        })
    }
}

/// Encoded button state ready to be written to the input characteristic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState([u8; INPUT_STATE_LEN]);

impl InputState {
    /// State with no buttons pressed
    pub fn released() -> Self {
        Self::default()
    }

    /// State with exactly one button pressed
    pub fn single(button: Button) -> Self {
        let mut state = Self::default();
        state.press(button);
        state
    }

    pub fn press(&mut self, button: Button) {
        let (byte, mask) = Self::locate(button);
        self.0[byte] |= mask;
    }

    pub fn release(&mut self, button: Button) {
        let (byte, mask) = Self::locate(button);
        self.0[byte] &= !mask;
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        let (byte, mask) = Self::locate(button);
        self.0[byte] & mask != 0
    }

    pub fn is_released(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; INPUT_STATE_LEN] {
        &self.0
    }

    fn locate(button: Button) -> (usize, u8) {
        let offset = button.offset();
        ((offset / 8) as usize, 1 << (offset % 8))
    }
}

impl FromIterator<Button> for InputState {
    fn from_iter<I: IntoIterator<Item = Button>>(iter: I) -> Self {
        let mut state = Self::default();
        for button in iter {
            state.press(button);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_offsets_are_unique_and_fit() {
        let offsets: HashSet<u8> = Button::ALL.iter().map(|b| b.offset()).collect();
        assert_eq!(offsets.len(), Button::ALL.len());
        assert!(offsets.iter().all(|o| (*o as usize) < INPUT_STATE_LEN * 8));
    }

    #[test]
    fn test_bit_placement() {
        assert_eq!(InputState::single(Button::North).as_bytes(), &[0x01, 0, 0, 0]);
        assert_eq!(InputState::single(Button::R2).as_bytes(), &[0, 0x01, 0, 0]);
        assert_eq!(InputState::single(Button::Up).as_bytes(), &[0, 0x40, 0, 0]);
        assert_eq!(InputState::single(Button::Left).as_bytes(), &[0, 0, 0x02, 0]);
    }

    #[test]
    fn test_press_and_release() {
        let mut state: InputState = [Button::South, Button::Home].into_iter().collect();
        assert!(state.is_pressed(Button::South));
        assert!(state.is_pressed(Button::Home));
        assert!(!state.is_pressed(Button::Start));

        state.release(Button::South);
        state.release(Button::Home);
        assert!(state.is_released());
        assert_eq!(state, InputState::released());
    }

    #[test]
    fn test_parse_button_names() {
        assert_eq!("tp".parse::<Button>().unwrap(), Button::Touchpad);
        assert_eq!("r3".parse::<Button>().unwrap(), Button::R3);
        assert!("triangle".parse::<Button>().is_err());
    }
}
