use std::collections::HashSet;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
    Function(u8),
}

impl KeyCode {
    /// Parses names such as `"Left"`, `"a"`, `"7"` or `"F3"`.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = NamedKey::from_name(name) {
            return Some(Self::Named(key));
        }
        let mut chars = name.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            if ch.is_ascii_alphabetic() {
                return Some(Self::Character(ch.to_ascii_uppercase()));
            }
            if let Some(digit) = ch.to_digit(10) {
                return Some(Self::Digit(digit as u8));
            }
        }
        let index = name
            .strip_prefix(['F', 'f'])
            .and_then(|rest| rest.parse::<u8>().ok())?;
        (1..=24).contains(&index).then_some(Self::Function(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Escape,
    Backspace,
    Left,
    Right,
    Up,
    Down,
    LeftShift,
    RightShift,
    LeftCtrl,
    RightCtrl,
}

impl NamedKey {
    fn from_name(name: &str) -> Option<Self> {
        use NamedKey::*;
        Some(match name {
            "Space" => Space,
            "Enter" | "Return" => Enter,
            "Tab" => Tab,
            "Escape" | "Esc" => Escape,
            "Backspace" => Backspace,
            "Left" => Left,
            "Right" => Right,
            "Up" => Up,
            "Down" => Down,
            "LeftShift" | "LShift" => LeftShift,
            "RightShift" | "RShift" => RightShift,
            "LeftCtrl" | "LControl" => LeftCtrl,
            "RightCtrl" | "RControl" => RightCtrl,
            _ => return None,
        })
    }
}

/// Mouse button index, left button is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const RIGHT: Self = Self(1);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Parses `"Mouse"` (left) or one-based `"Mouse2"` style names.
    pub fn from_name(name: &str) -> Option<Self> {
        let prefix = name.get(..5)?;
        if !prefix.eq_ignore_ascii_case("mouse") {
            return None;
        }
        match &name[5..] {
            "" => Some(Self::LEFT),
            suffix => {
                let index = suffix.parse::<u8>().ok()?;
                Some(Self(index.saturating_sub(1)))
            }
        }
    }
}

/// Device state polled by the platform layer once per frame, before the
/// world steps. Node kinds only ever read it.
#[derive(Debug, Default, Clone)]
pub struct InputState {
    held_keys: HashSet<KeyCode>,
    pressed_keys: HashSet<KeyCode>,
    held_buttons: HashSet<MouseButton>,
    cursor: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the edges latched during the previous frame.
    pub fn begin_frame(&mut self) {
        self.pressed_keys.clear();
    }

    pub fn press_key(&mut self, key: KeyCode) {
        if self.held_keys.insert(key) {
            self.pressed_keys.insert(key);
        }
    }

    pub fn release_key(&mut self, key: KeyCode) {
        self.held_keys.remove(&key);
    }

    pub fn press_button(&mut self, button: MouseButton) {
        self.held_buttons.insert(button);
    }

    pub fn release_button(&mut self, button: MouseButton) {
        self.held_buttons.remove(&button);
    }

    pub fn set_cursor(&mut self, position: Vec2) {
        self.cursor = position;
    }

    pub fn cursor(&self) -> Vec2 {
        self.cursor
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.held_keys.contains(&key)
    }

    /// True only during the frame in which the key went down.
    pub fn was_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_button_down(&self, button: MouseButton) -> bool {
        self.held_buttons.contains(&button)
    }

    /// Holds the key or button named `name`. Returns `false` for unknown names.
    pub fn press_by_name(&mut self, name: &str) -> bool {
        if let Some(button) = MouseButton::from_name(name) {
            self.press_button(button);
            return true;
        }
        match KeyCode::from_name(name) {
            Some(key) => {
                self.press_key(key);
                true
            }
            None => false,
        }
    }

    pub fn is_down_by_name(&self, name: &str) -> bool {
        if let Some(button) = MouseButton::from_name(name) {
            return self.is_button_down(button);
        }
        KeyCode::from_name(name).is_some_and(|key| self.is_key_down(key))
    }

    /// Unit-less direction from the arrow keys and WASD, y pointing up.
    pub fn move_axis(&self) -> Vec2 {
        let axis = |negative: [&str; 2], positive: [&str; 2]| {
            let down = |names: [&str; 2]| names.iter().any(|name| self.is_down_by_name(name));
            (down(positive) as i32 - down(negative) as i32) as f32
        };
        Vec2::new(
            axis(["Left", "A"], ["Right", "D"]),
            axis(["Down", "S"], ["Up", "W"]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_character_keys() {
        assert_eq!(
            KeyCode::from_name("Space"),
            Some(KeyCode::Named(NamedKey::Space))
        );
        assert_eq!(KeyCode::from_name("a"), Some(KeyCode::Character('A')));
        assert_eq!(KeyCode::from_name("7"), Some(KeyCode::Digit(7)));
        assert_eq!(KeyCode::from_name("F12"), Some(KeyCode::Function(12)));
        assert_eq!(KeyCode::from_name("F99"), None);
        assert_eq!(KeyCode::from_name("Nope"), None);
    }

    #[test]
    fn mouse_names_are_one_based() {
        assert_eq!(MouseButton::from_name("Mouse"), Some(MouseButton::LEFT));
        assert_eq!(MouseButton::from_name("mouse2"), Some(MouseButton::RIGHT));
        assert_eq!(MouseButton::from_name("Mou"), None);
    }

    #[test]
    fn pressed_edges_last_one_frame() {
        let mut input = InputState::new();
        let space = KeyCode::Named(NamedKey::Space);
        input.press_key(space);
        assert!(input.was_key_pressed(space));
        input.begin_frame();
        input.press_key(space);
        assert!(input.is_key_down(space));
        assert!(!input.was_key_pressed(space));
        input.release_key(space);
        assert!(!input.is_down_by_name("Space"));
    }

    #[test]
    fn move_axis_combines_arrows_and_wasd() {
        let mut input = InputState::new();
        assert!(input.press_by_name("Right"));
        assert!(input.press_by_name("w"));
        assert_eq!(input.move_axis(), Vec2::new(1.0, 1.0));
        assert!(input.press_by_name("Left"));
        assert_eq!(input.move_axis(), Vec2::new(0.0, 1.0));
        assert!(!input.press_by_name("Bogus"));
    }
}
