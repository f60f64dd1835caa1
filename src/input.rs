use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    /// Parses key names as reported by winit or by DOM `KeyboardEvent.key`.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if ch.is_ascii_alphabetic() => {
                Some(Self::Character(ch.to_ascii_uppercase()))
            }
            (Some(ch), None) if ch.is_ascii_digit() => Some(Self::Digit(ch as u8 - b'0')),
            _ => None,
        }
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" | " " => Space,
        "Enter" | "Return" => Enter,
        "Tab" => Tab,
        "Left" | "ArrowLeft" => Left,
        "Right" | "ArrowRight" => Right,
        "Up" | "ArrowUp" => Up,
        "Down" | "ArrowDown" => Down,
        "Escape" | "Esc" => Escape,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Friendly names for the non-character keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Escape,
}

/// Viewer actions bound to keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shortcut {
    ToggleEffect,
    TogglePanel,
    ResetParameters,
    ToggleGrid,
    NextSlider,
    StepUp,
    StepDown,
    Inspect,
    Dismiss,
    Quit,
}

impl Shortcut {
    pub fn from_key(key: KeyCode) -> Option<Self> {
        Some(match key {
            KeyCode::Character('E') => Self::ToggleEffect,
            KeyCode::Character('H') => Self::TogglePanel,
            KeyCode::Character('R') => Self::ResetParameters,
            KeyCode::Character('G') => Self::ToggleGrid,
            KeyCode::Character('I') => Self::Inspect,
            KeyCode::Character('X') => Self::Dismiss,
            KeyCode::Named(NamedKey::Tab) => Self::NextSlider,
            KeyCode::Named(NamedKey::Up | NamedKey::Right) => Self::StepUp,
            KeyCode::Named(NamedKey::Down | NamedKey::Left) => Self::StepDown,
            KeyCode::Named(NamedKey::Escape) => Self::Quit,
            _ => return None,
        })
    }

    pub fn from_name(name: &str) -> Option<Self> {
        KeyCode::from_name(name).and_then(Self::from_key)
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
        assert_eq!(
            KeyCode::from_name("ArrowUp"),
            Some(KeyCode::Named(NamedKey::Up))
        );
        assert_eq!(KeyCode::from_name("a"), Some(KeyCode::Character('A')));
        assert_eq!(KeyCode::from_name("7"), Some(KeyCode::Digit(7)));
        assert_eq!(KeyCode::from_name("Shift"), None);
    }

    #[test]
    fn shortcuts_ignore_case() {
        assert_eq!(Shortcut::from_name("e"), Some(Shortcut::ToggleEffect));
        assert_eq!(Shortcut::from_name("E"), Some(Shortcut::ToggleEffect));
        assert_eq!(Shortcut::from_name("Tab"), Some(Shortcut::NextSlider));
        assert_eq!(Shortcut::from_name("ArrowDown"), Some(Shortcut::StepDown));
        assert_eq!(Shortcut::from_name("x"), Some(Shortcut::Dismiss));
        assert_eq!(Shortcut::from_name("q"), None);
    }
}
