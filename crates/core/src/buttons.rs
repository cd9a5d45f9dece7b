//! Button actions a keymap slot can be bound to.
//!
//! A `Button` keymap entry is a 4-byte big-endian code:
//!   - 0x8001_MMMM: mouse button click, MMMM is the button bitmask
//!   - 0x90SS_0000: special function SS (DPI, profile, wheel tilt...)

/// Raw keymap codes for each action.
pub mod codes {
    pub const LEFT: u32 = 0x8001_0001;
    pub const RIGHT: u32 = 0x8001_0002;
    pub const MIDDLE: u32 = 0x8001_0004;
    pub const BACK: u32 = 0x8001_0008;
    pub const FORWARD: u32 = 0x8001_0010;
    pub const WHEEL_LEFT: u32 = 0x9001_0000;
    pub const WHEEL_RIGHT: u32 = 0x9002_0000;
    pub const DPI_UP: u32 = 0x9003_0000;
    pub const DPI_DOWN: u32 = 0x9004_0000;
    pub const DPI_CYCLE: u32 = 0x9005_0000;
    pub const DPI_DEFAULT: u32 = 0x9006_0000;
    pub const DPI_SHIFT: u32 = 0x9007_0000;
    pub const PROFILE_UP: u32 = 0x9008_0000;
    pub const PROFILE_DOWN: u32 = 0x9009_0000;
    pub const PROFILE_CYCLE: u32 = 0x900A_0000;
    pub const GSHIFT: u32 = 0x900B_0000;
    pub const BATTERY: u32 = 0x900C_0000;
}

/// Mouse button or special function bound to a keymap slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Left,
    Right,
    Middle,
    Back,
    Forward,
    WheelLeft,
    WheelRight,
    DpiUp,
    DpiDown,
    DpiCycle,
    DpiDefault,
    DpiShift,
    ProfileUp,
    ProfileDown,
    ProfileCycle,
    Gshift,
    Battery,
}

impl ButtonAction {
    /// Every action, in code order.
    pub const ALL: &'static [ButtonAction] = &[
        Self::Left,
        Self::Right,
        Self::Middle,
        Self::Back,
        Self::Forward,
        Self::WheelLeft,
        Self::WheelRight,
        Self::DpiUp,
        Self::DpiDown,
        Self::DpiCycle,
        Self::DpiDefault,
        Self::DpiShift,
        Self::ProfileUp,
        Self::ProfileDown,
        Self::ProfileCycle,
        Self::Gshift,
        Self::Battery,
    ];

    /// Keymap code written to the profile page.
    pub fn code(&self) -> u32 {
        match self {
            Self::Left => codes::LEFT,
            Self::Right => codes::RIGHT,
            Self::Middle => codes::MIDDLE,
            Self::Back => codes::BACK,
            Self::Forward => codes::FORWARD,
            Self::WheelLeft => codes::WHEEL_LEFT,
            Self::WheelRight => codes::WHEEL_RIGHT,
            Self::DpiUp => codes::DPI_UP,
            Self::DpiDown => codes::DPI_DOWN,
            Self::DpiCycle => codes::DPI_CYCLE,
            Self::DpiDefault => codes::DPI_DEFAULT,
            Self::DpiShift => codes::DPI_SHIFT,
            Self::ProfileUp => codes::PROFILE_UP,
            Self::ProfileDown => codes::PROFILE_DOWN,
            Self::ProfileCycle => codes::PROFILE_CYCLE,
            Self::Gshift => codes::GSHIFT,
            Self::Battery => codes::BATTERY,
        }
    }

    /// Look up the action stored as `code`, if it is one of the known ones.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|action| action.code() == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip_all() {
        for &action in ButtonAction::ALL {
            assert_eq!(ButtonAction::from_code(action.code()), Some(action));
        }
    }

    #[test]
    fn codes_are_unique() {
        let mut all: Vec<u32> = ButtonAction::ALL.iter().map(|a| a.code()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), ButtonAction::ALL.len());
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(ButtonAction::from_code(0x8001_0020), None);
        assert_eq!(ButtonAction::from_code(0x8002_0004), None);
        assert_eq!(ButtonAction::from_code(0x0000_0000), None);
    }

    #[test]
    fn serde_uses_document_names() {
        let json = serde_json::to_string(&ButtonAction::DpiShift).unwrap();
        assert_eq!(json, "\"dpi_shift\"");
        let back: ButtonAction = serde_json::from_str("\"wheel_left\"").unwrap();
        assert_eq!(back, ButtonAction::WheelLeft);
    }
}
