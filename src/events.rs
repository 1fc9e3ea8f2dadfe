// CallButton — System Events & Data Types

// ---------------------------------------------------------------------------
// Input channels
// ---------------------------------------------------------------------------

/// Identity of a physical input. Buttons are indexed into
/// [`crate::config::BUTTON_LABELS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelId {
    Button(usize),
    Touch,
    Shake,
}

impl ChannelId {
    /// Wire-protocol label used in outbound messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Button(i) => crate::config::BUTTON_LABELS[*i],
            Self::Touch => "touch",
            Self::Shake => "shake",
        }
    }
}

// ---------------------------------------------------------------------------
// Gestures
// ---------------------------------------------------------------------------

/// A classified input gesture.
///
/// `Single { after_long }` distinguishes a plain short click from the
/// release that ends a long press. Both serialize to `"single"` on the wire;
/// the flag only matters to the recording session coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Button went down (debounced). Used for session timing only, never
    /// published to the backend.
    PressDown,
    Single { after_long: bool },
    Long,
    Touch,
    DoubleTouch,
    Shake,
}

/// Immutable classifier output, sent over the dispatch channel.
#[derive(Debug, Clone, Copy)]
pub struct GestureEvent {
    pub channel: ChannelId,
    pub gesture: Gesture,
    pub at_ms: u32,
}

// ---------------------------------------------------------------------------
// Dispatch events — everything the coordinator task reacts to
// ---------------------------------------------------------------------------
#[derive(Debug)]
pub enum AppEvent {
    Gesture(GestureEvent),
    /// MQTT link came up; time to (re)subscribe, register and report config.
    LinkUp,
    LinkDown,
    /// Raw JSON body of a `config/set` message.
    ConfigUpdate(String),
}

// ---------------------------------------------------------------------------
// LED feedback
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    White,
    Yellow,
    Blue,
    Cyan,
    Purple,
    Red,
    Green,
}

impl LedColor {
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            Self::White => (255, 255, 255),
            Self::Yellow => (255, 180, 0),
            Self::Blue => (0, 0, 255),
            Self::Cyan => (0, 255, 255),
            Self::Purple => (160, 0, 255),
            Self::Red => (255, 0, 0),
            Self::Green => (0, 255, 0),
        }
    }
}

/// Commands for the LED task. Senders never block on the strip refresh.
#[derive(Debug, Clone, Copy)]
pub enum LedCommand {
    /// Show a color for the given duration, then fall back to the current
    /// background state.
    Flash(LedColor, u32),
    /// Persistent background color (e.g. "recording" blue).
    Solid(LedColor),
    /// Back to dark.
    Clear,
}
