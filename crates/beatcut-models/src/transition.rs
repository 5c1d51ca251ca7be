//! Transitions between adjacent shots.

use serde::{Deserialize, Serialize};

/// Visual transition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Hard cut, no blending
    #[default]
    Cut,
    Crossfade,
    FadeBlack,
    Glitch,
    SlideLeft,
    SlideUp,
    ZoomIn,
}

impl TransitionKind {
    /// Kinds used when the scene changes completely.
    pub const SCENE_CHANGE: [TransitionKind; 3] = [
        TransitionKind::SlideLeft,
        TransitionKind::SlideUp,
        TransitionKind::ZoomIn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Cut => "cut",
            TransitionKind::Crossfade => "crossfade",
            TransitionKind::FadeBlack => "fade_black",
            TransitionKind::Glitch => "glitch",
            TransitionKind::SlideLeft => "slide_left",
            TransitionKind::SlideUp => "slide_up",
            TransitionKind::ZoomIn => "zoom_in",
        }
    }
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timed transition leading into a shot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Transition {
    pub kind: TransitionKind,
    /// Blend duration in seconds (0 for a cut)
    pub duration: f64,
}

impl Transition {
    pub fn new(kind: TransitionKind, duration: f64) -> Self {
        Self {
            kind,
            duration: duration.max(0.0),
        }
    }

    /// A hard cut.
    pub fn cut() -> Self {
        Self::default()
    }

    /// Whether the transition blends two shots.
    pub fn is_blend(&self) -> bool {
        self.kind != TransitionKind::Cut && self.duration > 0.0
    }
}
