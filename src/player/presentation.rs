//! Presentation state: fullscreen and landscape simulation

/// How the player surface is presented.
///
/// Landscape simulation (a rotated view for portrait screens) exists both
/// inline and in fullscreen; leaving fullscreen always returns to `Inline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presentation {
    #[default]
    Inline,
    Landscape,
    Fullscreen { landscape: bool },
}

impl Presentation {
    pub fn is_fullscreen(self) -> bool {
        matches!(self, Presentation::Fullscreen { .. })
    }

    pub fn is_landscape(self) -> bool {
        matches!(
            self,
            Presentation::Landscape | Presentation::Fullscreen { landscape: true }
        )
    }

    /// Fullscreen, rotating by default on narrow viewports
    pub fn enter_fullscreen(self, narrow_viewport: bool) -> Self {
        Presentation::Fullscreen {
            landscape: narrow_viewport || self.is_landscape(),
        }
    }

    pub fn exit_fullscreen(self) -> Self {
        Presentation::Inline
    }

    pub fn toggle_landscape(self) -> Self {
        match self {
            Presentation::Inline => Presentation::Landscape,
            Presentation::Landscape => Presentation::Inline,
            Presentation::Fullscreen { landscape } => Presentation::Fullscreen {
                landscape: !landscape,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_fullscreen_rotates() {
        let p = Presentation::Inline.enter_fullscreen(true);
        assert_eq!(p, Presentation::Fullscreen { landscape: true });
        assert!(p.is_landscape());
    }

    #[test]
    fn test_wide_fullscreen_keeps_orientation() {
        assert_eq!(
            Presentation::Inline.enter_fullscreen(false),
            Presentation::Fullscreen { landscape: false }
        );
        assert_eq!(
            Presentation::Landscape.enter_fullscreen(false),
            Presentation::Fullscreen { landscape: true }
        );
    }

    #[test]
    fn test_exit_clears_landscape() {
        let p = Presentation::Fullscreen { landscape: true }.exit_fullscreen();
        assert_eq!(p, Presentation::Inline);
        assert!(!p.is_landscape());
    }

    #[test]
    fn test_toggle_landscape() {
        assert_eq!(Presentation::Inline.toggle_landscape(), Presentation::Landscape);
        assert_eq!(Presentation::Landscape.toggle_landscape(), Presentation::Inline);
        assert_eq!(
            Presentation::Fullscreen { landscape: true }.toggle_landscape(),
            Presentation::Fullscreen { landscape: false }
        );
    }
}
