// THEORY:
// The `signal_color` module defines what a single second of a cycle looks like
// and which sequences of colors a real signal head can produce.
//
// A traffic light runs through a small automaton. Typical cycles are
//     red -> red-amber -> green -> amber -> red
//     red -> green -> red
// so some transitions can never legitimately happen (red straight to amber,
// for example), and some colors have a hard upper bound on how long they can
// be shown. When a reconstructed cycle breaks one of these rules, an
// observation was lost somewhere upstream.
//
// The rules live in an immutable `TransitionRules` value that the cleanser
// builds once. There is no mutable global table.

pub mod signal_color {
    /// Raw color value as carried in a cycle's per-second results.
    pub type Color = u8;
    /// Length of a run of identical colors, in seconds.
    pub type RunLength = usize;

    pub const DARK: Color = 0;
    pub const RED: Color = 1;
    pub const AMBER: Color = 2;
    pub const GREEN: Color = 3;
    pub const RED_AMBER: Color = 4;
    pub const AMBER_FLASHING: Color = 5;
    pub const GREEN_FLASHING: Color = 6;

    /// The named color states a signal head reports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum SignalColor {
        Dark,
        Red,
        Amber,
        Green,
        RedAmber,
        AmberFlashing,
        GreenFlashing,
    }

    impl SignalColor {
        pub const ALL: [SignalColor; 7] = [
            SignalColor::Dark,
            SignalColor::Red,
            SignalColor::Amber,
            SignalColor::Green,
            SignalColor::RedAmber,
            SignalColor::AmberFlashing,
            SignalColor::GreenFlashing,
        ];

        /// Decodes a raw value. Values outside the known encoding yield `None`.
        pub fn from_value(value: Color) -> Option<Self> {
            match value {
                DARK => Some(SignalColor::Dark),
                RED => Some(SignalColor::Red),
                AMBER => Some(SignalColor::Amber),
                GREEN => Some(SignalColor::Green),
                RED_AMBER => Some(SignalColor::RedAmber),
                AMBER_FLASHING => Some(SignalColor::AmberFlashing),
                GREEN_FLASHING => Some(SignalColor::GreenFlashing),
                _ => None,
            }
        }

        pub fn value(&self) -> Color {
            match self {
                SignalColor::Dark => DARK,
                SignalColor::Red => RED,
                SignalColor::Amber => AMBER,
                SignalColor::Green => GREEN,
                SignalColor::RedAmber => RED_AMBER,
                SignalColor::AmberFlashing => AMBER_FLASHING,
                SignalColor::GreenFlashing => GREEN_FLASHING,
            }
        }

        /// Whether this color takes part in the transition automaton.
        pub fn is_tracked(&self) -> bool {
            matches!(
                self,
                SignalColor::Red | SignalColor::Amber | SignalColor::Green | SignalColor::RedAmber
            )
        }

        /// Colors that can never directly follow this one.
        pub fn forbidden_successors(&self) -> &'static [SignalColor] {
            match self {
                SignalColor::Red => &[SignalColor::Amber],
                SignalColor::Amber => &[SignalColor::Green, SignalColor::RedAmber],
                SignalColor::Green => &[SignalColor::RedAmber],
                SignalColor::RedAmber => &[SignalColor::Red, SignalColor::Amber],
                _ => &[],
            }
        }

        /// Longest legitimate run of this color, if bounded.
        pub fn max_run(&self) -> Option<RunLength> {
            match self {
                SignalColor::Amber => Some(6),
                SignalColor::RedAmber => Some(2),
                _ => None,
            }
        }
    }

    pub fn is_green(value: Color) -> bool {
        value == GREEN
    }

    /// Immutable lookup tables for forbidden successors and maximum run lengths.
    #[derive(Debug, Clone)]
    pub struct TransitionRules {
        /// `forbidden[from]` lists every color that may not directly follow `from`.
        forbidden: [Vec<Color>; 7],
        /// `max_run[color]` is the longest legitimate run of `color`, if bounded.
        max_run: [Option<RunLength>; 7],
    }

    impl TransitionRules {
        /// The rule set of a standard signal head:
        /// red -> amber, amber -> green, amber -> red-amber, green -> red-amber,
        /// red-amber -> red and red-amber -> amber are impossible; amber lasts
        /// at most 6 s and red-amber at most 2 s.
        /// Only tracked colors get entries, so dark and the flashing states
        /// never take part in a forbidden pair.
        pub fn standard() -> Self {
            let mut forbidden: [Vec<Color>; 7] = Default::default();
            let mut max_run = [None; 7];
            for color in SignalColor::ALL.into_iter().filter(SignalColor::is_tracked) {
                let idx = color.value() as usize;
                forbidden[idx] = color
                    .forbidden_successors()
                    .iter()
                    .map(SignalColor::value)
                    .collect();
                max_run[idx] = color.max_run();
            }

            Self { forbidden, max_run }
        }

        pub fn is_forbidden(&self, from: Color, to: Color) -> bool {
            self.forbidden
                .get(from as usize)
                .is_some_and(|successors| successors.contains(&to))
        }

        pub fn max_run(&self, color: Color) -> Option<RunLength> {
            self.max_run.get(color as usize).copied().flatten()
        }
    }

    impl Default for TransitionRules {
        fn default() -> Self {
            Self::standard()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::signal_color::*;

    #[test]
    fn standard_rules_forbid_known_transitions() {
        let rules = TransitionRules::standard();
        assert!(rules.is_forbidden(RED, AMBER));
        assert!(rules.is_forbidden(AMBER, GREEN));
        assert!(rules.is_forbidden(AMBER, RED_AMBER));
        assert!(rules.is_forbidden(GREEN, RED_AMBER));
        assert!(rules.is_forbidden(RED_AMBER, RED));
        assert!(rules.is_forbidden(RED_AMBER, AMBER));

        assert!(!rules.is_forbidden(RED, RED_AMBER));
        assert!(!rules.is_forbidden(GREEN, AMBER));
        assert!(!rules.is_forbidden(AMBER_FLASHING, RED_AMBER));
        assert!(!rules.is_forbidden(42, RED));
    }

    #[test]
    fn standard_rules_bound_amber_and_red_amber() {
        let rules = TransitionRules::standard();
        assert_eq!(rules.max_run(AMBER), Some(6));
        assert_eq!(rules.max_run(RED_AMBER), Some(2));
        assert_eq!(rules.max_run(GREEN), None);
        assert_eq!(rules.max_run(99), None);
    }

    #[test]
    fn only_four_colors_are_tracked() {
        let tracked: Vec<Color> = (0..=6)
            .filter_map(SignalColor::from_value)
            .filter(|c| c.is_tracked())
            .map(|c| c.value())
            .collect();
        assert_eq!(tracked, vec![RED, AMBER, GREEN, RED_AMBER]);
        assert_eq!(SignalColor::from_value(7), None);
    }

    #[test]
    fn untracked_colors_have_no_rules() {
        let rules = TransitionRules::standard();
        for from in [DARK, AMBER_FLASHING, GREEN_FLASHING] {
            for to in 0..=6 {
                assert!(!rules.is_forbidden(from, to));
                assert!(!rules.is_forbidden(to, from));
            }
            assert_eq!(rules.max_run(from), None);
        }
    }
}
