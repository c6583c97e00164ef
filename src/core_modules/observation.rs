// THEORY:
// The `observation` module is the lowest layer of the engine. An `Observation`
// is a single timestamped value reported by a signal head, and the
// `ObservationBuffer` collects them for one entity during one cell.
//
// Key architectural principles:
// 1.  **Dumb Data Container**: The buffer does not interpret values. It appends
//     what it is given and hands out time-sorted views on demand. Sorting is
//     stable, so observations sharing a timestamp keep their insertion order.
// 2.  **Two Streams**: Each entity reports a color stream (the primary or the
//     secondary signal head) and a `cycle_second` stream of boundary markers.
//     They are kept apart because the reconstructor treats them very
//     differently: markers are authoritative, colors are sparse change events.
// 3.  **Short Lifetime**: Observations live for exactly one cell. Once cycles
//     are computed for that cell the buffer is cleared.

pub mod observation {
    use serde::{Deserialize, Serialize};
    use std::fmt;

    /// The largest value a single observation may carry.
    pub const MAX_OBSERVATION_VALUE: i16 = 127;

    /// The datastream an observation belongs to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum SignalKind {
        /// Color state of the primary signal head.
        PrimarySignal,
        /// Color state of the secondary signal head.
        SecondarySignal,
        /// Cycle boundary markers. The value is ignored.
        CycleSecond,
    }

    impl SignalKind {
        pub fn layer_name(&self) -> &'static str {
            match self {
                SignalKind::PrimarySignal => "primary_signal",
                SignalKind::SecondarySignal => "secondary_signal",
                SignalKind::CycleSecond => "cycle_second",
            }
        }

        pub fn is_color(&self) -> bool {
            !matches!(self, SignalKind::CycleSecond)
        }
    }

    impl fmt::Display for SignalKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.layer_name())
        }
    }

    /// The signal head whose color stream feeds reconstruction. Only color
    /// streams can be selected.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum ColorHead {
        #[default]
        #[serde(rename = "primary_signal")]
        Primary,
        #[serde(rename = "secondary_signal")]
        Secondary,
    }

    impl ColorHead {
        pub fn kind(&self) -> SignalKind {
            match self {
                ColorHead::Primary => SignalKind::PrimarySignal,
                ColorHead::Secondary => SignalKind::SecondarySignal,
            }
        }
    }

    /// A single timestamped value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Observation {
        /// Unix seconds.
        pub timestamp: i32,
        pub value: u8,
    }

    impl Observation {
        pub fn new(timestamp: i32, value: u8) -> Self {
            Self { timestamp, value }
        }
    }

    /// Append-only store of one entity's observations for the current cell.
    #[derive(Debug, Clone, Default)]
    pub struct ObservationBuffer {
        colors: Vec<Observation>,
        cycle_seconds: Vec<Observation>,
    }

    impl ObservationBuffer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Appends an observation to the stream matching `kind`. Both color
        /// kinds land in the same stream; the caller decides which head it
        /// feeds.
        pub fn push(&mut self, kind: SignalKind, observation: Observation) {
            if kind.is_color() {
                self.colors.push(observation);
            } else {
                self.cycle_seconds.push(observation);
            }
        }

        /// Stable-sorts both streams by timestamp.
        pub fn sort(&mut self) {
            self.colors.sort_by_key(|o| o.timestamp);
            self.cycle_seconds.sort_by_key(|o| o.timestamp);
        }

        pub fn colors(&self) -> &[Observation] {
            &self.colors
        }

        pub fn cycle_seconds(&self) -> &[Observation] {
            &self.cycle_seconds
        }

        pub fn is_empty(&self) -> bool {
            self.colors.is_empty() && self.cycle_seconds.is_empty()
        }

        pub fn clear(&mut self) {
            self.colors.clear();
            self.cycle_seconds.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::observation::*;

    #[test]
    fn color_head_maps_to_color_streams_only() {
        assert_eq!(ColorHead::Primary.kind(), SignalKind::PrimarySignal);
        assert_eq!(ColorHead::Secondary.kind(), SignalKind::SecondarySignal);
        assert!(serde_json::from_str::<ColorHead>("\"cycle_second\"").is_err());
        assert_eq!(
            serde_json::from_str::<ColorHead>("\"secondary_signal\"").unwrap(),
            ColorHead::Secondary
        );
    }

    #[test]
    fn push_routes_by_kind() {
        let mut buffer = ObservationBuffer::new();
        buffer.push(SignalKind::PrimarySignal, Observation::new(1698827378, 2));
        buffer.push(SignalKind::PrimarySignal, Observation::new(1696148973, 3));
        buffer.push(SignalKind::CycleSecond, Observation::new(1696494573, 0));

        assert_eq!(buffer.colors().len(), 2);
        assert_eq!(buffer.cycle_seconds().len(), 1);
        // Insertion order is kept until a sort is requested.
        assert_eq!(buffer.colors()[0].timestamp, 1698827378);
    }

    #[test]
    fn sort_is_stable_for_duplicate_timestamps() {
        let mut buffer = ObservationBuffer::new();
        buffer.push(SignalKind::PrimarySignal, Observation::new(20, 3));
        buffer.push(SignalKind::PrimarySignal, Observation::new(10, 1));
        buffer.push(SignalKind::PrimarySignal, Observation::new(10, 4));
        buffer.sort();

        let values: Vec<u8> = buffer.colors().iter().map(|o| o.value).collect();
        assert_eq!(values, vec![1, 4, 3]);
    }

    #[test]
    fn clear_empties_both_streams() {
        let mut buffer = ObservationBuffer::new();
        buffer.push(SignalKind::SecondarySignal, Observation::new(5, 1));
        buffer.push(SignalKind::CycleSecond, Observation::new(5, 0));
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn layer_names_match_datastreams() {
        assert_eq!(SignalKind::PrimarySignal.to_string(), "primary_signal");
        assert_eq!(SignalKind::CycleSecond.layer_name(), "cycle_second");
        assert!(!SignalKind::CycleSecond.is_color());
    }
}
