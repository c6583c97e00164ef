// Small numeric helpers shared by the cleanser and the metrics engine.

use std::cmp::Ordering;

/// Median of `values`: the middle element, or the mean of the two middle
/// elements for an even count. `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Median, or `sentinel` when there is nothing to take the median of.
pub fn median_or(values: &[f64], sentinel: f64) -> f64 {
    median(values).unwrap_or(sentinel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_even_count_averages_middles() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn median_of_single_value() {
        assert_eq!(median(&[5.0]), Some(5.0));
    }

    #[test]
    fn median_of_empty_is_none() {
        assert_eq!(median(&[]), None);
        assert_eq!(median_or(&[], -1.0), -1.0);
    }
}
