//! Equal-frequency binning used to shade choropleth maps.

use statrs::statistics::{Data, OrderStatistics};

/// Bin every value into one of `bins` equal-frequency buckets and return the
/// bucket index divided by `bins`, so the result lies in `[0, (bins - 1) / bins]`.
///
/// Bucket edges are the `k / bins` sample quantiles, linearly interpolated
/// between order statistics at position `(n - 1) * k / bins`; a value's bucket
/// is the number of interior edges strictly below it. Repeated values always share a
/// bucket, and when several edges coincide the value lands in the lowest one.
pub fn quantile_bins(values: &[f64], bins: usize) -> Vec<f64> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }

    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return vec![0.0; values.len()];
    }

    let n = finite.len();
    let mut data = Data::new(finite);
    let edges: Vec<f64> = (1..bins)
        .map(|k| {
            let position = (n - 1) as f64 * k as f64 / bins as f64;
            let lower = position.floor();
            let index = lower as usize;
            let below = data.order_statistic(index + 1);
            let fraction = position - lower;
            if fraction == 0.0 || index + 1 >= n {
                below
            } else {
                below + fraction * (data.order_statistic(index + 2) - below)
            }
        })
        .collect();

    values
        .iter()
        .map(|v| {
            let bucket = edges.iter().filter(|edge| **edge < *v).count();
            bucket as f64 / bins as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quartiles() {
        let bins = quantile_bins(&[4.0, 1.0, 3.0, 2.0], 4);
        assert_eq!(bins, vec![0.75, 0.0, 0.5, 0.25]);
    }

    #[test]
    fn test_percentiles_span_range() {
        let values: Vec<f64> = (1..=200).map(f64::from).collect();
        let bins = quantile_bins(&values, 100);
        assert_eq!(bins[0], 0.0);
        assert_eq!(bins[199], 0.99);
        assert!(bins.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_edges_interpolate_between_order_statistics() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let bins = quantile_bins(&values, 4);
        assert_eq!(
            bins,
            vec![0.0, 0.0, 0.0, 0.25, 0.25, 0.5, 0.5, 0.75, 0.75, 0.75]
        );
    }

    #[test]
    fn test_largest_of_two_reaches_top_bin() {
        assert_eq!(quantile_bins(&[80.0, 20.0], 100), vec![0.99, 0.0]);
    }

    #[test]
    fn test_constant_values_collapse() {
        let bins = quantile_bins(&[7.0, 7.0, 7.0], 100);
        assert_eq!(bins, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_empty() {
        assert!(quantile_bins(&[], 100).is_empty());
        assert!(quantile_bins(&[1.0], 0).is_empty());
    }
}
