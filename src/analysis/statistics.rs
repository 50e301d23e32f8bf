use polars::prelude::*;

/// Descriptive statistics of one numeric column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1)
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// count/mean/std/min/quartiles/max over the non-null values; NaN where undefined
pub fn describe(values: &Float64Chunked) -> Summary {
    let quantile = |q: f64| {
        values
            .quantile(q, QuantileInterpolOptions::Linear)
            .ok()
            .flatten()
            .unwrap_or(f64::NAN)
    };

    Summary {
        count: values.len() - values.null_count(),
        mean: values.mean().unwrap_or(f64::NAN),
        std: values.std(1).unwrap_or(f64::NAN),
        min: values.min().unwrap_or(f64::NAN),
        q25: quantile(0.25),
        median: quantile(0.5),
        q75: quantile(0.75),
        max: values.max().unwrap_or(f64::NAN),
    }
}

/// Pearson correlation over rows where both sides are present.
/// `None` with fewer than two pairs or zero variance on either side.
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    use statrs::statistics::Statistics;

    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter_map(|pair| match pair {
            (Some(a), Some(b)) if !a.is_nan() && !b.is_nan() => Some((*a, *b)),
            _ => None,
        })
        .unzip();

    if xs.len() < 2 {
        return None;
    }

    let sx = xs.iter().std_dev();
    let sy = ys.iter().std_dev();
    if sx == 0.0 || sy == 0.0 {
        return None;
    }

    let r = xs.iter().covariance(ys.iter()) / (sx * sy);
    // Clamp to [-1, 1] against floating point drift
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|&v| Some(v)).collect()
    }

    #[test]
    fn test_perfect_correlation() {
        let r = pearson(&col(&[10.0, 20.0, 30.0]), &col(&[5.0, 15.0, 25.0])).unwrap();
        assert_eq!(round_to(r, 4), 1.0);
        let r = pearson(&col(&[1.0, 2.0, 3.0]), &col(&[3.0, 2.0, 1.0])).unwrap();
        assert_eq!(round_to(r, 4), -1.0);
    }

    #[test]
    fn test_pearson_skips_missing_pairs() {
        let x = vec![Some(1.0), None, Some(2.0), Some(3.0), Some(f64::NAN)];
        let y = vec![Some(2.0), Some(100.0), Some(4.0), Some(6.0), Some(1.0)];
        assert_eq!(round_to(pearson(&x, &y).unwrap(), 4), 1.0);
    }

    #[test]
    fn test_pearson_undefined_cases() {
        assert_eq!(pearson(&col(&[1.0]), &col(&[2.0])), None);
        assert_eq!(pearson(&col(&[1.0, 1.0, 1.0]), &col(&[1.0, 2.0, 3.0])), None);
        assert_eq!(pearson(&[], &[]), None);
    }

    #[test]
    fn test_describe() {
        let s = describe(&Float64Chunked::new("x", &[Some(4.0), Some(1.0), None, Some(3.0), Some(2.0)]));
        assert_eq!(s.count, 4);
        assert_eq!(s.mean, 2.5);
        assert!((s.std - 1.2909944).abs() < 1e-6);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.q25, 1.75);
        assert_eq!(s.median, 2.5);
        assert_eq!(s.q75, 3.25);
        assert_eq!(s.max, 4.0);
    }

    #[test]
    fn test_describe_degenerate() {
        let empty = describe(&Float64Chunked::new("x", &[None::<f64>, None]));
        assert_eq!(empty.count, 0);
        assert!(empty.mean.is_nan() && empty.min.is_nan() && empty.median.is_nan());

        let single = describe(&Float64Chunked::new("x", &[7.0]));
        assert_eq!(single.mean, 7.0);
        assert!(single.std.is_nan());
        assert_eq!(single.q75, 7.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(33.333333, 2), 33.33);
    }
}
