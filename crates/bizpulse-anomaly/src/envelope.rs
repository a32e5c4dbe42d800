//! Gaussian envelope: squared Mahalanobis distance from the sample mean.

use nalgebra::{DMatrix, DVector};

use crate::error::AnomalyError;

/// Score each row as the negated squared Mahalanobis distance from the
/// empirical mean, so lower scores are more anomalous.
///
/// # Errors
///
/// Returns [`AnomalyError::Numerical`] if the covariance matrix is singular.
#[allow(clippy::cast_precision_loss)]
pub fn envelope_scores(data: &[Vec<f64>]) -> Result<Vec<f64>, AnomalyError> {
    let n = data.len();
    let width = data.first().map_or(0, Vec::len);
    if n == 0 || width == 0 {
        return Err(AnomalyError::Numerical("empty data".to_string()));
    }

    let x = DMatrix::from_fn(n, width, |r, c| data[r][c]);
    let mean: DVector<f64> = DVector::from_fn(width, |c, _| x.column(c).mean());
    let centered = DMatrix::from_fn(n, width, |r, c| x[(r, c)] - mean[c]);
    let covariance = (centered.transpose() * &centered) / n as f64;

    let precision = covariance
        .try_inverse()
        .ok_or_else(|| AnomalyError::Numerical("covariance matrix is singular".to_string()))?;

    Ok((0..n)
        .map(|r| {
            let d = centered.row(r).transpose();
            let dist = (d.transpose() * &precision * &d)[(0, 0)];
            -dist
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn far_point_has_lowest_score() {
        let mut data: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![f64::from(i % 4), f64::from(i % 3)])
            .collect();
        data.push(vec![10.0, 10.0]);
        let scores = envelope_scores(&data).unwrap();
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        assert!((scores[20] - min).abs() < f64::EPSILON);
    }

    #[test]
    fn constant_column_is_singular() {
        let data: Vec<Vec<f64>> = (0..12).map(|i| vec![f64::from(i), 0.0]).collect();
        let err = envelope_scores(&data).unwrap_err();
        assert!(matches!(err, AnomalyError::Numerical(_)));
    }
}
