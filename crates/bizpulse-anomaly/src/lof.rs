//! Local outlier factor over Euclidean distance.

/// Added to mean reachability distances to keep densities finite on
/// duplicate points.
const DENSITY_EPSILON: f64 = 1e-10;

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Indices and distances of the `k` nearest other rows to row `i`,
/// nearest first with ties by index.
fn nearest(data: &[Vec<f64>], i: usize, k: usize) -> Vec<(usize, f64)> {
    let mut others: Vec<(usize, f64)> = data
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != i)
        .map(|(j, row)| (j, distance(&data[i], row)))
        .collect();
    others.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    others.truncate(k);
    others
}

/// Score each row as its negated local outlier factor, so lower scores are
/// more anomalous. Inliers score close to `-1.0`.
///
/// `k` is clamped to `[1, n - 1]`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn lof_scores(data: &[Vec<f64>], k: usize) -> Vec<f64> {
    let n = data.len();
    if n < 2 {
        return vec![-1.0; n];
    }
    let k = k.clamp(1, n - 1);

    let neighbours: Vec<Vec<(usize, f64)>> = (0..n).map(|i| nearest(data, i, k)).collect();
    let k_distance: Vec<f64> = neighbours
        .iter()
        .map(|nb| nb.last().map_or(0.0, |(_, d)| *d))
        .collect();

    let lrd: Vec<f64> = neighbours
        .iter()
        .map(|nb| {
            let reach: f64 = nb.iter().map(|(j, d)| d.max(k_distance[*j])).sum();
            1.0 / (reach / nb.len() as f64 + DENSITY_EPSILON)
        })
        .collect();

    neighbours
        .iter()
        .enumerate()
        .map(|(i, nb)| {
            let mean_lrd = nb.iter().map(|(j, _)| lrd[*j]).sum::<f64>() / nb.len() as f64;
            -(mean_lrd / lrd[i])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outlier_has_lowest_score_and_inliers_are_near_one() {
        let mut data: Vec<Vec<f64>> = (0..25)
            .map(|i| vec![f64::from(i % 5), f64::from(i / 5)])
            .collect();
        data.push(vec![30.0, 30.0]);
        let scores = lof_scores(&data, 20);

        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        assert!((scores[25] - min).abs() < f64::EPSILON);
        assert!(scores[25] < -2.0);
        assert!(scores[12] > -1.5);
    }

    #[test]
    fn duplicate_points_stay_finite() {
        let data = vec![vec![1.0]; 15];
        let scores = lof_scores(&data, 20);
        assert!(scores.iter().all(|s| s.is_finite()));
    }
}
