//! Least-squares fitting for the smoother kernel and its polynomial edges

/// Solve `m · x = rhs` by Gaussian elimination with partial pivoting.
///
/// Returns `None` when the system is singular.
pub(crate) fn solve(mut m: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Option<Vec<f64>> {
    let n = rhs.len();
    debug_assert!(m.len() == n && m.iter().all(|row| row.len() == n));

    for col in 0..n {
        let pivot = (col..n).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < 1e-14 {
            return None;
        }
        m.swap(col, pivot);
        rhs.swap(col, pivot);

        for row in col + 1..n {
            let factor = m[row][col] / m[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| m[row][k] * x[k]).sum();
        x[row] = (rhs[row] - tail) / m[row][row];
    }
    Some(x)
}

/// Least-squares polynomial fit of `ys` sampled at `xs`, lowest power first
pub(crate) fn polyfit(xs: &[f64], ys: &[f64], degree: usize) -> Option<Vec<f64>> {
    let terms = degree + 1;
    let mut normal = vec![vec![0.0; terms]; terms];
    let mut rhs = vec![0.0; terms];

    for (&x, &y) in xs.iter().zip(ys) {
        let powers: Vec<f64> = (0..terms).map(|p| x.powi(p as i32)).collect();
        for i in 0..terms {
            rhs[i] += powers[i] * y;
            for j in 0..terms {
                normal[i][j] += powers[i] * powers[j];
            }
        }
    }

    solve(normal, rhs)
}

/// Evaluate a polynomial given lowest power first
pub(crate) fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_3x3() {
        let m = vec![
            vec![2.0, 1.0, -1.0],
            vec![-3.0, -1.0, 2.0],
            vec![-2.0, 1.0, 2.0],
        ];
        let x = solve(m, vec![8.0, -11.0, -3.0]).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);
        assert!((x[2] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_singular() {
        let m = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(solve(m, vec![1.0, 2.0]).is_none());
    }

    #[test]
    fn test_polyfit_recovers_quadratic() {
        let xs: Vec<f64> = (-4..=4).map(|x| x as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 1.5 - 2.0 * x + 0.25 * x * x).collect();
        let coeffs = polyfit(&xs, &ys, 2).unwrap();

        assert!((coeffs[0] - 1.5).abs() < 1e-10);
        assert!((coeffs[1] + 2.0).abs() < 1e-10);
        assert!((coeffs[2] - 0.25).abs() < 1e-10);
        assert!((polyval(&coeffs, 10.0) - (1.5 - 20.0 + 25.0)).abs() < 1e-8);
    }
}
