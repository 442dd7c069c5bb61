//! Dense Decimal vector/matrix helpers shared by the solvers and the optimizer.

use rust_decimal::Decimal;

/// Dot product, `None` on overflow.
pub fn vec_dot(a: &[Decimal], b: &[Decimal]) -> Option<Decimal> {
    a.iter()
        .zip(b.iter())
        .try_fold(Decimal::ZERO, |acc, (x, y)| acc.checked_add(x.checked_mul(*y)?))
}

/// Matrix-vector multiplication, `None` on overflow.
pub fn mat_vec_multiply(mat: &[Vec<Decimal>], v: &[Decimal]) -> Option<Vec<Decimal>> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

/// Quadratic form `v' * M * v`, `None` on overflow.
pub fn quad_form(mat: &[Vec<Decimal>], v: &[Decimal]) -> Option<Decimal> {
    vec_dot(v, &mat_vec_multiply(mat, v)?)
}

/// Largest absolute entry of a vector (zero when empty).
pub fn max_abs(v: &[Decimal]) -> Decimal {
    v.iter().map(|x| x.abs()).max().unwrap_or(Decimal::ZERO)
}

/// Solve `A x = b` by Gauss-Jordan elimination with partial pivoting.
///
/// Returns `None` when a pivot falls below `1e-20` of the largest entry of
/// `A` (numerically singular) or when an intermediate value overflows.
#[allow(clippy::needless_range_loop)]
pub fn solve_linear_system(a: &[Vec<Decimal>], b: &[Decimal]) -> Option<Vec<Decimal>> {
    let n = a.len();
    if b.len() != n || a.iter().any(|row| row.len() != n) {
        return None;
    }
    if n == 0 {
        return Some(Vec::new());
    }

    let scale = a.iter().map(|row| max_abs(row)).max().unwrap_or(Decimal::ZERO);
    if scale.is_zero() {
        return None;
    }
    let pivot_floor = scale * Decimal::new(1, 20);

    let mut aug: Vec<Vec<Decimal>> = a
        .iter()
        .zip(b.iter())
        .map(|(row, rhs)| {
            let mut r = row.clone();
            r.push(*rhs);
            r
        })
        .collect();

    for col in 0..n {
        // Partial pivoting
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val <= pivot_floor {
            return None;
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        // Scale pivot row
        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell = cell.checked_div(pivot)?;
        }

        // Eliminate other rows
        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor.is_zero() {
                continue;
            }
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell = cell.checked_sub(factor.checked_mul(pv)?)?;
            }
        }
    }

    Some(aug.into_iter().map(|row| row[n]).collect())
}
