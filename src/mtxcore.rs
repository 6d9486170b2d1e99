//! Fixed-dimension dense vector/matrix kernel.
//!
//! Every routine writes into a caller-supplied destination and keeps no
//! state of its own. Shapes are const generics, so most dimension mismatches
//! are compile errors; the remaining preconditions (non-singular input to
//! [`invert`], positive pivots in the Cholesky routines) are only checked by
//! debug assertions. Results on violated preconditions are unspecified.
//!
//! The tracker only instantiates 3- and 5-dimensional shapes.

use nalgebra::{Cholesky, SMatrix, SVector};

/// Column vector of `N` doubles
pub type Vector<const N: usize> = SVector<f64, N>;

/// `R`×`C` matrix of doubles
pub type Matrix<const R: usize, const C: usize> = SMatrix<f64, R, C>;

/// Set every element of `dst` to `value`
pub fn set<const R: usize, const C: usize>(dst: &mut Matrix<R, C>, value: f64) {
    dst.fill(value);
}

/// `dst = scale * I`
pub fn eye<const N: usize>(dst: &mut Matrix<N, N>, scale: f64) {
    dst.fill(0.0);
    dst.fill_diagonal(scale);
}

/// `dst = a + b`
pub fn add<const R: usize, const C: usize>(dst: &mut Matrix<R, C>, a: &Matrix<R, C>, b: &Matrix<R, C>) {
    for ((d, a), b) in dst.iter_mut().zip(a.iter()).zip(b.iter()) {
        *d = a + b;
    }
}

/// `dst = a - b`
pub fn sub<const R: usize, const C: usize>(dst: &mut Matrix<R, C>, a: &Matrix<R, C>, b: &Matrix<R, C>) {
    for ((d, a), b) in dst.iter_mut().zip(a.iter()).zip(b.iter()) {
        *d = a - b;
    }
}

/// `dst *= factor`
pub fn scale<const R: usize, const C: usize>(dst: &mut Matrix<R, C>, factor: f64) {
    for d in dst.iter_mut() {
        *d *= factor;
    }
}

/// `dst += factor * a`
pub fn add_scale<const R: usize, const C: usize>(dst: &mut Matrix<R, C>, a: &Matrix<R, C>, factor: f64) {
    for (d, a) in dst.iter_mut().zip(a.iter()) {
        *d += factor * a;
    }
}

/// `dst = alpha * a + beta * b`
pub fn lincomb<const R: usize, const C: usize>(
    dst: &mut Matrix<R, C>,
    alpha: f64,
    a: &Matrix<R, C>,
    beta: f64,
    b: &Matrix<R, C>,
) {
    for ((d, a), b) in dst.iter_mut().zip(a.iter()).zip(b.iter()) {
        *d = alpha * a + beta * b;
    }
}

/// `dst = a * b` for (M×N)·(N×P)
pub fn multiply<const M: usize, const N: usize, const P: usize>(
    dst: &mut Matrix<M, P>,
    a: &Matrix<M, N>,
    b: &Matrix<N, P>,
) {
    a.mul_to(b, dst);
}

/// `dst = aᵗ * b` without materializing `aᵗ`
pub fn multiply_tn<const M: usize, const N: usize, const P: usize>(
    dst: &mut Matrix<M, P>,
    a: &Matrix<N, M>,
    b: &Matrix<N, P>,
) {
    a.tr_mul_to(b, dst);
}

/// `dst = a * bᵗ` without materializing `bᵗ`
pub fn multiply_nt<const M: usize, const N: usize, const P: usize>(
    dst: &mut Matrix<M, P>,
    a: &Matrix<M, N>,
    b: &Matrix<P, N>,
) {
    for i in 0..M {
        for j in 0..P {
            let mut acc = 0.0;
            for k in 0..N {
                acc += a[(i, k)] * b[(j, k)];
            }
            dst[(i, j)] = acc;
        }
    }
}

/// `dst = aᵗ * bᵗ` without materializing either transpose
pub fn multiply_tt<const M: usize, const N: usize, const P: usize>(
    dst: &mut Matrix<M, P>,
    a: &Matrix<N, M>,
    b: &Matrix<P, N>,
) {
    for i in 0..M {
        for j in 0..P {
            let mut acc = 0.0;
            for k in 0..N {
                acc += a[(k, i)] * b[(j, k)];
            }
            dst[(i, j)] = acc;
        }
    }
}

/// `dst = aᵗ`
pub fn transpose<const R: usize, const C: usize>(dst: &mut Matrix<C, R>, a: &Matrix<R, C>) {
    a.transpose_to(dst);
}

/// Replace `a` with `(a + aᵗ) / 2`, removing rounding asymmetry
pub fn symmetrize<const N: usize>(a: &mut Matrix<N, N>) {
    for i in 0..N {
        for j in (i + 1)..N {
            let mean = 0.5 * (a[(i, j)] + a[(j, i)]);
            a[(i, j)] = mean;
            a[(j, i)] = mean;
        }
    }
}

/// `dst = a⁻¹`; the result is unspecified when `a` is singular
pub fn invert<const N: usize>(dst: &mut Matrix<N, N>, a: &Matrix<N, N>) {
    dst.copy_from(a);
    let invertible = dst.try_inverse_mut();
    debug_assert!(invertible, "invert called on a singular matrix");
}

/// Euclidean norm of `v`
pub fn norm<const N: usize>(v: &Vector<N>) -> f64 {
    v.norm()
}

/// Inner product `aᵗ b`
pub fn dot<const N: usize>(a: &Vector<N>, b: &Vector<N>) -> f64 {
    a.dot(b)
}

/// Euclidean distance between `a` and `b`
pub fn distance<const N: usize>(a: &Vector<N>, b: &Vector<N>) -> f64 {
    a.metric_distance(b)
}

/// `vᵗ m v`
pub fn quadratic_form<const N: usize>(v: &Vector<N>, m: &Matrix<N, N>) -> f64 {
    let mut mv = Vector::<N>::zeros();
    multiply(&mut mv, m, v);
    dot(v, &mv)
}

/// Copy the diagonal of `a` into `dst`
pub fn diagonal<const N: usize>(dst: &mut Vector<N>, a: &Matrix<N, N>) {
    for i in 0..N {
        dst[i] = a[(i, i)];
    }
}

/// `dst = diag(v)`
pub fn from_diagonal<const N: usize>(dst: &mut Matrix<N, N>, v: &Vector<N>) {
    dst.fill(0.0);
    for i in 0..N {
        dst[(i, i)] = v[i];
    }
}

/// Lower Cholesky factor `L` with `a = L Lᵗ`; returns `false` if `a` is not SPD
pub fn cholesky<const N: usize>(dst: &mut Matrix<N, N>, a: &Matrix<N, N>) -> bool {
    match Cholesky::new(*a) {
        Some(chol) => {
            dst.copy_from(&chol.l());
            true
        }
        None => false,
    }
}

/// Rank-one update of a lower Cholesky factor: `L Lᵗ ← L Lᵗ + x xᵗ`
pub fn cholesky_update<const N: usize>(l: &mut Matrix<N, N>, x: &Vector<N>) {
    let mut x = *x;
    for k in 0..N {
        let lkk = l[(k, k)];
        debug_assert!(lkk > 0.0, "Cholesky factor has a non-positive pivot");
        let r = lkk.hypot(x[k]);
        let c = r / lkk;
        let s = x[k] / lkk;
        l[(k, k)] = r;
        for i in (k + 1)..N {
            l[(i, k)] = (l[(i, k)] + s * x[i]) / c;
            x[i] = c * x[i] - s * l[(i, k)];
        }
    }
}

/// Rank-one downdate of a lower Cholesky factor: `L Lᵗ ← L Lᵗ − x xᵗ`
///
/// The downdated matrix must remain positive definite.
pub fn cholesky_downdate<const N: usize>(l: &mut Matrix<N, N>, x: &Vector<N>) {
    let mut x = *x;
    for k in 0..N {
        let lkk = l[(k, k)];
        let r2 = lkk * lkk - x[k] * x[k];
        debug_assert!(r2 > 0.0, "Cholesky downdate lost positive definiteness");
        let r = r2.sqrt();
        let c = r / lkk;
        let s = x[k] / lkk;
        l[(k, k)] = r;
        for i in (k + 1)..N {
            l[(i, k)] = (l[(i, k)] - s * x[i]) / c;
            x[i] = c * x[i] - s * l[(i, k)];
        }
    }
}

/// Forward substitution: solve `L dst = b` for lower-triangular `L`
pub fn solve_lower<const N: usize>(dst: &mut Vector<N>, l: &Matrix<N, N>, b: &Vector<N>) {
    for i in 0..N {
        let mut acc = b[i];
        for j in 0..i {
            acc -= l[(i, j)] * dst[j];
        }
        dst[i] = acc / l[(i, i)];
    }
}

/// Back substitution: solve `Lᵗ dst = b` for lower-triangular `L`
pub fn solve_lower_transposed<const N: usize>(dst: &mut Vector<N>, l: &Matrix<N, N>, b: &Vector<N>) {
    for i in (0..N).rev() {
        let mut acc = b[i];
        for j in (i + 1)..N {
            acc -= l[(j, i)] * dst[j];
        }
        dst[i] = acc / l[(i, i)];
    }
}

/// Solve `L Lᵗ dst = b` given the lower Cholesky factor `L`
pub fn cholesky_solve<const N: usize>(dst: &mut Vector<N>, l: &Matrix<N, N>, b: &Vector<N>) {
    let mut y = Vector::<N>::zeros();
    solve_lower(&mut y, l, b);
    solve_lower_transposed(dst, l, &y);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spd5() -> Matrix<5, 5> {
        let a = Matrix::<5, 5>::from_row_slice(&[
            2.0, 0.1, -0.3, 0.0, 0.5, //
            0.4, 1.5, 0.2, -0.1, 0.0, //
            0.0, -0.2, 3.0, 0.3, 0.1, //
            0.3, 0.0, 0.1, 1.2, -0.4, //
            -0.1, 0.2, 0.0, 0.6, 2.5,
        ]);
        a * a.transpose() + Matrix::<5, 5>::identity()
    }

    fn assert_close<const R: usize, const C: usize>(a: &Matrix<R, C>, b: &Matrix<R, C>, tol: f64) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() <= tol * (1.0 + y.abs()), "{x} != {y}\n{a}\n{b}");
        }
    }

    #[test]
    fn test_elementwise_ops() {
        let a = Matrix::<2, 3>::from_row_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Matrix::<2, 3>::from_row_slice(&[6.0, 5.0, 4.0, 3.0, 2.0, 1.0]);
        let mut dst = Matrix::<2, 3>::zeros();

        add(&mut dst, &a, &b);
        assert!(dst.iter().all(|&v| v == 7.0));

        sub(&mut dst, &a, &b);
        assert_eq!(dst[(0, 0)], -5.0);
        assert_eq!(dst[(1, 2)], 5.0);

        scale(&mut dst, 2.0);
        assert_eq!(dst[(1, 2)], 10.0);

        add_scale(&mut dst, &a, 0.5);
        assert_eq!(dst[(1, 2)], 13.0);

        lincomb(&mut dst, 2.0, &a, -1.0, &b);
        assert_eq!(dst[(0, 0)], -4.0);
        assert_eq!(dst[(1, 2)], 11.0);

        set(&mut dst, 3.5);
        assert!(dst.iter().all(|&v| v == 3.5));
    }

    #[test]
    fn test_eye() {
        let mut m = Matrix::<3, 3>::from_element(9.0);
        eye(&mut m, 4.0);
        assert_eq!(m, Matrix::<3, 3>::identity() * 4.0);
    }

    #[test]
    fn test_multiply_transpose_variants() {
        let a = Matrix::<3, 5>::from_fn(|i, j| (i as f64) - 0.5 * (j as f64) + 1.0);
        let b = Matrix::<5, 3>::from_fn(|i, j| (i * j) as f64 * 0.25 - 1.0);

        let mut ab = Matrix::<3, 3>::zeros();
        multiply(&mut ab, &a, &b);
        assert_close(&ab, &(a * b), 1e-12);

        let at = a.transpose();
        let bt = b.transpose();

        let mut tn = Matrix::<3, 3>::zeros();
        multiply_tn(&mut tn, &at, &b);
        assert_close(&tn, &(a * b), 1e-12);

        let mut nt = Matrix::<3, 3>::zeros();
        multiply_nt(&mut nt, &a, &bt);
        assert_close(&nt, &(a * b), 1e-12);

        let mut tt = Matrix::<3, 3>::zeros();
        multiply_tt(&mut tt, &at, &bt);
        assert_close(&tt, &(a * b), 1e-12);
    }

    #[test]
    fn test_transpose_and_symmetrize() {
        let a = Matrix::<2, 3>::from_row_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut t = Matrix::<3, 2>::zeros();
        transpose(&mut t, &a);
        assert_eq!(t[(2, 1)], 6.0);

        let mut m = Matrix::<2, 2>::from_row_slice(&[1.0, 2.0, 4.0, 3.0]);
        symmetrize(&mut m);
        assert_eq!(m[(0, 1)], 3.0);
        assert_eq!(m[(1, 0)], 3.0);
    }

    #[test]
    fn test_invert() {
        let a = spd5();
        let mut inv = Matrix::<5, 5>::zeros();
        invert(&mut inv, &a);
        assert_close(&(a * inv), &Matrix::<5, 5>::identity(), 1e-10);
    }

    #[test]
    fn test_norm_dot_distance() {
        let a = Vector::<3>::new(3.0, 4.0, 0.0);
        let b = Vector::<3>::new(0.0, 4.0, 0.0);
        assert_eq!(norm(&a), 5.0);
        assert_eq!(dot(&a, &b), 16.0);
        assert_eq!(distance(&a, &b), 3.0);

        let m = Matrix::<3, 3>::from_diagonal(&Vector::<3>::new(1.0, 2.0, 3.0));
        assert_eq!(quadratic_form(&a, &m), 9.0 + 32.0);
    }

    #[test]
    fn test_diagonal_helpers() {
        let v = Vector::<3>::new(1.0, 2.0, 3.0);
        let mut m = Matrix::<3, 3>::from_element(7.0);
        from_diagonal(&mut m, &v);
        assert_eq!(m[(0, 1)], 0.0);
        let mut d = Vector::<3>::zeros();
        diagonal(&mut d, &m);
        assert_eq!(d, v);
    }

    #[test]
    fn test_from_diagonal_five() {
        let v = Vector::<5>::new(1.0, -2.0, 3.0, 0.5, 9.0);
        let mut m = Matrix::<5, 5>::from_element(7.0);
        from_diagonal(&mut m, &v);
        for i in 0..5 {
            for j in 0..5 {
                assert_eq!(m[(i, j)], if i == j { v[i] } else { 0.0 });
            }
        }
    }

    #[test]
    fn test_cholesky_rank_one_update_and_downdate() {
        let a = spd5();
        let x = Vector::<5>::new(0.5, -1.0, 0.25, 2.0, -0.75);

        let mut l = Matrix::<5, 5>::zeros();
        assert!(cholesky(&mut l, &a));

        cholesky_update(&mut l, &x);
        let updated = a + x * x.transpose();
        assert_close(&(l * l.transpose()), &updated, 1e-10);

        cholesky_downdate(&mut l, &x);
        assert_close(&(l * l.transpose()), &a, 1e-10);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = Matrix::<3, 3>::from_diagonal(&Vector::<3>::new(1.0, -1.0, 1.0));
        let mut l = Matrix::<3, 3>::zeros();
        assert!(!cholesky(&mut l, &a));
    }

    #[test]
    fn test_triangular_solves() {
        let a = spd5();
        let b = Vector::<5>::new(1.0, 2.0, 3.0, 4.0, 5.0);

        let mut l = Matrix::<5, 5>::zeros();
        assert!(cholesky(&mut l, &a));

        let mut y = Vector::<5>::zeros();
        solve_lower(&mut y, &l, &b);
        assert_close(&(l * y), &b, 1e-12);

        let mut z = Vector::<5>::zeros();
        solve_lower_transposed(&mut z, &l, &b);
        assert_close(&(l.transpose() * z), &b, 1e-12);

        let mut x = Vector::<5>::zeros();
        cholesky_solve(&mut x, &l, &b);
        assert_close(&(a * x), &b, 1e-10);
    }
}
