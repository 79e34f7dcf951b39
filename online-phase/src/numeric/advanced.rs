//! Operations derived from the numeric vocabulary
//!
//! Operations with more than one dependent step wrap their steps in a
//! sequential sub-computation, so they may be appended to a parallel builder
//! alongside independent work

use itertools::Itertools;

use crate::{
    algebra::{Modulus, Scalar, ScalarShare},
    error::MpcError,
    fabric::{AuthenticatedScalarResult, ResultHandle},
};

use super::{check_public, Compose, Numeric, Truncation};

/// Fail unless the computation runs over a prime field
fn require_field(modulus: &Modulus, op: &str) -> Result<(), MpcError> {
    if !modulus.is_field() {
        return Err(MpcError::ConfigurationError(format!(
            "{op} requires a prime field, the computation runs over {modulus}"
        )));
    }

    Ok(())
}

/// Sum a batch of shared values locally
pub fn sum<B: Numeric + Compose>(
    b: &mut B,
    values: &[AuthenticatedScalarResult],
) -> AuthenticatedScalarResult {
    let values = values.to_vec();
    b.gate(move |ctx| {
        Ok(values.iter().fold(ScalarShare::zero(ctx.modulus), |acc, v| acc + v.get()))
    })
}

/// Multiply a batch of shared values
///
/// The products are computed as a balanced tree, so `n` values take
/// `ceil(log2(n))` multiplication rounds
pub fn product<B: Numeric + Compose>(
    b: &mut B,
    values: &[AuthenticatedScalarResult],
) -> AuthenticatedScalarResult {
    match values {
        [] => {
            let one = Scalar::one(&b.modulus());
            b.known(one)
        },
        [single] => single.clone(),
        _ => {
            let values = values.to_vec();
            b.seq(move |b| product_tree(b, values))
        },
    }
}

/// Multiply adjacent pairs in one parallel layer, then recurse on the layer
fn product_tree<B: Numeric + Compose>(
    b: &mut B,
    values: Vec<AuthenticatedScalarResult>,
) -> AuthenticatedScalarResult {
    let layer = b.par(move |b| {
        values
            .chunks(2)
            .map(|chunk| match chunk {
                [left, right] => b.mult(left, right),
                _ => chunk[0].clone(),
            })
            .collect_vec()
    });

    b.seq(move |b| {
        let layer = layer.get().into_iter().map(ResultHandle::ready).collect_vec();
        match layer.as_slice() {
            [single] => single.clone(),
            _ => product_tree(b, layer),
        }
    })
}

/// The inner product of two batches of shared values
///
/// Panics if the batches differ in length
pub fn inner_product<B: Numeric + Compose>(
    b: &mut B,
    x: &[AuthenticatedScalarResult],
    y: &[AuthenticatedScalarResult],
) -> AuthenticatedScalarResult {
    assert_eq!(x.len(), y.len(), "inner product of batches of unequal length");
    let (x, y) = (x.to_vec(), y.to_vec());

    b.seq(move |b| {
        let products =
            b.par(move |b| x.iter().zip(y.iter()).map(|(x, y)| b.mult(x, y)).collect_vec());
        b.gate(move |ctx| {
            Ok(products.get().into_iter().fold(ScalarShare::zero(ctx.modulus), |acc, p| acc + p))
        })
    })
}

/// The inner product of a batch of shared values with public coefficients,
/// computed locally
///
/// Panics if the batches differ in length
pub fn inner_product_public<B: Numeric + Compose>(
    b: &mut B,
    x: &[AuthenticatedScalarResult],
    coeffs: &[Scalar],
) -> AuthenticatedScalarResult {
    assert_eq!(x.len(), coeffs.len(), "inner product of batches of unequal length");
    let (x, coeffs) = (x.to_vec(), coeffs.to_vec());

    b.gate(move |ctx| {
        let mut acc = ScalarShare::zero(ctx.modulus);
        for (x, c) in x.iter().zip(coeffs.iter()) {
            check_public(c, ctx.modulus)?;
            acc = acc + x.get() * c;
        }

        Ok(acc)
    })
}

/// Square a shared value
pub fn square<B: Numeric>(b: &mut B, x: &AuthenticatedScalarResult) -> AuthenticatedScalarResult {
    b.mult(x, x)
}

/// Raise a shared value to a public power by square and multiply
pub fn pow<B: Numeric + Compose>(
    b: &mut B,
    x: &AuthenticatedScalarResult,
    exp: u64,
) -> AuthenticatedScalarResult {
    if exp == 0 {
        let one = Scalar::one(&b.modulus());
        return b.known(one);
    }

    let x = x.clone();
    b.seq(move |b| {
        let top_bit = 63 - exp.leading_zeros();
        let mut acc = x.clone();
        for bit in (0..top_bit).rev() {
            acc = square(b, &acc);
            if (exp >> bit) & 1 == 1 {
                acc = b.mult(&acc, &x);
            }
        }

        acc
    })
}

/// Invert a shared field element
///
/// Opens `x * r` for a random `r` and multiplies `r` by the public inverse.
/// Fails with an arithmetic error if `x` is zero, and with a configuration
/// error outside of prime fields
pub fn invert<B: Numeric + Compose>(
    b: &mut B,
    x: &AuthenticatedScalarResult,
) -> AuthenticatedScalarResult {
    let x = x.clone();
    b.seq(move |b| {
        b.gate(|ctx| require_field(ctx.modulus, "inversion"));

        let r = b.random_element();
        let masked = b.mult(&x, &r);
        let opened = b.open(&masked);
        let inverse = b.gate(move |_| opened.get().inverse());
        b.mult_public(&r, &inverse)
    })
}

/// Divide two shared field elements
pub fn divide<B: Numeric + Compose>(
    b: &mut B,
    x: &AuthenticatedScalarResult,
    y: &AuthenticatedScalarResult,
) -> AuthenticatedScalarResult {
    let (x, y) = (x.clone(), y.clone());
    b.seq(move |b| {
        let y_inv = invert(b, &y);
        b.mult(&x, &y_inv)
    })
}

/// Divide a shared value by a public constant
///
/// Fails with an arithmetic error if the constant is not invertible
pub fn divide_public<B: Numeric + Compose>(
    b: &mut B,
    x: &AuthenticatedScalarResult,
    divisor: Scalar,
) -> AuthenticatedScalarResult {
    let x = x.clone();
    b.seq(move |b| {
        let inverse = b.gate(move |_| divisor.inverse());
        b.mult_public(&x, &inverse)
    })
}

/// Select `x` if the shared bit `cond` is one and `y` if it is zero
pub fn select<B: Numeric + Compose>(
    b: &mut B,
    cond: &AuthenticatedScalarResult,
    x: &AuthenticatedScalarResult,
    y: &AuthenticatedScalarResult,
) -> AuthenticatedScalarResult {
    let (cond, x, y) = (cond.clone(), x.clone(), y.clone());
    b.seq(move |b| {
        let diff = b.sub(&x, &y);
        let shifted = b.mult(&cond, &diff);
        b.add(&shifted, &y)
    })
}

/// OR two shared arithmetic bits
///
/// or(a, b) = a + b - ab
pub fn or<B: Numeric + Compose>(
    b: &mut B,
    x: &AuthenticatedScalarResult,
    y: &AuthenticatedScalarResult,
) -> AuthenticatedScalarResult {
    let (x, y) = (x.clone(), y.clone());
    b.seq(move |b| {
        let both = b.mult(&x, &y);
        let either = b.add(&x, &y);
        b.sub(&either, &both)
    })
}

/// Draw `n` independent shared random bits
pub fn random_bits<B: Numeric>(b: &mut B, n: usize) -> Vec<AuthenticatedScalarResult> {
    (0..n).map(|_| b.random_bit()).collect_vec()
}

/// Shift a shared value right by `d` bits
///
/// The value must lie below `2^(l - 2)` for an `l` bit plaintext domain. The
/// parties open `x + r'` for a truncation pair `(r', r)` and subtract `r` from
/// the shifted opening, so the result is `floor(x / 2^d)` or one more than it,
/// depending on the carry out of the low bits
pub fn truncate<B: Numeric + Compose + Truncation>(
    b: &mut B,
    x: &AuthenticatedScalarResult,
    d: u32,
) -> AuthenticatedScalarResult {
    let x = x.clone();
    b.seq(move |b| {
        let pair = b.truncation_pair(d);
        let pair_clone = pair.clone();
        let r_prime = b.gate(move |_| Ok(pair_clone.get().r_prime));
        let r = b.gate(move |_| Ok(pair.get().r));

        let masked = b.add(&x, &r_prime);
        let opened = b.open(&masked);
        let shifted = b.gate(move |_| Ok(opened.get().shr(d)));

        let neg_r = b.negate(&r);
        b.add_public(&neg_r, &shifted)
    })
}
