use crate::fit::UnscaledCoefficients;

/// Surface normal estimate from the polynomial's stationary point
/// (Malzbender et al. 2001, eqs. 16–17).
///
/// `nw` is `sqrt(1 - nu² + nv²)` exactly as PTM viewers have always computed
/// it. That is not a unit normalization; callers wanting a unit vector must
/// normalize themselves. A zero divisor yields non-finite components.
pub fn surface_normal(c: &UnscaledCoefficients) -> (f32, f32, f32) {
    let divisor = 4.0 * c.cu2 * c.cv2 - c.cuv * c.cuv;
    let nu = (c.cuv * c.cv - 2.0 * c.cv2 * c.cu) / divisor;
    let nv = (c.cuv * c.cu - 2.0 * c.cu2 * c.cv) / divisor;
    let nw = (1.0 - nu * nu + nv * nv).sqrt();
    (nu, nv, nw)
}
