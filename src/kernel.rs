//! Smoothing kernels (SPEC_FULL.md §4.1).
//!
//! Grounded on `include/kernel/cubic_spline.hpp`, `include/kernel/wendland_kernel.hpp`,
//! and `include/kernel/anisotropic_kernel.hpp` of the original C++ source. Per
//! SPEC_FULL.md §9 design notes, the virtual `KernelFunction` hierarchy is
//! replaced with a tagged enum dispatched by `match` rather than a trait
//! object, since the kernel set is small and closed at compile time.

use std::f64::consts::PI;

use glam::DVec3;

use crate::parameters::KernelKind;

/// Dimensionless support radius in units of q = r/h: 2 for the cubic spline
/// (which uses h' = h/2 internally so support ends at r = h), 1 for Wendland
/// and the anisotropic product kernel.
fn support(kind: KernelKind) -> f64 {
    match kind {
        KernelKind::CubicSpline => 2.0,
        KernelKind::Wendland | KernelKind::AnisotropicProduct => 1.0,
    }
}

fn sigma_cubic(d_eff: usize) -> f64 {
    match d_eff {
        1 => 2.0 / 3.0,
        2 => 10.0 / (7.0 * PI),
        _ => 1.0 / PI,
    }
}

fn sigma_wendland(d_eff: usize) -> f64 {
    match d_eff {
        1 => 27.0 / 16.0,
        2 => 9.0 / PI,
        _ => 495.0 / (32.0 * PI),
    }
}

fn powh_dim(h: f64, d_eff: usize) -> f64 {
    match d_eff {
        1 => h,
        2 => h * h,
        _ => h * h * h,
    }
}

/// A smoothing kernel, selected by `Parameters::kernel` and evaluated at a
/// runtime effective dimension (SPEC_FULL.md §9 "Dimension representation").
#[derive(Debug, Clone, Copy)]
pub struct Kernel {
    pub kind: KernelKind,
    /// Effective kernel dimension: DIM, or 2 if `two_and_half_sim` is set.
    pub d_eff: usize,
}

impl Kernel {
    pub fn new(kind: KernelKind, d_eff: usize) -> Self {
        Self { kind, d_eff }
    }

    pub fn support(&self) -> f64 {
        support(self.kind)
    }

    /// W(r, h). `r_ij` is the raw (unnormalized) separation vector `pos_i -
    /// pos_j`; the isotropic kernels use only its length `r`, but the
    /// anisotropic product kernel needs the in-plane/vertical split of the
    /// vector itself (SPEC_FULL.md §4.1).
    pub fn w(&self, r_ij: DVec3, r: f64, h: f64) -> f64 {
        match self.kind {
            KernelKind::CubicSpline => self.w_cubic(r, h),
            KernelKind::Wendland => self.w_wendland(r, h),
            KernelKind::AnisotropicProduct => self.w_anisotropic(r_ij, h),
        }
    }

    /// grad_r W(r, h), given the raw separation vector r_ij = pos_i - pos_j
    /// (not normalized) and its length r = |r_ij|. Returns the zero vector
    /// for r = 0 or q >= support (SPEC_FULL.md §4.1).
    pub fn dw(&self, r_ij: DVec3, r: f64, h: f64) -> DVec3 {
        match self.kind {
            KernelKind::CubicSpline => self.dw_cubic(r_ij, r, h),
            KernelKind::Wendland => self.dw_wendland(r_ij, r, h),
            KernelKind::AnisotropicProduct => self.dw_anisotropic(r_ij, h),
        }
    }

    /// dW(r, h)/dh.
    pub fn dhw(&self, r_ij: DVec3, r: f64, h: f64) -> f64 {
        match self.kind {
            KernelKind::CubicSpline => self.dhw_cubic(r, h),
            KernelKind::Wendland => self.dhw_wendland(r, h),
            // The anisotropic kernel's h-derivative is always finite-differenced
            // (SPEC_FULL.md §4.1, §9 Open Questions): its analytic gradient along
            // the vertical axis does not admit the same closed form as the other
            // two kernels, and test tolerances for this path are widened accordingly.
            KernelKind::AnisotropicProduct => {
                let step = 1e-4 * h.max(1e-8);
                (self.w_anisotropic(r_ij, h + step) - self.w_anisotropic(r_ij, h - step))
                    / (2.0 * step)
            }
        }
    }

    // -- Cubic spline (Monaghan & Lattanzio 1985, as re-derived in
    //    `include/kernel/cubic_spline.hpp`) --

    fn w_cubic(&self, r: f64, h: f64) -> f64 {
        let kd = self.d_eff;
        let sigma = sigma_cubic(kd);
        let h_ = 0.5 * h;
        let q = r / h_;
        let term_a = 0.5 * (2.0 - q + (2.0 - q).abs());
        let term_b = 0.5 * (1.0 - q + (1.0 - q).abs());
        sigma / powh_dim(h_, kd) * (0.25 * term_a.powi(3) - term_b.powi(3))
    }

    fn dw_cubic(&self, r_ij: DVec3, r: f64, h: f64) -> DVec3 {
        if r == 0.0 {
            return DVec3::ZERO;
        }
        let kd = self.d_eff;
        let sigma = sigma_cubic(kd);
        let h_ = 0.5 * h;
        let q = r / h_;
        if q >= self.support() {
            return DVec3::ZERO;
        }
        let term_a = 0.5 * (2.0 - q + (2.0 - q).abs());
        let term_b = 0.5 * (1.0 - q + (1.0 - q).abs());
        let c = -sigma / (powh_dim(h_, kd) * h_ * r) * (0.75 * term_a.powi(2) - 3.0 * term_b.powi(2));
        r_ij * c
    }

    fn dhw_cubic(&self, r: f64, h: f64) -> f64 {
        let kd = self.d_eff as f64;
        let sigma = sigma_cubic(self.d_eff);
        let h_ = 0.5 * h;
        let q = r / h_;
        let term_a = 0.5 * ((2.0 - q).abs() + 2.0 - q);
        let term_b = 0.5 * ((1.0 - q).abs() + 1.0 - q);
        0.5 * sigma / (powh_dim(h_, self.d_eff) * h_)
            * (term_a.powi(2) * ((3.0 + kd) * 0.25 * q - 0.5 * kd)
                + term_b.powi(2) * ((-3.0 - kd) * q + kd))
    }

    // -- Wendland C4 (Dehnen & Aly 2012), per `include/kernel/wendland_kernel.hpp` --

    fn w_wendland(&self, r: f64, h: f64) -> f64 {
        let kd = self.d_eff;
        let sigma = sigma_wendland(kd);
        let q = r / h;
        if q >= 1.0 {
            return 0.0;
        }
        let term = 0.5 * (1.0 - q + (1.0 - q).abs());
        sigma / powh_dim(h, kd) * term.powi(6) * (1.0 + 6.0 * q + (35.0 / 3.0) * q * q)
    }

    fn dw_wendland(&self, r_ij: DVec3, r: f64, h: f64) -> DVec3 {
        let kd = self.d_eff;
        let sigma = sigma_wendland(kd);
        let q = r / h;
        if q >= 1.0 || r <= 1e-8 {
            return DVec3::ZERO;
        }
        let denom = powh_dim(h, kd);
        let term = 0.5 * (1.0 - q + (1.0 - q).abs());
        let c = -56.0 / 3.0 * sigma / (denom * h * h) * term.powi(5) * (1.0 + 5.0 * q);
        r_ij * c
    }

    fn dhw_wendland(&self, r: f64, h: f64) -> f64 {
        let kd = self.d_eff as f64;
        let sigma = sigma_wendland(self.d_eff);
        let q = r / h;
        if q >= 1.0 {
            return 0.0;
        }
        let term = 0.5 * (1.0 - q + (1.0 - q).abs());
        -sigma / (powh_dim(h, self.d_eff) * h * 3.0)
            * term.powi(5)
            * (3.0 * kd + 15.0 * kd * q + (-56.0 + 17.0 * kd) * q * q - 35.0 * (8.0 + kd) * q.powi(3))
    }

    // -- Anisotropic product kernel: a genuine product
    //    W(x,y,z; h_xy, h_z) = W2D(r_xy; h_xy) * W1D(z; h_z) of a 2D Wendland
    //    C4 in-plane factor and a 1D Gaussian vertical factor, per
    //    `include/kernel/anisotropic_kernel.hpp`. The vertical scale h_z is
    //    taken equal to h_xy = h (isotropic fallback); a host wanting genuine
    //    anisotropy would carry a separate h_z field, which this core's
    //    Particle model does not (SPEC_FULL.md does not name a vertical
    //    smoothing length as part of the data model) — but r_xy and z
    //    themselves are taken from the real `r_ij` components, not collapsed
    //    into a single radial distance.

    fn w2d(q_xy: f64) -> f64 {
        if q_xy >= 1.0 {
            return 0.0;
        }
        let term = 0.5 * (1.0 - q_xy + (1.0 - q_xy).abs());
        term.powi(6) * (1.0 + 6.0 * q_xy + (35.0 / 3.0) * q_xy * q_xy)
    }

    fn dw2d_dq(q_xy: f64) -> f64 {
        if q_xy >= 1.0 {
            return 0.0;
        }
        let term = 0.5 * (1.0 - q_xy + (1.0 - q_xy).abs());
        let dterm_dq = -0.5;
        6.0 * term.powi(5) * dterm_dq * (1.0 + 6.0 * q_xy + (35.0 / 3.0) * q_xy * q_xy)
            + term.powi(6) * (6.0 + (70.0 / 3.0) * q_xy)
    }

    fn w1d(z: f64, hz: f64) -> f64 {
        1.0 / ((2.0 * PI).sqrt() * hz) * (-0.5 * (z * z) / (hz * hz)).exp()
    }

    fn dw1d_dz(z: f64, hz: f64) -> f64 {
        -(z / (hz * hz)) * Self::w1d(z, hz)
    }

    fn w_anisotropic(&self, r_ij: DVec3, h: f64) -> f64 {
        let r_xy = (r_ij.x * r_ij.x + r_ij.y * r_ij.y).sqrt();
        let q_xy = r_xy / h;
        let sigma_2d = 9.0 / PI;
        let hz = h;
        (sigma_2d / (h * h)) * Self::w2d(q_xy) * Self::w1d(r_ij.z, hz)
    }

    /// Non-radial gradient: the in-plane component scales with `W1D(z)` and
    /// points along `(x, y)/r_xy`, while the vertical component scales with
    /// `W2D(q_xy)` and is `dW1D/dz` — the two factors of the product kernel
    /// differentiate independently, not a shared radial derivative.
    fn dw_anisotropic(&self, r_ij: DVec3, h: f64) -> DVec3 {
        let (x, y, z) = (r_ij.x, r_ij.y, r_ij.z);
        let r_xy = (x * x + y * y).sqrt();
        let q_xy = r_xy / h;
        let sigma_2d = 9.0 / PI;
        let hz = h;

        let dw2d_dr = if q_xy < 1.0 {
            sigma_2d * Self::dw2d_dq(q_xy) / (h * h * h)
        } else {
            0.0
        };
        let mut grad_xy = DVec3::ZERO;
        if r_xy > 1e-8 {
            grad_xy.x = dw2d_dr * (x / r_xy);
            grad_xy.y = dw2d_dr * (y / r_xy);
        }
        let w1 = Self::w1d(z, hz);
        let dw1_dz = Self::dw1d_dz(z, hz);
        let w2_scaled = sigma_2d * Self::w2d(q_xy) / (h * h);
        DVec3::new(grad_xy.x * w1, grad_xy.y * w1, w2_scaled * dw1_dz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernels() -> Vec<Kernel> {
        let mut v = Vec::new();
        for &kind in &[
            KernelKind::CubicSpline,
            KernelKind::Wendland,
            KernelKind::AnisotropicProduct,
        ] {
            for d_eff in 1..=3 {
                v.push(Kernel::new(kind, d_eff));
            }
        }
        v
    }

    #[test]
    fn zero_beyond_support() {
        for k in kernels() {
            let h = 1.0;
            let r = (k.support() + 0.1) * h;
            let rij = DVec3::new(r, 0.0, 0.0);
            assert_eq!(k.w(rij, r, h), 0.0, "{:?} d_eff={}", k.kind, k.d_eff);
            let grad = k.dw(rij, r, h);
            assert_eq!(grad, DVec3::ZERO);
        }
    }

    #[test]
    fn gradient_is_antisymmetric_and_w_is_even_in_r() {
        for k in kernels() {
            let h = 1.0;
            let r = 0.3;
            let rij = DVec3::new(r, 0.0, 0.0);
            assert!((k.w(rij, r, h) - k.w(-rij, r, h)).abs() < 1e-15);
            let g1 = k.dw(rij, r, h);
            let g2 = k.dw(-rij, r, h);
            assert!((g1 + g2).length() < 1e-10, "{:?}", k.kind);
        }
    }

    #[test]
    fn dhw_matches_finite_difference() {
        for k in kernels() {
            let h = 1.0;
            let tol = if k.kind == KernelKind::AnisotropicProduct {
                1e-2
            } else {
                1e-3
            };
            let step = 1e-4;
            let mut max_err = 0.0_f64;
            let mut q = 0.05;
            while q < k.support() {
                let r = q * h;
                let rij = DVec3::new(r, 0.0, 0.0);
                let analytic = k.dhw(rij, r, h);
                let fd = (k.w(rij, r, h + step) - k.w(rij, r, h - step)) / (2.0 * step);
                max_err = max_err.max((analytic - fd).abs());
                q += 0.05;
            }
            assert!(
                max_err < tol,
                "{:?} d_eff={} max_err={}",
                k.kind,
                k.d_eff,
                max_err
            );
        }
    }

    #[test]
    fn one_d_cubic_spline_integrates_to_one() {
        let k = Kernel::new(KernelKind::CubicSpline, 1);
        let h = 1.0;
        let n = 200_000;
        let dr = (k.support() * h) / n as f64;
        let mut integral = 0.0;
        for i in 0..n {
            let r = (i as f64 + 0.5) * dr;
            integral += 2.0 * k.w(DVec3::new(r, 0.0, 0.0), r, h) * dr; // symmetric about r=0
        }
        assert!((integral - 1.0).abs() < 1e-3, "integral={integral}");
    }

    #[test]
    fn one_d_wendland_integrates_to_one() {
        let k = Kernel::new(KernelKind::Wendland, 1);
        let h = 1.0;
        let n = 200_000;
        let dr = (k.support() * h) / n as f64;
        let mut integral = 0.0;
        for i in 0..n {
            let r = (i as f64 + 0.5) * dr;
            integral += 2.0 * k.w(DVec3::new(r, 0.0, 0.0), r, h) * dr;
        }
        assert!((integral - 1.0).abs() < 1e-3, "integral={integral}");
    }

    #[test]
    fn anisotropic_product_kernel_factorizes_in_plane_and_vertical() {
        // A genuine product kernel must vanish off-axis once either factor's
        // cutoff/decay region is reached independently, and must not depend
        // on z through the in-plane cutoff at all (SPEC_FULL.md §4.1,
        // `include/kernel/anisotropic_kernel.hpp`).
        let k = Kernel::new(KernelKind::AnisotropicProduct, 3);
        let h = 1.0;
        // Off the in-plane support (q_xy >= 1) but z = 0: must be exactly zero
        // regardless of how small r_xy's excess over h is, since only q_xy
        // gates the in-plane factor.
        assert_eq!(k.w(DVec3::new(1.5, 0.0, 0.0), 1.5, h), 0.0);
        // On-axis in z only (r_xy = 0): in-plane factor is W2D(0) > 0 and the
        // vertical Gaussian is finite for any z, so this must be nonzero even
        // far from the origin along z (the vertical factor has no compact
        // support, unlike the in-plane factor).
        let w_far_z = k.w(DVec3::new(0.0, 0.0, 10.0), 10.0, h);
        assert!(w_far_z > 0.0 && w_far_z.is_finite());
        // The vertical gradient component at r_xy = 0 is driven purely by
        // dW1D/dz and must be nonzero away from z = 0.
        let grad = k.dw(DVec3::new(0.0, 0.0, 0.5), 0.5, h);
        assert_eq!(grad.x, 0.0);
        assert_eq!(grad.y, 0.0);
        assert!(grad.z < 0.0, "grad.z={}", grad.z);
    }
}
