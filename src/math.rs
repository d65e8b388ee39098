use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// A 2D column vector.
///
/// Equality is exact bit-for-bit float comparison; the solver relies on
/// deterministic arithmetic, not epsilon fuzz.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self::splat(0.0);
    pub const ONE: Self = Self::splat(1.0);

    #[inline(always)]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline(always)]
    pub const fn splat(value: f32) -> Self {
        Self { x: value, y: value }
    }

    #[inline(always)]
    pub fn get(&self, index: usize) -> f32 {
        match index {
            0 => self.x,
            1 => self.y,
            _ => panic!("index out of bounds"),
        }
    }

    #[inline(always)]
    pub fn get_mut(&mut self, index: usize) -> &mut f32 {
        match index {
            0 => &mut self.x,
            1 => &mut self.y,
            _ => panic!("index out of bounds"),
        }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        self.x.hypot(self.y)
    }

    #[inline]
    pub fn length_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    #[inline]
    pub fn distance(&self, other: Self) -> f32 {
        (other - *self).length()
    }

    #[inline]
    pub fn distance_squared(&self, other: Self) -> f32 {
        (other - *self).length_squared()
    }

    #[inline]
    pub fn dot(&self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    #[inline]
    pub fn cross(&self, other: Self) -> f32 {
        self.x * other.y - self.y * other.x
    }

    /// v x s, yielding a vector.
    #[inline]
    pub fn cross_scalar(&self, scalar: f32) -> Self {
        Self {
            x: scalar * self.y,
            y: -scalar * self.x,
        }
    }

    /// s x v, yielding a vector.
    #[inline]
    pub fn scalar_cross(scalar: f32, vec: Self) -> Self {
        Self {
            x: -scalar * vec.y,
            y: scalar * vec.x,
        }
    }

    /// A vector perpendicular to this one (counter-clockwise).
    #[inline]
    pub fn skew(&self) -> Self {
        Self {
            x: -self.y,
            y: self.x,
        }
    }

    /// Normalize this vector. A near-zero-length input is a recoverable
    /// degeneracy and yields the zero vector.
    #[inline]
    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len < f32::EPSILON {
            return Self::ZERO;
        }
        Self {
            x: self.x / len,
            y: self.y / len,
        }
    }

    #[inline]
    pub fn abs(&self) -> Self {
        Self {
            x: self.x.abs(),
            y: self.y.abs(),
        }
    }

    #[inline]
    pub fn min(&self, other: Self) -> Self {
        Self {
            x: self.x.min(other.x),
            y: self.y.min(other.y),
        }
    }

    #[inline]
    pub fn max(&self, other: Self) -> Self {
        Self {
            x: self.x.max(other.x),
            y: self.y.max(other.y),
        }
    }

    #[inline]
    pub fn clamp(&self, min: Self, max: Self) -> Self {
        self.max(min).min(max)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;
    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl AddAssign for Vec2 {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    #[inline]
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl SubAssign for Vec2 {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.x -= other.x;
        self.y -= other.y;
    }
}

impl Neg for Vec2 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    #[inline]
    fn mul(self, other: f32) -> Self {
        Self {
            x: self.x * other,
            y: self.y * other,
        }
    }
}

impl Mul<Vec2> for f32 {
    type Output = Vec2;
    #[inline]
    fn mul(self, other: Vec2) -> Vec2 {
        Vec2 {
            x: self * other.x,
            y: self * other.y,
        }
    }
}

impl MulAssign<f32> for Vec2 {
    #[inline]
    fn mul_assign(&mut self, other: f32) {
        self.x *= other;
        self.y *= other;
    }
}

/// A 3D column vector, used by the 3x3 constraint mass matrices.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    #[inline(always)]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn dot(&self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(&self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }
}

impl Add for Vec3 {
    type Output = Self;
    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    #[inline]
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<Vec3> for f32 {
    type Output = Vec3;
    #[inline]
    fn mul(self, other: Vec3) -> Vec3 {
        Vec3::new(self * other.x, self * other.y, self * other.z)
    }
}

/// A 2x2 matrix stored as two column vectors.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Mat2x2 {
    pub col1: Vec2,
    pub col2: Vec2,
}

impl Mat2x2 {
    pub const ZERO: Mat2x2 = Mat2x2 {
        col1: Vec2::ZERO,
        col2: Vec2::ZERO,
    };

    pub const IDENTITY: Mat2x2 = Mat2x2::from_cols(Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0));

    #[inline(always)]
    pub const fn from_cols(col1: Vec2, col2: Vec2) -> Self {
        Self { col1, col2 }
    }

    /// Construct from entries in row-major order for visual clarity; the data
    /// is stored column-major.
    #[inline(always)]
    pub const fn new(m00: f32, m01: f32, m10: f32, m11: f32) -> Self {
        Self {
            col1: Vec2::new(m00, m10),
            col2: Vec2::new(m01, m11),
        }
    }

    #[inline]
    pub const fn transpose(&self) -> Self {
        Self {
            col1: Vec2::new(self.col1.x, self.col2.x),
            col2: Vec2::new(self.col1.y, self.col2.y),
        }
    }

    #[inline]
    pub fn determinant(&self) -> f32 {
        self.col1.x * self.col2.y - self.col2.x * self.col1.y
    }

    /// Invert this matrix. A near-singular matrix yields the zero matrix,
    /// which the solver treats as "constraint has no effective mass".
    #[inline]
    pub fn invert(&self) -> Self {
        let det = self.determinant();
        if det.abs() < f32::EPSILON {
            return Self::ZERO;
        }
        let inv_det = det.recip();
        Self::from_cols(
            Vec2::new(inv_det * self.col2.y, -inv_det * self.col1.y),
            Vec2::new(-inv_det * self.col2.x, inv_det * self.col1.x),
        )
    }

    /// Solve A * x = b by Cramer's rule. Cheaper than computing the full
    /// inverse when only one solve is needed. Near-zero determinant yields
    /// the zero vector.
    #[inline]
    pub fn solve(&self, b: Vec2) -> Vec2 {
        let a11 = self.col1.x;
        let a12 = self.col2.x;
        let a21 = self.col1.y;
        let a22 = self.col2.y;
        let det = a11 * a22 - a12 * a21;
        if det.abs() < f32::EPSILON {
            return Vec2::ZERO;
        }
        let inv_det = det.recip();
        Vec2::new(
            inv_det * (a22 * b.x - a12 * b.y),
            inv_det * (a11 * b.y - a21 * b.x),
        )
    }

    #[inline]
    pub fn abs(&self) -> Self {
        Self {
            col1: self.col1.abs(),
            col2: self.col2.abs(),
        }
    }
}

impl Add for Mat2x2 {
    type Output = Self;
    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            col1: self.col1 + other.col1,
            col2: self.col2 + other.col2,
        }
    }
}

impl Mul<Vec2> for Mat2x2 {
    type Output = Vec2;
    #[inline]
    fn mul(self, other: Vec2) -> Vec2 {
        Vec2::new(
            self.col1.x * other.x + self.col2.x * other.y,
            self.col1.y * other.x + self.col2.y * other.y,
        )
    }
}

impl Mul for Mat2x2 {
    type Output = Self;
    #[inline]
    fn mul(self, other: Self) -> Self {
        Self {
            col1: self * other.col1,
            col2: self * other.col2,
        }
    }
}

/// A 3x3 matrix stored as three column vectors.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Mat3x3 {
    pub col1: Vec3,
    pub col2: Vec3,
    pub col3: Vec3,
}

impl Mat3x3 {
    pub const ZERO: Mat3x3 = Mat3x3 {
        col1: Vec3::ZERO,
        col2: Vec3::ZERO,
        col3: Vec3::ZERO,
    };

    #[inline(always)]
    pub const fn from_cols(col1: Vec3, col2: Vec3, col3: Vec3) -> Self {
        Self { col1, col2, col3 }
    }

    /// Solve A * x = b via the adjugate. Near-singular yields the zero
    /// vector.
    pub fn solve33(&self, b: Vec3) -> Vec3 {
        let mut det = self.col1.dot(self.col2.cross(self.col3));
        if det.abs() < f32::EPSILON {
            return Vec3::ZERO;
        }
        det = det.recip();
        Vec3::new(
            det * b.dot(self.col2.cross(self.col3)),
            det * self.col1.dot(b.cross(self.col3)),
            det * self.col1.dot(self.col2.cross(b)),
        )
    }

    /// Solve the upper-left 2x2 block of A * x = b.
    pub fn solve22(&self, b: Vec2) -> Vec2 {
        let a11 = self.col1.x;
        let a12 = self.col2.x;
        let a21 = self.col1.y;
        let a22 = self.col2.y;
        let det = a11 * a22 - a12 * a21;
        if det.abs() < f32::EPSILON {
            return Vec2::ZERO;
        }
        let inv_det = det.recip();
        Vec2::new(
            inv_det * (a22 * b.x - a12 * b.y),
            inv_det * (a11 * b.y - a21 * b.x),
        )
    }

    /// Inverse of the upper-left 2x2 block, written into `out`.
    pub fn get_inverse22(&self, out: &mut Mat3x3) {
        let a = self.col1.x;
        let b = self.col2.x;
        let c = self.col1.y;
        let d = self.col2.y;
        let mut det = a * d - b * c;
        if det.abs() >= f32::EPSILON {
            det = det.recip();
        } else {
            det = 0.0;
        }

        out.col1 = Vec3::new(det * d, -det * c, 0.0);
        out.col2 = Vec3::new(-det * b, det * a, 0.0);
        out.col3 = Vec3::ZERO;
    }

    /// Inverse of this matrix written into `out`, assuming the matrix is
    /// symmetric. The caller must guarantee symmetry; results are undefined
    /// otherwise. Used for 3x3 contact-constraint mass matrices.
    pub fn get_sym_inverse33(&self, out: &mut Mat3x3) {
        let mut det = self.col1.dot(self.col2.cross(self.col3));
        if det.abs() >= f32::EPSILON {
            det = det.recip();
        } else {
            det = 0.0;
        }

        let a11 = self.col1.x;
        let a12 = self.col2.x;
        let a13 = self.col3.x;
        let a22 = self.col2.y;
        let a23 = self.col3.y;
        let a33 = self.col3.z;

        out.col1 = Vec3::new(
            det * (a22 * a33 - a23 * a23),
            det * (a13 * a23 - a12 * a33),
            det * (a12 * a23 - a13 * a22),
        );
        out.col2 = Vec3::new(
            out.col1.y,
            det * (a11 * a33 - a13 * a13),
            det * (a13 * a12 - a11 * a23),
        );
        out.col3 = Vec3::new(
            out.col1.z,
            out.col2.z,
            det * (a11 * a22 - a12 * a12),
        );
    }
}

impl Mul<Vec3> for Mat3x3 {
    type Output = Vec3;
    #[inline]
    fn mul(self, other: Vec3) -> Vec3 {
        other.x * self.col1 + other.y * self.col2 + other.z * self.col3
    }
}

/// A rotation stored as the sine and cosine of an angle, so repeated
/// transforms avoid trig calls.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rot {
    /// Sine
    pub s: f32,
    /// Cosine
    pub c: f32,
}

impl Rot {
    pub const IDENTITY: Self = Self { s: 0.0, c: 1.0 };

    /// Construct a new rotation from an angle in radians.
    #[inline(always)]
    pub fn new(angle: f32) -> Self {
        Self {
            s: angle.sin(),
            c: angle.cos(),
        }
    }

    #[inline(always)]
    pub fn set_identity(&mut self) {
        self.s = 0.0;
        self.c = 1.0;
    }

    /// Get the angle in radians.
    #[inline]
    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    /// Set using an angle in radians.
    #[inline]
    pub fn set_angle(&mut self, angle: f32) {
        self.s = angle.sin();
        self.c = angle.cos();
    }

    /// Get the X-axis.
    #[inline]
    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    /// Get the Y-axis.
    #[inline]
    pub fn y_axis(&self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Get the inverse of this rotation.
    #[inline]
    pub fn inverse(&self) -> Self {
        Self {
            s: -self.s,
            c: self.c,
        }
    }

    /// Inverse-rotate a vector.
    #[inline]
    pub fn mul_t_vec2(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }
}

impl Default for Rot {
    #[inline(always)]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Rot {
    type Output = Self;
    #[inline]
    fn mul(self, other: Self) -> Self {
        Self {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }
}

impl Mul<Vec2> for Rot {
    type Output = Vec2;
    #[inline]
    fn mul(self, other: Vec2) -> Vec2 {
        Vec2 {
            x: self.c * other.x - self.s * other.y,
            y: self.s * other.x + self.c * other.y,
        }
    }
}

/// A transform contains translation and rotation. It is used to represent
/// the position and orientation of rigid frames.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Transform {
    pub p: Vec2,
    pub q: Rot,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    #[inline(always)]
    pub fn new(p: Vec2, angle: f32) -> Self {
        Self {
            p,
            q: Rot::new(angle),
        }
    }

    /// Get the angle in radians.
    #[inline]
    pub fn angle(&self) -> f32 {
        self.q.angle()
    }

    /// Map a local point into the parent frame.
    #[inline]
    pub fn mul_vec2(&self, v: Vec2) -> Vec2 {
        self.q * v + self.p
    }

    /// Map a parent-frame point into the local frame.
    #[inline]
    pub fn mul_t_vec2(&self, v: Vec2) -> Vec2 {
        self.q.mul_t_vec2(v - self.p)
    }

    /// Compose two transforms: self then t.
    #[inline]
    pub fn mul(&self, t: Self) -> Self {
        Self {
            p: self.mul_vec2(t.p),
            q: self.q * t.q,
        }
    }

    /// v2 = A.q' * (B.q * v1 + B.p - A.p) = A.q' * B.q * v1 + A.q' * (B.p - A.p)
    #[inline]
    pub fn mul_t(&self, t: Self) -> Self {
        let q_inv = self.q.inverse();
        Self {
            p: q_inv * (t.p - self.p),
            q: q_inv * t.q,
        }
    }
}

impl Mul<Vec2> for Transform {
    type Output = Vec2;
    #[inline]
    fn mul(self, other: Vec2) -> Vec2 {
        self.mul_vec2(other)
    }
}

/// This describes the motion of a body/shape over the time step. Shapes are
/// defined with respect to the body origin, which may not coincide with the
/// center of mass. However, to support dynamics we must interpolate the
/// center of mass position.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Sweep {
    /// Local center of mass position.
    pub local_center: Vec2,

    /// Center world positions at the start and end of the sub-step.
    pub c0: Vec2,
    pub c: Vec2,

    /// World angles at the start and end of the sub-step.
    pub a0: f32,
    pub a: f32,

    /// Fraction of the current time step in the range [0,1].
    /// c0 and a0 are the positions at alpha0.
    pub alpha0: f32,
}

impl Sweep {
    /// Get the interpolated transform at a specific time.
    /// `beta` is a factor in [0,1], where 0 indicates alpha0.
    pub fn get_transform(&self, beta: f32) -> Transform {
        let c = (1.0 - beta) * self.c0 + beta * self.c;
        let angle = (1.0 - beta) * self.a0 + beta * self.a;
        let q = Rot::new(angle);

        // Shift to origin.
        Transform {
            p: c - q * self.local_center,
            q,
        }
    }

    /// Advance the sweep forward, yielding a new initial state.
    pub fn advance(&mut self, alpha: f32) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += beta * (self.c - self.c0);
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Normalize the angles: fold a0 into [0, 2*pi), carrying the same
    /// offset into `a` so the sweep delta is preserved.
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * std::f32::consts::PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f32 = 1.0e-4;

    fn mat_close(m1: Mat2x2, m2: Mat2x2, tolerance: f32) -> bool {
        (m1.col1.x - m2.col1.x).abs() < tolerance
            && (m1.col1.y - m2.col1.y).abs() < tolerance
            && (m1.col2.x - m2.col2.x).abs() < tolerance
            && (m1.col2.y - m2.col2.y).abs() < tolerance
    }

    #[test]
    fn mat2x2_invert() {
        let m = Mat2x2::from_cols(Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0));
        let result = m.invert();
        let expected = Mat2x2::from_cols(Vec2::new(-2.0, 1.0), Vec2::new(1.5, -0.5));
        assert!(mat_close(result, expected, TOLERANCE));

        // A * A^-1 = I
        assert!(mat_close(m * result, Mat2x2::IDENTITY, TOLERANCE));
    }

    #[test]
    fn mat2x2_solve() {
        let a = Mat2x2::from_cols(Vec2::new(2.0, 3.0), Vec2::new(4.0, 7.0));
        let x = a.solve(Vec2::new(10.0, 17.0));
        assert!((x.x - 1.0).abs() < TOLERANCE);
        assert!((x.y - 2.0).abs() < TOLERANCE);
    }

    #[test]
    fn mat2x2_solve_degenerate() {
        let a = Mat2x2::from_cols(Vec2::new(1.0, 2.0), Vec2::new(2.0, 4.0));
        assert_eq!(a.solve(Vec2::new(3.0, 6.0)), Vec2::ZERO);
    }

    #[test]
    fn mat3x3_solve() {
        let a = Mat3x3::from_cols(
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 4.0, 0.0),
            Vec3::new(0.0, 0.0, 8.0),
        );
        let x = a.solve33(Vec3::new(2.0, 8.0, 16.0));
        assert!((x.x - 1.0).abs() < TOLERANCE);
        assert!((x.y - 2.0).abs() < TOLERANCE);
        assert!((x.z - 2.0).abs() < TOLERANCE);
    }

    #[test]
    fn mat3x3_sym_inverse() {
        let a = Mat3x3::from_cols(
            Vec3::new(4.0, 1.0, 0.0),
            Vec3::new(1.0, 3.0, 0.0),
            Vec3::new(0.0, 0.0, 2.0),
        );
        let mut inv = Mat3x3::ZERO;
        a.get_sym_inverse33(&mut inv);

        let x = inv * Vec3::new(4.0, 1.0, 0.0);
        assert!((x.x - 1.0).abs() < TOLERANCE);
        assert!(x.y.abs() < TOLERANCE);
        assert!(x.z.abs() < TOLERANCE);
    }

    #[test]
    fn rot_unit_invariant() {
        for angle in [0.0, 0.5, 1.0, -2.0, 3.9, 7.0] {
            let q = Rot::new(angle);
            assert!((q.s * q.s + q.c * q.c - 1.0).abs() < TOLERANCE);
        }
    }

    #[test]
    fn transform_round_trip() {
        let xf = Transform::new(Vec2::new(1.0, -2.0), 0.75);
        let p = Vec2::new(3.0, 4.0);
        let back = xf.mul_t_vec2(xf.mul_vec2(p));
        assert!((back.x - p.x).abs() < TOLERANCE);
        assert!((back.y - p.y).abs() < TOLERANCE);
    }

    #[test]
    fn sweep_normalize_folds_a0() {
        let mut sweep = Sweep {
            a0: 7.0,
            a: 8.0,
            ..Sweep::default()
        };
        let delta = sweep.a - sweep.a0;
        sweep.normalize();

        assert!((sweep.a0 - 0.7168146).abs() < TOLERANCE);
        assert!((sweep.a - sweep.a0 - delta).abs() < TOLERANCE);
    }

    #[test]
    fn sweep_get_transform_interpolates() {
        let sweep = Sweep {
            c0: Vec2::new(0.0, 0.0),
            c: Vec2::new(2.0, 4.0),
            a0: 0.0,
            a: 1.0,
            ..Sweep::default()
        };

        let xf = sweep.get_transform(0.5);
        assert!((xf.p.x - 1.0).abs() < TOLERANCE);
        assert!((xf.p.y - 2.0).abs() < TOLERANCE);
        assert!((xf.angle() - 0.5).abs() < TOLERANCE);
    }

    #[test]
    fn vec2_equality_is_exact() {
        assert_eq!(Vec2::new(0.1 + 0.2, 0.0), Vec2::new(0.1 + 0.2, 0.0));
        assert_ne!(Vec2::new(0.1, 0.0), Vec2::new(0.1 + 1.0e-7, 0.0));
    }
}
