//! # Pose and twist types
//!
//! A pose is a rigid transform between two frames (for example the current
//! camera-to-target transform). `nalgebra`'s `Isometry3` keeps the rotation
//! block orthonormal with determinant +1 by construction, which is exactly
//! the invariant required of a homogeneous transform.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{DMatrix, Isometry3, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// A rigid transform between two frames.
pub type Pose = Isometry3<f64>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Compact pose representation for display and telemetry: translation in
/// meters plus theta-u (axis-angle) rotation in degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoseVec {
    pub trans_m: [f64; 3],
    pub theta_u_deg: [f64; 3],
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PoseVec {
    pub fn from_pose(pose: &Pose) -> Self {
        let t = pose.translation.vector;
        let tu = pose.rotation.scaled_axis();

        Self {
            trans_m: [t[0], t[1], t[2]],
            theta_u_deg: [
                tu[0].to_degrees(),
                tu[1].to_degrees(),
                tu[2].to_degrees(),
            ],
        }
    }
}

impl std::fmt::Display for PoseVec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "t = [{:.4} {:.4} {:.4}] m, tu = [{:.2} {:.2} {:.2}] deg",
            self.trans_m[0],
            self.trans_m[1],
            self.trans_m[2],
            self.theta_u_deg[0],
            self.theta_u_deg[1],
            self.theta_u_deg[2]
        )
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build the 6x6 velocity twist matrix of a pose.
///
/// For a transform `aMb = (R, t)` the twist maps a velocity screw expressed
/// in frame `b` into frame `a`:
///
/// ```text
///     | R   [t]x R |
///     | 0      R   |
/// ```
pub fn vel_twist(pose: &Pose) -> DMatrix<f64> {
    let r = pose.rotation.to_rotation_matrix();
    let r = r.matrix();
    let t = pose.translation.vector;

    let tr = skew(&t) * r;

    let mut twist = DMatrix::zeros(6, 6);
    for i in 0..3 {
        for j in 0..3 {
            twist[(i, j)] = r[(i, j)];
            twist[(i + 3, j + 3)] = r[(i, j)];
            twist[(i, j + 3)] = tr[(i, j)];
        }
    }

    twist
}

/// Skew-symmetric (cross product) matrix of a 3-vector.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v[2], v[1],
        v[2], 0.0, -v[0],
        -v[1], v[0], 0.0,
    )
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn test_vel_twist_identity() {
        let twist = vel_twist(&Pose::identity());

        for i in 0..6 {
            for j in 0..6 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((twist[(i, j)] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_vel_twist_pure_translation() {
        // With identity rotation the top-right block is the skew of t
        let pose = Pose::from_parts(
            Translation3::new(0.0, 0.0, 1.0),
            UnitQuaternion::identity(),
        );
        let twist = vel_twist(&pose);

        // [t]x for t = (0, 0, 1): entry (0,1) = -1, (1,0) = 1
        assert!((twist[(0, 4)] + 1.0).abs() < 1e-12);
        assert!((twist[(1, 3)] - 1.0).abs() < 1e-12);

        // Rotation blocks stay identity
        assert!((twist[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((twist[(3, 3)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pose_vec() {
        let pose = Pose::from_parts(
            Translation3::new(0.1, -0.2, 0.3),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        );
        let pv = PoseVec::from_pose(&pose);

        assert!((pv.trans_m[0] - 0.1).abs() < 1e-12);
        assert!((pv.trans_m[1] + 0.2).abs() < 1e-12);
        assert!((pv.theta_u_deg[2] - 90.0).abs() < 1e-9);
    }
}
