//! Arena partitioning of the world lattice.

use crate::math::Vec3;

/// Edge length of one arena cell.
pub const ARENA_SIZE: f64 = 1024.0;
/// Half an arena cell.
pub const ARENA_HALF: f64 = 512.0;

/// Centre of the arena containing `(x, z)`.
///
/// The arena index is offset by half a cell away from the origin on each
/// axis, so the result is asymmetric at zero: `x = -600` maps to `-513`,
/// `x = 600` to `512`.
pub fn center_of_arena(x: f64, z: f64) -> Vec3 {
    let center = |v: f64| {
        let cell = (v / ARENA_SIZE).floor();
        if v < 0.0 {
            cell - ARENA_HALF
        } else {
            cell + ARENA_HALF
        }
    };
    Vec3::new(center(x), 0.0, center(z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_and_negative_quadrants() {
        assert_eq!(center_of_arena(600.0, 600.0), Vec3::new(512.0, 0.0, 512.0));
        assert_eq!(center_of_arena(-600.0, -600.0), Vec3::new(-513.0, 0.0, -513.0));
    }

    #[test]
    fn origin_and_far_cells() {
        assert_eq!(center_of_arena(0.0, -0.5), Vec3::new(512.0, 0.0, -513.0));
        assert_eq!(center_of_arena(2048.0, -2049.0), Vec3::new(514.0, 0.0, -515.0));
    }
}
