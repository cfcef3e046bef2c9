use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when building a coordinate from untrusted components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    #[error("({x}, {y}, {z}) is not a cube coordinate: components must sum to zero")]
    NotCube { x: i32, y: i32, z: i32 },
    #[error("cannot parse '{0}' as a coordinate, expected x,y,z")]
    Parse(String),
}

/// Unit offsets to the six neighbouring hexes.
pub const NEIGHBOR_DELTAS: [Cube; 6] = [
    Cube { x: -1, y: 0, z: 1 },
    Cube { x: -1, y: 1, z: 0 },
    Cube { x: 0, y: -1, z: 1 },
    Cube { x: 0, y: 1, z: -1 },
    Cube { x: 1, y: -1, z: 0 },
    Cube { x: 1, y: 0, z: -1 },
];

/// A hex position in cube coordinates. Valid positions satisfy `x + y + z == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cube {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Cube {
    pub const ORIGIN: Cube = Cube { x: 0, y: 0, z: 0 };

    /// Build a coordinate, rejecting triples off the `x + y + z = 0` plane.
    pub fn new(x: i32, y: i32, z: i32) -> Result<Self, CoordError> {
        let cube = Cube { x, y, z };
        if cube.is_valid() {
            Ok(cube)
        } else {
            Err(CoordError::NotCube { x, y, z })
        }
    }

    /// Build a coordinate from two axes; `z` is implied.
    pub const fn from_xy(x: i32, y: i32) -> Self {
        Cube { x, y, z: -x - y }
    }

    pub fn is_valid(&self) -> bool {
        self.x + self.y + self.z == 0
    }

    fn axes(self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }

    fn from_axes(a: [i32; 3]) -> Self {
        Cube { x: a[0], y: a[1], z: a[2] }
    }

    /// Hex distance: the largest absolute axis difference.
    pub fn distance(self, other: Cube) -> u32 {
        let d = other - self;
        d.x.unsigned_abs()
            .max(d.y.unsigned_abs())
            .max(d.z.unsigned_abs())
    }

    /// Greedy single-hex step from `self` towards `dst`.
    ///
    /// The axis with the smallest absolute delta is held still (first axis
    /// wins a tie, in x, y, z order) and the other two move by the sign of
    /// their delta. Stepping towards `self` yields the zero vector.
    pub fn step_towards(self, dst: Cube) -> Cube {
        let delta = (dst - self).axes();
        let mut still = 0;
        for axis in 1..3 {
            if delta[axis].abs() < delta[still].abs() {
                still = axis;
            }
        }
        let mut step = delta.map(i32::signum);
        step[still] = 0;
        let step = Cube::from_axes(step);
        assert!(step.is_valid(), "step {:?} towards {} from {} left the cube plane", step, dst, self);
        step
    }

    /// The hex an army standing on `self` enters next on its way to `dst`.
    pub fn next_on_path(self, dst: Cube) -> Cube {
        self + self.step_towards(dst)
    }

    pub fn neighbors(self) -> impl Iterator<Item = Cube> {
        NEIGHBOR_DELTAS.into_iter().map(move |d| self + d)
    }
}

impl Add for Cube {
    type Output = Cube;

    fn add(self, other: Cube) -> Cube {
        Cube {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

impl Sub for Cube {
    type Output = Cube;

    fn sub(self, other: Cube) -> Cube {
        Cube {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }
}

impl fmt::Display for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.x, self.y, self.z)
    }
}

impl FromStr for Cube {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<i32> = s
            .split(',')
            .map(|p| p.trim().parse::<i32>())
            .collect::<Result<_, _>>()
            .map_err(|_| CoordError::Parse(s.to_string()))?;
        match parts.as_slice() {
            [x, y, z] => Cube::new(*x, *y, *z),
            _ => Err(CoordError::Parse(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: i32, y: i32, z: i32) -> Cube {
        Cube::new(x, y, z).unwrap()
    }

    #[test]
    fn new_rejects_off_plane_triples() {
        assert_eq!(
            Cube::new(1, 1, 1).unwrap_err(),
            CoordError::NotCube { x: 1, y: 1, z: 1 }
        );
        assert!(Cube::new(2, -3, 1).is_ok());
    }

    #[test]
    fn distance_is_max_axis_difference() {
        assert_eq!(Cube::ORIGIN.distance(Cube::ORIGIN), 0);
        assert_eq!(Cube::ORIGIN.distance(c(1, -1, 0)), 1);
        assert_eq!(c(2, -1, -1).distance(c(-1, 2, -1)), 3);
        assert_eq!(c(-2, 0, 2).distance(c(2, 0, -2)), 4);
    }

    #[test]
    fn neighbors_are_at_distance_one() {
        let center = c(1, -2, 1);
        let neighbors: Vec<Cube> = center.neighbors().collect();
        assert_eq!(neighbors.len(), 6);
        for n in neighbors {
            assert!(n.is_valid());
            assert_eq!(center.distance(n), 1);
        }
    }

    #[test]
    fn step_holds_smallest_axis_still() {
        // delta (2, -1, -1): y and z tie, y is held
        assert_eq!(Cube::ORIGIN.step_towards(c(2, -1, -1)), c(1, 0, -1));
        // delta (1, 1, -2): x held
        assert_eq!(Cube::ORIGIN.step_towards(c(1, 1, -2)), c(0, 1, -1));
        // delta (1, -1, 0): z is zero and smallest
        assert_eq!(Cube::ORIGIN.step_towards(c(1, -1, 0)), c(1, -1, 0));
    }

    #[test]
    fn step_ties_prefer_x_then_y() {
        // all abs deltas equal cannot happen on the plane except at zero,
        // so the zero step is the only three-way tie
        assert_eq!(Cube::ORIGIN.step_towards(Cube::ORIGIN), Cube::ORIGIN);
        // x and y tie at 1, x wins
        assert_eq!(c(0, 0, 0).step_towards(c(1, 1, -2)), c(0, 1, -1));
    }

    #[test]
    fn next_on_path_walks_to_target_one_hex_per_step() {
        let targets = [c(3, -1, -2), c(-2, 3, -1), c(0, -4, 4), c(2, 2, -4), c(-3, 0, 3)];
        for target in targets {
            let mut pos = c(1, -1, 0);
            let mut steps = 0;
            while pos != target {
                let next = pos.next_on_path(target);
                assert_eq!(pos.distance(next), 1);
                assert_eq!(next.distance(target) + 1, pos.distance(target));
                pos = next;
                steps += 1;
                assert!(steps < 20);
            }
            assert_eq!(steps, c(1, -1, 0).distance(target));
        }
    }

    #[test]
    fn parse_and_display() {
        let parsed: Cube = " 1, -3,2".parse().unwrap();
        assert_eq!(parsed, c(1, -3, 2));
        assert_eq!(parsed.to_string(), "1, -3, 2");
        assert!(matches!("1,2".parse::<Cube>(), Err(CoordError::Parse(_))));
        assert!(matches!("a,b,c".parse::<Cube>(), Err(CoordError::Parse(_))));
        assert!(matches!("1,1,1".parse::<Cube>(), Err(CoordError::NotCube { .. })));
    }

    #[test]
    fn add_and_subtract_are_inverse() {
        let a = c(2, -5, 3);
        let b = c(-1, 4, -3);
        assert_eq!((a + b) - b, a);
        assert_eq!(a - a, Cube::ORIGIN);
    }
}
