//! Drop module - falling piece geometry and rotation
//!
//! A drop is anchored on its pivot puyo (the arle). Every other puyo is a
//! satellite whose position is derived from the pivot and `standard_angle`:
//!
//! ```text
//! offset(a) = (dx·cos a − dy·sin a, dx·sin a + dy·cos a)
//! ```
//!
//! At angle 0 the first satellite sits directly above the pivot. Clockwise
//! rotation decreases the angle. Positions use `y` as the bottom edge of a
//! cell in row units, so a drop rests on a column of height `h` when `y == h`.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use crate::types::{Colour, Direction, Rotating, Shape, FRAMES_PER_ROTATION};

/// Tolerance used when snapping angles and coordinates to whole values.
pub const EPSILON: f64 = 1e-9;

/// Tolerance for deciding a rotation has reached a right angle.
const ANGLE_TOLERANCE: f64 = 1e-6;

/// Pivot column on spawn.
pub const SPAWN_COLUMN: f64 = 2.0;

/// Position of a puyo in board units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Offsets from the pivot at angle 0, in colour-slot order.
pub fn shape_offsets(shape: Shape) -> &'static [(f64, f64)] {
    match shape {
        Shape::I => &[(0.0, 0.0), (0.0, 1.0)],
        Shape::SmallH | Shape::L => &[(0.0, 0.0), (0.0, 1.0), (1.0, 0.0)],
        Shape::H | Shape::O => &[(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)],
    }
}

/// Rotate an offset by `angle` radians, snapping near-integers.
pub fn rotate_offset(dx: f64, dy: f64, angle: f64) -> (f64, f64) {
    let (sin, cos) = angle.sin_cos();
    (snap(dx * cos - dy * sin), snap(dx * sin + dy * cos))
}

/// Round `v` when it is within [`EPSILON`] of an integer.
pub fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < EPSILON {
        r
    } else {
        v
    }
}

fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if (TAU - wrapped).abs() < ANGLE_TOLERANCE {
        0.0
    } else {
        wrapped
    }
}

/// A falling piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drop {
    pub shape: Shape,
    /// One colour per puyo, pivot first.
    pub colours: ArrayVec<Colour, 4>,
    pub arle: Point,
    /// First satellite, only set once the drop has locked or split.
    pub schezo: Option<Point>,
    pub standard_angle: f64,
    pub rotating: Rotating,
    /// Stage counter of a 180° spin: 2 before the first right angle, 1 after.
    pub rotating_180: u8,
}

impl Drop {
    /// New drop at the origin with angle 0.
    pub fn new(shape: Shape, colours: &[Colour]) -> Self {
        Self {
            shape,
            colours: colours.iter().copied().take(4).collect(),
            arle: Point::default(),
            schezo: None,
            standard_angle: 0.0,
            rotating: Rotating::None,
            rotating_180: 0,
        }
    }

    /// Move the pivot to the spawn point of a board with `rows` visible rows.
    pub fn spawn(&mut self, rows: usize) {
        self.arle = Point::new(SPAWN_COLUMN, rows as f64 - 0.5);
        self.schezo = None;
        self.standard_angle = 0.0;
        self.rotating = Rotating::None;
        self.rotating_180 = 0;
    }

    pub fn is_rotating(&self) -> bool {
        self.rotating != Rotating::None
    }

    /// Every puyo with its colour, pivot first.
    pub fn puyos(&self) -> ArrayVec<(Point, Colour), 4> {
        shape_offsets(self.shape)
            .iter()
            .zip(self.colours.iter())
            .map(|(&(dx, dy), &colour)| {
                let (ox, oy) = rotate_offset(dx, dy, self.standard_angle);
                (
                    Point::new(snap(self.arle.x + ox), snap(self.arle.y + oy)),
                    colour,
                )
            })
            .collect()
    }

    /// Satellite positions (every puyo except the pivot).
    pub fn satellites(&self) -> ArrayVec<Point, 3> {
        self.puyos().into_iter().skip(1).map(|(p, _)| p).collect()
    }

    /// Lowest `y` of any puyo in column `col`.
    pub fn lowest_in_column(&self, col: i64) -> Option<f64> {
        self.puyos()
            .iter()
            .filter(|(p, _)| p.x.round() as i64 == col)
            .map(|(p, _)| p.y)
            .reduce(f64::min)
    }

    /// Leftmost and rightmost occupied columns, rounded.
    pub fn column_span(&self) -> (i64, i64) {
        let puyos = self.puyos();
        let xs = puyos.iter().map(|(p, _)| p.x);
        let min = xs.clone().fold(f64::INFINITY, f64::min);
        let max = xs.fold(f64::NEG_INFINITY, f64::max);
        (min.floor() as i64, max.ceil() as i64)
    }

    pub fn shift(&mut self, dir: Direction, amount: f64) {
        let (dx, dy) = dir.delta();
        self.arle.x = snap(self.arle.x + dx as f64 * amount);
        self.arle.y = snap(self.arle.y + dy as f64 * amount);
    }

    /// Start a 90° clockwise turn. Fails if already rotating.
    pub fn rotate_cw(&mut self) -> bool {
        self.start_rotation(Rotating::Cw, 0)
    }

    /// Start a 90° counter-clockwise turn. Fails if already rotating.
    pub fn rotate_ccw(&mut self) -> bool {
        self.start_rotation(Rotating::Ccw, 0)
    }

    /// Start a 180° spin in `direction`.
    pub fn rotate_180(&mut self, direction: Rotating) -> bool {
        self.start_rotation(direction, 2)
    }

    fn start_rotation(&mut self, direction: Rotating, stage: u8) -> bool {
        if self.is_rotating() || direction == Rotating::None {
            return false;
        }
        self.rotating = direction;
        self.rotating_180 = stage;
        true
    }

    /// Advance the rotation by one frame.
    pub fn affect_rotation(&mut self) {
        let sign = match self.rotating {
            Rotating::None => return,
            Rotating::Cw => -1.0,
            Rotating::Ccw => 1.0,
        };

        let mut step = PI / (2.0 * FRAMES_PER_ROTATION as f64);
        if self.rotating_180 > 0 {
            step *= 2.0;
        }
        self.standard_angle = wrap_angle(self.standard_angle + sign * step);

        let quarters = self.standard_angle / FRAC_PI_2;
        if (quarters - quarters.round()).abs() < ANGLE_TOLERANCE {
            self.standard_angle = wrap_angle(quarters.round() * FRAC_PI_2);
            if self.rotating_180 == 2 {
                self.rotating_180 = 1;
            } else {
                self.rotating = Rotating::None;
                self.rotating_180 = 0;
            }
        }
    }

    /// Snap to the quadrant boundary the current rotation is heading for.
    pub fn finish_rotation(&mut self) {
        let quarters = self.standard_angle / FRAC_PI_2;
        let mut target = match self.rotating {
            Rotating::None => return,
            Rotating::Cw => (quarters - EPSILON).floor(),
            Rotating::Ccw => (quarters + EPSILON).ceil(),
        };
        if self.rotating_180 == 2 {
            target += if self.rotating == Rotating::Cw { -1.0 } else { 1.0 };
        }
        self.standard_angle = wrap_angle(target * FRAC_PI_2);
        self.rotating = Rotating::None;
        self.rotating_180 = 0;
    }

    /// Copy of this drop with its rotation completed.
    pub fn finished(&self) -> Drop {
        let mut copy = self.clone();
        copy.finish_rotation();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Drop {
        let mut drop = Drop::new(Shape::I, &[1, 2]);
        drop.spawn(12);
        drop
    }

    #[test]
    fn test_spawn_places_schezo_above() {
        let drop = pair();
        let puyos = drop.puyos();
        assert_eq!(puyos[0], (Point::new(2.0, 11.5), 1));
        assert_eq!(puyos[1], (Point::new(2.0, 12.5), 2));
    }

    #[test]
    fn test_cw_rotation_takes_eight_frames() {
        let mut drop = pair();
        assert!(drop.rotate_cw());
        assert!(!drop.rotate_ccw());
        for _ in 0..FRAMES_PER_ROTATION {
            assert!(drop.is_rotating());
            drop.affect_rotation();
        }
        assert!(!drop.is_rotating());
        assert!((drop.standard_angle - 3.0 * FRAC_PI_2).abs() < 1e-9);
        // Clockwise from above puts the satellite on the right.
        assert_eq!(drop.satellites()[0], Point::new(3.0, 11.5));
    }

    #[test]
    fn test_180_passes_through_both_stages() {
        let mut drop = pair();
        assert!(drop.rotate_180(Rotating::Ccw));
        for _ in 0..FRAMES_PER_ROTATION / 2 {
            drop.affect_rotation();
        }
        assert_eq!(drop.rotating_180, 1);
        for _ in 0..FRAMES_PER_ROTATION / 2 {
            drop.affect_rotation();
        }
        assert_eq!(drop.rotating_180, 0);
        assert!(!drop.is_rotating());
        assert_eq!(drop.satellites()[0], Point::new(2.0, 10.5));
    }

    #[test]
    fn test_finish_rotation_snaps_forward() {
        let mut drop = pair();
        drop.rotate_ccw();
        drop.affect_rotation();
        drop.affect_rotation();
        let done = drop.finished();
        assert!(drop.is_rotating());
        assert!(!done.is_rotating());
        assert!((done.standard_angle - FRAC_PI_2).abs() < 1e-9);

        let mut spin = pair();
        spin.rotate_180(Rotating::Cw);
        spin.finish_rotation();
        assert!((spin.standard_angle - PI).abs() < 1e-9);
    }

    #[test]
    fn test_o_drop_covers_two_columns() {
        let mut drop = Drop::new(Shape::O, &[3, 3, 3, 3]);
        drop.spawn(12);
        assert_eq!(drop.column_span(), (2, 3));
        assert_eq!(drop.lowest_in_column(3), Some(11.5));
        assert_eq!(drop.lowest_in_column(4), None);
    }
}
