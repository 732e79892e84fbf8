//! Waveguide routing.
//!
//! A [`Trace`] is a cursor that walks the layout plane, emitting straight,
//! tapered and bent waveguide [`Segment`]s. Every bend has the same radius
//! and is padded on both ends by a short straight of length `dr`, so a
//! 90 degree bend displaces the cursor by `radius + dr` along each axis.

use std::sync::Arc;

use crate::error::{RouteError, RouteResult};
use crate::geometry::{arc_points, Axis, Heading, Point, Turn};
use crate::layout::{Cell, Element};
use crate::tech::{LayerSpec, TechConfig};

mod segment;

pub use segment::{Pose, Segment, SegmentKind};

/// Straight segments shorter than this are rejected.
pub const MIN_SEGMENT_LENGTH: f64 = 1e-3;

/// Positions closer than this are considered coincident.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    pub width: f64,
    pub radius: f64,
    pub dr: f64,
    pub layer: LayerSpec,
}

impl RouterConfig {
    pub fn new(tc: &TechConfig) -> Self {
        Self {
            width: tc.waveguide.width,
            radius: tc.waveguide.radius,
            dr: tc.waveguide.dr,
            layer: tc.layers.siwg.spec,
        }
    }

    /// Offset of a 90 degree bend along each axis.
    #[inline]
    pub fn bend_size(&self) -> f64 {
        self.radius + self.dr
    }
}

/// Hands out [`Trace`]s sharing one waveguide configuration.
#[derive(Debug, Clone)]
pub struct Router {
    cfg: Arc<RouterConfig>,
}

impl Router {
    pub fn new(tc: &TechConfig) -> Self {
        Self::with_config(RouterConfig::new(tc))
    }

    pub fn with_config(cfg: RouterConfig) -> Self {
        Self { cfg: Arc::new(cfg) }
    }

    #[inline]
    pub fn cfg(&self) -> Arc<RouterConfig> {
        Arc::clone(&self.cfg)
    }

    #[inline]
    pub fn trace(&self, start: Pose) -> Trace {
        Trace::new(self.cfg(), start)
    }

    /// Starts a trace at `at` heading in `heading`.
    #[inline]
    pub fn trace_from(&self, at: Point, heading: Heading) -> Trace {
        self.trace(Pose::new(at, heading))
    }
}

#[derive(Debug, Clone)]
pub struct Trace {
    cfg: Arc<RouterConfig>,
    start: Pose,
    pose: Pose,
    width: f64,
    layer: LayerSpec,
    segments: Vec<Segment>,
}

impl Trace {
    pub fn new(cfg: Arc<RouterConfig>, start: Pose) -> Self {
        Self {
            width: cfg.width,
            layer: cfg.layer,
            cfg,
            start,
            pose: start,
            segments: Vec::new(),
        }
    }

    #[inline]
    pub fn pose(&self) -> Pose {
        self.pose
    }

    #[inline]
    pub fn at(&self) -> Point {
        self.pose.at
    }

    #[inline]
    pub fn heading(&self) -> Heading {
        self.pose.heading
    }

    #[inline]
    pub fn start(&self) -> Pose {
        self.start
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[inline]
    pub fn bend_size(&self) -> f64 {
        self.cfg.bend_size()
    }

    /// Total centerline length.
    pub fn length(&self) -> f64 {
        self.segments.iter().map(|s| s.length).sum()
    }

    pub fn set_width(&mut self, width: f64) -> RouteResult<&mut Self> {
        if !(width > 0.0 && width.is_finite()) {
            return Err(RouteError::InvalidWidth { width });
        }
        self.width = width;
        Ok(self)
    }

    pub fn set_layer(&mut self, layer: LayerSpec) -> &mut Self {
        self.layer = layer;
        self
    }

    fn push(&mut self, kind: SegmentKind, points: Vec<Point>, end: Pose, end_width: f64, length: f64) {
        self.segments.push(Segment {
            kind,
            points,
            start_width: self.width,
            end_width,
            layer: self.layer,
            start: self.pose,
            end,
            length,
        });
        self.pose = end;
        self.width = end_width;
    }

    /// Moves `length` along the current heading.
    pub fn extend_straight(&mut self, length: f64) -> RouteResult<&mut Self> {
        self.taper(length, self.width)
    }

    #[inline]
    pub fn straight(&mut self, length: f64) -> RouteResult<&mut Self> {
        self.extend_straight(length)
    }

    /// A straight section whose width changes linearly to `end_width`.
    pub fn taper(&mut self, length: f64, end_width: f64) -> RouteResult<&mut Self> {
        if !(length >= MIN_SEGMENT_LENGTH) {
            return Err(RouteError::Degenerate { length });
        }
        if !(end_width > 0.0 && end_width.is_finite()) {
            return Err(RouteError::InvalidWidth { width: end_width });
        }
        let start = self.pose.at;
        let end = Pose::new(start + self.pose.heading.unit() * length, self.pose.heading);
        let kind = if end_width == self.width {
            SegmentKind::Straight
        } else {
            SegmentKind::Taper
        };
        self.push(kind, vec![start, end.at], end, end_width, length);
        Ok(self)
    }

    /// Emits `dr` of straight, a circular arc of the configured radius and
    /// another `dr` of straight. `angle` is in degrees and must be a multiple
    /// of 45 between 45 and 180.
    pub fn bend(&mut self, turn: Turn, angle: f64) -> RouteResult<&mut Self> {
        let eighths = angle / 45.0;
        if (eighths - eighths.round()).abs() > 1e-9 || !(1.0..=4.0).contains(&eighths.round()) {
            return Err(RouteError::InvalidBend { angle });
        }
        let steps = eighths.round() as i32;
        let RouterConfig { radius, dr, .. } = *self.cfg;

        let h0 = self.pose.heading;
        let h1 = h0.rotate(turn.sign() * steps);
        // Direction from the arc center toward the waveguide.
        let radial = |h: Heading| match turn {
            Turn::Left => h.right(),
            Turn::Right => h.left(),
        };

        let p0 = self.pose.at;
        let p1 = p0 + h0.unit() * dr;
        let center = p1 - radial(h0).unit() * radius;
        let p2 = center + radial(h1).unit() * radius;
        let p3 = p2 + h1.unit() * dr;

        let a0 = radial(h0).angle();
        let sweep = turn.sign() as f64 * angle;
        let arc = arc_points(center, radius, a0, a0 + sweep);

        let mut points = Vec::with_capacity(arc.len() + 2);
        if dr > 0.0 {
            points.push(p0);
        }
        points.push(p1);
        points.extend_from_slice(&arc[1..arc.len() - 1]);
        points.push(p2);
        if dr > 0.0 {
            points.push(p3);
        }

        let length = 2.0 * dr + radius * angle.to_radians();
        self.push(
            SegmentKind::Bend { turn, angle },
            points,
            Pose::new(p3, h1),
            self.width,
            length,
        );
        Ok(self)
    }

    /// Bends onto `heading`. A half turn goes counterclockwise.
    pub fn turn_to(&mut self, heading: Heading) -> RouteResult<&mut Self> {
        let steps = self.pose.heading.steps_to(heading);
        let turn = if steps >= 0 { Turn::Left } else { Turn::Right };
        self.bend(turn, 45.0 * steps.abs() as f64)
    }

    fn axis_run(&mut self, axis: Axis, length: f64) -> RouteResult<&mut Self> {
        let heading = self.pose.heading;
        if heading.axis() != Some(axis) {
            return Err(RouteError::OffAxis { axis, heading });
        }
        let forward = axis.coord(heading.unit());
        if length * forward < 0.0 {
            return Err(RouteError::Reversed {
                axis,
                length,
                heading,
            });
        }
        self.extend_straight(length.abs())
    }

    /// A signed run along x. The sign must agree with the heading.
    pub fn horizontal(&mut self, dx: f64) -> RouteResult<&mut Self> {
        self.axis_run(Axis::Horizontal, dx)
    }

    /// A signed run along y. The sign must agree with the heading.
    pub fn vertical(&mut self, dy: f64) -> RouteResult<&mut Self> {
        self.axis_run(Axis::Vertical, dy)
    }

    /// Runs straight, then turns onto `heading` so that the new leg lies on
    /// `x = track` (when turning onto a vertical heading) or `y = track`
    /// (when turning onto a horizontal heading).
    pub fn run_to(&mut self, track: f64, heading: Heading) -> RouteResult<&mut Self> {
        let from = self.pose.heading;
        let axis = match from.axis() {
            Some(axis) if from.steps_to(heading).abs() == 2 => axis,
            _ => return Err(RouteError::NotPerpendicular { from, to: heading }),
        };
        let forward = axis.coord(from.unit());
        let dist = (track - axis.coord(self.pose.at)) * forward - self.bend_size();
        if dist < -EPSILON {
            return Err(RouteError::Overshoot {
                track,
                overshoot: -dist,
                at: self.pose.at,
            });
        }
        if dist >= MIN_SEGMENT_LENGTH {
            self.extend_straight(dist)?;
        }
        self.turn_to(heading)
    }

    /// Runs straight to `target`, which must lie ahead on the current line.
    /// Does nothing if the cursor is already there.
    pub fn finish_at(&mut self, target: Point) -> RouteResult<&mut Self> {
        let u = self.pose.heading.unit();
        let v = target - self.pose.at;
        let along = v.dot(u);
        let off = u.cross(v);
        if off.abs() > 1e-6 || along < -1e-6 {
            return Err(RouteError::OffTrack {
                target,
                at: self.pose.at,
                heading: self.pose.heading,
            });
        }
        if along >= MIN_SEGMENT_LENGTH {
            self.extend_straight(along)?;
            if let Some(last) = self.segments.last_mut() {
                if let Some(p) = last.points.last_mut() {
                    *p = target;
                }
                last.end.at = target;
            }
            self.pose.at = target;
        }
        Ok(self)
    }

    /// An S-shaped pair of opposite 90 degree bends that ends on the
    /// current heading, displaced by `(dx, dy)`.
    ///
    /// The straight run before the first bend equals the one after the
    /// second.
    pub fn sbend(&mut self, dx: f64, dy: f64) -> RouteResult<&mut Self> {
        let h = self.pose.heading;
        if !h.is_cardinal() {
            return Err(RouteError::NotPerpendicular {
                from: h,
                to: h.left(),
            });
        }
        let u = h.unit();
        let d = Point::new(dx, dy);
        let forward = d.dot(u);
        let lateral = u.cross(d);
        let b = self.bend_size();

        if lateral.abs() < EPSILON {
            return self.extend_straight(forward);
        }

        let half = forward / 2.0 - b;
        let mid = lateral.abs() - 2.0 * b;
        if half < -EPSILON || mid < -EPSILON {
            let target = self.pose.at + d;
            return Err(RouteError::Overshoot {
                track: if half < -EPSILON { forward } else { lateral },
                overshoot: -half.min(mid),
                at: target,
            });
        }
        let turn = if lateral > 0.0 { Turn::Left } else { Turn::Right };

        if half >= MIN_SEGMENT_LENGTH {
            self.extend_straight(half)?;
        }
        self.bend(turn, 90.0)?;
        if mid >= MIN_SEGMENT_LENGTH {
            self.extend_straight(mid)?;
        }
        self.bend(turn.flip(), 90.0)?;
        if half >= MIN_SEGMENT_LENGTH {
            self.extend_straight(half)?;
        }
        Ok(self)
    }

    /// Repeated "run, bend, bend back" steps. Each step shifts the
    /// trace sideways by two bend sizes toward `turn`.
    pub fn staircase(&mut self, runs: &[f64], turn: Turn) -> RouteResult<&mut Self> {
        for &run in runs {
            if run >= MIN_SEGMENT_LENGTH {
                self.extend_straight(run)?;
            } else if run < -EPSILON {
                return Err(RouteError::Degenerate { length: run });
            }
            self.bend(turn, 90.0)?.bend(turn.flip(), 90.0)?;
        }
        Ok(self)
    }

    /// Continues this trace with the segments of `other`, which must start
    /// where this one ends.
    pub fn append(&mut self, other: Trace) -> RouteResult<&mut Self> {
        if !self.pose.approx_eq(&other.start, 1e-6) {
            return Err(RouteError::OffTrack {
                target: other.start.at,
                at: self.pose.at,
                heading: self.pose.heading,
            });
        }
        self.pose = other.pose;
        self.width = other.width;
        self.segments.extend(other.segments);
        Ok(self)
    }

    /// Adds the outline of every segment to `cell`.
    pub fn draw(&self, cell: &mut Cell) {
        for seg in self.segments.iter() {
            cell.add(Element::new(seg.layer, seg.outline()));
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::tech::AIST;

    fn router() -> Router {
        Router::new(&AIST)
    }

    fn assert_pose(actual: Pose, at: Point, heading: Heading) {
        assert_eq!(actual.heading, heading);
        assert_abs_diff_eq!(actual.at.x, at.x, epsilon = 1e-9);
        assert_abs_diff_eq!(actual.at.y, at.y, epsilon = 1e-9);
    }

    #[test]
    fn test_quarter_bend_offsets() -> RouteResult<()> {
        let mut t = router().trace_from(Point::zero(), Heading::East);
        t.turn_to(Heading::North)?;
        assert_pose(t.pose(), Point::new(10.1, 10.1), Heading::North);
        t.turn_to(Heading::West)?;
        assert_pose(t.pose(), Point::new(0.0, 20.2), Heading::West);
        t.bend(Turn::Right, 90.0)?;
        assert_pose(t.pose(), Point::new(-10.1, 30.3), Heading::North);
        Ok(())
    }

    #[test]
    fn test_segments_are_continuous() -> RouteResult<()> {
        let mut t = router().trace_from(Point::new(3.0, -4.0), Heading::NorthEast);
        t.straight(12.5)?
            .bend(Turn::Right, 135.0)?
            .taper(20.0, 0.16)?
            .bend(Turn::Left, 45.0)?
            .bend(Turn::Left, 180.0)?
            .straight(3.0)?;
        let segs = t.segments();
        assert_eq!(segs.len(), 6);
        for w in segs.windows(2) {
            assert_eq!(w[0].end, w[1].start);
            assert_eq!(w[0].end_width, w[1].start_width);
        }
        for s in segs {
            assert_eq!(s.points[0], s.start.at);
            assert_eq!(*s.points.last().unwrap(), s.end.at);
            // The first and last chords are tangent to the pose headings.
            let first = (s.points[1] - s.points[0]).normalized();
            let last = (s.points[s.points.len() - 1] - s.points[s.points.len() - 2]).normalized();
            assert!(first.approx_eq(s.start.heading.unit(), 1e-9));
            assert!(last.approx_eq(s.end.heading.unit(), 1e-9));
        }
        assert_eq!(t.width(), 0.16);
        Ok(())
    }

    #[test]
    fn test_composition_is_associative() -> RouteResult<()> {
        let r = router();
        let mut whole = r.trace_from(Point::new(1.0, 2.0), Heading::South);
        whole
            .straight(7.0)?
            .bend(Turn::Left, 45.0)?
            .straight(2.5)?
            .bend(Turn::Left, 135.0)?
            .straight(40.0)?
            .bend(Turn::Right, 90.0)?;

        let mut first = r.trace_from(Point::new(1.0, 2.0), Heading::South);
        first.straight(7.0)?.bend(Turn::Left, 45.0)?.straight(2.5)?;
        let mut second = r.trace(first.pose());
        second
            .bend(Turn::Left, 135.0)?
            .straight(40.0)?
            .bend(Turn::Right, 90.0)?;

        assert!(whole.pose().approx_eq(&second.pose(), 1e-9));
        first.append(second)?;
        assert!(whole.pose().approx_eq(&first.pose(), 1e-9));
        assert_abs_diff_eq!(whole.length(), first.length(), epsilon = 1e-9);
        Ok(())
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Straight(f64),
        Bend(Turn, i32),
        Taper(f64, f64),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0.01f64..100.0).prop_map(Op::Straight),
            (prop_oneof![Just(Turn::Left), Just(Turn::Right)], 1i32..=4)
                .prop_map(|(turn, steps)| Op::Bend(turn, steps)),
            (0.01f64..50.0, 0.1f64..2.0).prop_map(|(length, width)| Op::Taper(length, width)),
        ]
    }

    fn apply(t: &mut Trace, ops: &[Op]) -> RouteResult<()> {
        for op in ops {
            match *op {
                Op::Straight(length) => t.straight(length)?,
                Op::Bend(turn, steps) => t.bend(turn, 45.0 * steps as f64)?,
                Op::Taper(length, width) => t.taper(length, width)?,
            };
        }
        Ok(())
    }

    /// End pose summed from the bend geometry: `dr`, a circular arc and
    /// `dr` again per bend.
    fn closed_form(start: Pose, ops: &[Op], cfg: &RouterConfig) -> Pose {
        let mut at = start.at;
        let mut eighths = start.heading.eighths();
        for op in ops {
            let angle = 45.0 * eighths as f64;
            match *op {
                Op::Straight(length) | Op::Taper(length, _) => at = at + Point::polar(angle) * length,
                Op::Bend(turn, steps) => {
                    let sign = turn.sign();
                    let next = eighths + sign * steps;
                    let end = 45.0 * next as f64;
                    let quarter = 90.0 * sign as f64;
                    at = at
                        + Point::polar(angle) * cfg.dr
                        + (Point::polar(end - quarter) - Point::polar(angle - quarter)) * cfg.radius
                        + Point::polar(end) * cfg.dr;
                    eighths = next;
                }
            }
        }
        Pose::new(at, Heading::from_eighths(eighths))
    }

    fn assert_tangent_joints(t: &Trace) -> Result<(), TestCaseError> {
        for w in t.segments().windows(2) {
            prop_assert!(w[0].end.approx_eq(&w[1].start, 1e-9));
            let n = w[0].points.len();
            let incoming = (w[0].points[n - 1] - w[0].points[n - 2]).normalized();
            let outgoing = (w[1].points[1] - w[1].points[0]).normalized();
            prop_assert!(
                incoming.approx_eq(outgoing, 1e-6),
                "kink between {:?} and {:?}",
                w[0].kind,
                w[1].kind
            );
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn test_split_traces_compose(
            (ops, split) in prop::collection::vec(arb_op(), 1..12)
                .prop_flat_map(|ops| {
                    let n = ops.len();
                    (Just(ops), 0..=n)
                }),
            x in -1000.0f64..1000.0,
            y in -1000.0f64..1000.0,
            eighths in 0i32..8,
        ) {
            let r = router();
            let start = Pose::new(Point::new(x, y), Heading::from_eighths(eighths));

            let mut whole = r.trace(start);
            apply(&mut whole, &ops)?;
            let mut first = r.trace(start);
            apply(&mut first, &ops[..split])?;
            let mut second = r.trace(first.pose());
            second.set_width(first.width())?;
            apply(&mut second, &ops[split..])?;

            prop_assert!(whole.pose().approx_eq(&second.pose(), 1e-6));
            first.append(second)?;
            prop_assert!(whole.pose().approx_eq(&first.pose(), 1e-6));
            prop_assert_eq!(whole.segments().len(), first.segments().len());
            assert_tangent_joints(&whole)?;
            assert_tangent_joints(&first)?;

            let expected = closed_form(start, &ops, &r.cfg());
            prop_assert!(
                whole.pose().approx_eq(&expected, 1e-6),
                "ended at {} instead of {}",
                whole.pose(),
                expected
            );
        }
    }

    #[test]
    fn test_closed_form_end_pose() -> RouteResult<()> {
        let RouterConfig { radius, dr, .. } = *router().cfg();
        let mut t = router().trace_from(Point::zero(), Heading::East);
        t.bend(Turn::Left, 45.0)?;
        let s = std::f64::consts::FRAC_1_SQRT_2;
        // dr along east, the arc chord, then dr along northeast.
        let expected = Point::new(dr + radius * s + dr * s, radius * (1.0 - s) + dr * s);
        assert_pose(t.pose(), expected, Heading::NorthEast);
        Ok(())
    }

    #[test]
    fn test_degenerate_and_invalid() {
        let mut t = router().trace_from(Point::zero(), Heading::East);
        assert!(matches!(
            t.straight(1e-4),
            Err(RouteError::Degenerate { .. })
        ));
        assert!(matches!(
            t.bend(Turn::Left, 60.0),
            Err(RouteError::InvalidBend { .. })
        ));
        assert!(matches!(
            t.bend(Turn::Left, 225.0),
            Err(RouteError::InvalidBend { .. })
        ));
        assert!(matches!(
            t.turn_to(Heading::East),
            Err(RouteError::InvalidBend { .. })
        ));
        assert!(matches!(t.vertical(5.0), Err(RouteError::OffAxis { .. })));
        assert!(matches!(
            t.horizontal(-5.0),
            Err(RouteError::Reversed { .. })
        ));
        assert!(matches!(
            t.set_width(f64::NAN),
            Err(RouteError::InvalidWidth { .. })
        ));
        assert!(matches!(
            t.set_width(f64::INFINITY),
            Err(RouteError::InvalidWidth { .. })
        ));
        assert!(matches!(
            t.taper(10.0, f64::NAN),
            Err(RouteError::InvalidWidth { .. })
        ));
        assert!(matches!(t.set_width(0.0), Err(RouteError::InvalidWidth { .. })));
        assert_eq!(t.width(), AIST.waveguide.width);
        assert!(t.segments().is_empty());
    }

    #[test]
    fn test_run_to_and_finish() -> RouteResult<()> {
        let mut t = router().trace_from(Point::new(41.016, -0.55), Heading::East);
        t.run_to(100.0, Heading::North)?;
        assert_pose(t.pose(), Point::new(100.0, 9.55), Heading::North);
        t.run_to(300.0, Heading::East)?;
        assert_pose(t.pose(), Point::new(110.1, 300.0), Heading::East);
        t.finish_at(Point::new(4850.0, 300.0))?;
        assert_eq!(t.at(), Point::new(4850.0, 300.0));
        // Already there.
        t.finish_at(Point::new(4850.0, 300.0))?;
        assert!(matches!(
            t.finish_at(Point::new(5000.0, 301.0)),
            Err(RouteError::OffTrack { .. })
        ));
        assert!(matches!(
            t.run_to(4855.0, Heading::South),
            Err(RouteError::Overshoot { .. })
        ));
        assert!(matches!(
            t.run_to(0.0, Heading::West),
            Err(RouteError::NotPerpendicular { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_sbend() -> RouteResult<()> {
        let mut t = router().trace_from(Point::zero(), Heading::East);
        t.sbend(100.0, -40.0)?;
        assert_pose(t.pose(), Point::new(100.0, -40.0), Heading::East);
        assert_eq!(t.segments().len(), 5);
        assert_abs_diff_eq!(t.segments()[0].length, 50.0 - 10.1, epsilon = 1e-12);

        let mut t = router().trace_from(Point::zero(), Heading::North);
        t.sbend(-20.2, 20.2)?;
        assert_pose(t.pose(), Point::new(-20.2, 20.2), Heading::North);
        assert_eq!(t.segments().len(), 2);

        let mut t = router().trace_from(Point::zero(), Heading::East);
        assert!(matches!(
            t.sbend(10.0, 40.0),
            Err(RouteError::Overshoot { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_staircase_descends() -> RouteResult<()> {
        let mut t = router().trace_from(Point::zero(), Heading::East);
        t.staircase(&[100.0, 0.0, 50.0], Turn::Right)?;
        assert_pose(t.pose(), Point::new(150.0 + 6.0 * 10.1, -60.6), Heading::East);
        Ok(())
    }

    #[test]
    fn test_draw_adds_one_polygon_per_segment() -> RouteResult<()> {
        let mut cell = Cell::new("trace");
        let mut t = router().trace_from(Point::zero(), Heading::West);
        t.straight(10.0)?.turn_to(Heading::South)?;
        t.draw(&mut cell);
        assert_eq!(cell.elems.len(), 2);
        Ok(())
    }
}
