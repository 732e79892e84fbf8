//! Lane routing from eastbound feeds onto the SSC column.
//!
//! Every feed is a trace heading east on a leg of its own. A feed whose
//! leg lines up with its SSC port runs straight in. The others turn onto
//! a vertical lane, climb or descend to the port and turn east again.
//! Feeds must keep their vertical order: sorted by leg, the targets have
//! to be sorted too, or two routes would cross.

use crate::error::{LayoutError, LayoutResult};
use crate::geometry::{Heading, Point};
use crate::route::Trace;

/// Legs closer than this to their target count as lined up.
const ALIGN_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct Feed {
    pub net: String,
    /// Partial route ending on its eastbound leg.
    pub trace: Trace,
    /// The SSC port the route ends on.
    pub target: Point,
}

impl Feed {
    pub fn new(net: impl Into<String>, trace: Trace, target: Point) -> Self {
        Self {
            net: net.into(),
            trace,
            target,
        }
    }

    #[inline]
    fn leg(&self) -> f64 {
        self.trace.at().y
    }

    #[inline]
    fn rise(&self) -> f64 {
        self.target.y - self.leg()
    }
}

/// Where the vertical lanes may go.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Lanes {
    /// x of the easternmost lane.
    pub right: f64,
    /// Lanes may not lie west of this.
    pub left_limit: f64,
    pub pitch: f64,
}

impl Lanes {
    fn x(&self, lane: usize) -> f64 {
        self.right - lane as f64 * self.pitch
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Direction {
    Straight,
    Up,
    Down,
}

/// Completes every feed onto its SSC port.
pub fn route_feeds(mut feeds: Vec<Feed>, lanes: &Lanes) -> LayoutResult<Vec<Trace>> {
    for feed in feeds.iter() {
        if feed.trace.heading() != Heading::East {
            return Err(LayoutError::Floorplan(format!(
                "feed `{}` heads {} instead of east",
                feed.net,
                feed.trace.heading()
            )));
        }
    }
    feeds.sort_by(|a, b| a.leg().total_cmp(&b.leg()));

    let min_leg_space = feeds.first().map(|f| f.trace.width()).unwrap_or_default();
    for pair in feeds.windows(2) {
        if pair[1].leg() - pair[0].leg() <= min_leg_space {
            return Err(LayoutError::Floorplan(format!(
                "feeds `{}` and `{}` share a leg",
                pair[0].net, pair[1].net
            )));
        }
        if pair[1].target.y <= pair[0].target.y {
            return Err(LayoutError::Floorplan(format!(
                "routes of `{}` and `{}` would cross",
                pair[0].net, pair[1].net
            )));
        }
    }

    let directions: Vec<Direction> = feeds
        .iter()
        .map(|f| {
            let rise = f.rise();
            if rise.abs() <= ALIGN_TOLERANCE {
                Ok(Direction::Straight)
            } else if rise.abs() < 2.0 * f.trace.bend_size() {
                Err(LayoutError::Floorplan(format!(
                    "feed `{}` is {:.3} um off its SSC port; it needs 0 or at least {:.3} um",
                    f.net,
                    rise.abs(),
                    2.0 * f.trace.bend_size()
                )))
            } else if rise > 0.0 {
                Ok(Direction::Up)
            } else {
                Ok(Direction::Down)
            }
        })
        .collect::<LayoutResult<_>>()?;

    let assigned = assign_lanes(&feeds, &directions, lanes.pitch);
    let used = assigned.iter().flatten().max().map(|l| l + 1).unwrap_or(0);
    if used > 0 && lanes.x(used - 1) < lanes.left_limit {
        return Err(LayoutError::Floorplan(format!(
            "{used} lanes at {} um pitch do not fit between x = {} and x = {}",
            lanes.pitch, lanes.left_limit, lanes.right
        )));
    }
    log::debug!("routing {} feeds on {used} lanes", feeds.len());

    feeds
        .into_iter()
        .zip(assigned)
        .map(|(feed, lane)| {
            let Feed {
                net,
                mut trace,
                target,
            } = feed;
            if let Some(lane) = lane {
                let up = target.y > trace.at().y;
                let heading = if up { Heading::North } else { Heading::South };
                trace.run_to(lanes.x(lane), heading)?.run_to(target.y, Heading::East)?;
            }
            trace.finish_at(target).map_err(|e| {
                LayoutError::Floorplan(format!("feed `{net}` cannot reach its SSC port: {e}"))
            })?;
            Ok(trace)
        })
        .collect()
}

/// Lane index per feed, `None` for straight feeds. Lane 0 is the
/// easternmost.
///
/// A climbing route must lie east of every climbing route above it whose
/// span it overlaps, so climbers are numbered from the bottom up and
/// descenders from the top down. Climbers and descenders never share a
/// span and draw from the same lanes.
fn assign_lanes(feeds: &[Feed], directions: &[Direction], clearance: f64) -> Vec<Option<usize>> {
    let mut lanes = vec![None; feeds.len()];
    let up: Vec<usize> = (0..feeds.len()).filter(|&i| directions[i] == Direction::Up).collect();
    let down: Vec<usize> = (0..feeds.len())
        .rev()
        .filter(|&i| directions[i] == Direction::Down)
        .collect();

    for (k, &i) in up.iter().enumerate() {
        let lane = up[..k]
            .iter()
            .filter(|&&j| feeds[i].leg() < feeds[j].target.y + clearance)
            .filter_map(|&j| lanes[j])
            .map(|l: usize| l + 1)
            .max()
            .unwrap_or(0);
        lanes[i] = Some(lane);
    }
    for (k, &i) in down.iter().enumerate() {
        let lane = down[..k]
            .iter()
            .filter(|&&j| feeds[i].leg() > feeds[j].target.y - clearance)
            .filter_map(|&j| lanes[j])
            .map(|l: usize| l + 1)
            .max()
            .unwrap_or(0);
        lanes[i] = Some(lane);
    }
    lanes
}
