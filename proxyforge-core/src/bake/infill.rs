//! Hole infill and chart gutters, recorded once and replayed per channel
//!
//! Both maps are computed from coverage masks rather than from pixel values,
//! so replaying them on every channel fills exactly the same pixels from
//! exactly the same sources.

use glam::Vec4;
use smallvec::SmallVec;

use super::FloatImage;

const NEIGHBOURS: [(i32, i32, f32); 8] = [
    (-1, 0, 1.0),
    (1, 0, 1.0),
    (0, -1, 1.0),
    (0, 1, 1.0),
    (-1, -1, std::f32::consts::FRAC_1_SQRT_2),
    (1, -1, std::f32::consts::FRAC_1_SQRT_2),
    (-1, 1, std::f32::consts::FRAC_1_SQRT_2),
    (1, 1, std::f32::consts::FRAC_1_SQRT_2),
];

fn neighbours(width: u32, height: u32, pixel: usize) -> impl Iterator<Item = (usize, f32)> {
    let (x, y) = ((pixel as u32 % width) as i32, (pixel as u32 / width) as i32);
    NEIGHBOURS.iter().filter_map(move |&(dx, dy, w)| {
        let (nx, ny) = (x + dx, y + dy);
        let inside = nx >= 0 && ny >= 0 && nx < width as i32 && ny < height as i32;
        inside.then(|| ((ny as u32 * width + nx as u32) as usize, w))
    })
}

/// One filled pixel and the normalized weights of its sources
#[derive(Debug, Clone, PartialEq)]
pub struct InfillStep {
    pub pixel: usize,
    pub sources: SmallVec<[(usize, f32); 8]>,
}

/// Fill order and weights for hole pixels
///
/// Holes are filled front by front: each pass fills every hole pixel that
/// touches a pixel known before the pass, using a distance-weighted average
/// of those neighbours.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfillMap {
    width: u32,
    height: u32,
    steps: Vec<InfillStep>,
    unreachable: Vec<usize>,
}

impl InfillMap {
    /// `holes` marks pixels to fill; `known` marks pixels with valid values
    pub fn compute(width: u32, height: u32, holes: &[bool], known: &[bool]) -> Self {
        let mut known = known.to_vec();
        let mut pending: Vec<usize> = (0..holes.len()).filter(|&p| holes[p]).collect();
        let mut steps = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let mut front = Vec::new();
            let mut rest = Vec::new();
            for &pixel in &pending {
                let sources: SmallVec<[(usize, f32); 8]> =
                    neighbours(width, height, pixel).filter(|&(n, _)| known[n]).collect();
                if sources.is_empty() {
                    rest.push(pixel);
                    continue;
                }
                let total: f32 = sources.iter().map(|&(_, w)| w).sum();
                front.push(InfillStep {
                    pixel,
                    sources: sources.into_iter().map(|(n, w)| (n, w / total)).collect(),
                });
            }
            if front.is_empty() {
                break;
            }
            for step in &front {
                known[step.pixel] = true;
            }
            steps.extend(front);
            pending = rest;
        }

        Self {
            width,
            height,
            steps,
            unreachable: pending,
        }
    }

    pub fn steps(&self) -> &[InfillStep] {
        &self.steps
    }

    /// Hole pixels, in fill order
    pub fn hole_pixels(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps.iter().map(|s| s.pixel)
    }

    /// Holes with no known pixel in reach; left untouched by [`InfillMap::apply`]
    pub fn unreachable(&self) -> &[usize] {
        &self.unreachable
    }

    pub fn apply(&self, image: &mut FloatImage) {
        debug_assert_eq!((image.width, image.height), (self.width, self.height));
        for step in &self.steps {
            image.pixels[step.pixel] = step
                .sources
                .iter()
                .map(|&(n, w)| image.pixels[n] * w)
                .sum::<Vec4>();
        }
    }
}

/// Copy order that extends charts into the empty space around them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GutterMap {
    width: u32,
    height: u32,
    /// (target, source) pairs, sources always written earlier
    copies: Vec<(usize, usize)>,
}

impl GutterMap {
    /// Grow `covered` outward by `rings` pixels
    pub fn compute(width: u32, height: u32, covered: &[bool], rings: u32) -> Self {
        let mut reached = covered.to_vec();
        let mut frontier: Vec<usize> = (0..covered.len()).filter(|&p| covered[p]).collect();
        let mut copies = Vec::new();
        for _ in 0..rings {
            let mut next = Vec::new();
            for &source in &frontier {
                for (n, w) in neighbours(width, height, source) {
                    // Orthogonal steps only, so gutters follow chart edges
                    if w < 1.0 || reached[n] {
                        continue;
                    }
                    reached[n] = true;
                    copies.push((n, source));
                    next.push(n);
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        Self { width, height, copies }
    }

    pub fn len(&self) -> usize {
        self.copies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }

    pub fn apply(&self, image: &mut FloatImage) {
        debug_assert_eq!((image.width, image.height), (self.width, self.height));
        for &(target, source) in &self.copies {
            image.pixels[target] = image.pixels[source];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_hole_is_neighbour_average() {
        let mut image = FloatImage::filled(3, 3, Vec4::ONE);
        image.set(1, 1, Vec4::ZERO);
        image.set(0, 1, Vec4::splat(3.0));
        let mut holes = vec![false; 9];
        holes[4] = true;
        let known: Vec<bool> = holes.iter().map(|h| !h).collect();
        let map = InfillMap::compute(3, 3, &holes, &known);
        assert_eq!(map.steps().len(), 1);
        map.apply(&mut image);
        let total = 4.0 + 4.0 * std::f32::consts::FRAC_1_SQRT_2;
        let expected = (3.0 + 3.0 + 4.0 * std::f32::consts::FRAC_1_SQRT_2) / total;
        assert!((image.get(1, 1).x - expected).abs() < 1e-5);
    }

    #[test]
    fn test_fill_marches_inward() {
        // A 5x1 strip known only at the left end
        let holes = vec![false, true, true, true, true];
        let known = vec![true, false, false, false, false];
        let map = InfillMap::compute(5, 1, &holes, &known);
        assert_eq!(map.hole_pixels().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        let mut image = FloatImage::filled(5, 1, Vec4::ZERO);
        image.set(0, 0, Vec4::splat(2.0));
        map.apply(&mut image);
        assert!(image.pixels.iter().all(|&p| p == Vec4::splat(2.0)));
    }

    #[test]
    fn test_same_map_fills_every_channel_identically() {
        let holes = vec![false, true, true, false];
        let known = vec![true, false, false, true];
        let map = InfillMap::compute(2, 2, &holes, &known);
        let mut a = FloatImage::filled(2, 2, Vec4::ZERO);
        let mut b = FloatImage::filled(2, 2, Vec4::ZERO);
        a.pixels[0] = Vec4::ONE;
        b.pixels[0] = Vec4::splat(10.0);
        map.apply(&mut a);
        map.apply(&mut b);
        for p in map.hole_pixels() {
            assert!((b.pixels[p] - a.pixels[p] * 10.0).length() < 1e-4);
        }
    }

    #[test]
    fn test_holes_on_image_border() {
        // Known only at the centre of a 3x3 image, every border pixel is a hole
        let mut holes = vec![true; 9];
        holes[4] = false;
        let known: Vec<bool> = holes.iter().map(|h| !h).collect();
        let map = InfillMap::compute(3, 3, &holes, &known);
        assert_eq!(map.steps().len(), 8);
        assert!(map.unreachable().is_empty());

        let mut image = FloatImage::filled(3, 3, Vec4::ZERO);
        image.set(1, 1, Vec4::splat(5.0));
        map.apply(&mut image);
        assert!(image.pixels.iter().all(|&p| (p - Vec4::splat(5.0)).length() < 1e-5));

        let mut corner = vec![false; 9];
        corner[0] = true;
        let gutter = GutterMap::compute(3, 3, &corner, 4);
        assert_eq!(gutter.len(), 8);
    }

    #[test]
    fn test_isolated_holes_are_unreachable() {
        let holes = vec![true; 4];
        let known = vec![false; 4];
        let map = InfillMap::compute(2, 2, &holes, &known);
        assert!(map.steps().is_empty());
        assert_eq!(map.unreachable().len(), 4);
    }

    #[test]
    fn test_gutter_extends_chart() {
        let mut covered = vec![false; 25];
        covered[12] = true;
        let map = GutterMap::compute(5, 5, &covered, 2);
        // Diamond of radius 2 around the center, minus the center
        assert_eq!(map.len(), 12);
        let mut image = FloatImage::filled(5, 5, Vec4::ZERO);
        image.pixels[12] = Vec4::ONE;
        map.apply(&mut image);
        assert_eq!(image.get(2, 0), Vec4::ONE);
        assert_eq!(image.get(0, 0), Vec4::ZERO);
    }
}
