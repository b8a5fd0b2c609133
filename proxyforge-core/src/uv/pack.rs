//! Bowtie splitting, chart extraction and shelf packing

use glam::Vec2;
use hashbrown::HashMap;

use crate::geometry::Aabb;
use crate::mesh::Overlay;

/// Binary search steps when fitting the chart scale
const SCALE_SEARCH_STEPS: usize = 32;

/// Give every edge-connected fan of corners its own element
///
/// A UV element touched by corners that are not connected through shared UV
/// edges is a bowtie; rectangle packers cannot move the two fans
/// independently. Returns the number of elements added.
pub fn split_bowties(uvs: &mut Overlay<Vec2>, triangles: &[[u32; 3]]) -> usize {
    let mut users: Vec<Vec<(u32, usize)>> = vec![Vec::new(); uvs.element_count()];
    for (t, tri) in uvs.triangles.iter().enumerate() {
        for (corner, &e) in tri.iter().enumerate() {
            if e != crate::mesh::UNSET {
                users[e as usize].push((t as u32, corner));
            }
        }
    }

    let mut added = 0;
    let mut group = Vec::new();
    for (e, fan) in users.iter().enumerate() {
        if fan.len() < 2 {
            continue;
        }
        group.clear();
        group.extend(0..fan.len());
        for i in 0..fan.len() {
            for j in (i + 1)..fan.len() {
                if shares_uv_edge(uvs, triangles, fan[i], fan[j]) {
                    union(&mut group, i, j);
                }
            }
        }

        let mut replacement: HashMap<usize, u32> = HashMap::new();
        let first = find(&mut group, 0);
        for (i, &(t, corner)) in fan.iter().enumerate() {
            let root = find(&mut group, i);
            if root == first {
                continue;
            }
            let value = uvs.elements[e];
            let parent = uvs.parents[e];
            let new = *replacement.entry(root).or_insert_with(|| {
                added += 1;
                uvs.append_element(value, parent)
            });
            uvs.triangles[t as usize][corner] = new;
        }
    }
    added
}

/// Whether two corners on the same element also share a second UV element
/// across a mesh edge
fn shares_uv_edge(uvs: &Overlay<Vec2>, triangles: &[[u32; 3]], a: (u32, usize), b: (u32, usize)) -> bool {
    let (ta, ca) = (a.0 as usize, a.1);
    let (tb, cb) = (b.0 as usize, b.1);
    [1, 2].iter().any(|&da| {
        let va = triangles[ta][(ca + da) % 3];
        let ea = uvs.triangles[ta][(ca + da) % 3];
        [1, 2].iter().any(|&db| {
            triangles[tb][(cb + db) % 3] == va && uvs.triangles[tb][(cb + db) % 3] == ea
        })
    })
}

fn find(group: &mut [usize], mut i: usize) -> usize {
    while group[i] != i {
        group[i] = group[group[i]];
        i = group[i];
    }
    i
}

fn union(group: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(group, a), find(group, b));
    if ra != rb {
        group[ra.max(rb)] = ra.min(rb);
    }
}

/// Chart index per triangle: triangles sharing a UV edge share a chart
pub(crate) fn extract_charts(uvs: &Overlay<Vec2>) -> (Vec<u32>, usize) {
    let count = uvs.triangles.len();
    let mut group: Vec<usize> = (0..count).collect();
    let mut edges: HashMap<(u32, u32), usize> = HashMap::new();
    for (t, tri) in uvs.triangles.iter().enumerate() {
        for i in 0..3 {
            let (a, b) = (tri[i], tri[(i + 1) % 3]);
            let key = (a.min(b), a.max(b));
            match edges.get(&key) {
                Some(&other) => union(&mut group, t, other),
                None => {
                    edges.insert(key, t);
                }
            }
        }
    }

    let mut ids: HashMap<usize, u32> = HashMap::new();
    let mut chart_of = Vec::with_capacity(count);
    for t in 0..count {
        let root = find(&mut group, t);
        let next = ids.len() as u32;
        chart_of.push(*ids.entry(root).or_insert(next));
    }
    (chart_of, ids.len())
}

/// Lay out rectangles on shelves, tallest first; `None` if they overflow the unit square
fn shelf_layout(sizes: &[Vec2], order: &[usize], scale: f32, gutter: f32) -> Option<Vec<Vec2>> {
    let mut offsets = vec![Vec2::ZERO; sizes.len()];
    let (mut x, mut y, mut shelf) = (0.0f32, 0.0f32, 0.0f32);
    for &i in order {
        let cell = sizes[i] * scale + Vec2::splat(gutter);
        if cell.x > 1.0 {
            return None;
        }
        if x + cell.x > 1.0 {
            y += shelf;
            x = 0.0;
            shelf = 0.0;
        }
        if y + cell.y > 1.0 {
            return None;
        }
        offsets[i] = Vec2::new(x, y) + Vec2::splat(gutter * 0.5);
        x += cell.x;
        shelf = shelf.max(cell.y);
    }
    Some(offsets)
}

/// Pack all charts into the unit square at a common scale without flipping
///
/// Charts are separated by at least one texel at `resolution`. When they
/// cannot fit, the layout is only normalized into the unit square (charts may
/// overlap) and `false` is returned.
pub fn pack_charts(uvs: &mut Overlay<Vec2>, resolution: u32) -> bool {
    let (chart_of, chart_count) = extract_charts(uvs);
    if chart_count == 0 {
        return true;
    }

    let mut rects = vec![Aabb::EMPTY; chart_count];
    let mut element_chart = vec![u32::MAX; uvs.element_count()];
    for (t, tri) in uvs.triangles.iter().enumerate() {
        for &e in tri {
            if e == crate::mesh::UNSET {
                continue;
            }
            element_chart[e as usize] = chart_of[t];
            rects[chart_of[t] as usize].include(uvs.elements[e as usize].extend(0.0));
        }
    }
    let sizes: Vec<Vec2> = rects.iter().map(|r| r.extents().truncate()).collect();
    let mut order: Vec<usize> = (0..chart_count).collect();
    order.sort_by(|&a, &b| sizes[b].y.total_cmp(&sizes[a].y).then(a.cmp(&b)));

    let gutter = 1.0 / resolution.max(1) as f32;
    let total_area: f32 = sizes.iter().map(|s| s.x * s.y).sum();
    let largest = sizes.iter().map(|s| s.max_element()).fold(0.0f32, f32::max);
    let mut hi = if total_area > 0.0 {
        (1.0 / total_area).sqrt()
    } else if largest > 0.0 {
        1.0 / largest
    } else {
        1.0
    };
    let mut lo = 0.0f32;
    let mut best = shelf_layout(&sizes, &order, lo, gutter).map(|offsets| (lo, offsets));
    if best.is_some() {
        for _ in 0..SCALE_SEARCH_STEPS {
            let mid = 0.5 * (lo + hi);
            match shelf_layout(&sizes, &order, mid, gutter) {
                Some(offsets) => {
                    lo = mid;
                    best = Some((mid, offsets));
                }
                None => hi = mid,
            }
        }
    }

    match best {
        Some((scale, offsets)) if scale > 0.0 => {
            for (e, uv) in uvs.elements.iter_mut().enumerate() {
                let chart = element_chart[e];
                if chart == u32::MAX {
                    continue;
                }
                let chart = chart as usize;
                *uv = (*uv - rects[chart].min.truncate()) * scale + offsets[chart];
            }
            true
        }
        _ => {
            normalize_into_unit_square(uvs);
            false
        }
    }
}

fn normalize_into_unit_square(uvs: &mut Overlay<Vec2>) {
    let bounds = Aabb::from_points(&uvs.elements.iter().map(|uv| uv.extend(0.0)).collect::<Vec<_>>());
    let size = bounds.extents().truncate().max_element();
    let scale = if size > 0.0 { 1.0 / size } else { 1.0 };
    for uv in &mut uvs.elements {
        *uv = (*uv - bounds.min.truncate()) * scale;
    }
}
