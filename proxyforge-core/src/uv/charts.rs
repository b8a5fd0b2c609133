//! Chart-building parameterization backends
//!
//! Both backends cut the surface into charts that are nearly planar with
//! respect to one projection direction and flatten each chart by orthogonal
//! projection. They differ in how charts are formed.

use std::collections::VecDeque;

use glam::{Vec2, Vec3};

use super::Parameterization;
use crate::geometry::plane_basis;
use crate::mesh::TriangleMesh;

/// Largest accepted angle cosine between a face and its chart axis
///
/// Orthogonal projection shrinks a face by `cos(angle)`, so the area stretch
/// is `1 / cos - 1`.
fn min_cosine(stretch_target: f32) -> f32 {
    1.0 / (1.0 + stretch_target.max(0.0))
}

fn project(mesh: &TriangleMesh, t: usize, axis: Vec3) -> [Vec2; 3] {
    let (u, v) = plane_basis(axis);
    mesh.triangle_positions(t).map(|p| Vec2::new(p.dot(u), p.dot(v)))
}

fn finish(mesh: &TriangleMesh, chart_of: Vec<u32>, axes: &[Vec3], max_charts: u32) -> Option<Parameterization> {
    if max_charts > 0 && axes.len() > max_charts as usize {
        tracing::debug!("{} charts exceed the limit of {max_charts}", axes.len());
        return None;
    }
    let corner_uvs = (0..mesh.triangle_count())
        .map(|t| project(mesh, t, axes[chart_of[t] as usize]))
        .collect();
    Some(Parameterization { chart_of, corner_uvs })
}

/// Grow charts outward from the largest faces while normals stay in a cone
pub fn grow_charts(mesh: &TriangleMesh, stretch_target: f32, max_charts: u32) -> Option<Parameterization> {
    if mesh.is_empty() {
        return None;
    }
    let count = mesh.triangle_count();
    let limit = min_cosine(stretch_target);
    let normals: Vec<Vec3> = (0..count).map(|t| mesh.triangle_normal(t)).collect();
    let neighbours = mesh.edge_neighbours();

    let mut seeds: Vec<usize> = (0..count).collect();
    seeds.sort_by(|&a, &b| mesh.triangle_area(b).total_cmp(&mesh.triangle_area(a)));

    let mut chart_of = vec![u32::MAX; count];
    let mut axes = Vec::new();
    let mut queue = VecDeque::new();
    for seed in seeds {
        if chart_of[seed] != u32::MAX {
            continue;
        }
        let chart = axes.len() as u32;
        let axis = if normals[seed] == Vec3::ZERO { Vec3::Z } else { normals[seed] };
        axes.push(axis);
        chart_of[seed] = chart;
        queue.push_back(seed);
        while let Some(t) = queue.pop_front() {
            for &n in &neighbours[t] {
                if n == u32::MAX {
                    continue;
                }
                let n = n as usize;
                if chart_of[n] == u32::MAX && normals[n].dot(axis) >= limit {
                    chart_of[n] = chart;
                    queue.push_back(n);
                }
            }
        }
    }
    finish(mesh, chart_of, &axes, max_charts)
}

/// Dominant-axis direction class in `0..6` (+X, -X, +Y, -Y, +Z, -Z)
pub(crate) fn axis_class(n: Vec3) -> usize {
    let a = n.abs();
    let axis = if a.x >= a.y && a.x >= a.z {
        0
    } else if a.y >= a.z {
        1
    } else {
        2
    };
    axis * 2 + usize::from(n[axis] < 0.0)
}

pub(crate) fn class_axis(class: usize) -> Vec3 {
    let sign = if class % 2 == 0 { 1.0 } else { -1.0 };
    match class / 2 {
        0 => Vec3::X * sign,
        1 => Vec3::Y * sign,
        _ => Vec3::Z * sign,
    }
}

/// Group connected faces by dominant axis; faces too steep for their axis get
/// a chart of their own
pub fn axis_charts(mesh: &TriangleMesh, stretch_target: f32, max_charts: u32) -> Option<Parameterization> {
    if mesh.is_empty() {
        return None;
    }
    let count = mesh.triangle_count();
    let limit = min_cosine(stretch_target);
    let normals: Vec<Vec3> = (0..count).map(|t| mesh.triangle_normal(t)).collect();
    let classes: Vec<usize> = normals.iter().map(|&n| axis_class(n)).collect();
    let steep: Vec<bool> = (0..count)
        .map(|t| normals[t] != Vec3::ZERO && normals[t].dot(class_axis(classes[t])) < limit)
        .collect();
    let neighbours = mesh.edge_neighbours();

    let mut chart_of = vec![u32::MAX; count];
    let mut axes = Vec::new();
    let mut queue = VecDeque::new();
    for seed in 0..count {
        if chart_of[seed] != u32::MAX {
            continue;
        }
        let chart = axes.len() as u32;
        chart_of[seed] = chart;
        if steep[seed] {
            axes.push(normals[seed]);
            continue;
        }
        axes.push(class_axis(classes[seed]));
        queue.push_back(seed);
        while let Some(t) = queue.pop_front() {
            for &n in &neighbours[t] {
                if n == u32::MAX {
                    continue;
                }
                let n = n as usize;
                if chart_of[n] == u32::MAX && !steep[n] && classes[n] == classes[seed] {
                    chart_of[n] = chart;
                    queue.push_back(n);
                }
            }
        }
    }
    finish(mesh, chart_of, &axes, max_charts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::signed_area_2d;

    fn octahedron() -> TriangleMesh {
        let positions = vec![
            Vec3::X,
            Vec3::NEG_X,
            Vec3::Y,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::NEG_Z,
        ];
        let triangles = vec![
            [0, 2, 4],
            [2, 1, 4],
            [1, 3, 4],
            [3, 0, 4],
            [2, 0, 5],
            [1, 2, 5],
            [3, 1, 5],
            [0, 3, 5],
        ];
        TriangleMesh::from_parts(positions, triangles)
    }

    #[test]
    fn test_axis_class() {
        assert_eq!(axis_class(Vec3::X), 0);
        assert_eq!(axis_class(Vec3::NEG_Y), 3);
        assert_eq!(axis_class(Vec3::new(0.1, 0.2, -0.9)), 5);
        for class in 0..6 {
            assert_eq!(axis_class(class_axis(class)), class);
        }
    }

    #[test]
    fn test_projection_keeps_orientation() {
        let mesh = TriangleMesh::cube(Vec3::ZERO, Vec3::ONE);
        let layout = grow_charts(&mesh, 0.11, 0).unwrap();
        for corners in &layout.corner_uvs {
            assert!(signed_area_2d(corners[0], corners[1], corners[2]) > 0.0);
        }
    }

    #[test]
    fn test_steep_faces_get_own_charts() {
        // Octahedron faces sit at ~55 degrees to every axis
        let mesh = octahedron();
        let layout = axis_charts(&mesh, 0.11, 0).unwrap();
        assert_eq!(layout.chart_count(), 8);
        // A generous stretch target lets them group by axis instead
        let layout = axis_charts(&mesh, 1.0, 0).unwrap();
        assert!(layout.chart_count() < 8);
    }

    #[test]
    fn test_grow_respects_chart_limit() {
        let mesh = octahedron();
        assert!(grow_charts(&mesh, 0.11, 4).is_none());
        assert!(grow_charts(&mesh, 0.11, 8).is_some());
    }

    #[test]
    fn test_empty_mesh_has_no_layout() {
        let mesh = TriangleMesh::new();
        assert!(grow_charts(&mesh, 0.11, 0).is_none());
        assert!(axis_charts(&mesh, 0.11, 0).is_none());
    }
}
