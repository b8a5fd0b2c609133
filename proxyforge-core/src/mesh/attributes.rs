use glam::{Vec2, Vec3, Vec4};

/// Marker for a triangle corner with no overlay element assigned
pub const UNSET: u32 = u32::MAX;

/// Per-corner attribute storage that can be split independently of vertices
///
/// Each element remembers its parent vertex. Triangles sharing a vertex may
/// reference different elements, which is how normal creases and UV seams
/// are represented.
#[derive(Debug, Clone, Default)]
pub struct Overlay<T> {
    pub elements: Vec<T>,
    pub parents: Vec<u32>,
    pub triangles: Vec<[u32; 3]>,
}

impl<T: Copy> Overlay<T> {
    pub fn new(triangle_count: usize) -> Self {
        Self {
            elements: Vec::new(),
            parents: Vec::new(),
            triangles: vec![[UNSET; 3]; triangle_count],
        }
    }

    /// Drop all elements and unset every triangle
    pub fn reset(&mut self, triangle_count: usize) {
        self.elements.clear();
        self.parents.clear();
        self.triangles.clear();
        self.triangles.resize(triangle_count, [UNSET; 3]);
    }

    pub fn append_element(&mut self, value: T, parent: u32) -> u32 {
        self.elements.push(value);
        self.parents.push(parent);
        (self.elements.len() - 1) as u32
    }

    #[inline]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_set(&self, t: usize) -> bool {
        self.triangles[t].iter().all(|&e| e != UNSET)
    }

    /// Values at the three corners of triangle `t`
    #[inline]
    pub fn corner_values(&self, t: usize) -> Option<[T; 3]> {
        let [a, b, c] = self.triangles[t];
        if a == UNSET || b == UNSET || c == UNSET {
            return None;
        }
        Some([
            self.elements[a as usize],
            self.elements[b as usize],
            self.elements[c as usize],
        ])
    }

    /// Keep triangles whose flag is `true`; elements are left in place
    pub(crate) fn retain_triangles(&mut self, keep: &[bool]) {
        let mut index = 0;
        self.triangles.retain(|_| {
            let k = keep[index];
            index += 1;
            k
        });
    }
}

/// Attribute overlays carried by a mesh once its topology is final
#[derive(Debug, Clone, Default)]
pub struct MeshAttributes {
    pub normals: Overlay<Vec3>,
    pub uvs: Overlay<Vec2>,
    /// Per-corner tangents, `w` holds the bitangent sign; empty until computed
    pub tangents: Vec<[Vec4; 3]>,
}

impl MeshAttributes {
    pub fn new(triangle_count: usize) -> Self {
        Self {
            normals: Overlay::new(triangle_count),
            uvs: Overlay::new(triangle_count),
            tangents: Vec::new(),
        }
    }

    pub(crate) fn retain_triangles(&mut self, keep: &[bool]) {
        self.normals.retain_triangles(keep);
        self.uvs.retain_triangles(keep);
        if !self.tangents.is_empty() {
            let mut index = 0;
            self.tangents.retain(|_| {
                let k = keep[index];
                index += 1;
                k
            });
        }
    }

    pub(crate) fn remap_parents(&mut self, remap: &[u32]) {
        for parent in self.normals.parents.iter_mut().chain(self.uvs.parents.iter_mut()) {
            let old = *parent as usize;
            if old < remap.len() {
                *parent = remap[old];
            }
        }
    }
}
